//! Line-oriented operator console for inspecting and editing held requests.

mod command;
mod dispatch;
mod output;
mod tokenize;

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use crossterm::style::Stylize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use waylay_core::error::InterceptError;
use waylay_core::session::CaptureSession;

pub use command::Command;
pub use dispatch::execute;
pub use output::{HeaderLine, Output, OutputMode};
pub use tokenize::split_args;

/// Read commands from stdin until `exit` or end of input.
pub async fn run_console(session: Arc<CaptureSession>, mode: OutputMode) -> io::Result<()> {
    let styled = io::stdout().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if mode == OutputMode::Text {
            prompt(&session, styled)?;
        }
        let Some(line) = lines.next_line().await? else {
            debug!("stdin closed");
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                report(&e, mode, styled)?;
                continue;
            }
        };
        let exit = command == Command::Exit;

        match execute(&session, command).await {
            Ok(output) => {
                let mut stdout = io::stdout().lock();
                output.write_to(mode, &mut stdout)?;
                stdout.flush()?;
            }
            Err(e) => report(&e, mode, styled)?,
        }

        if exit {
            break;
        }
    }
    Ok(())
}

fn prompt(session: &CaptureSession, styled: bool) -> io::Result<()> {
    let text = format!("{}> ", session.state());
    let mut stdout = io::stdout().lock();
    if styled {
        write!(stdout, "{}", text.cyan())?;
    } else {
        write!(stdout, "{text}")?;
    }
    stdout.flush()
}

fn report(err: &InterceptError, mode: OutputMode, styled: bool) -> io::Result<()> {
    debug!("command failed: {err}");
    let mut stdout = io::stdout().lock();
    if styled && mode == OutputMode::Text {
        writeln!(stdout, "{}", err.to_string().red())?;
    } else {
        output::write_error(err, mode, &mut stdout)?;
    }
    stdout.flush()
}
