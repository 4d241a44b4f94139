use tracing::debug;
use waylay_core::error::InterceptError;
use waylay_core::session::CaptureSession;

use crate::command::Command;
use crate::output::{HeaderLine, Output};

/// Run one command against the session.
pub async fn execute(session: &CaptureSession, command: Command) -> Result<Output, InterceptError> {
    debug!(?command, "executing");
    let output = match command {
        Command::Start => Output::Started {
            started: session.start(),
        },
        Command::Release => Output::Released {
            count: session.release().await?,
        },
        Command::Help => Output::Help,
        Command::Exit => Output::Exit,
        Command::ListRequests => Output::Requests {
            requests: session.held_requests()?,
        },
        Command::ListHeaders { id } => Output::Headers {
            id,
            headers: session
                .list_headers(id)?
                .into_iter()
                .map(HeaderLine::from)
                .collect(),
        },
        Command::GetHeader { id, key } => {
            let values = session.get_header(id, &key)?;
            Output::Values { id, key, values }
        }
        Command::GetParam { id, key } => {
            let values = session.get_param(id, &key)?;
            Output::Values { id, key, values }
        }
        Command::GetCookie { id, key: Some(key) } => Output::Cookies {
            id,
            cookies: vec![session.cookie(id, &key)?],
        },
        Command::GetCookie { id, key: None } => Output::Cookies {
            id,
            cookies: session.cookies(id)?,
        },
        Command::GetBody { id } => Output::Body {
            id,
            body: String::from_utf8_lossy(&session.get_body(id)?).into_owned(),
        },
        Command::SetHeader { id, key, value } => {
            session.set_header(id, &key, &value)?;
            Output::Updated { id, applied: true }
        }
        Command::SetQueryParam { id, key, value } => Output::Updated {
            id,
            applied: session.set_query_param(id, &key, &value)?,
        },
        Command::SetFormParam { id, key, value } => Output::Updated {
            id,
            applied: session.set_form_param(id, &key, &value)?,
        },
        Command::SetCookie { id, key, value } => {
            session.set_cookie(id, key.as_deref(), &value)?;
            Output::Updated { id, applied: true }
        }
        Command::SetBody { id, value } => {
            session.set_body(id, value)?;
            Output::Updated { id, applied: true }
        }
    };
    Ok(output)
}
