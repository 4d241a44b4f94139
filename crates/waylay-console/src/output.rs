use std::io::{self, Write};

use serde::Serialize;
use waylay_core::error::InterceptError;
use waylay_core::request::{Cookie, HeldSummary, RequestId};

const HELP: &str = "\
start                                   start capturing dynamic requests
release                                 forward every held request and stop capturing
list request                            list held requests
list header -id <id>                    show all headers of a request
get header -id <id> -h <name>           show the values of one header
get param -id <id> -p <name>            show the values of a form or query parameter
get cookie -id <id> [-c <name>]         show one cookie, or all of them
get body -id <id>                       show the body (not for GET)
set header -id <id> -v <name>=<value>   replace a header
set get-param -id <id> -v <name>=<value>
                                        rewrite an existing query parameter
set post-param -id <id> -v <name>=<value>
                                        rewrite an existing form parameter
set cookie -id <id> -v [<name>=]<value> replace the Cookie header
set body -id <id> -v <value>            replace the body (not for GET)
help                                    show this text
exit                                    quit

Quote values containing spaces with '...' or \"...\".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per result.
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

impl From<(String, String)> for HeaderLine {
    fn from((name, value): (String, String)) -> Self {
        Self { name, value }
    }
}

/// Result of one successfully executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    Started {
        started: bool,
    },
    Released {
        count: usize,
    },
    Requests {
        requests: Vec<HeldSummary>,
    },
    Headers {
        id: RequestId,
        headers: Vec<HeaderLine>,
    },
    Values {
        id: RequestId,
        key: String,
        values: Vec<String>,
    },
    Cookies {
        id: RequestId,
        cookies: Vec<Cookie>,
    },
    Body {
        id: RequestId,
        body: String,
    },
    Updated {
        id: RequestId,
        applied: bool,
    },
    Help,
    Exit,
}

impl Output {
    pub fn write_to(&self, mode: OutputMode, out: &mut impl Write) -> io::Result<()> {
        match mode {
            OutputMode::Jsonl => {
                serde_json::to_writer(&mut *out, self)?;
                writeln!(out)
            }
            OutputMode::Text => self.write_text(out),
        }
    }

    fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        match self {
            Self::Started { started: true } => writeln!(out, "Start capturing."),
            Self::Started { started: false } => writeln!(out, "Already capturing."),
            Self::Released { count } => writeln!(out, "Released {count} request(s)."),
            Self::Requests { requests } if requests.is_empty() => {
                writeln!(out, "No held requests.")
            }
            Self::Requests { requests } => {
                for summary in requests {
                    writeln!(out, "[{:>2}] {} {}", summary.id, summary.method, summary.uri)?;
                }
                Ok(())
            }
            Self::Headers { headers, .. } => {
                for header in headers {
                    writeln!(out, "{}: {}", header.name, header.value)?;
                }
                Ok(())
            }
            Self::Values { values, .. } => {
                for (i, value) in values.iter().enumerate() {
                    writeln!(out, "Value-{i}: {value}")?;
                }
                Ok(())
            }
            Self::Cookies { cookies, .. } => {
                for cookie in cookies {
                    writeln!(out, "{cookie}")?;
                }
                Ok(())
            }
            Self::Body { body, .. } => writeln!(out, "{body}"),
            Self::Updated { applied: true, .. } => Ok(()),
            Self::Updated { applied: false, .. } => {
                writeln!(out, "Parameter not present; nothing rewritten.")
            }
            Self::Help => writeln!(out, "{HELP}"),
            Self::Exit => Ok(()),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename = "error")]
struct ErrorLine {
    message: String,
}

/// The single diagnostic line for a failed command, without styling.
pub fn write_error(err: &InterceptError, mode: OutputMode, out: &mut impl Write) -> io::Result<()> {
    match mode {
        OutputMode::Jsonl => {
            let line = ErrorLine {
                message: err.to_string(),
            };
            serde_json::to_writer(&mut *out, &line)?;
            writeln!(out)
        }
        OutputMode::Text => writeln!(out, "{err}"),
    }
}
