use std::collections::HashMap;

use waylay_core::error::InterceptError;
use waylay_core::request::RequestId;

use crate::tokenize::split_args;

/// One operator command, parsed and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Release,
    Help,
    Exit,
    ListRequests,
    ListHeaders { id: RequestId },
    GetHeader { id: RequestId, key: String },
    GetParam { id: RequestId, key: String },
    GetCookie { id: RequestId, key: Option<String> },
    GetBody { id: RequestId },
    SetHeader { id: RequestId, key: String, value: String },
    SetQueryParam { id: RequestId, key: String, value: String },
    SetFormParam { id: RequestId, key: String, value: String },
    SetCookie { id: RequestId, key: Option<String>, value: String },
    SetBody { id: RequestId, value: String },
}

fn invalid(message: impl Into<String>) -> InterceptError {
    InterceptError::InvalidCommand(message.into())
}

impl Command {
    /// Parse one input line. A blank line yields `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, InterceptError> {
        let args = split_args(line);
        let Some((verb, rest)) = args.split_first() else {
            return Ok(None);
        };
        let (noun, flags) = match rest.split_first() {
            Some((noun, flags)) => (Some(noun.as_str()), flags),
            None => (None, rest),
        };

        let command = match (verb.as_str(), noun) {
            ("start", None) => Self::Start,
            ("release", None) => Self::Release,
            ("help", None) => Self::Help,
            ("exit", None) => Self::Exit,

            ("list", Some("request")) => {
                Flags::parse(flags, &[])?;
                Self::ListRequests
            }
            ("list", Some("header")) => Self::ListHeaders {
                id: Flags::parse(flags, &["id"])?.id()?,
            },

            ("get", Some("header")) => {
                let flags = Flags::parse(flags, &["id", "h"])?;
                Self::GetHeader {
                    id: flags.id()?,
                    key: flags.required("h")?,
                }
            }
            ("get", Some("param")) => {
                let flags = Flags::parse(flags, &["id", "p"])?;
                Self::GetParam {
                    id: flags.id()?,
                    key: flags.required("p")?,
                }
            }
            ("get", Some("cookie")) => {
                let flags = Flags::parse(flags, &["id", "c"])?;
                Self::GetCookie {
                    id: flags.id()?,
                    key: flags.optional("c").filter(|key| !key.is_empty()),
                }
            }
            ("get", Some("body")) => Self::GetBody {
                id: Flags::parse(flags, &["id"])?.id()?,
            },

            ("set", Some(target)) => {
                let flags = Flags::parse(flags, &["id", "v"])?;
                let id = flags.id()?;
                let value = flags.required("v")?;
                match target {
                    "header" => {
                        let (key, value) = key_value(&value)?;
                        Self::SetHeader { id, key, value }
                    }
                    "get-param" => {
                        let (key, value) = key_value(&value)?;
                        Self::SetQueryParam { id, key, value }
                    }
                    "post-param" => {
                        let (key, value) = key_value(&value)?;
                        Self::SetFormParam { id, key, value }
                    }
                    "cookie" => match key_value(&value) {
                        Ok((key, value)) => Self::SetCookie {
                            id,
                            key: Some(key),
                            value,
                        },
                        Err(_) => Self::SetCookie {
                            id,
                            key: None,
                            value,
                        },
                    },
                    "body" => Self::SetBody { id, value },
                    other => return Err(invalid(format!("unknown set target `{other}`"))),
                }
            }

            (verb, Some(noun)) => return Err(invalid(format!("unknown command `{verb} {noun}`"))),
            (verb, None) => return Err(invalid(format!("unknown command `{verb}`"))),
        };
        Ok(Some(command))
    }
}

/// Split `k=v` at the first `=`. The key must be non-empty; the value may be.
fn key_value(raw: &str) -> Result<(String, String), InterceptError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(invalid(format!("expected k=v, got `{raw}`"))),
    }
}

/// `-name value`, `--name value`, or `-name=value` options.
struct Flags {
    values: HashMap<String, String>,
}

impl Flags {
    fn parse(args: &[String], allowed: &[&str]) -> Result<Self, InterceptError> {
        let mut values = HashMap::new();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            let Some(flag) = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) else {
                return Err(invalid(format!("unexpected argument `{arg}`")));
            };
            let (name, value) = match flag.split_once('=') {
                Some((name, value)) => (name, value.to_string()),
                None => {
                    let value = args
                        .next()
                        .ok_or_else(|| invalid(format!("flag -{flag} needs a value")))?;
                    (flag, value.clone())
                }
            };
            if !allowed.contains(&name) {
                return Err(invalid(format!("unknown flag -{name}")));
            }
            values.insert(name.to_string(), value);
        }
        Ok(Self { values })
    }

    fn id(&self) -> Result<RequestId, InterceptError> {
        let raw = self
            .values
            .get("id")
            .ok_or_else(|| invalid("missing -id"))?;
        raw.trim()
            .parse()
            .map(RequestId)
            .map_err(|_| invalid(format!("-id must be a non-negative integer, got `{raw}`")))
    }

    fn required(&self, name: &str) -> Result<String, InterceptError> {
        self.optional(name)
            .ok_or_else(|| invalid(format!("missing -{name}")))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}
