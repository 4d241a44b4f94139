use http::Method;
use thiserror::Error;

use crate::request::RequestId;

/// Operator-facing failures. Every variant is recovered at the command
/// boundary and rendered as a single line; none of them alter session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    #[error("Not started.")]
    NotCapturing,
    #[error("Invalid id: {0}.")]
    UnknownId(RequestId),
    #[error("Only available for POST form request.")]
    UnsupportedContentType,
    #[error("Not available for the {0} method.")]
    MethodNotApplicable(Method),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Cookie not found: {0}")]
    CookieNotFound(String),
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("failed to read body: {0}")]
    Body(String),
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to start proxy: {0}")]
    StartFailed(String),
    #[error("failed to stop proxy: {0}")]
    StopFailed(String),
}
