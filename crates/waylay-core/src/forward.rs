use std::future::Future;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::ForwardError;
use crate::request::HeldRequest;

/// The upstream response to a forwarded request, fully buffered.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardedResponse {
    /// The response handed to the client when forwarding fails.
    pub fn from_error(err: &ForwardError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::from(err.to_string()),
        }
    }
}

/// Sends a request to its real destination.
///
/// Called with no session or registry lock held.
pub trait Forwarder: Send + Sync {
    fn forward(
        &self,
        request: HeldRequest,
    ) -> impl Future<Output = Result<ForwardedResponse, ForwardError>> + Send;
}
