use std::sync::Arc;

use http::Method;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::ForwardError;
use crate::forward::{ForwardedResponse, Forwarder};
use crate::registry::Registry;
use crate::request::{HeldRequest, RequestId};
use crate::session::CaptureSession;

/// Extensions of pages rendered server-side; worth holding while capturing.
pub const DEFAULT_DYNAMIC_EXTENSIONS: [&str; 6] = ["htm", "html", "jsp", "php", "asp", "aspx"];

/// Decides which requests are interesting enough to hold.
///
/// POSTs are always held, as are paths whose last segment has no extension or
/// a dynamic-page extension. Anything else (images, stylesheets, scripts,
/// fonts) passes through even while capturing.
#[derive(Debug, Clone)]
pub struct HoldPolicy {
    dynamic_extensions: Vec<String>,
}

impl HoldPolicy {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dynamic_extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { dynamic_extensions }
    }

    pub fn dynamic_extensions(&self) -> &[String] {
        &self.dynamic_extensions
    }

    pub fn should_hold(&self, method: &Method, path: &str) -> bool {
        if method == Method::POST {
            return true;
        }
        let segment = path.rsplit('/').next().unwrap_or(path);
        match segment.rsplit_once('.') {
            None => true,
            Some((_, ext)) => self
                .dynamic_extensions
                .iter()
                .any(|dynamic| dynamic.eq_ignore_ascii_case(ext)),
        }
    }
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DYNAMIC_EXTENSIONS)
    }
}

pub enum Admission {
    PassThrough(HeldRequest),
    Hold(Hold),
}

/// A registered request waiting for release.
///
/// Dropping the hold removes the request from its registry, which is what
/// lets a pending release drain. The owning worker keeps it alive until the
/// forwarded response is back.
pub struct Hold {
    id: RequestId,
    registry: Arc<Registry>,
    signal: Option<oneshot::Receiver<HeldRequest>>,
}

impl Hold {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Suspend until the request is released, then return it with every
    /// mutation applied while it was held. Yields `None` if called twice.
    pub async fn released(&mut self) -> Option<HeldRequest> {
        self.signal.take()?.await.ok()
    }
}

impl Drop for Hold {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Per-request entry point: admit, hold if needed, then forward.
pub struct InterceptGate {
    session: Arc<CaptureSession>,
    policy: HoldPolicy,
}

impl InterceptGate {
    pub fn new(session: Arc<CaptureSession>, policy: HoldPolicy) -> Self {
        Self { session, policy }
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    pub fn policy(&self) -> &HoldPolicy {
        &self.policy
    }

    /// Register `request` if the session is capturing and the policy wants it.
    ///
    /// The state check and the registration happen under the session lock, so
    /// a request admitted here is always visible to a concurrent release.
    pub fn admit(&self, request: HeldRequest) -> Admission {
        if !self.policy.should_hold(&request.method, request.path()) {
            return Admission::PassThrough(request);
        }
        match self.session.try_hold(request) {
            Ok((id, registry, signal)) => Admission::Hold(Hold {
                id,
                registry,
                signal: Some(signal),
            }),
            Err(request) => Admission::PassThrough(request),
        }
    }

    /// Run one inbound request through the gate and forward it.
    pub async fn process<F: Forwarder>(
        &self,
        request: HeldRequest,
        forwarder: &F,
    ) -> Result<ForwardedResponse, ForwardError> {
        match self.admit(request) {
            Admission::PassThrough(request) => forwarder.forward(request).await,
            Admission::Hold(mut hold) => {
                let id = hold.id();
                info!(%id, "request held");
                let request = hold.released().await.ok_or_else(|| {
                    ForwardError::InvalidRequest(format!("held request {id} was discarded"))
                })?;
                debug!(%id, method = %request.method, uri = %request.uri, "forwarding released request");
                let result = forwarder.forward(request).await;
                drop(hold);
                result
            }
        }
    }
}
