use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::InterceptError;
use crate::registry::Registry;
use crate::request::{HeldRequest, HeldSummary, RequestId};

/// `NotStarted → Capturing → Releasing → NotStarted`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureState {
    #[default]
    NotStarted,
    Capturing,
    Releasing,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::Capturing => "capturing",
            Self::Releasing => "releasing",
        };
        f.write_str(s)
    }
}

struct SessionInner {
    state: CaptureState,
    registry: Arc<Registry>,
}

/// Capture state plus the registry of the current epoch.
///
/// Both live behind one lock: admitting a request checks the state and
/// registers it in a single critical section, and `release` flips the state
/// under the same lock, so a request is either seen by the release or never
/// registered at all.
pub struct CaptureSession {
    inner: Mutex<SessionInner>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: CaptureState::NotStarted,
                registry: Arc::new(Registry::new()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    /// Begin a capture epoch with a fresh registry.
    ///
    /// Returns `false` without touching anything unless the session is
    /// `NotStarted`.
    pub fn start(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CaptureState::NotStarted {
            debug!(state = %inner.state, "start ignored");
            return false;
        }
        // The previous epoch's registry was drained by its release.
        inner.registry = Arc::new(Registry::new());
        inner.state = CaptureState::Capturing;
        info!("capture started");
        true
    }

    /// Release every held request and wait until all of them have been
    /// forwarded. Returns how many requests were released.
    pub async fn release(&self) -> Result<usize, InterceptError> {
        let (registry, released) = {
            let mut inner = self.lock();
            if inner.state != CaptureState::Capturing {
                return Err(InterceptError::NotCapturing);
            }
            inner.state = CaptureState::Releasing;
            let released = inner.registry.signal_all();
            (inner.registry.clone(), released)
        };
        info!(released, "releasing held requests");

        if released > 0 {
            registry.drained().await;
        }

        self.lock().state = CaptureState::NotStarted;
        info!(released, "release complete");
        Ok(released)
    }

    /// Register `request` in the current registry if the session is capturing.
    /// Hands the request back otherwise.
    pub(crate) fn try_hold(
        &self,
        request: HeldRequest,
    ) -> Result<(RequestId, Arc<Registry>, oneshot::Receiver<HeldRequest>), HeldRequest> {
        let inner = self.lock();
        if inner.state != CaptureState::Capturing {
            return Err(request);
        }
        let (id, signal) = inner.registry.insert(request);
        Ok((id, inner.registry.clone(), signal))
    }

    /// The active registry, provided the session is capturing.
    pub(crate) fn capturing_registry(&self) -> Result<Arc<Registry>, InterceptError> {
        let inner = self.lock();
        match inner.state {
            CaptureState::Capturing => Ok(inner.registry.clone()),
            _ => Err(InterceptError::NotCapturing),
        }
    }

    pub(crate) fn with_held<R>(
        &self,
        id: RequestId,
        f: impl FnOnce(&mut HeldRequest) -> R,
    ) -> Result<R, InterceptError> {
        self.capturing_registry()?
            .with_request(id, f)
            .ok_or(InterceptError::UnknownId(id))
    }

    /// Every request held in the current epoch, ordered by id.
    pub fn held_requests(&self) -> Result<Vec<HeldSummary>, InterceptError> {
        Ok(self.capturing_registry()?.snapshot())
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}
