//! Intercept/release engine: the capture session state machine, the registry
//! of held requests, the admission gate, and the operations an operator runs
//! against held requests.

pub mod error;
pub mod forward;
pub mod gate;
pub mod registry;
pub mod request;
pub mod session;

mod form;
mod mutate;

pub use error::{ForwardError, InterceptError, ProxyError};
pub use forward::{ForwardedResponse, Forwarder};
pub use gate::{Admission, Hold, HoldPolicy, InterceptGate};
pub use registry::Registry;
pub use request::{Cookie, HeldRequest, HeldSummary, RequestId};
pub use session::{CaptureSession, CaptureState};
