//! Control plane for browser-backed messaging sessions.
//!
//! Each tenant owns a named session backed by a headless browser page into
//! which a remote bridge script is injected. The crate manages the session
//! lifecycle state machine, brokers correlated calls into the page over its
//! console stream, and keeps the on-disk session layout.
//!
//! The browser itself is reached through the [`automation`] trait seam, so
//! the control plane can be driven by a real DevTools-backed implementation
//! or an in-process fake (see [`testing`]).

pub mod automation;
pub mod backup;
pub mod batch;
pub mod bridge;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod storage;
pub mod testing;
pub mod token;

pub use automation::{Automation, ConsoleLine, ExecutionContext, LaunchSpec};
pub use batch::{BatchCall, BatchOutcome};
pub use bridge::{BridgeInvoker, DEFAULT_CALL_TIMEOUT};
pub use error::{AuthError, AutomationError, BridgeError, SessionError};
pub use lifecycle::{ControllerOptions, EventSink, SessionController, SessionEvent};
pub use registry::{InflightCalls, SessionRecord, SessionRegistry, SessionState};
pub use storage::SessionStore;
pub use token::{DerivedToken, TokenService};

/// Current Unix timestamp in seconds.
pub(crate) fn now_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
