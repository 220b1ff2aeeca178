use std::time::Duration;

use thiserror::Error;

/// Credential verification failures. Anything that is not one of these is an
/// internal fault and must not be reported as "credentials incorrect".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is not present; check your header and try again")]
    TokenMissing,

    #[error("check that the session and token are correct")]
    TokenMismatch,

    #[error("session not informed")]
    SessionMissing,
}

/// Failures surfaced by the browser automation collaborator.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("execution context closed")]
    Closed,
}

/// Failures of a single correlated remote call.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("function {function_path} did not return within {ms}ms")]
    Timeout { function_path: String, ms: u64 },

    #[error("remote execution failed: {0}")]
    Execution(String),

    #[error("function path not found: {0}")]
    PathNotFound(String),

    #[error("unparseable result for {function_path}")]
    Parse {
        function_path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("execution context closed")]
    ContextClosed,
}

/// Session lifecycle and control-plane failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} is not connected")]
    NotConnected(String),

    #[error("remote script injection failed: {0}")]
    Inject(String),

    #[error("readiness timeout")]
    ReadinessTimeout,

    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}
