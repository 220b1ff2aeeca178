//! Correlated remote calls over the console channel.
//!
//! The page's console stream was never designed to carry structured
//! responses, so each call evaluates a wrapper expression that resolves a
//! dot-separated function path against the remote root namespace, invokes
//! it, awaits thenables, and logs the outcome behind a tag that names the
//! function path. The invoker subscribes to the stream before evaluating,
//! then races the tagged line against a timeout.
//!
//! Correlation uses only the function path: two concurrent calls on the same
//! path on one session listen for the same tag, and the first matching line
//! satisfies whichever waiter sees it. The per-session [`InflightCalls`] map
//! surfaces that overlap with a warning; serializing calls (see
//! [`batch`](crate::batch)) is the way to avoid it.
//!
//! A timed-out call only abandons its waiter. The remote evaluation keeps
//! running and may still log a tagged line that no receiver reads; closing
//! the session is the only way to guarantee no further results arrive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::automation::ExecutionContext;
use crate::error::{AutomationError, BridgeError, SessionError};
use crate::registry::{InflightCalls, SessionRegistry, SessionState};

/// Global the injected remote script installs itself under.
pub const REMOTE_ROOT: &str = "WPP";

/// Default bound for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(10_000);

const RESULT_TAG: &str = "[WA-JS-RESULT]";
const ERROR_TAG: &str = "[WA-JS-ERROR]";
const PATH_NOT_FOUND_MARKER: &str = "path not found:";

/// Performs correlated remote calls against registered sessions.
pub struct BridgeInvoker {
    registry: Arc<SessionRegistry>,
}

impl BridgeInvoker {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves an active session and invokes `function_path` inside its
    /// execution context.
    pub async fn call(
        &self,
        session: &str,
        function_path: &str,
        args: &[Value],
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let record = self
            .registry
            .get(session)
            .ok_or_else(|| SessionError::NotFound(session.to_string()))?;
        if record.state == SessionState::Closed || record.state == SessionState::Initializing {
            return Err(SessionError::NotConnected(session.to_string()));
        }
        let context = record
            .context
            .clone()
            .ok_or_else(|| SessionError::NotConnected(session.to_string()))?;

        invoke(context.as_ref(), &record.inflight, function_path, args, timeout)
            .await
            .map_err(SessionError::from)
    }

    /// Runs an ordered batch against one session, one call at a time.
    ///
    /// Individual failures are collected into their outcome entries; only a
    /// missing or disconnected session fails the batch as a whole.
    pub async fn run_sequence(
        &self,
        session: &str,
        calls: &[crate::batch::BatchCall],
    ) -> Result<Vec<crate::batch::BatchOutcome>, SessionError> {
        let record = self
            .registry
            .get(session)
            .ok_or_else(|| SessionError::NotFound(session.to_string()))?;
        if record.state == SessionState::Closed || record.state == SessionState::Initializing {
            return Err(SessionError::NotConnected(session.to_string()));
        }
        let context = record
            .context
            .clone()
            .ok_or_else(|| SessionError::NotConnected(session.to_string()))?;

        Ok(crate::batch::run_sequence(context.as_ref(), &record.inflight, calls).await)
    }
}

/// Invokes `function_path` inside `context` and waits for its tagged result
/// line, bounded by `timeout`.
pub async fn invoke(
    context: &dyn ExecutionContext,
    inflight: &InflightCalls,
    function_path: &str,
    args: &[Value],
    timeout: Duration,
) -> Result<Value, BridgeError> {
    // Subscribe before evaluating so the tagged line cannot be missed even
    // when the remote side completes synchronously.
    let receiver = context.console();

    let prior = inflight.begin(function_path);
    if prior > 0 {
        warn!(
            target = "wabridge.bridge",
            function_path,
            in_flight = prior + 1,
            "concurrent calls on one function path share a correlation tag; results may cross"
        );
    }
    let _guard = InflightGuard {
        inflight,
        function_path,
    };

    debug!(target = "wabridge.bridge", function_path, timeout_ms = timeout.as_millis() as u64, "invoke");

    let expression = wrapper_expression(function_path, args);
    context.evaluate(&expression).await.map_err(|err| match err {
        AutomationError::Closed => BridgeError::ContextClosed,
        other => BridgeError::Execution(other.to_string()),
    })?;

    match tokio::time::timeout(timeout, wait_for_tagged_line(receiver, function_path)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(BridgeError::Timeout {
            function_path: function_path.to_string(),
            ms: timeout.as_millis() as u64,
        }),
    }
    // The receiver is dropped here on every exit path, releasing the
    // listener registration.
}

async fn wait_for_tagged_line(
    mut receiver: broadcast::Receiver<crate::automation::ConsoleLine>,
    function_path: &str,
) -> Result<Value, BridgeError> {
    let result_prefix = format!("{RESULT_TAG} {function_path}:");
    let error_prefix = format!("{ERROR_TAG} {function_path}:");

    loop {
        match receiver.recv().await {
            Ok(line) => {
                if let Some(payload) = line.text.strip_prefix(&result_prefix) {
                    return serde_json::from_str(payload.trim()).map_err(|source| {
                        BridgeError::Parse {
                            function_path: function_path.to_string(),
                            source,
                        }
                    });
                }
                if let Some(message) = line.text.strip_prefix(&error_prefix) {
                    let message = message.trim();
                    return Err(if message.starts_with(PATH_NOT_FOUND_MARKER) {
                        BridgeError::PathNotFound(function_path.to_string())
                    } else {
                        BridgeError::Execution(message.to_string())
                    });
                }
            }
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                warn!(
                    target = "wabridge.bridge",
                    function_path, dropped, "console receiver lagged; tagged line may be lost"
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(BridgeError::ContextClosed);
            }
        }
    }
}

/// Builds the expression evaluated inside the page for one call.
///
/// The wrapper walks each dot-separated segment from the remote root, fails
/// through the error tag when a segment is missing or the final value is not
/// invokable, awaits thenable results, and logs the JSON-serialized outcome
/// behind the tag carrying the function path.
fn wrapper_expression(function_path: &str, args: &[Value]) -> String {
    let path_literal = Value::String(function_path.to_string()).to_string();
    let args_literal =
        serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"(() => {{
  const path = {path_literal};
  const args = {args_literal};
  const report = (tag, payload) => console.log(tag + ' ' + path + ': ' + payload);
  const success = (value) => report('{RESULT_TAG}', JSON.stringify(value === undefined ? null : value));
  const failure = (err) => report('{ERROR_TAG}', (err && err.message) || String(err));
  try {{
    let target = window.{REMOTE_ROOT};
    for (const segment of path.split('.')) {{
      if (target && typeof target === 'object' && segment in target) {{
        target = target[segment];
      }} else {{
        throw new Error('{PATH_NOT_FOUND_MARKER} ' + path);
      }}
    }}
    if (typeof target !== 'function') {{
      throw new Error('{PATH_NOT_FOUND_MARKER} ' + path);
    }}
    const result = target(...args);
    if (result && typeof result.then === 'function') {{
      result.then(success).catch(failure);
    }} else {{
      success(result);
    }}
  }} catch (err) {{
    failure(err);
  }}
}})()"#
    )
}

struct InflightGuard<'a> {
    inflight: &'a InflightCalls,
    function_path: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.end(self.function_path);
    }
}
