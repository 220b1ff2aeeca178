//! Session registry: the single source of truth for per-tenant state.
//!
//! The registry is an explicit repository object handed to every component
//! that needs session lookup; it is created at process start and torn down at
//! shutdown. All state mutation is funneled through [`SessionRegistry::upsert`]
//! so a check-then-set on session state can never interleave with another
//! request's transition. The internal lock is never held across an await
//! point; callers re-check state after resuming from suspension.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::automation::ExecutionContext;
use crate::now_ts;

/// Lifecycle state of a session.
///
/// `Closed` is reachable from every state on fatal error. `QrCode` is a
/// transient sub-state of initialization surfaced while the remote side
/// awaits pairing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "INITIALIZING")]
    Initializing,
    #[serde(rename = "QRCODE")]
    QrCode,
    #[serde(rename = "CONNECTED")]
    Connected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Closed => write!(f, "CLOSED"),
            SessionState::Initializing => write!(f, "INITIALIZING"),
            SessionState::QrCode => write!(f, "QRCODE"),
            SessionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Per-function-path count of bridge calls currently awaiting a tagged line.
///
/// Correlation on the console channel uses only the function path, so two
/// concurrent calls on the same path can steal each other's results. The
/// bridge records every call here and warns when it observes an overlap.
#[derive(Debug, Default)]
pub struct InflightCalls {
    counts: Mutex<HashMap<String, usize>>,
}

impl InflightCalls {
    /// Marks a call on `function_path` as in flight; returns how many calls
    /// on the same path were already waiting.
    pub fn begin(&self, function_path: &str) -> usize {
        let mut counts = self.counts.lock();
        let count = counts.entry(function_path.to_string()).or_insert(0);
        let prior = *count;
        *count += 1;
        prior
    }

    /// Marks a call on `function_path` as finished.
    pub fn end(&self, function_path: &str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(function_path) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(function_path);
            }
        }
    }

    /// Returns the number of calls currently in flight for `function_path`.
    pub fn count(&self, function_path: &str) -> usize {
        self.counts.lock().get(function_path).copied().unwrap_or(0)
    }
}

/// Record of one named session.
#[derive(Clone)]
pub struct SessionRecord {
    /// Caller-chosen session name; primary key in the registry.
    pub name: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Execution context handle, owned exclusively by this record once
    /// created and released on close.
    pub context: Option<Arc<dyn ExecutionContext>>,
    /// Unix seconds when the record was created.
    pub created_at: u64,
    /// Last fatal error observed for this session.
    pub last_error: Option<String>,
    /// Configuration of the request that triggered the current lifecycle.
    pub config: Value,
    /// Last pairing payload captured from the remote side.
    pub qr_code: Option<String>,
    /// In-flight bridge call bookkeeping, shared with the bridge invoker.
    pub inflight: Arc<InflightCalls>,
}

impl SessionRecord {
    /// Creates a closed record for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SessionState::Closed,
            context: None,
            created_at: now_ts(),
            last_error: None,
            config: Value::Null,
            qr_code: None,
            inflight: Arc::new(InflightCalls::default()),
        }
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("has_context", &self.context.is_some())
            .field("created_at", &self.created_at)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Process-wide mapping from session name to session record.
///
/// At most one record exists per session name at any time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a session by name; never creates.
    pub fn get(&self, name: &str) -> Option<SessionRecord> {
        self.sessions.lock().get(name).cloned()
    }

    /// Returns the current state of `name`, if registered.
    pub fn state(&self, name: &str) -> Option<SessionState> {
        self.sessions.lock().get(name).map(|record| record.state)
    }

    /// Atomically creates the record if absent and applies `mutate` to it.
    ///
    /// This is the only mutation path; holding the lock for the whole
    /// closure is what makes concurrent state transitions safe.
    pub fn upsert<T>(&self, name: &str, mutate: impl FnOnce(&mut SessionRecord) -> T) -> T {
        let mut sessions = self.sessions.lock();
        let record = sessions
            .entry(name.to_string())
            .or_insert_with(|| SessionRecord::new(name));
        mutate(record)
    }

    /// Removes the record. The caller is responsible for releasing the
    /// execution context it may still reference, so a registry failure can
    /// never leak browser resources.
    pub fn remove(&self, name: &str) -> Option<SessionRecord> {
        self.sessions.lock().remove(name)
    }

    /// Names of all registered sessions.
    pub fn names(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_creates_then_mutates_in_place() {
        let registry = SessionRegistry::new();
        assert!(registry.get("tenant").is_none());

        registry.upsert("tenant", |record| {
            assert_eq!(record.state, SessionState::Closed);
            record.state = SessionState::Initializing;
        });

        assert_eq!(registry.state("tenant"), Some(SessionState::Initializing));
        assert_eq!(registry.names(), vec!["tenant".to_string()]);
    }

    #[test]
    fn upsert_guard_admits_exactly_one_initializer() {
        let registry = SessionRegistry::new();
        let claim = |registry: &SessionRegistry| {
            registry.upsert("tenant", |record| {
                if record.state == SessionState::Closed {
                    record.state = SessionState::Initializing;
                    true
                } else {
                    false
                }
            })
        };

        assert!(claim(&registry));
        assert!(!claim(&registry));
    }

    #[test]
    fn remove_is_a_noop_for_absent_sessions() {
        let registry = SessionRegistry::new();
        assert!(registry.remove("missing").is_none());
    }

    #[test]
    fn inflight_counts_overlapping_calls() {
        let inflight = InflightCalls::default();
        assert_eq!(inflight.begin("chat.list"), 0);
        assert_eq!(inflight.begin("chat.list"), 1);
        assert_eq!(inflight.count("chat.list"), 2);

        inflight.end("chat.list");
        inflight.end("chat.list");
        assert_eq!(inflight.count("chat.list"), 0);

        // Unbalanced end calls must not underflow.
        inflight.end("chat.list");
        assert_eq!(inflight.count("chat.list"), 0);
    }
}
