//! Ordered batch execution of bridge calls.
//!
//! Calls run strictly in submission order, one at a time, and a failing call
//! never aborts the remainder. Serializing calls this way also keeps at most
//! one call per function path in flight, which sidesteps the shared
//! correlation tag on the console channel.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::automation::ExecutionContext;
use crate::bridge::{self, DEFAULT_CALL_TIMEOUT};
use crate::registry::InflightCalls;

/// One call in a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCall {
    /// Dot-separated function path, e.g. `chat.sendTextMessage`.
    #[serde(alias = "function")]
    pub function_path: String,
    /// Positional arguments for the remote function.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Per-call timeout; the default single-call bound applies when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Outcome of one call in a batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub function_path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs `calls` against `context` sequentially, collecting per-call
/// outcomes. The returned list has the same length and order as the input.
pub async fn run_sequence(
    context: &dyn ExecutionContext,
    inflight: &InflightCalls,
    calls: &[BatchCall],
) -> Vec<BatchOutcome> {
    let mut outcomes = Vec::with_capacity(calls.len());

    for call in calls {
        let timeout = call
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CALL_TIMEOUT);

        let outcome = match bridge::invoke(
            context,
            inflight,
            &call.function_path,
            &call.args,
            timeout,
        )
        .await
        {
            Ok(result) => BatchOutcome {
                function_path: call.function_path.clone(),
                success: true,
                result: Some(result),
                error: None,
            },
            Err(err) => BatchOutcome {
                function_path: call.function_path.clone(),
                success: false,
                result: None,
                error: Some(err.to_string()),
            },
        };
        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{ScriptedBehavior, ScriptedContext};

    #[tokio::test]
    async fn outcomes_preserve_length_and_order() {
        let context = ScriptedContext::new();
        context.script("chat.list", ScriptedBehavior::result(json!([1])));
        context.script("contact.list", ScriptedBehavior::error("boom"));
        context.script("conn.getState", ScriptedBehavior::result(json!("MAIN")));

        let calls = vec![
            BatchCall {
                function_path: "chat.list".to_string(),
                args: vec![],
                timeout_ms: None,
            },
            BatchCall {
                function_path: "contact.list".to_string(),
                args: vec![],
                timeout_ms: None,
            },
            BatchCall {
                function_path: "conn.getState".to_string(),
                args: vec![],
                timeout_ms: None,
            },
        ];

        let inflight = InflightCalls::default();
        let outcomes = run_sequence(&context, &inflight, &calls).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].function_path, "chat.list");
        assert!(outcomes[0].success);
        assert_eq!(outcomes[0].result, Some(json!([1])));

        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].error.as_deref(), Some("remote execution failed: boom"));

        assert!(outcomes[2].success);
        assert_eq!(outcomes[2].result, Some(json!("MAIN")));
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_remainder() {
        let context = ScriptedContext::new();
        context.script("chat.list", ScriptedBehavior::result(json!([])));

        let calls = vec![
            BatchCall {
                function_path: "missing.call".to_string(),
                args: vec![],
                timeout_ms: None,
            },
            BatchCall {
                function_path: "chat.list".to_string(),
                args: vec![],
                timeout_ms: None,
            },
        ];

        let inflight = InflightCalls::default();
        let outcomes = run_sequence(&context, &inflight, &calls).await;

        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap().contains("not found"));
        assert!(outcomes[1].success);
    }

    #[test]
    fn batch_call_deserializes_camel_case_and_alias() {
        let call: BatchCall =
            serde_json::from_str(r#"{"functionPath": "chat.list", "timeoutMs": 500}"#).unwrap();
        assert_eq!(call.function_path, "chat.list");
        assert_eq!(call.timeout_ms, Some(500));
        assert!(call.args.is_empty());

        let call: BatchCall =
            serde_json::from_str(r#"{"function": "conn.getState", "args": [1]}"#).unwrap();
        assert_eq!(call.function_path, "conn.getState");
        assert_eq!(call.args, vec![json!(1)]);
    }
}
