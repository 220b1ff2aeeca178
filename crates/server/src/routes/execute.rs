//! Generic remote execution endpoints.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use serde_json::Value;
use wabridge::batch::BatchCall;
use wabridge::bridge::DEFAULT_CALL_TIMEOUT;

use super::require_str;
use crate::auth::AuthSession;
use crate::error::{ApiError, Envelope};
use crate::state::SharedState;

/// Invokes an arbitrary function path inside the session's context.
pub async fn function(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let call: BatchCall = serde_json::from_value(body)
		.map_err(|err| ApiError::Validation(format!("invalid call: {err}")))?;
	state.require_active(&auth.name)?;

	let timeout = call
		.timeout_ms
		.map(Duration::from_millis)
		.unwrap_or(DEFAULT_CALL_TIMEOUT);
	let result = state
		.bridge
		.call(&auth.name, &call.function_path, &call.args, timeout)
		.await?;
	Ok(Envelope::success(result))
}

/// Runs an ordered list of calls, one at a time, collecting per-call
/// outcomes; a failing call never aborts the remainder.
pub async fn batch(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let calls = body
		.get("calls")
		.cloned()
		.ok_or_else(|| ApiError::Validation("parameter calls is required".to_string()))?;
	let calls: Vec<BatchCall> = serde_json::from_value(calls)
		.map_err(|err| ApiError::Validation(format!("invalid calls: {err}")))?;
	state.require_active(&auth.name)?;

	let outcomes = state.bridge.run_sequence(&auth.name, &calls).await?;
	Ok(Envelope::success(serde_json::to_value(outcomes).map_err(
		|err| ApiError::Internal(err.into()),
	)?))
}

/// Evaluates a raw expression in the session's page.
pub async fn script(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let script = require_str(&body, "script")?;
	let record = state.require_active(&auth.name)?;
	let context = record.context.ok_or(ApiError::Disconnected)?;

	let result = context
		.evaluate(script)
		.await
		.map_err(wabridge::SessionError::from)?;
	Ok(Envelope::success(result))
}
