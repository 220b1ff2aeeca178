//! Group operations, brokered to the remote script.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use wabridge::bridge::DEFAULT_CALL_TIMEOUT;

use super::{require_array, require_str};
use crate::auth::AuthSession;
use crate::error::{ApiError, Envelope};
use crate::state::SharedState;

async fn call(
	state: &SharedState,
	session: &str,
	function_path: &str,
	args: Vec<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	state.require_active(session)?;
	let result = state
		.bridge
		.call(session, function_path, &args, DEFAULT_CALL_TIMEOUT)
		.await?;
	Ok(Envelope::success(result))
}

pub async fn create(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let name = require_str(&body, "name")?;
	let participants = require_array(&body, "participants")?;
	call(
		&state,
		&auth.name,
		"group.createGroup",
		vec![json!(name), Value::Array(participants.clone())],
	)
	.await
}

async fn participant_op(
	state: SharedState,
	auth: AuthSession,
	body: Value,
	function_path: &str,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let group_id = require_str(&body, "groupId")?;
	let participant_id = require_str(&body, "participantId")?;
	call(
		&state,
		&auth.name,
		function_path,
		vec![json!(group_id), json!(participant_id)],
	)
	.await
}

pub async fn add_participant(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	participant_op(state, auth, body, "group.addParticipant").await
}

pub async fn remove_participant(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	participant_op(state, auth, body, "group.removeParticipant").await
}

pub async fn promote_participant(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	participant_op(state, auth, body, "group.promoteParticipant").await
}

pub async fn demote_participant(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	participant_op(state, auth, body, "group.demoteParticipant").await
}
