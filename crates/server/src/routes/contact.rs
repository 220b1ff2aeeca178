//! Contact operations, brokered to the remote script.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use wabridge::bridge::DEFAULT_CALL_TIMEOUT;

use super::require_str;
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

pub async fn all_contacts(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	call(&state, &auth.name, "contact.getAllContacts", vec![]).await
}

pub async fn contact_by_id(
	State(state): State<SharedState>,
	auth: AuthSession,
	Path((_, contact_id)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	call(&state, &auth.name, "contact.getContact", vec![json!(contact_id)]).await
}

pub async fn block(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let contact_id = require_str(&body, "contactId")?;
	call(&state, &auth.name, "contact.blockContact", vec![json!(contact_id)]).await
}

pub async fn unblock(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let contact_id = require_str(&body, "contactId")?;
	call(&state, &auth.name, "contact.unblockContact", vec![json!(contact_id)]).await
}
