//! Session lifecycle endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::auth::AuthSession;
use crate::error::{ApiError, Envelope};
use crate::state::SharedState;

/// Ensures a connected session exists for the caller, creating one if
/// absent. Idempotent: repeated starts return the current state.
pub async fn start(
	State(state): State<SharedState>,
	auth: AuthSession,
	body: Option<Json<Value>>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let config = body.map(|Json(value)| value).unwrap_or(Value::Null);
	let session_state = state.controller.ensure_connected(&auth.name, config).await?;

	let record = state.registry.get(&auth.name);
	Ok(Envelope::success(json!({
		"session": auth.name,
		"state": session_state,
		"qrcode": record.and_then(|record| record.qr_code),
	})))
}

pub async fn status(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let record = state
		.registry
		.get(&auth.name)
		.ok_or_else(|| ApiError::Session(wabridge::SessionError::NotFound(auth.name.clone())))?;

	Ok(Envelope::success(json!({
		"session": record.name,
		"state": record.state,
		"createdAt": record.created_at,
		"lastError": record.last_error,
	})))
}

pub async fn qrcode(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let record = state
		.registry
		.get(&auth.name)
		.ok_or_else(|| ApiError::Session(wabridge::SessionError::NotFound(auth.name.clone())))?;

	match record.qr_code {
		Some(qrcode) => Ok(Envelope::success(json!({
			"session": record.name,
			"qrcode": qrcode,
		}))),
		None => Err(ApiError::Session(wabridge::SessionError::NotFound(
			format!("no pairing code for session {}", auth.name),
		))),
	}
}

pub async fn close(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	state.controller.close(&auth.name).await?;
	Ok(Envelope::message("success", "session closed"))
}

/// Logs the remote side out, then closes the session and deletes its
/// on-disk data.
pub async fn logout(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	state.controller.logout(&auth.name).await?;
	Ok(Envelope::message("success", "session logged out"))
}
