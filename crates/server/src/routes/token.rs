//! Bearer token generation.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{ApiError, Envelope};
use crate::state::SharedState;

/// Derives the bearer token for a session. Protected by the shared secret
/// carried as a path segment rather than by a token, since this is where
/// tokens come from.
pub async fn generate(
	State(state): State<SharedState>,
	Path((session, secretkey)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	state.require_secret(&secretkey)?;
	if session.is_empty() || session.contains(':') {
		return Err(ApiError::Validation("invalid session name".to_string()));
	}

	let derived = state.tokens.derive(&session);
	info!(target = "wabridge.auth", %session, "token generated");

	Ok(Envelope::success(json!({
		"session": session,
		"token": derived.token,
		"full": derived.full,
		"usage": {
			"header": format!("Authorization: Bearer {}", derived.token),
			"curl": format!(
				"curl -H \"Authorization: Bearer {}\" {}/{}/status-session",
				derived.token,
				state.config.api_base(),
				session
			),
		},
	})))
}
