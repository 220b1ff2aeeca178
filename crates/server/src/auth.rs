//! Bearer token authentication for session-scoped routes.
//!
//! Two presentation forms are accepted: `Authorization: Bearer <token>`
//! paired with the session path segment, or the legacy combined
//! `"<session>:<token>"` carried in place of the bare session name.

use std::collections::HashMap;

use axum::extract::{FromRequestParts, Path};
use axum::http::header;
use axum::http::request::Parts;
use wabridge::error::AuthError;

use crate::error::ApiError;
use crate::state::SharedState;

/// Authenticated session identity extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthSession {
	/// Canonical session name, with any legacy token suffix stripped.
	pub name: String,
}

impl FromRequestParts<SharedState> for AuthSession {
	type Rejection = ApiError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &SharedState,
	) -> Result<Self, Self::Rejection> {
		let Path(params): Path<HashMap<String, String>> =
			Path::from_request_parts(parts, state)
				.await
				.map_err(|_| ApiError::Auth(AuthError::SessionMissing))?;
		let session_param = params
			.get("session")
			.ok_or(ApiError::Auth(AuthError::SessionMissing))?;

		let bearer = parts
			.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.strip_prefix("Bearer "))
			.map(str::trim);

		let name = state.tokens.authenticate(session_param, bearer)?;
		Ok(AuthSession { name })
	}
}
