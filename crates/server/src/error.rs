use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use wabridge::error::{AuthError, BridgeError, SessionError};

/// Uniform response envelope used by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub response: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
	pub fn success(response: T) -> Json<Self> {
		Json(Self {
			status: "success".to_string(),
			response: Some(response),
			message: None,
		})
	}
}

impl Envelope<serde_json::Value> {
	pub fn message(status: &str, message: impl Into<String>) -> Json<Self> {
		Json(Self {
			status: status.to_string(),
			response: None,
			message: Some(message.into()),
		})
	}
}

/// Request failures, mapped to a stable status classification.
#[derive(Debug, Error)]
pub enum ApiError {
	/// Malformed or incomplete request (400).
	#[error("{0}")]
	Validation(String),

	/// Credentials missing or incorrect (401).
	#[error(transparent)]
	Auth(#[from] AuthError),

	/// Secret-key protected route with a wrong key (401).
	#[error("{0}")]
	Unauthorized(String),

	/// The session exists but is not usable for operations (404).
	#[error("the session is not active")]
	Disconnected,

	#[error(transparent)]
	Session(#[from] SessionError),

	#[error(transparent)]
	Internal(#[from] anyhow::Error),
}

impl ApiError {
	fn classify(&self) -> (StatusCode, &'static str) {
		match self {
			ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "error"),
			ApiError::Auth(_) | ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "error"),
			ApiError::Disconnected => (StatusCode::NOT_FOUND, "Disconnected"),
			ApiError::Session(err) => match err {
				SessionError::NotFound(_) => (StatusCode::NOT_FOUND, "error"),
				SessionError::NotConnected(_) => (StatusCode::NOT_FOUND, "Disconnected"),
				SessionError::Bridge(BridgeError::PathNotFound(_)) => (StatusCode::NOT_FOUND, "error"),
				SessionError::Bridge(BridgeError::Timeout { .. }) => (StatusCode::GATEWAY_TIMEOUT, "error"),
				_ => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
			},
			ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (code, status) = self.classify();
		let body = Envelope::<serde_json::Value>::message(status, self.to_string());
		(code, body).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn status_of(err: ApiError) -> StatusCode {
		err.classify().0
	}

	#[test]
	fn classification_is_stable() {
		assert_eq!(status_of(ApiError::Validation("x".into())), StatusCode::BAD_REQUEST);
		assert_eq!(status_of(ApiError::Auth(AuthError::TokenMissing)), StatusCode::UNAUTHORIZED);
		assert_eq!(status_of(ApiError::Disconnected), StatusCode::NOT_FOUND);
		assert_eq!(
			status_of(ApiError::Session(SessionError::NotFound("t".into()))),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			status_of(ApiError::Session(SessionError::NotConnected("t".into()))),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			status_of(ApiError::Session(SessionError::Bridge(BridgeError::Timeout {
				function_path: "chat.list".into(),
				ms: 10,
			}))),
			StatusCode::GATEWAY_TIMEOUT
		);
		assert_eq!(
			status_of(ApiError::Session(SessionError::ReadinessTimeout)),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn disconnected_uses_its_own_status_label() {
		assert_eq!(ApiError::Disconnected.classify().1, "Disconnected");
		assert_eq!(
			ApiError::Session(SessionError::NotConnected("t".into())).classify().1,
			"Disconnected"
		);
	}
}
