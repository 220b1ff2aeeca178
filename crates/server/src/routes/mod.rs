//! HTTP routing.

mod backup;
mod chat;
mod contact;
mod execute;
mod group;
mod session;
mod token;

use axum::Router;
use axum::routing::{get, post};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
	Router::new()
		.route("/healthz", get(health))
		.route("/api/{session}/{secretkey}/generate-token", post(token::generate))
		.route("/api/{session}/start-session", post(session::start))
		.route("/api/{session}/status-session", get(session::status))
		.route("/api/{session}/qrcode-session", get(session::qrcode))
		.route("/api/{session}/close-session", post(session::close))
		.route("/api/{session}/logout-session", post(session::logout))
		.route("/api/{session}/all-chats", get(chat::all_chats))
		.route("/api/{session}/chat-by-id/{id}", get(chat::chat_by_id))
		.route("/api/{session}/unread-messages", get(chat::unread_messages))
		.route("/api/{session}/send-message", post(chat::send_message))
		.route("/api/{session}/send-image", post(chat::send_image))
		.route("/api/{session}/send-file", post(chat::send_file))
		.route("/api/{session}/delete-message", post(chat::delete_message))
		.route("/api/{session}/edit-message", post(chat::edit_message))
		.route("/api/{session}/all-contacts", get(contact::all_contacts))
		.route("/api/{session}/contact/{id}", get(contact::contact_by_id))
		.route("/api/{session}/block-contact", post(contact::block))
		.route("/api/{session}/unblock-contact", post(contact::unblock))
		.route("/api/{session}/create-group", post(group::create))
		.route("/api/{session}/add-participant-group", post(group::add_participant))
		.route("/api/{session}/remove-participant-group", post(group::remove_participant))
		.route("/api/{session}/promote-participant-group", post(group::promote_participant))
		.route("/api/{session}/demote-participant-group", post(group::demote_participant))
		.route("/api/{session}/execute", post(execute::function))
		.route("/api/{session}/execute-batch", post(execute::batch))
		.route("/api/{session}/execute-script", post(execute::script))
		.route("/api/{session}/backup-sessions", get(backup::backup_sessions))
		.route("/api/{session}/restore-sessions", post(backup::restore_sessions))
		.with_state(state)
}

async fn health() -> &'static str {
	"ok"
}

/// Extracts a required string field from a JSON request body.
fn require_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, ApiError> {
	body.get(field)
		.and_then(Value::as_str)
		.filter(|value| !value.is_empty())
		.ok_or_else(|| ApiError::Validation(format!("parameter {field} is required")))
}

/// Extracts a required array field from a JSON request body.
fn require_array<'a>(body: &'a Value, field: &str) -> Result<&'a Vec<Value>, ApiError> {
	body.get(field)
		.and_then(Value::as_array)
		.ok_or_else(|| ApiError::Validation(format!("parameter {field} is required")))
}

/// Extracts an optional string field, mapping absence to JSON null for the
/// remote call's trailing optional argument.
fn optional_str(body: &Value, field: &str) -> Value {
	body.get(field)
		.and_then(Value::as_str)
		.map(|value| Value::String(value.to_string()))
		.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn require_str_rejects_missing_and_empty() {
		let body = json!({"to": "x@c.us", "empty": ""});
		assert_eq!(require_str(&body, "to").unwrap(), "x@c.us");
		assert!(require_str(&body, "content").is_err());
		assert!(require_str(&body, "empty").is_err());
	}

	#[test]
	fn optional_str_maps_absence_to_null() {
		let body = json!({"caption": "hello"});
		assert_eq!(optional_str(&body, "caption"), json!("hello"));
		assert_eq!(optional_str(&body, "missing"), Value::Null);
	}
}
