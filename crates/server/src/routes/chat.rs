//! Chat operations, brokered to the remote script.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use wabridge::bridge::DEFAULT_CALL_TIMEOUT;

use super::{optional_str, require_str};
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

pub async fn all_chats(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	call(&state, &auth.name, "chat.list", vec![]).await
}

pub async fn chat_by_id(
	State(state): State<SharedState>,
	auth: AuthSession,
	Path((_, chat_id)): Path<(String, String)>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	call(&state, &auth.name, "chat.getChat", vec![json!(chat_id)]).await
}

pub async fn unread_messages(
	State(state): State<SharedState>,
	auth: AuthSession,
) -> Result<Json<Envelope<Value>>, ApiError> {
	call(&state, &auth.name, "chat.getAllUnreadMessages", vec![]).await
}

pub async fn send_message(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let to = require_str(&body, "to")?;
	let content = require_str(&body, "content")?;
	call(
		&state,
		&auth.name,
		"chat.sendTextMessage",
		vec![json!(to), json!(content)],
	)
	.await
}

pub async fn send_image(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let to = require_str(&body, "to")?;
	let image = require_str(&body, "image")?;
	let caption = optional_str(&body, "caption");
	call(
		&state,
		&auth.name,
		"chat.sendImageMessage",
		vec![json!(to), json!(image), caption],
	)
	.await
}

pub async fn send_file(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let to = require_str(&body, "to")?;
	let file = require_str(&body, "file")?;
	let caption = optional_str(&body, "caption");
	call(
		&state,
		&auth.name,
		"chat.sendFileMessage",
		vec![json!(to), json!(file), caption],
	)
	.await
}

pub async fn delete_message(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let chat_id = require_str(&body, "chatId")?;
	let message_id = require_str(&body, "messageId")?;
	call(
		&state,
		&auth.name,
		"chat.deleteMessage",
		vec![json!(chat_id), json!(message_id)],
	)
	.await
}

pub async fn edit_message(
	State(state): State<SharedState>,
	auth: AuthSession,
	Json(body): Json<Value>,
) -> Result<Json<Envelope<Value>>, ApiError> {
	let message_id = require_str(&body, "messageId")?;
	let new_text = require_str(&body, "newText")?;
	call(
		&state,
		&auth.name,
		"chat.editMessage",
		vec![json!(message_id), json!(new_text)],
	)
	.await
}
