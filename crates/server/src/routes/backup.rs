//! Backup and restore of the on-disk session layout.
//!
//! Both operations close every running session first; the archive format is
//! a zip with top-level `tokens/` and `userDataDir/` entries. After the
//! archive work completes, sessions found on disk are restarted in the
//! background.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use serde_json::Value;
use tracing::info;
use wabridge::backup;

use crate::error::{ApiError, Envelope};
use crate::state::SharedState;

/// Streams a zip archive of every session's tokens and profile data. The
/// path segment carries the shared secret, not a session name.
pub async fn backup_sessions(
	State(state): State<SharedState>,
	Path(secretkey): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	state.require_secret(&secretkey)?;

	state.controller.close_all().await;
	let bytes = backup::backup(&state.store)?;
	start_all(&state);

	Ok((
		[
			(header::CONTENT_TYPE, "application/zip".to_string()),
			(
				header::CONTENT_DISPOSITION,
				"attachment; filename=\"backupSessions.zip\"".to_string(),
			),
		],
		bytes,
	))
}

/// Restores a previously downloaded backup archive. Tokens are overwritten;
/// profile data already on disk wins over archive entries.
pub async fn restore_sessions(
	State(state): State<SharedState>,
	Path(secretkey): Path<String>,
	mut multipart: Multipart,
) -> Result<Json<Envelope<Value>>, ApiError> {
	state.require_secret(&secretkey)?;

	let field = multipart
		.next_field()
		.await
		.map_err(|err| ApiError::Validation(err.to_string()))?
		.ok_or_else(|| ApiError::Validation("no file in request".to_string()))?;

	let is_zip = field
		.content_type()
		.map(|content_type| content_type.contains("zip"))
		.unwrap_or(false)
		|| field
			.file_name()
			.map(|name| name.ends_with(".zip"))
			.unwrap_or(false);
	if !is_zip {
		return Err(ApiError::Validation("please send a zipped file".to_string()));
	}

	let bytes = field
		.bytes()
		.await
		.map_err(|err| ApiError::Validation(err.to_string()))?;

	state.controller.close_all().await;
	backup::restore(&state.store, &bytes)?;
	start_all(&state);

	Ok(Envelope::message("success", "sessions restored"))
}

/// Restarts every session found on disk, in the background.
fn start_all(state: &SharedState) {
	for name in state.store.list_sessions() {
		info!(target = "wabridge.session", session = %name, "restarting session");
		let controller = state.controller.clone();
		tokio::spawn(async move {
			let _ = controller.ensure_connected(&name, Value::Null).await;
		});
	}
}
