//! Black-box tests for the HTTP surface over the scripted automation backend.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wabridge::testing::{ScriptedAutomation, ScriptedBehavior};
use wabridge_server::config::ServerConfig;
use wabridge_server::routes;
use wabridge_server::state::{AppState, SharedState};

const SECRET: &str = "THISISMYSECURETOKEN";

struct TestServer {
	app: Router,
	state: SharedState,
	automation: Arc<ScriptedAutomation>,
	_dirs: TempDir,
}

fn test_server() -> TestServer {
	let dirs = TempDir::new().unwrap();
	let config = ServerConfig {
		secret_key: SECRET.to_string(),
		host: "127.0.0.1".to_string(),
		port: 21465,
		webhook_url: None,
		user_data_dir: dirs.path().join("userDataDir"),
		tokens_dir: dirs.path().join("tokens"),
		remote_script: PathBuf::from("unused.js"),
		browser_path: PathBuf::from("chromium"),
		browser_args: Vec::new(),
		headful: false,
		readiness_timeout_secs: 1,
	};

	let automation = Arc::new(ScriptedAutomation::new());
	automation.script("conn.isAuthenticated", ScriptedBehavior::result(json!(true)));

	let state = Arc::new(AppState::new(
		config,
		automation.clone(),
		Arc::from("window.WPP = bridge();"),
		None,
	));
	state.store.ensure_base_dirs().unwrap();

	TestServer {
		app: routes::router(state.clone()),
		state,
		automation,
		_dirs: dirs,
	}
}

async fn request(app: Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.oneshot(request).await.unwrap();
	let status = response.status();
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	let body = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).unwrap_or(Value::String(
			String::from_utf8_lossy(&bytes).into_owned(),
		))
	};
	(status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
	let mut builder = Request::builder().method("GET").uri(uri);
	if let Some(token) = token {
		builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
	}
	builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
	let mut builder = Request::builder().method("POST").uri(uri);
	if let Some(token) = token {
		builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
	}
	match body {
		Some(body) => builder
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap(),
		None => builder.body(Body::empty()).unwrap(),
	}
}

fn token_for(server: &TestServer, session: &str) -> String {
	server.state.tokens.derive(session).token
}

async fn start_session(server: &TestServer, session: &str) {
	let token = token_for(server, session);
	let (status, body) = request(
		server.app.clone(),
		post(&format!("/api/{session}/start-session"), Some(&token), None),
	)
	.await;
	assert_eq!(status, StatusCode::OK, "start-session failed: {body}");
	assert_eq!(body["response"]["state"], "CONNECTED");
}

#[tokio::test]
async fn generate_token_requires_the_secret_key() {
	let server = test_server();

	let (status, body) = request(
		server.app.clone(),
		post("/api/tenant/wrong-secret/generate-token", None, None),
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(body["status"], "error");

	let (status, body) = request(
		server.app.clone(),
		post(&format!("/api/tenant/{SECRET}/generate-token"), None, None),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "success");
	let token = body["response"]["token"].as_str().unwrap();
	assert!(!token.contains('/'));
	assert!(!token.contains('+'));
	assert_eq!(
		body["response"]["full"],
		format!("tenant:{token}")
	);
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bogus_tokens() {
	let server = test_server();

	let (status, body) = request(server.app.clone(), get("/api/tenant/status-session", None)).await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert!(body["message"].as_str().unwrap().contains("not present"));

	let (status, _) = request(
		server.app.clone(),
		get("/api/tenant/status-session", Some("bogus")),
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn legacy_combined_session_form_authenticates() {
	let server = test_server();
	start_session(&server, "tenant").await;

	let full = server.state.tokens.derive("tenant").full;
	let (status, body) = request(
		server.app.clone(),
		get(&format!("/api/{full}/status-session"), None),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["response"]["session"], "tenant");
	assert_eq!(body["response"]["state"], "CONNECTED");
}

#[tokio::test]
async fn start_session_is_idempotent_and_creates_one_context() {
	let server = test_server();
	start_session(&server, "tenant").await;
	start_session(&server, "tenant").await;
	assert_eq!(server.automation.created(), 1);
}

#[tokio::test]
async fn send_message_round_trips_through_the_bridge() {
	let server = test_server();
	server.automation.script(
		"chat.sendTextMessage",
		ScriptedBehavior::result(json!({"id": "abc"})),
	);
	start_session(&server, "tenant").await;

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post(
			"/api/tenant/send-message",
			Some(&token),
			Some(json!({"to": "5511999999999@c.us", "content": "hi"})),
		),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["response"]["id"], "abc");
}

#[tokio::test]
async fn send_message_validates_required_parameters() {
	let server = test_server();
	start_session(&server, "tenant").await;

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post(
			"/api/tenant/send-message",
			Some(&token),
			Some(json!({"to": "5511999999999@c.us"})),
		),
	)
	.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["message"].as_str().unwrap().contains("content"));
}

#[tokio::test]
async fn operations_on_inactive_sessions_report_disconnected() {
	let server = test_server();

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post(
			"/api/tenant/send-message",
			Some(&token),
			Some(json!({"to": "x@c.us", "content": "hi"})),
		),
	)
	.await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["status"], "Disconnected");
}

#[tokio::test]
async fn unknown_function_paths_map_to_not_found() {
	let server = test_server();
	start_session(&server, "tenant").await;

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post(
			"/api/tenant/execute",
			Some(&token),
			Some(json!({"functionPath": "foo.bar", "args": []})),
		),
	)
	.await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert!(body["message"].as_str().unwrap().contains("foo.bar"));
}

#[tokio::test]
async fn execute_batch_preserves_order_and_isolates_failures() {
	let server = test_server();
	server
		.automation
		.script("chat.list", ScriptedBehavior::result(json!(["a"])));
	server
		.automation
		.script("conn.getState", ScriptedBehavior::result(json!("MAIN")));
	start_session(&server, "tenant").await;

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post(
			"/api/tenant/execute-batch",
			Some(&token),
			Some(json!({"calls": [
				{"functionPath": "chat.list"},
				{"functionPath": "missing.op"},
				{"functionPath": "conn.getState"},
			]})),
		),
	)
	.await;
	assert_eq!(status, StatusCode::OK);

	let outcomes = body["response"].as_array().unwrap();
	assert_eq!(outcomes.len(), 3);
	assert_eq!(outcomes[0]["functionPath"], "chat.list");
	assert_eq!(outcomes[0]["success"], true);
	assert_eq!(outcomes[1]["success"], false);
	assert_eq!(outcomes[2]["success"], true);
	assert_eq!(outcomes[2]["result"], "MAIN");
}

#[tokio::test]
async fn close_session_releases_the_context() {
	let server = test_server();
	start_session(&server, "tenant").await;

	let token = token_for(&server, "tenant");
	let (status, body) = request(
		server.app.clone(),
		post("/api/tenant/close-session", Some(&token), None),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "success");

	assert!(server.automation.contexts()[0].is_closed());
	let (status, _) = request(
		server.app.clone(),
		get("/api/tenant/status-session", Some(&token)),
	)
	.await;
	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn backup_requires_secret_and_returns_an_archive() {
	let server = test_server();
	std::fs::write(server.state.store.token_path("tenant"), b"{}").unwrap();
	server.state.store.create_session_dir("tenant").unwrap();

	let (status, _) = request(
		server.app.clone(),
		get("/api/not-the-secret/backup-sessions", None),
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);

	let response = server
		.app
		.clone()
		.oneshot(get(&format!("/api/{SECRET}/backup-sessions"), None))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers()[header::CONTENT_TYPE],
		"application/zip"
	);
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	// Zip local file header magic.
	assert_eq!(&bytes[..2], b"PK");
}

#[tokio::test]
async fn restore_round_trips_a_backup_archive() {
	let server = test_server();
	std::fs::write(server.state.store.token_path("tenant"), b"token-bytes").unwrap();
	let profile = server.state.store.create_session_dir("tenant").unwrap();
	std::fs::write(profile.join("Cookies"), b"cookie-bytes").unwrap();

	let response = server
		.app
		.clone()
		.oneshot(get(&format!("/api/{SECRET}/backup-sessions"), None))
		.await
		.unwrap();
	let archive = to_bytes(response.into_body(), usize::MAX).await.unwrap();

	// Wipe the layout, then restore from the archive.
	server.state.store.remove_session("tenant").await.unwrap();
	assert!(server.state.store.list_sessions().is_empty());

	let boundary = "wabridge-test-boundary";
	let mut body = Vec::new();
	body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
	body.extend_from_slice(
		b"Content-Disposition: form-data; name=\"file\"; filename=\"backupSessions.zip\"\r\n",
	);
	body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
	body.extend_from_slice(&archive);
	body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

	let request_with_file = Request::builder()
		.method("POST")
		.uri(format!("/api/{SECRET}/restore-sessions"))
		.header(
			header::CONTENT_TYPE,
			format!("multipart/form-data; boundary={boundary}"),
		)
		.body(Body::from(body))
		.unwrap();

	let (status, response_body) = request(server.app.clone(), request_with_file).await;
	assert_eq!(status, StatusCode::OK, "restore failed: {response_body}");

	assert_eq!(
		std::fs::read(server.state.store.token_path("tenant")).unwrap(),
		b"token-bytes"
	);
	assert_eq!(
		std::fs::read(server.state.store.session_dir("tenant").join("Cookies")).unwrap(),
		b"cookie-bytes"
	);
}
