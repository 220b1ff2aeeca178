use std::sync::Arc;

use wabridge::automation::Automation;
use wabridge::bridge::BridgeInvoker;
use wabridge::lifecycle::{EventSink, SessionController};
use wabridge::registry::{SessionRecord, SessionRegistry, SessionState};
use wabridge::storage::SessionStore;
use wabridge::token::TokenService;

use crate::config::ServerConfig;
use crate::error::ApiError;

/// Shared application state wired at startup and injected into handlers.
pub struct AppState {
	pub config: ServerConfig,
	pub tokens: TokenService,
	pub registry: Arc<SessionRegistry>,
	pub controller: Arc<SessionController>,
	pub bridge: BridgeInvoker,
	pub store: SessionStore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
	/// Assembles the control plane around the given automation backend.
	pub fn new(
		config: ServerConfig,
		automation: Arc<dyn Automation>,
		remote_script: Arc<str>,
		events: Option<Arc<dyn EventSink>>,
	) -> Self {
		let registry = Arc::new(SessionRegistry::new());
		let store = config.store();

		let mut controller = SessionController::new(
			registry.clone(),
			automation,
			config.controller_options(remote_script),
		)
		.with_store(store.clone());
		if let Some(events) = events {
			controller = controller.with_events(events);
		}

		Self {
			tokens: TokenService::new(&config.secret_key),
			bridge: BridgeInvoker::new(registry.clone()),
			controller: Arc::new(controller),
			registry,
			store,
			config,
		}
	}

	/// Guard for operation routes: the session must exist and hold a live
	/// execution context.
	pub fn require_active(&self, session: &str) -> Result<SessionRecord, ApiError> {
		match self.registry.get(session) {
			Some(record) if record.state != SessionState::Closed && record.context.is_some() => {
				Ok(record)
			}
			_ => Err(ApiError::Disconnected),
		}
	}

	/// Guard for secret-key protected administrative routes.
	pub fn require_secret(&self, presented: &str) -> Result<(), ApiError> {
		if presented == self.config.secret_key {
			Ok(())
		} else {
			Err(ApiError::Unauthorized("the secret key is incorrect".to_string()))
		}
	}
}
