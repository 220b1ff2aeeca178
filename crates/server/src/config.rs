use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use url::Url;
use wabridge::lifecycle::ControllerOptions;
use wabridge::storage::SessionStore;

/// Fully owned server configuration, populated from flags and environment.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
	/// Shared secret used to derive and verify bearer tokens.
	#[arg(long, env = "WABRIDGE_SECRET_KEY")]
	pub secret_key: String,

	/// Address the HTTP listener binds to.
	#[arg(long, env = "WABRIDGE_HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Port the HTTP listener binds to.
	#[arg(long, env = "WABRIDGE_PORT", default_value_t = 21465)]
	pub port: u16,

	/// Webhook receiving QR-code and status-change events.
	#[arg(long, env = "WABRIDGE_WEBHOOK_URL")]
	pub webhook_url: Option<Url>,

	/// Base directory holding one browser profile per session.
	#[arg(long, env = "WABRIDGE_USER_DATA_DIR", default_value = "./userDataDir")]
	pub user_data_dir: PathBuf,

	/// Directory holding per-session token data files.
	#[arg(long, env = "WABRIDGE_TOKENS_DIR", default_value = "./tokens")]
	pub tokens_dir: PathBuf,

	/// Bridge script injected into every session's page.
	#[arg(long, env = "WABRIDGE_REMOTE_SCRIPT")]
	pub remote_script: PathBuf,

	/// Browser executable launched for each session.
	#[arg(long, env = "WABRIDGE_BROWSER_PATH", default_value = "chromium")]
	pub browser_path: PathBuf,

	/// Extra browser launch argument (repeatable); replaces the defaults.
	#[arg(long = "browser-arg", value_name = "ARG", allow_hyphen_values = true)]
	pub browser_args: Vec<String>,

	/// Run browsers with a visible window.
	#[arg(long)]
	pub headful: bool,

	/// Bound on the remote script readiness wait, in seconds.
	#[arg(long, env = "WABRIDGE_READINESS_TIMEOUT", default_value_t = 30)]
	pub readiness_timeout_secs: u64,
}

impl ServerConfig {
	/// Socket address for the HTTP listener.
	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	/// Base URL callers reach this server under, for callback examples.
	pub fn api_base(&self) -> String {
		format!("http://{}:{}/api", self.host, self.port)
	}

	/// Session storage layout rooted at the configured base paths.
	pub fn store(&self) -> SessionStore {
		SessionStore::new(&self.user_data_dir, &self.tokens_dir)
	}

	/// Lifecycle controller options carrying the loaded remote script.
	pub fn controller_options(&self, remote_script: Arc<str>) -> ControllerOptions {
		ControllerOptions {
			remote_script,
			readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
			browser_args: self.browser_args.clone(),
			headless: !self.headful,
			..ControllerOptions::default()
		}
	}
}
