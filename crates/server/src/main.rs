use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use wabridge_cdp::Chromium;
use wabridge::lifecycle::EventSink;
use wabridge_server::state::{AppState, SharedState};
use wabridge_server::webhook::WebhookSink;
use wabridge_server::{cli::Cli, logging, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);
	let config = cli.config;

	let remote_script: Arc<str> = std::fs::read_to_string(&config.remote_script)
		.with_context(|| {
			format!(
				"failed to read remote script: {}",
				config.remote_script.display()
			)
		})?
		.into();

	let automation = Arc::new(Chromium::new(&config.browser_path));
	let events = config
		.webhook_url
		.clone()
		.map(|url| Arc::new(WebhookSink::new(url)) as Arc<dyn EventSink>);

	let bind_addr = config.bind_addr();
	let state = Arc::new(AppState::new(config, automation, remote_script, events));
	state.store.ensure_base_dirs()?;

	let app = routes::router(state.clone());
	let listener = tokio::net::TcpListener::bind(&bind_addr)
		.await
		.with_context(|| format!("failed to bind {bind_addr}"))?;
	info!(target = "wabridge", addr = %bind_addr, "listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal(state))
		.await?;
	Ok(())
}

async fn shutdown_signal(state: SharedState) {
	let _ = tokio::signal::ctrl_c().await;
	info!(target = "wabridge", "shutting down, closing sessions");
	state.controller.close_all().await;
}
