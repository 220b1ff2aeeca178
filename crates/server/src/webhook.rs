//! Webhook delivery of session lifecycle events.
//!
//! Delivery is best effort: a failing webhook endpoint is logged and never
//! propagates into the session lifecycle.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;
use wabridge::lifecycle::{EventSink, SessionEvent};

pub struct WebhookSink {
	client: reqwest::Client,
	url: Url,
}

impl WebhookSink {
	pub fn new(url: Url) -> Self {
		Self {
			client: reqwest::Client::new(),
			url,
		}
	}
}

#[async_trait]
impl EventSink for WebhookSink {
	async fn emit(&self, session: &str, event: SessionEvent) {
		let mut payload = serde_json::to_value(&event).unwrap_or(Value::Null);
		if let Value::Object(map) = &mut payload {
			map.insert("session".to_string(), json!(session));
		}

		match self.client.post(self.url.clone()).json(&payload).send().await {
			Ok(response) if response.status().is_success() => {
				debug!(target = "wabridge.webhook", session, "event delivered");
			}
			Ok(response) => {
				warn!(
					target = "wabridge.webhook",
					session,
					status = %response.status(),
					"webhook rejected event"
				);
			}
			Err(err) => {
				warn!(target = "wabridge.webhook", session, error = %err, "webhook delivery failed");
			}
		}
	}
}
