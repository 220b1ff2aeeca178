//! Session lifecycle orchestration.
//!
//! [`SessionController`] owns every state transition a session goes through:
//! `CLOSED -> INITIALIZING -> CONNECTED`, with `CLOSED` reachable from any
//! state on fatal error and `QRCODE` surfaced while the remote side awaits
//! pairing. Creation asks the automation collaborator for a browser-backed
//! execution context, injects the remote script before the target page loads
//! (falling back to direct evaluation when the pre-load hook lost the race),
//! waits for the script's readiness signal, attaches the console forwarder,
//! probes authentication state through the bridge, and publishes the record.
//!
//! A failure anywhere in that sequence lands the session back in `CLOSED`
//! with `last_error` populated and the partially-created context released;
//! a session is never left dangling in `INITIALIZING`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::automation::{Automation, ExecutionContext, LaunchSpec};
use crate::bridge::{self, DEFAULT_CALL_TIMEOUT};
use crate::error::{AutomationError, SessionError};
use crate::registry::{SessionRegistry, SessionState};
use crate::storage::SessionStore;

/// Page the execution context is pointed at.
pub const DEFAULT_TARGET_URL: &str = "https://web.whatsapp.com/";

/// Expression checking that the remote root namespace exists at all.
pub const REMOTE_PRESENT_EXPR: &str = "typeof window.WPP !== 'undefined'";

/// Expression checking that the remote script finished loading.
pub const READY_EXPR: &str = "window.WPP && window.WPP.isReady === true";

const QR_TAG: &str = "[WA-JS-QR]";

/// Installs a pairing-code forwarder that logs each fresh code behind the
/// tag the console forwarder captures.
const QR_LISTENER_EXPR: &str = r#"(() => {
  if (window.WPP && typeof window.WPP.on === 'function' && !window.__wabridgeQrForwarder) {
    window.__wabridgeQrForwarder = true;
    window.WPP.on('conn.auth_code_change', (authCode) => {
      console.log('[WA-JS-QR] ' + ((authCode && authCode.fullCode) || String(authCode)));
    });
  }
})()"#;

/// Lifecycle notification delivered to the configured sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    StatusChange { state: SessionState },
    QrCode { code: String },
}

/// Receives session lifecycle notifications. Webhook delivery lives behind
/// this seam; delivery failures must never propagate into the lifecycle.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, session: &str, event: SessionEvent);
}

/// Controller configuration shared by every session.
#[derive(Clone)]
pub struct ControllerOptions {
    /// URL of the third-party web application.
    pub target_url: String,
    /// Source of the remote script injected into every context.
    pub remote_script: Arc<str>,
    /// Bound on the readiness wait.
    pub readiness_timeout: Duration,
    /// Bound on target-page navigation.
    pub navigation_timeout: Duration,
    /// Extra browser launch arguments.
    pub browser_args: Vec<String>,
    /// Whether contexts run headless.
    pub headless: bool,
    /// User agent override applied to every context.
    pub user_agent: Option<String>,
    /// Page viewport as (width, height).
    pub viewport: (u32, u32),
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            remote_script: Arc::from(""),
            readiness_timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            browser_args: Vec::new(),
            headless: true,
            user_agent: None,
            viewport: (1280, 720),
        }
    }
}

/// Orchestrates session creation, reuse, and teardown.
pub struct SessionController {
    registry: Arc<SessionRegistry>,
    automation: Arc<dyn Automation>,
    options: ControllerOptions,
    store: Option<SessionStore>,
    events: Option<Arc<dyn EventSink>>,
}

impl SessionController {
    pub fn new(
        registry: Arc<SessionRegistry>,
        automation: Arc<dyn Automation>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            registry,
            automation,
            options,
            store: None,
            events: None,
        }
    }

    /// Enables per-session on-disk profile directories.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Enables lifecycle notifications.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Ensures a connected session exists for `name`, creating one if absent.
    ///
    /// Idempotent under concurrency: the `CLOSED -> INITIALIZING` claim is a
    /// single atomic registry mutation, so of any number of simultaneous
    /// callers exactly one creates the underlying context; the rest observe
    /// the current state and return immediately.
    pub async fn ensure_connected(
        &self,
        name: &str,
        config: Value,
    ) -> Result<SessionState, SessionError> {
        let claimed = self.registry.upsert(name, |record| {
            if record.state != SessionState::Closed {
                return false;
            }
            record.state = SessionState::Initializing;
            record.config = config.clone();
            record.last_error = None;
            record.created_at = crate::now_ts();
            true
        });

        if !claimed {
            let state = self.registry.state(name).unwrap_or_default();
            debug!(target = "wabridge.session", session = %name, %state, "already active, skipping initialization");
            return Ok(state);
        }

        info!(target = "wabridge.session", session = %name, "initializing session");
        match self.initialize(name).await {
            Ok(state) => Ok(state),
            Err(err) => {
                warn!(target = "wabridge.session", session = %name, error = %err, "session initialization failed");
                self.registry.upsert(name, |record| {
                    record.state = SessionState::Closed;
                    record.last_error = Some(err.to_string());
                    record.context = None;
                });
                self.notify(name, SessionEvent::StatusChange {
                    state: SessionState::Closed,
                })
                .await;
                Err(err)
            }
        }
    }

    async fn initialize(&self, name: &str) -> Result<SessionState, SessionError> {
        let user_data_dir = match &self.store {
            Some(store) => Some(store.create_session_dir(name)?),
            None => None,
        };
        let spec = LaunchSpec {
            session: name.to_string(),
            user_data_dir,
            browser_args: self.options.browser_args.clone(),
            headless: self.options.headless,
            viewport: self.options.viewport,
            user_agent: self.options.user_agent.clone(),
        };

        let context = self.automation.create_context(&spec).await?;
        match self.bring_up(name, context.clone()).await {
            Ok(state) => Ok(state),
            Err(err) => {
                // Release the partially-created context before reporting.
                if let Err(close_err) = context.close().await {
                    warn!(target = "wabridge.session", session = %name, error = %close_err, "failed to release partial context");
                }
                Err(err)
            }
        }
    }

    async fn bring_up(
        &self,
        name: &str,
        context: Arc<dyn ExecutionContext>,
    ) -> Result<SessionState, SessionError> {
        // Inject before navigation to win the race against the page's own
        // load sequence.
        context.add_init_script(&self.options.remote_script).await?;
        context
            .goto(&self.options.target_url, self.options.navigation_timeout)
            .await?;

        let present = context
            .evaluate(REMOTE_PRESENT_EXPR)
            .await?
            .as_bool()
            .unwrap_or(false);
        if !present {
            debug!(target = "wabridge.session", session = %name, "pre-load injection missed, re-injecting directly");
            context.evaluate(&self.options.remote_script).await?;
            let verified = context
                .evaluate(REMOTE_PRESENT_EXPR)
                .await?
                .as_bool()
                .unwrap_or(false);
            if !verified {
                return Err(SessionError::Inject(
                    "remote root missing after direct evaluation".to_string(),
                ));
            }
        }

        // The forwarder must be listening before the session is declared
        // ready, or early pairing events would be lost.
        self.attach_console_forwarder(name, context.console());

        context
            .wait_for(READY_EXPR, self.options.readiness_timeout)
            .await
            .map_err(|err| match err {
                AutomationError::Timeout(_) => SessionError::ReadinessTimeout,
                other => SessionError::from(other),
            })?;

        let inflight = self.registry.upsert(name, |record| {
            record.context = Some(context.clone());
            record.inflight.clone()
        });

        let authenticated = match bridge::invoke(
            context.as_ref(),
            &inflight,
            "conn.isAuthenticated",
            &[],
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) => {
                debug!(target = "wabridge.session", session = %name, error = %err, "auth probe failed, assuming unpaired");
                false
            }
        };

        if !authenticated {
            self.registry
                .upsert(name, |record| record.state = SessionState::QrCode);
            self.notify(name, SessionEvent::StatusChange {
                state: SessionState::QrCode,
            })
            .await;

            if let Err(err) = context.evaluate(QR_LISTENER_EXPR).await {
                debug!(target = "wabridge.session", session = %name, error = %err, "pairing forwarder install failed");
            }
            match bridge::invoke(
                context.as_ref(),
                &inflight,
                "conn.getQrCode",
                &[],
                DEFAULT_CALL_TIMEOUT,
            )
            .await
            {
                Ok(Value::Null) => {}
                Ok(value) => {
                    let code = match value {
                        Value::String(code) => code,
                        other => other.to_string(),
                    };
                    self.registry
                        .upsert(name, |record| record.qr_code = Some(code.clone()));
                    self.notify(name, SessionEvent::QrCode { code }).await;
                }
                Err(err) => {
                    debug!(target = "wabridge.session", session = %name, error = %err, "pairing code fetch failed");
                }
            }
        }

        self.registry
            .upsert(name, |record| record.state = SessionState::Connected);
        self.notify(name, SessionEvent::StatusChange {
            state: SessionState::Connected,
        })
        .await;
        info!(target = "wabridge.session", session = %name, "session connected");
        Ok(SessionState::Connected)
    }

    /// Forwards console lines to tracing and captures pairing codes.
    fn attach_console_forwarder(
        &self,
        name: &str,
        mut receiver: broadcast::Receiver<crate::automation::ConsoleLine>,
    ) {
        let registry = self.registry.clone();
        let events = self.events.clone();
        let session = name.to_string();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(line) => {
                        if let Some(code) = line.text.strip_prefix(QR_TAG) {
                            let code = code.trim().to_string();
                            registry.upsert(&session, |record| {
                                record.qr_code = Some(code.clone());
                            });
                            if let Some(events) = &events {
                                events
                                    .emit(&session, SessionEvent::QrCode { code })
                                    .await;
                            }
                        } else {
                            debug!(
                                target = "wabridge.browser.console",
                                session = %session,
                                kind = %line.kind,
                                text = %line.text,
                                "browser console"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(dropped)) => {
                        warn!(target = "wabridge.browser.console", session = %session, dropped, "console forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Closes a session: releases its execution context, then removes the
    /// record. Safe to call on an already-closed or absent session.
    pub async fn close(&self, name: &str) -> Result<(), SessionError> {
        if self.registry.get(name).is_none() {
            return Ok(());
        }

        let context = self.registry.upsert(name, |record| {
            record.state = SessionState::Closed;
            record.context.take()
        });
        if let Some(context) = context {
            if let Err(err) = context.close().await {
                warn!(target = "wabridge.session", session = %name, error = %err, "context release failed");
            }
        }
        self.registry.remove(name);
        self.notify(name, SessionEvent::StatusChange {
            state: SessionState::Closed,
        })
        .await;
        info!(target = "wabridge.session", session = %name, "session closed");
        Ok(())
    }

    /// Logs the remote side out, closes the session, and deletes its on-disk
    /// data.
    pub async fn logout(&self, name: &str) -> Result<(), SessionError> {
        if let Some(record) = self.registry.get(name) {
            if let Some(context) = &record.context {
                if let Err(err) = bridge::invoke(
                    context.as_ref(),
                    &record.inflight,
                    "conn.logout",
                    &[],
                    DEFAULT_CALL_TIMEOUT,
                )
                .await
                {
                    debug!(target = "wabridge.session", session = %name, error = %err, "remote logout failed");
                }
            }
        }

        self.close(name).await?;
        if let Some(store) = &self.store {
            store.remove_session(name).await?;
        }
        Ok(())
    }

    /// Closes every registered session.
    pub async fn close_all(&self) {
        for name in self.registry.names() {
            if let Err(err) = self.close(&name).await {
                warn!(target = "wabridge.session", session = %name, error = %err, "close failed");
            }
        }
    }

    async fn notify(&self, session: &str, event: SessionEvent) {
        if let Some(events) = &self.events {
            events.emit(session, event).await;
        }
    }
}
