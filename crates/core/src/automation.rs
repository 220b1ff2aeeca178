//! Trait seam for the external browser automation collaborator.
//!
//! The control plane never talks to a browser directly; it asks an
//! [`Automation`] for a per-tenant [`ExecutionContext`] and drives it through
//! this narrow surface: pre-navigation script injection, navigation,
//! expression evaluation, a readiness wait, and a console stream that doubles
//! as the return channel for bridge calls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::AutomationError;

/// A single line emitted on an execution context's console stream.
#[derive(Debug, Clone)]
pub struct ConsoleLine {
    /// Console method kind (`log`, `warning`, `error`, ...).
    pub kind: String,
    /// Joined message text, exactly as the page logged it.
    pub text: String,
}

impl ConsoleLine {
    /// Convenience constructor for a plain `log` line.
    pub fn log(text: impl Into<String>) -> Self {
        Self {
            kind: "log".to_string(),
            text: text.into(),
        }
    }
}

/// Launch parameters for a tenant's browser-backed execution context.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Session name the context belongs to.
    pub session: String,
    /// Persistent profile directory for this session, when configured.
    pub user_data_dir: Option<PathBuf>,
    /// Extra browser launch arguments.
    pub browser_args: Vec<String>,
    /// Whether the browser runs headless.
    pub headless: bool,
    /// Page viewport as (width, height).
    pub viewport: (u32, u32),
    /// User agent override.
    pub user_agent: Option<String>,
}

impl Default for LaunchSpec {
    fn default() -> Self {
        Self {
            session: String::new(),
            user_data_dir: None,
            browser_args: Vec::new(),
            headless: true,
            viewport: (1280, 720),
            user_agent: None,
        }
    }
}

/// Produces browser-backed execution contexts.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Launches a browser and returns a handle to its page-level context.
    async fn create_context(
        &self,
        spec: &LaunchSpec,
    ) -> Result<Arc<dyn ExecutionContext>, AutomationError>;
}

/// Opaque handle to a tenant's running browser page.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    /// Registers a script evaluated in every new document before the page's
    /// own scripts run.
    async fn add_init_script(&self, source: &str) -> Result<(), AutomationError>;

    /// Navigates the context's page, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError>;

    /// Evaluates an expression in the page and returns its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, AutomationError>;

    /// Waits until `expression` evaluates truthy, bounded by `timeout`.
    async fn wait_for(
        &self,
        expression: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError>;

    /// Subscribes to the console stream. The sender side is dropped when the
    /// context is released, which closes all outstanding receivers.
    fn console(&self) -> broadcast::Receiver<ConsoleLine>;

    /// Releases the context and every browser resource behind it. Pending
    /// evaluations are invalidated; no further console lines are delivered.
    async fn close(&self) -> Result<(), AutomationError>;
}
