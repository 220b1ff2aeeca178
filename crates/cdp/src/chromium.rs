//! Chromium process launch and page-level automation.
//!
//! Each execution context owns one Chromium process launched with a
//! per-session profile directory and `--remote-debugging-port=0`; the actual
//! endpoint is discovered from the `DevToolsActivePort` file the browser
//! writes into the profile. The first page target is attached with a flat
//! session and driven through the `Page`/`Runtime`/`Emulation` domains.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use wabridge::automation::{Automation, ConsoleLine, ExecutionContext, LaunchSpec};
use wabridge::error::AutomationError;

use crate::connection::{CdpEvent, Connection};
use crate::error::CdpError;

/// Launch arguments applied when the caller supplies none.
const DEFAULT_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
];

const ENDPOINT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Chromium-backed automation collaborator.
pub struct Chromium {
    executable: PathBuf,
}

impl Chromium {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

#[async_trait]
impl Automation for Chromium {
    async fn create_context(
        &self,
        spec: &LaunchSpec,
    ) -> Result<Arc<dyn ExecutionContext>, AutomationError> {
        let user_data_dir = match &spec.user_data_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!(
                "wabridge-{}-{}",
                spec.session,
                std::process::id()
            )),
        };
        std::fs::create_dir_all(&user_data_dir)
            .map_err(|err| AutomationError::Launch(err.to_string()))?;

        let args = build_args(spec, &user_data_dir);
        info!(
            target = "wabridge.cdp",
            session = %spec.session,
            executable = %self.executable.display(),
            "launching browser"
        );
        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AutomationError::Launch(err.to_string()))?;

        match bring_up(&user_data_dir, spec).await {
            Ok((connection, session_id, target_id, console_tx)) => {
                Ok(Arc::new(ChromiumContext {
                    connection,
                    session_id,
                    target_id,
                    child: Mutex::new(Some(child)),
                    console_tx,
                    closed: AtomicBool::new(false),
                }))
            }
            Err(err) => {
                let _ = child.start_kill();
                Err(AutomationError::Launch(err.to_string()))
            }
        }
    }
}

async fn bring_up(
    user_data_dir: &Path,
    spec: &LaunchSpec,
) -> Result<(Arc<Connection>, String, String, broadcast::Sender<ConsoleLine>), CdpError> {
    let endpoint = discover_endpoint(user_data_dir).await?;
    let connection = Connection::connect(&endpoint).await?;

    // Reuse the initial blank tab instead of opening a second one.
    let targets = connection
        .send(None, "Target.getTargets", json!({}))
        .await?;
    let target_id = targets["targetInfos"]
        .as_array()
        .and_then(|infos| {
            infos
                .iter()
                .find(|info| info["type"] == "page")
                .and_then(|info| info["targetId"].as_str())
        })
        .map(str::to_string);
    let target_id = match target_id {
        Some(id) => id,
        None => {
            let created = connection
                .send(None, "Target.createTarget", json!({"url": "about:blank"}))
                .await?;
            created["targetId"]
                .as_str()
                .ok_or_else(|| CdpError::Protocol {
                    method: "Target.createTarget".to_string(),
                    message: "no targetId in response".to_string(),
                })?
                .to_string()
        }
    };

    let attached = connection
        .send(
            None,
            "Target.attachToTarget",
            json!({"targetId": target_id, "flatten": true}),
        )
        .await?;
    let session_id = attached["sessionId"]
        .as_str()
        .ok_or_else(|| CdpError::Protocol {
            method: "Target.attachToTarget".to_string(),
            message: "no sessionId in response".to_string(),
        })?
        .to_string();

    connection.send(Some(&session_id), "Page.enable", json!({})).await?;
    connection
        .send(Some(&session_id), "Runtime.enable", json!({}))
        .await?;
    connection
        .send(
            Some(&session_id),
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": spec.viewport.0,
                "height": spec.viewport.1,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
    if let Some(user_agent) = &spec.user_agent {
        connection
            .send(
                Some(&session_id),
                "Emulation.setUserAgentOverride",
                json!({"userAgent": user_agent}),
            )
            .await?;
    }

    let (console_tx, _) = broadcast::channel(256);
    spawn_console_pump(connection.events(), session_id.clone(), console_tx.clone());

    Ok((connection, session_id, target_id, console_tx))
}

/// Polls for the `DevToolsActivePort` file and assembles the WebSocket URL.
async fn discover_endpoint(user_data_dir: &Path) -> Result<String, CdpError> {
    let path = user_data_dir.join("DevToolsActivePort");
    let deadline = tokio::time::Instant::now() + ENDPOINT_DISCOVERY_TIMEOUT;

    loop {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Some(endpoint) = parse_active_port(&contents) {
                debug!(target = "wabridge.cdp", %endpoint, "devtools endpoint discovered");
                return Ok(endpoint);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(CdpError::Timeout("DevToolsActivePort".to_string()));
        }
        tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;
    }
}

fn parse_active_port(contents: &str) -> Option<String> {
    let mut lines = contents.lines();
    let port: u16 = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim();
    if path.is_empty() {
        return None;
    }
    Some(format!("ws://127.0.0.1:{port}{path}"))
}

fn build_args(spec: &LaunchSpec, user_data_dir: &Path) -> Vec<String> {
    let mut args: Vec<String> = if spec.browser_args.is_empty() {
        DEFAULT_ARGS.iter().map(|a| a.to_string()).collect()
    } else {
        spec.browser_args.clone()
    };
    if spec.headless {
        args.push("--headless=new".to_string());
    }
    args.push("--remote-debugging-port=0".to_string());
    args.push(format!("--user-data-dir={}", user_data_dir.display()));
    args.push("about:blank".to_string());
    args
}

fn spawn_console_pump(
    mut events: broadcast::Receiver<CdpEvent>,
    session_id: String,
    console_tx: broadcast::Sender<ConsoleLine>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.method != "Runtime.consoleAPICalled"
                        || event.session_id.as_deref() != Some(session_id.as_str())
                    {
                        continue;
                    }
                    let kind = event.params["type"].as_str().unwrap_or("log").to_string();
                    let text = join_console_args(&event.params["args"]);
                    let _ = console_tx.send(ConsoleLine { kind, text });
                }
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    warn!(target = "wabridge.cdp", dropped, "console pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Joins console call arguments the way the browser's console would, with a
/// single space between rendered values.
fn join_console_args(args: &Value) -> String {
    let Some(args) = args.as_array() else {
        return String::new();
    };
    args.iter()
        .map(|arg| match &arg["value"] {
            Value::String(text) => text.clone(),
            Value::Null => arg["description"].as_str().unwrap_or("").to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execution context backed by one Chromium process.
pub struct ChromiumContext {
    connection: Arc<Connection>,
    session_id: String,
    target_id: String,
    child: Mutex<Option<Child>>,
    console_tx: broadcast::Sender<ConsoleLine>,
    closed: AtomicBool,
}

impl ChromiumContext {
    fn guard_open(&self) -> Result<(), AutomationError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(AutomationError::Closed)
        } else {
            Ok(())
        }
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value, AutomationError> {
        self.guard_open()?;
        self.connection
            .send(Some(&self.session_id), method, params)
            .await
            .map_err(|err| match err {
                CdpError::ConnectionClosed => AutomationError::Closed,
                CdpError::Timeout(what) => {
                    AutomationError::Evaluation(format!("timeout waiting for {what}"))
                }
                other => AutomationError::Evaluation(other.to_string()),
            })
    }
}

#[async_trait]
impl ExecutionContext for ChromiumContext {
    async fn add_init_script(&self, source: &str) -> Result<(), AutomationError> {
        self.command(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({"source": source}),
        )
        .await?;
        Ok(())
    }

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        self.guard_open()?;
        // Subscribe before navigating so the DOM-content event cannot slip by.
        let mut events = self.connection.events();

        let result = self.command("Page.navigate", json!({"url": url})).await?;
        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(AutomationError::Navigation(format!("{url}: {error_text}")));
            }
        }

        let waiter = async {
            loop {
                match events.recv().await {
                    Ok(event)
                        if event.method == "Page.domContentEventFired"
                            && event.session_id.as_deref() == Some(self.session_id.as_str()) =>
                    {
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(AutomationError::Closed);
                    }
                }
            }
        };
        match tokio::time::timeout(timeout, waiter).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AutomationError::Navigation(format!(
                "{url}: no DOM content event within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AutomationError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown exception");
            return Err(AutomationError::Evaluation(message.to_string()));
        }
        Ok(result["result"]["value"].clone())
    }

    async fn wait_for(
        &self,
        expression: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let value = self.evaluate(expression).await?;
            if value.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AutomationError::Timeout(timeout));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn console(&self) -> broadcast::Receiver<ConsoleLine> {
        self.console_tx.subscribe()
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(target = "wabridge.cdp", target_id = %self.target_id, "closing browser");

        let _ = self
            .connection
            .send(None, "Browser.close", json!({}))
            .await;

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(target = "wabridge.cdp", "browser did not exit, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_port_file_parses_into_endpoint() {
        let endpoint = parse_active_port("9222\n/devtools/browser/abc-123\n").unwrap();
        assert_eq!(endpoint, "ws://127.0.0.1:9222/devtools/browser/abc-123");

        assert!(parse_active_port("").is_none());
        assert!(parse_active_port("not-a-port\n/devtools/browser/x").is_none());
        assert!(parse_active_port("9222\n").is_none());
    }

    #[test]
    fn default_args_apply_only_when_caller_provides_none() {
        let spec = LaunchSpec {
            session: "tenant".to_string(),
            headless: true,
            ..LaunchSpec::default()
        };
        let args = build_args(&spec, Path::new("/tmp/profile"));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));

        let spec = LaunchSpec {
            session: "tenant".to_string(),
            browser_args: vec!["--custom-flag".to_string()],
            headless: false,
            ..LaunchSpec::default()
        };
        let args = build_args(&spec, Path::new("/tmp/profile"));
        assert!(args.contains(&"--custom-flag".to_string()));
        assert!(!args.contains(&"--no-sandbox".to_string()));
        assert!(!args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn console_args_join_with_spaces() {
        let args = json!([
            {"type": "string", "value": "[WA-JS-RESULT] chat.list:"},
            {"type": "string", "value": "[1,2]"}
        ]);
        assert_eq!(join_console_args(&args), "[WA-JS-RESULT] chat.list: [1,2]");

        let args = json!([
            {"type": "number", "value": 42},
            {"type": "object", "description": "Object"}
        ]);
        assert_eq!(join_console_args(&args), "42 Object");
    }
}
