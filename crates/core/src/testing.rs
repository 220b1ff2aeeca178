//! In-process fakes for exercising the control plane without a browser.
//!
//! [`ScriptedAutomation`] stands in for the external automation collaborator
//! and hands out [`ScriptedContext`] handles. A scripted context emulates the
//! remote side of the bridge: when it receives a call wrapper it looks up the
//! scripted behavior for the embedded function path and emits the matching
//! tagged console line, exactly as the injected script would.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::automation::{Automation, ConsoleLine, ExecutionContext, LaunchSpec};
use crate::error::AutomationError;
use crate::lifecycle::REMOTE_PRESENT_EXPR;

const RESULT_TAG: &str = "[WA-JS-RESULT]";
const ERROR_TAG: &str = "[WA-JS-ERROR]";

#[derive(Clone, Debug)]
enum BehaviorKind {
    Result(Value),
    Error(String),
    Lines(Vec<String>),
    Never,
}

/// Scripted response for one function path.
#[derive(Clone, Debug)]
pub struct ScriptedBehavior {
    kind: BehaviorKind,
    delay: Option<Duration>,
}

impl ScriptedBehavior {
    /// Emits a tagged success line carrying `value`.
    pub fn result(value: Value) -> Self {
        Self {
            kind: BehaviorKind::Result(value),
            delay: None,
        }
    }

    /// Emits a tagged error line carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BehaviorKind::Error(message.into()),
            delay: None,
        }
    }

    /// Emits the given console lines verbatim, in order.
    pub fn lines(lines: Vec<&str>) -> Self {
        Self {
            kind: BehaviorKind::Lines(lines.into_iter().map(str::to_string).collect()),
            delay: None,
        }
    }

    /// Never emits anything; the caller's timeout decides.
    pub fn never() -> Self {
        Self {
            kind: BehaviorKind::Never,
            delay: None,
        }
    }

    /// Delays emission by `delay`.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Fake execution context with scripted remote behavior.
pub struct ScriptedContext {
    console_tx: broadcast::Sender<ConsoleLine>,
    behaviors: Mutex<HashMap<String, ScriptedBehavior>>,
    eval_results: Mutex<HashMap<String, Value>>,
    init_scripts: Mutex<Vec<String>>,
    visited: Mutex<Vec<String>>,
    evaluations: Mutex<Vec<String>>,
    marker_present: Mutex<bool>,
    ready: Mutex<bool>,
    closed: Mutex<bool>,
}

impl ScriptedContext {
    pub fn new() -> Self {
        let (console_tx, _) = broadcast::channel(256);
        Self {
            console_tx,
            behaviors: Mutex::new(HashMap::new()),
            eval_results: Mutex::new(HashMap::new()),
            init_scripts: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
            evaluations: Mutex::new(Vec::new()),
            marker_present: Mutex::new(true),
            ready: Mutex::new(true),
            closed: Mutex::new(false),
        }
    }

    /// Registers the remote behavior for `function_path`.
    pub fn script(&self, function_path: &str, behavior: ScriptedBehavior) {
        self.behaviors
            .lock()
            .insert(function_path.to_string(), behavior);
    }

    /// Sets the result returned for a plain (non-call) expression.
    pub fn set_eval_result(&self, expression: &str, result: Value) {
        self.eval_results
            .lock()
            .insert(expression.to_string(), result);
    }

    /// Controls whether the remote root is present after navigation. When
    /// `false`, the pre-navigation injection is treated as lost and only a
    /// direct re-evaluation of the script makes the marker appear.
    pub fn set_marker_present(&self, present: bool) {
        *self.marker_present.lock() = present;
    }

    /// Controls whether readiness waits succeed.
    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock() = ready;
    }

    /// Emits a raw console line, as the page itself would.
    pub fn push_console_line(&self, text: &str) {
        let _ = self.console_tx.send(ConsoleLine::log(text));
    }

    /// Scripts registered via [`add_init_script`](ExecutionContext::add_init_script).
    pub fn init_scripts(&self) -> Vec<String> {
        self.init_scripts.lock().clone()
    }

    /// URLs navigated to.
    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }

    /// Every expression passed to [`evaluate`](ExecutionContext::evaluate).
    pub fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    fn emit(&self, lines: Vec<String>, delay: Option<Duration>) {
        match delay {
            None => {
                for line in lines {
                    let _ = self.console_tx.send(ConsoleLine::log(line));
                }
            }
            Some(delay) => {
                let tx = self.console_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for line in lines {
                        let _ = tx.send(ConsoleLine::log(line));
                    }
                });
            }
        }
    }

    fn run_scripted_call(&self, function_path: &str) {
        let behavior = self.behaviors.lock().get(function_path).cloned();
        let Some(behavior) = behavior else {
            self.emit(
                vec![format!(
                    "{ERROR_TAG} {function_path}: path not found: {function_path}"
                )],
                None,
            );
            return;
        };

        let lines = match behavior.kind {
            BehaviorKind::Result(value) => {
                vec![format!("{RESULT_TAG} {function_path}: {value}")]
            }
            BehaviorKind::Error(message) => {
                vec![format!("{ERROR_TAG} {function_path}: {message}")]
            }
            BehaviorKind::Lines(lines) => lines,
            BehaviorKind::Never => return,
        };
        self.emit(lines, behavior.delay);
    }
}

impl Default for ScriptedContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the function path embedded in a call wrapper expression.
fn wrapper_path(expression: &str) -> Option<&str> {
    if !expression.contains(RESULT_TAG) {
        return None;
    }
    let rest = expression.split_once("const path = \"")?.1;
    rest.split_once('"').map(|(path, _)| path)
}

#[async_trait]
impl ExecutionContext for ScriptedContext {
    async fn add_init_script(&self, source: &str) -> Result<(), AutomationError> {
        if self.is_closed() {
            return Err(AutomationError::Closed);
        }
        self.init_scripts.lock().push(source.to_string());
        Ok(())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), AutomationError> {
        if self.is_closed() {
            return Err(AutomationError::Closed);
        }
        self.visited.lock().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AutomationError> {
        if self.is_closed() {
            return Err(AutomationError::Closed);
        }
        self.evaluations.lock().push(expression.to_string());

        if let Some(path) = wrapper_path(expression) {
            let path = path.to_string();
            self.run_scripted_call(&path);
            return Ok(Value::Null);
        }

        if expression == REMOTE_PRESENT_EXPR {
            return Ok(Value::Bool(*self.marker_present.lock()));
        }

        // Re-evaluating a previously registered init script installs the
        // remote root, mirroring the real fallback injection.
        if self.init_scripts.lock().iter().any(|s| s == expression) {
            *self.marker_present.lock() = true;
            return Ok(Value::Null);
        }

        Ok(self
            .eval_results
            .lock()
            .get(expression)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for(
        &self,
        _expression: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        if self.is_closed() {
            return Err(AutomationError::Closed);
        }
        if *self.ready.lock() {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(AutomationError::Timeout(timeout))
        }
    }

    fn console(&self) -> broadcast::Receiver<ConsoleLine> {
        self.console_tx.subscribe()
    }

    async fn close(&self) -> Result<(), AutomationError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Fake automation collaborator producing [`ScriptedContext`] handles.
#[derive(Default)]
pub struct ScriptedAutomation {
    scripts: Mutex<Vec<(String, ScriptedBehavior)>>,
    contexts: Mutex<Vec<Arc<ScriptedContext>>>,
    created: AtomicUsize,
    create_delay: Mutex<Option<Duration>>,
    fail_create: Mutex<Option<String>>,
    marker_present: Mutex<bool>,
    ready: Mutex<bool>,
}

impl ScriptedAutomation {
    pub fn new() -> Self {
        Self {
            marker_present: Mutex::new(true),
            ready: Mutex::new(true),
            ..Self::default()
        }
    }

    /// Behavior applied to every context this automation creates.
    pub fn script(&self, function_path: &str, behavior: ScriptedBehavior) {
        self.scripts
            .lock()
            .push((function_path.to_string(), behavior));
    }

    /// Suspends context creation by `delay`, widening race windows in tests.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    /// Makes every subsequent context creation fail with `message`.
    pub fn fail_create(&self, message: &str) {
        *self.fail_create.lock() = Some(message.to_string());
    }

    /// Marker presence applied to every created context.
    pub fn set_marker_present(&self, present: bool) {
        *self.marker_present.lock() = present;
    }

    /// Readiness applied to every created context.
    pub fn set_ready(&self, ready: bool) {
        *self.ready.lock() = ready;
    }

    /// Number of contexts created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Handles of every created context, in creation order.
    pub fn contexts(&self) -> Vec<Arc<ScriptedContext>> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl Automation for ScriptedAutomation {
    async fn create_context(
        &self,
        _spec: &LaunchSpec,
    ) -> Result<Arc<dyn ExecutionContext>, AutomationError> {
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.fail_create.lock().clone() {
            return Err(AutomationError::Launch(message));
        }

        let context = Arc::new(ScriptedContext::new());
        context.set_marker_present(*self.marker_present.lock());
        context.set_ready(*self.ready.lock());
        for (path, behavior) in self.scripts.lock().iter() {
            context.script(path, behavior.clone());
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());
        Ok(context)
    }
}
