//! DevTools message correlation.
//!
//! Commands carry a unique id and are completed through a pending map of
//! oneshot channels; everything without an id is an event and is fanned out
//! on a broadcast channel. The read loop holds only a weak reference to the
//! connection so dropping the last strong handle tears the tasks down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{CdpError, Result};
use crate::transport;

/// Bound on a single command round-trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Protocol event delivered by the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub session_id: Option<String>,
    pub params: Value,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<IncomingError>,
    method: Option<String>,
    params: Option<Value>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingError {
    message: String,
}

type PendingSender = oneshot::Sender<Result<Value>>;

/// One DevTools WebSocket connection shared by every target session on it.
pub struct Connection {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingSender>>,
    outgoing: mpsc::UnboundedSender<String>,
    events: broadcast::Sender<CdpEvent>,
}

impl Connection {
    /// Connects to a DevTools endpoint and spawns the read/write loops.
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let stream = transport::connect(url).await?;
        let (mut sink, mut source) = stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (events_tx, _) = broadcast::channel(512);

        let connection = Arc::new(Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            outgoing: outgoing_tx,
            events: events_tx,
        });

        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let weak = Arc::downgrade(&connection);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let Some(connection) = weak.upgrade() else {
                    break;
                };
                match frame {
                    Ok(Message::Text(text)) => connection.dispatch(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!(target = "wabridge.cdp", error = %err, "read loop terminated");
                        break;
                    }
                }
            }
            if let Some(connection) = weak.upgrade() {
                connection.fail_pending();
            }
        });

        Ok(connection)
    }

    /// Sends a command, optionally scoped to a target session, and awaits
    /// its correlated response.
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            payload["sessionId"] = json!(session_id);
        }

        trace!(target = "wabridge.cdp", %method, id, "send");
        if self.outgoing.send(payload.to_string()).is_err() {
            self.pending.lock().remove(&id);
            return Err(CdpError::ConnectionClosed);
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(method.to_string()))
            }
        }
    }

    /// Subscribes to protocol events.
    pub fn events(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    fn dispatch(&self, text: &str) {
        let incoming: Incoming = match serde_json::from_str(text) {
            Ok(incoming) => incoming,
            Err(err) => {
                warn!(target = "wabridge.cdp", error = %err, "unparseable frame");
                return;
            }
        };

        match incoming.id {
            Some(id) => {
                let Some(sender) = self.pending.lock().remove(&id) else {
                    // Late response for a caller that already timed out.
                    trace!(target = "wabridge.cdp", id, "dropping uncorrelated response");
                    return;
                };
                let outcome = match incoming.error {
                    Some(error) => Err(CdpError::Protocol {
                        method: format!("command #{id}"),
                        message: error.message,
                    }),
                    None => Ok(incoming.result.unwrap_or(Value::Null)),
                };
                let _ = sender.send(outcome);
            }
            None => {
                if let Some(method) = incoming.method {
                    let _ = self.events.send(CdpEvent {
                        method,
                        session_id: incoming.session_id,
                        params: incoming.params.unwrap_or(Value::Null),
                    });
                }
            }
        }
    }

    fn fail_pending(&self) {
        let pending: Vec<PendingSender> = {
            let mut map = self.pending.lock();
            map.drain().map(|(_, sender)| sender).collect()
        };
        for sender in pending {
            let _ = sender.send(Err(CdpError::ConnectionClosed));
        }
    }
}
