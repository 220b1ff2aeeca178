//! WebSocket transport to a DevTools endpoint.

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::Result;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the DevTools WebSocket.
pub(crate) async fn connect(url: &str) -> Result<WsStream> {
    debug!(target = "wabridge.cdp", %url, "connecting to devtools endpoint");
    let (stream, _) = connect_async(url).await?;
    Ok(stream)
}
