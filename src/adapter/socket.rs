//! WebSocket plumbing shared by the feed adapters.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, trace, warn};

use crate::error::Result;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a read from the socket produced.
#[derive(Debug)]
pub(crate) enum Frame {
    Text(String),
    /// The connection is gone; the string says why.
    Closed(String),
}

pub(crate) async fn connect(url: &str) -> Result<WsStream> {
    info!(url = %url, "Connecting to WebSocket");
    let (ws, response) = connect_async(url).await?;
    info!(status = %response.status(), "WebSocket connected");
    Ok(ws)
}

pub(crate) async fn send_json<T: Serialize>(ws: &mut WsStream, message: &T) -> Result<()> {
    let json = serde_json::to_string(message)?;
    ws.send(Message::Text(json)).await?;
    Ok(())
}

/// Read until the next text frame, answering pings on the way.
pub(crate) async fn next_frame(ws: &mut WsStream) -> Frame {
    while let Some(result) = ws.next().await {
        match result {
            Ok(Message::Text(text)) => {
                trace!(bytes = text.len(), "Received WebSocket text frame");
                return Frame::Text(text);
            }
            Ok(Message::Ping(data)) => {
                trace!("Received WebSocket ping");
                if let Err(e) = ws.send(Message::Pong(data)).await {
                    warn!(error = %e, "Failed to answer ping");
                    return Frame::Closed(format!("pong failed: {e}"));
                }
            }
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "WebSocket closed by server");
                return Frame::Closed(
                    frame.map_or_else(|| "closed by server".into(), |f| f.reason.to_string()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket error");
                return Frame::Closed(e.to_string());
            }
        }
    }
    Frame::Closed("stream ended".into())
}
