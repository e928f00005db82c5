use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use super::{ClientFrame, ServerFrame, TerminalConnector, TerminalSocket};
use crate::daemon::HttpDaemon;
use crate::error::TransportError;

/// WebSocket connector for the daemon's `/ws/terminal/{id}` endpoint.
#[derive(Clone)]
pub struct WsConnector {
    daemon: HttpDaemon,
}

impl WsConnector {
    pub fn new(daemon: HttpDaemon) -> Self {
        Self { daemon }
    }
}

#[async_trait]
impl TerminalConnector for WsConnector {
    async fn connect(&self, session_id: &str) -> Result<TerminalSocket, TransportError> {
        let url = self.daemon.terminal_url(session_id);
        tracing::debug!(%url, "Opening terminal stream");

        let (ws, _response) = connect_async(url.as_str()).await.map_err(|e| match e {
            tungstenite::Error::Http(response) if response.status().as_u16() == 404 => {
                TransportError::SessionNotFound(session_id.to_string())
            }
            tungstenite::Error::Url(e) => TransportError::UnsupportedUrl(e.to_string()),
            other => TransportError::Connect(other.to_string()),
        })?;

        let (sink, stream) = ws.split();

        let incoming = stream
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(ServerFrame::from_text(&text))),
                    Ok(Message::Binary(data)) => Some(Ok(ServerFrame::Output(data))),
                    Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
                })
            })
            .boxed();

        let outgoing = sink
            .sink_map_err(|e| TransportError::Protocol(e.to_string()))
            .with(|frame: ClientFrame| {
                future::ready(
                    serde_json::to_string(&frame)
                        .map(Message::Text)
                        .map_err(|e| TransportError::Protocol(e.to_string())),
                )
            });

        Ok(TerminalSocket {
            incoming,
            outgoing: Box::pin(outgoing),
        })
    }
}
