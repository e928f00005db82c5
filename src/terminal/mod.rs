//! Live terminal streaming for one session.
//!
//! [`TerminalTransport`] seeds the view with recent scrollback, then streams
//! output over a [`TerminalConnector`] and reconnects with backoff when the
//! stream drops. Rendering is delegated to a [`TerminalView`].

mod buffer;
mod frame;
pub mod mock;
mod transport;
mod ws;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::Sink;

use crate::config::ReconnectPolicy;
use crate::error::TransportError;
use crate::model::TerminalSettings;

pub use buffer::LineBuffer;
pub use frame::{ClientFrame, ServerFrame};
pub use transport::TerminalTransport;
pub use ws::WsConnector;

/// Connection state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    /// Final: the session is gone or reconnects were exhausted
    Error,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Connecting => "connecting",
            TerminalStatus::Connected => "connected",
            TerminalStatus::Disconnected => "disconnected",
            TerminalStatus::Reconnecting => "reconnecting",
            TerminalStatus::Error => "error",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, TerminalStatus::Error)
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport, history and reconnect settings for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalOptions {
    pub cols: u16,
    pub rows: u16,
    /// Scrollback lines fetched before the live stream opens
    pub seed_lines: usize,
    /// Capacity of the local line buffer
    pub history: usize,
    pub reconnect: ReconnectPolicy,
}

impl TerminalOptions {
    pub fn new(settings: &TerminalSettings, reconnect: ReconnectPolicy) -> Self {
        Self {
            cols: settings.width,
            rows: settings.height,
            seed_lines: settings.seed_lines,
            history: settings.history_capacity(),
            reconnect,
        }
    }
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self::new(&TerminalSettings::default(), ReconnectPolicy::default())
    }
}

/// Rendering surface driven by a [`TerminalTransport`].
///
/// Callbacks run on runtime worker threads and must not block. None are
/// made after [`TerminalTransport::dispose`] returns.
pub trait TerminalView: Send {
    fn resize(&mut self, cols: u16, rows: u16);

    fn render(&mut self, data: &[u8]);

    fn scroll_to_bottom(&mut self);

    fn status_changed(&mut self, _status: TerminalStatus) {}

    /// Show or hide the "resume following" affordance.
    fn resume_visible(&mut self, _visible: bool) {}
}

/// One open terminal stream.
pub struct TerminalSocket {
    pub incoming: BoxStream<'static, Result<ServerFrame, TransportError>>,
    pub outgoing: Pin<Box<dyn Sink<ClientFrame, Error = TransportError> + Send>>,
}

/// Opens terminal streams for sessions.
#[async_trait]
pub trait TerminalConnector: Send + Sync {
    /// Fails with [`TransportError::SessionNotFound`] when the daemon
    /// rejects the session outright.
    async fn connect(&self, session_id: &str) -> Result<TerminalSocket, TransportError>;
}
