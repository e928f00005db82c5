//! In-memory terminal connector and recording view for tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{
    ClientFrame, ServerFrame, TerminalConnector, TerminalSocket, TerminalStatus, TerminalView,
};
use crate::error::TransportError;

type ServerSender = mpsc::UnboundedSender<Result<ServerFrame, TransportError>>;

#[derive(Default)]
struct ConnectorState {
    missing: HashSet<String>,
    refuse: bool,
    /// Server side of the most recent connection
    live: Option<ServerSender>,
    received: Arc<Mutex<Vec<ClientFrame>>>,
}

/// Connector whose "server" side is driven by the test.
pub struct MockConnector {
    state: Mutex<ConnectorState>,
    connects: watch::Sender<usize>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (connects, _rx) = watch::channel(0);
        Self {
            state: Mutex::new(ConnectorState::default()),
            connects,
        }
    }

    /// Reject handshakes for `session_id` as not found.
    pub fn mark_missing(&self, session_id: &str) {
        self.state.lock().missing.insert(session_id.to_string());
    }

    /// Fail every further connect with a retryable error.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Connect calls so far, including refused ones.
    pub fn connect_count(&self) -> usize {
        *self.connects.borrow()
    }

    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) -> bool {
        let mut rx = self.connects.subscribe();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n >= count)).await,
            Ok(Ok(_))
        );
        reached
    }

    /// Push output on the current connection. Returns false when there is
    /// no open connection.
    pub fn send_output(&self, data: impl Into<Vec<u8>>) -> bool {
        let state = self.state.lock();
        match &state.live {
            Some(tx) => tx.unbounded_send(Ok(ServerFrame::Output(data.into()))).is_ok(),
            None => false,
        }
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) {
        self.state.lock().live = None;
    }

    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .live
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Every frame the client sent, across all connections.
    pub fn received(&self) -> Vec<ClientFrame> {
        self.state.lock().received.lock().clone()
    }
}

#[async_trait]
impl TerminalConnector for MockConnector {
    async fn connect(&self, session_id: &str) -> Result<TerminalSocket, TransportError> {
        self.connects.send_modify(|n| *n += 1);

        let mut state = self.state.lock();
        if state.missing.contains(session_id) {
            return Err(TransportError::SessionNotFound(session_id.to_string()));
        }
        if state.refuse {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded();
        state.live = Some(tx);

        let received = state.received.clone();
        let outgoing = futures::sink::unfold(received, |received, frame: ClientFrame| async move {
            received.lock().push(frame);
            Ok::<_, TransportError>(received)
        });

        Ok(TerminalSocket {
            incoming: rx.boxed(),
            outgoing: Box::pin(outgoing),
        })
    }
}

/// Something a [`RecordingView`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Resize(u16, u16),
    Render(String),
    ScrollToBottom,
    Status(TerminalStatus),
    ResumeVisible(bool),
}

/// View that records every callback. Clones share the log, so a test keeps
/// one clone while the transport owns another.
#[derive(Clone, Default)]
pub struct RecordingView {
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ViewEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Concatenation of everything rendered.
    pub fn rendered(&self) -> String {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Render(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<TerminalStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    /// True once every other clone, including the transport's, is dropped.
    pub fn is_released(&self) -> bool {
        Arc::strong_count(&self.events) == 1
    }
}

impl TerminalView for RecordingView {
    fn resize(&mut self, cols: u16, rows: u16) {
        self.events.lock().push(ViewEvent::Resize(cols, rows));
    }

    fn render(&mut self, data: &[u8]) {
        self.events
            .lock()
            .push(ViewEvent::Render(String::from_utf8_lossy(data).into_owned()));
    }

    fn scroll_to_bottom(&mut self) {
        self.events.lock().push(ViewEvent::ScrollToBottom);
    }

    fn status_changed(&mut self, status: TerminalStatus) {
        self.events.lock().push(ViewEvent::Status(status));
    }

    fn resume_visible(&mut self, visible: bool) {
        self.events.lock().push(ViewEvent::ResumeVisible(visible));
    }
}
