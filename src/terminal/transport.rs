use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    ClientFrame, LineBuffer, ServerFrame, TerminalConnector, TerminalOptions, TerminalSocket,
    TerminalStatus, TerminalView,
};
use crate::daemon::DaemonApi;
use crate::error::{ClientError, TransportError};

/// Frozen copy of the scrollback while lines are being picked.
struct Selection {
    lines: Vec<String>,
    selected: BTreeSet<usize>,
}

struct Shared {
    session_id: String,
    status: watch::Sender<TerminalStatus>,
    last_error: Mutex<Option<TransportError>>,
    view: Mutex<Option<Box<dyn TerminalView>>>,
    buffer: Mutex<LineBuffer>,
    following: AtomicBool,
    selection: Mutex<Option<Selection>>,
    size: Mutex<(u16, u16)>,
    disposed: AtomicBool,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn with_view(&self, f: impl FnOnce(&mut dyn TerminalView)) {
        if let Some(view) = self.view.lock().as_mut() {
            f(view.as_mut());
        }
    }

    /// Publish `status` unless it is already current or the transport is
    /// gone. The final `Error` state is never left.
    fn set_status(&self, status: TerminalStatus) {
        if self.is_disposed() {
            return;
        }
        let changed = self.status.send_if_modified(|current| {
            if *current == status || current.is_final() {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            tracing::debug!(session_id = %self.session_id, status = %status, "Terminal status changed");
            self.with_view(|view| view.status_changed(status));
        }
    }

    fn fail(&self, err: TransportError) {
        tracing::warn!(session_id = %self.session_id, error = %err, "Terminal stream failed");
        *self.last_error.lock() = Some(err);
        self.set_status(TerminalStatus::Error);
    }

    fn on_output(&self, data: &[u8]) {
        if self.is_disposed() || data.is_empty() {
            return;
        }
        self.buffer.lock().push(data);
        let follow = self.following.load(Ordering::SeqCst) && self.selection.lock().is_none();
        self.with_view(|view| {
            view.render(data);
            if follow {
                view.scroll_to_bottom();
            }
        });
    }
}

enum PumpEnd {
    Cancelled,
    Dropped(TransportError),
}

/// Live terminal for one session.
///
/// Must be opened inside a tokio runtime. Dropping the transport disposes it.
pub struct TerminalTransport {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<ClientFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalTransport {
    /// Size the view, render the seed scrollback, then stream live output.
    pub fn open(
        session_id: impl Into<String>,
        options: TerminalOptions,
        api: Arc<dyn DaemonApi>,
        connector: Arc<dyn TerminalConnector>,
        mut view: Box<dyn TerminalView>,
    ) -> Self {
        let session_id = session_id.into();
        view.resize(options.cols, options.rows);
        view.status_changed(TerminalStatus::Connecting);

        let (status, _rx) = watch::channel(TerminalStatus::Connecting);
        let shared = Arc::new(Shared {
            session_id,
            status,
            last_error: Mutex::new(None),
            view: Mutex::new(Some(view)),
            buffer: Mutex::new(LineBuffer::new(options.history)),
            following: AtomicBool::new(true),
            selection: Mutex::new(None),
            size: Mutex::new((options.cols, options.rows)),
            disposed: AtomicBool::new(false),
        });

        let cancel = CancellationToken::new();
        let (outgoing, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(
            shared.clone(),
            options,
            api,
            connector,
            rx,
            cancel.clone(),
        ));

        Self {
            shared,
            cancel,
            outgoing,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn status(&self) -> TerminalStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<TerminalStatus> {
        self.shared.status.subscribe()
    }

    /// Why the transport entered [`TerminalStatus::Error`].
    pub fn last_error(&self) -> Option<TransportError> {
        self.shared.last_error.lock().clone()
    }

    /// Wait until the status satisfies `predicate`, up to `timeout`.
    pub async fn wait_for_status<F>(&self, timeout: Duration, predicate: F) -> Option<TerminalStatus>
    where
        F: Fn(TerminalStatus) -> bool,
    {
        let mut rx = self.shared.status.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|s| predicate(*s))).await {
            Ok(Ok(status)) => Some(*status),
            Ok(Err(_)) | Err(_) => None,
        };
        result
    }

    fn check_writable(&self) -> Result<(), TransportError> {
        if self.shared.is_disposed() {
            return Err(TransportError::Disposed);
        }
        if self.shared.selection.lock().is_some() {
            return Err(TransportError::SelectionActive);
        }
        Ok(())
    }

    pub fn send_input(&self, data: &[u8]) -> Result<(), TransportError> {
        self.check_writable()?;
        let frame = ClientFrame::Input(String::from_utf8_lossy(data).into_owned());
        self.outgoing.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Tell the daemon about a new viewport size. Remembered for reconnects.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), TransportError> {
        self.check_writable()?;
        *self.shared.size.lock() = (cols, rows);
        self.outgoing
            .send(ClientFrame::Resize { cols, rows })
            .map_err(|_| TransportError::Closed)
    }

    /// The user scrolled; following resumes only when they are at the bottom.
    pub fn user_scrolled(&self, at_bottom: bool) {
        if self.shared.is_disposed() {
            return;
        }
        let was_following = self.shared.following.swap(at_bottom, Ordering::SeqCst);
        if was_following != at_bottom {
            self.shared.with_view(|view| view.resume_visible(!at_bottom));
        }
    }

    pub fn resume_follow(&self) {
        if self.shared.is_disposed() {
            return;
        }
        self.shared.following.store(true, Ordering::SeqCst);
        self.shared.with_view(|view| {
            view.scroll_to_bottom();
            view.resume_visible(false);
        });
    }

    pub fn is_following(&self) -> bool {
        self.shared.following.load(Ordering::SeqCst)
    }

    /// Snapshot of the scrollback, oldest line first.
    pub fn lines(&self) -> Vec<String> {
        self.shared.buffer.lock().lines()
    }

    /// Freeze input and start picking lines. Returns the number of
    /// selectable lines.
    pub fn enter_selection(&self) -> Result<usize, TransportError> {
        if self.shared.is_disposed() {
            return Err(TransportError::Disposed);
        }
        let lines = self.shared.buffer.lock().lines();
        let count = lines.len();
        *self.shared.selection.lock() = Some(Selection {
            lines,
            selected: BTreeSet::new(),
        });
        Ok(count)
    }

    pub fn is_selecting(&self) -> bool {
        self.shared.selection.lock().is_some()
    }

    /// Flip line `index`. Returns whether it is now selected; out-of-range
    /// indices and calls outside selection mode select nothing.
    pub fn toggle_line(&self, index: usize) -> bool {
        let mut guard = self.shared.selection.lock();
        let Some(selection) = guard.as_mut() else {
            return false;
        };
        if index >= selection.lines.len() {
            return false;
        }
        if selection.selected.remove(&index) {
            false
        } else {
            selection.selected.insert(index);
            true
        }
    }

    /// Selected lines joined with `\n`, in scrollback order.
    pub fn selected_text(&self) -> Option<String> {
        let guard = self.shared.selection.lock();
        let selection = guard.as_ref()?;
        if selection.selected.is_empty() {
            return None;
        }
        let picked: Vec<&str> = selection
            .selected
            .iter()
            .filter_map(|&i| selection.lines.get(i).map(String::as_str))
            .collect();
        Some(picked.join("\n"))
    }

    pub fn exit_selection(&self) {
        if self.shared.selection.lock().take().is_some() && self.is_following() {
            self.shared.with_view(|view| view.scroll_to_bottom());
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stop streaming and release the view. Safe to call repeatedly; no
    /// view callback happens once this returns.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        // Waits out any callback in progress
        drop(self.shared.view.lock().take());
        self.shared.selection.lock().take();
        tracing::debug!(session_id = %self.shared.session_id, "Terminal transport disposed");
    }
}

impl Drop for TerminalTransport {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn run(
    shared: Arc<Shared>,
    options: TerminalOptions,
    api: Arc<dyn DaemonApi>,
    connector: Arc<dyn TerminalConnector>,
    mut rx: mpsc::UnboundedReceiver<ClientFrame>,
    cancel: CancellationToken,
) {
    let seed = tokio::select! {
        _ = cancel.cancelled() => return,
        seed = api.seed_lines(&shared.session_id, options.seed_lines) => seed,
    };
    match seed {
        Ok(lines) if !lines.is_empty() => {
            let mut seed = lines.join("\n");
            seed.push('\n');
            shared.on_output(seed.as_bytes());
        }
        Ok(_) => {}
        Err(ClientError::NotFound(_)) => {
            shared.fail(TransportError::SessionNotFound(shared.session_id.clone()));
            return;
        }
        Err(e) => {
            tracing::warn!(session_id = %shared.session_id, error = %e, "Failed to fetch terminal seed");
        }
    }

    let policy = options.reconnect;
    let mut attempt: u32 = 0;
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            connected = connector.connect(&shared.session_id) => connected,
        };

        let last_error = match connected {
            Ok(socket) => {
                attempt = 0;
                shared.set_status(TerminalStatus::Connected);
                match pump(&shared, socket, &mut rx, &cancel).await {
                    PumpEnd::Cancelled => return,
                    PumpEnd::Dropped(e) => {
                        tracing::info!(session_id = %shared.session_id, error = %e, "Terminal stream dropped");
                        shared.set_status(TerminalStatus::Disconnected);
                        e
                    }
                }
            }
            Err(e) if !e.is_retryable() => {
                shared.fail(e);
                return;
            }
            Err(e) => {
                tracing::debug!(session_id = %shared.session_id, error = %e, attempt, "Terminal connect failed");
                e
            }
        };

        attempt = attempt.saturating_add(1);
        if policy.exhausted(attempt) {
            shared.fail(last_error);
            return;
        }
        shared.set_status(TerminalStatus::Reconnecting);

        let delay = jittered(policy.base_delay(attempt));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump(
    shared: &Shared,
    socket: TerminalSocket,
    rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    cancel: &CancellationToken,
) -> PumpEnd {
    let TerminalSocket {
        mut incoming,
        mut outgoing,
    } = socket;

    let (cols, rows) = *shared.size.lock();
    if let Err(e) = outgoing.send(ClientFrame::Resize { cols, rows }).await {
        return PumpEnd::Dropped(e);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = outgoing.close().await;
                return PumpEnd::Cancelled;
            }
            frame = incoming.next() => match frame {
                Some(Ok(ServerFrame::Output(data))) => shared.on_output(&data),
                Some(Err(e)) => return PumpEnd::Dropped(e),
                None => return PumpEnd::Dropped(TransportError::Closed),
            },
            Some(frame) = rx.recv() => {
                if let Err(e) = outgoing.send(frame).await {
                    return PumpEnd::Dropped(e);
                }
            }
        }
    }
}

/// Spread reconnects by up to a quarter of the base delay.
fn jittered(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 4;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=spread))
}
