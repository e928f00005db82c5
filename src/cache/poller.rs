use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SessionCache;

/// Background poll loop for a [`SessionCache`].
///
/// The first tick fires immediately, which performs the initial load.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub(super) fn spawn(cache: Weak<SessionCache>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(cache) = cache.upgrade() else {
                    break;
                };
                tokio::select! {
                    _ = token.cancelled() => break,
                    result = cache.refresh(false) => {
                        if let Err(e) = result {
                            tracing::debug!(error = %e, "Session poll failed");
                        }
                    }
                }
            }
            tracing::debug!("Session poller stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
