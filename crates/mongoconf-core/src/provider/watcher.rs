//! Background change watcher
//!
//! Tails the collection and republishes the snapshot after every burst of
//! changes:
//!
//! ```text
//! Idle -(catch up)-> Watching -> (Reloading -> Watching)* -> Stopped
//!   \-> Unsupported   (store can't tail; never retried)
//! ```
//!
//! The task is owned by a [`ChangeWatcher`]; stopping or dropping the watcher
//! cancels it.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use super::options::MongoConfigOptions;
use super::snapshot::SnapshotStore;
use crate::config::ReloadTrigger;
use crate::logging::SharedLogger;
use crate::store::{ChangeSubscription, DocumentStore};
use crate::types::CancellationToken;
use crate::{log_debug, log_error, log_info, log_warn};

/// Lifecycle of the watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Spawned; opening the subscription and catching up
    Idle,
    /// Waiting for the next burst of changes
    Watching,
    /// Re-fetching after a burst
    Reloading,
    /// Finished: cancelled, feed closed, or failed
    Stopped,
    /// The store can't tail this collection; live reload is off for good
    Unsupported,
}

impl WatcherState {
    /// Whether the loop has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Stopped | WatcherState::Unsupported)
    }
}

/// Everything the watch loop reads from and writes to
#[derive(Clone)]
pub struct WatchTarget {
    pub store: Arc<dyn DocumentStore>,
    pub options: Arc<MongoConfigOptions>,
    pub snapshots: Arc<SnapshotStore>,
    pub trigger: Arc<ReloadTrigger>,
    pub logger: SharedLogger,
}

/// Handle to a running watch loop
pub struct ChangeWatcher {
    state: Arc<RwLock<WatcherState>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Spawn the watch loop on the current tokio runtime
    ///
    /// Returns immediately; the subscription is opened by the task.
    pub fn spawn(target: WatchTarget) -> Self {
        let state = Arc::new(RwLock::new(WatcherState::Idle));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(target, state.clone(), cancel.clone()));

        Self {
            state,
            cancel,
            handle: Some(handle),
        }
    }

    /// Current state of the loop
    pub fn state(&self) -> WatcherState {
        *self.state.read()
    }

    /// Cancel the loop and wait for it to finish
    ///
    /// A reload already in progress completes first.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn run(target: WatchTarget, state: Arc<RwLock<WatcherState>>, cancel: CancellationToken) {
    let set_state = |next: WatcherState| *state.write() = next;
    let store_name = target.store.name().to_string();

    let subscription = tokio::select! {
        _ = cancel.cancelled() => {
            set_state(WatcherState::Stopped);
            return;
        }
        result = target.store.watch() => result,
    };

    let subscription = match subscription {
        Ok(subscription) => subscription,
        Err(e) if e.is_watch_unsupported() => {
            log_warn!(
                target.logger,
                "Change streams not available for {}, disabling live reload: {}",
                store_name,
                e
            );
            set_state(WatcherState::Unsupported);
            return;
        }
        Err(e) => {
            log_error!(target.logger, "Failed to watch {}: {}", store_name, e);
            set_state(WatcherState::Stopped);
            return;
        }
    };

    catch_up(&target).await;

    set_state(WatcherState::Watching);
    log_debug!(target.logger, "Watching {} for changes", store_name);

    watch_loop(&target, subscription, &set_state, &cancel).await;

    set_state(WatcherState::Stopped);
    log_debug!(target.logger, "Stopped watching {}", store_name);
}

/// Re-fetch once the subscription is open
///
/// Writes that landed between the provider's fetch and the subscription
/// opening produce no change events; this picks them up. Fires the reload
/// token only if the snapshot actually changed.
async fn catch_up(target: &WatchTarget) {
    let before = target.snapshots.current();
    match target
        .snapshots
        .refresh(target.store.as_ref(), &target.options)
        .await
    {
        Ok(after) if *after != *before => {
            log_info!(
                target.logger,
                "Reloaded {} keys from {}: changed before watching started",
                after.len(),
                target.store.name()
            );
            target.trigger.notify();
        }
        Ok(_) => {}
        Err(e) => {
            log_error!(
                target.logger,
                "Catch-up fetch from {} failed, keeping previous configuration: {}",
                target.store.name(),
                e
            );
        }
    }
}

async fn watch_loop(
    target: &WatchTarget,
    mut subscription: Box<dyn ChangeSubscription>,
    set_state: &(dyn Fn(WatcherState) + Send + Sync),
    cancel: &CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => return,
            batch = subscription.next_batch() => batch,
        };

        let events = match batch {
            Ok(Some(events)) => events,
            Ok(None) => {
                log_info!(target.logger, "Change stream on {} closed", target.store.name());
                return;
            }
            Err(e) => {
                log_error!(target.logger, "Change stream on {} failed: {}", target.store.name(), e);
                return;
            }
        };

        if events.is_empty() {
            continue;
        }

        set_state(WatcherState::Reloading);
        match target
            .snapshots
            .refresh(target.store.as_ref(), &target.options)
            .await
        {
            Ok(snapshot) => {
                log_info!(
                    target.logger,
                    "Reloaded {} keys from {} after {} change(s)",
                    snapshot.len(),
                    target.store.name(),
                    events.len()
                );
                // The new snapshot is already visible here
                target.trigger.notify();
            }
            Err(e) => {
                log_error!(
                    target.logger,
                    "Reload from {} failed, keeping previous configuration: {}",
                    target.store.name(),
                    e
                );
            }
        }
        set_state(WatcherState::Watching);
    }
}
