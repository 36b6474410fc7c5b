//! One-shot reload notifications
//!
//! A [`ReloadToken`] fires at most once. The owning provider holds a
//! [`ReloadTrigger`]; calling [`ReloadTrigger::notify`] installs a fresh token
//! and then fires the previous one, so a consumer that re-subscribes from
//! inside its callback already gets the token for the next change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::Notify;

type ReloadCallback = Box<dyn FnOnce() + Send>;

struct ReloadTokenInner {
    fired: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<ReloadCallback>>,
}

impl ReloadTokenInner {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        self.notify.notify_waiters();

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }
    }
}

/// Handle a consumer holds to learn that configuration changed
#[derive(Clone)]
pub struct ReloadToken {
    inner: Arc<ReloadTokenInner>,
}

impl ReloadToken {
    /// Whether this token has fired
    pub fn has_changed(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Wait until this token fires
    pub async fn changed(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.has_changed() {
            return;
        }
        notified.await;
    }

    /// Run `callback` once when this token fires
    ///
    /// If the token already fired the callback runs immediately on the
    /// calling thread.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.has_changed() {
            drop(callbacks);
            callback();
            return;
        }
        callbacks.push(Box::new(callback));
    }

    /// Whether two handles refer to the same token
    pub fn same_token(&self, other: &ReloadToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ReloadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadToken")
            .field("has_changed", &self.has_changed())
            .finish()
    }
}

/// Single-writer side of the reload signal
pub struct ReloadTrigger {
    current: ArcSwap<ReloadTokenInner>,
}

impl Default for ReloadTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadTrigger {
    /// Create a trigger with an unfired token
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ReloadTokenInner::new()),
        }
    }

    /// The token that will fire on the next change
    pub fn token(&self) -> ReloadToken {
        ReloadToken {
            inner: self.current.load_full(),
        }
    }

    /// Rotate in a fresh token, then fire the previous one
    pub fn notify(&self) {
        let previous = self.current.swap(Arc::new(ReloadTokenInner::new()));
        previous.fire();
    }
}

impl std::fmt::Debug for ReloadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadTrigger")
            .field("current", &self.token())
            .finish()
    }
}
