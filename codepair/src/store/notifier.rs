//! Observer registry that fans session snapshots out after each mutation.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::models::Session;

/// Callback receiving the full session snapshot after a change.
pub type Observer = Arc<dyn Fn(&Session) + Send + Sync>;

/// A unique identifier for a registered observer.
pub type ObserverId = u64;

/// Maps session ids to the observers interested in them.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: Mutex<HashMap<String, HashMap<ObserverId, Observer>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("sessions", &self.observers.lock().len())
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `observer` for changes to session `session_id`.
    ///
    /// The session does not need to exist yet. The returned handle removes
    /// exactly this observer when [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(self: &Arc<Self>, session_id: &str, observer: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let observer_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .insert(observer_id, Arc::new(observer));

        trace!(session_id, observer_id, "observer subscribed");

        Subscription {
            notifier: Arc::downgrade(self),
            session_id: session_id.to_string(),
            observer_id,
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `snapshot` to every observer of `session_id`.
    ///
    /// Nothing is delivered when the session is gone (`None`) or nobody is
    /// listening. A panicking observer is logged and skipped; the remaining
    /// observers still receive the snapshot. Returns the number of observers
    /// that completed without panicking.
    pub fn notify(&self, session_id: &str, snapshot: Option<&Session>) -> usize {
        let Some(session) = snapshot else {
            return 0;
        };

        // Snapshot the observer list so callbacks may subscribe or unsubscribe.
        let observers: Vec<(ObserverId, Observer)> = match self.observers.lock().get(session_id) {
            Some(set) => set.iter().map(|(id, o)| (*id, Arc::clone(o))).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (observer_id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(session))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        session_id,
                        observer_id,
                        panic = %panic_message(payload.as_ref()),
                        "session observer panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of observers registered for a session.
    pub fn observer_count(&self, session_id: &str) -> usize {
        self.observers
            .lock()
            .get(session_id)
            .map_or(0, HashMap::len)
    }

    fn remove(&self, session_id: &str, observer_id: ObserverId) {
        let mut observers = self.observers.lock();
        if let Some(set) = observers.get_mut(session_id) {
            set.remove(&observer_id);
            if set.is_empty() {
                observers.remove(session_id);
            }
        }
    }
}

/// Capability to deregister one observer.
///
/// Dropping the handle leaves the observer registered.
#[derive(Debug)]
pub struct Subscription {
    notifier: Weak<ChangeNotifier>,
    session_id: String,
    observer_id: ObserverId,
    active: AtomicBool,
}

impl Subscription {
    /// Remove the observer. Calling this more than once has no further effect.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.remove(&self.session_id, self.observer_id);
            trace!(
                session_id = %self.session_id,
                observer_id = self.observer_id,
                "observer unsubscribed"
            );
        }
    }

    /// Whether the observer is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
