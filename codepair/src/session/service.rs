//! Session operations consumed by the UI layer.
//!
//! Every mutation is applied to the repository and the fresh snapshot is
//! delivered to the session's observers before the operation returns. The
//! delivery lock is held across the write and its fan-out, so observers of one
//! session see mutations in the order they were issued.
//!
//! A mutation issued from inside an observer callback is applied at once, but
//! its snapshot is queued and delivered after the current fan-out finishes.
//! The outermost mutation returns once the queue is empty.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info};

use crate::error::{require, ValidationError};
use crate::models::{Participant, Session};
use crate::store::{ChangeNotifier, SessionRepository, Subscription};

/// Repository and notifier composed into the shared-session API.
///
/// Operations are `async` so a networked store can replace the in-process one
/// without changing call sites; today none of them suspend.
pub struct SessionService {
    repository: Mutex<SessionRepository>,
    notifier: Arc<ChangeNotifier>,
    // Reentrant so an observer may issue another mutation from its callback.
    delivery: ReentrantMutex<Outbox>,
}

/// Snapshots waiting for delivery, owned by whoever holds the delivery lock.
#[derive(Default)]
struct Outbox {
    pending: RefCell<VecDeque<(String, Option<Session>)>>,
    draining: Cell<bool>,
}

impl Default for SessionService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("sessions", &self.repository.lock().len())
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl SessionService {
    /// Create a service over an empty repository.
    pub fn new() -> Self {
        Self::with_parts(SessionRepository::new(), ChangeNotifier::new())
    }

    /// Create a service over existing parts.
    pub fn with_parts(repository: SessionRepository, notifier: Arc<ChangeNotifier>) -> Self {
        Self {
            repository: Mutex::new(repository),
            notifier,
            delivery: ReentrantMutex::new(Outbox::default()),
        }
    }

    /// Create a session hosted by `host_name`.
    pub async fn create_session(
        &self,
        title: &str,
        host_name: &str,
    ) -> Result<Session, ValidationError> {
        let title = require("title", title)?;
        let host_name = require("host name", host_name)?;

        let session = self.repository.lock().create(&title, &host_name);
        info!(session_id = %session.id, title = %session.title, "session created");
        Ok(session)
    }

    /// Fetch the current snapshot of a session.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.repository.lock().get(session_id).cloned()
    }

    /// Attach a new participant. `Ok(None)` when the session does not exist.
    pub async fn join_session(
        &self,
        session_id: &str,
        name: &str,
    ) -> Result<Option<Participant>, ValidationError> {
        let name = require("name", name)?;
        let joined = self.commit(session_id, |repo| repo.join(session_id, &name));
        if let Some(participant) = &joined {
            info!(session_id, participant_id = %participant.id, "participant joined");
        }
        Ok(joined)
    }

    /// Detach a participant.
    ///
    /// Returns `false` only when the session does not exist. Leaving twice
    /// succeeds and notifies both times.
    pub async fn leave_session(&self, session_id: &str, participant_id: &str) -> bool {
        let left = self
            .commit(session_id, |repo| {
                repo.leave(session_id, participant_id).then_some(())
            })
            .is_some();
        if left {
            info!(session_id, participant_id, "participant left");
        }
        left
    }

    /// Replace the shared code buffer. Last write wins.
    pub async fn update_code(&self, session_id: &str, code: &str) -> bool {
        self.commit(session_id, |repo| repo.update_code(session_id, code).then_some(()))
            .is_some()
    }

    /// Replace the selected language. Unknown languages are accepted here and
    /// rejected by the dispatcher at run time.
    pub async fn update_language(&self, session_id: &str, language: &str) -> bool {
        self.commit(session_id, |repo| {
            repo.update_language(session_id, language).then_some(())
        })
        .is_some()
    }

    /// Register `on_change` for every future change to `session_id`.
    pub fn subscribe<F>(&self, session_id: &str, on_change: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.notifier.subscribe(session_id, on_change)
    }

    /// Apply `mutation` and fan the resulting snapshot out to observers.
    ///
    /// A mutation returning `None` changed nothing and notifies nobody.
    fn commit<T>(
        &self,
        session_id: &str,
        mutation: impl FnOnce(&mut SessionRepository) -> Option<T>,
    ) -> Option<T> {
        let outbox = self.delivery.lock();

        let (result, snapshot) = {
            let mut repository = self.repository.lock();
            let result = mutation(&mut repository)?;
            (result, repository.get(session_id).cloned())
        };
        outbox
            .pending
            .borrow_mut()
            .push_back((session_id.to_string(), snapshot));

        // A nested commit leaves its snapshot to the drain already running.
        if !outbox.draining.replace(true) {
            self.drain(&outbox);
            outbox.draining.set(false);
        }
        Some(result)
    }

    fn drain(&self, outbox: &Outbox) {
        loop {
            // Release the borrow before delivering; observers may enqueue more.
            let next = outbox.pending.borrow_mut().pop_front();
            let Some((session_id, snapshot)) = next else {
                break;
            };
            let delivered = self.notifier.notify(&session_id, snapshot.as_ref());
            debug!(session_id = %session_id, delivered, "session change delivered");
        }
    }
}
