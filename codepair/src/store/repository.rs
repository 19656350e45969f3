//! In-memory session records.
//!
//! The repository only stores and mutates. Callers decide what to do after a
//! mutation (the session service fans the fresh snapshot out to observers).

use std::collections::HashMap;

use tracing::debug;

use crate::models::{Participant, Session};
use crate::palette::session_token;

/// Owns every session created in this process.
#[derive(Debug, Default)]
pub struct SessionRepository {
    sessions: HashMap<String, Session>,
}

impl SessionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with `host_name` as its host.
    ///
    /// Draws a fresh token until it does not collide with an existing session,
    /// so an existing session is never overwritten.
    pub fn create(&mut self, title: &str, host_name: &str) -> Session {
        self.create_with(title, host_name, session_token)
    }

    fn create_with(
        &mut self,
        title: &str,
        host_name: &str,
        mut next_token: impl FnMut() -> String,
    ) -> Session {
        let mut id = next_token();
        while self.sessions.contains_key(&id) {
            debug!(session_id = %id, "session token collision, drawing another");
            id = next_token();
        }

        let host = Participant::host(host_name.to_string());
        let session = Session::new(id.clone(), title.to_string(), host);
        self.sessions.insert(id, session.clone());
        session
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Append a new guest to a session.
    pub fn join(&mut self, id: &str, name: &str) -> Option<Participant> {
        let session = self.sessions.get_mut(id)?;
        let participant = Participant::guest(name.to_string());
        session.participants.push(participant.clone());
        Some(participant)
    }

    /// Remove a participant from a session.
    ///
    /// Returns `false` only when the session does not exist. Removing a
    /// participant that is not attached succeeds without changing anything.
    pub fn leave(&mut self, id: &str, participant_id: &str) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        session.participants.retain(|p| p.id != participant_id);
        true
    }

    /// Replace the shared code buffer.
    pub fn update_code(&mut self, id: &str, code: &str) -> bool {
        self.sessions.get_mut(id).is_some_and(|session| {
            session.code = code.to_string();
            true
        })
    }

    /// Replace the selected language. The value is not validated here.
    pub fn update_language(&mut self, id: &str, language: &str) -> bool {
        self.sessions.get_mut(id).is_some_and(|session| {
            session.language = language.to_string();
            true
        })
    }

    /// Number of sessions held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session has been created yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_CODE, DEFAULT_LANGUAGE};

    #[test]
    fn test_create_and_get() {
        let mut repo = SessionRepository::new();
        let session = repo.create("Pairing", "Ada");

        assert_eq!(session.title, "Pairing");
        assert_eq!(session.code, DEFAULT_CODE);
        assert_eq!(session.language, DEFAULT_LANGUAGE);
        assert_eq!(session.participants.len(), 1);
        assert!(session.participants[0].is_host);
        assert_eq!(repo.get(&session.id), Some(&session));
        assert!(repo.get("missing").is_none());
    }

    #[test]
    fn test_create_redraws_on_collision() {
        let mut repo = SessionRepository::new();
        let first = repo.create_with("one", "Ada", || "deadbeef".to_string());

        let mut tokens = vec!["cafebabe".to_string(), "deadbeef".to_string()];
        let second = repo.create_with("two", "Grace", || tokens.pop().unwrap_or_default());

        assert_eq!(first.id, "deadbeef");
        assert_eq!(second.id, "cafebabe");
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get("deadbeef").map(|s| s.title.as_str()), Some("one"));
    }

    #[test]
    fn test_join_and_leave() {
        let mut repo = SessionRepository::new();
        let session = repo.create("Pairing", "Ada");

        let guest = repo.join(&session.id, "Grace").unwrap();
        assert!(!guest.is_host);
        assert_eq!(repo.get(&session.id).unwrap().participants.len(), 2);

        assert!(repo.leave(&session.id, &guest.id));
        assert_eq!(repo.get(&session.id).unwrap().participants, session.participants);

        // Leaving again is a successful no-op.
        assert!(repo.leave(&session.id, &guest.id));
        assert_eq!(repo.get(&session.id).unwrap().participants, session.participants);
    }

    #[test]
    fn test_missing_session() {
        let mut repo = SessionRepository::new();
        assert!(repo.join("missing", "Grace").is_none());
        assert!(!repo.leave("missing", "someone"));
        assert!(!repo.update_code("missing", "x"));
        assert!(!repo.update_language("missing", "python"));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_host_can_leave() {
        let mut repo = SessionRepository::new();
        let session = repo.create("Pairing", "Ada");
        let host_id = session.participants[0].id.clone();

        assert!(repo.leave(&session.id, &host_id));
        let stored = repo.get(&session.id).unwrap();
        assert!(stored.participants.is_empty());
        assert!(stored.host().is_none());
    }

    #[test]
    fn test_updates_replace_verbatim() {
        let mut repo = SessionRepository::new();
        let session = repo.create("Pairing", "Ada");

        assert!(repo.update_code(&session.id, "a"));
        assert!(repo.update_code(&session.id, "b"));
        assert!(repo.update_language(&session.id, "klingon"));

        let stored = repo.get(&session.id).unwrap();
        assert_eq!(stored.code, "b");
        assert_eq!(stored.language, "klingon");
    }
}
