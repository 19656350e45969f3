//! Session model representing one shared coding room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::Participant;

/// Language selected for a freshly created session.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Code buffer a freshly created session starts with.
pub const DEFAULT_CODE: &str = "// Welcome to the interview!\n// Start coding here...\n\nfunction solution() {\n  // Your code here\n}\n";

/// A session is one collaborative room holding a shared code buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Short unique token, the sole lookup key.
    pub id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Display label.
    pub title: String,
    /// Shared text buffer, last write wins.
    pub code: String,
    /// Identifier of the active execution strategy.
    pub language: String,
    /// Participants in join order.
    pub participants: Vec<Participant>,
}

impl Session {
    /// Create a new session with the default template and its host.
    pub fn new(id: String, title: String, host: Participant) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            title,
            code: DEFAULT_CODE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            participants: vec![host],
        }
    }

    /// The participant that created the session, if still attached.
    pub fn host(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_host)
    }

    /// Look up a participant by id.
    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == participant_id)
    }
}
