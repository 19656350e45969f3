//! Participant model representing one user attached to a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::palette::{participant_id, pick_color, HOST_COLOR};

/// One user attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique identifier, generated on join.
    pub id: String,
    /// Display name supplied by the user.
    pub name: String,
    /// Presentation accent, not used for identity.
    pub color: String,
    /// Whether this participant created the session.
    pub is_host: bool,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create the host participant that is attached at session creation.
    pub fn host(name: String) -> Self {
        Self {
            id: participant_id(),
            name,
            color: HOST_COLOR.to_string(),
            is_host: true,
            joined_at: Utc::now(),
        }
    }

    /// Create a regular participant with a color drawn from the palette.
    pub fn guest(name: String) -> Self {
        Self {
            id: participant_id(),
            name,
            color: pick_color().to_string(),
            is_host: false,
            joined_at: Utc::now(),
        }
    }
}
