//! Identifier and color generation for sessions and participants.
//!
//! Session ids are short tokens meant to be typed or shared in a link,
//! participant ids are full time-ordered UUIDs.

use rand::prelude::IndexedRandom;
use uuid::Uuid;

/// Accent given to the participant who creates a session.
pub const HOST_COLOR: &str = "#22d3ee";

/// Accents handed out to participants as they join.
pub const PARTICIPANT_COLORS: &[&str] = &[
    "#22d3ee", "#a78bfa", "#f472b6", "#4ade80",
    "#fbbf24", "#f87171", "#60a5fa", "#34d399",
];

/// Length of a session token.
pub const SESSION_TOKEN_LEN: usize = 8;

/// Pick a participant color at random.
pub fn pick_color() -> &'static str {
    let mut rng = rand::rng();
    PARTICIPANT_COLORS.choose(&mut rng).copied().unwrap_or(HOST_COLOR)
}

/// Generate a short session token from a random UUID.
pub fn session_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(SESSION_TOKEN_LEN);
    token
}

/// Generate a UUIDv7 (time-ordered, globally unique) participant id.
pub fn participant_id() -> String {
    Uuid::now_v7().to_string()
}
