//! Data models for shared sessions.

mod participant;
mod session;

pub use participant::Participant;
pub use session::{Session, DEFAULT_CODE, DEFAULT_LANGUAGE};
