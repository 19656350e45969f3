//! Shared-session operations.

mod service;

pub use service::SessionService;
