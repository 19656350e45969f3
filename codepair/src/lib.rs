//! codepair - shared coding sessions with in-process code execution.
//!
//! A [`SessionService`](session::SessionService) owns every session and fans
//! each change out to the observers subscribed to it. A
//! [`Dispatcher`](execution::Dispatcher) runs the shared code in JavaScript,
//! TypeScript or Python and returns a uniform `{output, error}` result.

pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod palette;
pub mod runtime;
pub mod session;
pub mod store;
