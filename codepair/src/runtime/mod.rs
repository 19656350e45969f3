//! Hosted interpreters and their lazy loader.
//!
//! An in-host language (JavaScript) needs no loading. A hosted interpreter is
//! an external runtime, such as CPython compiled to WebAssembly, that is
//! loaded once and reused by every execution.

mod loader;
mod python;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use loader::{LoadPhase, RuntimeLoader};
pub use python::{WasiPython, WasiPythonSource};

/// Failure to materialize a hosted interpreter.
///
/// Cloneable because one failed load is reported to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No interpreter module has been configured.
    #[error("no interpreter module configured (set {0})")]
    NotConfigured(&'static str),

    /// The interpreter module could not be read.
    #[error("failed to read {}: {message}", path.display())]
    Read {
        /// Module location on the host.
        path: PathBuf,
        /// Underlying I/O error.
        message: String,
    },

    /// The engine or module failed to initialize.
    #[error("{0}")]
    Init(String),
}

/// Captured result of one hosted run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostedRun {
    /// Everything the program wrote to stdout.
    pub stdout: String,
    /// Everything the program wrote to stderr, minus any error report.
    pub stderr: String,
    /// Textual form of the last top-level expression, when it had a value.
    pub result: Option<String>,
    /// Why the run stopped early, if it did.
    pub failure: Option<HostedFailure>,
}

/// How a hosted run ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostedFailure {
    /// The user program raised; the message is already cleaned for display.
    Raised(String),
    /// The run exceeded its budget and was interrupted by the host.
    Interrupted,
    /// The interpreter itself trapped or could not be instantiated.
    Trapped(String),
}

/// A loaded interpreter able to run source text.
///
/// `run` blocks the calling thread; the dispatcher calls it from a worker
/// thread and races it against the wall-clock budget.
pub trait HostedInterpreter: Send + Sync + 'static {
    /// Run `code`, stopping on your own accord once `budget` is spent if the
    /// interpreter supports it.
    fn run(&self, code: &str, budget: Duration) -> HostedRun;
}

/// Knows how to produce a hosted interpreter.
#[async_trait]
pub trait RuntimeSource: Send + Sync + 'static {
    /// Interpreter handle produced by a successful load.
    type Runtime: HostedInterpreter;

    /// Display name, used in logs and loader errors.
    fn name(&self) -> &'static str;

    /// Perform the (slow) load.
    async fn load(&self) -> Result<Self::Runtime, LoadError>;
}
