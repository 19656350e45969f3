//! Execution failure taxonomy.
//!
//! These are returned inside an [`ExecutionOutcome`](super::ExecutionOutcome),
//! never propagated as `Err` across the dispatcher boundary.

use std::time::Duration;

use thiserror::Error;

/// Why an execution did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// No strategy is available for the language.
    #[error("Execution for {language} is not supported in this environment. Only JavaScript, TypeScript and Python can be executed.")]
    UnsupportedLanguage {
        /// Display name of the language, or the raw identifier.
        language: String,
    },

    /// The run exceeded its wall-clock budget.
    #[error("Execution timed out ({} limit)", format_limit(.limit))]
    Timeout {
        /// The budget that was exceeded.
        limit: Duration,
    },

    /// The user code threw or raised.
    #[error("{message}")]
    Runtime {
        /// Readable error message, without host stack traces.
        message: String,
    },

    /// The hosted interpreter failed to initialize.
    #[error("Failed to load the {runtime} runtime: {message}")]
    Loader {
        /// Runtime display name.
        runtime: &'static str,
        /// Underlying load failure.
        message: String,
    },
}

/// Category of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedLanguage,
    Timeout,
    RuntimeError,
    LoaderError,
}

impl ErrorKind {
    /// Stable label for logs and serialized results.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedLanguage => "unsupported-language",
            Self::Timeout => "timeout",
            Self::RuntimeError => "runtime-error",
            Self::LoaderError => "loader-error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ExecutionError {
    /// Category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedLanguage { .. } => ErrorKind::UnsupportedLanguage,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Runtime { .. } => ErrorKind::RuntimeError,
            Self::Loader { .. } => ErrorKind::LoaderError,
        }
    }

    /// Whether retrying the same request may succeed (the UI offers "retry
    /// loading" rather than "fix your code").
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Loader { .. })
    }
}

fn format_limit(limit: &Duration) -> String {
    let ms = limit.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}
