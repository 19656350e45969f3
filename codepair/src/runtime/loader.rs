//! Lazy, de-duplicated loading of a hosted interpreter.
//!
//! State machine:
//!
//! ```text
//! Unloaded --request--> Loading --ok--> Ready
//!     ^                    |
//!     +-------error--------+
//! ```
//!
//! The in-flight load is cached as a shared future, so every request that
//! arrives while `Loading` awaits the same completion instead of starting a
//! second load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::{LoadError, RuntimeSource};

type PendingLoad<R> = Shared<BoxFuture<'static, Result<Arc<R>, LoadError>>>;

enum LoadState<R> {
    Unloaded,
    Loading {
        attempt: u64,
        pending: PendingLoad<R>,
    },
    Ready(Arc<R>),
}

/// Observable phase of a [`RuntimeLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing loaded; the next request starts a load.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// The runtime handle is cached.
    Ready,
}

impl LoadPhase {
    /// Lowercase label for logs and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
        }
    }
}

impl std::fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Loads a runtime from `S` at most once and caches the singleton handle.
pub struct RuntimeLoader<S: RuntimeSource> {
    source: Arc<S>,
    state: Mutex<LoadState<S::Runtime>>,
    attempts: AtomicU64,
}

impl<S: RuntimeSource> std::fmt::Debug for RuntimeLoader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeLoader")
            .field("runtime", &self.source.name())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl<S: RuntimeSource> RuntimeLoader<S> {
    /// Create a loader in the `Unloaded` state.
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            state: Mutex::new(LoadState::Unloaded),
            attempts: AtomicU64::new(0),
        }
    }

    /// Human-readable name of the runtime being loaded.
    pub fn name(&self) -> &'static str {
        self.source.name()
    }

    /// Return the runtime, loading it first if needed.
    ///
    /// Concurrent callers share one load. A failed load returns the loader to
    /// `Unloaded`, so a later call retries.
    pub async fn get(&self) -> Result<Arc<S::Runtime>, LoadError> {
        let (attempt, pending) = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(runtime) => return Ok(Arc::clone(runtime)),
                LoadState::Loading { attempt, pending } => (*attempt, pending.clone()),
                LoadState::Unloaded => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let pending = self.start_load(attempt);
                    *state = LoadState::Loading {
                        attempt,
                        pending: pending.clone(),
                    };
                    (attempt, pending)
                }
            }
        };

        let result = pending.await;
        self.settle(attempt, &result);
        result
    }

    /// Whether the runtime handle is cached.
    pub fn is_ready(&self) -> bool {
        self.phase() == LoadPhase::Ready
    }

    /// Whether a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.phase() == LoadPhase::Loading
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> LoadPhase {
        match &*self.state.lock() {
            LoadState::Unloaded => LoadPhase::Unloaded,
            LoadState::Loading { .. } => LoadPhase::Loading,
            LoadState::Ready(_) => LoadPhase::Ready,
        }
    }

    fn start_load(&self, attempt: u64) -> PendingLoad<S::Runtime> {
        let source = Arc::clone(&self.source);
        async move {
            let started = Instant::now();
            info!(runtime = source.name(), attempt, "loading runtime");
            let runtime = source.load().await?;
            info!(
                runtime = source.name(),
                attempt,
                elapsed = ?started.elapsed(),
                "runtime ready"
            );
            Ok(Arc::new(runtime))
        }
        .boxed()
        .shared()
    }

    /// Move out of `Loading` once the load for `attempt` has completed.
    fn settle(&self, attempt: u64, result: &Result<Arc<S::Runtime>, LoadError>) {
        let mut state = self.state.lock();
        let current = matches!(&*state, LoadState::Loading { attempt: a, .. } if *a == attempt);
        if !current {
            return;
        }
        *state = match result {
            Ok(runtime) => LoadState::Ready(Arc::clone(runtime)),
            Err(e) => {
                warn!(runtime = self.source.name(), attempt, error = %e, "runtime load failed");
                LoadState::Unloaded
            }
        };
    }
}
