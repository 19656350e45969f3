//! Routes `(code, language)` to an execution strategy and normalizes the
//! result into an [`ExecutionOutcome`].

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::capture::{CapturedLine, ExecutionOutcome, OutputBuffer};
use super::error::ExecutionError;
use super::javascript::{self, nesting_depth, ScriptRun, MAX_NESTING};
use super::language::{Language, Strategy};
use super::typescript::strip_types;
use super::worker::{race, WorkerError};
use crate::config::Config;
use crate::runtime::{
    HostedFailure, HostedInterpreter, HostedRun, LoadError, LoadPhase, RuntimeLoader,
    RuntimeSource, WasiPythonSource,
};

/// Shown while the hosted interpreter is loading for the first time.
pub const LOADING_HINT: &str = "Loading Python runtime (first run may take a few seconds)...";

/// Executes user code in the language it is written in.
///
/// The hosted runtime is loaded lazily through a [`RuntimeLoader`], so
/// concurrent executions and preloads share one load.
pub struct Dispatcher<S: RuntimeSource = WasiPythonSource> {
    timeout: Duration,
    hosted: RuntimeLoader<S>,
}

impl<S: RuntimeSource> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .field("hosted", &self.hosted)
            .finish()
    }
}

impl Dispatcher<WasiPythonSource> {
    /// Build a dispatcher using the configured budget and Python module.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.execution.timeout(),
            WasiPythonSource::new(config.python.clone()),
        )
    }
}

impl<S: RuntimeSource> Dispatcher<S> {
    /// Create a dispatcher with the given wall-clock budget per execution.
    pub fn new(timeout: Duration, hosted: S) -> Self {
        Self {
            timeout,
            hosted: RuntimeLoader::new(hosted),
        }
    }

    /// Execute `code` as `language`.
    ///
    /// Never fails: every problem is reported through
    /// [`ExecutionOutcome::error`].
    pub async fn execute(&self, code: &str, language: &str) -> ExecutionOutcome {
        let started = Instant::now();
        let outcome = match Language::from_str(language) {
            Some(lang) => match lang.strategy() {
                Strategy::Direct | Strategy::Stripped if nesting_depth(code) > MAX_NESTING => {
                    too_deep()
                }
                Strategy::Direct => self.run_direct(code.to_string()).await,
                Strategy::Stripped => self.run_direct(strip_types(code)).await,
                Strategy::Hosted => self.run_hosted(code).await,
                Strategy::Unsupported => unsupported(lang.display_name()),
            },
            None => unsupported(language.trim()),
        };

        let elapsed = started.elapsed();
        match &outcome.error {
            None => info!(language, ?elapsed, "Execution completed"),
            Some(e) => info!(language, ?elapsed, kind = %e.kind(), "Execution failed"),
        }
        outcome
    }

    /// Load the hosted runtime now, ahead of the first execution.
    pub async fn preload_runtime(&self) -> Result<(), LoadError> {
        self.hosted.get().await.map(|_| ())
    }

    /// Whether the hosted runtime is loaded.
    pub fn is_runtime_ready(&self) -> bool {
        self.hosted.is_ready()
    }

    /// Whether the hosted runtime is currently loading.
    pub fn is_runtime_loading(&self) -> bool {
        self.hosted.is_loading()
    }

    /// Loader state, for status displays.
    pub fn runtime_phase(&self) -> LoadPhase {
        self.hosted.phase()
    }

    /// Whether selecting `language` should start a background preload.
    pub fn wants_preload(&self, language: &str) -> bool {
        is_hosted(language) && self.hosted.phase() == LoadPhase::Unloaded
    }

    /// Hint to show while executing `language`, if its first run will be slow.
    pub fn loading_hint(&self, language: &str) -> Option<&'static str> {
        (is_hosted(language) && !self.hosted.is_ready()).then_some(LOADING_HINT)
    }

    async fn run_direct(&self, code: String) -> ExecutionOutcome {
        match race("js", self.timeout, move || javascript::run_script(&code)).await {
            Ok(run) => script_outcome(run),
            Err(e) => self.lost_race(e),
        }
    }

    async fn run_hosted(&self, code: &str) -> ExecutionOutcome {
        let runtime = match self.hosted.get().await {
            Ok(runtime) => runtime,
            Err(e) => {
                return ExecutionOutcome::failure(
                    ExecutionError::Loader {
                        runtime: self.hosted.name(),
                        message: e.to_string(),
                    },
                    String::new(),
                )
            }
        };

        let code = code.to_string();
        let budget = self.timeout;
        match race("hosted", budget, move || runtime.run(&code, budget)).await {
            Ok(run) => self.hosted_outcome(run),
            Err(e) => self.lost_race(e),
        }
    }

    fn hosted_outcome(&self, run: HostedRun) -> ExecutionOutcome {
        let mut buffer = OutputBuffer::new();
        if !run.stdout.trim().is_empty() {
            buffer.push(CapturedLine::Stdout(run.stdout.trim_end().to_string()));
        }

        match run.failure {
            Some(HostedFailure::Interrupted) => self.timed_out(),
            Some(HostedFailure::Raised(message)) => {
                ExecutionOutcome::failure(ExecutionError::Runtime { message }, buffer.render())
            }
            Some(HostedFailure::Trapped(message)) => ExecutionOutcome::failure(
                ExecutionError::Runtime {
                    message: format!("Interpreter error: {message}"),
                },
                buffer.render(),
            ),
            None => {
                if let Some(result) = run.result {
                    buffer.push(CapturedLine::Result(result));
                }
                let stderr = run.stderr.trim();
                if !stderr.is_empty() {
                    buffer.push(CapturedLine::Warning(stderr.to_string()));
                }
                ExecutionOutcome::success(buffer.into_output())
            }
        }
    }

    fn lost_race(&self, error: WorkerError) -> ExecutionOutcome {
        match error {
            WorkerError::TimedOut => self.timed_out(),
            WorkerError::Lost(message) => {
                ExecutionOutcome::failure(ExecutionError::Runtime { message }, String::new())
            }
        }
    }

    fn timed_out(&self) -> ExecutionOutcome {
        debug!(limit = ?self.timeout, "Discarding output of timed out execution");
        ExecutionOutcome::failure(
            ExecutionError::Timeout {
                limit: self.timeout,
            },
            String::new(),
        )
    }
}

fn script_outcome(run: ScriptRun) -> ExecutionOutcome {
    let mut buffer = OutputBuffer::new();
    buffer.extend(run.lines);
    match run.completion {
        Ok(result) => {
            if let Some(value) = result {
                buffer.push(CapturedLine::Result(value));
            }
            ExecutionOutcome::success(buffer.into_output())
        }
        Err(message) => {
            ExecutionOutcome::failure(ExecutionError::Runtime { message }, buffer.render())
        }
    }
}

fn unsupported(language: &str) -> ExecutionOutcome {
    ExecutionOutcome::failure(
        ExecutionError::UnsupportedLanguage {
            language: language.to_string(),
        },
        String::new(),
    )
}

fn too_deep() -> ExecutionOutcome {
    ExecutionOutcome::failure(
        ExecutionError::Runtime {
            message: format!(
                "Code is nested too deeply (more than {MAX_NESTING} levels of brackets)"
            ),
        },
        String::new(),
    )
}

fn is_hosted(language: &str) -> bool {
    Language::from_str(language).is_some_and(|l| l.strategy() == Strategy::Hosted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::capture::NO_OUTPUT_PLACEHOLDER;
    use async_trait::async_trait;

    /// Hosted runtime that replays a canned run.
    struct Canned(HostedRun);

    impl HostedInterpreter for Canned {
        fn run(&self, _code: &str, _budget: Duration) -> HostedRun {
            self.0.clone()
        }
    }

    struct CannedSource(HostedRun);

    #[async_trait]
    impl RuntimeSource for CannedSource {
        type Runtime = Canned;

        fn name(&self) -> &'static str {
            "Python"
        }

        async fn load(&self) -> Result<Canned, LoadError> {
            Ok(Canned(self.0.clone()))
        }
    }

    fn dispatcher(run: HostedRun) -> Dispatcher<CannedSource> {
        Dispatcher::new(Duration::from_secs(2), CannedSource(run))
    }

    #[tokio::test]
    async fn test_javascript_output_and_result() {
        let outcome = dispatcher(HostedRun::default())
            .execute(r#"console.log("hi"); return 42;"#, "javascript")
            .await;
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.output, "hi\n→ 42");
    }

    #[tokio::test]
    async fn test_javascript_placeholder() {
        let outcome = dispatcher(HostedRun::default())
            .execute("let x = 1;", "js")
            .await;
        assert_eq!(outcome.output, NO_OUTPUT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_javascript_error_keeps_partial_output() {
        let outcome = dispatcher(HostedRun::default())
            .execute(r#"console.warn("w"); throw new Error("boom");"#, "javascript")
            .await;
        assert_eq!(outcome.output, "⚠️ w");
        assert_eq!(
            outcome.error,
            Some(ExecutionError::Runtime {
                message: "Error: boom".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_typescript_is_stripped() {
        let outcome = dispatcher(HostedRun::default())
            .execute(
                "function double(n: number): number { return n * 2; }\nreturn double(21);",
                "typescript",
            )
            .await;
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.output, "→ 42");
    }

    #[tokio::test]
    async fn test_deep_nesting_is_rejected_before_parsing() {
        let d = dispatcher(HostedRun::default());
        let deep = format!("return {}1{};", "(".repeat(1000), ")".repeat(1000));

        for language in ["javascript", "typescript"] {
            let outcome = d.execute(&deep, language).await;
            assert!(outcome.output.is_empty());
            let err = outcome.error.unwrap();
            assert_eq!(err.kind(), crate::execution::ErrorKind::RuntimeError);
            assert!(err.to_string().contains("nested too deeply"));
        }
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let d = dispatcher(HostedRun::default());
        let outcome = d.execute("fn main() {}", "rust").await;
        assert!(outcome.output.is_empty());
        assert_eq!(
            outcome.error,
            Some(ExecutionError::UnsupportedLanguage {
                language: "Rust".to_string()
            })
        );

        let outcome = d.execute("", "cobol").await;
        assert_eq!(
            outcome.error.map(|e| e.kind()),
            Some(crate::execution::ErrorKind::UnsupportedLanguage)
        );
    }

    #[tokio::test]
    async fn test_hosted_output_order() {
        let d = dispatcher(HostedRun {
            stdout: "hello\n".to_string(),
            stderr: "DeprecationWarning: old\n".to_string(),
            result: Some("3".to_string()),
            failure: None,
        });
        let outcome = d.execute("print('hello')\n1 + 2", "python").await;
        assert_eq!(outcome.output, "hello\n→ 3\n⚠️ DeprecationWarning: old");
        assert!(d.is_runtime_ready());
    }

    #[tokio::test]
    async fn test_hosted_raise_keeps_stdout() {
        let d = dispatcher(HostedRun {
            stdout: "partial\n".to_string(),
            failure: Some(HostedFailure::Raised("ValueError: bad (line 2)".to_string())),
            ..HostedRun::default()
        });
        let outcome = d.execute("print('partial')\nraise ValueError('bad')", "py").await;
        assert_eq!(outcome.output, "partial");
        assert_eq!(
            outcome.error.map(|e| e.to_string()),
            Some("ValueError: bad (line 2)".to_string())
        );
    }

    #[tokio::test]
    async fn test_hosted_interrupt_is_timeout() {
        let d = dispatcher(HostedRun {
            stdout: "spinning".to_string(),
            failure: Some(HostedFailure::Interrupted),
            ..HostedRun::default()
        });
        let outcome = d.execute("while True: pass", "python").await;
        assert!(outcome.output.is_empty());
        assert_eq!(
            outcome.error,
            Some(ExecutionError::Timeout {
                limit: Duration::from_secs(2)
            })
        );
    }

    #[tokio::test]
    async fn test_preload_hints() {
        let d = dispatcher(HostedRun::default());
        assert_eq!(d.runtime_phase(), LoadPhase::Unloaded);
        assert!(d.wants_preload("python"));
        assert!(!d.wants_preload("javascript"));
        assert_eq!(d.loading_hint("python"), Some(LOADING_HINT));
        assert_eq!(d.loading_hint("typescript"), None);

        d.preload_runtime().await.unwrap();
        assert_eq!(d.runtime_phase(), LoadPhase::Ready);
        assert!(d.is_runtime_ready());
        assert!(!d.is_runtime_loading());
        assert!(!d.wants_preload("python"));
        assert_eq!(d.loading_hint("python"), None);
    }

    #[tokio::test]
    async fn test_loader_failure_is_retryable_error() {
        let d = Dispatcher::from_config(&Config::default());
        let outcome = d.execute("print(1)", "python").await;
        let err = outcome.error.unwrap();
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Failed to load the Python runtime"));
        assert!(!d.is_runtime_ready());
    }
}
