//! CPython compiled to `wasm32-wasip1`, run under Wasmtime.
//!
//! # Flow
//!
//! 1. [`WasiPythonSource::load`] reads the interpreter module and compiles it
//!    once (the slow part, done on the blocking pool).
//! 2. Each [`WasiPython::run`] instantiates the module in a fresh store with
//!    stdin/stdout/stderr wired to in-memory pipes.
//! 3. A small driver script, passed with `-c`, reads the user code from stdin,
//!    executes it, and reports the value of a trailing expression or the
//!    raised exception after a marker, so the host can separate them from
//!    ordinary program output.
//! 4. An epoch ticker interrupts runs that exceed their budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::p1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use super::{HostedFailure, HostedInterpreter, HostedRun, LoadError, RuntimeSource};
use crate::config::PythonConfig;

/// Granularity of the epoch ticker.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Precedes the `repr` of the trailing expression on stdout.
const RESULT_MARKER: &str = "\u{1e}codepair:result\u{1e}";

/// Precedes the formatted exception on stderr.
const ERROR_MARKER: &str = "\u{1e}codepair:error\u{1e}";

/// File name user code is compiled under, so its frames can be told apart.
const SESSION_FILE: &str = "<session>";

const DRIVER: &str = r#"
import ast, sys, traceback

def _codepair_main():
    source = sys.stdin.read()
    scope = {"__name__": "__main__", "__builtins__": __builtins__}
    try:
        tree = ast.parse(source, "<session>", "exec")
        tail = None
        if tree.body and isinstance(tree.body[-1], ast.Expr):
            tail = ast.Expression(tree.body.pop().value)
        exec(compile(tree, "<session>", "exec"), scope)
        value = eval(compile(tail, "<session>", "eval"), scope) if tail is not None else None
    except SystemExit:
        raise
    except BaseException as exc:
        sys.stdout.flush()
        report = "".join(traceback.format_exception(type(exc), exc, exc.__traceback__))
        sys.stderr.write("\x1ecodepair:error\x1e" + report)
        sys.stderr.flush()
        sys.exit(1)
    sys.stdout.flush()
    if value is not None:
        sys.stdout.write("\x1ecodepair:result\x1e" + repr(value))
        sys.stdout.flush()

_codepair_main()
"#;

/// Loads the CPython WASI module described by a [`PythonConfig`].
#[derive(Debug, Clone)]
pub struct WasiPythonSource {
    config: PythonConfig,
}

impl WasiPythonSource {
    /// Create a source for the configured module.
    pub const fn new(config: PythonConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RuntimeSource for WasiPythonSource {
    type Runtime = WasiPython;

    fn name(&self) -> &'static str {
        "Python"
    }

    async fn load(&self) -> Result<WasiPython, LoadError> {
        let path = self
            .config
            .wasm_path
            .clone()
            .ok_or(LoadError::NotConfigured("python.wasm_path or CODEPAIR_PYTHON_WASM"))?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| LoadError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "compiling interpreter module");

        let (engine, module) = tokio::task::spawn_blocking(move || compile(&bytes))
            .await
            .map_err(|e| LoadError::Init(format!("compile task failed: {e}")))??;

        Ok(WasiPython::new(engine, module, self.config.clone()))
    }
}

fn compile(bytes: &[u8]) -> Result<(Engine, Module), LoadError> {
    let mut config = Config::new();
    config.epoch_interruption(true);

    let engine =
        Engine::new(&config).map_err(|e| LoadError::Init(format!("wasm engine: {e}")))?;
    let module = Module::new(&engine, bytes)
        .map_err(|e| LoadError::Init(format!("invalid interpreter module: {e}")))?;
    Ok((engine, module))
}

/// Store data for one run.
struct RunState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// A compiled CPython module ready to run code.
pub struct WasiPython {
    engine: Engine,
    module: Module,
    config: PythonConfig,
    ticker_stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for WasiPython {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasiPython")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WasiPython {
    fn new(engine: Engine, module: Module, config: PythonConfig) -> Self {
        let ticker_stop = Arc::new(AtomicBool::new(false));
        spawn_epoch_ticker(engine.clone(), Arc::clone(&ticker_stop));
        Self {
            engine,
            module,
            config,
            ticker_stop,
        }
    }

    fn run_module(&self, code: &str, budget: Duration) -> anyhow::Result<HostedRun> {
        let stdin = MemoryInputPipe::new(code.as_bytes().to_vec());
        let stdout = MemoryOutputPipe::new(self.config.max_output_bytes);
        let stderr = MemoryOutputPipe::new(self.config.max_output_bytes);

        let mut wasi = WasiCtxBuilder::new();
        wasi.stdin(stdin)
            .stdout(stdout.clone())
            .stderr(stderr.clone())
            .args(&["python", "-c", DRIVER])
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1");

        if let Some(dir) = &self.config.stdlib_dir {
            wasi.preopened_dir(dir, &self.config.guest_stdlib_path, DirPerms::READ, FilePerms::READ)?;
        }

        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory_mb.saturating_mul(1024 * 1024))
            .build();
        let mut store = Store::new(
            &self.engine,
            RunState {
                wasi: wasi.build_p1(),
                limits,
            },
        );
        store.limiter(|state| &mut state.limits);
        store.set_epoch_deadline(deadline_ticks(budget));

        let mut linker: Linker<RunState> = Linker::new(&self.engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |state: &mut RunState| &mut state.wasi)?;

        let instance = linker.instantiate(&mut store, &self.module)?;
        let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;

        let (exit_code, interrupted) = match start.call(&mut store, ()) {
            Ok(()) => (0, false),
            Err(e) => {
                if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
                    (exit.0, false)
                } else if matches!(e.downcast_ref::<Trap>(), Some(Trap::Interrupt)) {
                    (1, true)
                } else {
                    return Err(e.into());
                }
            }
        };

        let stdout = String::from_utf8_lossy(&stdout.contents()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.contents()).into_owned();
        Ok(collect_run(&stdout, &stderr, exit_code, interrupted))
    }
}

impl HostedInterpreter for WasiPython {
    fn run(&self, code: &str, budget: Duration) -> HostedRun {
        self.run_module(code, budget).unwrap_or_else(|e| {
            warn!(error = %e, "python module trapped");
            HostedRun {
                failure: Some(HostedFailure::Trapped(e.to_string())),
                ..HostedRun::default()
            }
        })
    }
}

impl Drop for WasiPython {
    fn drop(&mut self) {
        self.ticker_stop.store(true, Ordering::SeqCst);
    }
}

fn spawn_epoch_ticker(engine: Engine, stop: Arc<AtomicBool>) {
    let spawned = thread::Builder::new()
        .name("codepair-epoch".to_string())
        .spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(EPOCH_TICK);
                engine.increment_epoch();
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start epoch ticker, python runs rely on the dispatcher timeout only");
    }
}

fn deadline_ticks(budget: Duration) -> u64 {
    let ticks = budget.as_millis() / EPOCH_TICK.as_millis();
    u64::try_from(ticks).unwrap_or(u64::MAX).saturating_add(1)
}

/// Split the captured streams into output, trailing value and failure.
fn collect_run(stdout: &str, stderr: &str, exit_code: i32, interrupted: bool) -> HostedRun {
    let (stdout, result) = split_marker(stdout, RESULT_MARKER);
    let (stderr, report) = split_marker(stderr, ERROR_MARKER);

    let failure = if interrupted {
        Some(HostedFailure::Interrupted)
    } else if let Some(report) = report {
        Some(HostedFailure::Raised(clean_traceback(&report)))
    } else if exit_code != 0 {
        Some(HostedFailure::Raised(format!("Program exited with status {exit_code}")))
    } else {
        None
    };

    HostedRun {
        stdout,
        stderr,
        result: result.filter(|r| !r.is_empty() && r != "None"),
        failure,
    }
}

fn split_marker(text: &str, marker: &str) -> (String, Option<String>) {
    match text.split_once(marker) {
        Some((before, after)) => (before.to_string(), Some(after.to_string())),
        None => (text.to_string(), None),
    }
}

/// Reduce a formatted traceback to the exception summary and the user line.
///
/// Frames from the driver script and the `Traceback` header are dropped.
fn clean_traceback(report: &str) -> String {
    let report = report.trim();
    let lines: Vec<&str> = report.lines().collect();

    // Frame, source and caret lines are indented; the summary follows them.
    let summary_start = lines
        .iter()
        .rposition(|l| l.starts_with(' ') || l.starts_with('\t'))
        .map_or(0, |i| i + 1);
    let summary = lines[summary_start..]
        .iter()
        .filter(|l| !l.starts_with("Traceback (most recent call last)"))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let summary = summary.trim();
    let summary = summary.strip_prefix("PythonError:").unwrap_or(summary).trim();
    let summary = if summary.is_empty() { report } else { summary };

    match session_line(report) {
        Some(line) => format!("{summary} (line {line})"),
        None => summary.to_string(),
    }
}

/// Line number of the innermost frame inside user code.
fn session_line(report: &str) -> Option<u32> {
    let needle = format!("File \"{SESSION_FILE}\", line ");
    report
        .lines()
        .filter_map(|l| l.split_once(needle.as_str()).map(|(_, rest)| rest))
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .last()
}
