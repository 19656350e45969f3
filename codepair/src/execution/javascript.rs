//! In-host JavaScript execution on the embedded boa interpreter.
//!
//! Every run gets a fresh realm. Console calls are captured by a shim
//! installed into that realm, so nothing leaks between runs and there is no
//! host console to restore afterwards.

use boa_engine::{context::ContextBuilder, Context, Source};
use serde::Deserialize;

use super::capture::CapturedLine;

/// Upper bound on iterations of any single loop.
///
/// Sized to a few seconds of interpreter time so the worker thread of a
/// runaway loop exits soon after its race was lost.
const LOOP_ITERATION_LIMIT: u64 = 100_000_000;

/// Deepest bracket nesting accepted before parsing.
///
/// The parser recurses once per level, so deeper sources are rejected up front.
pub(crate) const MAX_NESTING: usize = 256;

const CONSOLE_SHIM: &str = r#"
(() => {
  const lines = [];
  let settled = { state: 'empty' };
  const format = (args) => args.map((arg) => {
    if (typeof arg === 'object' && arg !== null) {
      try { return JSON.stringify(arg, null, 2); } catch (_) { return String(arg); }
    }
    return String(arg);
  }).join(' ');
  const emit = (kind) => (...args) => { lines.push([kind, format(args)]); };
  const serialize = (value) => {
    try {
      const json = JSON.stringify(value);
      return json === undefined ? String(value) : json;
    } catch (_) {
      return String(value);
    }
  };
  const describe = (error) =>
    error instanceof Error ? `${error.name}: ${error.message}` : String(error);
  const settle = (value) => {
    settled = value === undefined
      ? { state: 'empty' }
      : { state: 'value', value: serialize(value) };
  };
  const fail = (error) => { settled = { state: 'error', error: describe(error) }; };
  globalThis.console = {
    log: emit('log'),
    info: emit('log'),
    debug: emit('log'),
    warn: emit('warn'),
    error: emit('error'),
  };
  Object.defineProperty(globalThis, '__codepair', {
    value: Object.freeze({
      complete(value) {
        if (value !== null && typeof value === 'object' && typeof value.then === 'function') {
          settled = { state: 'pending' };
          value.then(settle, fail);
        } else {
          settle(value);
        }
      },
      fail,
      report: () => JSON.stringify({ lines, settled }),
    }),
  });
})();
"#;

const REPORT_CALL: &str = "__codepair.report()";

/// Captured console lines plus how the code completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptRun {
    pub lines: Vec<CapturedLine>,
    /// Serialized returned value (`None` when nothing was returned), or the
    /// error message.
    pub completion: Result<Option<String>, String>,
}

impl ScriptRun {
    fn failed(message: String) -> Self {
        Self {
            lines: Vec::new(),
            completion: Err(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    lines: Vec<(String, String)>,
    settled: Settled,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum Settled {
    Empty,
    Pending,
    Value { value: String },
    Error { error: String },
}

impl Report {
    fn captured(&self) -> Vec<CapturedLine> {
        self.lines
            .iter()
            .map(|(kind, text)| match kind.as_str() {
                "warn" => CapturedLine::Warning(text.clone()),
                "error" => CapturedLine::Error(text.clone()),
                _ => CapturedLine::Stdout(text.clone()),
            })
            .collect()
    }
}

/// Run `code` as the body of a strict-mode function in a fresh realm.
///
/// Blocks until the code finishes; callers race it against their budget.
pub(crate) fn run_script(code: &str) -> ScriptRun {
    run_limited(code, LOOP_ITERATION_LIMIT)
}

fn run_limited(code: &str, loop_limit: u64) -> ScriptRun {
    let mut context = match ContextBuilder::new().build() {
        Ok(context) => context,
        Err(e) => return ScriptRun::failed(format!("Failed to create JavaScript context: {e}")),
    };
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(loop_limit);

    if let Err(e) = context.eval(Source::from_bytes(CONSOLE_SHIM)) {
        return ScriptRun::failed(format!("Failed to install console capture: {e}"));
    }

    let evaluated = context.eval(Source::from_bytes(wrap(code).as_bytes()));
    let _ = context.run_jobs();
    let report = read_report(&mut context);

    match (evaluated, report) {
        // Parse errors and uncatchable engine errors never reach the shim.
        (Err(e), report) => ScriptRun {
            lines: report.map(|r| r.captured()).unwrap_or_default(),
            completion: Err(e.to_string()),
        },
        (Ok(_), Some(report)) => {
            let lines = report.captured();
            let completion = match report.settled {
                Settled::Empty | Settled::Pending => Ok(None),
                Settled::Value { value } => Ok(Some(value)),
                Settled::Error { error } => Err(error),
            };
            ScriptRun { lines, completion }
        }
        (Ok(_), None) => ScriptRun::failed("Failed to read script output".to_string()),
    }
}

/// Deepest nesting of `()`, `[]` and `{}` in `source`.
///
/// Every bracket byte counts, including those inside strings, comments and
/// regular expressions. Unmatched closers never take the depth below zero.
pub(crate) fn nesting_depth(source: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    for c in source.bytes() {
        match c {
            b'(' | b'[' | b'{' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn wrap(code: &str) -> String {
    format!(
        "try {{\n  __codepair.complete((function () {{\n\"use strict\";\n{code}\n}})());\n}} catch (error) {{\n  __codepair.fail(error);\n}}\n"
    )
}

fn read_report(context: &mut Context) -> Option<Report> {
    let value = context.eval(Source::from_bytes(REPORT_CALL)).ok()?;
    let json = value.as_string()?.to_std_string_escaped();
    serde_json::from_str(&json).ok()
}
