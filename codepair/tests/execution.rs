use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codepair::execution::{
    Dispatcher, ErrorKind, ExecutionError, NO_OUTPUT_PLACEHOLDER, RESULT_MARKER,
};
use codepair::runtime::{HostedInterpreter, HostedRun, LoadError, RuntimeSource};

/// Fake interpreter that echoes the code it was asked to run.
struct Echo;

impl HostedInterpreter for Echo {
    fn run(&self, code: &str, _budget: Duration) -> HostedRun {
        HostedRun {
            stdout: format!("ran: {code}\n"),
            ..HostedRun::default()
        }
    }
}

/// Slow source that counts how often it is asked to load.
#[derive(Clone)]
struct CountingSource {
    loads: Arc<AtomicUsize>,
    fail_first: bool,
}

impl CountingSource {
    fn new(fail_first: bool) -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            fail_first,
        }
    }
}

#[async_trait]
impl RuntimeSource for CountingSource {
    type Runtime = Echo;

    fn name(&self) -> &'static str {
        "Python"
    }

    async fn load(&self) -> Result<Echo, LoadError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail_first && attempt == 0 {
            return Err(LoadError::Init("download interrupted".to_string()));
        }
        Ok(Echo)
    }
}

fn dispatcher(timeout: Duration) -> (Dispatcher<CountingSource>, Arc<AtomicUsize>) {
    let source = CountingSource::new(false);
    let loads = Arc::clone(&source.loads);
    (Dispatcher::new(timeout, source), loads)
}

#[tokio::test]
async fn test_log_and_return_value() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let outcome = d
        .execute(r#"console.log("hi"); return 42;"#, "javascript")
        .await;

    assert!(outcome.is_success());
    assert!(outcome.output.contains("hi"));
    let last = outcome.output.lines().last().unwrap();
    assert_eq!(last, format!("{RESULT_MARKER}42"));
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let (d, _) = dispatcher(Duration::from_millis(200));
    let outcome = d.execute("while (true) {}", "javascript").await;

    assert_eq!(
        outcome.error,
        Some(ExecutionError::Timeout {
            limit: Duration::from_millis(200)
        })
    );
    assert!(!outcome.output.contains(RESULT_MARKER));
}

#[tokio::test]
async fn test_output_before_timeout_is_discarded() {
    let (d, _) = dispatcher(Duration::from_millis(200));
    let outcome = d
        .execute(r#"console.log("started"); for (;;) {}"#, "typescript")
        .await;
    assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::Timeout));
    assert!(outcome.output.is_empty());
}

#[tokio::test]
async fn test_unknown_language() {
    let (d, loads) = dispatcher(Duration::from_secs(5));
    let outcome = d.execute("print 'hi'", "perl").await;

    assert!(outcome.output.is_empty());
    assert_eq!(
        outcome.error,
        Some(ExecutionError::UnsupportedLanguage {
            language: "perl".to_string()
        })
    );
    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_catalog_language_without_interpreter() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let outcome = d.execute("int main() {}", "cpp").await;
    let err = outcome.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
    assert!(err.to_string().contains("C++"));
}

#[tokio::test]
async fn test_typescript_runs_after_stripping() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let code = r#"
interface Point {
  x: number;
  y: number;
}

function norm(p: Point): number {
  return Math.sqrt(p.x * p.x + p.y * p.y);
}

const origin: Point = { x: 3, y: 4 };
console.log(`norm is ${norm(origin)}`);
return norm(origin) as number;
"#;
    let outcome = d.execute(code, "typescript").await;
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, "norm is 5\n→ 5");
}

#[tokio::test]
async fn test_typescript_string_contents_survive_stripping() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let code = "const msg: string = \"use it as needed\";\nconsole.log(msg);\nconsole.log(\"private key\", 'public api');";
    let outcome = d.execute(code, "typescript").await;
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, "use it as needed\nprivate key public api");
}

#[tokio::test]
async fn test_deeply_nested_code_is_rejected() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let deep = format!("return {}1{};", "(".repeat(1000), ")".repeat(1000));

    for language in ["javascript", "typescript"] {
        let outcome = d.execute(&deep, language).await;
        assert!(outcome.output.is_empty());
        let err = outcome.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::RuntimeError);
        assert!(err.to_string().contains("nested too deeply"));
    }

    // Nesting just under the bound still parses on the worker's stack.
    let nested = format!("return {}1{};", "(".repeat(250), ")".repeat(250));
    let outcome = d.execute(&nested, "javascript").await;
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.output, format!("{RESULT_MARKER}1"));
}

#[tokio::test]
async fn test_empty_success_shows_placeholder() {
    let (d, _) = dispatcher(Duration::from_secs(5));
    let outcome = d.execute("const unused = 1;", "javascript").await;
    assert_eq!(outcome.output, NO_OUTPUT_PLACEHOLDER);
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn test_concurrent_preload_loads_once() {
    let (d, loads) = dispatcher(Duration::from_secs(5));
    assert!(!d.is_runtime_ready());
    assert!(!d.is_runtime_loading());

    let (a, b, c) = tokio::join!(
        d.preload_runtime(),
        d.preload_runtime(),
        d.execute("1 + 1", "python"),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(c.output, "ran: 1 + 1");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(d.is_runtime_ready());

    d.execute("2 + 2", "python").await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_load_can_be_retried() {
    let source = CountingSource::new(true);
    let loads = Arc::clone(&source.loads);
    let d = Dispatcher::new(Duration::from_secs(5), source);

    let first = d.execute("print(1)", "python").await;
    let err = first.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::LoaderError);
    assert!(err.is_retryable());
    assert!(!d.is_runtime_loading());
    assert!(!d.is_runtime_ready());

    let second = d.execute("print(1)", "python").await;
    assert_eq!(second.error, None);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
