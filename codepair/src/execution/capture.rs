//! Captured program output and the normalized execution result.

use serde::{Serialize, Serializer};

use super::error::ExecutionError;

/// Prefix for warning lines.
pub const WARNING_MARKER: &str = "⚠️ ";
/// Prefix for error lines.
pub const ERROR_MARKER: &str = "❌ ";
/// Prefix for the line holding the returned value.
pub const RESULT_MARKER: &str = "→ ";
/// Shown instead of an empty successful output.
pub const NO_OUTPUT_PLACEHOLDER: &str = "Code executed successfully (no output)";

/// One line of captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedLine {
    /// Ordinary output.
    Stdout(String),
    /// Warning output.
    Warning(String),
    /// Error output that did not stop the program.
    Error(String),
    /// Serialized value the program evaluated to.
    Result(String),
}

impl CapturedLine {
    fn render(&self) -> String {
        match self {
            Self::Stdout(text) => text.clone(),
            Self::Warning(text) => format!("{WARNING_MARKER}{text}"),
            Self::Error(text) => format!("{ERROR_MARKER}{text}"),
            Self::Result(text) => format!("{RESULT_MARKER}{text}"),
        }
    }
}

/// Output lines in the order the program produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    lines: Vec<CapturedLine>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn push(&mut self, line: CapturedLine) {
        self.lines.push(line);
    }

    /// Render all lines with their markers, trimmed.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(CapturedLine::render)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Render for a successful run; never blank.
    pub fn into_output(self) -> String {
        let rendered = self.render();
        if rendered.is_empty() {
            NO_OUTPUT_PLACEHOLDER.to_string()
        } else {
            rendered
        }
    }
}

impl Extend<CapturedLine> for OutputBuffer {
    fn extend<I: IntoIterator<Item = CapturedLine>>(&mut self, iter: I) {
        self.lines.extend(iter);
    }
}

/// Uniform `{output, error}` result of an execution.
///
/// When `error` is set, `output` may still hold output produced before the
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Rendered output.
    pub output: String,
    /// Failure, if the run did not complete normally.
    pub error: Option<ExecutionError>,
}

impl ExecutionOutcome {
    /// A completed run.
    pub const fn success(output: String) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// A failed run with whatever output was captured before the failure.
    pub const fn failure(error: ExecutionError, partial_output: String) -> Self {
        Self {
            output: partial_output,
            error: Some(error),
        }
    }

    /// Whether the run completed normally.
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Serialize for ExecutionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            output: &'a str,
            error: Option<String>,
            kind: Option<&'static str>,
        }

        Wire {
            output: &self.output,
            error: self.error.as_ref().map(ToString::to_string),
            kind: self.error.as_ref().map(|e| e.kind().as_str()),
        }
        .serialize(serializer)
    }
}
