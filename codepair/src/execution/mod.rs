//! Multi-language code execution.
//!
//! JavaScript runs directly on an embedded interpreter, TypeScript is
//! stripped of its types first, and Python runs on a hosted WebAssembly
//! interpreter. Every execution is raced against a wall-clock budget.

mod capture;
mod dispatcher;
mod error;
mod javascript;
mod language;
mod typescript;
mod worker;

pub use capture::{
    CapturedLine, ExecutionOutcome, OutputBuffer, ERROR_MARKER, NO_OUTPUT_PLACEHOLDER,
    RESULT_MARKER, WARNING_MARKER,
};
pub use dispatcher::{Dispatcher, LOADING_HINT};
pub use error::{ErrorKind, ExecutionError};
pub use language::{Language, Strategy};
pub use typescript::strip_types;
