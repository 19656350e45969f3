//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the TOML file (an explicit
//! `--config` path, or `<config dir>/codepair/config.toml` when it exists),
//! then `CODEPAIR_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Wall-clock budget for one execution unless configured otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

const ENV_TIMEOUT_MS: &str = "CODEPAIR_TIMEOUT_MS";
const ENV_PYTHON_WASM: &str = "CODEPAIR_PYTHON_WASM";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Limits applied to every execution.
    pub execution: ExecutionConfig,
    /// Hosted Python interpreter.
    pub python: PythonConfig,
}

/// Limits applied to every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock budget in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ExecutionConfig {
    /// The budget as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where the CPython WASI module lives and how it may run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Path to the `python.wasm` module.
    pub wasm_path: Option<PathBuf>,
    /// Host directory holding the standard library, if not bundled.
    pub stdlib_dir: Option<PathBuf>,
    /// Guest path the standard library is mounted at.
    pub guest_stdlib_path: String,
    /// Capacity of each captured output stream, in bytes.
    pub max_output_bytes: usize,
    /// Linear memory ceiling, in MiB.
    pub max_memory_mb: usize,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            wasm_path: None,
            stdlib_dir: None,
            guest_stdlib_path: "/usr/local/lib".to_string(),
            max_output_bytes: 1024 * 1024,
            max_memory_mb: 256,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.is_file()),
        };

        let mut config = match file {
            Some(p) => {
                let text = std::fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config file {}", p.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML")?;
        if config.execution.timeout_ms == 0 {
            bail!("execution.timeout_ms must be greater than zero");
        }
        Ok(config)
    }

    /// `<config dir>/codepair/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("codepair").join("config.toml"))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let timeout_ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TIMEOUT_MS} is not a number: {raw}"))?;
            if timeout_ms == 0 {
                bail!("{ENV_TIMEOUT_MS} must be greater than zero");
            }
            self.execution.timeout_ms = timeout_ms;
        }
        if let Some(path) = lookup(ENV_PYTHON_WASM).filter(|p| !p.trim().is_empty()) {
            self.python.wasm_path = Some(PathBuf::from(path));
        }
        Ok(())
    }
}
