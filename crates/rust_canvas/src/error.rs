//! Error taxonomy shared by the runtime, canvases and backends

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to callers of [`Runtime::use_app`](crate::Runtime::use_app),
/// [`Canvas::new`](crate::Canvas::new) and friends
#[derive(Error, Debug)]
pub enum AppError {
    /// A requested option is not supported by the selected backend, or the
    /// backend selection itself conflicts with an earlier one
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No backend could be initialized
    #[error("Could not initialize any backend ({})", describe_attempts(.attempts))]
    Selection {
        /// Every backend that was probed, in probe order, with its failure
        attempts: Vec<ProbeAttempt>,
    },

    /// A native call failed against a handle believed to be valid
    #[error("Native resource error: {0}")]
    NativeResource(String),

    /// Configuration file could not be read or written
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a single backend probe failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The toolkit is not present or not usable in this process
    #[error("toolkit unavailable: {0}")]
    Unavailable(String),

    /// The toolkit is present but refused to initialize
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

/// One entry of the aggregated selection failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    /// Registry name of the backend
    pub backend: String,
    /// Human readable failure reason
    pub reason: String,
    /// Severity the failure was logged at; `Warn` when the toolkit was
    /// already loaded and was expected to work
    pub level: log::Level,
}

impl fmt::Display for ProbeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.reason)
    }
}

fn describe_attempts(attempts: &[ProbeAttempt]) -> String {
    if attempts.is_empty() {
        return "no backends registered".to_string();
    }
    let tried: Vec<String> = attempts.iter().map(ToString::to_string).collect();
    format!("tried {}", tried.join("; "))
}
