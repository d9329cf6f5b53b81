//! Configuration system
//!
//! Process-level settings ([`AppConfig`]), the facts the backend probe relies
//! on ([`ProbeEnvironment`]) and the [`Config`] trait that loads and saves any
//! of the serializable records from TOML or RON files.

pub use serde::{Serialize, Deserialize};

use std::time::Duration;

use crate::input::InputTiming;
use crate::input::mouse::{DOUBLE_CLICK_THRESHOLD, MOVE_THROTTLE};

/// Environment variable that forces a specific backend, bypassing the probe order
pub const FORCED_BACKEND_ENV: &str = "RUST_CANVAS_TEST_APP";

/// Environment variable that turns blocking `run()` calls into no-ops
/// (set while generating galleries of examples)
pub const SUPPRESS_RUN_ENV: &str = "RUST_CANVAS_RUNNING_GALLERY_EXAMPLES";

/// Backend name meaning "no preference"
pub const DEFAULT_BACKEND: &str = "default";

/// Returns true for the "no preference" sentinel
pub fn is_default_backend(name: &str) -> bool {
    name.trim().is_empty() || name.eq_ignore_ascii_case(DEFAULT_BACKEND)
}

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Process-wide settings consumed by the runtime and every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend tried right after already-loaded toolkits; `"default"` for none
    pub default_backend: String,
    /// Maximum gap between two presses that still counts as a double-click
    pub double_click_threshold_secs: f64,
    /// Minimum spacing between two synthesized mouse move events
    pub move_throttle_secs: f64,
    /// Upper bound on how long the interactive hook blocks per iteration
    pub interactive_budget_ms: u64,
    /// Sleep between passes of the blocking `run()` loops
    pub run_poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_backend: DEFAULT_BACKEND.to_string(),
            double_click_threshold_secs: DOUBLE_CLICK_THRESHOLD,
            move_throttle_secs: MOVE_THROTTLE,
            interactive_budget_ms: 5,
            run_poll_interval_ms: 1,
        }
    }
}

impl Config for AppConfig {}

impl AppConfig {
    /// Set the preferred backend
    pub fn with_default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = name.into();
        self
    }

    /// Override the double-click and move-throttle timings
    pub fn with_input_timing(mut self, timing: InputTiming) -> Self {
        self.double_click_threshold_secs = timing.double_click_threshold;
        self.move_throttle_secs = timing.move_throttle;
        self
    }

    /// Timings handed to every canvas' mouse synthesizer
    pub fn input_timing(&self) -> InputTiming {
        InputTiming {
            double_click_threshold: self.double_click_threshold_secs,
            move_throttle: self.move_throttle_secs,
        }
    }

    /// Per-iteration blocking budget of the interactive hook
    pub fn interactive_budget(&self) -> Duration {
        Duration::from_millis(self.interactive_budget_ms)
    }

    /// Sleep between passes of blocking event loops
    pub fn run_poll_interval(&self) -> Duration {
        Duration::from_millis(self.run_poll_interval_ms)
    }
}

/// Facts about the hosting process that drive backend selection
///
/// Rust has no global module table to inspect, so the embedding application
/// declares which native toolkits it has already initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEnvironment {
    /// Whether a display server is reachable
    pub display_available: bool,
    /// Toolkits already initialized in this process, by toolkit name
    pub loaded_toolkits: Vec<String>,
    /// Backend forced by the test harness environment variable
    pub forced_backend: Option<String>,
    /// Whether blocking `run()` calls should return immediately
    pub suppress_run: bool,
}

impl Default for ProbeEnvironment {
    fn default() -> Self {
        Self {
            display_available: true,
            loaded_toolkits: Vec::new(),
            forced_backend: None,
            suppress_run: false,
        }
    }
}

impl ProbeEnvironment {
    /// Capture the environment of the current process
    pub fn from_env() -> Self {
        let display_available = if cfg!(target_os = "linux") {
            ["DISPLAY", "WAYLAND_DISPLAY"]
                .iter()
                .any(|var| std::env::var(var).is_ok_and(|value| !value.is_empty()))
        } else {
            true
        };
        let forced_backend = std::env::var(FORCED_BACKEND_ENV)
            .ok()
            .filter(|name| !is_default_backend(name));
        let suppress_run = std::env::var_os(SUPPRESS_RUN_ENV).is_some();

        Self {
            display_available,
            loaded_toolkits: Vec::new(),
            forced_backend,
            suppress_run,
        }
    }

    /// Override display detection
    pub fn with_display(mut self, available: bool) -> Self {
        self.display_available = available;
        self
    }

    /// Declare a toolkit as already initialized in this process
    pub fn with_loaded_toolkit(mut self, toolkit: impl Into<String>) -> Self {
        self.loaded_toolkits.push(toolkit.into());
        self
    }

    /// Force a backend by name
    pub fn with_forced_backend(mut self, name: impl Into<String>) -> Self {
        self.forced_backend = Some(name.into());
        self
    }

    /// Make `run()` return immediately
    pub fn with_suppress_run(mut self, suppress: bool) -> Self {
        self.suppress_run = suppress;
        self
    }

    /// No display server is reachable
    pub fn is_headless(&self) -> bool {
        !self.display_available
    }

    /// Whether `toolkit` was declared as loaded (case-insensitive)
    pub fn toolkit_loaded(&self, toolkit: &str) -> bool {
        self.loaded_toolkits
            .iter()
            .any(|loaded| loaded.eq_ignore_ascii_case(toolkit))
    }
}
