//! Configuration types for deskgrab

use crate::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Capture configuration.
///
/// Read once per capture call; the dispatcher works on its own clone so a
/// reload never changes behaviour halfway through a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Use the helper capture tool instead of the portal on compositors
    /// where both are possible
    pub prefer_helper_tool: bool,
    /// Silence the advisory warnings about the helper/portal trade-off
    pub suppress_helper_warnings: bool,
    /// Helper capture program (invoked as `<program> -t ppm <path>`)
    pub helper_program: String,
    /// Upper bound on the helper program's runtime
    pub helper_timeout_ms: u64,
    /// Monitor introspection program (invoked as `<program> monitors -j`)
    pub monitor_query_program: String,
    /// Upper bound on the introspection program's runtime
    pub monitor_query_timeout_ms: u64,
    /// How long to wait for the portal's response signal
    pub portal_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            prefer_helper_tool: false,
            suppress_helper_warnings: false,
            helper_program: "grim".to_string(),
            helper_timeout_ms: 30_000,
            monitor_query_program: "hyprctl".to_string(),
            monitor_query_timeout_ms: 1_000,
            portal_timeout_secs: 60,
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: prefer the helper tool over the portal
    pub fn with_prefer_helper_tool(mut self, prefer: bool) -> Self {
        self.prefer_helper_tool = prefer;
        self
    }

    /// Builder pattern: suppress helper-tool advisories
    pub fn with_suppress_helper_warnings(mut self, suppress: bool) -> Self {
        self.suppress_helper_warnings = suppress;
        self
    }

    /// Builder pattern: set the helper capture program
    pub fn with_helper_program(mut self, program: impl Into<String>) -> Self {
        self.helper_program = program.into();
        self
    }

    /// Builder pattern: set the helper timeout
    pub fn with_helper_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.helper_timeout_ms = timeout_ms;
        self
    }

    /// Builder pattern: set the monitor introspection program
    pub fn with_monitor_query_program(mut self, program: impl Into<String>) -> Self {
        self.monitor_query_program = program.into();
        self
    }

    /// Builder pattern: set the portal response timeout
    pub fn with_portal_timeout_secs(mut self, secs: u64) -> Self {
        self.portal_timeout_secs = secs;
        self
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("deskgrab").join("config.json"))
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| CaptureError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: Option<&Path>) -> CaptureResult<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }
}
