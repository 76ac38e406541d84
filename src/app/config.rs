//! Application configuration
//!
//! Settings come from CLI flags, optionally layered over a YAML settings file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::workflow::context::{ExecutionConfig, DEFAULT_TIMEOUT};

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Print error chains and per-host outputs
    pub debug: bool,
    /// Module timeout used when neither the step nor the module sets one
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Print workflow outputs as JSON after the run
    pub json: bool,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            ..Self::default()
        }
    }

    /// Load settings from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = self.verbose.max(verbose);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug |= debug;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json |= json;
        self
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match (self.verbose, self.debug) {
            (0, false) => "info",
            (0, true) | (1, _) => "debug",
            _ => "trace",
        }
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            default_timeout: self.default_timeout,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            debug: false,
            default_timeout: DEFAULT_TIMEOUT,
            json: false,
        }
    }
}
