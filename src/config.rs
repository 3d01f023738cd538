//! Configuration
//!
//! Two documents live here. [`InferConfig`] is handed to the engine on every
//! invocation and carries the per-step time budget. [`ToolConfig`] is this
//! tool's own settings (store location and engine binaries), loaded from TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::compressed;
use crate::error::{ResumeError, Result};

/// Environment variable overriding the store root
pub const STORE_ENV: &str = "INFER_RESUME_STORE";
/// Environment variable overriding the release engine binary
pub const ENGINE_ENV: &str = "INFER_RESUME_ENGINE";

/// Scheduling section of the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Wall-clock budget per invocation; 0 runs to completion
    pub checkpoint_period_sec: f64,
    /// Passes over the data after the first
    pub extra_passes: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            checkpoint_period_sec: 0.0,
            extra_passes: 500.0,
        }
    }
}

/// Kernel section of the engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelsConfig {
    pub parallel: bool,
}

impl Default for KernelsConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Configuration document passed to the engine as `config_in`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub kernels: KernelsConfig,
}

impl InferConfig {
    /// Config bounding each invocation to `period_sec` seconds
    pub fn with_period(period_sec: f64) -> Self {
        let mut config = Self::default();
        config.schedule.checkpoint_period_sec = period_sec;
        config
    }

    /// Fill in the sequential variant: single-threaded kernels
    pub fn sequential(mut self) -> Self {
        self.kernels.parallel = false;
        self
    }

    /// Write the config as gzip-compressed JSON
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        compressed::dump_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        compressed::load_json(path.as_ref())
    }
}

/// Engine binaries, release and debug builds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_release_engine")]
    pub release: PathBuf,
    #[serde(default = "default_debug_engine")]
    pub debug: PathBuf,
}

fn default_release_engine() -> PathBuf {
    PathBuf::from("loom_infer")
}

fn default_debug_engine() -> PathBuf {
    PathBuf::from("loom_infer_debug")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            release: default_release_engine(),
            debug: default_debug_engine(),
        }
    }
}

impl EngineConfig {
    /// Binary to run for the given build flavour
    pub fn binary(&self, debug: bool) -> &Path {
        if debug {
            &self.debug
        } else {
            &self.release
        }
    }
}

/// Settings for this tool
///
/// # Example TOML
/// ```toml
/// store = "/var/lib/loom/data"
///
/// [engine]
/// release = "/opt/loom/bin/loom_infer"
/// debug = "/opt/loom/bin/loom_infer_debug"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_store() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            engine: EngineConfig::default(),
        }
    }
}

impl ToolConfig {
    /// Load settings from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ResumeError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| ResumeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve settings: optional file, then environment overrides
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply `INFER_RESUME_STORE` and `INFER_RESUME_ENGINE`
    pub fn apply_env(&mut self) {
        if let Some(store) = std::env::var_os(STORE_ENV).filter(|v| !v.is_empty()) {
            self.store = PathBuf::from(store);
        }
        if let Some(engine) = std::env::var_os(ENGINE_ENV).filter(|v| !v.is_empty()) {
            self.engine.release = PathBuf::from(engine);
        }
    }
}
