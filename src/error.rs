//! Error taxonomy for the checkpoint-resume loop
//!
//! Every failure is fatal to the loop. Precondition failures report what the
//! user has to run first, engine failures carry the engine's exit status
//! verbatim, and a malformed checkpoint record stops the loop because it can
//! no longer decide whether to continue.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the controller and its collaborators
#[derive(Error, Debug)]
pub enum ResumeError {
    #[error("{0}")]
    Precondition(String),

    #[error("too few checkpoints: inference finished at generation {final_step}, no generation {final_step} - 2 to save")]
    TooFewCheckpoints { final_step: u64 },

    #[error("inference engine {engine} failed: {status}")]
    EngineFailed { engine: String, status: String },

    #[error("Failed to spawn inference engine {engine}: {source}")]
    EngineSpawn {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed checkpoint record {}: {reason}", path.display())]
    MalformedCheckpoint { path: PathBuf, reason: String },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for checkpoint-resume operations
pub type Result<T> = std::result::Result<T, ResumeError>;

impl ResumeError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ResumeError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a precondition failure from a message
    pub fn precondition(message: impl Into<String>) -> Self {
        ResumeError::Precondition(message.into())
    }

    /// True for failures caused by missing or insufficient inputs
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ResumeError::Precondition(_) | ResumeError::TooFewCheckpoints { .. }
        )
    }
}

/// Fail with a precondition error unless `path` exists
pub fn require_exists(path: impl AsRef<Path>, message: &str) -> Result<()> {
    if path.as_ref().exists() {
        Ok(())
    } else {
        Err(ResumeError::precondition(message))
    }
}
