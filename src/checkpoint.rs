//! Checkpoint record written by the engine after each bounded step
//!
//! The record is the only thing the loop reads back from a generation. It
//! tells the loop whether inference has finished and how many passes have
//! completed so far.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compressed;
use crate::error::{ResumeError, Result};

/// Status record for one generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Whether inference has converged or otherwise terminated
    pub finished: bool,
    /// Completed inference passes (the engine calls this `tardis_iter`)
    #[serde(alias = "tardis_iter")]
    pub iteration_count: u64,
    /// Random seed the engine will resume with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Rows processed so far in the current pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl Checkpoint {
    /// Create a record with the given status
    pub fn new(finished: bool, iteration_count: u64) -> Self {
        Self {
            finished,
            iteration_count,
            ..Default::default()
        }
    }

    /// Read a checkpoint record
    ///
    /// # Errors
    /// Returns `MalformedCheckpoint` if the file is absent, truncated, or
    /// does not decode to a record.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let malformed = |reason: String| ResumeError::MalformedCheckpoint {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(malformed("file not found".to_string()));
        }
        let bytes = compressed::read_all(path).map_err(|e| malformed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(malformed("empty record".to_string()));
        }
        serde_json::from_slice(&bytes).map_err(|e| malformed(e.to_string()))
    }

    /// Write this record gzip-compressed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        compressed::dump_json(self, path.as_ref())
    }
}
