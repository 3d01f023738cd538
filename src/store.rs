//! Dataset store layout
//!
//! ```text
//! <root>/<name>/data/init.pb.gz            initial model
//! <root>/<name>/data/shuffled.pbs.gz       shuffled rows
//! <root>/<name>/data/tare.pbs.gz           tare row
//! <root>/<name>/checkpoints/               last full checkpoint
//! <root>/<name>/infer_checkpoint/          resumed-inference results
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResumeError, Result};

/// Artifacts a dataset may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Init,
    Shuffled,
    Checkpoints,
}

/// Paths of one dataset's inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub root: PathBuf,
    pub init: PathBuf,
    pub shuffled: PathBuf,
    pub tare: PathBuf,
}

/// Paths written by `infer-checkpoint`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub log: PathBuf,
}

/// Root directory of named datasets
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset(&self, name: &str) -> DatasetPaths {
        let root = self.root.join(name).join("data");
        DatasetPaths {
            init: root.join("init.pb.gz"),
            shuffled: root.join("shuffled.pbs.gz"),
            tare: root.join("tare.pbs.gz"),
            root,
        }
    }

    /// Destination of the last full checkpoint
    pub fn checkpoints(&self, name: &str) -> PathBuf {
        self.root.join(name).join("checkpoints")
    }

    pub fn infer_checkpoint(&self, name: &str) -> ResultPaths {
        let root = self.root.join(name).join("infer_checkpoint");
        ResultPaths {
            config: root.join("config.pb.gz"),
            log: root.join("infer_log.pbs"),
            root,
        }
    }

    /// Path of a requirement for dataset `name`
    pub fn requirement(&self, name: &str, requirement: Requirement) -> PathBuf {
        let dataset = self.dataset(name);
        match requirement {
            Requirement::Init => dataset.init,
            Requirement::Shuffled => dataset.shuffled,
            Requirement::Checkpoints => self.checkpoints(name),
        }
    }

    /// Sorted names of datasets providing every requirement
    pub fn list_datasets(&self, requirements: &[Requirement]) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ResumeError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ResumeError::io(&self.root, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if requirements
                .iter()
                .all(|r| self.requirement(&name, *r).exists())
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
