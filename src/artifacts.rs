//! Layout of a checkpoint generation directory
//!
//! A generation directory holds exactly four artifacts with fixed names. Once
//! fully written it is sufficient to resume inference from that point.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ResumeError, Result};

/// Compressed model snapshot
pub const MODEL_FILE: &str = "model.pb.gz";
/// Directory of per-partition group-assignment streams
pub const GROUPS_DIR: &str = "groups";
/// Compressed row-assignment stream
pub const ASSIGN_FILE: &str = "assign.pbs.gz";
/// Compressed checkpoint record
pub const CHECKPOINT_FILE: &str = "checkpoint.pb.gz";

/// Paths of the four artifacts in one generation directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationArtifacts {
    pub model: PathBuf,
    pub groups: PathBuf,
    pub assign: PathBuf,
    pub checkpoint: PathBuf,
}

impl GenerationArtifacts {
    /// Artifact paths inside `dir`, whether or not they exist yet
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            groups: dir.join(GROUPS_DIR),
            assign: dir.join(ASSIGN_FILE),
            checkpoint: dir.join(CHECKPOINT_FILE),
        }
    }

    /// Artifact paths inside an existing directory
    ///
    /// # Errors
    /// Precondition failure if `dir` does not exist.
    pub fn existing(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ResumeError::precondition(format!(
                "checkpoint directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self::in_dir(dir))
    }

    /// Check that all four artifacts exist and none is empty
    pub fn verify_complete(&self) -> Result<()> {
        for file in [&self.model, &self.assign, &self.checkpoint] {
            let meta = fs::metadata(file).map_err(|e| ResumeError::io(file, e))?;
            if !meta.is_file() || meta.len() == 0 {
                return Err(ResumeError::precondition(format!(
                    "incomplete checkpoint: {} is empty",
                    file.display()
                )));
            }
        }

        let mut entries =
            fs::read_dir(&self.groups).map_err(|e| ResumeError::io(&self.groups, e))?;
        if entries.next().is_none() {
            return Err(ResumeError::precondition(format!(
                "incomplete checkpoint: no groups in {}",
                self.groups.display()
            )));
        }
        Ok(())
    }
}

/// Handle to one numbered generation directory under the work root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub step: u64,
    pub dir: PathBuf,
}

impl Generation {
    /// Generation `step` under `root` (directory named by the step number)
    pub fn under(root: impl AsRef<Path>, step: u64) -> Self {
        Self {
            step,
            dir: root.as_ref().join(step.to_string()),
        }
    }

    /// Create the generation directory
    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ResumeError::io(&self.dir, e))
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn artifacts(&self) -> GenerationArtifacts {
        GenerationArtifacts::in_dir(&self.dir)
    }

    /// Delete the generation directory; absent directories are not an error
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ResumeError::io(&self.dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_complete(dir: &Path) {
        fs::create_dir_all(dir.join(GROUPS_DIR)).unwrap();
        fs::write(dir.join(MODEL_FILE), b"model").unwrap();
        fs::write(dir.join(ASSIGN_FILE), b"assign").unwrap();
        fs::write(dir.join(CHECKPOINT_FILE), b"checkpoint").unwrap();
        fs::write(dir.join(GROUPS_DIR).join("mixture.000.pbs.gz"), b"g").unwrap();
    }

    #[test]
    fn test_fixed_layout() {
        let artifacts = GenerationArtifacts::in_dir("/work/3");
        assert_eq!(artifacts.model, PathBuf::from("/work/3/model.pb.gz"));
        assert_eq!(artifacts.groups, PathBuf::from("/work/3/groups"));
        assert_eq!(artifacts.assign, PathBuf::from("/work/3/assign.pbs.gz"));
        assert_eq!(artifacts.checkpoint, PathBuf::from("/work/3/checkpoint.pb.gz"));
    }

    #[test]
    fn test_existing_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(GenerationArtifacts::existing(temp_dir.path()).is_ok());

        let err = GenerationArtifacts::existing(temp_dir.path().join("7")).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_verify_complete() {
        let temp_dir = TempDir::new().unwrap();
        write_complete(temp_dir.path());

        GenerationArtifacts::in_dir(temp_dir.path())
            .verify_complete()
            .unwrap();
    }

    #[test]
    fn test_verify_rejects_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        write_complete(temp_dir.path());
        fs::write(temp_dir.path().join(ASSIGN_FILE), b"").unwrap();

        let err = GenerationArtifacts::in_dir(temp_dir.path())
            .verify_complete()
            .unwrap_err();
        assert!(err.to_string().contains("assign.pbs.gz"));
    }

    #[test]
    fn test_verify_rejects_empty_groups() {
        let temp_dir = TempDir::new().unwrap();
        write_complete(temp_dir.path());
        fs::remove_file(temp_dir.path().join(GROUPS_DIR).join("mixture.000.pbs.gz")).unwrap();

        let err = GenerationArtifacts::in_dir(temp_dir.path())
            .verify_complete()
            .unwrap_err();
        assert!(err.to_string().contains("no groups"));
    }

    #[test]
    fn test_generation_dir_named_by_step() {
        let generation = Generation::under("/work", 12);
        assert_eq!(generation.dir, PathBuf::from("/work/12"));
        assert_eq!(generation.step, 12);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let generation = Generation::under(temp_dir.path(), 0);
        generation.create().unwrap();
        assert!(generation.exists());

        generation.remove().unwrap();
        assert!(!generation.exists());
        generation.remove().unwrap();
    }
}
