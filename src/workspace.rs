//! Scratch directories for the checkpoint loop
//!
//! Generations are computed in a temporary directory. On success it is
//! removed. On failure it is removed too, unless cleanup was disabled
//! (debug runs) so the generations can be inspected afterwards.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{ResumeError, Result};

const PREFIX: &str = "infer-resume.";

/// Temporary working directory with a cleanup-on-error policy
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    cleanup_on_error: bool,
}

impl Workspace {
    /// Create a workspace under `parent`, creating `parent` if needed
    pub fn create_in(parent: impl AsRef<Path>, cleanup_on_error: bool) -> Result<Self> {
        let parent = parent.as_ref();
        fs::create_dir_all(parent).map_err(|e| ResumeError::io(parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(parent)
            .map_err(|e| ResumeError::io(parent, e))?;
        Ok(Self {
            dir,
            cleanup_on_error,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Close the workspace according to the outcome of the work done in it
    ///
    /// Returns the kept directory, if any, alongside the unchanged result.
    pub fn finish<T, E: Display>(
        self,
        result: std::result::Result<T, E>,
    ) -> (std::result::Result<T, E>, Option<PathBuf>) {
        if let (Err(e), false) = (&result, self.cleanup_on_error) {
            tracing::warn!(dir = %self.dir.path().display(), error = %e, "keeping workspace for inspection");
            #[allow(deprecated)]
            let kept = self.dir.into_path();
            return (result, Some(kept));
        }

        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(dir = %path.display(), error = %e, "failed to remove workspace");
        }
        (result, None)
    }

    /// Run `f` inside a fresh workspace under `parent`
    pub fn scoped<T, F>(parent: impl AsRef<Path>, cleanup_on_error: bool, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Path) -> anyhow::Result<T>,
    {
        let workspace = Self::create_in(parent, cleanup_on_error)?;
        let result = f(workspace.path());
        let (result, kept) = workspace.finish(result);
        if let Some(kept) = kept {
            eprintln!("[infer-resume: kept workspace {}]", kept.display());
        }
        result
    }
}

/// Move a directory, copying across filesystems when rename cannot
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            tracing::debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
            copy_dir(from, to)?;
            fs::remove_dir_all(from).map_err(|e| ResumeError::io(from, e))
        }
        Err(e) => Err(ResumeError::io(from, e)),
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| ResumeError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| ResumeError::io(from, e))? {
        let entry = entry.map_err(|e| ResumeError::io(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| ResumeError::io(&source, e))?;
        if file_type.is_dir() {
            copy_dir(&source, &target)?;
        } else {
            fs::copy(&source, &target).map_err(|e| ResumeError::io(&source, e))?;
        }
    }
    Ok(())
}

/// Remove a directory tree if present
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ResumeError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_removes_workspace() {
        let parent = TempDir::new().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(PREFIX));

        let (result, kept) = workspace.finish(Ok::<_, String>(5));
        assert_eq!(result.unwrap(), 5);
        assert!(kept.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_error_with_cleanup_removes_workspace() {
        let parent = TempDir::new().unwrap();
        let workspace = Workspace::create_in(parent.path(), true).unwrap();
        let path = workspace.path().to_path_buf();

        let (result, kept) = workspace.finish(Err::<(), _>("engine failed"));
        assert!(result.is_err());
        assert!(kept.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_error_without_cleanup_keeps_workspace() {
        let parent = TempDir::new().unwrap();
        let workspace = Workspace::create_in(parent.path(), false).unwrap();
        let path = workspace.path().to_path_buf();
        fs::write(path.join("marker"), b"x").unwrap();

        let (result, kept) = workspace.finish(Err::<(), _>("engine failed"));
        assert!(result.is_err());
        assert_eq!(kept.as_deref(), Some(path.as_path()));
        assert!(path.join("marker").exists());
    }

    #[test]
    fn test_scoped_passes_result_through() {
        let parent = TempDir::new().unwrap();
        let value = Workspace::scoped(parent.path(), true, |dir| {
            fs::write(dir.join("f"), b"x")?;
            Ok(dir.is_dir())
        })
        .unwrap();
        assert!(value);
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_move_dir_renames() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("2");
        fs::create_dir_all(from.join("groups")).unwrap();
        fs::write(from.join("model.pb.gz"), b"m").unwrap();
        let to = temp_dir.path().join("checkpoints");

        move_dir(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(to.join("model.pb.gz")).unwrap(), b"m");
        assert!(to.join("groups").is_dir());
    }

    #[test]
    fn test_copy_dir_recurses() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("src");
        fs::create_dir_all(from.join("groups")).unwrap();
        fs::write(from.join("groups").join("g.pbs.gz"), b"g").unwrap();
        let to = temp_dir.path().join("dst");

        copy_dir(&from, &to).unwrap();
        assert_eq!(fs::read(to.join("groups").join("g.pbs.gz")).unwrap(), b"g");
        assert!(from.exists());
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("old");
        fs::create_dir(&dir).unwrap();
        remove_if_exists(&dir).unwrap();
        remove_if_exists(&dir).unwrap();
        assert!(!dir.exists());
    }
}
