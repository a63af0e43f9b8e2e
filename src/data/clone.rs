use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::error::{DatasetError, Result};

/// Capability to materialize a remote repository into a local directory.
///
/// `dest` does not exist when `clone_repo` is called; implementations create
/// it. A failed clone may leave `dest` partially written, the caller cleans up.
pub trait Cloner {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;
}

impl<C: Cloner + ?Sized> Cloner for &C {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        (**self).clone_repo(url, branch, dest)
    }
}

impl<C: Cloner + ?Sized> Cloner for Box<C> {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        (**self).clone_repo(url, branch, dest)
    }
}

/// Shallow `git clone` through the system `git` binary.
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: String,
}

impl Default for GitCloner {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCloner {
    /// Use a specific git executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Cloner for GitCloner {
    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        info!("Cloning {url} (branch {branch}) into {}", dest.display());
        let output = Command::new(&self.program)
            .args(["clone", "--depth", "1", "--branch", branch, url])
            .arg(dest)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DatasetError::transfer(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DatasetError::transfer(format!(
                "git clone of {url} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!("git clone finished: {}", String::from_utf8_lossy(&output.stderr).trim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let cloner = GitCloner::with_program("definitely-not-a-git-binary-4711");
        let err = cloner
            .clone_repo("https://example.invalid/repo.git", "main", &dir.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, DatasetError::Transfer(_)));
        assert!(err.to_string().contains("definitely-not-a-git-binary-4711"));
    }
}
