//! Version control integration.
//!
//! Only Git is supported. The builder asks the VCS which files it ignores so
//! they stay out of the archive.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the directory that marks a Git work tree.
pub const GIT_DIR: &str = ".git";

/// A version control system wrapping a work tree.
pub trait Vcs {
    /// Root directory of the work tree.
    fn root(&self) -> &Path;

    /// Absolute paths of untracked files the VCS is configured to ignore.
    ///
    /// # Errors
    ///
    /// Returns an error if the VCS could not be queried.
    fn get_ignored_files(&self) -> io::Result<Vec<PathBuf>>;
}

/// Git work tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Vcs for Git {
    fn root(&self) -> &Path {
        &self.root
    }

    fn get_ignored_files(&self) -> io::Result<Vec<PathBuf>> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(["ls-files", "--others", "-i", "--exclude-standard"])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::other(format!(
                "git ls-files failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| self.root.join(line))
            .collect())
    }
}

/// Find the VCS governing `path`, searching `path` and its ancestors.
#[must_use]
pub fn get_vcs(path: &Path) -> Option<Git> {
    path.ancestors()
        .find(|dir| dir.join(GIT_DIR).exists())
        .map(Git::new)
}
