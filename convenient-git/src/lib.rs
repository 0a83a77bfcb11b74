//! Git plumbing for chain builds
//!
//! Exposes the small set of version-control operations a chain build needs
//! (clone, checkout, patch application and rollback) behind the
//! [`VersionControl`] trait, with [`Git`] as the production implementation.

use std::path::{Path, PathBuf};

mod repository;

pub use repository::{Git, GitIdentity};

/// Git repository errors
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Repository not found at {0}")]
    NotFound(PathBuf),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Clone failed: {0}")]
    CloneFailed(String),

    #[error("Patch {} failed to apply: {}", .patch.display(), .stderr)]
    PatchFailed { patch: PathBuf, stderr: String },
}

pub type GitResult<T> = Result<T, GitError>;

/// Version-control operations consumed by the chain engine.
///
/// Every operation reports success or failure only; callers never inspect
/// repository internals.
pub trait VersionControl {
    /// Clone `address` into `dest`. `dest` must not exist yet.
    fn clone_repository(&self, address: &str, dest: &Path) -> GitResult<()>;

    /// Switch the working tree at `workdir` to `revision` (branch, tag or commit).
    fn checkout(&self, revision: &str, workdir: &Path) -> GitResult<()>;

    /// Apply a mailbox-formatted patch file onto the tree at `workdir`.
    fn apply_patch(&self, patch: &Path, workdir: &Path, whitespace_tolerant: bool)
    -> GitResult<()>;

    /// Commit id currently checked out at `workdir`.
    fn head_revision(&self, workdir: &Path) -> GitResult<String>;

    /// Abandon any half-applied patch series and hard-reset `workdir` to `revision`.
    fn rollback(&self, workdir: &Path, revision: &str) -> GitResult<()>;
}
