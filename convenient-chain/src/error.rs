//! Chain error taxonomy
//!
//! Every variant names the unit it happened in. None of them is recovered
//! from: the chain stops at the first error because later units consume what
//! earlier ones deployed.

use convenient_git::GitError;
use std::io;
use std::path::PathBuf;

use crate::locator::LocatorError;
use crate::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("unit [{unit}]: malformed '{key}' locator: {source}")]
    MalformedLocator {
        unit: String,
        key: &'static str,
        #[source]
        source: LocatorError,
    },

    #[error("unit [{unit}]: workspace {} already exists", .path.display())]
    WorkspaceCollision { unit: String, path: PathBuf },

    #[error("unit [{unit}]: clone of {address} failed: {source}")]
    CloneFailed {
        unit: String,
        address: String,
        #[source]
        source: GitError,
    },

    #[error("unit [{unit}]: checkout of '{revision}' failed: {source}")]
    CheckoutFailed {
        unit: String,
        revision: String,
        #[source]
        source: GitError,
    },

    #[error("unit [{unit}]: patch application failed: {source}")]
    PatchApplyFailed {
        unit: String,
        #[source]
        source: GitError,
    },

    #[error("unit [{unit}]: build failed with exit status {status}")]
    BuildFailed { unit: String, status: i32 },

    #[error("unit [{unit}]: build directory {} does not exist", .path.display())]
    MissingBuildDir { unit: String, path: PathBuf },

    #[error("unit [{unit}]: {operation} failed: {source}")]
    Io {
        unit: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ChainError {
    pub(crate) fn io(unit: &str, operation: &'static str, source: io::Error) -> Self {
        ChainError::Io {
            unit: unit.to_string(),
            operation,
            source,
        }
    }

    pub(crate) fn workspace(unit: &str, operation: &'static str, error: WorkspaceError) -> Self {
        match error {
            WorkspaceError::Collision(path) => ChainError::WorkspaceCollision {
                unit: unit.to_string(),
                path,
            },
            WorkspaceError::Io(_, source) => ChainError::io(unit, operation, source),
        }
    }

    /// Unit the error happened in.
    pub fn unit(&self) -> &str {
        match self {
            ChainError::MalformedLocator { unit, .. }
            | ChainError::WorkspaceCollision { unit, .. }
            | ChainError::CloneFailed { unit, .. }
            | ChainError::CheckoutFailed { unit, .. }
            | ChainError::PatchApplyFailed { unit, .. }
            | ChainError::BuildFailed { unit, .. }
            | ChainError::MissingBuildDir { unit, .. }
            | ChainError::Io { unit, .. } => unit,
        }
    }

    /// Short name of the failed operation, used in logs and reports.
    pub fn operation(&self) -> &'static str {
        match self {
            ChainError::MalformedLocator { .. } => "parse locator",
            ChainError::WorkspaceCollision { .. } => "create workspace",
            ChainError::CloneFailed { .. } => "clone",
            ChainError::CheckoutFailed { .. } => "checkout",
            ChainError::PatchApplyFailed { .. } => "apply patches",
            ChainError::BuildFailed { .. } | ChainError::MissingBuildDir { .. } => "build",
            ChainError::Io { operation, .. } => operation,
        }
    }

    /// Whether the error stops the whole chain. Always true: there is no
    /// unit-local recovery.
    pub fn is_chain_fatal(&self) -> bool {
        true
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
