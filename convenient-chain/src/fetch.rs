//! Revision fetching: clone a repository into a workspace and pin it

use convenient_git::VersionControl;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ChainError, ChainResult};

/// Clone `address` into `parent/name` unless that directory already exists.
///
/// An existing directory is trusted as-is and not re-fetched.
pub fn materialize(
    vcs: &dyn VersionControl,
    unit: &str,
    address: &str,
    name: &str,
    parent: &Path,
) -> ChainResult<PathBuf> {
    let project_path = parent.join(name);
    if project_path.exists() {
        debug!("{} already present at {}", name, project_path.display());
        return Ok(project_path);
    }

    info!("Cloning {} into {}", address, parent.display());
    vcs.clone_repository(address, &project_path)
        .map_err(|source| ChainError::CloneFailed {
            unit: unit.to_string(),
            address: address.to_string(),
            source,
        })?;
    Ok(project_path)
}

/// Switch `parent/name` to `revision`.
pub fn checkout_revision(
    vcs: &dyn VersionControl,
    unit: &str,
    revision: &str,
    name: &str,
    parent: &Path,
) -> ChainResult<()> {
    info!("Checking out {} in {}", revision, name);
    vcs.checkout(revision, &parent.join(name))
        .map_err(|source| ChainError::CheckoutFailed {
            unit: unit.to_string(),
            revision: revision.to_string(),
            source,
        })
}
