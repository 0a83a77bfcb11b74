//! Patch series application
//!
//! Patches live in a secondary repository addressed by a locator. The
//! repository is checked out into its own scratch workspace, every `*.patch`
//! file in the locator's subdirectory is applied in lexical order, and the
//! scratch workspace is removed whether or not the series applied.

use convenient_git::VersionControl;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ChainError, ChainResult};
use crate::fetch::{checkout_revision, materialize};
use crate::locator::Locator;
use crate::workspace::Workspace;

pub const PATCH_EXTENSION: &str = "patch";

/// What happens to the project tree when a patch does not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchFailurePolicy {
    /// Keep the partially patched tree for inspection.
    #[default]
    LeaveAsIs,
    /// Reset the tree to the revision it had before the first patch.
    Rollback,
}

pub struct PatchApplier<'a> {
    vcs: &'a dyn VersionControl,
    scratch_root: &'a Path,
    policy: PatchFailurePolicy,
}

impl<'a> PatchApplier<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        scratch_root: &'a Path,
        policy: PatchFailurePolicy,
    ) -> Self {
        Self {
            vcs,
            scratch_root,
            policy,
        }
    }

    /// Apply the series named by `patches` onto `project_path`.
    ///
    /// Returns the applied patch files in application order.
    pub fn apply(
        &self,
        unit: &str,
        patches: &Locator,
        project_path: &Path,
    ) -> ChainResult<Vec<PathBuf>> {
        let scratch = Workspace::create(self.scratch_root)
            .map_err(|e| ChainError::workspace(unit, "create patch workspace", e))?;

        let result = self.apply_from(unit, patches, project_path, scratch.path());
        let cleanup = scratch.destroy();

        let applied = result?;
        cleanup.map_err(|e| ChainError::workspace(unit, "remove patch workspace", e))?;
        Ok(applied)
    }

    fn apply_from(
        &self,
        unit: &str,
        patches: &Locator,
        project_path: &Path,
        scratch: &Path,
    ) -> ChainResult<Vec<PathBuf>> {
        let name = patches.project_name();
        let checkout = materialize(self.vcs, unit, &patches.address, name, scratch)?;
        checkout_revision(self.vcs, unit, &patches.revision, name, scratch)?;

        let patch_dir = match &patches.subdirectory {
            Some(subdir) => checkout.join(subdir),
            None => checkout,
        };
        info!("Looking for patches in {}", patch_dir.display());
        let files =
            list_patches(&patch_dir).map_err(|e| ChainError::io(unit, "list patches", e))?;
        info!("The patches are {:?}", files);

        let base_revision = match self.policy {
            PatchFailurePolicy::Rollback => Some(
                self.vcs
                    .head_revision(project_path)
                    .map_err(|source| ChainError::PatchApplyFailed {
                        unit: unit.to_string(),
                        source,
                    })?,
            ),
            PatchFailurePolicy::LeaveAsIs => None,
        };

        for patch in &files {
            if let Err(source) = self.vcs.apply_patch(patch, project_path, true) {
                if let Some(revision) = &base_revision {
                    warn!("Rolling back {} to {}", project_path.display(), revision);
                    if let Err(e) = self.vcs.rollback(project_path, revision) {
                        warn!("Rollback of {} failed: {}", project_path.display(), e);
                    }
                }
                return Err(ChainError::PatchApplyFailed {
                    unit: unit.to_string(),
                    source,
                });
            }
        }

        Ok(files)
    }
}

/// `*.patch` files directly inside `dir`, sorted by name.
pub fn list_patches(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("patch directory {} not found", dir.display()),
        ));
    }

    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        PATCH_EXTENSION
    );
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_list_patches_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        for name in ["010-c.patch", "001-a.patch", "README.md", "002-b.patch"] {
            fs::write(temp.path().join(name), "x").unwrap();
        }
        fs::create_dir(temp.path().join("003-dir.patch")).unwrap();

        let names: Vec<String> = list_patches(temp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["001-a.patch", "002-b.patch", "010-c.patch"]);
    }

    #[test]
    fn test_list_patches_escapes_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("odd[dir]");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("001.patch"), "x").unwrap();

        assert_eq!(list_patches(&dir).unwrap().len(), 1);
    }

    #[test]
    fn test_list_patches_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = list_patches(&temp.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
