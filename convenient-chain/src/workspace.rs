//! Scratch workspaces for build units and patch checkouts
//!
//! Each workspace is a freshly created directory under a shared scratch root,
//! named `chain-<timestamp>-<random>`. A workspace is removed with
//! [`Workspace::destroy`]; dropping one that was never destroyed still removes
//! the directory so no exit path leaks it.

use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WORKSPACE_PREFIX: &str = "chain-";
const SUFFIX_LENGTH: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace {} already exists", .0.display())]
    Collision(PathBuf),

    #[error("IO error at {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),
}

/// Exclusively owned scratch directory.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create a uniquely named workspace under `root`.
    ///
    /// A name that already exists is reported as [`WorkspaceError::Collision`]
    /// instead of being retried.
    pub fn create(root: &Path) -> Result<Self, WorkspaceError> {
        let name = workspace_name(Local::now(), &mut rand::thread_rng());
        Self::create_at(root.join(name))
    }

    pub(crate) fn create_at(path: PathBuf) -> Result<Self, WorkspaceError> {
        if path.exists() {
            return Err(WorkspaceError::Collision(path));
        }
        if let Some(root) = path.parent() {
            fs::create_dir_all(root).map_err(|e| WorkspaceError::Io(root.to_path_buf(), e))?;
        }
        match fs::create_dir(&path) {
            Ok(()) => {
                debug!("Created workspace {}", path.display());
                Ok(Self {
                    path,
                    destroyed: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(WorkspaceError::Collision(path))
            }
            Err(e) => Err(WorkspaceError::Io(path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively remove the workspace.
    pub fn destroy(mut self) -> Result<(), WorkspaceError> {
        self.destroyed = true;
        remove_tree(&self.path).map_err(|e| WorkspaceError::Io(self.path.clone(), e))?;
        debug!("Destroyed workspace {}", self.path.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            warn!("Failed to remove workspace {}: {}", self.path.display(), e);
        }
    }
}

fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// `chain-<YYYYmmddHHMMSS>-<5 alphanumerics>`
pub(crate) fn workspace_name<R: Rng + ?Sized>(now: DateTime<Local>, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LENGTH)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    format!("{}{}-{}", WORKSPACE_PREFIX, now.format("%Y%m%d%H%M%S"), suffix)
}
