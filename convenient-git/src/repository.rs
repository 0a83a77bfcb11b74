//! git2-backed implementation of [`VersionControl`]
//!
//! Clone and checkout go through libgit2. Patch application shells out to the
//! system `git am`, which libgit2 has no equivalent for.

use git2::{
    build::CheckoutBuilder, AutotagOption, FetchOptions, Oid, ProxyOptions, RemoteCallbacks,
    Repository, ResetType,
};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::{GitError, GitResult, VersionControl};

/// Committer identity used when patches are turned into commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "ChainBuilder".to_string(),
            email: "chain-builder@localhost".to_string(),
        }
    }
}

/// Production [`VersionControl`] backed by libgit2 and the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct Git {
    identity: GitIdentity,
}

impl Git {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity passed to `git am` through `-c user.name/user.email`.
    ///
    /// The global git configuration is never touched.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = GitIdentity {
            name: name.into(),
            email: email.into(),
        };
        self
    }

    pub fn identity(&self) -> &GitIdentity {
        &self.identity
    }

    fn clone_with_libgit2(address: &str, dest: &Path) -> Result<Repository, git2::Error> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|stats| {
            if stats.received_objects() == stats.total_objects() {
                debug!(
                    "Resolving deltas {}/{}",
                    stats.indexed_deltas(),
                    stats.total_deltas()
                );
            } else if stats.received_objects() % 100 == 0 {
                debug!(
                    "Received {}/{} objects ({} kb)",
                    stats.received_objects(),
                    stats.total_objects(),
                    stats.received_bytes() / 1024
                );
            }
            true
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let mut proxy_opts = ProxyOptions::new();
        proxy_opts.auto();
        fetch_options.proxy_options(proxy_opts);
        fetch_options.download_tags(AutotagOption::All);

        git2::build::RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(address, dest)
    }

    /// Used when libgit2 trips over proxy setups the system git handles.
    fn clone_with_system_git(address: &str, dest: &Path) -> GitResult<()> {
        info!("Using system git command to clone {}", address);

        let output = Command::new("git")
            .arg("clone")
            .arg(address)
            .arg(dest)
            .output()
            .map_err(|e| GitError::CloneFailed(format!("Failed to execute git command: {}", e)))?;

        if !output.status.success() {
            return Err(GitError::CloneFailed(format!(
                "System git clone failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Resolve a branch, tag or commit id to the commit it names.
    fn resolve_revision(repo: &Repository, revision: &str) -> GitResult<Oid> {
        // Oid::from_str zero-pads short input, so only trust full ids here
        if revision.len() == 40 {
            if let Ok(oid) = Oid::from_str(revision) {
                if repo.find_commit(oid).is_ok() {
                    return Ok(oid);
                }
            }
        }

        let candidates = [
            format!("refs/remotes/origin/{}", revision),
            format!("refs/tags/{}", revision),
            format!("refs/heads/{}", revision),
        ];
        for name in &candidates {
            if let Ok(reference) = repo.find_reference(name) {
                return Ok(reference.peel_to_commit()?.id());
            }
        }

        // Abbreviated commit ids and other rev expressions
        repo.revparse_single(revision)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.id())
            .map_err(|_| GitError::InvalidReference(revision.to_string()))
    }

    fn open(workdir: &Path) -> GitResult<Repository> {
        Repository::open(workdir).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::NotFound(workdir.to_path_buf()),
            _ => GitError::Git(e),
        })
    }

    fn git_command(&self, workdir: &Path) -> Command {
        let mut command = Command::new("git");
        command
            .arg("-c")
            .arg(format!("user.name={}", self.identity.name))
            .arg("-c")
            .arg(format!("user.email={}", self.identity.email))
            .current_dir(workdir);
        command
    }
}

impl VersionControl for Git {
    fn clone_repository(&self, address: &str, dest: &Path) -> GitResult<()> {
        info!("Cloning repository from {} to {}", address, dest.display());

        match Self::clone_with_libgit2(address, dest) {
            Ok(_) => {
                info!("Successfully cloned {}", address);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if message.contains("401") || message.contains("proxy") {
                    warn!("libgit2 clone failed with proxy error, falling back to system git");
                    Self::clone_with_system_git(address, dest)
                } else {
                    Err(GitError::CloneFailed(message))
                }
            }
        }
    }

    fn checkout(&self, revision: &str, workdir: &Path) -> GitResult<()> {
        let repo = Self::open(workdir)?;
        let oid = Self::resolve_revision(&repo, revision)?;

        repo.set_head_detached(oid)?;
        let mut checkout_builder = CheckoutBuilder::new();
        checkout_builder.force();
        repo.checkout_head(Some(&mut checkout_builder))?;

        info!("Checked out {} ({}) in {}", revision, oid, workdir.display());
        Ok(())
    }

    fn apply_patch(
        &self,
        patch: &Path,
        workdir: &Path,
        whitespace_tolerant: bool,
    ) -> GitResult<()> {
        info!("Applying patch {} in {}", patch.display(), workdir.display());

        let mut command = self.git_command(workdir);
        command.arg("am");
        if whitespace_tolerant {
            command.arg("--ignore-space-change");
        }
        let output = command.arg(patch).output()?;

        if !output.status.success() {
            return Err(GitError::PatchFailed {
                patch: patch.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn head_revision(&self, workdir: &Path) -> GitResult<String> {
        let repo = Self::open(workdir)?;
        let commit = repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn rollback(&self, workdir: &Path, revision: &str) -> GitResult<()> {
        let repo = Self::open(workdir)?;

        if repo.path().join("rebase-apply").exists() {
            debug!("Aborting in-progress am session in {}", workdir.display());
            let output = self.git_command(workdir).arg("am").arg("--abort").output()?;
            if !output.status.success() {
                warn!(
                    "git am --abort failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        }

        let oid = Self::resolve_revision(&repo, revision)?;
        let target = repo.find_object(oid, None)?;
        let mut checkout_builder = CheckoutBuilder::new();
        checkout_builder.force();
        repo.reset(&target, ResetType::Hard, Some(&mut checkout_builder))?;

        info!("Rolled back {} to {}", workdir.display(), revision);
        Ok(())
    }
}
