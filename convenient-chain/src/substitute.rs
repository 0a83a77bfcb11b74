//! Project substitution
//!
//! Replaces a freshly checked-out project with an externally supplied,
//! already patched tree so a change to one component can be validated against
//! everything built after it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{ChainError, ChainResult};

/// Externally supplied tree standing in for the project called `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedProject {
    pub name: String,
    pub path: PathBuf,
}

impl PatchedProject {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Tracks the substitution target across one chain run.
///
/// Matching is by resolved project name, never by section. At most one unit
/// per run is substituted: later units resolving to the same name keep their
/// own checkout.
#[derive(Debug, Default)]
pub struct Substitutor {
    target: Option<PatchedProject>,
    substituted_unit: Option<String>,
}

impl Substitutor {
    pub fn new(target: Option<PatchedProject>) -> Self {
        Self {
            target,
            substituted_unit: None,
        }
    }

    pub fn substituted_unit(&self) -> Option<&str> {
        self.substituted_unit.as_deref()
    }

    /// Whether `project_name` is the substitution target.
    pub fn matches(&self, project_name: &str) -> bool {
        self.target
            .as_ref()
            .is_some_and(|target| target.name == project_name)
    }

    /// Replace `project_path` with the patched tree if `project_name` matches.
    ///
    /// Returns whether the substitution happened.
    pub fn maybe_substitute(
        &mut self,
        unit: &str,
        project_name: &str,
        project_path: &Path,
    ) -> ChainResult<bool> {
        let Some(target) = self.target.as_ref().filter(|t| t.name == project_name) else {
            return Ok(false);
        };
        if let Some(first) = &self.substituted_unit {
            warn!(
                "{} was already substituted in [{}], building [{}] from its own checkout",
                project_name, first, unit
            );
            return Ok(false);
        }

        info!(
            "Substituting {} with {}",
            project_path.display(),
            target.path.display()
        );
        replace_tree(&target.path, project_path)
            .map_err(|e| ChainError::io(unit, "substitute patched project", e))?;
        self.substituted_unit = Some(unit.to_string());
        Ok(true)
    }
}

/// Delete `dest` and deep-copy `source` into its place.
pub fn replace_tree(source: &Path, dest: &Path) -> io::Result<()> {
    if !source.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("patched tree {} not found", source.display()),
        ));
    }
    match fs::remove_dir_all(dest) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    copy_tree(source, dest)
}

/// Recursive copy that keeps symlinks as symlinks.
pub fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if file_type.is_symlink() {
                copy_symlink(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, dest)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(source, dest).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_no_target_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut substitutor = Substitutor::new(None);
        assert!(!substitutor.maybe_substitute("a", "a", temp.path()).unwrap());
    }

    #[test]
    fn test_replace_is_destructive() {
        let temp = TempDir::new().unwrap();
        let patched = temp.path().join("patched");
        write(&patched.join("pom.xml"), "<patched/>");
        write(&patched.join("src/Main.java"), "class Main {}");

        let fresh = temp.path().join("ws/core");
        write(&fresh.join("pom.xml"), "<fresh/>");
        write(&fresh.join("stale.txt"), "from the clone");

        let mut substitutor = Substitutor::new(Some(PatchedProject::new("core", &patched)));
        assert!(substitutor.matches("core"));
        assert!(substitutor.maybe_substitute("core-section", "core", &fresh).unwrap());

        assert_eq!(fs::read_to_string(fresh.join("pom.xml")).unwrap(), "<patched/>");
        assert_eq!(
            fs::read_to_string(fresh.join("src/Main.java")).unwrap(),
            "class Main {}"
        );
        assert!(!fresh.join("stale.txt").exists());
        assert_eq!(substitutor.substituted_unit(), Some("core-section"));
    }

    #[traced_test]
    #[test]
    fn test_only_first_match_is_substituted() {
        let temp = TempDir::new().unwrap();
        let patched = temp.path().join("patched");
        write(&patched.join("marker"), "patched");
        let first = temp.path().join("one/core");
        let second = temp.path().join("two/core");
        write(&first.join("marker"), "fresh");
        write(&second.join("marker"), "fresh");

        let mut substitutor = Substitutor::new(Some(PatchedProject::new("core", &patched)));
        assert!(substitutor.maybe_substitute("one", "core", &first).unwrap());
        assert!(!substitutor.maybe_substitute("two", "core", &second).unwrap());
        assert_eq!(fs::read_to_string(second.join("marker")).unwrap(), "fresh");
        assert_eq!(substitutor.substituted_unit(), Some("one"));
        assert!(logs_contain("already substituted in [one]"));
    }

    #[test]
    fn test_name_mismatch_leaves_tree() {
        let temp = TempDir::new().unwrap();
        let fresh = temp.path().join("lib");
        write(&fresh.join("marker"), "fresh");

        let mut substitutor =
            Substitutor::new(Some(PatchedProject::new("core", temp.path().join("p"))));
        assert!(!substitutor.maybe_substitute("lib", "lib", &fresh).unwrap());
        assert_eq!(fs::read_to_string(fresh.join("marker")).unwrap(), "fresh");
    }

    #[test]
    fn test_missing_patched_tree() {
        let temp = TempDir::new().unwrap();
        let fresh = temp.path().join("core");
        write(&fresh.join("marker"), "fresh");

        let mut substitutor =
            Substitutor::new(Some(PatchedProject::new("core", temp.path().join("absent"))));
        let err = substitutor.maybe_substitute("core", "core", &fresh).unwrap_err();
        assert!(matches!(err, ChainError::Io { .. }));
        assert!(fresh.join("marker").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_keeps_symlinks() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        write(&source.join("real.txt"), "data");
        std::os::unix::fs::symlink("real.txt", source.join("link.txt")).unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&source, &dest).unwrap();

        assert_eq!(
            fs::read_link(dest.join("link.txt")).unwrap(),
            PathBuf::from("real.txt")
        );
        assert_eq!(fs::read_to_string(dest.join("link.txt")).unwrap(), "data");
    }
}
