//! Compact repository locators
//!
//! A locator packs a repository address, an optional subdirectory and a
//! revision into one string: `address[?subdir]#revision`, for example
//! `git+https://example.com/org/project.git?module#v1.2`.

use std::fmt;

/// Introduces the subdirectory part.
pub const SUBDIR_SEPARATOR: char = '?';
/// Introduces the revision part.
pub const REVISION_SEPARATOR: char = '#';
/// Transport prefix stripped from addresses before they reach git.
pub const TRANSPORT_PREFIX: &str = "git+";

const REPOSITORY_SUFFIX: &str = ".git";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("no locator declared")]
    Absent,

    #[error("locator '{0}' has no repository address")]
    MissingAddress(String),

    #[error("locator '{0}' is not pinned to a revision (expected '#<revision>')")]
    MissingRevision(String),
}

/// A decoded locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub address: String,
    pub revision: String,
    pub subdirectory: Option<String>,
}

impl Locator {
    /// Decode `raw` into address, revision and subdirectory.
    ///
    /// Everything after the first `#` is the revision; a `?` before it starts
    /// the subdirectory. A locator without a revision is rejected rather than
    /// built at whatever the remote default happens to be.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let raw = raw.trim();
        let (head, revision) = raw
            .split_once(REVISION_SEPARATOR)
            .ok_or_else(|| LocatorError::MissingRevision(raw.to_string()))?;
        let revision = revision.trim();
        if revision.is_empty() {
            return Err(LocatorError::MissingRevision(raw.to_string()));
        }

        let (address, subdirectory) = match head.split_once(SUBDIR_SEPARATOR) {
            Some((address, subdir)) => {
                let subdir = subdir.trim().trim_matches('/');
                (address, (!subdir.is_empty()).then(|| subdir.to_string()))
            }
            None => (head, None),
        };

        let address = address.trim();
        let address = address.strip_prefix(TRANSPORT_PREFIX).unwrap_or(address);
        if address.is_empty() {
            return Err(LocatorError::MissingAddress(raw.to_string()));
        }

        Ok(Self {
            address: address.to_string(),
            revision: revision.to_string(),
            subdirectory,
        })
    }

    /// Directory name the repository is cloned into.
    pub fn project_name(&self) -> &str {
        project_name(&self.address)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(subdir) = &self.subdirectory {
            write!(f, "{}{}", SUBDIR_SEPARATOR, subdir)?;
        }
        write!(f, "{}{}", REVISION_SEPARATOR, self.revision)
    }
}

/// Last path segment of `address` without the `.git` suffix.
pub fn project_name(address: &str) -> &str {
    let trimmed = address.trim_end_matches('/');
    let segment = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    segment.strip_suffix(REPOSITORY_SUFFIX).unwrap_or(segment)
}
