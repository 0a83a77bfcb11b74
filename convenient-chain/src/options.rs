//! Descriptor option translation
//!
//! Turns one descriptor [`Section`] into a [`BuildUnit`]. A closed set of
//! special keys is dispatched through `SpecialKey::translation`; every other
//! key not on the ignore-list becomes a `-Dkey=value` property flag, in
//! declaration order and without deduplication.

use std::borrow::Cow;
use tracing::debug;

use crate::descriptor::Section;
use crate::error::{ChainError, ChainResult};
use crate::locator::{Locator, LocatorError};

/// Flag appended for `skipTests`.
pub const SKIP_TESTS_FLAG: &str = "-DskipTests";
/// Keyword inside a `properties` block that means "skip tests".
pub const SKIP_TESTS_KEYWORD: &str = "skipTests";
/// Unit type whose build is skipped.
pub const WRAPPER_TYPE: &str = "wrapper";
/// Descriptor metadata that never reaches the build tool.
pub const DEFAULT_IGNORED_KEYS: [&str; 3] = ["packages", "envs", "version_override"];

/// The reserved descriptor vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Source,
    Patches,
    SkipTests,
    BuildRequires,
    UnitType,
    BuildOptions,
    RuntimeOptions,
    Properties,
}

type Translation = fn(&mut BuildUnit, &str) -> Result<(), LocatorError>;

impl SpecialKey {
    pub const ALL: [SpecialKey; 8] = [
        SpecialKey::Source,
        SpecialKey::Patches,
        SpecialKey::SkipTests,
        SpecialKey::BuildRequires,
        SpecialKey::UnitType,
        SpecialKey::BuildOptions,
        SpecialKey::RuntimeOptions,
        SpecialKey::Properties,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SpecialKey::Source => "scmurl",
            SpecialKey::Patches => "patches",
            SpecialKey::SkipTests => "skipTests",
            SpecialKey::BuildRequires => "buildrequires",
            SpecialKey::UnitType => "type",
            SpecialKey::BuildOptions => "maven_options",
            SpecialKey::RuntimeOptions => "jvm_options",
            SpecialKey::Properties => "properties",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|special| special.key() == key)
    }

    fn translation(self) -> Translation {
        match self {
            SpecialKey::Source => |unit, value| {
                unit.source = Some(Locator::parse(value)?);
                Ok(())
            },
            SpecialKey::Patches => |unit, value| {
                unit.patches = Some(Locator::parse(value)?);
                Ok(())
            },
            SpecialKey::SkipTests => |unit, _| {
                unit.args.push(BuildArg::verbatim(SKIP_TESTS_FLAG));
                Ok(())
            },
            SpecialKey::BuildRequires => |_, _| Ok(()),
            SpecialKey::UnitType => |unit, value| {
                if value.trim() == WRAPPER_TYPE {
                    unit.skip_build = true;
                }
                Ok(())
            },
            SpecialKey::BuildOptions => |unit, value| {
                let value = value.trim();
                if !value.is_empty() {
                    unit.args.push(BuildArg::verbatim(value));
                }
                Ok(())
            },
            SpecialKey::RuntimeOptions => |unit, value| {
                unit.runtime_options = Some(value.trim().to_string());
                Ok(())
            },
            SpecialKey::Properties => |unit, value| {
                for line in value.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    let arg = if line == SKIP_TESTS_KEYWORD {
                        BuildArg::verbatim(SKIP_TESTS_FLAG)
                    } else if line.starts_with('-') {
                        BuildArg::verbatim(line)
                    } else if let Some((key, value)) = line.split_once('=') {
                        BuildArg::property(key.trim(), value.trim())
                    } else {
                        BuildArg::verbatim(shell_quote(&format!("-D{}", line)))
                    };
                    unit.args.push(arg);
                }
                Ok(())
            },
        }
    }
}

/// One build-command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildArg {
    /// Shell text inserted as written in the descriptor.
    Verbatim(String),
    /// A `-Dkey=value` property, shell-quoted when rendered.
    Property { key: String, value: String },
}

impl BuildArg {
    pub fn verbatim(text: impl Into<String>) -> Self {
        BuildArg::Verbatim(text.into())
    }

    pub fn property(key: impl Into<String>, value: impl Into<String>) -> Self {
        BuildArg::Property {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Shell-ready text of the argument.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            BuildArg::Verbatim(text) => Cow::Borrowed(text),
            BuildArg::Property { key, value } => {
                Cow::Owned(shell_quote(&format!("-D{}={}", key, value)).into_owned())
            }
        }
    }
}

/// Quote `arg` for `sh` unless it only holds characters that need none.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,/:=@%+".contains(c));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

/// Everything the chain needs to know about one descriptor section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildUnit {
    pub name: String,
    pub source: Option<Locator>,
    pub patches: Option<Locator>,
    /// Build-command arguments in assembly order.
    pub args: Vec<BuildArg>,
    pub skip_build: bool,
    /// Value for the build tool's runtime environment variable.
    pub runtime_options: Option<String>,
    pub is_defaults: bool,
}

impl BuildUnit {
    pub fn project_name(&self) -> Option<&str> {
        self.source.as_ref().map(Locator::project_name)
    }

    pub fn subdirectory(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.subdirectory.as_deref())
    }

    /// Property flags only (`-Dkey=value` from ordinary keys).
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().filter_map(|arg| match arg {
            BuildArg::Property { key, value } => Some((key.as_str(), value.as_str())),
            BuildArg::Verbatim(_) => None,
        })
    }
}

/// Maps descriptor sections onto [`BuildUnit`]s.
#[derive(Debug, Clone)]
pub struct OptionTranslator {
    ignored: Vec<String>,
}

impl Default for OptionTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_KEYS)
    }
}

impl OptionTranslator {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored.iter().any(|k| k == key)
    }

    /// Translate `section` without touching the filesystem.
    ///
    /// Locators are validated here so a malformed one aborts the unit before
    /// any workspace exists. Every section except `[DEFAULT]` must declare a
    /// source locator.
    pub fn translate(&self, section: &Section) -> ChainResult<BuildUnit> {
        let mut unit = BuildUnit {
            name: section.name.clone(),
            is_defaults: section.is_defaults(),
            skip_build: section.is_defaults(),
            ..BuildUnit::default()
        };

        for (key, value) in &section.entries {
            match SpecialKey::from_key(key) {
                Some(special) => {
                    (special.translation())(&mut unit, value).map_err(|source| {
                        ChainError::MalformedLocator {
                            unit: section.name.clone(),
                            key: special.key(),
                            source,
                        }
                    })?;
                }
                None if self.is_ignored(key) => {
                    debug!("Ignoring descriptor key '{}' in [{}]", key, section.name);
                }
                None => unit.args.push(BuildArg::property(key, value.trim())),
            }
        }

        let needs_source = !unit.is_defaults || unit.patches.is_some();
        if needs_source && unit.source.is_none() {
            return Err(ChainError::MalformedLocator {
                unit: section.name.clone(),
                key: SpecialKey::Source.key(),
                source: LocatorError::Absent,
            });
        }

        Ok(unit)
    }
}
