//! Chain descriptor loading
//!
//! A descriptor is an INI-style file of named sections, each an ordered list
//! of `key = value` pairs. Section and key order are preserved exactly since
//! they decide build order and flag order.
//!
//! ```text
//! [DEFAULT]
//! jvm_options = -Xmx2g
//!
//! [core]
//! scmurl = "git+https://example.com/org/core.git#1.4.0"
//! skipTests
//! properties = '''
//!     skipTests
//!     release.version=%(version)s
//! '''
//! version = 1.4.0
//! ```
//!
//! Supported syntax: `#`/`;` comment lines, whitespace-prefixed inline `#`
//! comments on unquoted values, single/double quoted values, triple-quoted
//! multi-line values, bare keys, and `%(name)s` interpolation against the
//! current section first and `[DEFAULT]` second.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the process-wide defaults section. It is never built.
pub const DEFAULT_SECTION: &str = "DEFAULT";

const MAX_INTERPOLATION_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("cannot read descriptor {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("section [{0}] is declared more than once")]
    DuplicateSection(String),

    #[error("key '{key}' is declared more than once in section [{section}]")]
    DuplicateKey { section: String, key: String },

    #[error("descriptor has no [DEFAULT] section")]
    MissingDefaults,

    #[error("section [{section}], key '{key}': {message}")]
    Interpolation {
        section: String,
        key: String,
        message: String,
    },
}

/// One descriptor section, entries in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_defaults(&self) -> bool {
        self.name == DEFAULT_SECTION
    }
}

/// Parsed descriptor: ordered sections of ordered key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    sections: Vec<Section>,
}

impl Descriptor {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| DescriptorError::Io(path.to_path_buf(), e))?;
        content.parse()
    }

    /// All sections, `[DEFAULT]` included, in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn defaults(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_defaults())
    }

    fn interpolate(mut self) -> Result<Self, DescriptorError> {
        let raw = self.clone();
        let defaults = raw.defaults();
        for (section, raw_section) in self.sections.iter_mut().zip(&raw.sections) {
            for (key, value) in section.entries.iter_mut() {
                *value = expand(value, raw_section, defaults, 0).map_err(|message| {
                    DescriptorError::Interpolation {
                        section: raw_section.name.clone(),
                        key: key.clone(),
                        message,
                    }
                })?;
            }
        }
        Ok(self)
    }
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut sections: Vec<Section> = Vec::new();
        let mut lines = content.lines().enumerate();

        while let Some((index, line)) = lines.next() {
            let line_no = index + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') {
                let name = parse_section_header(trimmed).map_err(|message| {
                    DescriptorError::Syntax {
                        line: line_no,
                        message,
                    }
                })?;
                if sections.iter().any(|s| s.name == name) {
                    return Err(DescriptorError::DuplicateSection(name));
                }
                sections.push(Section {
                    name,
                    entries: Vec::new(),
                });
                continue;
            }

            let Some(section) = sections.last_mut() else {
                return Err(DescriptorError::Syntax {
                    line: line_no,
                    message: "key outside of any section".to_string(),
                });
            };

            let (key, raw_value) = match trimmed.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (trimmed, ""),
            };
            if key.is_empty() {
                return Err(DescriptorError::Syntax {
                    line: line_no,
                    message: "missing key before '='".to_string(),
                });
            }

            let value = match triple_quote(raw_value) {
                Some(delimiter) => {
                    let rest = &raw_value[delimiter.len()..];
                    if let Some(end) = rest.find(delimiter) {
                        rest[..end].to_string()
                    } else {
                        let mut block = vec![rest.to_string()];
                        loop {
                            let Some((_, next)) = lines.next() else {
                                return Err(DescriptorError::Syntax {
                                    line: line_no,
                                    message: format!("unterminated {} value", delimiter),
                                });
                            };
                            if let Some(end) = next.find(delimiter) {
                                block.push(next[..end].to_string());
                                break;
                            }
                            block.push(next.to_string());
                        }
                        block.join("\n")
                    }
                }
                None => parse_single_value(raw_value).map_err(|message| {
                    DescriptorError::Syntax {
                        line: line_no,
                        message,
                    }
                })?,
            };

            if section.get(key).is_some() {
                return Err(DescriptorError::DuplicateKey {
                    section: section.name.clone(),
                    key: key.to_string(),
                });
            }
            section.entries.push((key.to_string(), value));
        }

        let descriptor = Descriptor { sections };
        if descriptor.defaults().is_none() {
            return Err(DescriptorError::MissingDefaults);
        }
        descriptor.interpolate()
    }
}

fn parse_section_header(line: &str) -> Result<String, String> {
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| format!("malformed section header '{}'", line))?
        .trim();
    if inner.is_empty() || inner.contains(['[', ']']) {
        return Err(format!("malformed section header '{}'", line));
    }
    Ok(inner.to_string())
}

fn triple_quote(value: &str) -> Option<&'static str> {
    ["'''", "\"\"\""]
        .into_iter()
        .find(|delimiter| value.starts_with(delimiter))
}

fn parse_single_value(value: &str) -> Result<String, String> {
    let mut chars = value.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &value[1..];
            let end = body
                .find(quote)
                .ok_or_else(|| format!("unterminated quoted value {}", value))?;
            let trailing = body[end + 1..].trim();
            if !trailing.is_empty() && !trailing.starts_with('#') {
                return Err(format!("unexpected text after quoted value: '{}'", trailing));
            }
            Ok(body[..end].to_string())
        }
        _ => Ok(strip_inline_comment(value).to_string()),
    }
}

/// Cut at the first `#` preceded by whitespace; `a.git#rev` is kept intact.
fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return value[..i].trim_end();
        }
    }
    value
}

fn expand(
    value: &str,
    section: &Section,
    defaults: Option<&Section>,
    depth: usize,
) -> Result<String, String> {
    if !value.contains("%(") {
        return Ok(value.to_string());
    }
    if depth >= MAX_INTERPOLATION_DEPTH {
        return Err("interpolation nested too deeply".to_string());
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find(")s")
            .ok_or_else(|| format!("unterminated interpolation in '{}'", value))?;
        let name = &after[..end];
        let replacement = section
            .get(name)
            .or_else(|| defaults.and_then(|d| d.get(name)))
            .ok_or_else(|| format!("unknown interpolation key '{}'", name))?;
        out.push_str(&expand(replacement, section, defaults, depth + 1)?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
