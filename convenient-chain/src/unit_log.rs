//! Per-unit log sink
//!
//! Build-tool output for a unit is appended to `<log-dir>/chain-<unit>.log`.
//! Unit names that need sanitising get a short hash suffix so that distinct
//! units never share a file.
//! The sink is handed explicitly to whatever writes into it.

use chrono::Local;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct UnitLog {
    unit: String,
    path: PathBuf,
}

impl UnitLog {
    /// Open (creating if needed) the log for `unit` under `dir` and write a
    /// section banner.
    pub fn open(dir: &Path, unit: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let log = Self {
            unit: unit.to_string(),
            path: dir.join(log_file_name(unit)),
        };
        log.note(&format!("====================== {} ====================", unit))?;
        Ok(log)
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append handle, e.g. to redirect a child process into.
    pub fn append(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }

    /// Append one timestamped line.
    pub fn note(&self, message: &str) -> io::Result<()> {
        let mut file = self.append()?;
        writeln!(
            file,
            "{} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        )
    }

    /// Last `count` lines of the log.
    pub fn tail(&self, count: usize) -> io::Result<Vec<String>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines = VecDeque::new();
        for line in reader.lines() {
            lines.push_back(line?);
            if lines.len() > count {
                lines.pop_front();
            }
        }
        Ok(lines.into())
    }
}

/// `chain-<unit>.log`, with characters unsafe in file names replaced.
///
/// A replaced name carries the first eight hex digits of the unit's SHA-256.
pub fn log_file_name(unit: &str) -> String {
    let safe: String = unit
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "._-".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe == unit {
        return format!("chain-{}.log", safe);
    }
    let mut hasher = Sha256::new();
    hasher.update(unit.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("chain-{}-{}.log", safe, &hash[..8])
}
