//! Run reports

use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Resolving,
    Patching,
    Substituting,
    SkippedBuild,
    Building,
    Cleaning,
    Done,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Built,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub project: Option<String>,
    pub status: UnitStatus,
    /// States visited, in order.
    pub states: Vec<UnitState>,
    pub patches_applied: usize,
    pub substituted: bool,
    pub command: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl UnitReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: None,
            status: UnitStatus::Skipped,
            states: vec![UnitState::Pending],
            patches_applied: 0,
            substituted: false,
            command: None,
            duration_ms: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub units: Vec<UnitReport>,
    pub duration_ms: u64,
    /// Set when the chain stopped early.
    pub halted_at: Option<String>,
}

impl RunReport {
    pub fn new(started_at: impl Into<String>) -> Self {
        Self {
            started_at: started_at.into(),
            units: Vec::new(),
            duration_ms: 0,
            halted_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.halted_at.is_none()
    }

    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn built(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.status == UnitStatus::Built)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(io::Error::from)?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut report = RunReport::new("2024-01-01T00:00:00+00:00");
        let mut unit = UnitReport::new("core");
        unit.status = UnitStatus::Failed;
        unit.states.push(UnitState::SkippedBuild);
        report.units.push(unit);
        report.halted_at = Some("core".to_string());

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["units"][0]["status"], "failed");
        assert_eq!(value["units"][0]["states"][1], "skipped_build");
        assert_eq!(value["halted_at"], "core");
        assert!(!report.succeeded());
    }
}
