//! Build execution
//!
//! A [`BuildCommand`] is rendered to a single shell command line and run by a
//! [`BuildTool`] inside the unit's project directory, with combined output
//! appended to the unit log. A non-zero exit status stops the chain.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{error, info};

use crate::error::{ChainError, ChainResult};
use crate::options::{BuildArg, SKIP_TESTS_FLAG};
use crate::unit_log::UnitLog;

/// Lines of captured output repeated into the error log on failure.
const FAILURE_TAIL_LINES: usize = 40;

/// Base command plus the arguments translated from the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    base: String,
    args: Vec<BuildArg>,
}

impl BuildCommand {
    pub fn new(base: impl Into<String>, args: Vec<BuildArg>) -> Self {
        Self {
            base: base.into(),
            args,
        }
    }

    pub fn args(&self) -> &[BuildArg] {
        &self.args
    }

    pub fn skips_tests(&self) -> bool {
        self.args
            .iter()
            .any(|arg| matches!(arg, BuildArg::Verbatim(text) if text == SKIP_TESTS_FLAG))
    }

    /// Full command line as handed to the shell.
    pub fn command_line(&self) -> String {
        let mut line = self.base.trim().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.render());
        }
        line
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// What a build tool is asked to run.
#[derive(Debug, Clone, Copy)]
pub struct BuildInvocation<'a> {
    pub command: &'a BuildCommand,
    pub workdir: &'a Path,
    /// Variables set on top of the inherited process environment.
    pub env: &'a BTreeMap<String, String>,
}

/// Runs build commands and reports their exit status.
pub trait BuildTool {
    /// Run `invocation` to completion, output going to `log`.
    ///
    /// A process killed by a signal reports `-1`.
    fn execute(&self, invocation: &BuildInvocation<'_>, log: &UnitLog) -> io::Result<i32>;
}

/// Runs the command line through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellBuildTool {
    shell: String,
}

impl Default for ShellBuildTool {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellBuildTool {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl BuildTool for ShellBuildTool {
    fn execute(&self, invocation: &BuildInvocation<'_>, log: &UnitLog) -> io::Result<i32> {
        let stdout = log.append()?;
        let stderr = stdout.try_clone()?;

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(invocation.command.command_line())
            .current_dir(invocation.workdir)
            .envs(invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Run `command` in `project_path` (or its `subdirectory`).
///
/// Fails with [`ChainError::BuildFailed`] on a non-zero exit status, after
/// logging the tail of the captured output.
pub fn run_build(
    tool: &dyn BuildTool,
    log: &UnitLog,
    project_path: &Path,
    subdirectory: Option<&str>,
    command: &BuildCommand,
    env: &BTreeMap<String, String>,
) -> ChainResult<()> {
    let unit = log.unit();
    let workdir = match subdirectory {
        Some(subdir) => project_path.join(subdir),
        None => project_path.to_path_buf(),
    };
    if !workdir.is_dir() {
        return Err(ChainError::MissingBuildDir {
            unit: unit.to_string(),
            path: workdir,
        });
    }

    info!("The build command is: {}", command);
    info!("Running build in {}", workdir.display());
    log.note(&format!("The build command is: {}", command))
        .map_err(|e| ChainError::io(unit, "write unit log", e))?;

    let invocation = BuildInvocation {
        command,
        workdir: &workdir,
        env,
    };
    let status = tool
        .execute(&invocation, log)
        .map_err(|e| ChainError::io(unit, "run build", e))?;

    if status != 0 {
        error!("Build of [{}] failed with exit status {}", unit, status);
        match log.tail(FAILURE_TAIL_LINES) {
            Ok(lines) => {
                for line in lines {
                    error!("[{}] {}", unit, line);
                }
            }
            Err(e) => error!("Cannot read {}: {}", log.path().display(), e),
        }
        return Err(ChainError::BuildFailed {
            unit: unit.to_string(),
            status,
        });
    }

    info!("Build of [{}] succeeded", unit);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[test]
    fn test_command_line_rendering() {
        let command = BuildCommand::new(
            "mvn deploy -B ",
            vec![
                BuildArg::verbatim(SKIP_TESTS_FLAG),
                BuildArg::verbatim("-Pa -Pb"),
                BuildArg::property("name", "two words"),
            ],
        );
        assert_eq!(
            command.command_line(),
            "mvn deploy -B -DskipTests -Pa -Pb '-Dname=two words'"
        );
        assert!(command.skips_tests());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_tool_runs_in_workdir_with_env() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        fs::create_dir_all(project.join("module")).unwrap();
        let log = UnitLog::open(&temp.path().join("logs"), "unit").unwrap();

        let command = BuildCommand::new("pwd; echo \"opts=$MAVEN_OPTS\"; echo oops >&2", vec![]);
        let env = BTreeMap::from([("MAVEN_OPTS".to_string(), "-Xmx1g".to_string())]);
        run_build(
            &ShellBuildTool::default(),
            &log,
            &project,
            Some("module"),
            &command,
            &env,
        )
        .unwrap();

        let output = fs::read_to_string(log.path()).unwrap();
        assert!(output.contains("module"));
        assert!(output.contains("opts=-Xmx1g"));
        assert!(output.contains("oops"));
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn test_non_zero_exit_is_build_failure() {
        let temp = TempDir::new().unwrap();
        let log = UnitLog::open(temp.path(), "broken").unwrap();
        let command = BuildCommand::new("echo compiling; exit 3", vec![]);

        let err = run_build(
            &ShellBuildTool::default(),
            &log,
            temp.path(),
            None,
            &command,
            &BTreeMap::new(),
        )
        .unwrap_err();

        assert!(matches!(err, ChainError::BuildFailed { status: 3, .. }));
        assert!(logs_contain("compiling"));
    }

    #[test]
    fn test_missing_subdirectory() {
        let temp = TempDir::new().unwrap();
        let log = UnitLog::open(temp.path(), "unit").unwrap();
        let command = BuildCommand::new("true", vec![]);

        let err = run_build(
            &ShellBuildTool::default(),
            &log,
            temp.path(),
            Some("nope"),
            &command,
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ChainError::MissingBuildDir { .. }));
    }
}
