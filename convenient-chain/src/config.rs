//! Chain run configuration

use std::env;
use std::path::PathBuf;

use crate::options::DEFAULT_IGNORED_KEYS;
use crate::patch::PatchFailurePolicy;
use crate::substitute::PatchedProject;

/// Build command every unit starts from.
pub const DEFAULT_BUILD_COMMAND: &str = "mvn deploy -B -q";
/// Environment variable receiving `jvm_options`.
pub const RUNTIME_ENV_VAR: &str = "MAVEN_OPTS";

#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Parent of all unit and patch workspaces.
    pub scratch_root: PathBuf,
    /// Directory holding `chain-<unit>.log` files.
    pub log_dir: PathBuf,
    pub build_command: String,
    /// Append `-DskipTests` to every unit's build.
    pub skip_tests: bool,
    /// Shared local artifact repository every unit deploys into.
    pub deploy_repository: Option<PathBuf>,
    pub runtime_env_var: String,
    pub ignored_keys: Vec<String>,
    pub patch_failure_policy: PatchFailurePolicy,
    pub patched_project: Option<PatchedProject>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let tmp = env::temp_dir();
        Self {
            log_dir: tmp.join("chain-builder-logs"),
            deploy_repository: Some(tmp.join("chain-repository")),
            scratch_root: tmp,
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            skip_tests: false,
            runtime_env_var: RUNTIME_ENV_VAR.to_string(),
            ignored_keys: DEFAULT_IGNORED_KEYS.iter().map(|k| k.to_string()).collect(),
            patch_failure_policy: PatchFailurePolicy::default(),
            patched_project: None,
        }
    }
}

impl ChainConfig {
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_build_command(mut self, command: impl Into<String>) -> Self {
        self.build_command = command.into();
        self
    }

    pub fn with_skip_tests(mut self, skip_tests: bool) -> Self {
        self.skip_tests = skip_tests;
        self
    }

    pub fn with_deploy_repository(mut self, repository: Option<PathBuf>) -> Self {
        self.deploy_repository = repository;
        self
    }

    pub fn with_ignored_key(mut self, key: impl Into<String>) -> Self {
        self.ignored_keys.push(key.into());
        self
    }

    pub fn with_patch_failure_policy(mut self, policy: PatchFailurePolicy) -> Self {
        self.patch_failure_policy = policy;
        self
    }

    pub fn with_patched_project(mut self, project: PatchedProject) -> Self {
        self.patched_project = Some(project);
        self
    }

    /// Build command with the deployment repository flag appended.
    pub fn base_command(&self) -> String {
        match &self.deploy_repository {
            Some(repository) => format!(
                "{} -DaltDeploymentRepository=chain::default::file://{}",
                self.build_command.trim(),
                repository.display()
            ),
            None => self.build_command.trim().to_string(),
        }
    }
}
