//! Chain driver
//!
//! Walks descriptor sections in file order. Each unit moves through
//!
//! ```text
//! Pending -> Resolving -> (Patching)? -> (Substituting)? -> SkippedBuild | Building -> Cleaning -> Done
//! ```
//!
//! and ends in `Halted` instead of `Done` on any error, which also stops the
//! chain. `Cleaning` removes the unit's workspace on every path before the
//! driver moves on or returns.

use chrono::Local;
use convenient_git::VersionControl;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, info_span, warn};

use crate::config::ChainConfig;
use crate::descriptor::{Descriptor, Section};
use crate::error::{ChainError, ChainResult};
use crate::executor::{run_build, BuildCommand, BuildTool};
use crate::fetch::{checkout_revision, materialize};
use crate::locator::Locator;
use crate::options::{BuildArg, BuildUnit, OptionTranslator, SpecialKey, SKIP_TESTS_FLAG};
use crate::patch::PatchApplier;
use crate::report::{RunReport, UnitReport, UnitState, UnitStatus};
use crate::substitute::Substitutor;
use crate::unit_log::UnitLog;
use crate::workspace::Workspace;

/// A chain that stopped early, with the report up to and including the
/// failed unit.
#[derive(Debug, thiserror::Error)]
#[error("chain halted at [{}]: {}", .error.unit(), .error)]
pub struct ChainHalted {
    pub error: ChainError,
    pub report: RunReport,
}

pub struct ChainRunner<'a> {
    config: ChainConfig,
    translator: OptionTranslator,
    substitutor: Substitutor,
    vcs: &'a dyn VersionControl,
    build_tool: &'a dyn BuildTool,
}

impl<'a> ChainRunner<'a> {
    pub fn new(
        config: ChainConfig,
        vcs: &'a dyn VersionControl,
        build_tool: &'a dyn BuildTool,
    ) -> Self {
        Self {
            translator: OptionTranslator::new(config.ignored_keys.iter().cloned()),
            substitutor: Substitutor::new(config.patched_project.clone()),
            config,
            vcs,
            build_tool,
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Process every section in order, stopping at the first failure.
    pub fn run(&mut self, descriptor: &Descriptor) -> Result<RunReport, ChainHalted> {
        let started = Instant::now();
        let mut report = RunReport::new(Local::now().to_rfc3339());
        let default_runtime = descriptor
            .defaults()
            .and_then(|defaults| defaults.get(SpecialKey::RuntimeOptions.key()))
            .map(|value| value.trim().to_string());

        for section in descriptor.sections() {
            let unit_started = Instant::now();
            let mut unit_report = UnitReport::new(&section.name);
            let result = {
                let span = info_span!("unit", name = %section.name);
                let _enter = span.enter();
                self.process_section(section, default_runtime.as_deref(), &mut unit_report)
            };
            unit_report.duration_ms = elapsed_ms(unit_started);

            match result {
                Ok(status) => {
                    unit_report.status = status;
                    unit_report.states.push(UnitState::Done);
                    report.units.push(unit_report);
                }
                Err(error) => {
                    error!(
                        unit = %error.unit(),
                        operation = error.operation(),
                        "Chain halted: {}",
                        error
                    );
                    unit_report.status = UnitStatus::Failed;
                    unit_report.error = Some(error.to_string());
                    unit_report.states.push(UnitState::Halted);
                    report.units.push(unit_report);
                    report.halted_at = Some(section.name.clone());
                    report.duration_ms = elapsed_ms(started);
                    return Err(ChainHalted { error, report });
                }
            }
        }

        report.duration_ms = elapsed_ms(started);
        info!("Chain finished, {} units processed", report.units.len());
        Ok(report)
    }

    fn process_section(
        &mut self,
        section: &Section,
        default_runtime: Option<&str>,
        report: &mut UnitReport,
    ) -> ChainResult<UnitStatus> {
        info!("Processing {}", section.name);
        report.states.push(UnitState::Resolving);
        let unit = self.translator.translate(section)?;

        let Some(source) = unit.source.clone() else {
            info!("[{}] declares no source, nothing to build", unit.name);
            report.states.push(UnitState::SkippedBuild);
            report.states.push(UnitState::Cleaning);
            return Ok(UnitStatus::Skipped);
        };
        report.project = Some(source.project_name().to_string());

        let log = UnitLog::open(&self.config.log_dir, &unit.name)
            .map_err(|e| ChainError::io(&unit.name, "open unit log", e))?;
        let workspace = Workspace::create(&self.config.scratch_root)
            .map_err(|e| ChainError::workspace(&unit.name, "create workspace", e))?;
        info!("Workspace: {}", workspace.path().display());

        let result =
            self.process_in_workspace(&unit, &source, workspace.path(), &log, default_runtime, report);

        report.states.push(UnitState::Cleaning);
        let cleanup = workspace
            .destroy()
            .map_err(|e| ChainError::workspace(&unit.name, "remove workspace", e));

        match (result, cleanup) {
            (Ok(status), Ok(())) => Ok(status),
            (Ok(_), Err(cleanup_error)) => Err(cleanup_error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(cleanup_error)) => {
                warn!("{}", cleanup_error);
                Err(error)
            }
        }
    }

    fn process_in_workspace(
        &mut self,
        unit: &BuildUnit,
        source: &Locator,
        workspace: &Path,
        log: &UnitLog,
        default_runtime: Option<&str>,
        report: &mut UnitReport,
    ) -> ChainResult<UnitStatus> {
        let project = source.project_name();
        info!("Project name: {}", project);

        let project_path = materialize(self.vcs, &unit.name, &source.address, project, workspace)?;
        checkout_revision(self.vcs, &unit.name, &source.revision, project, workspace)?;

        if let Some(patches) = &unit.patches {
            report.states.push(UnitState::Patching);
            let applier = PatchApplier::new(
                self.vcs,
                &self.config.scratch_root,
                self.config.patch_failure_policy,
            );
            report.patches_applied = applier.apply(&unit.name, patches, &project_path)?.len();
        }

        if self
            .substitutor
            .maybe_substitute(&unit.name, project, &project_path)?
        {
            report.states.push(UnitState::Substituting);
            report.substituted = true;
        }

        if unit.skip_build {
            info!("Skipping build of [{}]", unit.name);
            report.states.push(UnitState::SkippedBuild);
            return Ok(UnitStatus::Skipped);
        }

        report.states.push(UnitState::Building);
        let mut args = unit.args.clone();
        if self.config.skip_tests && !args.iter().any(|arg| arg.render() == SKIP_TESTS_FLAG) {
            args.push(BuildArg::verbatim(SKIP_TESTS_FLAG));
        }
        let command = BuildCommand::new(self.config.base_command(), args);
        report.command = Some(command.command_line());

        let mut env = BTreeMap::new();
        if let Some(options) = unit.runtime_options.as_deref().or(default_runtime) {
            info!("Setting {} to: {}", self.config.runtime_env_var, options);
            env.insert(self.config.runtime_env_var.clone(), options.to_string());
        }

        run_build(
            self.build_tool,
            log,
            &project_path,
            source.subdirectory.as_deref(),
            &command,
            &env,
        )?;
        Ok(UnitStatus::Built)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
