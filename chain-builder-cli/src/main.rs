use clap::{Parser, crate_version};
use convenient_chain::config::DEFAULT_BUILD_COMMAND;
use convenient_chain::{
    ChainConfig, ChainRunner, Descriptor, PatchFailurePolicy, PatchedProject, RunReport,
    ShellBuildTool,
};
use convenient_git::Git;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Options for the application.
#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = "Ralf Anton Beier")]
struct Opts {
    /// The chain descriptor listing the units to build, in order.
    descriptor: PathBuf,

    /// Project name whose fresh checkout is replaced by a local tree.
    #[clap(long, requires = "patched_path")]
    patched_project: Option<String>,

    /// The local tree substituted for --patched-project.
    #[clap(long, requires = "patched_project")]
    patched_path: Option<PathBuf>,

    /// Parent directory of all per-unit workspaces.
    #[clap(long, env = "CHAIN_SCRATCH_ROOT")]
    scratch_root: Option<PathBuf>,

    /// Directory receiving the per-unit build logs.
    #[clap(long, env = "CHAIN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Build command every unit starts from.
    #[clap(long, default_value = DEFAULT_BUILD_COMMAND, env = "CHAIN_BUILD_COMMAND")]
    build_command: String,

    /// Local artifact repository all units deploy into.
    #[clap(long, env = "CHAIN_DEPLOY_REPOSITORY")]
    deploy_repository: Option<PathBuf>,

    /// Descriptor key to keep off the build command line. Repeatable.
    #[clap(long = "ignore-key")]
    ignore_keys: Vec<String>,

    /// Skip tests in every unit.
    #[clap(long)]
    skip_tests: bool,

    /// Reset a unit's tree when one of its patches fails to apply.
    #[clap(long)]
    rollback_failed_patches: bool,

    /// Committer name for applied patches.
    #[clap(long, default_value = "ChainBuilder", env = "CHAIN_GIT_USER_NAME")]
    git_user_name: String,

    /// Committer email for applied patches.
    #[clap(long, default_value = "chain-builder@localhost", env = "CHAIN_GIT_EMAIL")]
    git_email: String,

    /// Write a JSON run report to this file.
    #[clap(long)]
    report: Option<PathBuf>,

    /// Log level: debug, info, warn or error.
    #[clap(short, long, default_value = "info", env = "CHAIN_LOG_LEVEL")]
    log_level: String,

    /// Print debug information
    #[clap(short)]
    debug: bool,
}

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Halted,
    InvalidInput,
}

impl Outcome {
    fn code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Halted => 1,
            Outcome::InvalidInput => 2,
        }
    }
}

/// Gets the log level enum variant from a level string.
///
/// Unknown names fall back to `INFO`.
///
/// ```ignore
/// let level = get_log_level("INFO");
/// assert_eq!(level, Level::INFO);
/// ```
pub fn get_log_level(level: &str) -> Level {
    match level.to_uppercase().as_ref() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" => Level::WARN,
        "ERROR" => Level::ERROR,
        "FATAL" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_config(opts: &Opts) -> ChainConfig {
    let mut config = ChainConfig::default()
        .with_build_command(opts.build_command.as_str())
        .with_skip_tests(opts.skip_tests);
    if let Some(root) = &opts.scratch_root {
        config = config.with_scratch_root(root);
    }
    if let Some(dir) = &opts.log_dir {
        config = config.with_log_dir(dir);
    }
    if let Some(repository) = &opts.deploy_repository {
        config = config.with_deploy_repository(Some(repository.clone()));
    }
    for key in &opts.ignore_keys {
        config = config.with_ignored_key(key.as_str());
    }
    if opts.rollback_failed_patches {
        config = config.with_patch_failure_policy(PatchFailurePolicy::Rollback);
    }
    if let (Some(name), Some(path)) = (&opts.patched_project, &opts.patched_path) {
        config = config.with_patched_project(PatchedProject::new(name.as_str(), path));
    }
    config
}

fn write_report(report: &RunReport, path: Option<&Path>) {
    let Some(path) = path else {
        return;
    };
    match report.write(path) {
        Ok(()) => info!("Report written to {}", path.display()),
        Err(e) => warn!("Cannot write report {}: {}", path.display(), e),
    }
}

fn run(opts: &Opts) -> Outcome {
    let descriptor = match Descriptor::load(&opts.descriptor) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            error!("{}", e);
            return Outcome::InvalidInput;
        }
    };

    if let Some(path) = &opts.patched_path {
        if !path.is_dir() {
            error!("Patched project path {} is not a directory", path.display());
            return Outcome::InvalidInput;
        }
    }

    let config = build_config(opts);
    info!("Scratch root: {}", config.scratch_root.display());
    info!("Unit logs: {}", config.log_dir.display());

    let git = Git::new().with_identity(opts.git_user_name.as_str(), opts.git_email.as_str());
    let build_tool = ShellBuildTool::default();
    let mut runner = ChainRunner::new(config, &git, &build_tool);

    match runner.run(&descriptor) {
        Ok(report) => {
            write_report(&report, opts.report.as_deref());
            info!("Chain completed, {} units built", report.built().count());
            Outcome::Success
        }
        Err(halted) => {
            write_report(&halted.report, opts.report.as_deref());
            error!("{}", halted);
            Outcome::Halted
        }
    }
}

fn main() -> ExitCode {
    // Get the command line arguments
    let opts: Opts = Opts::parse();

    let log_level = if opts.debug {
        "debug"
    } else {
        opts.log_level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(get_log_level(log_level).to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_file(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }

    ExitCode::from(run(&opts).code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Opts, clap::Error> {
        Opts::try_parse_from(std::iter::once("chain-builder").chain(args.iter().copied()))
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(get_log_level("debug"), Level::DEBUG);
        assert_eq!(get_log_level("Warn"), Level::WARN);
        assert_eq!(get_log_level("FATAL"), Level::ERROR);
        assert_eq!(get_log_level("chatty"), Level::INFO);
    }

    #[test]
    fn test_defaults() {
        let opts = parse(&["chain.cfg"]).unwrap();
        let config = build_config(&opts);
        assert_eq!(config.build_command, DEFAULT_BUILD_COMMAND);
        assert_eq!(config.patch_failure_policy, PatchFailurePolicy::LeaveAsIs);
        assert!(config.patched_project.is_none());
        assert!(!config.skip_tests);
    }

    #[test]
    fn test_options_map_onto_config() {
        let opts = parse(&[
            "chain.cfg",
            "--patched-project",
            "core",
            "--patched-path",
            "/work/core",
            "--scratch-root",
            "/scratch",
            "--deploy-repository",
            "/repo",
            "--ignore-key",
            "internal",
            "--ignore-key",
            "owner",
            "--rollback-failed-patches",
            "--skip-tests",
        ])
        .unwrap();
        let config = build_config(&opts);

        let patched = config.patched_project.as_ref().unwrap();
        assert_eq!(patched.name, "core");
        assert_eq!(patched.path, PathBuf::from("/work/core"));
        assert_eq!(config.scratch_root, PathBuf::from("/scratch"));
        assert_eq!(config.patch_failure_policy, PatchFailurePolicy::Rollback);
        assert!(config.ignored_keys.iter().any(|k| k == "internal"));
        assert!(config.ignored_keys.iter().any(|k| k == "owner"));
        assert!(config.skip_tests);
        assert!(config.base_command().ends_with("file:///repo"));
    }

    #[test]
    fn test_patched_options_come_in_pairs() {
        assert!(parse(&["chain.cfg", "--patched-project", "core"]).is_err());
        assert!(parse(&["chain.cfg", "--patched-path", "/work/core"]).is_err());
    }

    #[test]
    fn test_descriptor_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.code(), 0);
        assert_eq!(Outcome::Halted.code(), 1);
        assert_eq!(Outcome::InvalidInput.code(), 2);
    }
}
