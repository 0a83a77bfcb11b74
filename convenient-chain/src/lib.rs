//! Chain-build engine
//!
//! Reads a descriptor of build units and, for each unit in declaration order,
//! clones its source into a fresh workspace, pins a revision, optionally
//! applies a patch series, optionally swaps in a locally patched tree, runs the
//! build command and removes the workspace. The first failure halts the chain.
//!
//! ```no_run
//! use convenient_chain::{ChainConfig, ChainRunner, Descriptor, ShellBuildTool};
//! use convenient_git::Git;
//!
//! let descriptor = Descriptor::load("chain.cfg").unwrap();
//! let git = Git::new();
//! let tool = ShellBuildTool::default();
//! let mut runner = ChainRunner::new(ChainConfig::default(), &git, &tool);
//! let report = runner.run(&descriptor).unwrap();
//! assert!(report.succeeded());
//! ```

pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod locator;
pub mod options;
pub mod patch;
pub mod report;
pub mod substitute;
pub mod unit_log;
pub mod workspace;

pub use config::ChainConfig;
pub use descriptor::{Descriptor, DescriptorError, Section};
pub use driver::{ChainHalted, ChainRunner};
pub use error::{ChainError, ChainResult};
pub use executor::{BuildCommand, BuildInvocation, BuildTool, ShellBuildTool};
pub use locator::{Locator, LocatorError};
pub use options::{BuildArg, BuildUnit, OptionTranslator, SpecialKey};
pub use patch::PatchFailurePolicy;
pub use report::{RunReport, UnitReport, UnitState, UnitStatus};
pub use substitute::{PatchedProject, Substitutor};
pub use unit_log::UnitLog;
pub use workspace::{Workspace, WorkspaceError};
