//! Build orchestration and domain logic for docfleet.
//!
//! This crate ties source extraction, package installation, notebook
//! acquisition, and site compilation into the multi-version build
//! ([`MultiVersionBuilder`]), plus the smaller site utilities the CLI exposes.

pub mod command;
pub mod environment;
pub mod matrix;
pub mod notebooks;
pub mod pipeline;
pub mod site;
pub mod source;
pub mod toolchain;

pub use command::{CommandOutput, CommandSpec};
pub use environment::{Environment, validate_prerequisites};
pub use matrix::{MatrixEntry, collect_matrix};
pub use notebooks::{StripReport, strip_outputs};
pub use pipeline::{BuildReport, MultiVersionBuilder, ProgressReporter, SilentProgress};
pub use site::{BuiltVersions, scan_built_versions};
pub use toolchain::{InstallScope, SystemToolchain, ToolPaths, Toolchain};
