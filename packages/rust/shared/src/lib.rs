//! Shared types, error model, and configuration for docfleet.
//!
//! This crate is the foundation depended on by all other docfleet crates.
//! It provides:
//! - [`DocfleetError`]: the unified error type
//! - Domain types ([`VersionSpec`], [`VersionEntry`], [`BuildResult`])
//! - Configuration ([`BuildConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BuildConfig, DocsConfig, GitHubConfig, Isolation, ProjectConfig, SourceConfig, init_config,
    load_config_from, render_config,
};
pub use error::{DocfleetError, Result};
pub use types::{BuildResult, VersionEntry, VersionSpec};
