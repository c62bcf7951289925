//! Execution environment detection and pre-run prerequisite checks.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info};

use docfleet_shared::{DocfleetError, Result};

use crate::command::{self, CommandSpec};
use crate::toolchain::ToolPaths;

/// Where the build is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Ci,
    Local,
    Unknown,
}

impl Environment {
    /// `ci` under GitHub Actions, `local` inside a conda env, else `unknown`.
    pub fn detect() -> Self {
        Self::from_flags(
            std::env::var_os("GITHUB_ACTIONS").is_some_and(|v| !v.is_empty()),
            std::env::var_os("CONDA_PREFIX").is_some_and(|v| !v.is_empty()),
        )
    }

    pub fn from_flags(github_actions: bool, conda: bool) -> Self {
        if github_actions {
            Self::Ci
        } else if conda {
            Self::Local
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ci => "ci",
            Self::Local => "local",
            Self::Unknown => "unknown",
        })
    }
}

/// Version string reported by `program --version`, if it runs at all.
pub async fn tool_version(program: &Path) -> Option<String> {
    let output = command::run(&CommandSpec::new(program).arg("--version"))
        .await
        .ok()?;
    if !output.success() {
        return None;
    }
    let text = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Some(text.trim().to_string())
}

/// Check everything a run needs before any version is touched. Every problem
/// is logged; the returned error summarizes them.
pub async fn validate_prerequisites(
    source_repo: &Path,
    docs_root: &Path,
    entry_file: &str,
    tools: &ToolPaths,
) -> Result<()> {
    info!("validating prerequisites");
    let mut problems = Vec::new();

    if !source_repo.exists() {
        problems.push(format!("source repository not found: {}", source_repo.display()));
    } else if !source_repo.join(".git").exists() {
        problems.push(format!("not a git repository: {}", source_repo.display()));
    }

    if !docs_root.exists() {
        problems.push(format!("documentation root not found: {}", docs_root.display()));
    } else if !docs_root.join(entry_file).exists() {
        problems.push(format!("no {entry_file} found in: {}", docs_root.display()));
    }

    for (role, program) in [("python", &tools.python), ("compiler", &tools.compiler)] {
        match tool_version(program).await {
            Some(version) => debug!(role, version = %version, "tool found"),
            None => problems.push(format!("{role} executable not usable: {}", program.display())),
        }
    }

    if problems.is_empty() {
        info!("prerequisites validated");
        return Ok(());
    }

    for problem in &problems {
        error!("{problem}");
    }
    Err(DocfleetError::prerequisite(format!(
        "prerequisite validation failed: {}",
        problems.join("; ")
    )))
}
