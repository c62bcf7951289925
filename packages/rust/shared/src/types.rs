//! Core domain types for multi-version documentation builds.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VersionSpec
// ---------------------------------------------------------------------------

/// One documented version, as declared in the build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Git reference (branch, tag, or commit) of the source snapshot.
    #[serde(rename = "git_ref", alias = "reference")]
    pub reference: String,
    /// Unique short identifier, also the output directory name.
    #[serde(rename = "version_name", alias = "name")]
    pub name: String,
    /// Label shown in the version switcher. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// URL path segment the version is published under.
    pub url_path: String,
    /// Whether this is the version the site root redirects to.
    #[serde(default)]
    pub preferred: bool,
}

impl VersionSpec {
    /// Display name, falling back to the version name.
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// VersionEntry
// ---------------------------------------------------------------------------

/// A single entry in `versions.json`, consumed by the client-side switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Display name.
    pub name: String,
    /// Version identifier.
    pub version: String,
    /// Published URL path.
    pub url: String,
    /// Whether this is the preferred version.
    pub preferred: bool,
}

impl From<&VersionSpec> for VersionEntry {
    fn from(spec: &VersionSpec) -> Self {
        Self {
            name: spec.display().to_string(),
            version: spec.name.clone(),
            url: spec.url_path.clone(),
            preferred: spec.preferred,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildResult
// ---------------------------------------------------------------------------

/// Outcome of building one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Version name.
    pub version: String,
    /// Display name, for reporting.
    pub display_name: String,
    /// Whether every build step completed.
    pub success: bool,
    /// Where the compiled output was (or would have been) written.
    pub output_path: PathBuf,
    /// Failure reason, if any.
    pub error: Option<String>,
}
