//! Notebook bundle naming convention.
//!
//! Bundles are published as `executed_notebooks-<version>-<commit>-<YYYYMMDD>`
//! (optionally with a `.zip` or `.tar.gz` suffix). Versions may contain dashes,
//! so the name is parsed from the right.

use serde::Serialize;

/// Leading component of every conventional bundle name.
pub const BUNDLE_PREFIX: &str = "executed_notebooks";

/// Sentinel used for fields that could not be parsed.
pub const UNKNOWN: &str = "unknown";

/// Components recovered from a bundle name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedArtifactName {
    pub version: String,
    pub commit: String,
    pub date: String,
}

impl ParsedArtifactName {
    /// The all-unknown sentinel.
    pub fn unknown() -> Self {
        Self {
            version: UNKNOWN.into(),
            commit: UNKNOWN.into(),
            date: UNKNOWN.into(),
        }
    }
}

/// Parse a bundle name. Never fails: non-conforming names yield
/// [`ParsedArtifactName::unknown`].
pub fn parse_artifact_name(name: &str) -> ParsedArtifactName {
    let base = name.replace(".zip", "").replace(".tar.gz", "");
    let parts: Vec<&str> = base.split('-').collect();

    if parts.len() < 4 || parts[0] != BUNDLE_PREFIX {
        return ParsedArtifactName::unknown();
    }

    let date = parts[parts.len() - 1];
    let commit = parts[parts.len() - 2];
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) || commit.is_empty() {
        return ParsedArtifactName::unknown();
    }

    let version = parts[1..parts.len() - 2].join("-");
    if version.is_empty() {
        return ParsedArtifactName::unknown();
    }

    ParsedArtifactName {
        version,
        commit: commit.to_string(),
        date: date.to_string(),
    }
}

/// Strict bundle marker used when scanning releases.
pub fn is_bundle_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("executed_notebooks") || lower.contains("executed-notebooks")
}

/// Loose marker: anything mentioning notebooks.
pub fn mentions_notebooks(name: &str) -> bool {
    is_bundle_name(name) || name.to_lowercase().contains("notebook")
}
