//! Match scoring between a requested reference and bundle versions.
//!
//! The heuristic is plain string overlap. It sits behind [`MatchScorer`] so
//! callers (and tests) can substitute their own ranking.

use crate::naming::ParsedArtifactName;

/// Score given to every qualifying asset of a release tagged exactly with the reference.
pub const EXACT_RELEASE_SCORE: i64 = 100;

/// Ranks bundle candidates against a requested reference. Zero means "no match".
pub trait MatchScorer: Send + Sync {
    /// Score an asset found while scanning all releases.
    fn release_asset(&self, reference: &str, parsed: &ParsedArtifactName) -> i64;

    /// Score an artifact of a CI run. Higher sorts first.
    fn run_artifact(&self, reference: &str, name: &str, parsed: &ParsedArtifactName) -> i64;
}

/// How closely a bundle version matches the requested reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    Exact,
    Partial,
    Closest,
}

impl MatchQuality {
    /// Classify `version` against `reference`.
    pub fn classify(reference: &str, version: &str) -> Self {
        if version == reference {
            Self::Exact
        } else if overlaps(reference, version) {
            Self::Partial
        } else {
            Self::Closest
        }
    }
}

/// Substring match in either direction.
fn overlaps(reference: &str, version: &str) -> bool {
    reference.contains(version) || version.contains(reference)
}

/// Default string-overlap heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl MatchScorer for HeuristicScorer {
    fn release_asset(&self, reference: &str, parsed: &ParsedArtifactName) -> i64 {
        let version = parsed.version.as_str();
        if version == reference {
            100
        } else if overlaps(reference, version) {
            75
        } else if version.contains("main") && reference.starts_with('v') {
            // default-branch bundle standing in for a version tag
            50
        } else {
            0
        }
    }

    fn run_artifact(&self, reference: &str, name: &str, parsed: &ParsedArtifactName) -> i64 {
        let mut score = match MatchQuality::classify(reference, &parsed.version) {
            MatchQuality::Exact => 100,
            MatchQuality::Partial => 50,
            MatchQuality::Closest => 0,
        };

        // Tie-break: reverse alphabetical on the first character.
        let first = name
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('z');
        score += 'z' as i64 - first as i64;

        score
    }
}
