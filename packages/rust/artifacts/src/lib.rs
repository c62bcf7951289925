//! Pre-executed notebook bundles: locating, downloading, and requesting them.
//!
//! This crate provides:
//! - [`github`]: minimal REST client for releases, workflow runs, and artifacts
//! - [`naming`] / [`scoring`]: bundle name parsing and pluggable match scoring
//! - [`Locator`], [`Fetcher`], [`Trigger`]: the acquisition steps
//! - [`ArtifactSource`]: the seam the build orchestrator talks to

pub mod fetcher;
pub mod github;
pub mod locator;
pub mod naming;
pub mod provider;
pub mod scoring;
pub mod trigger;

pub use fetcher::{FetchReport, Fetcher, NOTEBOOKS_DIR, count_notebooks, normalize_layout};
pub use github::GitHubClient;
pub use locator::{ArtifactBundle, ArtifactCandidate, ArtifactOrigin, Locator, Provenance};
pub use naming::{ParsedArtifactName, is_bundle_name, mentions_notebooks, parse_artifact_name};
pub use provider::{ArtifactSource, GitHubArtifacts};
pub use scoring::{EXACT_RELEASE_SCORE, HeuristicScorer, MatchQuality, MatchScorer};
pub use trigger::Trigger;
