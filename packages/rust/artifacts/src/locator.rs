//! Artifact Locator: find the best pre-executed notebook bundle for a reference.
//!
//! Sources are tried in order:
//! 1. a release tagged exactly with the reference (every notebook asset scores 100)
//! 2. a scan of recent releases; the first release holding a nonzero-scoring
//!    bundle wins, even if a later release would score higher
//! 3. completed CI runs on the reference; artifacts of the first qualifying
//!    run are sorted by score, best first
//!
//! Network failures never propagate: they are logged and the source counts as
//! empty.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use docfleet_shared::Result;

use crate::github::{GitHubClient, Release};
use crate::naming::{ParsedArtifactName, is_bundle_name, mentions_notebooks, parse_artifact_name};
use crate::scoring::{EXACT_RELEASE_SCORE, HeuristicScorer, MatchScorer};

// ---------------------------------------------------------------------------
// Located bundles
// ---------------------------------------------------------------------------

/// Where a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    Release,
    CiRun,
}

/// One downloadable notebook bundle.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactCandidate {
    pub name: String,
    pub download_url: String,
    pub parsed: ParsedArtifactName,
    pub score: i64,
    pub origin: ArtifactOrigin,
}

/// Release tag or CI run a bundle came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Release { tag: String },
    CiRun { run_id: u64 },
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release { tag } => write!(f, "release {tag}"),
            Self::CiRun { run_id } => write!(f, "CI run {run_id}"),
        }
    }
}

/// Candidates from a single source, best first.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactBundle {
    pub candidates: Vec<ArtifactCandidate>,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl ArtifactBundle {
    /// The candidate the fetcher downloads.
    pub fn best(&self) -> Option<&ArtifactCandidate> {
        self.candidates.first()
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// Queries releases and CI runs for notebook bundles.
#[derive(Debug, Clone)]
pub struct Locator<S = HeuristicScorer> {
    client: GitHubClient,
    scorer: S,
    release_scan_limit: u32,
    run_scan_limit: u32,
}

impl Locator<HeuristicScorer> {
    /// Locator with the default string-overlap scorer.
    pub fn new(client: GitHubClient, release_scan_limit: u32, run_scan_limit: u32) -> Self {
        Self::with_scorer(client, HeuristicScorer, release_scan_limit, run_scan_limit)
    }
}

impl<S: MatchScorer> Locator<S> {
    /// Locator with a custom scorer.
    pub fn with_scorer(
        client: GitHubClient,
        scorer: S,
        release_scan_limit: u32,
        run_scan_limit: u32,
    ) -> Self {
        Self {
            client,
            scorer,
            release_scan_limit,
            run_scan_limit,
        }
    }

    /// Best-matching bundle for `reference`, or `None`.
    #[instrument(skip_all, fields(reference = %reference))]
    pub async fn locate(&self, reference: &str) -> Option<ArtifactBundle> {
        info!("checking for notebook artifacts");

        match self.locate_in_releases(reference).await {
            Ok(Some(bundle)) => return Some(bundle),
            Ok(None) => debug!("no release artifacts"),
            Err(e) => warn!(error = %e, "error checking release artifacts"),
        }

        match self.locate_in_runs(reference).await {
            Ok(Some(bundle)) => Some(bundle),
            Ok(None) => {
                warn!("no notebook artifacts found");
                None
            }
            Err(e) => {
                warn!(error = %e, "error checking CI artifacts");
                None
            }
        }
    }

    async fn locate_in_releases(&self, reference: &str) -> Result<Option<ArtifactBundle>> {
        match self.client.release_by_tag(reference).await {
            Ok(Some(release)) => {
                if let Some(bundle) = exact_release_bundle(&release) {
                    info!(
                        count = bundle.candidates.len(),
                        tag = %release.tag_name,
                        "found release artifacts"
                    );
                    return Ok(Some(bundle));
                }
                debug!(tag = %release.tag_name, "release has no notebook assets");
            }
            Ok(None) => debug!("no release tagged with reference"),
            // Scanning the release list still applies.
            Err(e) => warn!(error = %e, "error checking release by tag"),
        }

        let releases = self.client.list_releases(self.release_scan_limit).await?;
        Ok(self.scan_releases(reference, &releases))
    }

    /// First release holding a nonzero-scoring bundle.
    fn scan_releases(&self, reference: &str, releases: &[Release]) -> Option<ArtifactBundle> {
        for release in releases {
            for asset in release.assets.iter().filter(|a| is_bundle_name(&a.name)) {
                let parsed = parse_artifact_name(&asset.name);
                let score = self.scorer.release_asset(reference, &parsed);
                if score <= 0 {
                    continue;
                }

                info!(asset = %asset.name, score, tag = %release.tag_name, "found matching release asset");
                return Some(ArtifactBundle {
                    candidates: vec![ArtifactCandidate {
                        name: asset.name.clone(),
                        download_url: asset.browser_download_url.clone(),
                        parsed,
                        score,
                        origin: ArtifactOrigin::Release,
                    }],
                    provenance: Provenance::Release {
                        tag: release.tag_name.clone(),
                    },
                    created_at: release.timestamp(),
                });
            }
        }
        None
    }

    async fn locate_in_runs(&self, reference: &str) -> Result<Option<ArtifactBundle>> {
        let runs = self
            .client
            .list_completed_runs(reference, self.run_scan_limit)
            .await?;

        for run in runs.iter().filter(|r| r.is_successful_notebook_run()) {
            let artifacts = self.client.list_run_artifacts(run.id).await?;

            let mut candidates: Vec<ArtifactCandidate> = artifacts
                .into_iter()
                .filter(|a| !a.expired && mentions_notebooks(&a.name))
                .map(|a| {
                    let parsed = parse_artifact_name(&a.name);
                    let score = self.scorer.run_artifact(reference, &a.name, &parsed);
                    ArtifactCandidate {
                        name: a.name,
                        download_url: a.archive_download_url,
                        parsed,
                        score,
                        origin: ArtifactOrigin::CiRun,
                    }
                })
                .collect();

            if candidates.is_empty() {
                debug!(run_id = run.id, "run has no notebook artifacts");
                continue;
            }

            candidates.sort_by(|a, b| b.score.cmp(&a.score));
            let best = &candidates[0];
            info!(
                artifact = %best.name,
                version = %best.parsed.version,
                commit = %best.parsed.commit,
                score = best.score,
                run_id = run.id,
                "selected CI artifact"
            );

            return Ok(Some(ArtifactBundle {
                candidates,
                provenance: Provenance::CiRun { run_id: run.id },
                created_at: run.created_at,
            }));
        }

        Ok(None)
    }
}

/// Every notebook asset of an exactly tagged release, at the fixed exact score.
fn exact_release_bundle(release: &Release) -> Option<ArtifactBundle> {
    let candidates: Vec<ArtifactCandidate> = release
        .assets
        .iter()
        .filter(|a| mentions_notebooks(&a.name))
        .map(|a| ArtifactCandidate {
            name: a.name.clone(),
            download_url: a.browser_download_url.clone(),
            parsed: parse_artifact_name(&a.name),
            score: EXACT_RELEASE_SCORE,
            origin: ArtifactOrigin::Release,
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    Some(ArtifactBundle {
        candidates,
        provenance: Provenance::Release {
            tag: release.tag_name.clone(),
        },
        created_at: release.timestamp(),
    })
}
