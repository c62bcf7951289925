//! The artifact seam used by the build orchestrator.

use std::future::Future;
use std::path::Path;

use docfleet_shared::{GitHubConfig, Result};

use crate::fetcher::Fetcher;
use crate::github::GitHubClient;
use crate::locator::{ArtifactBundle, Locator};
use crate::scoring::{HeuristicScorer, MatchScorer};
use crate::trigger::Trigger;

/// A place pre-executed notebook bundles come from.
///
/// Every operation is best-effort: failures surface as `None` / `false`.
pub trait ArtifactSource: Send + Sync {
    /// Best bundle for `reference`.
    fn locate(&self, reference: &str) -> impl Future<Output = Option<ArtifactBundle>> + Send;

    /// Download `bundle` into `dest`, leaving `dest/notebooks` on success.
    fn fetch(&self, bundle: &ArtifactBundle, dest: &Path) -> impl Future<Output = bool> + Send;

    /// Ask for a bundle to be produced, optionally waiting for it.
    fn trigger(&self, reference: &str, wait: bool) -> impl Future<Output = bool> + Send;
}

/// GitHub releases and Actions artifacts of one repository.
#[derive(Debug, Clone)]
pub struct GitHubArtifacts<S = HeuristicScorer> {
    locator: Locator<S>,
    fetcher: Fetcher,
    trigger: Trigger,
}

impl GitHubArtifacts<HeuristicScorer> {
    pub fn from_config(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        Self::with_scorer(config, token, HeuristicScorer)
    }
}

impl<S: MatchScorer> GitHubArtifacts<S> {
    pub fn with_scorer(config: &GitHubConfig, token: Option<String>, scorer: S) -> Result<Self> {
        let client = GitHubClient::new(config, token)?;
        Ok(Self {
            locator: Locator::with_scorer(
                client.clone(),
                scorer,
                config.release_scan_limit,
                config.run_scan_limit,
            ),
            fetcher: Fetcher::new(client.clone()),
            trigger: Trigger::new(client, config.workflow.clone()),
        })
    }
}

impl<S: MatchScorer> ArtifactSource for GitHubArtifacts<S> {
    async fn locate(&self, reference: &str) -> Option<ArtifactBundle> {
        self.locator.locate(reference).await
    }

    async fn fetch(&self, bundle: &ArtifactBundle, dest: &Path) -> bool {
        self.fetcher.fetch(bundle, dest).await
    }

    async fn trigger(&self, reference: &str, wait: bool) -> bool {
        self.trigger.trigger(&self.locator, reference, wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPO: &str = "/repos/uclchem/UCLCHEM";

    /// Two CI candidates scored 150 and 50: the 150 one is downloaded.
    #[tokio::test]
    async fn fetches_highest_scoring_ci_candidate() {
        struct Fixed;
        impl MatchScorer for Fixed {
            fn release_asset(&self, _: &str, _: &crate::ParsedArtifactName) -> i64 {
                0
            }
            fn run_artifact(&self, _: &str, name: &str, _: &crate::ParsedArtifactName) -> i64 {
                if name.contains("high") { 150 } else { 50 }
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/releases/tags/v1.0.0")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/releases")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/actions/runs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"workflow_runs": [
                {"id": 11, "name": "notebooks", "conclusion": "success", "created_at": "2026-01-15T10:00:00Z"}
            ]})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/actions/runs/11/artifacts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"artifacts": [
                {"name": "notebooks-low", "archive_download_url": format!("{}/low.zip", server.uri())},
                {"name": "notebooks-high", "archive_download_url": format!("{}/high.zip", server.uri())}
            ]})))
            .mount(&server)
            .await;

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("notebooks/1_intro.ipynb", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"{}").unwrap();
        let body = writer.finish().unwrap().into_inner();

        Mock::given(method("GET"))
            .and(path("/high.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/low.zip"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let source =
            GitHubArtifacts::with_scorer(&test_config(&server.uri()), None, Fixed).unwrap();
        let bundle = source.locate("v1.0.0").await.expect("bundle");
        assert_eq!(bundle.best().unwrap().score, 150);

        let dest = std::env::temp_dir().join(format!("docfleet-provider-{}", uuid::Uuid::now_v7()));
        assert!(source.fetch(&bundle, &dest).await);
        assert!(dest.join("notebooks/1_intro.ipynb").is_file());

        let _ = std::fs::remove_dir_all(&dest);
    }
}
