//! Minimal GitHub REST client for releases, workflow runs, and artifacts.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use docfleet_shared::{DocfleetError, GitHubConfig, Result};

/// User-Agent string for API requests (GitHub rejects requests without one).
const USER_AGENT: &str = concat!("docfleet/", env!("CARGO_PKG_VERSION"));

/// Media type requested from the REST API.
const ACCEPT: &str = "application/vnd.github+json";

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

/// A published release.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Publication time, falling back to creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.published_at
            .or(self.created_at)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// A completed (or in-flight) workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Successful run of a notebook-producing workflow.
    pub fn is_successful_notebook_run(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
            && self
                .name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains("notebook"))
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowRunsPage {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

/// An artifact uploaded by a workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunArtifact {
    pub name: String,
    pub archive_download_url: String,
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Deserialize)]
struct ArtifactsPage {
    #[serde(default)]
    artifacts: Vec<RunArtifact>,
}

/// Outcome of a streamed download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub bytes: u64,
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Repository-scoped GitHub client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: Url,
    owner: String,
    repo: String,
    token: Option<String>,
    download_timeout: Duration,
}

impl GitHubClient {
    /// Build a client for the configured repository.
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocfleetError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base_url()?,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: token.filter(|t| !t.is_empty()),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        })
    }

    /// Whether requests carry a credential.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// `<api_base>/repos/<owner>/<repo>/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DocfleetError::config(format!("api base '{}' cannot be a base", self.api_base))
            })?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, ACCEPT);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        debug!(%url, "GET");
        let response = self
            .authorize(self.http.get(url.clone()))
            .send()
            .await
            .map_err(|e| DocfleetError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DocfleetError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| DocfleetError::Network(format!("{url}: invalid response body: {e}")))
    }

    /// The release tagged exactly `tag`, if any.
    pub async fn release_by_tag(&self, tag: &str) -> Result<Option<Release>> {
        let url = self.endpoint(&["releases", "tags", tag])?;
        self.get_json(url).await
    }

    /// The most recent releases, newest first.
    pub async fn list_releases(&self, per_page: u32) -> Result<Vec<Release>> {
        let mut url = self.endpoint(&["releases"])?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string());
        let releases = self.get_json(url.clone()).await?;
        releases.ok_or_else(|| DocfleetError::Network(format!("{url}: HTTP 404")))
    }

    /// Completed workflow runs on `branch`, newest first.
    pub async fn list_completed_runs(&self, branch: &str, per_page: u32) -> Result<Vec<WorkflowRun>> {
        let mut url = self.endpoint(&["actions", "runs"])?;
        url.query_pairs_mut()
            .append_pair("branch", branch)
            .append_pair("status", "completed")
            .append_pair("per_page", &per_page.to_string());
        let page: Option<WorkflowRunsPage> = self.get_json(url.clone()).await?;
        page.map(|p| p.workflow_runs)
            .ok_or_else(|| DocfleetError::Network(format!("{url}: HTTP 404")))
    }

    /// Artifacts uploaded by a run.
    pub async fn list_run_artifacts(&self, run_id: u64) -> Result<Vec<RunArtifact>> {
        let run = run_id.to_string();
        let url = self.endpoint(&["actions", "runs", run.as_str(), "artifacts"])?;
        let page: Option<ArtifactsPage> = self.get_json(url.clone()).await?;
        page.map(|p| p.artifacts)
            .ok_or_else(|| DocfleetError::Network(format!("{url}: HTTP 404")))
    }

    /// Dispatch `workflow` on `reference` with string `inputs`.
    pub async fn dispatch_workflow(
        &self,
        workflow: &str,
        reference: &str,
        inputs: serde_json::Value,
    ) -> Result<()> {
        let url = self.endpoint(&["actions", "workflows", workflow, "dispatches"])?;
        let body = serde_json::json!({ "ref": reference, "inputs": inputs });

        let response = self
            .authorize(self.http.post(url.clone()))
            .json(&body)
            .send()
            .await
            .map_err(|e| DocfleetError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocfleetError::Network(format!("{url}: HTTP {status}")));
        }
        Ok(())
    }

    /// Stream `url` into `dest`, returning its size and SHA-256.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadReport> {
        let mut response = self
            .authorize(self.http.get(url))
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| DocfleetError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocfleetError::Network(format!("{url}: HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DocfleetError::io(dest, e))?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DocfleetError::Network(format!("{url}: {e}")))?
        {
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| DocfleetError::io(dest, e))?;
        }
        file.flush().await.map_err(|e| DocfleetError::io(dest, e))?;

        Ok(DownloadReport {
            bytes,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }
}
