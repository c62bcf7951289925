//! Execution Trigger: dispatch the notebook workflow and wait for fresh output.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::github::GitHubClient;
use crate::locator::Locator;
use crate::scoring::MatchScorer;

/// Timing of the wait-for-completion loop.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TriggerPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// A bundle created within this window counts as produced by our dispatch.
    pub freshness: Duration,
    pub progress_every: Duration,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(20 * 60),
            freshness: Duration::from_secs(30 * 60),
            progress_every: Duration::from_secs(2 * 60),
        }
    }
}

/// Dispatches a workflow that executes notebooks for one reference.
#[derive(Debug, Clone)]
pub struct Trigger {
    client: GitHubClient,
    workflow: String,
    policy: TriggerPolicy,
}

impl Trigger {
    pub fn new(client: GitHubClient, workflow: impl Into<String>) -> Self {
        Self {
            client,
            workflow: workflow.into(),
            policy: TriggerPolicy::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Request execution for `reference`. With `wait`, poll `locator` until a
    /// fresh bundle appears or the ceiling is reached. Timeouts and dispatch
    /// failures both yield `false`.
    #[instrument(skip_all, fields(reference = %reference, wait))]
    pub async fn trigger<S: MatchScorer>(
        &self,
        locator: &Locator<S>,
        reference: &str,
        wait: bool,
    ) -> bool {
        info!(workflow = %self.workflow, "triggering notebook execution");

        if !self.client.has_token() {
            warn!("a token with workflow permissions is required to trigger execution");
            return false;
        }

        let inputs = serde_json::json!({ "notebooks_only": "true" });
        if let Err(e) = self
            .client
            .dispatch_workflow(&self.workflow, reference, inputs)
            .await
        {
            error!(error = %e, "error triggering notebook action");
            return false;
        }
        info!("notebook action triggered");

        if !wait {
            return true;
        }
        self.wait_for_fresh(locator, reference).await
    }

    async fn wait_for_fresh<S: MatchScorer>(&self, locator: &Locator<S>, reference: &str) -> bool {
        info!("waiting for notebook execution to complete");

        let freshness = chrono::Duration::from_std(self.policy.freshness)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let progress_ms = self.policy.progress_every.as_millis().max(1);
        let mut waited = Duration::ZERO;

        while waited < self.policy.max_wait {
            tokio::time::sleep(self.policy.poll_interval).await;
            waited += self.policy.poll_interval;

            if let Some(bundle) = locator.locate(reference).await {
                let age = Utc::now() - bundle.created_at;
                if age < freshness {
                    info!(
                        age_secs = age.num_seconds(),
                        from = %bundle.provenance,
                        "fresh notebook artifacts available"
                    );
                    return true;
                }
            }

            if waited.as_millis() % progress_ms == 0 {
                info!(elapsed_mins = waited.as_secs() / 60, "still waiting for notebooks");
            }
        }

        warn!(max_wait_secs = self.policy.max_wait.as_secs(), "timeout waiting for notebook execution");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPO: &str = "/repos/uclchem/UCLCHEM";

    fn fast() -> TriggerPolicy {
        TriggerPolicy {
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(50),
            freshness: Duration::from_secs(30 * 60),
            progress_every: Duration::from_millis(20),
        }
    }

    fn parts(server: &MockServer, token: Option<&str>) -> (Trigger, Locator) {
        let client =
            GitHubClient::new(&test_config(&server.uri()), token.map(String::from)).unwrap();
        let trigger = Trigger::new(client.clone(), "notebooks.yml").with_policy(fast());
        (trigger, Locator::new(client, 20, 10))
    }

    async fn mount_dispatch(server: &MockServer, reference: &str) {
        Mock::given(method("POST"))
            .and(path(format!("{REPO}/actions/workflows/notebooks.yml/dispatches")))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({"ref": reference, "inputs": {"notebooks_only": "true"}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_run(server: &MockServer, created_at: String) {
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/releases/tags/develop")))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/releases")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/actions/runs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"workflow_runs": [
                {"id": 5, "name": "Execute Notebooks", "conclusion": "success", "created_at": created_at}
            ]})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{REPO}/actions/runs/5/artifacts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"artifacts": [
                {"name": "executed_notebooks-develop-abc1234-20260115", "archive_download_url": "https://example.com/a"}
            ]})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn dispatch_without_waiting() {
        let server = MockServer::start().await;
        mount_dispatch(&server, "develop").await;

        let (trigger, locator) = parts(&server, Some("tok"));
        assert!(trigger.trigger(&locator, "develop", false).await);
    }

    #[tokio::test]
    async fn waits_for_fresh_bundle() {
        let server = MockServer::start().await;
        mount_dispatch(&server, "develop").await;
        mount_run(&server, Utc::now().to_rfc3339()).await;

        let (trigger, locator) = parts(&server, Some("tok"));
        assert!(trigger.trigger(&locator, "develop", true).await);
    }

    #[tokio::test]
    async fn stale_bundle_times_out() {
        let server = MockServer::start().await;
        mount_dispatch(&server, "develop").await;
        mount_run(&server, "2020-01-01T00:00:00Z".into()).await;

        let (trigger, locator) = parts(&server, Some("tok"));
        assert!(!trigger.trigger(&locator, "develop", true).await);
    }

    #[tokio::test]
    async fn token_is_required() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let (trigger, locator) = parts(&server, None);
        assert!(!trigger.trigger(&locator, "develop", false).await);
    }

    #[tokio::test]
    async fn rejected_dispatch_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let (trigger, locator) = parts(&server, Some("tok"));
        assert!(!trigger.trigger(&locator, "develop", true).await);
    }
}
