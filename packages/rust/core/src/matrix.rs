//! Version matrix for CI: the latest branch plus the most recent `v*` tags.

use std::path::Path;

use serde::Serialize;
use tracing::{info, instrument, warn};

use docfleet_shared::Result;

use crate::command::{self, CommandSpec};

/// One matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    #[serde(rename = "ref")]
    pub reference: String,
    pub name: String,
}

/// `latest_branch` as `latest`, followed by up to `count` of `tags` in the
/// given order, each named without its leading `v`.
pub fn build_matrix(latest_branch: &str, tags: &[String], count: usize) -> Vec<MatrixEntry> {
    let mut matrix = vec![MatrixEntry {
        reference: latest_branch.to_string(),
        name: "latest".into(),
    }];
    matrix.extend(tags.iter().take(count).map(|tag| MatrixEntry {
        reference: tag.clone(),
        name: tag.trim_start_matches('v').to_string(),
    }));
    matrix
}

/// `v*` tags of a local repository, highest version first.
pub async fn list_version_tags(repo: &Path) -> Result<Vec<String>> {
    let output = command::run_checked(
        &CommandSpec::new("git")
            .arg("-C")
            .arg(repo)
            .args(["tag", "--list", "v*", "--sort=-v:refname"]),
    )
    .await?;
    Ok(output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Shallow-clone `remote` into a scratch directory and build the matrix from
/// its tags. Clone or listing failures yield only the `latest` row.
#[instrument(skip_all, fields(remote = %remote, count))]
pub async fn collect_matrix(remote: &str, latest_branch: &str, count: usize) -> Vec<MatrixEntry> {
    let scratch = std::env::temp_dir().join(format!("docfleet-matrix-{}", uuid::Uuid::now_v7()));

    let tags = match fetch_tags(remote, &scratch).await {
        Ok(tags) => tags,
        Err(e) => {
            warn!(error = %e, "could not list tags; emitting latest only");
            Vec::new()
        }
    };
    if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
        if scratch.exists() {
            warn!(path = %scratch.display(), error = %e, "could not remove scratch clone");
        }
    }

    info!(tags = tags.len(), "collected version tags");
    build_matrix(latest_branch, &tags, count)
}

async fn fetch_tags(remote: &str, scratch: &Path) -> Result<Vec<String>> {
    command::run_checked(
        &CommandSpec::new("git")
            .args(["clone", "--quiet", "--depth", "1", remote])
            .arg(scratch),
    )
    .await?;
    // A shallow clone only follows tags on the fetched commit.
    command::run_checked(
        &CommandSpec::new("git")
            .arg("-C")
            .arg(scratch)
            .args(["fetch", "--quiet", "--depth", "1", "--tags"]),
    )
    .await?;
    list_version_tags(scratch).await
}
