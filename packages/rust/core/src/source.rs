//! Source Extractor: materialize a git reference (or one subpath of it).

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use docfleet_shared::{DocfleetError, Result};

use crate::command::{self, CommandSpec};

/// Scratch archive written next to the extracted files.
const ARCHIVE_NAME: &str = ".docfleet-source.tar";

/// Extract `reference` from `repo` into `dest`, optionally only `subpath`.
///
/// Files keep their repository-relative paths, so a `subpath` of
/// `notebooks` lands in `dest/notebooks`. When `subpath` does not exist at
/// that reference an empty `dest/<subpath>` is created. Returns the number
/// of files extracted.
#[instrument(skip_all, fields(reference = %reference, subpath = subpath.unwrap_or("")))]
pub async fn git_extract(
    repo: &Path,
    reference: &str,
    dest: &Path,
    subpath: Option<&str>,
) -> Result<usize> {
    if !repo.is_dir() {
        return Err(DocfleetError::build(format!(
            "repository not found: {}",
            repo.display()
        )));
    }

    let verify = command::run(
        &CommandSpec::new("git")
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{reference}^{{commit}}"))
            .cwd(repo),
    )
    .await?;
    if !verify.success() {
        return Err(DocfleetError::build(format!(
            "git ref '{reference}' not found in {}",
            repo.display()
        )));
    }

    let dest = absolute(dest)?;
    tokio::fs::create_dir_all(&dest)
        .await
        .map_err(|e| DocfleetError::io(&dest, e))?;

    if let Some(sub) = subpath {
        let exists = command::run(
            &CommandSpec::new("git")
                .args(["cat-file", "-e"])
                .arg(format!("{reference}:{sub}"))
                .cwd(repo),
        )
        .await?;
        if !exists.success() {
            warn!("subpath not present at this reference; creating it empty");
            let empty = dest.join(sub);
            tokio::fs::create_dir_all(&empty)
                .await
                .map_err(|e| DocfleetError::io(&empty, e))?;
            return Ok(0);
        }
    }

    let archive = dest.join(ARCHIVE_NAME);
    let outcome = archive_and_unpack(repo, reference, subpath, &archive, &dest).await;
    if let Err(e) = tokio::fs::remove_file(&archive).await {
        debug!(error = %e, "archive already gone");
    }
    outcome?;

    let count = count_files(&dest);
    info!(files = count, dest = %dest.display(), "extracted");
    Ok(count)
}

async fn archive_and_unpack(
    repo: &Path,
    reference: &str,
    subpath: Option<&str>,
    archive: &Path,
    dest: &Path,
) -> Result<()> {
    let mut git = CommandSpec::new("git")
        .args(["archive", "--format=tar", "-o"])
        .arg(archive)
        .arg(reference)
        .cwd(repo);
    if let Some(sub) = subpath {
        git = git.arg(sub);
    }
    command::run_checked(&git).await?;

    command::run_checked(&CommandSpec::new("tar").arg("-xf").arg(archive).arg("-C").arg(dest))
        .await?;
    Ok(())
}

/// Regular files under `dir`, recursively.
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count()
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| DocfleetError::io(path, e))
}
