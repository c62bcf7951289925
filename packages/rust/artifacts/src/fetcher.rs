//! Artifact Fetcher: download a located bundle and normalize its layout.
//!
//! After a successful fetch the destination holds a canonical `notebooks/`
//! directory. Bundles come in three shapes:
//! - already containing `notebooks/`
//! - notebooks at the archive root
//! - notebooks under some other directory (`executed_notebooks/`, ...)

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use docfleet_shared::{DocfleetError, Result};

use crate::github::GitHubClient;
use crate::locator::ArtifactBundle;

/// Canonical notebook directory inside the destination.
pub const NOTEBOOKS_DIR: &str = "notebooks";

/// Temporary archive name inside the destination.
const ARCHIVE_NAME: &str = "notebooks_temp.zip";

/// Directory names tried first when relocating a nested notebook directory.
const PREFERRED_DIRS: &[&str] = &["executed_notebooks", "notebook"];

/// What a successful fetch produced.
#[derive(Debug, Clone)]
pub struct FetchReport {
    /// Entries in the downloaded archive.
    pub entries: usize,
    /// `.ipynb` files in the canonical directory.
    pub notebook_count: usize,
    pub archive_sha256: String,
    pub notebooks_dir: PathBuf,
}

/// Downloads bundles through a [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: GitHubClient,
}

impl Fetcher {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// Download the best candidate of `bundle` into `dest`.
    ///
    /// Failures are logged and reported as `false`. Already extracted files
    /// are left in place, so callers should check for `dest/notebooks`
    /// rather than trusting the result alone.
    #[instrument(skip_all, fields(dest = %dest.display()))]
    pub async fn fetch(&self, bundle: &ArtifactBundle, dest: &Path) -> bool {
        match self.try_fetch(bundle, dest).await {
            Ok(report) => {
                info!(
                    entries = report.entries,
                    notebooks = report.notebook_count,
                    sha256 = %report.archive_sha256,
                    "notebook bundle extracted"
                );
                true
            }
            Err(e) => {
                error!(error = %e, "error downloading artifacts");
                false
            }
        }
    }

    /// Download, extract, and normalize, propagating the first error.
    pub async fn try_fetch(&self, bundle: &ArtifactBundle, dest: &Path) -> Result<FetchReport> {
        let candidate = bundle
            .best()
            .ok_or_else(|| DocfleetError::Archive("bundle has no candidates".into()))?;

        info!(artifact = %candidate.name, from = %bundle.provenance, "downloading pre-executed notebooks");

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| DocfleetError::io(dest, e))?;

        let archive = dest.join(ARCHIVE_NAME);
        let download = self.client.download(&candidate.download_url, &archive).await;
        let download = match download {
            Ok(report) => report,
            Err(e) => {
                let _ = tokio::fs::remove_file(&archive).await;
                return Err(e);
            }
        };
        debug!(bytes = download.bytes, "archive downloaded");

        let dest_owned = dest.to_path_buf();
        let archive_owned = archive.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            let outcome = extract_archive(&archive_owned, &dest_owned);
            if let Err(e) = fs::remove_file(&archive_owned) {
                warn!(path = %archive_owned.display(), error = %e, "could not remove archive");
            }
            let entries = outcome?;
            let notebooks_dir = normalize_layout(&dest_owned)?;
            Ok::<_, DocfleetError>((entries, notebooks_dir))
        })
        .await
        .map_err(|e| DocfleetError::Archive(format!("extraction task failed: {e}")))?;

        let (entries, notebooks_dir) = extracted?;
        let notebook_count = count_notebooks(&notebooks_dir);

        Ok(FetchReport {
            entries,
            notebook_count,
            archive_sha256: download.sha256,
            notebooks_dir,
        })
    }
}

// ---------------------------------------------------------------------------
// Extraction + layout
// ---------------------------------------------------------------------------

/// Extract every entry of `archive` into `dest`. Returns the entry count.
fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    let file = fs::File::open(archive).map_err(|e| DocfleetError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| DocfleetError::Archive(format!("{}: {e}", archive.display())))?;

    let entries = zip.len();
    info!(entries, "artifact contents");

    zip.extract(dest)
        .map_err(|e| DocfleetError::Archive(format!("{}: {e}", archive.display())))?;
    Ok(entries)
}

/// Ensure `dest/notebooks` exists, pulling notebooks into it when the bundle
/// used a different layout.
pub fn normalize_layout(dest: &Path) -> Result<PathBuf> {
    let canonical = dest.join(NOTEBOOKS_DIR);
    if canonical.is_dir() {
        return Ok(canonical);
    }

    fs::create_dir_all(&canonical).map_err(|e| DocfleetError::io(&canonical, e))?;

    for path in notebooks_in(dest) {
        if let Some(name) = path.file_name() {
            let target = canonical.join(name);
            fs::rename(&path, &target).map_err(|e| DocfleetError::io(&path, e))?;
        }
    }

    if count_notebooks(&canonical) > 0 {
        return Ok(canonical);
    }

    if let Some(nested) = nested_notebook_dir(dest) {
        debug!(from = %nested.display(), "relocating nested notebook directory");
        fs::remove_dir(&canonical).map_err(|e| DocfleetError::io(&canonical, e))?;
        fs::rename(&nested, &canonical).map_err(|e| DocfleetError::io(&nested, e))?;
    }

    Ok(canonical)
}

/// Immediate subdirectory holding notebooks, preferring conventional names.
fn nested_notebook_dir(dest: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dest)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| path.file_name().is_some_and(|n| n != NOTEBOOKS_DIR))
        .filter(|path| !notebooks_in(path).is_empty())
        .collect();
    dirs.sort();

    for preferred in PREFERRED_DIRS {
        if let Some(found) = dirs.iter().find(|d| d.file_name().is_some_and(|n| n == *preferred)) {
            return Some(found.clone());
        }
    }
    dirs.into_iter().next()
}

/// Top-level `.ipynb` files of `dir`.
fn notebooks_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "ipynb"))
        .collect()
}

/// Number of top-level `.ipynb` files in `dir`.
pub fn count_notebooks(dir: &Path) -> usize {
    notebooks_in(dir).len()
}
