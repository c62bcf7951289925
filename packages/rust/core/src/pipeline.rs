//! Multi-version build: for each configured version, acquire notebooks →
//! extract source → install → link notebooks → compile → clean.
//!
//! Versions are built strictly one after another. A failure in any step
//! fails only that version; the loop moves on and the run reports it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use docfleet_artifacts::{ArtifactBundle, ArtifactSource, MatchQuality, NOTEBOOKS_DIR, count_notebooks};
use docfleet_shared::{BuildConfig, BuildResult, DocfleetError, Result, VersionSpec};

use crate::site;
use crate::toolchain::{CompileRequest, InstallRequest, Toolchain};

/// Outcome of a whole run.
#[derive(Debug)]
pub struct BuildReport {
    /// One entry per configured version, in configuration order.
    pub results: Vec<BuildResult>,
    /// `versions.json`, when at least one version built.
    pub manifest: Option<PathBuf>,
    /// Root `index.html`, when at least one version built.
    pub redirect: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn built(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.built()
    }

    /// `0` when every version built, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 { 0 } else { 1 }
    }
}

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a run-level phase.
    fn phase(&self, name: &str);
    /// Called when a version starts building.
    fn version_started(&self, spec: &VersionSpec, index: usize, total: usize);
    /// Called when a version finishes, successfully or not.
    fn version_finished(&self, result: &BuildResult);
    /// Called when the run completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn version_started(&self, _spec: &VersionSpec, _index: usize, _total: usize) {}
    fn version_finished(&self, _result: &BuildResult) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Builds every configured version of the documentation.
pub struct MultiVersionBuilder<T, A> {
    config: BuildConfig,
    source_repo: PathBuf,
    toolchain: T,
    artifacts: Option<A>,
}

impl<T: Toolchain, A: ArtifactSource> MultiVersionBuilder<T, A> {
    /// `artifacts` is `None` when no artifact host is configured or no
    /// credential is available; notebooks then always come from the source.
    pub fn new(config: BuildConfig, source_repo: PathBuf, toolchain: T, artifacts: Option<A>) -> Self {
        Self {
            config,
            source_repo,
            toolchain,
            artifacts,
        }
    }

    /// Run the whole build.
    ///
    /// 1. Clean previous output and scratch
    /// 2. Build each version in order
    /// 3. Write manifest and redirect (if anything built)
    /// 4. Clean scratch and the notebooks link (logs are kept)
    #[instrument(skip_all, fields(versions = self.config.versions.len()))]
    pub async fn build_all(&self, progress: &dyn ProgressReporter) -> Result<BuildReport> {
        let start = Instant::now();
        let output_root = self.config.output_root();
        let temp_root = self.config.temp_root();

        // --- Phase 1: Clean ---
        progress.phase("Cleaning previous builds");
        clean_directory(&output_root)?;
        clean_directory(&temp_root)?;
        std::fs::create_dir_all(&temp_root).map_err(|e| DocfleetError::io(&temp_root, e))?;

        // --- Phase 2: Versions ---
        let total = self.config.versions.len();
        let mut results = Vec::with_capacity(total);
        for (i, spec) in self.config.versions.iter().enumerate() {
            progress.version_started(spec, i + 1, total);
            let result = self.build_version(spec).await;
            progress.version_finished(&result);
            results.push(result);
        }

        // --- Phase 3: Site outputs ---
        let any_built = results.iter().any(|r| r.success);
        let outputs = if any_built {
            progress.phase("Writing versions manifest");
            self.write_site_outputs(&output_root)
        } else {
            error!("no version built; skipping manifest and redirect");
            Ok((None, None))
        };

        // --- Phase 4: Cleanup ---
        progress.phase("Cleaning up");
        self.cleanup(&temp_root);

        let (manifest, redirect) = outputs?;
        let report = BuildReport {
            results,
            manifest,
            redirect,
            log_dir: self.config.log_dir(),
            elapsed: start.elapsed(),
        };

        info!(
            built = report.built(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build complete"
        );
        progress.done(&report);
        Ok(report)
    }

    fn write_site_outputs(&self, output_root: &Path) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
        let manifest = site::write_manifest(output_root, &self.config.versions)?;
        let redirect = match self.config.default_version() {
            Some(default) => Some(site::write_redirect(
                output_root,
                &default.name,
                &self.config.project.title,
            )?),
            None => None,
        };
        Ok((Some(manifest), redirect))
    }

    fn cleanup(&self, temp_root: &Path) {
        if let Err(e) = clean_directory(temp_root) {
            warn!(error = %e, "could not clean temporary files");
        }
        let link = self.notebooks_link();
        if link.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
            if let Err(e) = remove_path(&link) {
                warn!(error = %e, "could not remove notebooks link");
            }
        }
    }

    fn notebooks_link(&self) -> PathBuf {
        self.config.docs_root().join(&self.config.docs.notebooks_link)
    }

    /// Build one version. Never fails: errors are recorded in the result.
    #[instrument(skip_all, fields(version = %spec.name, reference = %spec.reference))]
    pub async fn build_version(&self, spec: &VersionSpec) -> BuildResult {
        info!(display = %spec.display(), "building version");
        let output_path = self.config.output_root().join(&spec.name);

        let outcome = self.try_build_version(spec, &output_path).await;

        // Generated API pages must not leak into the next version.
        self.clean_generated_dirs();

        match outcome {
            Ok(()) => {
                info!(output = %output_path.display(), "built version {}", spec.display());
                BuildResult {
                    version: spec.name.clone(),
                    display_name: spec.display().to_string(),
                    success: true,
                    output_path,
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e, "failed to build version {}", spec.display());
                BuildResult {
                    version: spec.name.clone(),
                    display_name: spec.display().to_string(),
                    success: false,
                    output_path,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_build_version(&self, spec: &VersionSpec, output_path: &Path) -> Result<()> {
        let temp_root = self.config.temp_root();
        let notebooks_temp = temp_root.join(format!("notebooks_{}", spec.name));
        let source_temp = temp_root.join(format!("source_{}", spec.name));
        let log_dir = self.config.log_dir();

        // Step 1: notebooks
        self.acquire_notebooks(spec, &notebooks_temp).await?;
        let notebooks = notebooks_temp.join(NOTEBOOKS_DIR);
        if !notebooks.is_dir() {
            return Err(DocfleetError::build(
                "no notebooks directory found after acquisition",
            ));
        }
        info!(count = count_notebooks(&notebooks), "notebooks ready");

        // Step 2: source snapshot
        self.toolchain
            .extract(&self.source_repo, &spec.reference, &source_temp, None)
            .await?;
        let manifest = &self.config.source.package_manifest;
        if !source_temp.join(manifest).is_file() {
            return Err(DocfleetError::build(format!(
                "no {manifest} found in {}",
                spec.reference
            )));
        }

        // Step 3: install
        let install_log = log_dir.join(format!("install_{}.log", spec.name));
        let scope = self
            .toolchain
            .install(InstallRequest {
                version: &spec.name,
                package_dir: &source_temp,
                log_file: &install_log,
            })
            .await?;
        info!(python = %scope.python.display(), "package installed");

        // Step 4: link notebooks into the docs tree
        link_dir(&notebooks, &self.notebooks_link())?;

        // Step 5: compile
        let env = vec![
            ("DOCS_VERSION".to_string(), spec.name.clone()),
            ("DOCS_DISPLAY_NAME".to_string(), spec.display().to_string()),
            ("NOTEBOOKS_PATH".to_string(), notebooks.display().to_string()),
            (
                self.config.source.source_path_env.clone(),
                source_temp
                    .join(&self.config.source.src_subpath)
                    .display()
                    .to_string(),
            ),
        ];
        let build_log = log_dir.join(format!("build_{}.log", spec.name));
        self.toolchain
            .compile(CompileRequest {
                scope: &scope,
                source_dir: &self.config.docs_root(),
                output_dir: output_path,
                env: &env,
                log_file: &build_log,
            })
            .await?;

        Ok(())
    }

    /// Leave `dest/notebooks` in place: artifacts first (locate → fetch,
    /// then trigger → locate → fetch), else notebooks without outputs from
    /// the source reference.
    async fn acquire_notebooks(&self, spec: &VersionSpec, dest: &Path) -> Result<()> {
        let reference = spec.reference.as_str();
        let canonical = dest.join(NOTEBOOKS_DIR);

        if let Some(artifacts) = &self.artifacts {
            match artifacts.locate(reference).await {
                Some(bundle) => {
                    log_match_quality(reference, &bundle);
                    if artifacts.fetch(&bundle, dest).await && canonical.is_dir() {
                        info!("using pre-executed notebooks from artifacts");
                        return Ok(());
                    }
                    warn!("failed to download artifacts, trying to trigger execution");
                }
                None => warn!("no matching artifacts, attempting to trigger notebook execution"),
            }

            if artifacts.trigger(reference, true).await {
                if let Some(bundle) = artifacts.locate(reference).await {
                    // A failed first fetch may have left a partial layout behind.
                    clean_directory(dest)?;
                    if artifacts.fetch(&bundle, dest).await && canonical.is_dir() {
                        info!("obtained fresh notebook artifacts");
                        return Ok(());
                    }
                }
            }
        }

        warn!("falling back to notebooks without outputs");
        clean_directory(dest)?;

        let subpath = self.config.source.notebooks_subpath.as_str();
        let count = self
            .toolchain
            .extract(&self.source_repo, reference, dest, Some(subpath))
            .await?;

        let extracted = dest.join(subpath);
        if extracted != canonical && extracted.is_dir() && !canonical.exists() {
            std::fs::rename(&extracted, &canonical)
                .map_err(|e| DocfleetError::io(&extracted, e))?;
        }

        if !canonical.is_dir() {
            return Err(DocfleetError::build("failed to extract notebooks"));
        }
        info!(files = count, "extracted notebooks without outputs");
        Ok(())
    }

    fn clean_generated_dirs(&self) {
        let docs_root = self.config.docs_root();
        for dir in &self.config.docs.clean_dirs {
            let path = docs_root.join(dir);
            if let Err(e) = clean_directory(&path) {
                warn!(path = %path.display(), error = %e, "could not clean generated directory");
            }
        }
    }
}

fn log_match_quality(reference: &str, bundle: &ArtifactBundle) {
    let Some(best) = bundle.best() else {
        return;
    };
    let version = &best.parsed.version;
    let commit = &best.parsed.commit;
    match MatchQuality::classify(reference, version) {
        MatchQuality::Exact => info!(%commit, from = %bundle.provenance, "found exact match artifact"),
        MatchQuality::Partial => {
            info!(artifact_version = %version, %commit, "found partial match artifact")
        }
        MatchQuality::Closest => {
            warn!(artifact_version = %version, %commit, "using closest available artifact")
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

/// Remove everything inside `dir`, keeping `dir` itself. Missing is fine.
pub fn clean_directory(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DocfleetError::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| DocfleetError::io(dir, e))?;
        remove_path(&entry.path())?;
    }
    Ok(())
}

/// Remove a file, symlink, or directory tree without following links.
fn remove_path(path: &Path) -> Result<()> {
    let meta = path
        .symlink_metadata()
        .map_err(|e| DocfleetError::io(path, e))?;
    let outcome = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    outcome.map_err(|e| DocfleetError::io(path, e))
}

/// Point `link` at `target`, replacing whatever was at `link`.
fn link_dir(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        remove_path(link)?;
    }
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DocfleetError::io(parent, e))?;
    }

    #[cfg(unix)]
    let linked = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let linked = std::os::windows::fs::symlink_dir(target, link);

    linked.map_err(|e| DocfleetError::io(link, e))
}
