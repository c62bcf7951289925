//! Build configuration for docfleet.
//!
//! The configuration lives next to the documentation sources, usually as
//! `versions.yaml` (`.toml` is accepted too). CLI flags override file values,
//! which override defaults. Relative paths resolve against the file's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DocfleetError, Result};
use crate::types::VersionSpec;

// ---------------------------------------------------------------------------
// Config structs (matching versions.yaml schema)
// ---------------------------------------------------------------------------

/// Top-level build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Site-wide settings.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Source repository and package settings.
    pub source: SourceConfig,

    /// Artifact host settings. Absent means notebooks always come from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubConfig>,

    /// Documentation tree and compiler settings.
    #[serde(default)]
    pub docs: DocsConfig,

    /// Versions to build, in order.
    #[serde(default)]
    pub versions: Vec<VersionSpec>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Title used on the root redirect page.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

fn default_title() -> String {
    "Documentation".into()
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Local clone of the documented project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<PathBuf>,

    /// File that must exist at the snapshot root for it to be installable.
    #[serde(default = "default_package_manifest")]
    pub package_manifest: String,

    /// Module imported to verify an installation.
    pub import_name: String,

    /// Optional compiled modules reported after install (never fatal).
    #[serde(default)]
    pub probe_imports: Vec<String>,

    /// Subdirectory holding the notebooks in the source tree.
    #[serde(default = "default_notebooks_subpath")]
    pub notebooks_subpath: String,

    /// Subdirectory of the snapshot passed to the compiler as the source path.
    #[serde(default = "default_src_subpath")]
    pub src_subpath: String,

    /// Environment variable carrying the source path into the compiler.
    #[serde(default = "default_source_path_env")]
    pub source_path_env: String,
}

fn default_package_manifest() -> String {
    "pyproject.toml".into()
}
fn default_notebooks_subpath() -> String {
    "notebooks".into()
}
fn default_src_subpath() -> String {
    "src".into()
}
fn default_source_path_env() -> String {
    "DOCS_SOURCE_PATH".into()
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Workflow file dispatched to execute notebooks on demand.
    #[serde(default = "default_workflow")]
    pub workflow: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Timeout for API requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for bundle downloads.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Page size when scanning all releases.
    #[serde(default = "default_release_scan_limit")]
    pub release_scan_limit: u32,

    /// Page size when scanning CI runs.
    #[serde(default = "default_run_scan_limit")]
    pub run_scan_limit: u32,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_workflow() -> String {
    "notebooks.yml".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_download_timeout_secs() -> u64 {
    300
}
fn default_release_scan_limit() -> u32 {
    20
}
fn default_run_scan_limit() -> u32 {
    10
}

impl GitHubConfig {
    /// Parsed API base URL.
    pub fn api_base_url(&self) -> Result<Url> {
        Url::parse(&self.api_base).map_err(|e| {
            DocfleetError::config(format!("invalid github.api_base '{}': {e}", self.api_base))
        })
    }

    /// Read the API token from the configured env var, if set and non-empty.
    pub fn token_from_env(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|v| !v.is_empty())
    }
}

/// How each version's package is installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Install into the active interpreter; later versions replace earlier ones.
    #[default]
    Shared,
    /// Install into a fresh virtual environment per version.
    Venv,
}

/// `[docs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Documentation source root (defaults to the config file's directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Output root, relative to the docs root.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch root for snapshots and notebooks, relative to the docs root.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Link inside the docs root pointing at the active version's notebooks.
    #[serde(default = "default_notebooks_link")]
    pub notebooks_link: PathBuf,

    /// Generated directories emptied after each version, relative to the docs root.
    #[serde(default = "default_clean_dirs")]
    pub clean_dirs: Vec<PathBuf>,

    /// Documentation compiler executable.
    #[serde(default = "default_compiler")]
    pub compiler: String,

    /// Compiler builder name.
    #[serde(default = "default_builder")]
    pub builder: String,

    /// File that must exist in the docs root for the compiler to run.
    #[serde(default = "default_entry_file")]
    pub entry_file: String,

    /// Package installation isolation.
    #[serde(default)]
    pub isolation: Isolation,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            root: None,
            output_dir: default_output_dir(),
            temp_dir: default_temp_dir(),
            notebooks_link: default_notebooks_link(),
            clean_dirs: default_clean_dirs(),
            compiler: default_compiler(),
            builder: default_builder(),
            entry_file: default_entry_file(),
            isolation: Isolation::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("_build/html")
}
fn default_temp_dir() -> PathBuf {
    PathBuf::from("_build/multiversion_temp")
}
fn default_notebooks_link() -> PathBuf {
    PathBuf::from("notebooks")
}
fn default_clean_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("api/fortran"), PathBuf::from("api/site-packages")]
}
fn default_compiler() -> String {
    "sphinx-build".into()
}
fn default_builder() -> String {
    "html".into()
}
fn default_entry_file() -> String {
    "conf.py".into()
}

// ---------------------------------------------------------------------------
// Derived accessors
// ---------------------------------------------------------------------------

impl BuildConfig {
    /// Resolve a possibly relative path against the config file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Documentation source root.
    pub fn docs_root(&self) -> PathBuf {
        match &self.docs.root {
            Some(root) => self.resolve(root),
            None => self.base_dir.clone(),
        }
    }

    /// Root of the compiled site.
    pub fn output_root(&self) -> PathBuf {
        self.docs_root().join(&self.docs.output_dir)
    }

    /// Scratch root for per-version snapshots.
    pub fn temp_root(&self) -> PathBuf {
        self.docs_root().join(&self.docs.temp_dir)
    }

    /// Per-version install and build logs, a sibling of the output root.
    pub fn log_dir(&self) -> PathBuf {
        let output = self.output_root();
        output
            .parent()
            .map(|p| p.join("logs"))
            .unwrap_or_else(|| output.join("logs"))
    }

    /// The source repository, with `override_path` taking precedence.
    pub fn source_repo(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        match (override_path, &self.source.repo_path) {
            (Some(p), _) => Ok(p.to_path_buf()),
            (None, Some(p)) => Ok(self.resolve(p)),
            (None, None) => Err(DocfleetError::config(
                "no source repository: set source.repo_path or pass --source-repo",
            )),
        }
    }

    /// Name of the version the site root redirects to: the first preferred
    /// version, else the first configured one.
    pub fn default_version(&self) -> Option<&VersionSpec> {
        self.versions
            .iter()
            .find(|v| v.preferred)
            .or_else(|| self.versions.first())
    }

    /// Check the invariants every run relies on.
    pub fn validate(&self) -> Result<()> {
        if self.versions.is_empty() {
            return Err(DocfleetError::config("at least one version must be defined"));
        }

        let mut seen = HashSet::new();
        for (i, v) in self.versions.iter().enumerate() {
            if v.reference.trim().is_empty() {
                return Err(DocfleetError::config(format!("versions[{i}]: git_ref is empty")));
            }
            if v.name.trim().is_empty() {
                return Err(DocfleetError::config(format!(
                    "versions[{i}]: version_name is empty"
                )));
            }
            if !is_plain_dir_name(&v.name) {
                return Err(DocfleetError::config(format!(
                    "versions[{i}]: version_name '{}' must be a plain directory name",
                    v.name
                )));
            }
            if v.url_path.trim().is_empty() {
                return Err(DocfleetError::config(format!("versions[{i}]: url_path is empty")));
            }
            if !seen.insert(v.name.as_str()) {
                return Err(DocfleetError::config(format!(
                    "duplicate version_name '{}'",
                    v.name
                )));
            }
        }

        let preferred = self.versions.iter().filter(|v| v.preferred).count();
        if preferred > 1 {
            tracing::warn!(
                count = preferred,
                "multiple versions marked preferred, the first one wins"
            );
        }

        if self.source.import_name.trim().is_empty() {
            return Err(DocfleetError::config("source.import_name is empty"));
        }

        if let Some(github) = &self.github {
            github.api_base_url()?;
            if github.owner.is_empty() || github.repo.is_empty() {
                return Err(DocfleetError::config("github.owner and github.repo are required"));
            }
        }

        Ok(())
    }

    /// A starter configuration written by `docfleet config init`.
    pub fn example() -> Self {
        Self {
            project: ProjectConfig {
                title: "Project Documentation".into(),
            },
            source: SourceConfig {
                repo_path: Some(PathBuf::from("../project")),
                package_manifest: default_package_manifest(),
                import_name: "project".into(),
                probe_imports: Vec::new(),
                notebooks_subpath: default_notebooks_subpath(),
                src_subpath: default_src_subpath(),
                source_path_env: default_source_path_env(),
            },
            github: Some(GitHubConfig {
                owner: "example".into(),
                repo: "project".into(),
                api_base: default_api_base(),
                workflow: default_workflow(),
                token_env: default_token_env(),
                timeout_secs: default_timeout_secs(),
                download_timeout_secs: default_download_timeout_secs(),
                release_scan_limit: default_release_scan_limit(),
                run_scan_limit: default_run_scan_limit(),
            }),
            docs: DocsConfig::default(),
            versions: vec![
                VersionSpec {
                    reference: "main".into(),
                    name: "latest".into(),
                    display_name: Some("Latest".into()),
                    url_path: "/latest/".into(),
                    preferred: true,
                },
                VersionSpec {
                    reference: "v1.0.0".into(),
                    name: "1.0.0".into(),
                    display_name: None,
                    url_path: "/1.0.0/".into(),
                    preferred: false,
                },
            ],
            base_dir: PathBuf::new(),
        }
    }
}

/// Version names become directory names under the output and temp roots.
fn is_plain_dir_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && matches!(
            Path::new(name).components().collect::<Vec<_>>().as_slice(),
            [std::path::Component::Normal(_)]
        )
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// On-disk formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Toml,
}

fn format_of(path: &Path) -> Result<ConfigFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
        Some("toml") => Ok(ConfigFormat::Toml),
        _ => Err(DocfleetError::config(format!(
            "unsupported config format for {} (expected .yaml, .yml or .toml)",
            path.display()
        ))),
    }
}

/// Parse a config document without touching the filesystem.
fn parse_config(content: &str, format: ConfigFormat, origin: &Path) -> Result<BuildConfig> {
    let parsed: std::result::Result<BuildConfig, String> = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| DocfleetError::config(format!("failed to parse {}: {e}", origin.display())))
}

/// Load and validate the build config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<BuildConfig> {
    if !path.exists() {
        return Err(DocfleetError::config(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }

    let format = format_of(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| DocfleetError::io(path, e))?;
    let mut config = parse_config(&content, format, path)?;

    let absolute = std::fs::canonicalize(path).map_err(|e| DocfleetError::io(path, e))?;
    config.base_dir = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    config.validate()?;
    tracing::debug!(path = %absolute.display(), versions = config.versions.len(), "config loaded");

    Ok(config)
}

/// Render a config in the format implied by `path`'s extension.
pub fn render_config(config: &BuildConfig, path: &Path) -> Result<String> {
    match format_of(path)? {
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| DocfleetError::config(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| DocfleetError::config(e.to_string()))
        }
    }
}

/// Write a starter config to `path`. Refuses to overwrite an existing file.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(DocfleetError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let content = render_config(&BuildConfig::example(), path)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DocfleetError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| DocfleetError::io(path, e))?;
    tracing::info!(path = %path.display(), "created starter config file");

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
project:
  title: UCLCHEM Documentation
source:
  repo_path: ../uclchem
  import_name: uclchem
  probe_imports: [uclchemwrap]
github:
  owner: uclchem
  repo: UCLCHEM
versions:
  - git_ref: main
    version_name: latest
    display_name: Latest
    url_path: /latest/
  - git_ref: v3.4.0
    version_name: "3.4.0"
    url_path: /3.4.0/
    preferred: true
"#;

    fn parse(yaml: &str) -> Result<BuildConfig> {
        parse_config(yaml, ConfigFormat::Yaml, Path::new("versions.yaml"))
    }

    #[test]
    fn parses_yaml_with_defaults() {
        let config = parse(SAMPLE).expect("parse");
        assert_eq!(config.versions.len(), 2);
        assert_eq!(config.source.package_manifest, "pyproject.toml");
        assert_eq!(config.docs.compiler, "sphinx-build");
        assert_eq!(config.docs.isolation, Isolation::Shared);

        let github = config.github.as_ref().expect("github section");
        assert_eq!(github.api_base, "https://api.github.com");
        assert_eq!(github.release_scan_limit, 20);
        assert_eq!(github.run_scan_limit, 10);
        config.validate().expect("valid");
    }

    #[test]
    fn default_version_is_preferred_then_first() {
        let config = parse(SAMPLE).expect("parse");
        assert_eq!(config.default_version().map(|v| v.name.as_str()), Some("3.4.0"));

        let mut config = config;
        for v in &mut config.versions {
            v.preferred = false;
        }
        assert_eq!(config.default_version().map(|v| v.name.as_str()), Some("latest"));
    }

    #[test]
    fn first_preferred_wins() {
        let mut config = parse(SAMPLE).expect("parse");
        for v in &mut config.versions {
            v.preferred = true;
        }
        config.validate().expect("multiple preferred only warns");
        assert_eq!(config.default_version().map(|v| v.name.as_str()), Some("latest"));
    }

    #[test]
    fn rejects_empty_versions() {
        let mut config = parse(SAMPLE).expect("parse");
        config.versions.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DocfleetError::Config { .. }));
        assert!(err.to_string().contains("at least one version"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut config = parse(SAMPLE).expect("parse");
        config.versions[1].name = "latest".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate version_name 'latest'"));
    }

    #[test]
    fn rejects_version_names_that_escape_output_root() {
        for name in ["..", ".", "a/b", "..\\up", "/abs"] {
            let mut config = parse(SAMPLE).expect("parse");
            config.versions[0].name = name.into();
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("must be a plain directory name"),
                "{name}: {err}"
            );
        }

        let mut config = parse(SAMPLE).expect("parse");
        config.versions[0].name = "4.1.3-rc1".into();
        config.validate().expect("dotted names are fine");
    }

    #[test]
    fn rejects_bad_api_base() {
        let mut config = parse(SAMPLE).expect("parse");
        if let Some(github) = config.github.as_mut() {
            github.api_base = "not a url".into();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_and_yaml_agree() {
        let yaml = parse(SAMPLE).expect("parse yaml");
        let rendered = toml::to_string_pretty(&yaml).expect("render toml");
        let from_toml =
            parse_config(&rendered, ConfigFormat::Toml, Path::new("v.toml")).expect("parse toml");
        assert_eq!(from_toml.versions, yaml.versions);
        assert_eq!(from_toml.source.import_name, "uclchem");
    }

    #[test]
    fn paths_resolve_against_base_dir() {
        let mut config = parse(SAMPLE).expect("parse");
        config.base_dir = PathBuf::from("/srv/docs");

        assert_eq!(config.docs_root(), PathBuf::from("/srv/docs"));
        assert_eq!(config.output_root(), PathBuf::from("/srv/docs/_build/html"));
        assert_eq!(config.log_dir(), PathBuf::from("/srv/docs/_build/logs"));
        assert_eq!(
            config.source_repo(None).expect("repo"),
            PathBuf::from("/srv/docs/../uclchem")
        );
        assert_eq!(
            config.source_repo(Some(Path::new("/work/uclchem"))).expect("override"),
            PathBuf::from("/work/uclchem")
        );
    }

    #[test]
    fn load_and_init_roundtrip() {
        let dir = std::env::temp_dir().join(format!("docfleet-config-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("versions.yaml");

        init_config(&path).expect("init");
        assert!(init_config(&path).is_err(), "init must not overwrite");

        let loaded = load_config_from(&path).expect("load");
        assert_eq!(loaded.versions.len(), 2);
        assert_eq!(loaded.base_dir, std::fs::canonicalize(&dir).expect("canonicalize"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_config_from(Path::new("/nonexistent/versions.yaml")).unwrap_err();
        assert!(matches!(err, DocfleetError::Config { .. }));
    }
}
