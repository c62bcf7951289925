//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docfleet_artifacts::GitHubArtifacts;
use docfleet_core::pipeline::{BuildReport, ProgressReporter, SilentProgress};
use docfleet_core::{
    Environment, MultiVersionBuilder, SystemToolchain, ToolPaths, collect_matrix,
    scan_built_versions, strip_outputs, validate_prerequisites,
};
use docfleet_shared::{BuildConfig, BuildResult, VersionSpec, init_config, load_config_from, render_config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docfleet: build every version of a project's documentation.
#[derive(Parser)]
#[command(
    name = "docfleet",
    version,
    about = "Build multi-version documentation sites with pre-executed notebooks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build every configured version, then write the manifest and redirect.
    Build {
        /// Build configuration (.yaml, .yml or .toml).
        #[arg(short, long, default_value = "versions.yaml")]
        config: PathBuf,

        /// Source repository (overrides source.repo_path).
        #[arg(long)]
        source_repo: Option<PathBuf>,

        /// API token for artifact access (falls back to github.token_env).
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Plain log output, no spinner.
        #[arg(long)]
        ci: bool,
    },

    /// Print `{"versions": [...]}` for the version directories under ROOT.
    VersionsJson {
        /// Directory holding one subdirectory per built version.
        #[arg(default_value = "_build/html/versions")]
        root: PathBuf,
    },

    /// Print a CI build matrix: the latest branch plus recent `v*` tags.
    Matrix {
        /// Source repository URL to read tags from.
        #[arg(long)]
        repo_url: String,

        /// How many recent tags to include.
        #[arg(long, default_value_t = 5)]
        count: usize,

        /// Branch used for the `latest` entry.
        #[arg(long, default_value = "main")]
        latest_branch: String,
    },

    /// Clear outputs and execution counts from numbered notebooks.
    StripOutputs {
        /// Directory holding the notebooks.
        #[arg(long, default_value = "notebooks")]
        dir: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a starter config file.
    Init {
        /// Where to write it; the extension picks the format.
        #[arg(default_value = "versions.yaml")]
        path: PathBuf,
    },
    /// Show the resolved configuration.
    Show {
        #[arg(short, long, default_value = "versions.yaml")]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docfleet=info",
        1 => "docfleet=debug",
        _ => "docfleet=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            config,
            source_repo,
            github_token,
            ci,
        } => cmd_build(&config, source_repo.as_deref(), github_token, ci).await,
        Command::VersionsJson { root } => cmd_versions_json(&root),
        Command::Matrix {
            repo_url,
            count,
            latest_branch,
        } => cmd_matrix(&repo_url, count, &latest_branch).await,
        Command::StripOutputs { dir } => cmd_strip_outputs(&dir),
        Command::Config { action } => match action {
            ConfigAction::Init { path } => cmd_config_init(&path),
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

async fn cmd_build(
    config_path: &Path,
    source_repo: Option<&Path>,
    github_token: Option<String>,
    ci: bool,
) -> Result<()> {
    let config = load_config_from(config_path)?;
    let environment = Environment::detect();
    let source_repo = config.source_repo(source_repo)?;
    let tools = ToolPaths::discover(&config.docs.compiler);

    info!(%environment, "environment detected");
    info!(docs_root = %config.docs_root().display(), "documentation root");
    info!(source_repo = %source_repo.display(), "source repository");
    info!(output = %config.output_root().display(), "build output");

    validate_prerequisites(
        &source_repo,
        &config.docs_root(),
        &config.docs.entry_file,
        &tools,
    )
    .await?;

    let artifacts = artifact_source(&config, github_token)?;
    let toolchain = SystemToolchain::from_config(&config, tools);
    let builder = MultiVersionBuilder::new(config, source_repo, toolchain, artifacts);

    let report = if ci || environment == Environment::Ci {
        builder.build_all(&SilentProgress).await?
    } else {
        builder.build_all(&CliProgress::new()).await?
    };

    print_summary(&report);

    if report.exit_code() != 0 {
        return Err(eyre!(
            "{} of {} versions failed to build",
            report.failed(),
            report.results.len()
        ));
    }
    Ok(())
}

/// Artifacts need both a `github` section and a token.
fn artifact_source(config: &BuildConfig, flag_token: Option<String>) -> Result<Option<GitHubArtifacts>> {
    let Some(github) = &config.github else {
        info!("no github section configured; notebooks come from the source");
        return Ok(None);
    };

    let token = flag_token
        .filter(|t| !t.is_empty())
        .or_else(|| github.token_from_env());
    match token {
        Some(token) => {
            info!("token available for artifact access");
            Ok(Some(GitHubArtifacts::from_config(github, Some(token))?))
        }
        None => {
            warn!(token_env = %github.token_env, "no token; artifacts will not be available");
            Ok(None)
        }
    }
}

fn print_summary(report: &BuildReport) {
    println!();
    println!("  Build summary");
    println!("  Built:  {}", report.built());
    println!("  Failed: {}", report.failed());
    for result in &report.results {
        let mark = if result.success { "ok  " } else { "FAIL" };
        println!(
            "    [{mark}] {:<16} {}",
            result.display_name,
            result.output_path.display()
        );
        if let Some(error) = &result.error {
            println!("           {error}");
        }
    }
    if let Some(manifest) = &report.manifest {
        println!("  Manifest: {}", manifest.display());
    }
    println!("  Logs:     {}", report.log_dir.display());
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn version_started(&self, spec: &VersionSpec, index: usize, total: usize) {
        self.spinner.set_message(format!(
            "Building [{index}/{total}] {} ({})",
            spec.display(),
            spec.reference
        ));
    }

    fn version_finished(&self, result: &BuildResult) {
        let mark = if result.success { "✓" } else { "✗" };
        self.spinner
            .println(format!("  {mark} {}", result.display_name));
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn cmd_versions_json(root: &Path) -> Result<()> {
    let versions = scan_built_versions(root)?;
    println!("{}", serde_json::to_string_pretty(&versions)?);
    Ok(())
}

async fn cmd_matrix(repo_url: &str, count: usize, latest_branch: &str) -> Result<()> {
    let matrix = collect_matrix(repo_url, latest_branch, count).await;
    println!("{}", serde_json::to_string(&matrix)?);
    Ok(())
}

fn cmd_strip_outputs(dir: &Path) -> Result<()> {
    let report = strip_outputs(dir)?;
    for skipped in &report.skipped {
        eprintln!("Skipped {}: read error", skipped.display());
    }
    println!("Cleared outputs in {} notebooks", report.cleared.len());
    Ok(())
}

fn cmd_config_init(path: &Path) -> Result<()> {
    let path = init_config(path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: &Path) -> Result<()> {
    let config = load_config_from(path)?;
    println!("# base_dir: {}", config.base_dir.display());
    println!("{}", render_config(&config, path)?);
    Ok(())
}
