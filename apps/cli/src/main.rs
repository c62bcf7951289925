//! docfleet CLI: multi-version documentation builds.
//!
//! Builds one documentation site per configured source version, preferring
//! pre-executed notebook bundles, and writes the version-switcher manifest.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
