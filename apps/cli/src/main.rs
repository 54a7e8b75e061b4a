//! privaudit CLI — GDPR/ePrivacy website compliance auditor.
//!
//! Captures a live browser session per domain, mines the cookie/privacy
//! policy documents, and delegates the compliance scorecard to an analysis
//! service, recording one result per host.

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
