//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use privaudit_core::{
    AuditInvoker, AuditPipeline, DomainOutcome, PipelineSettings, ProgressReporter,
};
use privaudit_discovery::{ContentFetcher, KeywordCatalog};
use privaudit_session::{ChromeSession, ConsentAutomator, TrafficRecorder};
use privaudit_shared::{init_config, load_config, validate_api_key};
use privaudit_storage::Ledger;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// privaudit — audit websites for GDPR/ePrivacy compliance.
#[derive(Parser)]
#[command(
    name = "privaudit",
    version,
    about = "Audit websites for GDPR/ePrivacy compliance: cookie timelines, policy documents, scorecards.",
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
    /// Audit every domain in the domain list.
    Run {
        /// Path to the newline-delimited domain list (# for comments).
        #[arg(short, long)]
        domains: Option<PathBuf>,

        /// Path to the result ledger database.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Override the analysis model.
        #[arg(long)]
        model: Option<String>,

        /// Run Chrome with a visible window (for debugging consent detection).
        #[arg(long)]
        headful: bool,
    },

    /// Inspect the result ledger.
    Ledger {
        /// Ledger subcommand.
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Ledger subcommands.
#[derive(Subcommand)]
pub(crate) enum LedgerAction {
    /// List audited hostnames.
    List {
        /// Path to the result ledger database.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the stored audit result for one host.
    Show {
        /// Hostname to look up.
        host: String,

        /// Path to the result ledger database.
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "privaudit=info",
        1 => "privaudit=debug",
        _ => "privaudit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            domains,
            db,
            model,
            headful,
        } => cmd_run(domains, db, model, headful).await,
        Command::Ledger { action } => match action {
            LedgerAction::List { db } => cmd_ledger_list(db).await,
            LedgerAction::Show { host, db } => cmd_ledger_show(&host, db).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(
    domains_path: Option<PathBuf>,
    db: Option<PathBuf>,
    model: Option<String>,
    headful: bool,
) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    validate_api_key(&config)?;
    let api_key = std::env::var(&config.gemini.api_key_env)
        .map_err(|_| eyre!("{} is not set", config.gemini.api_key_env))?;

    let domains_file =
        domains_path.unwrap_or_else(|| PathBuf::from(&config.defaults.domains_file));
    let domains = read_domain_list(&domains_file)?;
    if domains.is_empty() {
        println!(
            "No domains found in {}. Please add at least one URL.",
            domains_file.display()
        );
        return Ok(());
    }

    let db_path = db.unwrap_or_else(|| PathBuf::from(&config.defaults.db_path));
    let ledger = Ledger::open(&db_path).await?;

    let mut browser = config.browser.clone();
    if headful {
        browser.headless = false;
    }

    info!(
        domains = domains.len(),
        db = %db_path.display(),
        headless = browser.headless,
        "starting audit run"
    );

    let recorder = TrafficRecorder::new();
    let session = ChromeSession::launch(&browser, recorder.clone()).await?;

    let model = model.unwrap_or_else(|| config.gemini.model.clone());
    let pipeline = AuditPipeline::new(
        session,
        recorder,
        ledger,
        ContentFetcher::new(Duration::from_secs(config.defaults.fetch_timeout_secs))?,
        AuditInvoker::new(&config.gemini.base_url, &model, &api_key)?,
        ConsentAutomator::accepting(Duration::from_millis(config.defaults.consent_settle_ms)),
        KeywordCatalog::builtin(),
        PipelineSettings::from(&config),
    );

    let reporter = CliProgress::new();
    let summary = pipeline.run(&domains, &reporter).await;
    reporter.finish();

    pipeline.into_session().close().await?;

    // Print summary
    println!();
    println!("  Audit run complete");
    println!("  Domains:         {}", domains.len());
    println!("  Audited:         {}", summary.audited);
    println!("  Already audited: {}", summary.already_audited);
    println!("  Skipped:         {}", summary.skipped);
    println!("  Failed:          {}", summary.failed);
    println!("  Ledger:          {}", db_path.display());
    println!();

    Ok(())
}

/// Read the domain list: one URL per line, `#` for comments, blanks ignored.
fn read_domain_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read domain list '{}': {e}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    current: Mutex<String>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            current: Mutex::new(String::new()),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn domain_started(&self, domain: &str, index: usize, total: usize) {
        let label = format!("[{index}/{total}] {domain}");
        self.spinner.set_message(label.clone());
        *self.current.lock().unwrap() = label;
    }

    fn phase(&self, name: &str) {
        let current = self.current.lock().unwrap();
        self.spinner.set_message(format!("{current} — {name}"));
    }

    fn domain_finished(&self, domain: &str, outcome: &DomainOutcome) {
        let line = match outcome {
            DomainOutcome::AlreadyAudited => format!("  = {domain}: already audited"),
            DomainOutcome::Skipped { reason } => format!("  - {domain}: skipped ({reason})"),
            DomainOutcome::Audited(summary) => format!(
                "  + {domain}: audited ({} responses, {} cookies before consent, {} triggered by consent)",
                summary.responses_captured, summary.cookies_before, summary.triggered_by_consent
            ),
        };
        self.spinner.println(line);
    }
}

// ---------------------------------------------------------------------------
// ledger
// ---------------------------------------------------------------------------

async fn open_ledger(db: Option<PathBuf>) -> Result<(Ledger, PathBuf)> {
    let config = load_config()?;
    let db_path = db.unwrap_or_else(|| PathBuf::from(&config.defaults.db_path));
    let ledger = Ledger::open(&db_path).await?;
    Ok((ledger, db_path))
}

async fn cmd_ledger_list(db: Option<PathBuf>) -> Result<()> {
    let (ledger, db_path) = open_ledger(db).await?;
    let entries = ledger.list_entries().await?;

    if entries.is_empty() {
        println!("Ledger {} is empty.", db_path.display());
        return Ok(());
    }

    println!("Audited domains in {}:", db_path.display());
    for entry in entries {
        println!("  {}  {}", entry.created_at, entry.hostname);
    }
    Ok(())
}

async fn cmd_ledger_show(host: &str, db: Option<PathBuf>) -> Result<()> {
    let (ledger, db_path) = open_ledger(db).await?;

    match ledger.get_result(host).await? {
        Some(result) => println!("{result}"),
        None => println!("No audit result for '{host}' in {}.", db_path.display()),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created default config at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(())
}
