//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use courier_gateway::{ContactSource, CrmClient, MessageGateway, RetryPolicy};
use courier_pipeline::{FollowupJob, JobSummary, Notifier, ProgressReporter, ResultSink};
use courier_shared::{
    AppConfig, JobConfig, init_config, load_config, load_config_from, resolve_secret,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Courier — deliver follow-up messages exactly where they belong.
#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Resilient, idempotent follow-up message delivery.",
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
    /// Run the follow-up delivery pipeline to exhaustion.
    Run {
        /// Config file path (defaults to ~/.courier/courier.toml).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Contacts per page (overrides config).
        #[arg(long)]
        page_size: Option<u32>,

        /// Concurrent workers per page (overrides config).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Retry ceiling for transient failures (overrides config).
        #[arg(long)]
        max_retries: Option<u32>,

        /// Results file path (overrides config).
        #[arg(long)]
        results_file: Option<PathBuf>,
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
        0 => "courier_cli=info,courier_pipeline=info,courier_gateway=info,courier_shared=info",
        1 => "courier_cli=debug,courier_pipeline=debug,courier_gateway=debug,courier_shared=debug",
        _ => "trace",
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
            config,
            page_size,
            concurrency,
            max_retries,
            results_file,
        } => {
            cmd_run(
                config.as_deref(),
                page_size,
                concurrency,
                max_retries,
                results_file,
            )
            .await
        }
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
    config_path: Option<&std::path::Path>,
    page_size: Option<u32>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    results_file: Option<PathBuf>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    // Merge CLI overrides into the runtime job config.
    let mut job_config = JobConfig::from(&config);
    if let Some(v) = page_size {
        job_config.page_size = v;
    }
    if let Some(v) = concurrency {
        job_config.concurrency = v;
    }
    if let Some(v) = max_retries {
        job_config.max_retries = v;
    }
    if let Some(v) = results_file {
        job_config.results_file = v;
    }

    let source_url = parse_base_url("source", &config.source.base_url)?;
    let gateway_url = parse_base_url("gateway", &config.gateway.base_url)?;
    let crm_url = parse_base_url("crm", &config.crm.base_url)?;

    let gateway_token = resolve_secret(&config.gateway.api_token_env)?;
    let crm_token = resolve_secret(&config.crm.api_token_env)?;

    let client = courier_gateway::build_client()?;
    let retry = RetryPolicy::new(job_config.max_retries, job_config.base_backoff_ms);

    let source = ContactSource::new(client.clone(), source_url);
    let crm = CrmClient::new(client.clone(), crm_url, config.crm.account_id).with_token(crm_token);
    let gateway = MessageGateway::new(client, gateway_url).with_token(gateway_token);
    let notifier = Notifier::new(crm, gateway, retry, job_config.allowed_inbox_ids.clone());
    let sink = ResultSink::open(&job_config.results_file).await?;

    info!(
        page_size = job_config.page_size,
        concurrency = job_config.concurrency,
        results_file = %job_config.results_file.display(),
        "starting follow-up run"
    );

    let reporter = CliProgress::new();
    let results_path = job_config.results_file.clone();
    let job = FollowupJob::new(source, notifier, sink, job_config);
    let summary = job.run(&reporter).await?;

    // Print summary
    println!();
    println!("  Follow-up run complete!");
    println!("  Pages:         {}", summary.pages);
    println!("  Processed:     {}", summary.processed);
    println!("  Sent:          {}", summary.sent);
    println!("  Skipped:       {}", summary.skipped);
    println!("  Errors:        {}", summary.errors);
    if summary.sink_failures > 0 {
        println!("  Sink failures: {}  (degraded audit trail)", summary.sink_failures);
    }
    println!("  Time:          {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Results:       {}", results_path.display());
    println!();

    if summary.sink_failures > 0 {
        return Err(eyre!(
            "{} outcome record(s) could not be written to the results file",
            summary.sink_failures
        ));
    }

    Ok(())
}

fn parse_base_url(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| eyre!("invalid {name} base URL '{value}': {e}"))
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn page_started(&self, page: u32, count: usize) {
        self.spinner
            .set_message(format!("Processing page {page} ({count} contacts)"));
    }

    fn done(&self, _summary: &JobSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
