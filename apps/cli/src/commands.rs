//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use curator_core::{ProgressReporter, Workflow};
use curator_shared::{
    AppConfig, Category, RawInput, WorkflowResult, WorkflowState, init_config, load_config,
    load_config_from,
};
use curator_store::ContentStore;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// curator: turn shared links into a curated content repository.
#[derive(Parser)]
#[command(
    name = "curator",
    version,
    about = "Extract, classify and commit shared links to a versioned content repository.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.curator/curator.toml).
    #[arg(long, global = true, env = "CURATOR_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Process one batch of inputs and print the run result as JSON.
    Run {
        /// JSON file holding one input or an array of inputs (`-` for stdin).
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Serve the webhook trigger.
    Serve {
        /// Address to bind (overrides `[server] bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// List stored entries of one category.
    List {
        /// news, catalog or video.
        #[arg(short, long)]
        category: Category,

        /// Print entries as JSON instead of a table.
        #[arg(long)]
        json: bool,
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
        0 => "curator=info",
        1 => "curator=debug",
        _ => "curator=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // logs go to stderr; stdout carries command output
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
        Command::Run { input } => cmd_run(cli.config.as_deref(), &input).await,
        Command::Serve { bind } => cmd_serve(cli.config.as_deref(), bind).await,
        Command::List { category, json } => cmd_list(cli.config.as_deref(), category, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, input: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let inputs = read_inputs(input)?;
    let workflow = Workflow::from_config(&config)?;

    info!(
        inputs = inputs.len(),
        backend = workflow.store().backend_name(),
        "running batch"
    );

    // Ctrl-C stops dispatching new items; nothing is persisted
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            let _ = cancel_tx.send(true);
        }
    });

    let reporter = CliProgress::new();
    let result = workflow.run_with_cancel(&inputs, cancel_rx, &reporter).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        return Err(eyre!(
            "run {} failed: {}",
            result.run_id,
            result.errors.last().map(String::as_str).unwrap_or("unknown error")
        ));
    }
    Ok(())
}

/// Parse a batch from a file or stdin. Accepts one input object or an array.
fn read_inputs(source: &str) -> Result<Vec<RawInput>> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).wrap_err_with(|| format!("failed to read '{source}'"))?
    };
    parse_inputs(&text)
}

pub(crate) fn parse_inputs(text: &str) -> Result<Vec<RawInput>> {
    let value: serde_json::Value = serde_json::from_str(text).wrap_err("input is not valid JSON")?;
    let inputs = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(inputs)
}

async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let workflow = Arc::new(Workflow::from_config(&config)?);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    crate::server::serve(workflow, &bind).await
}

async fn cmd_list(config_path: Option<&Path>, category: Category, json: bool) -> Result<()> {
    if !category.is_persisted() {
        return Err(eyre!("'{category}' entries are never stored; pick news, catalog or video"));
    }
    let config = resolve_config(config_path)?;
    let store = ContentStore::from_config(&config.store)?;
    let entries = store.read_all(category).await?;
    info!(%category, count = entries.len(), "listing entries");

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No {category} entries in {}.", store.path_for(category));
        return Ok(());
    }
    for entry in &entries {
        let status = match entry.status {
            curator_shared::PublishStatus::Published => "published",
            curator_shared::PublishStatus::Review => "review",
        };
        let date = entry
            .sort_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".into());
        println!("{date}  {status:<9}  {:<40}  {}", entry.id, entry.url);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
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
    fn phase(&self, state: WorkflowState) {
        let label = match state {
            WorkflowState::Idle => "Starting",
            WorkflowState::Extracting => "Extracting",
            WorkflowState::Classifying => "Classifying",
            WorkflowState::Reconciling => "Reconciling",
            WorkflowState::Persisting => "Committing",
            WorkflowState::Done | WorkflowState::Failed => "Finishing",
        };
        self.spinner.set_message(label.to_string());
    }

    fn item_done(&self, url: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {url}"));
    }

    fn done(&self, _result: &WorkflowResult) {
        self.spinner.finish_and_clear();
    }
}
