//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;

use tickerflow_core::{
    MarketData, NoMarketData, Pipeline, PipelineStep, ProgressReporter, StaticMarketData,
};
use tickerflow_shared::{AppConfig, StepEnvelope, init_config, load_config, load_config_from};
use tickerflow_storage::{StepCache, open_cache};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tickerflow: staged, cached investment research.
#[derive(Parser)]
#[command(
    name = "tickerflow",
    version,
    about = "Run a staged investment-research pipeline with a persistent step cache.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.tickerflow/tickerflow.toml).
    #[arg(long, global = true, env = "TICKERFLOW_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Run one step and print its envelope.
    Run {
        /// Step id (see `tickerflow steps`).
        step: String,

        /// Recompute even if a cached result exists.
        #[arg(long)]
        no_cache: bool,

        /// Step payload as a JSON object.
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Read the step payload from a JSON file.
        #[arg(long)]
        payload_file: Option<PathBuf>,

        /// JSON array of market snapshots used to annotate vetting candidates.
        #[arg(long)]
        market_data: Option<PathBuf>,
    },

    /// Run every step in order, each deriving its inputs from the cache.
    RunAll {
        /// Recompute every step even if cached.
        #[arg(long)]
        no_cache: bool,

        /// JSON array of market snapshots used to annotate vetting candidates.
        #[arg(long)]
        market_data: Option<PathBuf>,
    },

    /// Print the cached record for one step.
    Show {
        /// Step id.
        step: String,
    },

    /// Print the whole cache.
    Dump,

    /// List the registered steps.
    Steps,

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
        0 => "tickerflow=info",
        1 => "tickerflow=debug",
        _ => "tickerflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            step,
            no_cache,
            payload,
            payload_file,
            market_data,
        } => {
            let payload = read_payload(payload.as_deref(), payload_file.as_deref())?;
            cmd_run(config_path, &step, !no_cache, &payload, market_data.as_deref()).await
        }
        Command::RunAll {
            no_cache,
            market_data,
        } => cmd_run_all(config_path, !no_cache, market_data.as_deref()).await,
        Command::Show { step } => cmd_show(config_path, &step).await,
        Command::Dump => cmd_dump(config_path).await,
        Command::Steps => cmd_steps(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn read_payload(inline: Option<&str>, file: Option<&Path>) -> Result<Value> {
    let raw = match (inline, file) {
        (Some(raw), _) => raw.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading payload file {}", path.display()))?,
        (None, None) => return Ok(Value::Null),
    };
    serde_json::from_str(&raw).wrap_err("payload is not valid JSON")
}

fn market_data(path: Option<&Path>) -> Result<Arc<dyn MarketData>> {
    let Some(path) = path else {
        return Ok(Arc::new(NoMarketData));
    };
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading market data {}", path.display()))?;
    let data = StaticMarketData::from_json(&raw).wrap_err("market data must be a JSON array")?;
    info!(snapshots = data.len(), "loaded market data");
    Ok(Arc::new(data))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    step: &str,
    use_cache: bool,
    payload: &Value,
    market: Option<&Path>,
) -> Result<()> {
    let config = config(config_path)?;
    let pipeline = Pipeline::from_config(&config, market_data(market)?).await?;

    let spinner = spinner();
    spinner.set_message(format!("Running {step}"));
    let result = pipeline.run_step(step, use_cache, payload).await;
    spinner.finish_and_clear();

    let envelope = result?;
    print_json(&envelope)
}

async fn cmd_run_all(
    config_path: Option<&Path>,
    use_cache: bool,
    market: Option<&Path>,
) -> Result<()> {
    let config = config(config_path)?;
    let pipeline = Pipeline::from_config(&config, market_data(market)?).await?;

    let reporter = CliProgress::new();
    let result = pipeline.run_all(use_cache, &reporter).await;
    reporter.spinner.finish_and_clear();

    let completed = result?;
    if let Some((_, last)) = completed.last() {
        print_json(last)?;
    }
    Ok(())
}

async fn cmd_show(config_path: Option<&Path>, step: &str) -> Result<()> {
    let step: PipelineStep = step.parse()?;
    let config = config(config_path)?;
    let cache = open_cache(&config.cache).await?;

    match cache.get(step.as_str()).await {
        Some(record) => print_json(&record),
        None => Err(eyre!("no cached result for {step}")),
    }
}

async fn cmd_dump(config_path: Option<&Path>) -> Result<()> {
    let config = config(config_path)?;
    let cache = open_cache(&config.cache).await?;
    print_json(&cache.dump_all().await)
}

fn cmd_steps() -> Result<()> {
    for step in PipelineStep::ALL {
        let input = step.input_field().unwrap_or("-");
        println!("  {:<28} {:<18} {}", step.as_str(), input, step.description());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("spinner template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// `run-all` progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn step_started(&self, step: PipelineStep, index: usize, total: usize) {
        self.spinner
            .set_message(format!("[{}/{total}] {}", index + 1, step.description()));
    }

    fn step_finished(&self, step: PipelineStep, envelope: &StepEnvelope) {
        self.spinner
            .println(format!("  {step}: {}", envelope.format.as_str()));
    }

    fn done(&self, completed: usize) {
        self.spinner
            .finish_with_message(format!("{completed} steps complete"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_payload_and_flags() {
        let cli = Cli::try_parse_from([
            "tickerflow",
            "run",
            "categorization_triage",
            "--no-cache",
            "--payload",
            r#"{"companies_list": ["AAPL"]}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Run { step, no_cache, payload, .. } => {
                assert_eq!(step, "categorization_triage");
                assert!(no_cache);
                let value = read_payload(payload.as_deref(), None).unwrap();
                assert_eq!(value["companies_list"][0], "AAPL");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn payload_and_payload_file_conflict() {
        let parsed = Cli::try_parse_from([
            "tickerflow",
            "run",
            "idea_generation",
            "--payload",
            "{}",
            "--payload-file",
            "p.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_payload_is_null() {
        assert_eq!(read_payload(None, None).unwrap(), Value::Null);
        assert!(read_payload(Some("{not json"), None).is_err());
    }
}
