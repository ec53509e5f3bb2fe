//! CritiqueBot - critique/refine rebuttal assistant CLI
//!
//! The `critiquebot` command runs the critique-refinement pipeline.
//!
//! ## Commands
//!
//! - `chat`: Interactive debate session on stdin/stdout
//! - `describe`: Show the resolved experiment and the modules it builds
//! - `modules`: List registered module versions and a sample config
//! - `batch`: Replay scripted user turns from CSV and write results

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use critique_clients::{
    CapabilityClients, OpenAiClient, OpenAiConfig, TavilyClient, TavilyConfig,
};
use critique_core::metrics::METRICS;
use critique_core::telemetry;
use critique_core::{
    AppConfig, BatchConfig, BatchRunner, ConversationHistory, CritiqueError, ExpModuleConfig,
    ExperimentRequest, ModuleContext, ModuleRegistry, Pipeline, PipelineDescription,
    PipelineFactory, RoleName, RunMode,
};

#[derive(Parser)]
#[command(name = "critiquebot")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Critique-refinement rebuttal assistant", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "CRITIQUEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Experiment: preset name, model shortcut, or JSON overrides
    #[arg(short, long, global = true)]
    experiment: Option<String>,

    /// Log every prompt/response pair
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Defaults to the configured mode (`cli` → chat, `exp` → batch)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat: enter claims, get rebuttals
    Chat,

    /// Print the resolved configuration and runtime modules
    Describe,

    /// List registered module versions per role
    Modules,

    /// Run a CSV batch experiment
    Batch {
        /// Directory holding in.csv, out.csv and exp_config.json
        #[arg(long)]
        exp_dir: Option<PathBuf>,

        /// Input CSV (overrides the configured path)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV (overrides the configured path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Batch config file (overrides the configured path)
        #[arg(long)]
        exp_config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_app_config(cli.config.as_deref())?;
    let verbose = cli.verbose || config.verbose;
    telemetry::init_tracing(cli.json, telemetry::level_for(verbose));
    let request = match cli.experiment.as_deref() {
        Some(arg) => parse_experiment_arg(arg)?,
        None => config.version.clone(),
    };

    let command = cli.command.unwrap_or(match config.mode {
        RunMode::Cli => Commands::Chat,
        RunMode::Exp => Commands::Batch {
            exp_dir: None,
            input: None,
            output: None,
            exp_config: None,
        },
    });

    let result = match command {
        Commands::Modules => cmd_modules(cli.json),
        Commands::Describe => {
            let factory = build_factory(&config, CapabilityClients::unconfigured(), verbose)?;
            cmd_describe(&factory, &request, cli.json).await
        }
        Commands::Chat => {
            let factory = build_factory(&config, live_clients(&config)?, verbose)?;
            cmd_chat(&factory, &request).await
        }
        Commands::Batch {
            exp_dir,
            input,
            output,
            exp_config,
        } => {
            let paths = batch_paths(&config, exp_dir, input, output, exp_config);
            let factory = build_factory(&config, live_clients(&config)?, verbose)?;
            cmd_batch(&factory, &request, &paths).await
        }
    };

    METRICS.flush();
    result
}

/// Load the config file. Without an explicit path, a missing `config.json`
/// means built-in defaults.
fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let default = Path::new(critique_core::config::DEFAULT_CONFIG_FILE);
            if default.exists() {
                AppConfig::load(default).context("Failed to load config.json")
            } else {
                Ok(AppConfig::default())
            }
        }
    }
}

/// A `{…}` argument is JSON overrides; anything else is a preset or model name.
fn parse_experiment_arg(arg: &str) -> Result<ExperimentRequest> {
    let trimmed = arg.trim();
    if trimmed.starts_with('{') {
        let value: Value =
            serde_json::from_str(trimmed).context("--experiment is not valid JSON")?;
        Ok(ExperimentRequest::from_value(value))
    } else {
        Ok(ExperimentRequest::from(trimmed))
    }
}

fn live_clients(config: &AppConfig) -> Result<CapabilityClients> {
    let mut openai = OpenAiConfig::from_env();
    if let Some(key) = config.openai_api_key.as_deref() {
        openai = openai.with_api_key(key);
    }
    if let Some(url) = config.openai_base_url.as_deref() {
        openai = openai.with_base_url(url);
    }
    let text = OpenAiClient::new(openai)
        .context("OpenAI API key required: set openai_api_key in the config or OPENAI_API_KEY")?;

    let mut tavily = TavilyConfig::from_env();
    if let Some(key) = config.tavily_api_key.as_deref() {
        tavily = tavily.with_api_key(key);
    }
    let search = TavilyClient::new(tavily)
        .context("Tavily API key required: set tavily_api_key in the config or TAVILY_API_KEY")?;

    Ok(CapabilityClients::new(Arc::new(text), Arc::new(search)))
}

fn build_factory(
    config: &AppConfig,
    clients: CapabilityClients,
    verbose: bool,
) -> Result<PipelineFactory> {
    let registry = ModuleRegistry::builtin().context("Invalid module registry")?;
    let ctx = ModuleContext::new(clients).with_log_io(verbose);
    Ok(PipelineFactory::new(registry, config.resolver(), ctx)
        .with_call_defaults(config.call_options()))
}

// ---------------------------------------------------------------------------
// describe / modules
// ---------------------------------------------------------------------------

async fn cmd_describe(
    factory: &PipelineFactory,
    request: &ExperimentRequest,
    json: bool,
) -> Result<()> {
    let description = factory.describe(request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&description)?);
    } else {
        print!("{}", render_description(&description));
    }
    Ok(())
}

fn render_description(d: &PipelineDescription) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Experiment {}\n",
        &d.config_key[..12.min(d.config_key.len())]
    ));
    out.push_str("Configuration:\n");
    for (role, spec) in d.config.iter() {
        out.push_str(&format!("  {:<11} {}\n", role.as_str(), spec));
    }
    out.push_str("Runtime modules:\n");
    for (role, module) in d.modules.iter() {
        out.push_str(&format!("  {:<11} {}\n", role.as_str(), module));
    }
    for warning in &d.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

fn cmd_modules(json: bool) -> Result<()> {
    let registry = ModuleRegistry::builtin().context("Invalid module registry")?;
    if json {
        let listing: serde_json::Map<String, Value> = RoleName::ALL
            .iter()
            .map(|role| (role.as_str().to_string(), json!(registry.available(*role))))
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Registered module versions:");
    for role in RoleName::ALL {
        println!("  {:<11} {}", role.as_str(), registry.available(role).join(", "));
    }
    println!();
    println!("Sample config.json:");
    println!("{}", serde_json::to_string_pretty(&sample_config(&registry))?);
    Ok(())
}

/// A starter config that names the first registered version of every role.
fn sample_config(registry: &ModuleRegistry) -> Value {
    let modules: serde_json::Map<String, Value> = RoleName::ALL
        .iter()
        .filter_map(|role| {
            let version = registry.available(*role).into_iter().next()?;
            Some((
                role.as_str().to_string(),
                json!({"version": version, "model": "gpt-4o-mini"}),
            ))
        })
        .collect();
    json!({
        "mode": "cli",
        "verbose": true,
        "openai_api_key": "<YOUR_OPENAI_KEY>",
        "tavily_api_key": "<YOUR_TAVILY_KEY>",
        "version": {
            "default_model": "gpt-4o-mini",
            "modules": modules,
        },
        "exp_module": {
            "input_csv": "EXP001/in.csv",
            "output_csv": "EXP001/out.csv",
            "config": "EXP001/exp_config.json",
        },
    })
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

async fn cmd_chat(factory: &PipelineFactory, request: &ExperimentRequest) -> Result<()> {
    let description = factory.describe(request).await?;
    for warning in &description.warnings {
        warn!("{warning}");
    }
    info!(config = %description.config, "experiment ready");

    let pipeline = factory.get_or_build(request).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let mut interrupts = watch_interrupts();
    run_chat(&pipeline, stdin, &mut stdout, &mut interrupts).await
}

/// One Ctrl-C watcher for the whole session. Each press is forwarded to the
/// chat loop; the channel closes if the signal handler cannot be installed.
fn watch_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                break;
            }
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Chat loop over any line source. `/new` clears the conversation, `/quit`
/// or end of input exits. An interrupt cancels the reply in flight, or ends
/// the session when it arrives at the prompt.
async fn run_chat<R, W>(
    pipeline: &Pipeline,
    input: R,
    out: &mut W,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(
        out,
        "CritiqueBot: state a claim and I'll argue the other side. /new restarts, /quit exits."
    )?;
    let mut lines = input.lines();
    let mut history = ConversationHistory::new();

    loop {
        write!(out, "you> ")?;
        out.flush()?;
        let next = tokio::select! {
            biased;
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => None,
        };
        let Some(line) = next else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                history = ConversationHistory::new();
                writeln!(out, "(new conversation)")?;
                continue;
            }
            _ => {}
        }

        let mut attempt = history.clone();
        attempt.push_user(line);

        let token = CancellationToken::new();
        let options = pipeline.call_defaults().clone().with_cancel(token.clone());
        let result = {
            let call = pipeline.call_with(&attempt, &options);
            tokio::pin!(call);
            tokio::select! {
                biased;
                r = &mut call => r,
                Some(()) = interrupts.recv() => {
                    token.cancel();
                    call.await
                }
            }
        };

        match result {
            Ok(outcome) => {
                let reply = outcome.rebuttal;
                writeln!(out, "bot> {}", reply.text)?;
                for (title, url) in &reply.references {
                    writeln!(out, "     [{title}] {url}")?;
                }
                attempt.push_assistant(reply.text);
                history = attempt;
            }
            Err(CritiqueError::Cancelled { .. }) => {
                writeln!(out, "(cancelled)")?;
            }
            Err(e) => {
                warn!(error = %e, "rebuttal failed");
                writeln!(out, "(error: {e})")?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

fn batch_paths(
    config: &AppConfig,
    exp_dir: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    exp_config: Option<PathBuf>,
) -> ExpModuleConfig {
    let mut paths = match exp_dir {
        Some(dir) => ExpModuleConfig::in_dir(dir),
        None => config.exp_module.clone(),
    };
    if let Some(input) = input {
        paths.input_csv = input;
    }
    if let Some(output) = output {
        paths.output_csv = output;
    }
    if let Some(exp_config) = exp_config {
        paths.config = exp_config;
    }
    paths
}

/// Batch file at `path`; a missing file means one run per row.
fn load_batch_config(path: &Path, fallback: &ExperimentRequest) -> Result<BatchConfig> {
    let mut batch = if path.exists() {
        BatchConfig::load(path)
            .with_context(|| format!("Failed to load batch config {}", path.display()))?
    } else {
        warn!(path = %path.display(), "batch config not found; using defaults");
        BatchConfig::default()
    };
    if batch.default_version == ExperimentRequest::Default {
        batch.default_version = fallback.clone();
    }
    Ok(batch)
}

async fn cmd_batch(
    factory: &PipelineFactory,
    request: &ExperimentRequest,
    paths: &ExpModuleConfig,
) -> Result<()> {
    let batch = load_batch_config(&paths.config, request)?;
    let report = BatchRunner::new(factory, batch)
        .run(&paths.input_csv, &paths.output_csv)
        .await
        .context("Batch run failed")?;

    match &report.output {
        Some(output) => println!(
            "Wrote {} runs over {} cases to {}",
            report.runs,
            report.cases,
            output.display()
        ),
        None => println!("No runnable rows in {}", paths.input_csv.display()),
    }
    Ok(())
}
