// crates/weftcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use weftcore::{ExecutionEvent, NodeEvent, RequestContext, ValidationOptions};
use weftruntime::{Engine, OperationRegistry, RunOptions, RunStatus, RuntimeConfig};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Weft workflow engine CLI", long_about = None)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Treat validation warnings as failures
    #[arg(long, global = true)]
    strict: bool,

    /// Require a tenantId on every workflow
    #[arg(long, global = true)]
    tenant_mode: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as JSON string
        #[arg(short, long)]
        input: Option<String>,

        /// Tenant for $context.tenantId
        #[arg(short, long)]
        tenant: Option<String>,

        /// Variable override, NAME=VALUE (repeatable)
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,
    },

    /// List available operation types
    Ops,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    config.strict_validation |= cli.strict;
    config.tenant_mode |= cli.tenant_mode;

    let mut registry = OperationRegistry::new();
    weftnodes::register_all(&mut registry);
    let engine = Engine::with_registry(Arc::new(registry), config);

    match cli.command {
        Commands::Validate { file } => validate_workflow(&engine, &file),
        Commands::Run {
            file,
            input,
            tenant,
            vars,
        } => run_workflow(&engine, &file, input, tenant, vars).await,
        Commands::Ops => {
            list_ops(&engine);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};
    let level = if verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return Ok(RuntimeConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: RuntimeConfig =
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    tracing::debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

fn read_document(file: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading workflow {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing workflow {}", file.display()))
}

fn validate_workflow(engine: &Engine, file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let document = read_document(file)?;
    let report = engine.validate_with(
        &document,
        ValidationOptions {
            strict: engine.config().strict_validation,
            tenant_mode: engine.config().tenant_mode,
        },
    );

    for issue in &report.issues {
        println!("   {}", issue);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.ok {
        println!("✅ Workflow is valid");
        Ok(())
    } else {
        anyhow::bail!("workflow {} is invalid", file.display())
    }
}

fn parse_vars(vars: Vec<String>) -> Result<serde_json::Map<String, Json>> {
    vars.into_iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .with_context(|| format!("variable override '{}' is not NAME=VALUE", pair))?;
            Ok((name.to_string(), Json::String(value.to_string())))
        })
        .collect()
}

async fn run_workflow(
    engine: &Engine,
    file: &Path,
    input: Option<String>,
    tenant: Option<String>,
    vars: Vec<String>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let document = read_document(file)?;

    let input: Json = match input {
        Some(text) => serde_json::from_str(&text).context("input must be JSON")?,
        None => Json::Null,
    };

    let mut request = RequestContext::new(format!("cli-{}", std::process::id()));
    if let Some(tenant) = tenant {
        request = request.with_tenant(tenant);
    }
    let options = RunOptions {
        variables: parse_vars(vars)?,
        ..RunOptions::default()
    };

    let mut events = engine.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::RunStarted { workflow_id, .. } => {
                    println!("▶️  Run started: {}", workflow_id);
                }
                ExecutionEvent::NodeStarted {
                    node,
                    node_type,
                    attempt,
                    ..
                } => {
                    println!("  ⚡ Starting node: {} ({}), attempt {}", node, node_type, attempt);
                }
                ExecutionEvent::NodeCompleted {
                    node, duration_ms, ..
                } => {
                    println!("  ✅ Node {} completed in {}ms", node, duration_ms);
                }
                ExecutionEvent::NodeRetrying {
                    node,
                    delay_ms,
                    error,
                    ..
                } => {
                    println!("  🔁 Node {} retrying in {}ms: {}", node, delay_ms, error);
                }
                ExecutionEvent::NodeFailed { node, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node, error);
                }
                ExecutionEvent::NodeSkipped { node, reason, .. } => {
                    println!("  ⏭️  Node {} skipped: {}", node, reason);
                }
                ExecutionEvent::NodeEvent { node, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     ℹ️  [{}] {}", node, message),
                    NodeEvent::Warning { message } => println!("     ⚠️  [{}] {}", node, message),
                    NodeEvent::Data { name, value } => {
                        println!("     📣 [{}] {}: {}", node, name, value)
                    }
                },
                ExecutionEvent::RunCompleted {
                    status,
                    duration_ms,
                    ..
                } => {
                    println!("✨ Run {} in {}ms", status, duration_ms);
                }
            }
        }
    });

    let result = engine.execute_with(&document, input, request, options).await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Run result:");
    println!("{}", serde_json::to_string_pretty(&result)?);
    for warning in &result.warnings {
        println!("   ⚠️  {}", warning);
    }
    if let Some(response) = &result.response {
        println!();
        println!("📤 Response:");
        println!("{}", serde_json::to_string_pretty(response)?);
    }

    match result.status {
        RunStatus::Failed => anyhow::bail!(
            "run failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ),
        RunStatus::Succeeded | RunStatus::Partial => Ok(()),
    }
}

fn list_ops(engine: &Engine) {
    println!("📦 Available Operation Types:");
    println!();

    for meta in engine.registry().list() {
        println!("  • {}", meta.op_type);
        if !meta.description.is_empty() {
            println!("    {}", meta.description);
        }
    }
}
