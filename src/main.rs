use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use hostflow::app::{handle_fatal_error, init_logging, AppConfig};
use hostflow::config::{load_inventory, load_workflow};
use hostflow::module::ModuleRegistry;
use hostflow::transport::CancellationToken;
use hostflow::workflow::{ConsoleDisplay, WorkflowContext};

/// Run configuration-management workflows across a host inventory
#[derive(Parser)]
#[command(name = "hostflow", version)]
#[command(about = "Run declarative workflows across hosts", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file
    Run {
        /// Path to the workflow document
        workflow: PathBuf,

        /// Path to the inventory document
        #[arg(short, long)]
        inventory: PathBuf,

        /// Path to a YAML settings file
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Default module timeout (e.g. "30s", "10m")
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Debug output, including error chains
        #[arg(long)]
        debug: bool,

        /// Print step outputs as JSON when the run finishes
        #[arg(long)]
        json: bool,
    },
    /// List the available modules and their inputs
    Modules,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            workflow,
            inventory,
            settings,
            timeout,
            debug,
            json,
        } => {
            let config = match load_config(settings, cli.verbose, timeout, debug, json) {
                Ok(config) => config,
                Err(e) => handle_fatal_error(e, cli.verbose),
            };
            init_logging(&config);
            let verbose = if config.debug {
                config.verbose.max(1)
            } else {
                config.verbose
            };
            run_workflow(&config, workflow, inventory)
                .await
                .map_err(|e| (e, verbose))
        }
        Commands::Modules => {
            init_logging(&AppConfig::new(cli.verbose));
            list_modules();
            Ok(())
        }
    };

    if let Err((error, verbose)) = result {
        handle_fatal_error(error, verbose);
    }
}

fn load_config(
    settings: Option<PathBuf>,
    verbose: u8,
    timeout: Option<Duration>,
    debug: bool,
    json: bool,
) -> Result<AppConfig> {
    let mut config = match settings {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::default(),
    };
    config = config.with_verbose(verbose).with_debug(debug).with_json(json);
    if let Some(timeout) = timeout {
        config = config.with_default_timeout(timeout);
    }
    Ok(config)
}

async fn run_workflow(
    config: &AppConfig,
    workflow_path: PathBuf,
    inventory_path: PathBuf,
) -> Result<()> {
    let registry = ModuleRegistry::with_defaults();
    let inventory = load_inventory(&inventory_path)
        .with_context(|| format!("Failed to load inventory {}", inventory_path.display()))?;
    let workflow = load_workflow(&workflow_path, &registry, &inventory)
        .with_context(|| format!("Failed to load workflow {}", workflow_path.display()))?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running modules");
            signal.cancel();
        }
    });

    let mut ctx = WorkflowContext::new(config.execution_config(), Arc::new(ConsoleDisplay::new()))
        .with_cancellation(cancel);
    debug!(
        "Default module timeout: {}",
        humantime_serde::re::humantime::format_duration(config.default_timeout)
    );

    let outcome = workflow.run(&mut ctx).await;
    if config.json {
        println!("{}", serde_json::to_string_pretty(&outcome.processes)?);
    }

    outcome.into_result().map_err(hostflow::Error::from)?;
    info!("Workflow completed successfully");
    Ok(())
}

fn list_modules() {
    let registry = ModuleRegistry::with_defaults();
    for module in registry.modules() {
        println!("{}", module.name());
        if !module.description().is_empty() {
            println!("    {}", module.description());
        }
        for field in module.input_spec().fields() {
            let presence = match (&field.default, field.required) {
                (_, true) => "required".to_string(),
                (Some(default), false) => format!("default {}", default.debug_string()),
                (None, false) => "optional".to_string(),
            };
            println!(
                "    {:<18} {:<14} {:<18} {}",
                field.name,
                field.field_type.to_string(),
                presence,
                field.description
            );
        }
    }
}
