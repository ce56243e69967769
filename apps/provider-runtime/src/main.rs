use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use provkit::ProviderRuntime;
use provkit_bootstrap::{CliArgs, RuntimeConfig, RuntimeConfigLoader};
use serde_json::Value;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod demo_provider;

use demo_provider::DirectoryProvider;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Provider Runtime - reference host for access providers
#[derive(Parser)]
#[command(name = "provider-runtime")]
#[command(about = "Provider Runtime - reference host for access providers")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the provider's Describe response
    Describe,
    /// Handle one event and print the response
    Invoke {
        /// Event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Validate configuration and provider health, then exit
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // defaults -> YAML (if provided) -> env (PROVKIT__*) -> CLI overrides
    let mut config = RuntimeConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    provkit_bootstrap::init_logging(&logging_config, &config.log_base_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let config = Arc::new(config);
    let runtime = build_runtime(Arc::clone(&config))?;

    match cli.command.unwrap_or(Commands::Describe) {
        Commands::Describe => {
            let out = runtime.handle(serde_json::json!({"type": "describe"}))?;
            print_json(&out)
        }
        Commands::Invoke { event } => {
            let raw = read_event(&event)?;
            let out = runtime.handle(raw)?;
            print_json(&out)
        }
        Commands::Check => check(&runtime),
    }
}

fn build_runtime(config: Arc<RuntimeConfig>) -> Result<ProviderRuntime<DirectoryProvider>> {
    let info: provkit::ProviderInfo = config.provider.clone().into();
    let loader = RuntimeConfigLoader::from_arc(config);
    let runtime = ProviderRuntime::new(DirectoryProvider::default(), &loader)
        .context("failed to initialize provider")?;
    tracing::info!("Provider runtime ready");
    Ok(runtime.with_info(info))
}

fn check(runtime: &ProviderRuntime<DirectoryProvider>) -> Result<()> {
    tracing::info!("Checking configuration…");
    let out = runtime.handle(serde_json::json!({"type": "describe"}))?;
    print_json(&out["diagnostics"])?;
    anyhow::ensure!(out["healthy"] == Value::Bool(true), "provider is unhealthy");
    println!("Configuration is valid");
    Ok(())
}

fn read_event(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read event file '{source}'"))?
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
