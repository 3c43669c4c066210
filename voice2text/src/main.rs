//! voice2text CLI - run and manage the transcription bot.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use voice2text::config::{API_KEY_ENV, TELEGRAM_TOKEN_ENV};
use voice2text::error::{BotError, DisplayError, ErrorContext, Result};
use voice2text::prelude::*;

/// voice2text - transcribes voice messages and lets users retranscribe them
#[derive(Parser)]
#[command(name = "voice2text")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "VOICE2TEXT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init(InitArgs),

    /// Start the bot
    Run(RunArgs),

    /// Show configuration summary and environment
    Status,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// Default model for first transcriptions (overrides config)
    #[arg(short, long, env = "VOICE2TEXT_MODEL")]
    model: Option<String>,

    /// Maximum events handled concurrently (overrides config)
    #[arg(long)]
    max_in_flight: Option<usize>,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", DisplayError(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "voice2text={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(config_path);
    match cli.command {
        Commands::Init(args) => cmd_init(args).await,
        Commands::Run(args) => cmd_run(args, &config_file).await,
        Commands::Status => cmd_status(&config_file).await,
        Commands::Config(args) => cmd_config(args, &config_file).await,
    }
}

/// Initialize configuration.
async fn cmd_init(args: InitArgs) -> Result<()> {
    let config_file = config_path();

    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    init_config()
        .await
        .map_err(|e| BotError::config(format!("failed to initialize config: {e}")))?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. export {TELEGRAM_TOKEN_ENV}=<token>");
    println!("  2. export {API_KEY_ENV}=<key>");
    println!("  3. voice2text run");

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
async fn read_config(config_file: &Path) -> Result<BotConfig> {
    if config_file.exists() {
        Ok(load_config_from(config_file).await?)
    } else {
        tracing::warn!(path = %config_file.display(), "config file not found, using defaults");
        Ok(BotConfig::default())
    }
}

/// Start the bot.
async fn cmd_run(args: RunArgs, config_file: &Path) -> Result<()> {
    tracing::info!("Starting voice2text...");

    let mut config = read_config(config_file).await?;
    if let Some(model) = args.model {
        config.transcription.default_model = model;
    }
    if let Some(max) = args.max_in_flight {
        config.gateway.max_in_flight = max;
    }

    let gateway = GatewayBuilder::new().bot_config(config).build().await?;

    println!("voice2text running. Press Ctrl+C to stop.\n");
    gateway.run().await
}

/// Show status.
async fn cmd_status(config_file: &Path) -> Result<()> {
    println!("voice2text Status\n");

    println!("Configuration:");
    println!("  Path:   {}", config_file.display());
    println!(
        "  Exists: {}",
        if config_file.exists() { "yes" } else { "no" }
    );

    if config_file.exists() {
        match load_config_from(config_file).await {
            Ok(config) => {
                println!("  Valid:  yes");
                println!();
                println!("Telegram:");
                println!(
                    "  Enabled:   {}",
                    if config.telegram.enabled { "yes" } else { "no" }
                );
                println!(
                    "  Allowlist: {}",
                    if config.telegram.allow_from.is_empty() {
                        "everyone".to_string()
                    } else {
                        config.telegram.allow_from.join(", ")
                    }
                );
                println!();
                println!("Transcription:");
                println!("  API base: {}", config.transcription.api_base);
                println!("  Default:  {}", config.transcription.default_model);
                for model in &config.transcription.models {
                    println!("  Model:    {} ({})", model.id, model.engine_model);
                }
                println!();
                println!("Controls:");
                println!("  Delete:     {}", config.controls.delete_emoji);
                println!("  Configure:  {}", config.controls.configure_emoji);
                println!("  Expire (s): {}", config.controls.affordance_ttl_secs);
            }
            Err(e) => {
                println!("  Valid:  no ({e})");
            }
        }
    }

    println!();
    println!("Environment:");
    print_env_status(TELEGRAM_TOKEN_ENV);
    print_env_status(API_KEY_ENV);

    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            if config_file.exists() {
                let content = tokio::fs::read_to_string(config_file)
                    .await
                    .with_context(|| format!("failed to read {}", config_file.display()))?;
                println!("{content}");
            } else {
                println!("Configuration file does not exist.");
                println!("Run 'voice2text init' to create one.");
            }
        }
        ConfigCommands::Validate => {
            if !config_file.exists() {
                println!("error: configuration file does not exist");
                return Ok(());
            }

            match load_config_from(config_file).await {
                Ok(config) => match config.validate() {
                    Ok(()) => println!("Configuration is valid"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("error: {e}"),
            }
        }
    }

    Ok(())
}

/// Print environment variable status.
fn print_env_status(name: &str) {
    let status = if std::env::var(name).is_ok() {
        "set"
    } else {
        "-"
    };
    println!("  {name}: {status}");
}
