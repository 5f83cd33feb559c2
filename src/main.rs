// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use mangatl::app_config::{self, BackendKind, Config};
use mangatl::app_controller::Controller;
use mangatl::file_utils::FileManager;
use mangatl::key_rotation::RotationStrategy;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for BackendKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackend {
    Gemini,
    Mock,
}

impl From<CliBackend> for BackendKind {
    fn from(cli_backend: CliBackend) -> Self {
        match cli_backend {
            CliBackend::Gemini => BackendKind::Gemini,
            CliBackend::Mock => BackendKind::Mock,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate OCR dumps and write render plans
    Translate(TranslateArgs),

    /// Manage the API keys used for translation
    Keys {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: PathBuf,

        #[command(subcommand)]
        action: KeyAction,
    },

    /// Generate shell completions for mangatl
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Show every key with its usage
    List,
    /// Add a key
    Add {
        /// The API key
        key: String,
        /// Display name, must be unique
        name: String,
        /// Calls allowed per day
        #[arg(long, default_value_t = 1000)]
        daily_limit: u32,
    },
    /// Remove a key by name
    Remove { name: String },
    /// Enable or disable a key by name
    Toggle { name: String },
    /// Release every quarantined key
    Reset,
    /// Send a test request for every quarantined key
    Probe,
    /// Change the rotation strategy (round-robin, least-used, random)
    Strategy { strategy: RotationStrategy },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// OCR dump file or directory of dumps
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Directory for render plans, the cache and the run summary
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Translation backend to use
    #[arg(short, long, value_enum)]
    backend: Option<CliBackend>,

    /// Source language code (e.g., 'ja', 'ko', 'zh') or 'auto'
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'en', 'vi', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Extra instructions appended to every prompt
    #[arg(long, env = "MANGATL_CUSTOM_PROMPT")]
    custom_prompt: Option<String>,
}

/// mangatl - comic speech-bubble translation
///
/// Translates the text found in comic and manga speech bubbles with one
/// batched request per group of pages, and fits each translation back into
/// its bubble.
#[derive(Parser, Debug)]
#[command(name = "mangatl")]
#[command(version)]
#[command(about = "Comic speech-bubble translation tool")]
#[command(long_about = "mangatl translates OCR dumps of comic pages and writes a render plan per page.

EXAMPLES:
    mangatl translate chapter1/                    # Translate every dump in a folder
    mangatl translate -s ja -t en page01.json      # Japanese to English
    mangatl translate -b mock chapter1/            # Dry run without API calls
    mangatl keys add AIza... main                  # Add an API key
    mangatl keys list                              # Show key usage
    mangatl completions bash > mangatl.bash        # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the config file doesn't
    exist, a default one will be created automatically. API keys live in a
    separate file named by credentials.file.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                color,
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Max level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "mangatl", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(args).await,
        Commands::Keys { config_path, action } => run_keys(&config_path, action).await,
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(&options.config_path)?;

    // Override config with CLI options if provided
    if let Some(backend) = &options.backend {
        config.translation.backend = backend.clone().into();
    }
    if let Some(source_lang) = &options.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(prompt) = &options.custom_prompt {
        config.translation.custom_prompt = Some(prompt.clone());
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }

    log::set_max_level(config.log_level.to_level_filter());

    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| FileManager::default_output_dir(&options.input_path, &config.target_language));

    let controller = Controller::with_config(config)?;
    let report = controller.run(options.input_path.clone(), output_dir.clone()).await?;

    let failed = report.pages.iter().filter(|p| p.error.is_some()).count();
    if failed > 0 {
        warn!("{} of {} pages failed, see {}", failed, report.pages.len(), output_dir.display());
    } else {
        info!("Wrote {} pages to {}", report.pages.len(), output_dir.display());
    }

    Ok(())
}

async fn run_keys(config_path: &Path, action: KeyAction) -> Result<()> {
    let config = Config::load_or_create(config_path)?;
    log::set_max_level(config.log_level.to_level_filter());
    let controller = Controller::with_config(config)?;
    let keys = controller.load_keys()?;

    match action {
        KeyAction::List => {
            println!("Rotation strategy: {}", keys.strategy());
            for status in keys.status() {
                let state = if status.is_placeholder {
                    "placeholder"
                } else if status.quarantined {
                    "quarantined"
                } else if !status.is_active {
                    "disabled"
                } else {
                    "active"
                };
                println!(
                    "{:<20} {:<14} {:>5}/{:<5} ({:>5.1}%) {:<12} last used: {}",
                    status.name,
                    status.key_preview,
                    status.usage_count,
                    status.daily_limit,
                    status.usage_percentage,
                    state,
                    status
                        .last_used
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
        KeyAction::Add { key, name, daily_limit } => {
            keys.add_credential(&key, &name, daily_limit)
                .with_context(|| format!("Failed to add key {}", name))?;
        }
        KeyAction::Remove { name } => {
            keys.remove_credential(&name)
                .with_context(|| format!("Failed to remove key {}", name))?;
        }
        KeyAction::Toggle { name } => {
            let active = keys
                .toggle_credential(&name)
                .with_context(|| format!("Failed to toggle key {}", name))?;
            println!("{} is now {}", name, if active { "active" } else { "disabled" });
        }
        KeyAction::Reset => {
            keys.reset_quarantine().context("Failed to reset quarantine")?;
        }
        KeyAction::Probe => {
            let released = controller.probe_keys().await?;
            println!("{} quarantined keys released", released);
        }
        KeyAction::Strategy { strategy } => {
            keys.set_strategy(strategy).context("Failed to change rotation strategy")?;
        }
    }

    Ok(())
}
