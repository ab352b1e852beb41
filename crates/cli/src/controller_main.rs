//! The Controller binary: runs inbox-processing cycles on a loop, or once
//! with `--run-once`, or dispatches a single typed task request with the
//! `task` subcommand.

use clap::{Parser, Subcommand, ValueEnum};
use controller::{ControllerConfig, ControllerEngine};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "controller", about = "Coordination platform Controller")]
struct Cli {
    /// Root directory the whole filesystem layout is computed from.
    #[arg(long)]
    project_root: Option<PathBuf>,

    /// TOML file overlaying defaults before environment and CLI flags.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run exactly one inbox cycle, then exit.
    #[arg(long)]
    run_once: bool,

    /// Scope a cycle to one team's inbox subtree.
    #[arg(long)]
    team: Option<String>,

    #[arg(long, default_value = "controller-1")]
    controller_id: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a typed request file (`{"skill": ..., "input": ...}`) and
    /// dispatch it through the task-based entry point.
    Task {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    project_root: Option<PathBuf>,
    controller_id: Option<String>,
    max_retries: Option<u32>,
    down_failure_threshold: Option<u32>,
    degraded_failure_threshold: Option<u32>,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ControllerConfig> {
    let mut file_config = FileConfig::default();
    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
        file_config = toml::from_str(&raw)?;
    }

    let project_root = cli
        .project_root
        .clone()
        .or(file_config.project_root)
        .unwrap_or_else(|| PathBuf::from("."));
    let controller_id = file_config.controller_id.unwrap_or_else(|| cli.controller_id.clone());

    let mut config = ControllerConfig::new(controller_id, project_root).apply_env();
    if let Some(v) = file_config.max_retries {
        config.max_retries = v;
    }
    if let Some(v) = file_config.down_failure_threshold {
        config.down_failure_threshold = v;
    }
    if let Some(v) = file_config.degraded_failure_threshold {
        config.degraded_failure_threshold = v;
    }
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }
    config.controller_id = cli.controller_id.clone();

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(2);
        }
    };
    let engine = ControllerEngine::new(config);

    if let Some(Commands::Task { file }) = &cli.command {
        let raw = tokio::fs::read_to_string(file).await?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let outcome = schema_validator::validate_controller_task(value.clone());
        if !outcome.ok {
            error!(errors = ?outcome.errors, "task request failed validation");
            std::process::exit(1);
        }
        let skill = value["skill"].as_str().unwrap_or_default().to_string();
        let input = value["input"].clone();
        match engine.handle_task(&skill, input).await {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            Err(err) => {
                error!(error = %err, skill = %skill, "task dispatch failed");
                std::process::exit(1);
            }
        }
    }

    if cli.run_once {
        match engine.process_inbox(cli.team.as_deref()).await {
            Ok(summary) => {
                info!(processed = summary.processed.len(), directives = summary.directive_paths.len(), "cycle complete");
                return Ok(());
            }
            Err(err) => {
                error!(error = %err, "controller cycle failed");
                std::process::exit(1);
            }
        }
    }

    info!("controller starting continuous loop");
    loop {
        match engine.process_inbox(cli.team.as_deref()).await {
            Ok(summary) => {
                info!(processed = summary.processed.len(), directives = summary.directive_paths.len(), "cycle complete");
            }
            Err(err) => {
                error!(error = %err, "controller cycle failed, continuing");
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}
