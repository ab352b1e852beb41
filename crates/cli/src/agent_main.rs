//! The generic agent-runner binary: selects a [`ReportGenerator`] by
//! `--kind` and drives [`agent_runtime::AgentRunner`]'s lifecycle on a
//! loop, or once with `--run-once`.

use agent_runtime::{
    AgentConfig, AgentRunner, AuthReportGenerator, BackendReportGenerator, MetricsReportGenerator,
    SheetsReportGenerator, UiReportGenerator,
};
use clap::{Parser, ValueEnum};
use platform_core::{RequestPayload, TaskEnvelope};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent-runner", about = "Generic agent runner")]
struct Cli {
    #[arg(long, value_enum)]
    kind: AgentKind,

    #[arg(long)]
    agent_id: Option<String>,

    #[arg(long)]
    team_id: Option<String>,

    #[arg(long)]
    project_root: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[arg(long)]
    run_once: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum AgentKind {
    Sheets,
    Auth,
    Backend,
    Metrics,
    Ui,
}

#[derive(Copy, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    agent_id: Option<String>,
    team_id: Option<String>,
    project_root: Option<PathBuf>,
    rate_limit_per_minute: Option<u32>,
    rate_limit_per_day: Option<u32>,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
    }
}

fn resource_id(task: &TaskEnvelope) -> String {
    match &task.request {
        RequestPayload::SpreadsheetChange { sheet, .. } => format!("sheet:{}", sheet.spreadsheet_id),
        RequestPayload::AuthOperation { target, .. } => format!("auth:{target}"),
        RequestPayload::BackendRequest { op, .. } => format!("backend:{op}"),
        RequestPayload::MetricsRequest { metric, .. } => format!("metrics:{metric}"),
        RequestPayload::UiRender { component, .. } => format!("ui:{component}"),
    }
}

fn load_config(cli: &Cli, default_agent_id: &str) -> anyhow::Result<AgentConfig> {
    let mut file_config = FileConfig::default();
    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
        file_config = toml::from_str(&raw)?;
    }

    let agent_id = cli.agent_id.clone().or(file_config.agent_id).unwrap_or_else(|| default_agent_id.to_string());
    let team_id = cli.team_id.clone().or(file_config.team_id).unwrap_or_else(|| format!("{default_agent_id}-team"));
    let project_root = cli
        .project_root
        .clone()
        .or(file_config.project_root)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = AgentConfig::new(agent_id, team_id, project_root).apply_env();
    if let Some(v) = file_config.rate_limit_per_minute {
        config.rate_limit_per_minute = v;
    }
    if let Some(v) = file_config.rate_limit_per_day {
        config.rate_limit_per_day = v;
    }
    Ok(config)
}

async fn run_loop<G: agent_runtime::ReportGenerator>(runner: AgentRunner<G>, run_once: bool) -> anyhow::Result<()> {
    if run_once {
        match runner.run_once().await {
            Ok(outcome) => {
                info!(outcome = ?outcome, "cycle complete");
                return Ok(());
            }
            Err(err) => {
                error!(error = %err, "agent cycle failed");
                std::process::exit(1);
            }
        }
    }

    loop {
        if let Err(err) = runner.run_once().await {
            error!(error = %err, "agent cycle failed, continuing");
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let default_agent_id = match cli.kind {
        AgentKind::Sheets => "sheets-agent",
        AgentKind::Auth => "auth-agent",
        AgentKind::Backend => "backend-agent",
        AgentKind::Metrics => "metrics-agent",
        AgentKind::Ui => "ui-agent",
    };
    let config = match load_config(&cli, default_agent_id) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(2);
        }
    };

    match cli.kind {
        AgentKind::Sheets => {
            let agent_id = config.agent_id.clone();
            let runner = AgentRunner::new(config, SheetsReportGenerator::new(agent_id), resource_id).with_rate_limiter();
            run_loop(runner, cli.run_once).await
        }
        AgentKind::Auth => {
            let agent_id = config.agent_id.clone();
            let runner = AgentRunner::new(config, AuthReportGenerator::new(agent_id), resource_id);
            run_loop(runner, cli.run_once).await
        }
        AgentKind::Backend => {
            let agent_id = config.agent_id.clone();
            let runner = AgentRunner::new(config, BackendReportGenerator::new(agent_id), resource_id);
            run_loop(runner, cli.run_once).await
        }
        AgentKind::Metrics => {
            let agent_id = config.agent_id.clone();
            let runner = AgentRunner::new(config, MetricsReportGenerator::new(agent_id), resource_id);
            run_loop(runner, cli.run_once).await
        }
        AgentKind::Ui => {
            let agent_id = config.agent_id.clone();
            let runner = AgentRunner::new(config, UiReportGenerator::new(agent_id), resource_id);
            run_loop(runner, cli.run_once).await
        }
    }
}
