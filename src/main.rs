//! `ecoops` command line: serve the streaming HTTP endpoint, or analyze one report locally.
//!
//! Usage:
//!   ecoops serve --bind 0.0.0.0:3000
//!   ecoops analyze "Black smoke over the river by the mill"
//!   ecoops analyze --file report.txt

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecoops_pipeline::{
    ChatCompletionsClient, Config, IncidentReport, ModelBackend, PipelineRun, StreamEvent, config,
    event_stream, http, write_ndjson,
};
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser)]
#[command(name = "ecoops")]
#[command(about = "EcoOps incident analysis pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overriding config and ECOOPS_HTTP_BIND
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Analyze one report and print NDJSON events to stdout
    Analyze {
        /// Report text; read from stdin when neither this nor --file is given
        report: Option<String>,
        #[arg(long, conflicts_with = "report")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing before Config::load, which logs its own warnings.
    config::load_env_file();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config::log_filter(|key| {
            std::env::var(key).ok()
        })))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let mut config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let backend = build_backend(&config).ok();
            http::serve(&config, backend).await?;
            Ok(())
        }
        Commands::Analyze { report, file } => {
            let text = read_report(report, file).await?;
            let report = IncidentReport::new(text)?;
            let backend = build_backend(&config)?;
            let run = PipelineRun::new(&report, backend);
            info!(run_id = %run.id(), "analyzing report");

            let mut stdout = tokio::io::stdout();
            let last = write_ndjson(event_stream(run), &mut stdout).await?;
            if let Some(StreamEvent::Error { error }) = last {
                eprintln!("Analysis failed: {}", error);
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn build_backend(config: &Config) -> Result<Arc<dyn ModelBackend>> {
    let provider = config.require_provider()?.clone();
    info!("using {} model {}", provider.kind.label(), provider.model);
    let client = ChatCompletionsClient::new(provider)?;
    Ok(Arc::new(client))
}

async fn read_report(arg: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if let Some(path) = file {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read report from {}", path.display()));
    }
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read report from stdin")?;
    Ok(text)
}
