use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use wp_publisher::config;
use wp_publisher::model::StateChange;
use wp_publisher::registry::Registry;
use wp_publisher::states::StateStore;
use wp_publisher::status::StatusReport;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Publish entity state changes read from stdin (one JSON object per line) to WordPress"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// JSON object of entity id -> state loaded before any instance starts
    #[arg(long)]
    initial_states: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let states = Arc::new(StateStore::new());
    if let Some(path) = &args.initial_states {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let initial: HashMap<String, String> =
            serde_json::from_str(&raw).context("initial states must be a JSON object of strings")?;
        for (entity_id, state) in &initial {
            states.set(entity_id, state);
        }
        info!(count = initial.len(), "loaded initial states");
    }

    let mut registry = Registry::new(Arc::clone(&states));
    for entry in &cfg.instances {
        let id = registry.setup(entry.clone()).await?;
        info!(%id, url = %entry.wp_url, "publisher ready");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut status_tick =
        tokio::time::interval(Duration::from_secs(cfg.app.status_interval_seconds));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => ingest(&states, &line),
                Ok(None) => {
                    info!("input closed");
                    break;
                }
                Err(err) => {
                    error!(?err, "failed to read input");
                    break;
                }
            },
            _ = status_tick.tick() => log_reports(&registry.status_reports()),
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    log_reports(&registry.status_reports());
    registry.unload_all();
    Ok(())
}

fn ingest(states: &StateStore, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<StateChange>(line) {
        Ok(change) => states.apply(&change),
        Err(err) => warn!(%err, line, "ignoring malformed state change"),
    }
}

fn log_reports(reports: &[StatusReport]) {
    for report in reports {
        info!(
            unique_id = %report.unique_id,
            state = %report.state,
            last_published_entity = ?report.last_published_entity,
            last_published_time = ?report.last_published_time,
            last_publish_error = ?report.last_publish_error,
            "publisher status"
        );
    }
}
