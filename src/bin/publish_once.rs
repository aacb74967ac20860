use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use wp_publisher::config;
use wp_publisher::publisher::Publisher;
use wp_publisher::status::StatusReport;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Publish a single entity state through one configured instance and print its status"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Index of the instance in the config file
    #[arg(long, default_value = "0")]
    instance: usize,

    /// Entity id, e.g. sensor.temperature
    entity_id: String,

    /// State value to publish
    state: String,
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
    let entry = cfg
        .instances
        .get(args.instance)
        .ok_or_else(|| anyhow!("config has no instance #{}", args.instance))?;

    let publisher = Publisher::from_config(entry.publisher_config())?;
    info!(entity_id = %args.entity_id, url = %entry.wp_url, "publishing once");
    let result = publisher.publish(&args.entity_id, &args.state).await;

    let report = StatusReport::new(&entry.unique_id(), &publisher.outcome());
    println!("{}", serde_json::to_string_pretty(&report)?);
    result?;
    Ok(())
}
