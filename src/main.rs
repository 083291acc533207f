use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use tracing::{info, Level};

use prior_art::llm::LlmClient;
use prior_art::{Handoff, Pipeline, PipelineConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env
    let _ = dotenv::dotenv();
    let level = dotenv::var("LOG_LEVEL")
        .ok()
        .and_then(|l| Level::from_str(&l).ok())
        .unwrap_or(Level::DEBUG);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let handoff_path = std::env::args()
        .nth(1)
        .or_else(|| dotenv::var("HANDOFF_PATH").ok())
        .map(PathBuf::from)
        .context("usage: prior-art <handoff.json> (or set HANDOFF_PATH)")?;
    let raw = std::fs::read_to_string(&handoff_path)
        .with_context(|| format!("Failed to read handoff {:?}", handoff_path))?;
    let handoff: Handoff = serde_json::from_str(&raw).context("Failed to parse handoff JSON")?;

    let config = PipelineConfig::from_env();
    let llm_client = LlmClient::from_env()?;
    info!("LLM client initialized");
    let services = Services::from_config(&config, llm_client).await?;
    let pipeline = Pipeline::new(services, config);

    let outcome = pipeline.run_from_document(&handoff).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
