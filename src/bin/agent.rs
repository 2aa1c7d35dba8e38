use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use print_relay::agent::{printer::LpPrinter, run, QueueClient};
use print_relay::config::AgentConfig;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting print dispatch agent");

    // Load configuration
    let config = AgentConfig::from_env().expect("Failed to load configuration");
    if config.agent_token.is_empty() {
        panic!("AGENT_TOKEN is required");
    }

    let work_dir = Path::new(&config.work_dir);
    std::fs::create_dir_all(work_dir).expect("Failed to create work directory");

    let client = QueueClient::new(
        &config.server_base_url,
        &config.agent_token,
        &config.agent_id,
    )
    .expect("Failed to build queue client");

    let printer = LpPrinter::new(&config.printer_name, config.copies);

    tracing::info!(
        base_url = %config.server_base_url,
        agent_id = %config.agent_id,
        printer = %config.printer_name,
        poll_interval_seconds = config.poll_interval_seconds,
        "Agent ready, starting poll loop"
    );

    run(
        &client,
        &printer,
        work_dir,
        Duration::from_secs(config.poll_interval_seconds),
    )
    .await
}
