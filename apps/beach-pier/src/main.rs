use anyhow::Result;
use beach_pier::{telemetry::Telemetry, Cli, PierServer, ServerConfig};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    let telemetry = Telemetry::init(&config.log_filter)?;

    info!(
        listen_addr = %config.listen_addr,
        outbound_buffer = config.outbound_buffer,
        "starting beach-pier"
    );

    let server = PierServer::bind(&config, Some(telemetry.metrics_handle())).await?;
    server.run(shutdown_signal()).await?;

    if !config.shutdown_grace.is_zero() {
        info!(
            grace_seconds = config.shutdown_grace.as_secs(),
            "shutdown signal received; sleeping for graceful period"
        );
        tokio::time::sleep(config.shutdown_grace).await;
    }
    info!("graceful shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
