// IoT Device API Gateway Binary
//
// Entry point for the gateway HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use gateway_api::{ApiServer, GatewayConfig};
use observability::{init_tracing, LogFormat, TracingConfig};

#[derive(Parser)]
#[command(name = "apigw")]
#[command(version)]
#[command(about = "HTTP gateway for IoT device deployments and registry images", long_about = None)]
struct Cli {
    /// Configuration file (TOML); apigw.toml is used if present
    #[arg(short, long, env = "APIGW_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration file
    #[arg(short, long, env = "APIGW_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log output format (text or json)
    #[arg(long, env = "APIGW_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    init_tracing(&TracingConfig {
        format: config.log_format,
        ..Default::default()
    })
    .context("initialising tracing")?;

    info!(
        listen = %config.listen,
        namespace = %config.namespace,
        registry = %config.registry.url,
        error_status = ?config.error_status,
        "Starting APIGW"
    );

    let server = ApiServer::new(&config).context("building API server")?;
    server.run_until_signalled().await.context("serving HTTP")?;

    info!("APIGW stopped");
    Ok(())
}
