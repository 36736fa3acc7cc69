//! Gateway binary: bridges browser socket connections to RPC sessions
//! opened against a discovery URL.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qim_server::{GatewayConfig, GatewayServer};
use qim_session::http::HttpConnector;

/// Socket-channel to RPC session gateway.
#[derive(Parser, Debug)]
#[command(name = "qim-gateway", about = "Socket-channel to RPC session gateway")]
struct Cli {
    /// Discovery URL every connection opens its session against.
    discovery_url: String,

    /// Host to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Socket channel port (0 for auto-assign).
    #[arg(long, default_value_t = 8002)]
    socket_port: u16,

    /// Static asset, health and metrics port (0 for auto-assign).
    #[arg(long, default_value_t = 8001)]
    http_port: u16,

    /// Directory holding socket.io.js and qimessaging.js.
    #[arg(long, default_value = ".")]
    assets_dir: PathBuf,

    /// Maximum concurrent calls per connection.
    #[arg(long, default_value_t = 32)]
    max_in_flight: usize,

    /// Per-call timeout in seconds (unbounded when omitted).
    #[arg(long)]
    call_timeout_secs: Option<u64>,

    /// Log level filter, overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            discovery_url: self.discovery_url,
            host: self.host,
            socket_port: self.socket_port,
            http_port: self.http_port,
            assets_dir: self.assets_dir,
            max_in_flight: self.max_in_flight,
            call_timeout_secs: self.call_timeout_secs,
            ..GatewayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if args.json_logs {
        qim_core::logging::init_json_subscriber(&args.log_level);
    } else {
        qim_core::logging::init_subscriber(&args.log_level);
    }

    let metrics = qim_server::metrics::install_recorder().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "metrics recorder unavailable, /metrics will be empty");
        qim_server::metrics::detached_handle()
    });

    let config = args.into_config();
    tracing::info!(
        discovery_url = %config.discovery_url,
        assets_dir = %config.assets_dir.display(),
        "starting gateway"
    );

    let server = GatewayServer::new(config, Arc::new(HttpConnector::new()), metrics);
    let handle = server
        .listen()
        .await
        .context("Failed to bind gateway listeners")?;

    tracing::info!(
        socket = %handle.socket_addr,
        http = %handle.http_addr,
        "gateway ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn discovery_url_is_required() {
        let err = Cli::try_parse_from(["qim-gateway"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["qim-gateway", "tcp://127.0.0.1:9559"]).unwrap();
        assert_eq!(cli.discovery_url, "tcp://127.0.0.1:9559");
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.socket_port, 8002);
        assert_eq!(cli.http_port, 8001);
        assert_eq!(cli.assets_dir, PathBuf::from("."));
        assert_eq!(cli.max_in_flight, 32);
        assert_eq!(cli.call_timeout_secs, None);
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn overrides() {
        let cli = Cli::try_parse_from([
            "qim-gateway",
            "http://robot.local:8080",
            "--socket-port",
            "9002",
            "--http-port",
            "9001",
            "--assets-dir",
            "/srv/qim",
            "--call-timeout-secs",
            "15",
            "--max-in-flight",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.socket_port, 9002);
        assert_eq!(cli.http_port, 9001);
        assert_eq!(cli.assets_dir, PathBuf::from("/srv/qim"));
        assert_eq!(cli.call_timeout_secs, Some(15));
        assert_eq!(cli.max_in_flight, 4);
    }

    #[test]
    fn into_config_carries_cli_values() {
        let cli = Cli::try_parse_from([
            "qim-gateway",
            "http://robot.local:8080",
            "--call-timeout-secs",
            "5",
        ])
        .unwrap();
        let config = cli.into_config();
        assert_eq!(config.discovery_url, "http://robot.local:8080");
        assert_eq!(config.call_timeout(), Some(std::time::Duration::from_secs(5)));
        assert_eq!(config.socket_addr(), "0.0.0.0:8002");
        assert_eq!(config.http_addr(), "0.0.0.0:8001");
        assert_eq!(config.ping_interval_secs, GatewayConfig::default().ping_interval_secs);
    }
}
