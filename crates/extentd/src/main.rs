use anyhow::{Context, Result};
use clap::Parser;
use extent::FlushPolicy;
use extentconf::{ExtentConfig, LogLevel};
use extentd::telemetry;
use extentd::ExtentServer;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// The extentfs extent server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on [default: 8989]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Directory holding persisted extents [default: .extents]
    #[arg(short = 'd', long)]
    extent_dir: Option<PathBuf>,

    /// Which extents to write when a client disconnects (full or dirty)
    #[arg(long)]
    flush_policy: Option<FlushPolicy>,

    /// Config file to use instead of ./extentfs.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity: off, error, warn, info, debug or trace
    #[arg(short, long)]
    log_level: Option<LogLevel>,

    /// OTLP gRPC endpoint for OpenTelemetry (e.g., "127.0.0.1:4317")
    #[arg(long)]
    otlp_endpoint: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut ExtentConfig) {
        if let Some(port) = self.port {
            config.bind.port = port;
        }
        if let Some(host) = self.host {
            config.bind.host = host;
        }
        if let Some(dir) = self.extent_dir {
            config.paths.extent_dir = dir;
        }
        if let Some(policy) = self.flush_policy {
            config.store.flush_policy = policy;
        }
        if let Some(level) = self.log_level {
            config.telemetry.log_level = level.as_directive().to_string();
        }
        if let Some(endpoint) = self.otlp_endpoint {
            config.telemetry.otlp_endpoint = Some(endpoint);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        ExtentConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    cli.apply(&mut config);

    telemetry::init(
        &config.telemetry.log_level,
        config.telemetry.otlp_endpoint.as_deref(),
    )
    .context("Failed to initialize logging")?;

    tracing::info!("extentd {} starting", env!("CARGO_PKG_VERSION"));

    let extent_dir = &config.paths.extent_dir;
    let server = ExtentServer::open(extent_dir, config.store.flush_policy)
        .with_context(|| format!("Cannot use extent directory {}", extent_dir.display()))?;

    let addr = config.bind.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    server.run(listener, shutdown).await.context("Server failed")?;

    tracing::info!("extentd shutdown complete");
    telemetry::shutdown();
    Ok(())
}

/// Cancel `shutdown` on SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let sigterm = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("Failed to listen for Ctrl+C: {e}");
                return;
            }
            tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = sigterm => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
    shutdown.cancel();
}
