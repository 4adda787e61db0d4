//! Mi Flora exporter - polls soil sensors and serves Prometheus metrics.
//!
//! Run with: `cargo run -p miflora-exporter -- plants.json`

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use miflora_core::{ConnectionConfig, Device, ScanOptions};
use miflora_exporter::{Collector, Metrics, PlantRegistry, api, discovery};

/// Prometheus exporter for nearby miflora devices.
#[derive(Parser, Debug)]
#[command(name = "miflora-exporter")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON file mapping probe addresses to plant names.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Scan for probes not in the registry, print them and exit.
    #[arg(long, overrides_with = "no_scan")]
    scan: bool,

    /// Run the exporter (default).
    #[arg(long = "no-scan", overrides_with = "scan")]
    no_scan: bool,

    /// Port for the metrics HTTP server.
    #[arg(short, long, default_value_t = 9004, env = "MIFLORA_PORT")]
    port: u16,

    /// Seconds between polling cycles.
    #[arg(long, default_value_t = 600, env = "MIFLORA_INTERVAL")]
    interval: u64,

    /// Seconds to scan for probes.
    #[arg(long, default_value_t = 10, env = "MIFLORA_SCAN_TIMEOUT")]
    scan_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("miflora_exporter=info".parse()?)
                .add_directive("miflora_core=info".parse()?),
        )
        .init();

    let registry = PlantRegistry::load(&args.file)?;
    info!("Loaded {} plant(s) from {:?}", registry.len(), args.file);

    if args.scan && !args.no_scan {
        let options = ScanOptions::default().duration_secs(args.scan_timeout);
        discovery::run(&registry, options).await?;
        return Ok(());
    }

    run_exporter(args, registry).await
}

async fn run_exporter(args: Args, registry: PlantRegistry) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("started prometheus exporter on port {}", args.port);

    let cancel = CancellationToken::new();

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                signal_cancel.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let config = connection_config(&args);
    let collector = Collector::from_registry(&registry, metrics, |address| {
        Device::new(address, config.clone())
    })
    .with_interval(Duration::from_secs(args.interval));

    supervise(collector.run(cancel.clone()), server, cancel).await
}

/// Connection settings for the requested poll interval.
///
/// Sensor data is never cached for longer than one interval, so every cycle
/// reads the sensor again.
fn connection_config(args: &Args) -> ConnectionConfig {
    let defaults = ConnectionConfig::default();
    let interval = Duration::from_secs(args.interval);
    let cache_timeout = interval.min(defaults.cache_timeout);
    defaults
        .scan_timeout(Duration::from_secs(args.scan_timeout))
        .cache_timeout(cache_timeout)
}

/// Run the collector until it stops or the metrics server exits.
///
/// Whichever finishes first cancels the other.
async fn supervise<C>(
    collector: C,
    mut server: JoinHandle<std::io::Result<()>>,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    C: Future<Output = ()>,
{
    let result = tokio::select! {
        _ = collector => {
            cancel.cancel();
            server.await
        }
        result = &mut server => {
            cancel.cancel();
            result
        }
    };
    server_outcome(result)
}

fn server_outcome(result: Result<std::io::Result<()>, JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Metrics server failed: {}", e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
