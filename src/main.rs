//! homestore -- bucket/object storage server backed by Redis.
//!
//! On SIGTERM/SIGINT the server stops accepting connections and waits up to
//! `server.shutdown_timeout` seconds for in-flight requests before exiting.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use homestore::backend::{KvBackend, MemoryBackend, RedisBackend};
use homestore::config::{BackendEngine, Config, ConfigSource, LoggingConfig};
use homestore::engine::ObjectStore;

/// Command-line arguments for the homestore server.
#[derive(Parser, Debug)]
#[command(
    name = "homestore",
    version,
    about = "Bucket/object storage server backed by Redis"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "homestore.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

/// Initialize tracing.  `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect_backend(config: &Config) -> anyhow::Result<Arc<dyn KvBackend>> {
    match config.backend.engine {
        BackendEngine::Redis => {
            let backend = RedisBackend::connect(&config.backend.redis.url).await?;
            Ok(Arc::new(backend))
        }
        BackendEngine::Memory => {
            warn!("Using the in-memory backend; data is lost on exit");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, source) = homestore::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    match source {
        ConfigSource::File => info!("Configuration loaded from {}", cli.config),
        ConfigSource::Defaults => info!("No configuration file at {}, using defaults", cli.config),
    }

    let bind_addr = cli.bind.clone().unwrap_or_else(|| config.server.bind_addr());

    if config.observability.metrics {
        homestore::metrics::init_metrics()?;
        homestore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // An unreachable backend is fatal here rather than on every request.
    let backend = connect_backend(&config).await?;
    let store = ObjectStore::new(backend);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(homestore::AppState { config, store });
    let app = homestore::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("homestore listening on {}", bind_addr);

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    });

    // Starts counting only once a signal has arrived.
    let drain_deadline = async move {
        match signalled_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline => {
            warn!(
                "In-flight requests still running after {}s, exiting",
                shutdown_timeout.as_secs()
            );
        }
    }

    info!("homestore shut down");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
