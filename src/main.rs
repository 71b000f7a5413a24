use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, StoreBackend};
use gatekeeper::http::HttpServer;
use gatekeeper::ratelimit::{CounterStore, InMemoryCounterStore, RateLimiter, RedisCounterStore};

/// Per-client request admission gate.
#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version)]
#[command(about = "Fixed-window per-client rate limiting in front of an HTTP service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Maximum requests per client per window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,

    /// Keep counters in process memory instead of Redis
    #[arg(long)]
    memory: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut GatekeeperConfig) {
        if let Some(addr) = self.listen {
            config.server.listen_addr = addr;
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if let Some(url) = &self.redis_url {
            config.store.redis_url = url.clone();
        }
        if self.memory {
            config.store.backend = StoreBackend::Memory;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting Gatekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => GatekeeperConfig::from_file(path)?,
        None => GatekeeperConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    info!(
        listen_addr = %config.server.listen_addr,
        limit = config.rate_limiting.limit,
        window_secs = config.rate_limiting.window_secs,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    match config.store.backend {
        StoreBackend::Redis => {
            let store =
                RedisCounterStore::connect(&config.store.redis_url, config.store.timeout()).await?;
            run(&config, Arc::new(store)).await
        }
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryCounterStore::new());
            spawn_sweeper(Arc::clone(&store), config.policy()?.window());
            run(&config, store).await
        }
    }
}

async fn run<S: CounterStore + 'static>(
    config: &GatekeeperConfig,
    store: Arc<S>,
) -> anyhow::Result<()> {
    let rate_limiter = RateLimiter::new(store, config.policy()?)
        .with_store_timeout(config.store.timeout())
        .with_key_prefix(config.rate_limiting.key_prefix.clone());
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.listen_addr, Arc::new(rate_limiter));
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatekeeper stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Drop expired in-memory counters once per window.
fn spawn_sweeper(store: Arc<InMemoryCounterStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged = purged, remaining = store.len(), "Purged expired counters");
            }
        }
    });
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
