//! Faucet service binary

use clap::Parser;
use spout_common::utils::logging::init_logging;
use spout_faucet::api::{router, AppState};
use spout_faucet::clock::{Clock, SystemClock};
use spout_faucet::metrics::FaucetMetrics;
use spout_faucet::throttle::RequestThrottle;
use spout_faucet::{ClaimStore, FaucetConfig, FaucetService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "FAUCET_CONFIG")]
    config: Option<String>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// Cooldown between claims of one account (seconds)
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Database path
    #[arg(long)]
    db_path: Option<String>,

    /// Keep all state in memory
    #[arg(long, conflicts_with = "db_path")]
    in_memory: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => FaucetConfig::load(path)?,
        None => FaucetConfig::from_env(),
    };

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(cooldown) = args.cooldown_secs {
        config.cooldown_secs = Some(cooldown);
    }

    if let Some(db_path) = args.db_path {
        config.db_path = Some(db_path);
    }

    if args.in_memory {
        config.db_path = None;
    }

    if args.debug {
        config.logging.level = "debug".to_string();
    }

    let _log_guard = init_logging(&config.logging)?;

    info!("Starting Spout Faucet v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let params = config.params()?;

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  Claim amount: {}", params.claim_amount);
    info!("  Cooldown: {}s", params.cooldown_secs);
    info!("  Lifetime claim limit: {}", params.lifetime_claim_limit);
    info!("  Max supply: {}", params.max_supply);
    info!("  Per-IP request limit: {}/min", config.max_requests_per_minute);

    // Initialize database
    let store = match &config.db_path {
        Some(path) => {
            let store = ClaimStore::open(path)?;
            info!("Database initialized at: {}", path);
            Some(store)
        }
        None => {
            warn!("No database path configured, state will not survive a restart");
            None
        }
    };

    // Create faucet service
    let service = Arc::new(FaucetService::from_config(&config, store)?);
    let status = service.status().await?;
    info!(
        "Faucet service initialized: reserve {} holds {}, paused={}",
        status.reserve, status.reserve_balance, status.paused
    );
    if let Some(stats) = &status.statistics {
        info!("Previous statistics:");
        info!("  Total distributions: {}", stats.total_distributions);
        info!("  Unique addresses: {}", stats.unique_addresses);
    }

    let metrics = if config.metrics_enabled {
        let metrics = Arc::new(FaucetMetrics::new()?);
        metrics.set_reserve_balance(status.reserve_balance);
        metrics.set_paused(status.paused);
        Some(metrics)
    } else {
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState {
        service: service.clone(),
        clock: clock.clone(),
        metrics,
        throttle: Arc::new(RequestThrottle::per_minute(config.max_requests_per_minute)?),
    };

    // Build router
    let mut app = router(state);

    // Add CORS if enabled
    if config.cors_enabled {
        let origins = if config.allowed_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(
                config
                    .allowed_origins
                    .iter()
                    .filter_map(|o| o.parse().ok())
                    .collect::<Vec<_>>(),
            )
        };
        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any);

        app = app.layer(cors);
        info!("CORS enabled");
    }

    // Start cleanup task
    let cleanup_service = service.clone();
    let retention_days = config.history_retention_days;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(86400)); // Daily cleanup
        loop {
            interval.tick().await;
            match cleanup_service.cleanup_old_records(retention_days, clock.now()) {
                Ok(count) => info!("Cleaned up {} old records", count),
                Err(e) => warn!("Cleanup failed: {:?}", e),
            }
        }
    });

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Err(e) = service.flush().await {
        error!("Failed to flush database: {}", e);
    }

    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
