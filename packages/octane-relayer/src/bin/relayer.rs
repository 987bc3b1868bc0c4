//! Octane Relayer binary.

use octane_relayer::blockhash::run_refresher;
use octane_relayer::{create_router, AppState, Config, FeePayerSigner};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Octane Relayer");

    let config = Config::load().unwrap_or_else(|e| {
        error!(error = %e, "FATAL: invalid configuration");
        std::process::exit(1);
    });
    let signer = FeePayerSigner::from_env().unwrap_or_else(|e| {
        error!(error = %e, "FATAL: set RELAYER_SECRET_KEY to the fee payer keypair");
        std::process::exit(1);
    });

    info!(
        rpc = %config.rpc_url,
        fee_tokens = config.endpoints.transfer.tokens.len(),
        max_signatures = config.max_signatures,
        "Configuration loaded"
    );

    let bind_address = config.bind_address.clone();
    let refresh_interval = Duration::from_millis(config.blockhash.refresh_interval_ms);
    let state = Arc::new(AppState::new(config, signer)?);

    if let Err(e) = state.blockhashes.refresh(state.ledger.as_ref()).await {
        warn!(error = %e, "Initial blockhash fetch failed, will retry in background");
    }

    let cancel = CancellationToken::new();
    let refresher = tokio::spawn(run_refresher(
        Arc::clone(&state.blockhashes),
        Arc::clone(&state.ledger),
        Arc::clone(&state.guard),
        refresh_interval,
        cancel.clone(),
    ));

    info!(fee_payer = %state.pipeline.fee_payer(), "Relayer ready");

    let app = create_router(state.clone());

    info!(address = %bind_address, "Listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- Graceful shutdown: stop the refresher, drop tracked identities ---
    info!("HTTP server stopped, stopping blockhash refresher");
    cancel.cancel();
    if let Err(e) = refresher.await {
        error!(error = %e, "Blockhash refresher task failed");
    }
    state.guard.clear();

    info!("Relayer shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
