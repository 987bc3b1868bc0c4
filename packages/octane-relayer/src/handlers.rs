//! HTTP request handlers.

use crate::metrics::METRICS;
use crate::middleware::RequestId;
use crate::response::{
    BlockhashResponse, ConfigResponse, HealthResponse, TransferRequest, TransferResponse,
};
use crate::state::AppState;
use crate::Error;
use axum::extract::{Request, State};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// A base58 transaction at the wire size limit is under 2 KiB.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Fee payer and fee schedule clients need to build a transaction.
pub async fn config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ConfigResponse {
        fee_payer: *state.pipeline.fee_payer(),
        config: state.config.clone(),
    })
}

/// Current blockhash. Fetched on demand until the refresher has run.
pub async fn blockhash(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BlockhashResponse>, Error> {
    let info = match state.blockhashes.latest() {
        Some(info) => info,
        None => state.blockhashes.refresh(state.ledger.as_ref()).await?,
    };
    Ok(Json(BlockhashResponse { blockhash: info }))
}

/// Validate, co-sign and submit a client transaction.
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<TransferResponse>, Error> {
    let start = Instant::now();
    METRICS.transfer_total.fetch_add(1, Ordering::Relaxed);
    state.request_count.fetch_add(1, Ordering::Relaxed);

    let req_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();

    let result = async {
        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| Error::MalformedInput(format!("unreadable body: {e}")))?;
        let body: TransferRequest = serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedInput(format!("invalid request body: {e}")))?;
        let raw = bs58::decode(body.transaction.trim())
            .into_vec()
            .map_err(|e| Error::MalformedInput(format!("transaction is not base58: {e}")))?;
        state.pipeline.process(&raw).await
    }
    .instrument(info_span!("transfer", req_id = %req_id))
    .await;
    METRICS.record_transfer_duration(start);

    match result {
        Ok(accepted) => {
            METRICS.transfer_success.fetch_add(1, Ordering::Relaxed);
            METRICS
                .network_fee_lamports
                .fetch_add(accepted.network_fee_lamports, Ordering::Relaxed);
            info!(req_id = %req_id, signature = %accepted.signature, "Transfer accepted");
            Ok(Json(TransferResponse {
                signature: accepted.signature,
            }))
        }
        Err(e) => {
            if e == Error::DuplicateTransaction {
                METRICS.transfer_duplicate.fetch_add(1, Ordering::Relaxed);
                warn!(req_id = %req_id, "Duplicate transfer refused");
            } else if e.is_validation() {
                METRICS.transfer_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(req_id = %req_id, error = %e, "Transfer rejected");
            } else {
                METRICS.transfer_failed.fetch_add(1, Ordering::Relaxed);
                error!(req_id = %req_id, error = %e, "Transfer failed");
            }
            Err(e)
        }
    }
}

/// Health check with RPC and cache status.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (rpc_status, active_rpc, failovers) = match &state.rpc {
        Some(rpc) => (
            rpc.health_check().await.unwrap_or("unavailable"),
            rpc.active_url().to_string(),
            rpc.failover_count(),
        ),
        None => ("n/a", String::new(), 0),
    };

    let status = if rpc_status == "unavailable" {
        "unavailable"
    } else if rpc_status == "degraded" || state.blockhashes.is_empty() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        fee_payer: state.pipeline.fee_payer().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        active_rpc,
        failovers,
        rpc_status,
        tracked_identities: state.guard.len(),
        cached_blockhashes: state.blockhashes.len(),
        blockhash_validity_secs: state.blockhashes.validity().as_secs(),
    })
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = METRICS.render(state.guard.len(), state.blockhashes.len());
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        body,
    )
}
