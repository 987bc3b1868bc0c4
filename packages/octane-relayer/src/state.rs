//! Application state shared across handlers.

use crate::blockhash::BlockhashCache;
use crate::config::Config;
use crate::dedup::DuplicateGuard;
use crate::middleware::RateLimiter;
use crate::pipeline::TransferPipeline;
use crate::rpc::{LedgerClient, RpcClient};
use crate::signer::FeePayerSigner;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub pipeline: TransferPipeline,
    pub blockhashes: Arc<BlockhashCache>,
    pub guard: Arc<DuplicateGuard>,
    pub ledger: Arc<dyn LedgerClient>,
    /// Present when the ledger is the JSON-RPC client; used for health.
    pub rpc: Option<Arc<RpcClient>>,
    pub rate_limiter: RateLimiter,
    pub start_time: Instant,
    pub request_count: AtomicU64,
}

impl AppState {
    /// State backed by the JSON-RPC endpoints in `config`.
    pub fn new(config: Config, signer: FeePayerSigner) -> Result<Self, crate::Error> {
        let rpc = Arc::new(RpcClient::new(
            &config.rpc_url,
            config.fallback_rpc_url.as_deref(),
            Duration::from_millis(config.submit.timeout_ms),
        )?);
        let mut state = Self::with_ledger(config, signer, rpc.clone());
        state.rpc = Some(rpc);
        Ok(state)
    }

    /// State backed by an arbitrary ledger client.
    pub fn with_ledger(
        config: Config,
        signer: FeePayerSigner,
        ledger: Arc<dyn LedgerClient>,
    ) -> Self {
        info!(fee_payer = %signer.pubkey(), "Loaded fee payer key");

        let blockhashes = Arc::new(BlockhashCache::from_config(&config.blockhash));
        let guard = Arc::new(DuplicateGuard::new());
        let pipeline = TransferPipeline::new(
            &config,
            signer,
            ledger.clone(),
            blockhashes.clone(),
            guard.clone(),
        );

        Self {
            rate_limiter: RateLimiter::new(config.rate_limit.requests_per_minute),
            config,
            pipeline,
            blockhashes,
            guard,
            ledger,
            rpc: None,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }
}
