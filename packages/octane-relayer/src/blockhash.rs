//! Recently observed blockhashes and the task keeping them fresh.
//!
//! Readers load an immutable snapshot; the single refresher swaps in a new
//! one. A blockhash is valid for `validity` after it was first observed.

use crate::config::BlockhashConfig;
use crate::dedup::DuplicateGuard;
use crate::metrics::METRICS;
use crate::rpc::LedgerClient;
use crate::transaction::Hash;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Copy)]
struct Observed {
    info: BlockhashInfo,
    first_seen: Instant,
}

/// Oldest first.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    entries: Vec<Observed>,
}

pub struct BlockhashCache {
    snapshot: ArcSwap<Snapshot>,
    validity: Duration,
    max_tracked: usize,
}

impl BlockhashCache {
    pub fn new(validity: Duration, max_tracked: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            validity,
            max_tracked: max_tracked.max(1),
        }
    }

    pub fn from_config(config: &BlockhashConfig) -> Self {
        Self::new(
            Duration::from_secs(config.validity_secs),
            config.max_tracked,
        )
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn is_valid(&self, blockhash: &Hash) -> bool {
        self.is_valid_at(blockhash, Instant::now())
    }

    pub fn is_valid_at(&self, blockhash: &Hash, now: Instant) -> bool {
        self.snapshot
            .load()
            .entries
            .iter()
            .any(|o| o.info.blockhash == *blockhash && self.fresh(o, now))
    }

    /// Newest blockhash still inside the validity window.
    pub fn latest(&self) -> Option<BlockhashInfo> {
        self.latest_at(Instant::now())
    }

    pub fn latest_at(&self, now: Instant) -> Option<BlockhashInfo> {
        self.snapshot
            .load()
            .entries
            .iter()
            .rev()
            .find(|o| self.fresh(o, now))
            .map(|o| o.info)
    }

    /// Record an observation. Seeing a known blockhash again does not
    /// extend its lifetime.
    pub fn record(&self, info: BlockhashInfo) {
        self.record_at(info, Instant::now());
    }

    pub fn record_at(&self, info: BlockhashInfo, now: Instant) {
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            if !next.entries.iter().any(|o| o.info.blockhash == info.blockhash) {
                next.entries.push(Observed {
                    info,
                    first_seen: now,
                });
            }
            let overflow = next.entries.len().saturating_sub(self.max_tracked);
            next.entries.drain(..overflow);
            next
        });
    }

    /// Drop expired blockhashes. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.entries.retain(|o| self.fresh(o, now));
            removed = current.entries.len() - next.entries.len();
            next
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().entries.is_empty()
    }

    /// Fetch the current blockhash from the ledger and record it.
    pub async fn refresh(&self, ledger: &dyn LedgerClient) -> Result<BlockhashInfo, crate::Error> {
        let info = ledger.latest_blockhash().await?;
        self.record(info);
        debug!(
            blockhash = %info.blockhash,
            last_valid_block_height = info.last_valid_block_height,
            tracked = self.len(),
            "Blockhash refreshed"
        );
        Ok(info)
    }

    fn fresh(&self, observed: &Observed, now: Instant) -> bool {
        now.saturating_duration_since(observed.first_seen) < self.validity
    }
}

/// Refresh the cache every `interval`, pruning expired blockhashes and the
/// identities that referenced them. Returns when `cancel` is triggered.
pub async fn run_refresher(
    cache: Arc<BlockhashCache>,
    ledger: Arc<dyn LedgerClient>,
    guard: Arc<DuplicateGuard>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancel.cancelled() => {
                info!("Blockhash refresher shutting down");
                return;
            }
        }

        if let Err(e) = cache.refresh(ledger.as_ref()).await {
            METRICS.blockhash_refresh_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Blockhash refresh failed");
        }
        let now = Instant::now();
        cache.prune(now);
        guard.prune(|hash| cache.is_valid_at(hash, now));
    }
}
