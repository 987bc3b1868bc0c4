//! Prometheus metrics (lock-free atomics, zero allocation on hot path).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- Traffic ---
    pub transfer_total: AtomicU64,
    pub transfer_success: AtomicU64,
    pub transfer_rejected: AtomicU64,
    pub transfer_duplicate: AtomicU64,
    pub transfer_failed: AtomicU64,
    pub rate_limited: AtomicU64,

    // --- Latency (μs, updated via CAS) ---
    pub transfer_duration_us_sum: AtomicU64,
    pub transfer_duration_us_max: AtomicU64,

    // --- Spend ---
    pub network_fee_lamports: AtomicU64,

    // --- RPC ---
    pub submit_retries: AtomicU64,
    pub blockhash_refresh_errors: AtomicU64,
    pub rpc_failovers: AtomicU64,
    pub rpc_errors: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            transfer_total: AtomicU64::new(0),
            transfer_success: AtomicU64::new(0),
            transfer_rejected: AtomicU64::new(0),
            transfer_duplicate: AtomicU64::new(0),
            transfer_failed: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            transfer_duration_us_sum: AtomicU64::new(0),
            transfer_duration_us_max: AtomicU64::new(0),
            network_fee_lamports: AtomicU64::new(0),
            submit_retries: AtomicU64::new(0),
            blockhash_refresh_errors: AtomicU64::new(0),
            rpc_failovers: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
        }
    }

    pub fn record_transfer_duration(&self, start: Instant) {
        let us = start.elapsed().as_micros() as u64;
        self.transfer_duration_us_sum.fetch_add(us, Ordering::Relaxed);
        // CAS loop for max tracking
        let mut cur = self.transfer_duration_us_max.load(Ordering::Relaxed);
        while us > cur {
            match self.transfer_duration_us_max.compare_exchange_weak(
                cur,
                us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self, tracked_identities: usize, cached_blockhashes: usize) -> String {
        let total = self.transfer_total.load(Ordering::Relaxed);
        let success = self.transfer_success.load(Ordering::Relaxed);
        let rejected = self.transfer_rejected.load(Ordering::Relaxed);
        let duplicate = self.transfer_duplicate.load(Ordering::Relaxed);
        let failed = self.transfer_failed.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        let dur_sum = self.transfer_duration_us_sum.load(Ordering::Relaxed);
        let dur_max = self.transfer_duration_us_max.swap(0, Ordering::Relaxed);
        let lamports = self.network_fee_lamports.load(Ordering::Relaxed);
        let retries = self.submit_retries.load(Ordering::Relaxed);
        let refresh_errors = self.blockhash_refresh_errors.load(Ordering::Relaxed);
        let rpc_failovers = self.rpc_failovers.load(Ordering::Relaxed);
        let rpc_errors = self.rpc_errors.load(Ordering::Relaxed);

        // Convert μs to seconds for Prometheus conventions
        let dur_sum_s = dur_sum as f64 / 1_000_000.0;
        let dur_max_s = dur_max as f64 / 1_000_000.0;

        format!(
            "\
# HELP relayer_transfer_total Total transfer requests received.\n\
# TYPE relayer_transfer_total counter\n\
relayer_transfer_total {total}\n\
# HELP relayer_transfer_success_total Transfers signed and submitted.\n\
# TYPE relayer_transfer_success_total counter\n\
relayer_transfer_success_total {success}\n\
# HELP relayer_transfer_rejected_total Transfers failing validation (HTTP 400).\n\
# TYPE relayer_transfer_rejected_total counter\n\
relayer_transfer_rejected_total {rejected}\n\
# HELP relayer_transfer_duplicate_total Replayed transfers refused.\n\
# TYPE relayer_transfer_duplicate_total counter\n\
relayer_transfer_duplicate_total {duplicate}\n\
# HELP relayer_transfer_failed_total Transfers failing at submission.\n\
# TYPE relayer_transfer_failed_total counter\n\
relayer_transfer_failed_total {failed}\n\
# HELP relayer_rate_limited_total Requests refused by the rate limiter.\n\
# TYPE relayer_rate_limited_total counter\n\
relayer_rate_limited_total {rate_limited}\n\
# HELP relayer_transfer_duration_seconds_sum Total handler time (seconds).\n\
# TYPE relayer_transfer_duration_seconds_sum counter\n\
relayer_transfer_duration_seconds_sum {dur_sum_s:.6}\n\
# HELP relayer_transfer_duration_seconds_max Max handler time since last scrape (seconds).\n\
# TYPE relayer_transfer_duration_seconds_max gauge\n\
relayer_transfer_duration_seconds_max {dur_max_s:.6}\n\
# HELP relayer_network_fee_lamports_total Network fees paid by the fee payer.\n\
# TYPE relayer_network_fee_lamports_total counter\n\
relayer_network_fee_lamports_total {lamports}\n\
# HELP relayer_submit_retries_total Submission retries after transient errors.\n\
# TYPE relayer_submit_retries_total counter\n\
relayer_submit_retries_total {retries}\n\
# HELP relayer_blockhash_refresh_errors_total Failed blockhash refreshes.\n\
# TYPE relayer_blockhash_refresh_errors_total counter\n\
relayer_blockhash_refresh_errors_total {refresh_errors}\n\
# HELP relayer_rpc_failovers_total RPC primary-to-fallback failovers.\n\
# TYPE relayer_rpc_failovers_total counter\n\
relayer_rpc_failovers_total {rpc_failovers}\n\
# HELP relayer_rpc_errors_total RPC errors.\n\
# TYPE relayer_rpc_errors_total counter\n\
relayer_rpc_errors_total {rpc_errors}\n\
# HELP relayer_tracked_identities Transaction identities held for duplicate detection.\n\
# TYPE relayer_tracked_identities gauge\n\
relayer_tracked_identities {tracked_identities}\n\
# HELP relayer_cached_blockhashes Blockhashes currently tracked.\n\
# TYPE relayer_cached_blockhashes gauge\n\
relayer_cached_blockhashes {cached_blockhashes}\n"
        )
    }
}
