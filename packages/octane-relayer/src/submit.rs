//! Broadcasting signed transactions with bounded retry.

use crate::config::SubmitConfig;
use crate::metrics::METRICS;
use crate::rpc::{LedgerClient, LedgerError};
use crate::transaction::{Signature, Transaction};
use crate::Error;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Submitter {
    ledger: Arc<dyn LedgerClient>,
    max_retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: &SubmitConfig) -> Self {
        Self {
            ledger,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Send `tx` and return its identifier on first acknowledgment.
    ///
    /// Transient failures are retried `max_retries` times, doubling the
    /// delay each time. A rejection by the network is returned immediately.
    pub async fn submit(&self, tx: &Transaction) -> Result<Signature, Error> {
        let wire = tx.to_bytes();
        let expected = tx.id();
        let attempts = self.max_retries + 1;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry_delay(attempt - 1);
                METRICS.submit_retries.fetch_add(1, Ordering::Relaxed);
                warn!(
                    signature = %expected,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying submission"
                );
                tokio::time::sleep(delay).await;
            }

            let call = self.ledger.send_transaction(&wire);
            let result = tokio::time::timeout(self.timeout, call)
                .await
                .unwrap_or_else(|_| Err(LedgerError::Timeout));

            match result {
                Ok(returned) => {
                    if returned != expected {
                        warn!(
                            expected = %expected,
                            returned = %returned,
                            "Ledger returned a different signature"
                        );
                    }
                    return Ok(expected);
                }
                // An earlier attempt landed but its reply was lost.
                Err(LedgerError::Rejected { message, .. })
                    if attempt > 0 && is_already_processed(&message) =>
                {
                    info!(signature = %expected, attempt, "Transaction already processed");
                    return Ok(expected);
                }
                Err(LedgerError::Rejected { code, message }) => {
                    error!(signature = %expected, code, message = %message, "Transaction rejected");
                    return Err(Error::SubmissionRejected(message));
                }
                Err(e) => {
                    warn!(signature = %expected, attempt, error = %e, "Submission attempt failed");
                }
            }
        }

        error!(signature = %expected, attempts, "Submission retries exhausted");
        Err(Error::SubmissionTimeout { attempts })
    }

    fn retry_delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << retry.min(16))
    }
}

fn is_already_processed(message: &str) -> bool {
    message.contains("already been processed")
}
