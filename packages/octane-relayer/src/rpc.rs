//! Ledger access: the [`LedgerClient`] capability and a Solana JSON-RPC
//! client with primary → fallback failover and circuit breaker.

use crate::blockhash::BlockhashInfo;
use crate::metrics::METRICS;
use crate::transaction::{Hash, Signature};
use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Failure talking to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Endpoint unreachable, overloaded or unhealthy.
    Unavailable(String),
    Timeout,
    /// The network refused the request (e.g. preflight simulation failed).
    Rejected { code: i64, message: String },
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LedgerError::Rejected { .. })
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Unavailable(msg) => write!(f, "ledger unavailable: {msg}"),
            LedgerError::Timeout => write!(f, "ledger request timed out"),
            LedgerError::Rejected { code, message } => write!(f, "{message} (code {code})"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<LedgerError> for crate::Error {
    fn from(e: LedgerError) -> Self {
        crate::Error::Rpc(e.to_string())
    }
}

/// What the relay needs from the network.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current blockhash and the last block height at which it is usable.
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, LedgerError>;

    /// Broadcast fully signed wire bytes; returns the network's identifier.
    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError>;
}

/// Node is behind or unhealthy.
const NODE_UNHEALTHY: i64 = -32005;

const CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
const CIRCUIT_BREAKER_WINDOW_MS: u64 = 30_000;

struct CircuitState {
    failures: u64,
    last_failure_ms: u64,
    open: bool,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

/// Solana JSON-RPC client with primary → fallback failover.
pub struct RpcClient {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
    circuit: Mutex<CircuitState>,
    total_failovers: AtomicU64,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Without a fallback both slots point at the primary.
    pub fn new(
        primary_url: &str,
        fallback_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        let fallback_url = fallback_url.unwrap_or(primary_url);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("http client: {e}")))?;
        info!(
            primary = primary_url,
            fallback = fallback_url,
            "RPC client initialized with failover"
        );
        Ok(Self {
            http,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
            circuit: Mutex::new(CircuitState {
                failures: 0,
                last_failure_ms: 0,
                open: false,
            }),
            total_failovers: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method` on the active endpoint, retrying once on the fallback
    /// when the failure is the endpoint's rather than the request's.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let url = self.active_url();
        match self.call_url(url, method, &params).await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) if e.is_retryable() => {
                self.record_failure();
                if url == self.fallback_url {
                    return Err(e);
                }
                warn!(error = %e, method, "Primary RPC call failed, trying fallback");
                self.call_url(&self.fallback_url, method, &params).await
            }
            Err(e) => Err(e),
        }
    }

    async fn call_url<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &Value,
    ) -> Result<T, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Timeout
                } else {
                    LedgerError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Unavailable(format!("HTTP {status}")));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("invalid response: {e}")))?;
        match (envelope.result, envelope.error) {
            (_, Some(err)) if err.code == NODE_UNHEALTHY => {
                Err(LedgerError::Unavailable(err.message))
            }
            (_, Some(err)) => Err(LedgerError::Rejected {
                code: err.code,
                message: err.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::Unavailable(format!(
                "{method} returned neither result nor error"
            ))),
        }
    }

    /// Quick connectivity check. Returns "ok", "degraded", or error.
    pub async fn health_check(&self) -> Result<&'static str, crate::Error> {
        let params = json!([]);
        match self.call_url::<Value>(&self.primary_url, "getHealth", &params).await {
            Ok(_) => Ok("ok"),
            Err(_) if self.fallback_url == self.primary_url => {
                Err(crate::Error::Rpc("RPC unreachable".into()))
            }
            Err(_) => match self.call_url::<Value>(&self.fallback_url, "getHealth", &params).await {
                Ok(_) => Ok("degraded"),
                Err(e) => Err(crate::Error::Rpc(format!("Both RPCs unreachable: {e}"))),
            },
        }
    }

    // --- Failover / circuit breaker ---

    fn record_success(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if circuit.failures > 0 {
            info!(primary = %self.primary_url, "Primary RPC recovered");
            circuit.failures = 0;
            circuit.open = false;
        }
    }

    fn record_failure(&self) {
        METRICS.rpc_errors.fetch_add(1, Ordering::Relaxed);
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.failures += 1;
        circuit.last_failure_ms = now_ms();
        if circuit.failures >= CIRCUIT_BREAKER_THRESHOLD && !circuit.open {
            circuit.open = true;
            self.total_failovers.fetch_add(1, Ordering::Relaxed);
            METRICS.rpc_failovers.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = circuit.failures,
                fallback = %self.fallback_url,
                "Circuit breaker opened, routing to fallback"
            );
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if !circuit.open {
            return false;
        }
        if now_ms().saturating_sub(circuit.last_failure_ms) > CIRCUIT_BREAKER_WINDOW_MS {
            circuit.open = false;
            circuit.failures = 0;
            info!(primary = %self.primary_url, "Circuit breaker half-open, retrying primary");
            return false;
        }
        true
    }

    pub fn failover_count(&self) -> u64 {
        self.total_failovers.load(Ordering::Relaxed)
    }

    /// Currently active RPC URL.
    pub fn active_url(&self) -> &str {
        if self.is_circuit_open() {
            &self.fallback_url
        } else {
            &self.primary_url
        }
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, LedgerError> {
        let response: WithContext<LatestBlockhash> = self
            .call("getLatestBlockhash", json!([{ "commitment": "confirmed" }]))
            .await?;
        let blockhash: Hash = response.value.blockhash.parse().map_err(|e| {
            LedgerError::Unavailable(format!("unparseable blockhash: {e}"))
        })?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<Signature, LedgerError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(wire);
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    {
                        "encoding": "base64",
                        "skipPreflight": false,
                        "preflightCommitment": "confirmed",
                        "maxRetries": 0
                    }
                ]),
            )
            .await?;
        signature
            .parse()
            .map_err(|e| LedgerError::Unavailable(format!("unparseable signature: {e}")))
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RpcClient {
        RpcClient::new(
            "http://127.0.0.1:1",
            Some("http://127.0.0.1:2"),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn test_rejected_is_terminal() {
        assert!(!LedgerError::Rejected {
            code: -32002,
            message: "simulation failed".into()
        }
        .is_retryable());
        assert!(LedgerError::Timeout.is_retryable());
        assert!(LedgerError::Unavailable("503".into()).is_retryable());
    }

    #[test]
    fn test_missing_fallback_reuses_primary() {
        let rpc = RpcClient::new("http://a", None, Duration::from_secs(1)).unwrap();
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            rpc.record_failure();
        }
        assert!(rpc.is_circuit_open());
        assert_eq!(rpc.active_url(), "http://a");
    }

    #[test]
    fn test_circuit_opens_after_threshold() {
        let rpc = client();
        assert_eq!(rpc.active_url(), "http://127.0.0.1:1");
        for _ in 0..CIRCUIT_BREAKER_THRESHOLD {
            rpc.record_failure();
        }
        assert!(rpc.is_circuit_open());
        assert_eq!(rpc.active_url(), "http://127.0.0.1:2");
        assert_eq!(rpc.failover_count(), 1);

        rpc.record_success();
        assert!(!rpc.is_circuit_open());
    }

    #[test]
    fn test_envelope_parsing() {
        let ok: RpcResponse<WithContext<LatestBlockhash>> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{"context":{"slot":5},"value":{
                "blockhash":"EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                "lastValidBlockHeight":3090}}}"#,
        )
        .unwrap();
        let value = ok.result.unwrap().value;
        assert_eq!(value.last_valid_block_height, 3090);
        assert!(value.blockhash.parse::<Hash>().is_ok());

        let err: RpcResponse<String> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32002,"message":"Transaction simulation failed"}}"#,
        )
        .unwrap();
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -32002);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_are_retryable() {
        let rpc = client();
        let err = rpc.latest_blockhash().await.unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
