//! Response types for the relayer API.

use crate::blockhash::BlockhashInfo;
use crate::config::Config;
use crate::transaction::{Pubkey, Signature};
use serde::{Deserialize, Serialize};

/// Body of `POST /transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Base58 wire bytes.
    pub transaction: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub signature: Signature,
}

/// Error envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlockhashResponse {
    pub blockhash: BlockhashInfo,
}

/// Public configuration. The signing key is never part of [`Config`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub fee_payer: Pubkey,
    #[serde(flatten)]
    pub config: Config,
}

/// Response from the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub fee_payer: String,
    pub uptime_secs: u64,
    pub requests: u64,
    pub active_rpc: String,
    pub failovers: u64,
    pub rpc_status: &'static str,
    pub tracked_identities: usize,
    pub cached_blockhashes: usize,
    pub blockhash_validity_secs: u64,
}
