//! Relayer configuration.
//!
//! Field names follow the camelCase JSON documents existing deployments
//! already use, so a config file can be dropped in unchanged.

use crate::token::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID, TRANSFER, TRANSFER_CHECKED};
use crate::transaction::Pubkey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Configuration for the relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "defaults::rpc_url")]
    pub rpc_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_rpc_url: Option<String>,

    #[serde(default = "defaults::bind_address", skip_serializing)]
    pub bind_address: String,

    #[serde(default = "defaults::max_signatures")]
    pub max_signatures: usize,

    #[serde(default = "defaults::lamports_per_signature")]
    pub lamports_per_signature: u64,

    #[serde(default)]
    pub cors_origin: bool,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default)]
    pub blockhash: BlockhashConfig,

    #[serde(default)]
    pub submit: SubmitConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default = "defaults::allowed_instructions")]
    pub allowed_instructions: Vec<AllowedInstruction>,

    #[serde(default = "defaults::request_timeout_secs", skip_serializing)]
    pub request_timeout_secs: u64,

    #[serde(default = "defaults::max_concurrent_requests", skip_serializing)]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default)]
    pub transfer: TransferEndpoint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferEndpoint {
    #[serde(default)]
    pub tokens: Vec<TokenFee>,
}

/// An accepted fee asset and where the relay receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFee {
    pub mint: Pubkey,
    /// Relay-owned token account receiving the fee.
    pub account: Pubkey,
    pub decimals: u8,
    /// Minimum fee in base units.
    pub fee: u64,
}

/// A program the relay will co-sign for. Empty `discriminators` permits any
/// instruction of the program; otherwise the first data byte must be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedInstruction {
    pub program_id: Pubkey,
    #[serde(default)]
    pub discriminators: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockhashConfig {
    pub refresh_interval_ms: u64,
    /// How long a fetched blockhash is accepted.
    pub validity_secs: u64,
    pub max_tracked: usize,
}

impl Default for BlockhashConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 5_000,
            validity_secs: 60,
            max_tracked: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitConfig {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 250,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Per client IP. 0 disables limiting.
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: defaults::rpc_url(),
            fallback_rpc_url: None,
            bind_address: defaults::bind_address(),
            max_signatures: defaults::max_signatures(),
            lamports_per_signature: defaults::lamports_per_signature(),
            cors_origin: false,
            endpoints: Endpoints::default(),
            blockhash: BlockhashConfig::default(),
            submit: SubmitConfig::default(),
            rate_limit: RateLimitConfig::default(),
            allowed_instructions: defaults::allowed_instructions(),
            request_timeout_secs: defaults::request_timeout_secs(),
            max_concurrent_requests: defaults::max_concurrent_requests(),
        }
    }
}

impl Config {
    /// Load from `RELAYER_CONFIG_PATH` (default `config.json`), layered with
    /// a JSON document in `RELAYER_CONFIG_JSON` and single-value env overrides.
    pub fn load() -> Result<Self, crate::Error> {
        let path = std::env::var("RELAYER_CONFIG_PATH").unwrap_or_else(|_| "config.json".into());
        let json_override =
            non_empty_env("RELAYER_CONFIG_JSON").or_else(|| non_empty_env("OCTANE_CONFIG_JSON"));

        let mut builder = config::Config::builder()
            .add_source(config::File::new(&path, config::FileFormat::Json).required(false));
        if let Some(json) = json_override {
            builder = builder.add_source(config::File::from_str(&json, config::FileFormat::Json));
        }

        let config: Config = builder
            .set_override_option("rpcUrl", non_empty_env("RELAYER_RPC_URL"))
            .and_then(|b| {
                b.set_override_option("bindAddress", non_empty_env("RELAYER_BIND_ADDRESS"))
            })
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, crate::Error> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation. Any error here is fatal.
    pub fn validate(&self) -> Result<(), crate::Error> {
        let fail = |msg: String| Err(crate::Error::Config(msg));

        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return fail(format!("rpcUrl must be an http(s) URL, got {:?}", self.rpc_url));
        }
        if self.max_signatures == 0 || self.max_signatures > u8::MAX as usize {
            return fail(format!("maxSignatures must be 1..=255, got {}", self.max_signatures));
        }

        let tokens = &self.endpoints.transfer.tokens;
        if tokens.is_empty() {
            return fail("endpoints.transfer.tokens must list at least one fee token".into());
        }
        let mut accounts = HashSet::new();
        for token in tokens {
            if !accounts.insert(token.account) {
                return fail(format!("fee account {} is listed twice", token.account));
            }
        }

        let pays = self.allowed_instructions.iter().any(|a| {
            (a.program_id == TOKEN_PROGRAM_ID || a.program_id == TOKEN_2022_PROGRAM_ID)
                && (a.discriminators.is_empty()
                    || a.discriminators.contains(&TRANSFER)
                    || a.discriminators.contains(&TRANSFER_CHECKED))
        });
        if !pays {
            return fail("allowedInstructions must permit token transfers".into());
        }

        if self.blockhash.validity_secs == 0 {
            return fail("blockhash.validitySecs must be positive".into());
        }
        if self.blockhash.refresh_interval_ms == 0 {
            return fail("blockhash.refreshIntervalMs must be positive".into());
        }
        if self.blockhash.refresh_interval_ms >= self.blockhash.validity_secs * 1000 {
            return fail(
                "blockhash.refreshIntervalMs must be shorter than the validity window".into(),
            );
        }
        if self.blockhash.max_tracked == 0 {
            return fail("blockhash.maxTracked must be positive".into());
        }
        if self.submit.timeout_ms == 0 {
            return fail("submit.timeoutMs must be positive".into());
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

mod defaults {
    use super::AllowedInstruction;
    use crate::token::{
        MEMO_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID, TRANSFER, TRANSFER_CHECKED,
    };

    pub fn rpc_url() -> String {
        "https://api.devnet.solana.com".into()
    }

    pub fn bind_address() -> String {
        "0.0.0.0:3000".into()
    }

    pub fn max_signatures() -> usize {
        2
    }

    pub fn lamports_per_signature() -> u64 {
        5000
    }

    pub fn request_timeout_secs() -> u64 {
        30
    }

    pub fn max_concurrent_requests() -> usize {
        512
    }

    pub fn allowed_instructions() -> Vec<AllowedInstruction> {
        vec![
            AllowedInstruction {
                program_id: TOKEN_PROGRAM_ID,
                discriminators: vec![TRANSFER, TRANSFER_CHECKED],
            },
            AllowedInstruction {
                program_id: TOKEN_2022_PROGRAM_ID,
                discriminators: vec![TRANSFER, TRANSFER_CHECKED],
            },
            AllowedInstruction {
                program_id: MEMO_PROGRAM_ID,
                discriminators: vec![],
            },
        ]
    }
}
