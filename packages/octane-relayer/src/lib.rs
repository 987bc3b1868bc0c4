//! # Octane Relayer
//!
//! A fee-payer relay for Solana. Clients build a transaction with the relay
//! as fee payer, pay the relay in an SPL token inside that same
//! transaction, sign it, and post it here. The relay checks the payment,
//! co-signs as fee payer and broadcasts it.
//!
//! ## Endpoints
//! - `GET /config` - Fee payer and accepted fee tokens
//! - `GET /blockhash` - Recent blockhash to build against
//! - `POST /transfer` - Co-sign and submit a transaction
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

pub mod blockhash;
pub mod config;
pub mod dedup;
mod error;
pub mod fee;
mod handlers;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod response;
mod router;
pub mod rpc;
pub mod signer;
mod state;
pub mod submit;
pub mod token;
pub mod transaction;

pub use config::Config;
pub use error::Error;
pub use router::create as create_router;
pub use signer::FeePayerSigner;
pub use state::AppState;
