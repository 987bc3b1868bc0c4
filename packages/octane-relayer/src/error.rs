//! Error types for the relayer.

use crate::transaction::Pubkey;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;

/// Relayer error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Request body or transaction bytes could not be decoded.
    MalformedInput(String),
    /// A declared signer's signature does not verify.
    SignatureInvalid { signer: Pubkey },
    /// Account 0 is not the relay's fee payer.
    FeePayerMismatch { expected: Pubkey, found: Pubkey },
    TooManySignatures { count: usize, max: usize },
    /// No instruction pays a configured fee account.
    FeeNotPaid,
    FeeInsufficient { required: u64, paid: u64 },
    /// More than one instruction pays a configured fee account.
    FeeAmbiguous { count: usize },
    InstructionNotAllowed(String),
    /// Recent blockhash is unknown or outside the validity window.
    BlockhashExpired,
    DuplicateTransaction,
    /// Relay signing key missing or invalid. Startup-fatal.
    SigningUnavailable(String),
    /// The network refused the transaction (e.g. simulation failure).
    SubmissionRejected(String),
    /// Submission kept failing transiently after bounded retries.
    SubmissionTimeout { attempts: u32 },
    /// Configuration error.
    Config(String),
    /// RPC communication error.
    Rpc(String),
}

impl Error {
    /// Client-facing validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MalformedInput(_)
                | Error::SignatureInvalid { .. }
                | Error::FeePayerMismatch { .. }
                | Error::TooManySignatures { .. }
                | Error::FeeNotPaid
                | Error::FeeInsufficient { .. }
                | Error::FeeAmbiguous { .. }
                | Error::InstructionNotAllowed(_)
                | Error::BlockhashExpired
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            // DuplicateTransaction included: clients expect 500 on replay.
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(msg) => write!(f, "malformed transaction: {msg}"),
            Error::SignatureInvalid { signer } => write!(f, "invalid signature for {signer}"),
            Error::FeePayerMismatch { expected, found } => {
                write!(f, "fee payer must be {expected}, got {found}")
            }
            Error::TooManySignatures { count, max } => {
                write!(f, "transaction has {count} signatures, limit is {max}")
            }
            Error::FeeNotPaid => write!(f, "missing fee transfer to relay"),
            Error::FeeInsufficient { required, paid } => {
                write!(f, "fee transfer of {paid} is below the required {required}")
            }
            Error::FeeAmbiguous { count } => {
                write!(f, "{count} fee transfers to relay, expected exactly one")
            }
            Error::InstructionNotAllowed(msg) => write!(f, "instruction not allowed: {msg}"),
            Error::BlockhashExpired => write!(f, "blockhash expired or unknown"),
            Error::DuplicateTransaction => write!(f, "duplicate transaction"),
            Error::SigningUnavailable(msg) => write!(f, "signing unavailable: {msg}"),
            Error::SubmissionRejected(msg) => write!(f, "transaction rejected: {msg}"),
            Error::SubmissionTimeout { attempts } => {
                write!(f, "submission failed after {attempts} attempts")
            }
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Rpc(msg) => write!(f, "rpc error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = crate::response::ErrorResponse::new(self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_bad_request() {
        for err in [
            Error::MalformedInput("x".into()),
            Error::FeeNotPaid,
            Error::FeeInsufficient {
                required: 100,
                paid: 99,
            },
            Error::FeeAmbiguous { count: 2 },
            Error::InstructionNotAllowed("x".into()),
            Error::BlockhashExpired,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn test_duplicate_and_submission_errors_are_server_errors() {
        for err in [
            Error::DuplicateTransaction,
            Error::SubmissionRejected("sim failed".into()),
            Error::SubmissionTimeout { attempts: 4 },
            Error::SigningUnavailable("no key".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR, "{err}");
        }
    }

    #[test]
    fn test_display_names_offending_signer() {
        let signer: Pubkey = "11111111111111111111111111111111".parse().unwrap();
        let msg = Error::SignatureInvalid { signer }.to_string();
        assert!(msg.contains("11111111111111111111111111111111"));
    }
}
