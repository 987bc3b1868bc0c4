//! The relay's fee-payer key.

use crate::transaction::{Pubkey, Signature, Transaction};
use crate::Error;
use ed25519_dalek::SigningKey;

/// Signing backend for the fee payer.
pub enum FeePayerSigner {
    Local { key: SigningKey },
}

impl FeePayerSigner {
    /// Load from `RELAYER_SECRET_KEY`, falling back to `SECRET_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        let secret = ["RELAYER_SECRET_KEY", "SECRET_KEY"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
        Self::load(secret.as_deref())
    }

    /// Accepts base58 of a 64-byte keypair (secret || public) or a 32-byte seed.
    pub fn load(secret: Option<&str>) -> Result<Self, Error> {
        let secret = secret
            .map(str::trim)
            .ok_or_else(|| Error::SigningUnavailable("no secret key configured".into()))?;
        let bytes = bs58::decode(secret)
            .into_vec()
            .map_err(|e| Error::SigningUnavailable(format!("secret key is not base58: {e}")))?;

        let key = match bytes.len() {
            64 => {
                let pair: [u8; 64] = bytes
                    .try_into()
                    .map_err(|_| Error::SigningUnavailable("bad keypair length".into()))?;
                SigningKey::from_keypair_bytes(&pair).map_err(|_| {
                    Error::SigningUnavailable("public half does not match secret key".into())
                })?
            }
            32 => {
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::SigningUnavailable("bad seed length".into()))?;
                SigningKey::from_bytes(&seed)
            }
            n => {
                return Err(Error::SigningUnavailable(format!(
                    "secret key must be 32 or 64 bytes, got {n}"
                )))
            }
        };
        Ok(Self::Local { key })
    }

    pub fn pubkey(&self) -> Pubkey {
        match self {
            Self::Local { key } => Pubkey(key.verifying_key().to_bytes()),
        }
    }

    /// Sign the fee-payer slot. The message bytes are not touched.
    pub fn sign(&self, tx: &mut Transaction) -> Result<Signature, Error> {
        match self {
            Self::Local { key } => tx.partial_sign(key),
        }
    }
}

impl std::fmt::Debug for FeePayerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { .. } => write!(f, "FeePayerSigner::Local({})", self.pubkey()),
        }
    }
}
