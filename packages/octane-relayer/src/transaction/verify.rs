//! Signer checks: the fee payer slot belongs to the relay, every other
//! declared signer must have signed the message bytes.

use super::{Pubkey, Transaction};
use crate::Error;
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};

/// Fee payer must be the relay, its signature slot must be empty, and the
/// number of signers must stay within the configured bound.
pub fn check_fee_payer(
    tx: &Transaction,
    relay: &Pubkey,
    max_signatures: usize,
) -> Result<(), Error> {
    let fee_payer = tx.message.fee_payer();
    if fee_payer != relay {
        return Err(Error::FeePayerMismatch {
            expected: *relay,
            found: *fee_payer,
        });
    }
    if !tx.id().is_zero() {
        return Err(Error::MalformedInput(
            "fee payer signature slot must be empty".into(),
        ));
    }
    if tx.signatures.len() > max_signatures {
        return Err(Error::TooManySignatures {
            count: tx.signatures.len(),
            max: max_signatures,
        });
    }
    Ok(())
}

/// Verify every non-fee-payer signature against the message bytes.
pub fn verify_signatures(tx: &Transaction) -> Result<(), Error> {
    let message = tx.message_bytes();
    for (signer, signature) in tx.signer_pairs().skip(1) {
        let invalid = || Error::SignatureInvalid { signer: *signer };
        let key = VerifyingKey::from_bytes(&signer.0).map_err(|_| invalid())?;
        let sig = DalekSignature::from_bytes(&signature.0);
        key.verify_strict(message, &sig).map_err(|_| invalid())?;
    }
    Ok(())
}
