//! Transfer intake: validate, co-sign and submit a client transaction.

use crate::blockhash::BlockhashCache;
use crate::config::Config;
use crate::dedup::DuplicateGuard;
use crate::fee::{AllowList, FeePayment, FeeSchedule, FeeValidator};
use crate::rpc::LedgerClient;
use crate::signer::FeePayerSigner;
use crate::submit::Submitter;
use crate::transaction::{
    check_fee_payer, decode_transaction, verify_signatures, Pubkey, Signature, TxIdentity,
};
use crate::Error;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of an accepted transfer.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub signature: Signature,
    pub identity: TxIdentity,
    pub payment: FeePayment,
    /// Network fee the fee payer is charged.
    pub network_fee_lamports: u64,
}

pub struct TransferPipeline {
    fee_payer: Pubkey,
    max_signatures: usize,
    lamports_per_signature: u64,
    fees: FeeValidator,
    blockhashes: Arc<BlockhashCache>,
    guard: Arc<DuplicateGuard>,
    signer: FeePayerSigner,
    submitter: Submitter,
}

impl TransferPipeline {
    pub fn new(
        config: &Config,
        signer: FeePayerSigner,
        ledger: Arc<dyn LedgerClient>,
        blockhashes: Arc<BlockhashCache>,
        guard: Arc<DuplicateGuard>,
    ) -> Self {
        Self {
            fee_payer: signer.pubkey(),
            max_signatures: config.max_signatures,
            lamports_per_signature: config.lamports_per_signature,
            fees: FeeValidator::new(
                FeeSchedule::new(&config.endpoints.transfer.tokens),
                AllowList::new(&config.allowed_instructions),
            ),
            blockhashes,
            guard,
            signer,
            submitter: Submitter::new(ledger, &config.submit),
        }
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    /// Run `raw` through every check, then sign and submit it.
    ///
    /// Nothing is signed unless all checks pass. The identity is reserved
    /// before signing and released again on any later failure, including
    /// the caller dropping this future.
    pub async fn process(&self, raw: &[u8]) -> Result<Accepted, Error> {
        let mut tx = decode_transaction(raw)?;
        let blockhash = tx.message.recent_blockhash;
        if !self.blockhashes.is_valid(&blockhash) {
            return Err(Error::BlockhashExpired);
        }
        check_fee_payer(&tx, &self.fee_payer, self.max_signatures)?;
        verify_signatures(&tx)?;
        let payment = self.fees.validate(&tx)?;

        let identity = tx.identity();
        let reservation = self.guard.reserve(identity, blockhash)?;
        debug!(identity = %identity, "Identity reserved");

        self.signer.sign(&mut tx)?;
        let signature = self.submitter.submit(&tx).await?;
        reservation.commit();

        let network_fee_lamports =
            tx.message.header.num_required_signatures as u64 * self.lamports_per_signature;
        info!(
            signature = %signature,
            identity = %identity,
            payer = %payment.payer,
            mint = %payment.token.mint,
            amount = payment.amount,
            network_fee_lamports,
            "Transfer submitted"
        );
        Ok(Accepted {
            signature,
            identity,
            payment,
            network_fee_lamports,
        })
    }
}
