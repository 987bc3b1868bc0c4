//! Fee schedule and the checks deciding whether the relay is paid.

use crate::config::{AllowedInstruction, TokenFee};
use crate::token::{parse_transfer, TokenTransfer};
use crate::transaction::{Pubkey, Transaction};
use crate::Error;
use std::collections::HashMap;

/// Accepted fee tokens, keyed by the relay's receiving account.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    by_account: HashMap<Pubkey, TokenFee>,
}

impl FeeSchedule {
    pub fn new(tokens: &[TokenFee]) -> Self {
        Self {
            by_account: tokens.iter().map(|t| (t.account, t.clone())).collect(),
        }
    }

    /// Fee token whose receiving account is `account`.
    pub fn lookup(&self, account: &Pubkey) -> Option<&TokenFee> {
        self.by_account.get(account)
    }
}

/// Programs (and optionally instruction discriminators) the relay co-signs for.
#[derive(Debug, Clone)]
pub struct AllowList {
    programs: HashMap<Pubkey, Vec<u8>>,
}

impl AllowList {
    pub fn new(entries: &[AllowedInstruction]) -> Self {
        let mut programs: HashMap<Pubkey, Vec<u8>> = HashMap::new();
        for entry in entries {
            programs
                .entry(entry.program_id)
                .or_default()
                .extend_from_slice(&entry.discriminators);
        }
        // An entry without discriminators opens the whole program.
        for entry in entries.iter().filter(|e| e.discriminators.is_empty()) {
            programs.insert(entry.program_id, Vec::new());
        }
        Self { programs }
    }

    pub fn check(&self, index: usize, program_id: &Pubkey, data: &[u8]) -> Result<(), Error> {
        let Some(discriminators) = self.programs.get(program_id) else {
            return Err(Error::InstructionNotAllowed(format!(
                "instruction {index} calls program {program_id}"
            )));
        };
        if discriminators.is_empty() {
            return Ok(());
        }
        match data.first() {
            Some(tag) if discriminators.contains(tag) => Ok(()),
            Some(tag) => Err(Error::InstructionNotAllowed(format!(
                "instruction {index} type {tag} of program {program_id}"
            ))),
            None => Err(Error::InstructionNotAllowed(format!(
                "instruction {index} of program {program_id} has no data"
            ))),
        }
    }
}

/// The payment the relay is honoring for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeePayment {
    pub token: TokenFee,
    pub amount: u64,
    /// Owner of the source token account, a verified signer.
    pub payer: Pubkey,
    pub instruction_index: usize,
}

/// Inspects decoded instructions for exactly one compliant fee payment.
#[derive(Debug, Clone)]
pub struct FeeValidator {
    schedule: FeeSchedule,
    allow_list: AllowList,
}

impl FeeValidator {
    pub fn new(schedule: FeeSchedule, allow_list: AllowList) -> Self {
        Self {
            schedule,
            allow_list,
        }
    }

    /// Signatures must already be verified; the payment's authority is only
    /// trusted because it is a signer of the message.
    pub fn validate(&self, tx: &Transaction) -> Result<FeePayment, Error> {
        let message = &tx.message;

        for (index, ix) in message.instructions.iter().enumerate() {
            self.allow_list
                .check(index, message.program_id(ix), &ix.data)?;
            if ix.accounts.contains(&0) {
                return Err(Error::InstructionNotAllowed(format!(
                    "instruction {index} references the fee payer account"
                )));
            }
        }

        let qualifying: Vec<(usize, &TokenFee, TokenTransfer<'_>)> = message
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(index, ix)| {
                let transfer = parse_transfer(message, ix)?;
                let token = self.qualifies(&transfer)?;
                Some((index, token, transfer))
            })
            .collect();

        match qualifying.as_slice() {
            [] => Err(Error::FeeNotPaid),
            [(index, token, transfer)] => {
                if transfer.amount < token.fee {
                    return Err(Error::FeeInsufficient {
                        required: token.fee,
                        paid: transfer.amount,
                    });
                }
                Ok(FeePayment {
                    token: (*token).clone(),
                    amount: transfer.amount,
                    payer: *transfer.authority.pubkey,
                    instruction_index: *index,
                })
            }
            many => Err(Error::FeeAmbiguous { count: many.len() }),
        }
    }

    fn qualifies(&self, transfer: &TokenTransfer<'_>) -> Option<&TokenFee> {
        let token = self.schedule.lookup(transfer.destination)?;
        if !transfer.authority.is_signer || transfer.authority.index == 0 {
            return None;
        }
        if let Some(mint) = transfer.mint {
            if *mint != token.mint || transfer.decimals != Some(token.decimals) {
                return None;
            }
        }
        Some(token)
    }
}
