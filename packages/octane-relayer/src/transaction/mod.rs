//! Solana legacy transaction model.
//!
//! The relay never depends on a ledger SDK for its view of a transaction:
//! everything it validates is decoded here from the wire bytes, and the
//! message bytes the client signed are kept verbatim so the fee-payer
//! signature covers exactly what the other signers saw.

mod decode;
mod verify;

pub use decode::{decode_transaction, MAX_ACCOUNT_KEYS, MAX_TRANSACTION_SIZE};
pub use verify::{check_fee_payer, verify_signatures};

use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Error returned when a base58 string does not decode to the expected width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBase58Error {
    pub expected_len: usize,
}

impl fmt::Display for ParseBase58Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected base58 encoding of {} bytes", self.expected_len)
    }
}

impl std::error::Error for ParseBase58Error {}

macro_rules! base58_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&bs58::encode(&self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseBase58Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let err = ParseBase58Error { expected_len: $len };
                let bytes = bs58::decode(s).into_vec().map_err(|_| err.clone())?;
                let array: [u8; $len] = bytes.try_into().map_err(|_| err)?;
                Ok(Self(array))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

base58_bytes!(
    /// Ed25519 public key identifying an account or program.
    Pubkey,
    32
);
base58_bytes!(
    /// Recent blockhash: the freshness token bounding a transaction's lifetime.
    Hash,
    32
);
base58_bytes!(
    /// Ed25519 signature. Signature 0 doubles as the transaction identifier.
    Signature,
    64
);
base58_bytes!(
    /// SHA-256 of the message bytes, used for duplicate detection.
    TxIdentity,
    32
);

/// Message header: how many leading accounts sign, and which are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// Instruction as it appears on the wire: indices into the message's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A resolved account reference of a compiled instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef<'a> {
    pub index: u8,
    pub pubkey: &'a Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

/// Account metadata for building an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// Uncompiled instruction, used by clients to build a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Message {
    /// Compile instructions into a legacy message with `fee_payer` at index 0.
    ///
    /// Keys are ordered writable signers, read-only signers, writable
    /// non-signers, read-only non-signers; program ids are read-only.
    /// Fails when the instructions reference more than [`MAX_ACCOUNT_KEYS`]
    /// distinct accounts or more than 255 signers.
    pub fn new(
        fee_payer: &Pubkey,
        instructions: &[Instruction],
        recent_blockhash: Hash,
    ) -> Result<Self, crate::Error> {
        // (pubkey, is_signer, is_writable), merged by key.
        let mut metas: Vec<(Pubkey, bool, bool)> = vec![(*fee_payer, true, true)];
        let mut merge = |pubkey: Pubkey, is_signer: bool, is_writable: bool| {
            match metas.iter_mut().find(|(k, _, _)| *k == pubkey) {
                Some(entry) => {
                    entry.1 |= is_signer;
                    entry.2 |= is_writable;
                }
                None => metas.push((pubkey, is_signer, is_writable)),
            }
        };
        for ix in instructions {
            for meta in &ix.accounts {
                merge(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            merge(ix.program_id, false, false);
        }
        if metas.len() > MAX_ACCOUNT_KEYS {
            return Err(crate::Error::MalformedInput(format!(
                "{} account keys, limit is {MAX_ACCOUNT_KEYS}",
                metas.len()
            )));
        }

        let rank = |&(_, signer, writable): &(Pubkey, bool, bool)| -> u8 {
            match (signer, writable) {
                (true, true) => 0,
                (true, false) => 1,
                (false, true) => 2,
                (false, false) => 3,
            }
        };
        // Stable sort keeps the fee payer first among writable signers.
        metas.sort_by_key(rank);

        let count = |r: u8| metas.iter().filter(|m| rank(*m) == r).count();
        let signers = count(0) + count(1);
        if signers > u8::MAX as usize {
            return Err(crate::Error::MalformedInput(format!(
                "{signers} signers, limit is {}",
                u8::MAX
            )));
        }
        let header = MessageHeader {
            num_required_signatures: signers as u8,
            num_readonly_signed_accounts: count(1) as u8,
            num_readonly_unsigned_accounts: count(3) as u8,
        };
        let account_keys: Vec<Pubkey> = metas.into_iter().map(|(k, _, _)| k).collect();
        // Every key was merged above and the count is bounded, so indices fit.
        let position = |key: &Pubkey| -> Result<u8, crate::Error> {
            account_keys
                .iter()
                .position(|k| k == key)
                .and_then(|i| u8::try_from(i).ok())
                .ok_or_else(|| crate::Error::MalformedInput(format!("no account index for {key}")))
        };

        let instructions = instructions
            .iter()
            .map(|ix| -> Result<CompiledInstruction, crate::Error> {
                Ok(CompiledInstruction {
                    program_id_index: position(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|m| position(&m.pubkey))
                        .collect::<Result<_, _>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// The account paying the network fee (always index 0).
    pub fn fee_payer(&self) -> &Pubkey {
        &self.account_keys[0]
    }

    pub fn is_signer(&self, index: usize) -> bool {
        index < self.header.num_required_signatures as usize
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signed = self.header.num_required_signatures as usize;
        let total = self.account_keys.len();
        if index < signed {
            index < signed - self.header.num_readonly_signed_accounts as usize
        } else {
            index < total - self.header.num_readonly_unsigned_accounts as usize
        }
    }

    /// Keys of the accounts that must sign, fee payer first.
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    pub fn program_id(&self, ix: &CompiledInstruction) -> &Pubkey {
        &self.account_keys[ix.program_id_index as usize]
    }

    /// Resolve an instruction's account indices against this message.
    pub fn account_refs<'a>(
        &'a self,
        ix: &'a CompiledInstruction,
    ) -> impl Iterator<Item = AccountRef<'a>> + 'a {
        ix.accounts.iter().map(move |&index| AccountRef {
            index,
            pubkey: &self.account_keys[index as usize],
            is_signer: self.is_signer(index as usize),
            is_writable: self.is_writable(index as usize),
        })
    }

    /// Serialize to the legacy wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 32 * (self.account_keys.len() + 1));
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);
        decode::encode_shortvec(self.account_keys.len(), &mut out);
        for key in &self.account_keys {
            out.extend_from_slice(&key.0);
        }
        out.extend_from_slice(&self.recent_blockhash.0);
        decode::encode_shortvec(self.instructions.len(), &mut out);
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            decode::encode_shortvec(ix.accounts.len(), &mut out);
            out.extend_from_slice(&ix.accounts);
            decode::encode_shortvec(ix.data.len(), &mut out);
            out.extend_from_slice(&ix.data);
        }
        out
    }
}

/// A decoded transaction together with the exact message bytes it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
    message_bytes: Vec<u8>,
}

impl Transaction {
    /// Unsigned transaction with one empty signature slot per required signer.
    pub fn new_unsigned(message: Message) -> Self {
        let message_bytes = message.encode();
        Self {
            signatures: vec![
                Signature::default();
                message.header.num_required_signatures as usize
            ],
            message,
            message_bytes,
        }
    }

    pub(crate) fn from_parts(
        signatures: Vec<Signature>,
        message: Message,
        message_bytes: Vec<u8>,
    ) -> Self {
        Self {
            signatures,
            message,
            message_bytes,
        }
    }

    /// Bytes covered by every signature.
    pub fn message_bytes(&self) -> &[u8] {
        &self.message_bytes
    }

    /// Canonical identity used for duplicate detection.
    pub fn identity(&self) -> TxIdentity {
        TxIdentity(Sha256::digest(&self.message_bytes).into())
    }

    /// Transaction identifier as reported by the network (signature 0).
    pub fn id(&self) -> Signature {
        self.signatures.first().copied().unwrap_or_default()
    }

    /// `(signer, signature)` pairs in slot order, fee payer first.
    pub fn signer_pairs(&self) -> impl Iterator<Item = (&Pubkey, &Signature)> {
        self.message.signer_keys().iter().zip(self.signatures.iter())
    }

    /// Sign the slot belonging to `key`. Other slots are left untouched.
    pub fn partial_sign(&mut self, key: &SigningKey) -> Result<Signature, crate::Error> {
        let pubkey = Pubkey(key.verifying_key().to_bytes());
        let slot = self
            .message
            .signer_keys()
            .iter()
            .position(|k| *k == pubkey)
            .ok_or_else(|| {
                crate::Error::MalformedInput(format!("{pubkey} is not a required signer"))
            })?;
        let signature = Signature(key.sign(&self.message_bytes).to_bytes());
        self.signatures[slot] = signature;
        Ok(signature)
    }

    /// Serialize to the wire format: signatures followed by the message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 64 * self.signatures.len() + self.message_bytes.len());
        decode::encode_shortvec(self.signatures.len(), &mut out);
        for sig in &self.signatures {
            out.extend_from_slice(&sig.0);
        }
        out.extend_from_slice(&self.message_bytes);
        out
    }
}
