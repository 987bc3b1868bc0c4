//! Wire-format decoder. Pure function of its input.

use super::{CompiledInstruction, Hash, Message, MessageHeader, Pubkey, Signature, Transaction};
use crate::Error;
use std::collections::HashSet;

/// Largest serialized transaction the network accepts (one packet).
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Account indices are a single byte.
pub const MAX_ACCOUNT_KEYS: usize = u8::MAX as usize + 1;

/// Versioned messages set the top bit of the first message byte.
const VERSION_PREFIX_MASK: u8 = 0x80;

/// Decode a serialized legacy transaction.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, Error> {
    if bytes.is_empty() {
        return Err(malformed("empty transaction"));
    }
    if bytes.len() > MAX_TRANSACTION_SIZE {
        return Err(malformed(format!(
            "transaction is {} bytes, limit is {MAX_TRANSACTION_SIZE}",
            bytes.len()
        )));
    }

    let mut reader = Reader::new(bytes);

    let sig_count = reader.read_shortvec("signature count")?;
    let mut signatures = Vec::with_capacity(sig_count.min(64));
    for _ in 0..sig_count {
        signatures.push(Signature(reader.read_array("signature")?));
    }

    let message_start = reader.pos;
    let message = decode_message(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(malformed(format!(
            "{} trailing bytes after message",
            reader.remaining()
        )));
    }

    if signatures.len() != message.header.num_required_signatures as usize {
        return Err(malformed(format!(
            "{} signatures for {} required signers",
            signatures.len(),
            message.header.num_required_signatures
        )));
    }

    let message_bytes = bytes[message_start..].to_vec();
    Ok(Transaction::from_parts(signatures, message, message_bytes))
}

fn decode_message(reader: &mut Reader<'_>) -> Result<Message, Error> {
    let first = reader.peek_u8("message header")?;
    if first & VERSION_PREFIX_MASK != 0 {
        return Err(malformed(format!(
            "versioned message (v{}) is not supported",
            first & !VERSION_PREFIX_MASK
        )));
    }

    let header = MessageHeader {
        num_required_signatures: reader.read_u8("message header")?,
        num_readonly_signed_accounts: reader.read_u8("message header")?,
        num_readonly_unsigned_accounts: reader.read_u8("message header")?,
    };

    let key_count = reader.read_shortvec("account key count")?;
    if key_count > MAX_ACCOUNT_KEYS {
        return Err(malformed(format!("{key_count} account keys")));
    }
    let mut account_keys = Vec::with_capacity(key_count);
    let mut seen = HashSet::with_capacity(key_count);
    for _ in 0..key_count {
        let key = Pubkey(reader.read_array("account key")?);
        if !seen.insert(key) {
            return Err(malformed(format!("duplicate account key {key}")));
        }
        account_keys.push(key);
    }
    check_header(&header, account_keys.len())?;

    let recent_blockhash = Hash(reader.read_array("recent blockhash")?);

    let ix_count = reader.read_shortvec("instruction count")?;
    let mut instructions = Vec::with_capacity(ix_count.min(64));
    for n in 0..ix_count {
        let program_id_index = reader.read_u8("program id index")?;
        check_index(program_id_index, key_count, n, "program id")?;
        if program_id_index == 0 {
            return Err(malformed(format!(
                "instruction {n} invokes the fee payer as a program"
            )));
        }

        let account_len = reader.read_shortvec("instruction account count")?;
        let accounts = reader.read_bytes(account_len, "instruction accounts")?.to_vec();
        for &index in &accounts {
            check_index(index, key_count, n, "account")?;
        }

        let data_len = reader.read_shortvec("instruction data length")?;
        let data = reader.read_bytes(data_len, "instruction data")?.to_vec();

        instructions.push(CompiledInstruction {
            program_id_index,
            accounts,
            data,
        });
    }

    Ok(Message {
        header,
        account_keys,
        recent_blockhash,
        instructions,
    })
}

fn check_header(header: &MessageHeader, key_count: usize) -> Result<(), Error> {
    let signed = header.num_required_signatures as usize;
    if signed == 0 {
        return Err(malformed("message requires no signatures"));
    }
    if signed > key_count {
        return Err(malformed(format!(
            "{signed} required signers but only {key_count} account keys"
        )));
    }
    // The fee payer must stay a writable signer.
    if header.num_readonly_signed_accounts as usize >= signed {
        return Err(malformed("fee payer is marked read-only"));
    }
    if header.num_readonly_unsigned_accounts as usize > key_count - signed {
        return Err(malformed(format!(
            "{} read-only unsigned accounts but only {} unsigned keys",
            header.num_readonly_unsigned_accounts,
            key_count - signed
        )));
    }
    Ok(())
}

fn check_index(index: u8, key_count: usize, ix: usize, what: &str) -> Result<(), Error> {
    if index as usize >= key_count {
        return Err(malformed(format!(
            "instruction {ix} {what} index {index} out of bounds ({key_count} keys)"
        )));
    }
    Ok(())
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedInput(msg.into())
}

/// Compact-u16 length prefix.
pub(crate) fn encode_shortvec(len: usize, out: &mut Vec<u8>) {
    let mut rem = len as u16;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn peek_u8(&self, what: &str) -> Result<u8, Error> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| truncated(what))
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, Error> {
        let byte = self.peek_u8(what)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(truncated(what));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, what)?);
        Ok(out)
    }

    /// Compact-u16: at most three bytes, no redundant continuation.
    fn read_shortvec(&mut self, what: &str) -> Result<usize, Error> {
        let mut value: u32 = 0;
        for i in 0..3 {
            let byte = self.read_u8(what)?;
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                if i > 0 && byte == 0 {
                    return Err(malformed(format!("non-canonical {what}")));
                }
                if i == 2 && byte > 0x03 {
                    return Err(malformed(format!("{what} overflows u16")));
                }
                return Ok(value as usize);
            }
        }
        Err(malformed(format!("{what} longer than three bytes")))
    }
}

fn truncated(what: &str) -> Error {
    malformed(format!("truncated while reading {what}"))
}
