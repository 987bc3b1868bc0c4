//! SPL Token instruction layouts the relay understands.

use crate::transaction::{AccountMeta, AccountRef, CompiledInstruction, Instruction, Message, Pubkey};

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// `TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb`
pub const TOKEN_2022_PROGRAM_ID: Pubkey = Pubkey::new([
    6, 221, 246, 225, 238, 117, 143, 222, 24, 66, 93, 188, 228, 108, 205, 218, 182, 26, 252, 77,
    131, 185, 13, 39, 254, 189, 249, 40, 216, 161, 139, 252,
]);

/// `MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr`
pub const MEMO_PROGRAM_ID: Pubkey = Pubkey::new([
    5, 74, 83, 90, 153, 41, 33, 6, 77, 36, 232, 113, 96, 218, 56, 124, 124, 53, 181, 221, 188,
    146, 187, 129, 228, 31, 168, 64, 65, 5, 68, 141,
]);

pub const TRANSFER: u8 = 3;
pub const TRANSFER_CHECKED: u8 = 12;

pub fn is_token_program(program_id: &Pubkey) -> bool {
    *program_id == TOKEN_PROGRAM_ID || *program_id == TOKEN_2022_PROGRAM_ID
}

/// A decoded `Transfer` or `TransferChecked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer<'a> {
    pub source: &'a Pubkey,
    /// Only present for `TransferChecked`.
    pub mint: Option<&'a Pubkey>,
    pub destination: &'a Pubkey,
    pub authority: AccountRef<'a>,
    pub amount: u64,
    /// Only present for `TransferChecked`.
    pub decimals: Option<u8>,
}

/// Decode a token transfer, or `None` if `ix` is anything else.
pub fn parse_transfer<'a>(
    message: &'a Message,
    ix: &'a CompiledInstruction,
) -> Option<TokenTransfer<'a>> {
    if !is_token_program(message.program_id(ix)) {
        return None;
    }
    let refs: Vec<AccountRef<'a>> = message.account_refs(ix).collect();
    let amount = |data: &[u8]| -> Option<u64> {
        let bytes: [u8; 8] = data.get(1..9)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    };

    match ix.data.first().copied() {
        Some(TRANSFER) if ix.data.len() == 9 && refs.len() >= 3 => Some(TokenTransfer {
            source: refs[0].pubkey,
            mint: None,
            destination: refs[1].pubkey,
            authority: refs[2],
            amount: amount(&ix.data)?,
            decimals: None,
        }),
        Some(TRANSFER_CHECKED) if ix.data.len() == 10 && refs.len() >= 4 => Some(TokenTransfer {
            source: refs[0].pubkey,
            mint: Some(refs[1].pubkey),
            destination: refs[2].pubkey,
            authority: refs[3],
            amount: amount(&ix.data)?,
            decimals: Some(ix.data[9]),
        }),
        _ => None,
    }
}

/// Build an SPL Token `Transfer`.
pub fn transfer(source: Pubkey, destination: Pubkey, authority: Pubkey, amount: u64) -> Instruction {
    let mut data = vec![TRANSFER];
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(source, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(authority, true),
        ],
        data,
    }
}

/// Build an SPL Token `TransferChecked`.
pub fn transfer_checked(
    source: Pubkey,
    mint: Pubkey,
    destination: Pubkey,
    authority: Pubkey,
    amount: u64,
    decimals: u8,
) -> Instruction {
    let mut data = vec![TRANSFER_CHECKED];
    data.extend_from_slice(&amount.to_le_bytes());
    data.push(decimals);
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(source, false),
            AccountMeta::new_readonly(mint, false),
            AccountMeta::new(destination, false),
            AccountMeta::new_readonly(authority, true),
        ],
        data,
    }
}

/// Build a Memo instruction.
pub fn memo(text: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![],
        data: text.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::unique_pubkey;
    use crate::transaction::Hash;

    #[test]
    fn test_program_ids_match_base58() {
        assert_eq!(
            TOKEN_PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
        assert_eq!(
            TOKEN_2022_PROGRAM_ID.to_string(),
            "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"
        );
        assert_eq!(
            MEMO_PROGRAM_ID.to_string(),
            "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr"
        );
    }

    #[test]
    fn test_parse_transfer() {
        let (src, dst, owner) = (unique_pubkey(2), unique_pubkey(3), unique_pubkey(4));
        let msg = Message::new(
            &unique_pubkey(1),
            &[transfer(src, dst, owner, 100)],
            Hash::default(),
        ).unwrap();
        let parsed = parse_transfer(&msg, &msg.instructions[0]).unwrap();
        assert_eq!(parsed.source, &src);
        assert_eq!(parsed.destination, &dst);
        assert_eq!(parsed.authority.pubkey, &owner);
        assert!(parsed.authority.is_signer);
        assert_eq!(parsed.amount, 100);
        assert_eq!(parsed.mint, None);
    }

    #[test]
    fn test_parse_transfer_checked() {
        let (src, mint, dst, owner) = (
            unique_pubkey(2),
            unique_pubkey(5),
            unique_pubkey(3),
            unique_pubkey(4),
        );
        let msg = Message::new(
            &unique_pubkey(1),
            &[transfer_checked(src, mint, dst, owner, 250, 6)],
            Hash::default(),
        ).unwrap();
        let parsed = parse_transfer(&msg, &msg.instructions[0]).unwrap();
        assert_eq!(parsed.mint, Some(&mint));
        assert_eq!(parsed.destination, &dst);
        assert_eq!(parsed.amount, 250);
        assert_eq!(parsed.decimals, Some(6));
    }

    #[test]
    fn test_parse_ignores_other_instructions() {
        let msg = Message::new(&unique_pubkey(1), &[memo("hello")], Hash::default()).unwrap();
        assert!(parse_transfer(&msg, &msg.instructions[0]).is_none());
    }

    #[test]
    fn test_parse_rejects_short_data() {
        let mut ix = transfer(unique_pubkey(2), unique_pubkey(3), unique_pubkey(4), 1);
        ix.data.truncate(5);
        let msg = Message::new(&unique_pubkey(1), &[ix], Hash::default()).unwrap();
        assert!(parse_transfer(&msg, &msg.instructions[0]).is_none());
    }
}
