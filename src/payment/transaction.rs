//! Legacy-format Solana transactions, just enough to move SOL from the
//! customer wallet to the merchant with the checkout reference attached.
//!
//! Layout of a serialized transaction:
//!
//! ```text
//! compact-u16 signature count | 64-byte signatures
//! message:
//!   header [required signatures, readonly signed, readonly unsigned]
//!   compact-u16 key count | 32-byte keys
//!   32-byte recent blockhash
//!   compact-u16 instruction count | instructions
//!     program id index | compact-u16 len + account indices | compact-u16 len + data
//! ```

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::keys::{decode_base58_32, KeyError, Keypair, Pubkey};
use super::solana_pay::Lamports;
use super::PaymentError;

pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

/// System program instruction index for `Transfer`.
const SYSTEM_TRANSFER: u32 = 2;

/// Append `value` using Solana's compact-u16 (7 bits per byte) encoding.
pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut rest = value;
    loop {
        let byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> Result<(), PaymentError> {
    let len = u16::try_from(len)
        .map_err(|_| PaymentError::InvalidTransfer(format!("{} entries do not fit a transaction", len)))?;
    encode_compact_u16(len, out);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blockhash([u8; 32]);

impl FromStr for Blockhash {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_base58_32(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// A single System `Transfer` with `reference` appended as a read-only,
    /// non-signer account so the payment can later be found by reference.
    pub fn transfer_with_reference(
        from: &Pubkey,
        to: &Pubkey,
        amount: Lamports,
        reference: &Pubkey,
        recent_blockhash: Blockhash,
    ) -> Result<Self, PaymentError> {
        if from == to {
            return Err(PaymentError::InvalidTransfer(
                "customer and merchant wallets must differ".to_string(),
            ));
        }
        if reference == from || reference == to {
            return Err(PaymentError::InvalidTransfer(
                "reference must not be one of the transfer wallets".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
        data.extend_from_slice(&amount.0.to_le_bytes());

        // Order: writable signer, writable non-signer, read-only non-signers.
        Ok(Self {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 2,
            },
            account_keys: vec![*from, *to, *reference, SYSTEM_PROGRAM_ID],
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index: 3,
                accounts: vec![0, 1, 2],
                data,
            }],
        })
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PaymentError> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        encode_len(self.account_keys.len(), &mut out)?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash.0);
        encode_len(self.instructions.len(), &mut out)?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_len(ix.accounts.len(), &mut out)?;
            out.extend_from_slice(&ix.accounts);
            encode_len(ix.data.len(), &mut out)?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    signatures: Vec<[u8; 64]>,
    message: Message,
    message_bytes: Vec<u8>,
}

impl Transaction {
    /// Sign a message whose only required signer is `payer`.
    pub fn sign(message: Message, payer: &Keypair) -> Result<Self, PaymentError> {
        if message.header.num_required_signatures != 1
            || message.fee_payer() != Some(&payer.pubkey())
        {
            return Err(PaymentError::InvalidTransfer(
                "message must be signed by its fee payer alone".to_string(),
            ));
        }
        let message_bytes = message.serialize()?;
        let signature = payer.sign(&message_bytes);
        Ok(Self {
            signatures: vec![signature],
            message,
            message_bytes,
        })
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Transaction id: base58 of the fee payer's signature.
    pub fn signature(&self) -> String {
        self.signatures
            .first()
            .map(|sig| bs58::encode(sig).into_string())
            .unwrap_or_default()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PaymentError> {
        let mut out = Vec::with_capacity(1 + 64 * self.signatures.len() + self.message_bytes.len());
        encode_len(self.signatures.len(), &mut out)?;
        for sig in &self.signatures {
            out.extend_from_slice(sig);
        }
        out.extend_from_slice(&self.message_bytes);
        Ok(out)
    }

    pub fn to_base64(&self) -> Result<String, PaymentError> {
        Ok(BASE64.encode(self.serialize()?))
    }
}
