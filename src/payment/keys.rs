//! Ed25519 keys the way Solana names them: base58 public keys and
//! signing keypairs loaded from hex secrets.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const PUBKEY_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid base58 string: {0}")]
    Base58(String),

    #[error("expected 32 bytes, got {0}")]
    Length(usize),

    #[error("invalid hexadecimal string: {0}")]
    Hex(String),

    #[error("expected a 32-byte seed or a 64-byte keypair, got {0} bytes")]
    SecretLength(usize),

    #[error("public half of the keypair does not match its secret")]
    Mismatch,
}

/// Decode a base58 string that must hold exactly 32 bytes (pubkeys, blockhashes).
pub(crate) fn decode_base58_32(s: &str) -> Result<[u8; PUBKEY_BYTES], KeyError> {
    let bytes = bs58::decode(s.trim())
        .into_vec()
        .map_err(|e| KeyError::Base58(e.to_string()))?;
    <[u8; PUBKEY_BYTES]>::try_from(bytes.as_slice()).map_err(|_| KeyError::Length(bytes.len()))
}

/// A Solana account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    pub const fn new(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_BYTES] {
        &self.0
    }

    /// A fresh one-time key, used as a payment reference.
    pub fn new_unique() -> Self {
        Keypair::generate().pubkey()
    }
}

impl FromStr for Pubkey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_base58_32(s).map(Self)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A signing keypair. Debug output only ever shows the public half.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Accepts either a 32-byte secret seed or the 64-byte `secret || public`
    /// form most wallets export, hex encoded.
    pub fn from_hex(secret: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(secret.trim()).map_err(|e| KeyError::Hex(e.to_string()))?;
        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                Ok(Self {
                    signing: SigningKey::from_bytes(&seed),
                })
            }
            64 => {
                let mut pair = [0u8; 64];
                pair.copy_from_slice(&bytes);
                let signing =
                    SigningKey::from_keypair_bytes(&pair).map_err(|_| KeyError::Mismatch)?;
                Ok(Self { signing })
            }
            other => Err(KeyError::SecretLength(other)),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}
