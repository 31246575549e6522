//! Solana Pay transfer requests: `solana:<recipient>?amount=..&reference=..`

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

use super::keys::{KeyError, Pubkey};

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
const SOL_DECIMALS: usize = 9;
const SCHEME: &str = "solana:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a decimal SOL amount")]
    NotDecimal(String),

    #[error("'{0}' has more than 9 decimal places")]
    TooPrecise(String),

    #[error("'{0}' is too large")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("URI must start with 'solana:'")]
    Scheme,

    #[error("invalid recipient: {0}")]
    Recipient(KeyError),

    #[error("invalid reference: {0}")]
    Reference(KeyError),

    #[error("invalid amount: {0}")]
    Amount(AmountError),

    #[error("missing '{0}' parameter")]
    Missing(&'static str),
}

/// An amount of SOL in its smallest unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lamports(pub u64);

impl Lamports {
    /// Parse a decimal SOL amount ("0.001", "2", "1.5") without going
    /// through floating point.
    pub fn from_sol_str(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction)
        {
            return Err(AmountError::NotDecimal(s.to_string()));
        }
        if fraction.len() > SOL_DECIMALS {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| AmountError::Overflow(s.to_string()))?
        };
        let fraction: u64 = if fraction.is_empty() {
            0
        } else {
            format!("{:0<width$}", fraction, width = SOL_DECIMALS)
                .parse()
                .map_err(|_| AmountError::NotDecimal(s.to_string()))?
        };

        whole
            .checked_mul(LAMPORTS_PER_SOL)
            .and_then(|l| l.checked_add(fraction))
            .map(Lamports)
            .ok_or_else(|| AmountError::Overflow(s.to_string()))
    }

    /// Decimal SOL with trailing zeros removed, as wallets expect in a URI.
    pub fn to_sol_string(&self) -> String {
        let whole = self.0 / LAMPORTS_PER_SOL;
        let fraction = self.0 % LAMPORTS_PER_SOL;
        if fraction == 0 {
            return whole.to_string();
        }
        let fraction = format!("{:09}", fraction);
        format!("{}.{}", whole, fraction.trim_end_matches('0'))
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} SOL", self.to_sol_string())
    }
}

/// A native-SOL transfer request carrying a one-time reference key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub recipient: Pubkey,
    pub amount: Lamports,
    pub reference: Pubkey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl TransferRequest {
    pub fn to_uri(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("amount", &self.amount.to_sol_string());
        query.append_pair("reference", &self.reference.to_string());
        if let Some(label) = &self.label {
            query.append_pair("label", label);
        }
        if let Some(message) = &self.message {
            query.append_pair("message", message);
        }
        if let Some(memo) = &self.memo {
            query.append_pair("memo", memo);
        }
        format!("{}{}?{}", SCHEME, self.recipient, query.finish())
    }

    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let rest = uri.trim().strip_prefix(SCHEME).ok_or(UriError::Scheme)?;
        let (recipient, query) = rest.split_once('?').unwrap_or((rest, ""));
        let recipient: Pubkey = recipient.parse().map_err(UriError::Recipient)?;

        let mut amount = None;
        let mut reference = None;
        let mut label = None;
        let mut message = None;
        let mut memo = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "amount" => {
                    amount = Some(Lamports::from_sol_str(&value).map_err(UriError::Amount)?)
                }
                // Solana Pay allows several references; the first one identifies the checkout.
                "reference" if reference.is_none() => {
                    reference = Some(value.parse::<Pubkey>().map_err(UriError::Reference)?)
                }
                "label" => label = Some(value.into_owned()),
                "message" => message = Some(value.into_owned()),
                "memo" => memo = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            recipient,
            amount: amount.ok_or(UriError::Missing("amount"))?,
            reference: reference.ok_or(UriError::Missing("reference"))?,
            label,
            message,
            memo,
        })
    }
}
