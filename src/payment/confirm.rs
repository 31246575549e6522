//! Finding a payment by its reference key and checking it paid what was asked.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::rpc::{ConfirmedTransaction, SolanaRpcClient};
use super::solana_pay::TransferRequest;
use super::PaymentError;
use crate::utils::poll_fixed;

/// Enough history to reach the oldest signature of a fresh reference key.
const SIGNATURE_PAGE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
}

/// Check a fetched transaction against the transfer request: it succeeded,
/// it carries the reference, and the recipient gained at least the amount.
pub fn validate_transfer(
    tx: &ConfirmedTransaction,
    request: &TransferRequest,
) -> Result<(), PaymentError> {
    let meta = tx
        .meta
        .as_ref()
        .ok_or_else(|| PaymentError::TransactionFailed("transaction has no status metadata".to_string()))?;
    if let Some(err) = &meta.err {
        return Err(PaymentError::TransactionFailed(err.to_string()));
    }

    let keys = tx.account_keys();
    let reference = request.reference.to_string();
    if !keys.iter().any(|key| *key == reference) {
        return Err(PaymentError::ReferenceMissing);
    }

    let recipient = request.recipient.to_string();
    let index = keys
        .iter()
        .position(|key| *key == recipient)
        .ok_or(PaymentError::RecipientMissing)?;
    let (pre, post) = match (meta.pre_balances.get(index), meta.post_balances.get(index)) {
        (Some(pre), Some(post)) => (*pre, *post),
        _ => return Err(PaymentError::RecipientMissing),
    };

    let received = post.saturating_sub(pre);
    if received < request.amount.0 {
        return Err(PaymentError::AmountMismatch {
            expected: request.amount.0,
            received,
        });
    }
    Ok(())
}

/// Poll for a transaction carrying the request's reference and validate it.
///
/// Each attempt looks up signatures for the reference (oldest successful
/// one wins, failed ones are skipped) and
/// fetches that transaction; a miss at either step waits for the next
/// attempt. A transaction that is found but fails validation is final.
pub async fn confirm_transfer(
    rpc: &SolanaRpcClient,
    request: &TransferRequest,
    policy: ConfirmPolicy,
) -> Result<Confirmation, PaymentError> {
    let found = poll_fixed::<_, _, Confirmation, PaymentError>(
        policy.attempts,
        policy.interval,
        |attempt| async move {
            let signatures = rpc
                .get_signatures_for_address(&request.reference, SIGNATURE_PAGE)
                .await?;
            // Newest first; failed transfers never count as payment.
            let Some(oldest) = signatures.iter().rev().find(|info| info.err.is_none()) else {
                debug!(
                    attempt,
                    reference = %request.reference,
                    seen = signatures.len(),
                    "No successful signature for reference"
                );
                return Ok(None);
            };

            let Some(tx) = rpc.get_transaction(&oldest.signature).await? else {
                debug!(attempt, signature = %oldest.signature, "Transaction not yet available");
                return Ok(None);
            };

            validate_transfer(&tx, request)?;
            Ok(Some(Confirmation {
                signature: oldest.signature.clone(),
                slot: tx.slot,
                block_time: tx.block_time,
            }))
        },
    )
    .await?;

    match found {
        Some(confirmation) => {
            info!(
                reference = %request.reference,
                signature = %confirmation.signature,
                slot = confirmation.slot,
                "Payment confirmed"
            );
            Ok(confirmation)
        }
        None => Err(PaymentError::NotFound {
            attempts: policy.attempts,
        }),
    }
}
