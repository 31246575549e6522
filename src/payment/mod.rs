//! Solana Pay checkout
//!
//! - `keys` - base58 pubkeys, ed25519 keypairs
//! - `solana_pay` - transfer-request URIs and lamport amounts
//! - `qr` - QR code rendering for the URI
//! - `transaction` - signed System transfers carrying the reference key
//! - `rpc` - JSON-RPC client
//! - `confirm` - find-by-reference and transfer validation

pub mod confirm;
pub mod keys;
pub mod qr;
pub mod rpc;
pub mod solana_pay;
pub mod transaction;

pub use confirm::{confirm_transfer, validate_transfer, ConfirmPolicy, Confirmation};
pub use keys::{KeyError, Keypair, Pubkey};
pub use qr::render_svg;
pub use rpc::SolanaRpcClient;
pub use solana_pay::{AmountError, Lamports, TransferRequest, UriError, LAMPORTS_PER_SOL};
pub use transaction::{Blockhash, Message, Transaction};

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{Config, ConfigError};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid key: {0}")]
    Key(#[from] KeyError),

    #[error("Invalid payment URI: {0}")]
    Uri(#[from] UriError),

    #[error("Failed to render QR code: {0}")]
    QrCode(String),

    #[error("Solana RPC error: {0}")]
    Rpc(String),

    #[error("Payment not found after {attempts} attempts. Complete the payment in your wallet and try again.")]
    NotFound { attempts: u32 },

    #[error("Transaction failed on-chain: {0}")]
    TransactionFailed(String),

    #[error("Transaction does not carry this checkout's reference")]
    ReferenceMissing,

    #[error("Transaction does not pay the merchant wallet")]
    RecipientMissing,

    #[error("Amount not transferred: expected {expected} lamports, received {received}")]
    AmountMismatch { expected: u64, received: u64 },

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),
}

/// Fixed terms every checkout is issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutTerms {
    pub amount: Lamports,
    pub label: Option<String>,
    pub message: Option<String>,
    pub memo: Option<String>,
}

/// Issues transfer requests to the merchant wallet and confirms them on-chain.
///
/// When a customer keypair is configured the gateway can also pay its own
/// requests, which is how the demo checkout completes without a wallet app.
#[derive(Clone)]
pub struct PaymentGateway {
    rpc: SolanaRpcClient,
    merchant: Pubkey,
    customer: Option<Arc<Keypair>>,
    terms: CheckoutTerms,
    policy: ConfirmPolicy,
}

impl PaymentGateway {
    pub fn new(
        rpc: SolanaRpcClient,
        merchant: Pubkey,
        customer: Option<Keypair>,
        terms: CheckoutTerms,
        policy: ConfirmPolicy,
    ) -> Self {
        Self {
            rpc,
            merchant,
            customer: customer.map(Arc::new),
            terms,
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let merchant = config.solana.merchant_wallet()?;
        let customer = config.solana.customer_keypair()?;
        if let Some(customer) = &customer {
            if customer.pubkey() == merchant {
                return Err(ConfigError::Invalid {
                    key: "CUSTOMER_WALLET_PRIVATE_KEY".to_string(),
                    message: "customer wallet must differ from the merchant wallet".to_string(),
                });
            }
        }

        info!(
            merchant = %merchant,
            customer = ?customer.as_ref().map(|k| k.pubkey()),
            amount = %config.payment.amount,
            rpc = %config.solana.api_url,
            "Payment gateway configured"
        );

        Ok(Self::new(
            SolanaRpcClient::new(config.solana.api_url.clone()),
            merchant,
            customer,
            config.payment.terms(),
            config.payment.confirm_policy(),
        ))
    }

    pub fn merchant(&self) -> &Pubkey {
        &self.merchant
    }

    pub fn terms(&self) -> &CheckoutTerms {
        &self.terms
    }

    pub fn policy(&self) -> ConfirmPolicy {
        self.policy
    }

    pub fn has_customer_wallet(&self) -> bool {
        self.customer.is_some()
    }

    /// A new transfer request with a fresh one-time reference key.
    pub fn request_payment(&self) -> TransferRequest {
        TransferRequest {
            recipient: self.merchant,
            amount: self.terms.amount,
            reference: Pubkey::new_unique(),
            label: self.terms.label.clone(),
            message: self.terms.message.clone(),
            memo: self.terms.memo.clone(),
        }
    }

    /// Pay `request` from the configured customer wallet.
    ///
    /// Returns the submitted signature, or `None` when no customer wallet is
    /// configured and the payment is expected to come from a wallet app.
    pub async fn submit_customer_payment(
        &self,
        request: &TransferRequest,
    ) -> Result<Option<String>, PaymentError> {
        let Some(customer) = self.customer.as_deref() else {
            return Ok(None);
        };

        let latest = self.rpc.get_latest_blockhash().await?;
        let blockhash: Blockhash = latest.blockhash.parse()?;
        let message = Message::transfer_with_reference(
            &customer.pubkey(),
            &request.recipient,
            request.amount,
            &request.reference,
            blockhash,
        )?;
        let tx = Transaction::sign(message, customer)?;
        let signature = self.rpc.send_transaction(&tx).await?;

        info!(
            reference = %request.reference,
            signature = %signature,
            amount = %request.amount,
            "Customer payment submitted"
        );
        Ok(Some(signature))
    }

    /// Whether `signature` has landed on chain as a failed transaction.
    /// A transaction that is not retrievable yet has not failed.
    pub async fn transfer_failed(&self, signature: &str) -> Result<bool, PaymentError> {
        Ok(self
            .rpc
            .get_transaction(signature)
            .await?
            .and_then(|tx| tx.meta)
            .map(|meta| meta.err.is_some())
            .unwrap_or(false))
    }

    /// Bounded poll for the request's payment.
    pub async fn confirm(&self, request: &TransferRequest) -> Result<Confirmation, PaymentError> {
        confirm_transfer(&self.rpc, request, self.policy).await
    }
}
