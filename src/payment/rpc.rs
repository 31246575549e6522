//! Minimal Solana JSON-RPC client.
//! API Reference: https://solana.com/docs/rpc/http

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::keys::Pubkey;
use super::transaction::Transaction;
use super::PaymentError;

pub const DEFAULT_COMMITMENT: &str = "confirmed";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: EncodedTransaction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub loaded_addresses: Option<LoadedAddresses>,
}

/// Keys pulled in through address lookup tables (v0 transactions).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadedAddresses {
    #[serde(default)]
    pub writable: Vec<String>,
    #[serde(default)]
    pub readonly: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodedTransaction {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: UiMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiMessage {
    pub account_keys: Vec<String>,
}

impl ConfirmedTransaction {
    /// All account keys in balance-array order: static keys, then loaded
    /// writable, then loaded read-only.
    pub fn account_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .transaction
            .message
            .account_keys
            .iter()
            .map(String::as_str)
            .collect();
        if let Some(loaded) = self.meta.as_ref().and_then(|m| m.loaded_addresses.as_ref()) {
            keys.extend(loaded.writable.iter().map(String::as_str));
            keys.extend(loaded.readonly.iter().map(String::as_str));
        }
        keys
    }
}

#[derive(Clone)]
pub struct SolanaRpcClient {
    client: Client,
    url: String,
    commitment: String,
    next_id: Arc<AtomicU64>,
}

impl SolanaRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, PaymentError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Solana RPC call");

        let response = self
            .client
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|e| PaymentError::Rpc(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rpc(format!("{} returned HTTP {}: {}", method, status, body)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Rpc(format!("{} returned malformed JSON: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(PaymentError::Rpc(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        serde_json::from_value(body.result)
            .map_err(|e| PaymentError::Rpc(format!("{} returned an unexpected result: {}", method, e)))
    }

    pub async fn get_latest_blockhash(&self) -> Result<LatestBlockhash, PaymentError> {
        let wrapped: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment }]),
            )
            .await?;
        Ok(wrapped.value)
    }

    /// Submit a signed transaction; returns its signature.
    pub async fn send_transaction(&self, tx: &Transaction) -> Result<String, PaymentError> {
        self.call(
            "sendTransaction",
            json!([
                tx.to_base64()?,
                { "encoding": "base64", "preflightCommitment": self.commitment }
            ]),
        )
        .await
    }

    /// Signatures touching `address`, newest first.
    pub async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, PaymentError> {
        self.call(
            "getSignaturesForAddress",
            json!([address.to_string(), { "limit": limit, "commitment": self.commitment }]),
        )
        .await
    }

    /// `None` while the transaction is not yet available at our commitment.
    pub async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, PaymentError> {
        self.call(
            "getTransaction",
            json!([
                signature,
                {
                    "encoding": "json",
                    "commitment": self.commitment,
                    "maxSupportedTransactionVersion": 0
                }
            ]),
        )
        .await
    }
}
