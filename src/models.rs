use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{LLMProviderConfig, LLM};
use crate::payment::PaymentGateway;
use crate::screenplay::{CritiqueOutcome, CritiqueSettings};
use crate::session::{CheckoutSession, PaymentStatus, SessionStore};
use crate::types::AppResult;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub payments: PaymentGateway,
    pub llm: Arc<LLM>,
    pub critique: CritiqueSettings,
    pub analyze_limiter: Arc<DefaultDirectRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Config) -> AppResult<Self> {
        let payments = PaymentGateway::from_config(&config)?;
        let llm = LLM::new(LLMProviderConfig {
            name: config.llm.provider.clone(),
            api_key: config.llm.google_api_key.clone(),
            api_base: Some(config.llm.api_base.clone()),
        })?;
        Ok(Self::new(config, payments, llm))
    }

    pub fn new(config: Config, payments: PaymentGateway, llm: LLM) -> Self {
        let per_minute =
            NonZeroU32::new(config.server.analyze_rate_per_minute).unwrap_or(NonZeroU32::MIN);
        let critique = CritiqueSettings {
            provider: config.llm.provider.clone(),
            model: config.llm.model.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
        };

        Self {
            sessions: SessionStore::new(config.server.session_ttl),
            payments,
            llm: Arc::new(llm),
            critique,
            analyze_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            config,
        }
    }
}

// Request / response bodies

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestResponse {
    pub session_id: Uuid,
    pub payment_url: String,
    pub qr_svg: String,
    pub amount_sol: String,
    pub recipient: String,
    pub reference: String,
    /// Whether the server can pay from its own demo wallet on confirm.
    pub customer_wallet_configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub session_id: Uuid,
    pub signature: String,
    pub slot: Option<u64>,
    pub block_time: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub payment_url: String,
    pub amount_sol: String,
    pub reference: String,
    pub status: PaymentStatus,
    pub analyses: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CheckoutSession> for SessionView {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id,
            payment_url: session.payment_url,
            amount_sol: session.request.amount.to_sol_string(),
            reference: session.request.reference.to_string(),
            status: session.status,
            analyses: session.analyses,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: Uuid,
    pub filename: Option<String>,
    pub pages: usize,
    pub characters: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_pages: Vec<u32>,
    pub outcome: CritiqueOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub rpc_url: String,
    pub llm_provider: String,
    pub active_sessions: usize,
}
