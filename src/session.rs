use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::payment::TransferRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentStatus {
    Requested,
    Submitted { signature: String },
    Confirmed { signature: String },
}

/// Everything one checkout needs across requests: the transfer it asked
/// for and how far payment has got.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub request: TransferRequest,
    pub payment_url: String,
    pub status: PaymentStatus,
    pub confirming: bool,
    pub analyses: u32,
    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn new(request: TransferRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_url: request.to_uri(),
            request,
            status: PaymentStatus::Requested,
            confirming: false,
            analyses: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, PaymentStatus::Confirmed { .. })
    }

    pub fn confirmed_signature(&self) -> Option<&str> {
        match &self.status {
            PaymentStatus::Confirmed { signature } => Some(signature),
            _ => None,
        }
    }

    /// Signature of a payment already sent for this checkout, if any.
    pub fn submitted_signature(&self) -> Option<&str> {
        match &self.status {
            PaymentStatus::Requested => None,
            PaymentStatus::Submitted { signature } | PaymentStatus::Confirmed { signature } => {
                Some(signature)
            }
        }
    }

    pub fn mark_submitted(&mut self, signature: String) {
        if self.status == PaymentStatus::Requested {
            self.status = PaymentStatus::Submitted { signature };
        }
    }

    /// Forget a submitted transfer that failed on chain so the next
    /// confirm can pay again. Only the failed signature is cleared.
    pub fn clear_failed_submission(&mut self, signature: &str) {
        if matches!(&self.status, PaymentStatus::Submitted { signature: s } if s == signature) {
            self.status = PaymentStatus::Requested;
        }
    }

    /// Confirmation is final; later calls keep the first signature.
    pub fn mark_confirmed(&mut self, signature: String) {
        if !self.is_confirmed() {
            self.status = PaymentStatus::Confirmed { signature };
        }
    }

    fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.created_at)
            .to_std()
            .map(|age| age > ttl)
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, CheckoutSession>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            ttl,
        }
    }

    /// Store a new session, dropping any that have outlived the TTL.
    pub async fn insert(&self, session: CheckoutSession) {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        guard.retain(|_, existing| !existing.expired(now, self.ttl));
        guard.insert(session.id, session);
    }

    pub async fn get(&self, id: &Uuid) -> Option<CheckoutSession> {
        let guard = self.inner.read().await;
        guard.get(id).cloned()
    }

    /// Apply `f` to the session under the write lock.
    pub async fn update<F, R>(&self, id: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut CheckoutSession) -> R,
    {
        let mut guard = self.inner.write().await;
        guard.get_mut(id).map(f)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
