use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    AppState, ConfirmRequest, ConfirmResponse, PaymentRequestResponse, SessionView,
};
use crate::payment::{render_svg, Confirmation, TransferRequest};
use crate::session::CheckoutSession;
use crate::types::{AppError, AppResult};

const QR_MIN_PX: u32 = 256;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/payment/request", post(request_payment))
        .route("/api/payment/confirm", post(confirm_payment))
        .route("/api/payment/{session_id}", get(get_session))
        .with_state(state)
}

/// Open a checkout: a fresh reference, its Solana Pay URL and a QR code.
async fn request_payment(State(state): State<AppState>) -> AppResult<Json<PaymentRequestResponse>> {
    let session = CheckoutSession::new(state.payments.request_payment());
    let qr_svg = render_svg(&session.payment_url, QR_MIN_PX)?;

    let response = PaymentRequestResponse {
        session_id: session.id,
        payment_url: session.payment_url.clone(),
        qr_svg,
        amount_sol: session.request.amount.to_sol_string(),
        recipient: session.request.recipient.to_string(),
        reference: session.request.reference.to_string(),
        customer_wallet_configured: state.payments.has_customer_wallet(),
    };

    info!(
        session_id = %session.id,
        reference = %session.request.reference,
        "Payment requested"
    );
    state.sessions.insert(session).await;
    Ok(Json(response))
}

enum Claim {
    Confirmed(String),
    Busy,
    Start {
        request: TransferRequest,
        submitted: Option<String>,
    },
}

/// Pay from the demo wallet if one is configured, then poll until the
/// transfer shows up on chain.
async fn confirm_payment(
    State(state): State<AppState>,
    Json(body): Json<ConfirmRequest>,
) -> AppResult<Json<ConfirmResponse>> {
    let id = body.session_id;
    let claim = state
        .sessions
        .update(&id, |session| {
            if let Some(signature) = session.confirmed_signature() {
                return Claim::Confirmed(signature.to_string());
            }
            if session.confirming {
                return Claim::Busy;
            }
            session.confirming = true;
            Claim::Start {
                request: session.request.clone(),
                submitted: session.submitted_signature().map(str::to_string),
            }
        })
        .await
        .ok_or_else(|| session_not_found(&id))?;

    let (request, submitted) = match claim {
        Claim::Confirmed(signature) => {
            return Ok(Json(ConfirmResponse {
                session_id: id,
                signature,
                slot: None,
                block_time: None,
                message: "Payment already confirmed.".to_string(),
            }));
        }
        Claim::Busy => {
            return Err(AppError::InvalidRequest(
                "Payment confirmation is already in progress for this session".to_string(),
            ));
        }
        Claim::Start { request, submitted } => (request, submitted),
    };

    // The claim is released by the task, so it is released even when the
    // client goes away and this handler is dropped.
    let task_state = state.clone();
    let confirmation = tokio::spawn(async move {
        let result = settle(&task_state, &id, &request, submitted).await;
        task_state
            .sessions
            .update(&id, |session| {
                session.confirming = false;
                if let Ok(confirmation) = &result {
                    session.mark_confirmed(confirmation.signature.clone());
                }
            })
            .await;
        result
    })
    .await
    .map_err(|e| AppError::Internal(format!("Payment confirmation task failed: {}", e)))??;

    info!(
        session_id = %id,
        signature = %confirmation.signature,
        slot = confirmation.slot,
        "Payment confirmed"
    );
    Ok(Json(ConfirmResponse {
        session_id: id,
        signature: confirmation.signature,
        slot: Some(confirmation.slot),
        block_time: confirmation.block_time,
        message: "Payment confirmed. You can now upload your screenplay.".to_string(),
    }))
}

async fn settle(
    state: &AppState,
    id: &Uuid,
    request: &TransferRequest,
    mut submitted: Option<String>,
) -> AppResult<Confirmation> {
    if let Some(signature) = submitted.clone() {
        if state.payments.transfer_failed(&signature).await? {
            warn!(session_id = %id, signature = %signature, "Submitted payment failed on chain, paying again");
            state
                .sessions
                .update(id, |session| session.clear_failed_submission(&signature))
                .await;
            submitted = None;
        }
    }
    if submitted.is_none() {
        if let Some(signature) = state.payments.submit_customer_payment(request).await? {
            state
                .sessions
                .update(id, |session| session.mark_submitted(signature))
                .await;
        }
    }
    Ok(state.payments.confirm(request).await?)
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> AppResult<Json<SessionView>> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| session_not_found(&session_id))?;
    Ok(Json(session.into()))
}

pub(crate) fn session_not_found(id: &Uuid) -> AppError {
    AppError::NotFound(format!("Checkout session {} (request a new payment)", id))
}
