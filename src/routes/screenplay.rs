use axum::{
    extract::{Multipart, State},
    middleware,
    routing::post,
    Json, Router,
};
use upload::PdfUpload;
use tracing::{debug, info};
use uuid::Uuid;

use crate::middleware::rate_limiter_middleware;
use crate::models::{AnalyzeResponse, AppState};
use crate::routes::payment::session_not_found;
use crate::screenplay::{critique, extract_text, CritiqueOutcome};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/screenplay/analyze", post(analyze_screenplay))
        .route_layer(middleware::from_fn_with_state(
            state.analyze_limiter.clone(),
            rate_limiter_middleware,
        ))
        .with_state(state)
}

/// Extract a paid-for screenplay and return the model's critique.
async fn analyze_screenplay(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<AnalyzeResponse>> {
    let form = read_form(multipart).await?;
    let session_id = form.session_id.ok_or_else(|| {
        AppError::InvalidRequest("Missing session_id field; request a payment first".to_string())
    })?;
    let upload = form
        .file
        .ok_or_else(|| AppError::InvalidRequest("Missing file field".to_string()))?;

    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| session_not_found(&session_id))?;
    if !session.is_confirmed() {
        return Err(AppError::PaymentRequired(
            "Confirm your payment before uploading a screenplay".to_string(),
        ));
    }
    upload.validate()?;

    info!(
        session_id = %session_id,
        filename = ?upload.filename,
        bytes = upload.data.len(),
        "Analyzing screenplay"
    );

    let filename = upload.filename.clone();
    let extracted = tokio::task::spawn_blocking(move || extract_text(&upload.data))
        .await
        .map_err(|e| AppError::Internal(format!("PDF extraction task failed: {}", e)))??;
    debug!(
        pages = extracted.page_count,
        chars = extracted.text.len(),
        "Screenplay text ready"
    );

    let outcome = critique(&state.llm, &extracted.text, &state.critique).await?;
    if matches!(outcome, CritiqueOutcome::Completed { .. }) {
        state
            .sessions
            .update(&session_id, |session| session.analyses += 1)
            .await;
    }

    Ok(Json(AnalyzeResponse {
        session_id,
        filename,
        pages: extracted.page_count,
        characters: extracted.text.chars().count(),
        skipped_pages: extracted.skipped_pages,
        notice: outcome.notice(),
        outcome,
    }))
}

#[derive(Default)]
struct AnalyzeForm {
    session_id: Option<Uuid>,
    file: Option<PdfUpload>,
}

async fn read_form(mut multipart: Multipart) -> AppResult<AnalyzeForm> {
    let mut form = AnalyzeForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Malformed upload: {}", e)))?
    {
        match field.name() {
            Some("session_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("Malformed upload: {}", e)))?;
                let id = raw.trim().parse::<Uuid>().map_err(|_| {
                    AppError::InvalidRequest(format!("Invalid session_id: {}", raw.trim()))
                })?;
                form.session_id = Some(id);
            }
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("Malformed upload: {}", e)))?;
                form.file = Some(PdfUpload {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => debug!(field = ?other, "Ignoring unexpected form field"),
        }
    }
    Ok(form)
}

mod upload {
    use crate::types::{AppError, AppResult};

    const PDF_MAGIC: &[u8] = b"%PDF-";

    pub struct PdfUpload {
        pub filename: Option<String>,
        pub content_type: Option<String>,
        pub data: Vec<u8>,
    }

    impl PdfUpload {
        /// Accept only non-empty uploads that are declared as and look like a PDF.
        pub fn validate(&self) -> AppResult<()> {
            if self.data.is_empty() {
                return Err(AppError::InvalidRequest("The uploaded file is empty".to_string()));
            }

            let declared_pdf = self
                .content_type
                .as_deref()
                .and_then(|ct| ct.parse::<mime::Mime>().ok())
                .map(|m| m.essence_str() == mime::APPLICATION_PDF.essence_str())
                .unwrap_or(false);
            let named_pdf = self
                .filename
                .as_deref()
                .map(|name| name.to_ascii_lowercase().ends_with(".pdf"))
                .unwrap_or(false);
            if !declared_pdf && !named_pdf {
                return Err(AppError::InvalidRequest(
                    "Only PDF screenplays are supported".to_string(),
                ));
            }

            if !self.data.starts_with(PDF_MAGIC) {
                return Err(AppError::InvalidRequest(
                    "The uploaded file is not a valid PDF".to_string(),
                ));
            }
            Ok(())
        }
    }

}
