use lopdf::Document;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not read the PDF: {0}")]
    Parse(String),

    #[error("The PDF is password protected. Upload an unencrypted copy.")]
    Encrypted,

    #[error("No extractable text found in the PDF. Scanned screenplays need OCR first.")]
    NoText,
}

#[derive(Debug, Clone)]
pub struct ExtractedScreenplay {
    pub text: String,
    pub page_count: usize,
    /// Pages whose text could not be decoded.
    pub skipped_pages: Vec<u32>,
}

/// Concatenate the text of every page, in page order.
pub fn extract_text(pdf: &[u8]) -> Result<ExtractedScreenplay, ExtractionError> {
    let doc = Document::load_mem(pdf).map_err(|e| ExtractionError::Parse(e.to_string()))?;
    extract_document(&doc)
}

fn extract_document(doc: &Document) -> Result<ExtractedScreenplay, ExtractionError> {
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractionError::Encrypted);
    }
    let pages = doc.get_pages();

    let mut text = String::new();
    let mut skipped_pages = Vec::new();
    for page_number in pages.keys().copied() {
        match doc.extract_text(&[page_number]) {
            Ok(page_text) => {
                let page_text = page_text.trim_end();
                if !page_text.is_empty() {
                    text.push_str(page_text);
                    text.push('\n');
                }
            }
            Err(e) => {
                warn!(page = page_number, error = %e, "Skipping page with undecodable text");
                skipped_pages.push(page_number);
            }
        }
    }

    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }

    debug!(
        pages = pages.len(),
        skipped = skipped_pages.len(),
        chars = text.len(),
        "Extracted screenplay text"
    );
    Ok(ExtractedScreenplay {
        text,
        page_count: pages.len(),
        skipped_pages,
    })
}
