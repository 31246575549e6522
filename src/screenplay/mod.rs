//! Screenplay handling: PDF text extraction and the model critique.

pub mod critique;
pub mod extract;

pub use critique::{critique, CritiqueOutcome, CritiqueSettings};
pub use extract::{extract_text, ExtractedScreenplay, ExtractionError};
