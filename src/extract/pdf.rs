//! PDF text extraction.

use super::TextExtractor;
use crate::error::{PensumError, Result};

/// Extracts text from PDF documents.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, data: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(data)
            .map_err(|e| PensumError::Extraction(format!("PDF parse failed: {}", e)))
    }
}
