//! Plain-text family extraction (txt, markdown, csv).

use super::TextExtractor;
use crate::error::Result;

/// Extracts text from plain-text formats by decoding bytes as UTF-8.
///
/// Decoding is lossy: invalid sequences become replacement characters
/// rather than failing the whole document.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, data: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(data).to_string())
    }
}
