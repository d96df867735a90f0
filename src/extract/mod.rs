//! Text extraction from uploaded course documents.
//!
//! Each supported format has its own extractor; a registry keyed by MIME
//! type picks the right one. Formats we recognize but cannot read (slides,
//! images) get a MIME type here so callers can name them in errors, but no
//! extractor.

mod pdf;
mod sheet;
mod text;
mod word;

pub use pdf::PdfExtractor;
pub use sheet::SheetExtractor;
pub use text::PlainTextExtractor;
pub use word::WordExtractor;

use crate::error::{PensumError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_TXT: &str = "text/plain";
pub const MIME_MD: &str = "text/markdown";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Trait for format-specific text extraction.
///
/// Extraction is synchronous CPU work on in-memory bytes; callers that hold
/// an async context run it inline (documents are course-material sized).
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from raw document bytes.
    fn extract(&self, data: &[u8]) -> Result<String>;
}

/// Determine a file's MIME type from its extension.
///
/// Unknown extensions map to `application/octet-stream`, which no extractor
/// accepts, so unrecognized uploads fail with a clear unsupported-format
/// error rather than a parser crash.
pub fn mime_for_path(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => MIME_PDF,
        "doc" => MIME_DOC,
        "docx" => MIME_DOCX,
        "xls" => MIME_XLS,
        "xlsx" => MIME_XLSX,
        "txt" => MIME_TXT,
        "md" => MIME_MD,
        "csv" => MIME_CSV,
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => MIME_OCTET_STREAM,
    }
}

/// Registry of extractors keyed by MIME type.
pub struct Extractors {
    by_mime: HashMap<&'static str, Arc<dyn TextExtractor>>,
}

impl Extractors {
    /// Build the registry with all built-in extractors.
    pub fn new() -> Self {
        let mut by_mime: HashMap<&'static str, Arc<dyn TextExtractor>> = HashMap::new();

        by_mime.insert(MIME_PDF, Arc::new(PdfExtractor));

        // Legacy .doc goes through the same extractor; genuine OLE binaries
        // fail its parse and surface as an extraction error.
        let word = Arc::new(WordExtractor);
        by_mime.insert(MIME_DOCX, word.clone());
        by_mime.insert(MIME_DOC, word);

        let sheet = Arc::new(SheetExtractor);
        by_mime.insert(MIME_XLSX, sheet.clone());
        by_mime.insert(MIME_XLS, sheet);

        let plain = Arc::new(PlainTextExtractor);
        by_mime.insert(MIME_TXT, plain.clone());
        by_mime.insert(MIME_MD, plain.clone());
        by_mime.insert(MIME_CSV, plain);

        Self { by_mime }
    }

    /// Whether any extractor accepts this MIME type.
    pub fn supports(&self, mime_type: &str) -> bool {
        self.by_mime.contains_key(mime_type)
    }

    /// Extract text from document bytes of the given MIME type.
    pub fn extract(&self, mime_type: &str, data: &[u8]) -> Result<String> {
        match self.by_mime.get(mime_type) {
            Some(extractor) => extractor.extract(data),
            None => Err(PensumError::UnsupportedFormat(mime_type.to_string())),
        }
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_known_extensions() {
        assert_eq!(mime_for_path("lecture-notes.pdf"), MIME_PDF);
        assert_eq!(mime_for_path("syllabus.DOCX"), MIME_DOCX);
        assert_eq!(mime_for_path("grades.xlsx"), MIME_XLSX);
        assert_eq!(mime_for_path("readme.md"), MIME_MD);
        assert_eq!(mime_for_path("roster.csv"), MIME_CSV);
    }

    #[test]
    fn test_mime_for_unknown_extension() {
        assert_eq!(mime_for_path("archive.tar.gz"), MIME_OCTET_STREAM);
        assert_eq!(mime_for_path("no_extension"), MIME_OCTET_STREAM);
        assert_eq!(mime_for_path(""), MIME_OCTET_STREAM);
    }

    #[test]
    fn test_recognized_but_unsupported_formats() {
        let extractors = Extractors::new();
        let slides_mime = mime_for_path("deck.pptx");
        assert_ne!(slides_mime, MIME_OCTET_STREAM);
        assert!(!extractors.supports(slides_mime));
        assert!(matches!(
            extractors.extract(slides_mime, b"anything"),
            Err(PensumError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_supported_formats_have_extractors() {
        let extractors = Extractors::new();
        for mime in [
            MIME_PDF, MIME_DOC, MIME_DOCX, MIME_XLS, MIME_XLSX, MIME_TXT, MIME_MD, MIME_CSV,
        ] {
            assert!(extractors.supports(mime), "missing extractor for {mime}");
        }
    }

    #[test]
    fn test_plain_text_extraction_through_registry() {
        let extractors = Extractors::new();
        let text = extractors
            .extract(MIME_TXT, "Week 1: introduction to proofs.".as_bytes())
            .unwrap();
        assert_eq!(text, "Week 1: introduction to proofs.");
    }
}
