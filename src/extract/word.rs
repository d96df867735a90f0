//! Word document text extraction.

use super::TextExtractor;
use crate::error::{PensumError, Result};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};

/// Extracts text from Word documents.
///
/// Reads the OOXML (`.docx`) package and walks paragraph runs. Legacy
/// binary `.doc` files are routed here too but fail the package parse,
/// which callers report as an extraction failure for that document.
pub struct WordExtractor;

impl TextExtractor for WordExtractor {
    fn extract(&self, data: &[u8]) -> Result<String> {
        let docx = docx_rs::read_docx(data)
            .map_err(|e| PensumError::Extraction(format!("Word parse failed: {}", e)))?;

        let mut text = String::new();
        for child in docx.document.children {
            if let DocumentChild::Paragraph(paragraph) = child {
                for child in paragraph.children {
                    if let ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let RunChild::Text(t) = child {
                                text.push_str(&t.text);
                            }
                        }
                    }
                }
                text.push('\n');
            }
        }

        Ok(text)
    }
}
