//! Spreadsheet text extraction.

use super::TextExtractor;
use crate::error::{PensumError, Result};
use calamine::{Data, Reader};
use std::io::Cursor;

/// Extracts text from Excel spreadsheets (`.xlsx`, `.xls`).
///
/// Every sheet is read in order; each row becomes one line with cell
/// values joined by spaces, prefixed by a `Sheet:` header so chunks keep
/// enough context to tell sheets apart.
pub struct SheetExtractor;

impl TextExtractor for SheetExtractor {
    fn extract(&self, data: &[u8]) -> Result<String> {
        let cursor = Cursor::new(data.to_vec());
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| PensumError::Extraction(format!("Spreadsheet parse failed: {}", e)))?;

        let mut text = String::new();
        for sheet_name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| PensumError::Extraction(format!("Sheet '{}': {}", sheet_name, e)))?;

            text.push_str(&format!("Sheet: {}\n", sheet_name));
            for row in range.rows() {
                let cells: Vec<String> = row.iter().map(cell_to_string).collect();
                if cells.iter().all(|c| c.is_empty()) {
                    continue;
                }
                text.push_str(&cells.join(" "));
                text.push('\n');
            }
            text.push('\n');
        }

        Ok(text)
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        _ => String::new(),
    }
}
