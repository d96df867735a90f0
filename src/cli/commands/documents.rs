//! Documents command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::store::{CorpusStore, SqliteStore};
use anyhow::Result;
use uuid::Uuid;

/// Run the documents command.
pub async fn run_documents(course_id: Uuid, settings: Settings) -> Result<()> {
    let store = SqliteStore::new(&settings.sqlite_path())?;

    let documents = match store.list_documents(course_id).await {
        Ok(documents) => documents,
        Err(e) => {
            Output::error(&format!("Failed to list documents: {}", e));
            return Err(e.into());
        }
    };

    if documents.is_empty() {
        Output::info(
            "No documents in this course yet. Use 'pensum ingest <files> --course <id>' to add some.",
        );
        return Ok(());
    }

    Output::header(&format!("Course Documents ({})", documents.len()));
    println!();

    let mut total_chunks = 0;
    for document in &documents {
        let chunks = store.count_chunks(document.id).await?;
        total_chunks += chunks;
        Output::document_info(
            &document.name,
            &document.id.to_string(),
            &document.mime_type,
            chunks,
            document.size_bytes,
        );
    }

    println!();
    Output::kv("Total documents", &documents.len().to_string());
    Output::kv("Total chunks", &total_chunks.to_string());

    Ok(())
}
