//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::error::PensumError;
use crate::extract::{mime_for_path, Extractors};
use crate::ingest::{IngestStatus, Ingestor};
use crate::storage::{storage_ref_for, FsObjectStore, ObjectStore};
use crate::store::{CorpusStore, Document, SqliteStore};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Run the ingest command.
pub async fn run_ingest(paths: &[PathBuf], course_id: Uuid, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ingest) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let corpus = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
    let objects = Arc::new(FsObjectStore::new(settings.objects_dir()));
    let embedder = Arc::new(OpenAIEmbedder::new(&settings.embedding));

    // Store bytes and metadata first, so every file has a durable record
    // before the pipeline touches it.
    let mut documents = Vec::new();
    for path in paths {
        match store_file(path, course_id, corpus.as_ref(), objects.as_ref()).await {
            Ok(document) => documents.push(document),
            Err(e) => Output::error(&format!("{}: {}", path.display(), e)),
        }
    }

    if documents.is_empty() {
        return Err(anyhow::anyhow!("No files could be stored"));
    }
    if documents.len() < paths.len() {
        Output::warning(&format!(
            "Stored {} of {} files",
            documents.len(),
            paths.len()
        ));
    }

    let ingestor = Ingestor::new(
        Extractors::new(),
        embedder,
        corpus.clone(),
        objects,
        settings.chunking.clone(),
    );

    // One batch per document keeps the bar moving between files.
    let pb = Output::progress_bar(documents.len() as u64, "Indexing documents");
    let mut reports = Vec::with_capacity(documents.len());
    for document in &documents {
        let mut batch = ingestor.process_batch(&[document.id]).await;
        reports.append(&mut batch);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut indexed = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for (document, report) in documents.iter().zip(&reports) {
        match &report.status {
            IngestStatus::Persisted { chunks } => {
                Output::success(&format!("{} ({} chunks)", document.name, chunks));
                indexed += 1;
            }
            IngestStatus::Skipped => {
                Output::warning(&format!("{} (already indexed)", document.name));
                skipped += 1;
            }
            IngestStatus::Failed { reason } => {
                Output::error(&format!("{}: {}", document.name, reason));
                failed += 1;
            }
        }
    }

    println!();
    Output::kv("Indexed", &indexed.to_string());
    Output::kv("Skipped", &skipped.to_string());
    Output::kv("Failed", &failed.to_string());

    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} documents failed",
            failed,
            reports.len()
        ));
    }

    Ok(())
}

/// Read one file and create its stored object and metadata record.
async fn store_file(
    path: &Path,
    course_id: Uuid,
    corpus: &dyn CorpusStore,
    objects: &dyn ObjectStore,
) -> crate::error::Result<Document> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PensumError::InvalidInput(format!("Not a file path: {}", path.display()))
        })?
        .to_string();
    let data = tokio::fs::read(path).await?;

    let mime_type = mime_for_path(&name).to_string();
    let storage_ref = storage_ref_for(course_id, &name);
    objects.put(&storage_ref, &data).await?;

    let document = Document::new(course_id, name, mime_type, data.len() as u64, storage_ref);
    corpus.insert_document(&document).await?;

    Ok(document)
}
