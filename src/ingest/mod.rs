//! Ingestion pipeline for Pensum.
//!
//! Drives each document from raw bytes to persisted, embedded chunks:
//! fetch metadata, extract text, chunk, embed in batches, persist. Every
//! document in a batch is processed independently; one failure never stops
//! the rest.

mod queue;

pub use queue::{IngestJob, IngestQueue};

use crate::chunking::chunk_text;
use crate::config::ChunkingSettings;
use crate::embedding::{Embedder, EMBED_BATCH_SIZE};
use crate::error::{PensumError, Result};
use crate::extract::Extractors;
use crate::storage::ObjectStore;
use crate::store::{Chunk, CorpusStore};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Terminal outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// Chunks were embedded and persisted.
    Persisted { chunks: usize },
    /// Chunks already existed; nothing was done.
    Skipped,
    /// The pipeline failed for this document; nothing was persisted.
    Failed { reason: String },
}

/// Outcome of one document within a batch.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Document the report is about.
    pub document_id: Uuid,
    /// What happened to it.
    pub status: IngestStatus,
}

/// The ingestion orchestrator.
pub struct Ingestor {
    extractors: Extractors,
    embedder: Arc<dyn Embedder>,
    corpus: Arc<dyn CorpusStore>,
    objects: Arc<dyn ObjectStore>,
    chunking: ChunkingSettings,
}

impl Ingestor {
    /// Create an ingestor from its components and chunking settings.
    pub fn new(
        extractors: Extractors,
        embedder: Arc<dyn Embedder>,
        corpus: Arc<dyn CorpusStore>,
        objects: Arc<dyn ObjectStore>,
        chunking: ChunkingSettings,
    ) -> Self {
        Self {
            extractors,
            embedder,
            corpus,
            objects,
            chunking,
        }
    }

    /// Ingest a batch of documents, isolating failures per document.
    ///
    /// The returned reports are in submission order, one per input id.
    #[instrument(skip(self, document_ids), fields(count = document_ids.len()))]
    pub async fn process_batch(&self, document_ids: &[Uuid]) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(document_ids.len());

        for &document_id in document_ids {
            let status = match self.run_pipeline(document_id).await {
                Ok(status) => status,
                Err(e) => {
                    error!("Ingestion failed for document {}: {}", document_id, e);
                    IngestStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            reports.push(IngestReport {
                document_id,
                status,
            });
        }

        reports
    }

    /// Run the full pipeline for a single document.
    async fn run_pipeline(&self, document_id: Uuid) -> Result<IngestStatus> {
        let document = self
            .corpus
            .get_document(document_id)
            .await?
            .ok_or_else(|| PensumError::NotFound(format!("document {}", document_id)))?;

        // Chunks are all-or-nothing per document, so their presence means
        // a previous run completed.
        if self.corpus.chunks_exist(document_id).await? {
            info!("Document {} already has chunks, skipping", document.name);
            return Ok(IngestStatus::Skipped);
        }

        let data = self.objects.fetch(&document.storage_ref).await?;

        let text = self.extractors.extract(&document.mime_type, &data)?;
        if text.trim().is_empty() {
            return Err(PensumError::Extraction(format!(
                "No text content in {}",
                document.name
            )));
        }
        debug!(
            "Extracted {} characters from {}",
            text.chars().count(),
            document.name
        );

        let pieces = chunk_text(&text, self.chunking.target_size, self.chunking.overlap);
        if pieces.is_empty() {
            return Err(PensumError::Extraction(format!(
                "Text of {} produced no chunks",
                document.name
            )));
        }
        debug!("Cut {} chunks from {}", pieces.len(), document.name);

        // Embed across fixed-size batches. Vectors are held back until every
        // batch has succeeded, so a failure here persists nothing.
        let mut embeddings = Vec::with_capacity(pieces.len());
        for batch in pieces.chunks(EMBED_BATCH_SIZE) {
            let batch_embeddings = self.embedder.embed_batch(batch).await?;
            embeddings.extend(batch_embeddings);
        }

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| {
                Chunk::new(
                    document.id,
                    document.course_id,
                    index as i32,
                    content,
                    embedding,
                )
            })
            .collect();

        let persisted = self.corpus.insert_chunks(&chunks).await?;
        info!("Persisted {} chunks for {}", persisted, document.name);

        Ok(IngestStatus::Persisted { chunks: persisted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{mime_for_path, MIME_PDF, MIME_TXT};
    use crate::storage::FsObjectStore;
    use crate::store::{Document, MemoryStore};
    use async_trait::async_trait;

    /// Embedder returning fixed-length vectors, failing on a marker string.
    struct StubEmbedder {
        fail_marker: Option<String>,
    }

    impl StubEmbedder {
        fn reliable() -> Self {
            Self { fail_marker: None }
        }

        fn failing_on(marker: &str) -> Self {
            Self {
                fail_marker: Some(marker.to_string()),
            }
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            let embeddings = self.embed_batch(&[text.to_string()]).await?;
            Ok(embeddings.into_iter().next().unwrap())
        }

        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            if let Some(marker) = &self.fail_marker {
                if texts.iter().any(|t| t.contains(marker)) {
                    return Err(PensumError::Embedding("stubbed provider outage".to_string()));
                }
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0, 0.0])
                .collect())
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        objects: Arc<FsObjectStore>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                store: Arc::new(MemoryStore::new()),
                objects: Arc::new(FsObjectStore::new(dir.path().to_path_buf())),
                _dir: dir,
            }
        }

        fn ingestor(&self, embedder: StubEmbedder, chunking: ChunkingSettings) -> Ingestor {
            Ingestor::new(
                Extractors::new(),
                Arc::new(embedder),
                self.store.clone(),
                self.objects.clone(),
                chunking,
            )
        }

        async fn upload(&self, course_id: Uuid, name: &str, data: &[u8]) -> Document {
            let document = Document::new(
                course_id,
                name.to_string(),
                mime_for_path(name).to_string(),
                data.len() as u64,
                format!("{}/{}", course_id, name),
            );
            self.objects.put(&document.storage_ref, data).await.unwrap();
            self.store.insert_document(&document).await.unwrap();
            document
        }
    }

    #[tokio::test]
    async fn test_ingest_persists_chunks() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();
        let text = "Week one covers induction. Week two covers recursion. ".repeat(30);
        let document = fixture.upload(course_id, "plan.txt", text.as_bytes()).await;

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        let reports = ingestor.process_batch(&[document.id]).await;

        assert_eq!(reports.len(), 1);
        let chunks = match &reports[0].status {
            IngestStatus::Persisted { chunks } => *chunks,
            other => panic!("expected Persisted, got {:?}", other),
        };
        assert!(chunks > 0);
        assert!(fixture.store.chunks_exist(document.id).await.unwrap());
        assert_eq!(fixture.store.count_chunks(document.id).await.unwrap(), chunks);
    }

    #[tokio::test]
    async fn test_second_run_is_skipped() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();
        let document = fixture
            .upload(course_id, "notes.md", b"One idea per line.\nAnother idea.")
            .await;

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        ingestor.process_batch(&[document.id]).await;
        let count_before = fixture.store.count_chunks(document.id).await.unwrap();

        let reports = ingestor.process_batch(&[document.id]).await;
        assert_eq!(reports[0].status, IngestStatus::Skipped);
        assert_eq!(
            fixture.store.count_chunks(document.id).await.unwrap(),
            count_before
        );
    }

    #[tokio::test]
    async fn test_batch_isolates_per_document_failures() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();

        let good_a = fixture.upload(course_id, "a.txt", b"Valid text in the first file.").await;
        // PDF mime with garbage bytes fails extraction
        let corrupt = fixture.upload(course_id, "b.pdf", b"definitely not a pdf").await;
        let good_b = fixture.upload(course_id, "c.txt", b"Valid text in the last file.").await;

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        let reports = ingestor
            .process_batch(&[good_a.id, corrupt.id, good_b.id])
            .await;

        assert!(matches!(reports[0].status, IngestStatus::Persisted { .. }));
        assert!(matches!(reports[1].status, IngestStatus::Failed { .. }));
        assert!(matches!(reports[2].status, IngestStatus::Persisted { .. }));

        assert!(fixture.store.chunks_exist(good_a.id).await.unwrap());
        assert!(!fixture.store.chunks_exist(corrupt.id).await.unwrap());
        assert!(fixture.store.chunks_exist(good_b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_document_fails() {
        let fixture = Fixture::new();
        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());

        let reports = ingestor.process_batch(&[Uuid::new_v4()]).await;
        match &reports[0].status {
            IngestStatus::Failed { reason } => assert!(reason.contains("Not found")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_object_fails() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();

        // Metadata exists but no bytes were stored.
        let document = Document::new(
            course_id,
            "ghost.txt".to_string(),
            MIME_TXT.to_string(),
            0,
            format!("{}/ghost.txt", course_id),
        );
        fixture.store.insert_document(&document).await.unwrap();

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        let reports = ingestor.process_batch(&[document.id]).await;

        assert!(matches!(reports[0].status, IngestStatus::Failed { .. }));
        assert!(!fixture.store.chunks_exist(document.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsupported_format_fails() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();
        let document = fixture.upload(course_id, "diagram.png", b"\x89PNG...").await;

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        let reports = ingestor.process_batch(&[document.id]).await;

        match &reports[0].status {
            IngestStatus::Failed { reason } => assert!(reason.contains("Unsupported")),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_extraction_fails() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();
        let document = fixture.upload(course_id, "blank.txt", b"   \n\n   ").await;

        let ingestor = fixture.ingestor(StubEmbedder::reliable(), ChunkingSettings::default());
        let reports = ingestor.process_batch(&[document.id]).await;

        assert!(matches!(reports[0].status, IngestStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_persists_nothing() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();

        // Enough text for several embedding batches at this chunk size,
        // with the poison marker near the end so early batches succeed.
        let mut text = "All models are wrong but some are useful. ".repeat(400);
        text.push_str("XFAILX closing remark.");
        let document = fixture.upload(course_id, "long.txt", text.as_bytes()).await;

        let chunking = ChunkingSettings {
            target_size: 50,
            overlap: 10,
        };
        let ingestor = fixture.ingestor(StubEmbedder::failing_on("XFAILX"), chunking);
        let reports = ingestor.process_batch(&[document.id]).await;

        assert!(matches!(reports[0].status, IngestStatus::Failed { .. }));
        assert!(!fixture.store.chunks_exist(document.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_chunk_indexes_are_sequential() {
        let fixture = Fixture::new();
        let course_id = Uuid::new_v4();
        let text = "First sentence here. Second sentence here. Third sentence here. ".repeat(20);
        let document = fixture.upload(course_id, "seq.txt", text.as_bytes()).await;

        let chunking = ChunkingSettings {
            target_size: 100,
            overlap: 20,
        };
        let ingestor = fixture.ingestor(StubEmbedder::reliable(), chunking);
        ingestor.process_batch(&[document.id]).await;

        let matches = fixture
            .store
            .match_chunks(&[1.0, 1.0, 0.0], course_id, -1.0, 1000)
            .await
            .unwrap();
        let mut indexes: Vec<i32> = matches.iter().map(|m| m.chunk_index).collect();
        indexes.sort_unstable();
        let expected: Vec<i32> = (0..indexes.len() as i32).collect();
        assert_eq!(indexes, expected);
    }

    #[test]
    fn test_pdf_mime_detection_used_by_fixture() {
        assert_eq!(mime_for_path("b.pdf"), MIME_PDF);
    }
}
