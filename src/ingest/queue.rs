//! Queue handoff between request handlers and the ingestion worker.
//!
//! Submitting returns as soon as the job is enqueued; outcomes are logged
//! by the worker and observable through chunk counts.

use super::{IngestStatus, Ingestor};
use crate::error::{PensumError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How many jobs may wait in the queue before submission backpressures.
const QUEUE_CAPACITY: usize = 32;

/// A unit of ingestion work.
#[derive(Debug, Clone)]
pub struct IngestJob {
    /// Documents to process, in order.
    pub document_ids: Vec<Uuid>,
}

/// Handle for submitting ingestion jobs to the background worker.
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<IngestJob>,
}

impl IngestQueue {
    /// Spawn the worker task and return a submission handle.
    pub fn start(ingestor: Arc<Ingestor>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_worker(ingestor, receiver));
        Self { sender }
    }

    /// Enqueue a job. Waits only when the queue is full.
    pub async fn submit(&self, job: IngestJob) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| PensumError::Store("Ingestion queue is closed".to_string()))
    }
}

async fn run_worker(ingestor: Arc<Ingestor>, mut receiver: mpsc::Receiver<IngestJob>) {
    info!("Ingestion worker started");

    while let Some(job) = receiver.recv().await {
        info!("Ingesting {} documents", job.document_ids.len());

        let reports = ingestor.process_batch(&job.document_ids).await;
        for report in reports {
            match report.status {
                IngestStatus::Persisted { chunks } => {
                    info!("Document {}: {} chunks persisted", report.document_id, chunks)
                }
                IngestStatus::Skipped => {
                    info!("Document {}: already ingested", report.document_id)
                }
                IngestStatus::Failed { reason } => {
                    error!("Document {}: {}", report.document_id, reason)
                }
            }
        }
    }

    warn!("Ingestion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingSettings;
    use crate::embedding::Embedder;
    use crate::extract::Extractors;
    use crate::storage::{FsObjectStore, ObjectStore};
    use crate::store::{CorpusStore, Document, MemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_submitted_job_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(FsObjectStore::new(dir.path().to_path_buf()));

        let course_id = Uuid::new_v4();
        let document = Document::new(
            course_id,
            "intro.txt".to_string(),
            "text/plain".to_string(),
            16,
            format!("{}/intro.txt", course_id),
        );
        objects
            .put(&document.storage_ref, b"Short but real course text.")
            .await
            .unwrap();
        store.insert_document(&document).await.unwrap();

        let ingestor = Arc::new(Ingestor::new(
            Extractors::new(),
            Arc::new(UnitEmbedder),
            store.clone(),
            objects,
            ChunkingSettings::default(),
        ));
        let queue = IngestQueue::start(ingestor);

        queue
            .submit(IngestJob {
                document_ids: vec![document.id],
            })
            .await
            .unwrap();

        // The worker runs in the background; poll for completion.
        for _ in 0..100 {
            if store.chunks_exist(document.id).await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queued document was never ingested");
    }
}
