//! Similarity retrieval over ingested course material.

use crate::config::RetrievalSettings;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::{CorpusStore, RetrievedChunk};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Separator placed between retrieved passages when they are joined into
/// one grounding context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieves the chunks most relevant to a query within one course.
pub struct RetrievalEngine {
    corpus: Arc<dyn CorpusStore>,
    embedder: Arc<dyn Embedder>,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    /// Create a retrieval engine from its components and settings.
    pub fn new(
        corpus: Arc<dyn CorpusStore>,
        embedder: Arc<dyn Embedder>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            corpus,
            embedder,
            settings,
        }
    }

    /// The configured number of chunks to retrieve per query.
    pub fn top_k(&self) -> usize {
        self.settings.top_k
    }

    /// Top `k` chunks for a query, ordered by descending similarity.
    ///
    /// Retrieval never fails a conversation: embedding or store errors are
    /// logged and degrade to an empty result, so answering proceeds without
    /// grounding context.
    #[instrument(skip(self, query), fields(course_id = %course_id))]
    pub async fn search(&self, query: &str, course_id: Uuid, k: usize) -> Vec<RetrievedChunk> {
        match self.try_search(query, course_id, k).await {
            Ok(chunks) => {
                debug!("Retrieved {} chunks", chunks.len());
                chunks
            }
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        course_id: Uuid,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_embedding = self.embedder.embed(query).await?;
        self.corpus
            .match_chunks(
                &query_embedding,
                course_id,
                self.settings.min_similarity,
                k,
            )
            .await
    }
}

/// Join retrieved chunk contents into one grounding context string.
pub fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PensumError;
    use crate::store::{Chunk, Document, MemoryStore};
    use async_trait::async_trait;

    /// Maps known phrases onto fixed unit vectors.
    struct PhraseEmbedder;

    fn vector_for(text: &str) -> Vec<f32> {
        if text.contains("parser") {
            vec![1.0, 0.0]
        } else if text.contains("lexer") {
            vec![0.8, 0.6]
        } else {
            vec![0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for PhraseEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vector_for(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vector_for(t)).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(PensumError::Embedding("no provider today".to_string()))
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(PensumError::Embedding("no provider today".to_string()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl CorpusStore for BrokenStore {
        async fn insert_document(&self, _document: &Document) -> Result<()> {
            unreachable!()
        }
        async fn get_document(&self, _id: Uuid) -> Result<Option<Document>> {
            unreachable!()
        }
        async fn list_documents(&self, _course_id: Uuid) -> Result<Vec<Document>> {
            unreachable!()
        }
        async fn delete_document(&self, _id: Uuid) -> Result<()> {
            unreachable!()
        }
        async fn insert_chunks(&self, _chunks: &[Chunk]) -> Result<usize> {
            unreachable!()
        }
        async fn chunks_exist(&self, _document_id: Uuid) -> Result<bool> {
            unreachable!()
        }
        async fn count_chunks(&self, _document_id: Uuid) -> Result<usize> {
            unreachable!()
        }
        async fn match_chunks(
            &self,
            _query_embedding: &[f32],
            _course_id: Uuid,
            _min_similarity: f32,
            _limit: usize,
        ) -> Result<Vec<RetrievedChunk>> {
            Err(PensumError::Store("index offline".to_string()))
        }
    }

    async fn seeded_store(course_id: Uuid) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let document_id = Uuid::new_v4();
        store
            .insert_chunks(&[
                Chunk::new(document_id, course_id, 0, "the parser chapter".to_string(), vec![1.0, 0.0]),
                Chunk::new(document_id, course_id, 1, "the lexer chapter".to_string(), vec![0.8, 0.6]),
                Chunk::new(document_id, course_id, 2, "unrelated admin notes".to_string(), vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let course_id = Uuid::new_v4();
        let store = seeded_store(course_id).await;
        let engine = RetrievalEngine::new(store, Arc::new(PhraseEmbedder), RetrievalSettings::default());

        let results = engine.search("how does the parser work", course_id, 5).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "the parser chapter");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let course_id = Uuid::new_v4();
        let store = seeded_store(course_id).await;
        let engine = RetrievalEngine::new(store, Arc::new(PhraseEmbedder), RetrievalSettings::default());

        let results = engine.search("parser", course_id, 1).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_search_is_course_scoped() {
        let course_id = Uuid::new_v4();
        let store = seeded_store(course_id).await;
        let engine = RetrievalEngine::new(store, Arc::new(PhraseEmbedder), RetrievalSettings::default());

        let results = engine.search("parser", Uuid::new_v4(), 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_empty() {
        let engine = RetrievalEngine::new(
            Arc::new(BrokenStore),
            Arc::new(PhraseEmbedder),
            RetrievalSettings::default(),
        );
        let results = engine.search("parser", Uuid::new_v4(), 5).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_empty() {
        let course_id = Uuid::new_v4();
        let store = seeded_store(course_id).await;
        let engine =
            RetrievalEngine::new(store, Arc::new(BrokenEmbedder), RetrievalSettings::default());
        let results = engine.search("parser", course_id, 5).await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_join_context() {
        let chunks = vec![
            RetrievedChunk {
                content: "first passage".to_string(),
                document_id: Uuid::new_v4(),
                chunk_index: 0,
                similarity: 0.9,
            },
            RetrievedChunk {
                content: "second passage".to_string(),
                document_id: Uuid::new_v4(),
                chunk_index: 1,
                similarity: 0.8,
            },
        ];
        assert_eq!(join_context(&chunks), "first passage\n\n---\n\nsecond passage");
        assert_eq!(join_context(&[]), "");
    }
}
