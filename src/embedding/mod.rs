//! Embedding generation for semantic search and retrieval.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::Result;
use async_trait::async_trait;

/// Largest number of texts a single `embed_batch` call may carry.
///
/// Provider APIs cap batch sizes; ingestion slices its chunk lists to this
/// bound and never splits one chunk's text across calls.
pub const EMBED_BATCH_SIZE: usize = 100;

/// Trait for embedding generation.
///
/// `embed_batch` is one provider request: results come back in input order
/// and a failure fails the whole call, never a prefix of it. Callers keep
/// batches within [`EMBED_BATCH_SIZE`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}
