//! Persistent store for documents, chunks and conversations.
//!
//! Two trait seams cover the pipeline's needs: [`CorpusStore`] for document
//! metadata, embedded chunks and similarity search, and [`ChatStore`] for
//! conversations and their messages. The SQLite backend implements both;
//! the in-memory backend exists for tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for an uploaded course document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID.
    pub id: Uuid,
    /// Course this document belongs to.
    pub course_id: Uuid,
    /// Original file name.
    pub name: String,
    /// Detected MIME type.
    pub mime_type: String,
    /// Size of the stored file in bytes.
    pub size_bytes: u64,
    /// Reference into object storage where the raw bytes live.
    pub storage_ref: String,
    /// When the document was uploaded.
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record.
    pub fn new(
        course_id: Uuid,
        name: String,
        mime_type: String,
        size_bytes: u64,
        storage_ref: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            course_id,
            name,
            mime_type,
            size_bytes,
            storage_ref,
            uploaded_at: Utc::now(),
        }
    }
}

/// One embedded slice of a document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID.
    pub id: Uuid,
    /// Document this chunk was cut from.
    pub document_id: Uuid,
    /// Course of the parent document, denormalized for scoped search.
    pub course_id: Uuid,
    /// Position of this chunk within the document.
    pub chunk_index: i32,
    /// Text content of this chunk.
    pub content: String,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// When this chunk was persisted.
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(
        document_id: Uuid,
        course_id: Uuid,
        chunk_index: i32,
        content: String,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            course_id,
            chunk_index,
            content,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// A chunk returned from similarity search, with its score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Text content of the matched chunk.
    pub content: String,
    /// Document the chunk came from.
    pub document_id: Uuid,
    /// Position of the chunk within its document.
    pub chunk_index: i32,
    /// Cosine similarity to the query (higher is better).
    pub similarity: f32,
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            _ => Err(format!("Unknown message role: {}", s)),
        }
    }
}

/// A durable conversation between a requester and the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID.
    pub id: Uuid,
    /// Course the conversation is scoped to.
    pub course_id: Uuid,
    /// Who started the conversation.
    pub requester_id: Uuid,
    /// Display title, derived from the opening message.
    pub title: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the conversation last received a message.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation.
    pub fn new(course_id: Uuid, requester_id: Uuid, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            course_id,
            requester_id,
            title,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: Uuid,
    /// Conversation this message belongs to.
    pub conversation_id: Uuid,
    /// Who authored the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// When the message was recorded.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Trait for document and chunk persistence plus similarity search.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Record an uploaded document's metadata.
    async fn insert_document(&self, document: &Document) -> Result<()>;

    /// Fetch a document by ID.
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;

    /// List a course's documents, newest first.
    async fn list_documents(&self, course_id: Uuid) -> Result<Vec<Document>>;

    /// Delete a document and all of its chunks.
    ///
    /// Returns `NotFound` if no such document exists.
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    /// Insert a document's chunks in a single transaction.
    ///
    /// Either every chunk lands or none do, so `chunks_exist` doubles as
    /// the marker that ingestion completed.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Whether any chunks exist for the document.
    async fn chunks_exist(&self, document_id: Uuid) -> Result<bool>;

    /// Number of chunks stored for the document.
    async fn count_chunks(&self, document_id: Uuid) -> Result<usize>;

    /// Find the chunks most similar to a query embedding within a course.
    ///
    /// Results are ordered by descending similarity, include only scores at
    /// or above `min_similarity`, and never exceed `limit`.
    async fn match_chunks(
        &self,
        query_embedding: &[f32],
        course_id: Uuid,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Trait for conversation and message persistence.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Record a new conversation.
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Fetch a conversation by ID.
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Replace a conversation's title and bump its update time.
    async fn refresh_title(&self, id: Uuid, title: &str) -> Result<()>;

    /// Append a message and bump the conversation's update time.
    async fn append_message(&self, message: &Message) -> Result<()>;

    /// The last `limit` messages of a conversation, in chronological order.
    async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>>;

    /// Every message of a conversation, in chronological order.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
