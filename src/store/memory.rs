//! In-memory store implementation.
//!
//! Useful for testing and small corpora.

use super::{
    cosine_similarity, ChatStore, Chunk, Conversation, CorpusStore, Document, Message,
    RetrievedChunk,
};
use crate::error::{PensumError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory corpus and chat store.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    chunks: RwLock<Vec<Chunk>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    messages: RwLock<Vec<Message>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all conversations, unordered. Test support.
    #[cfg(test)]
    pub(crate) fn conversation_snapshot(&self) -> Vec<Conversation> {
        let conversations = self.conversations.read().unwrap();
        conversations.values().cloned().collect()
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let documents = self.documents.read().unwrap();
        Ok(documents.get(&id).cloned())
    }

    async fn list_documents(&self, course_id: Uuid) -> Result<Vec<Document>> {
        let documents = self.documents.read().unwrap();
        let mut result: Vec<Document> = documents
            .values()
            .filter(|d| d.course_id == course_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(result)
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut documents = self.documents.write().unwrap();
        if documents.remove(&id).is_none() {
            return Err(PensumError::NotFound(format!("document {}", id)));
        }
        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|c| c.document_id != id);
        Ok(())
    }

    async fn insert_chunks(&self, new_chunks: &[Chunk]) -> Result<usize> {
        let mut chunks = self.chunks.write().unwrap();
        chunks.extend_from_slice(new_chunks);
        Ok(new_chunks.len())
    }

    async fn chunks_exist(&self, document_id: Uuid) -> Result<bool> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.iter().any(|c| c.document_id == document_id))
    }

    async fn count_chunks(&self, document_id: Uuid) -> Result<usize> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks.iter().filter(|c| c.document_id == document_id).count())
    }

    async fn match_chunks(
        &self,
        query_embedding: &[f32],
        course_id: Uuid,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.read().unwrap();

        let mut results: Vec<RetrievedChunk> = chunks
            .iter()
            .filter(|c| c.course_id == course_id)
            .map(|c| RetrievedChunk {
                content: c.content.clone(),
                document_id: c.document_id,
                chunk_index: c.chunk_index,
                similarity: cosine_similarity(query_embedding, &c.embedding),
            })
            .filter(|r| r.similarity >= min_similarity)
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversations = self.conversations.read().unwrap();
        Ok(conversations.get(&id).cloned())
    }

    async fn refresh_title(&self, id: Uuid, title: &str) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        match conversations.get_mut(&id) {
            Some(conversation) => {
                conversation.title = title.to_string();
                conversation.updated_at = Utc::now();
                Ok(())
            }
            None => Err(PensumError::NotFound(format!("conversation {}", id))),
        }
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        {
            let mut messages = self.messages.write().unwrap();
            messages.push(message.clone());
        }
        let mut conversations = self.conversations.write().unwrap();
        if let Some(conversation) = conversations.get_mut(&message.conversation_id) {
            conversation.updated_at = message.created_at;
        }
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let all = self.list_messages(conversation_id).await?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.messages.read().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}
