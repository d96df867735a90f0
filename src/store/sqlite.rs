//! SQLite-based store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! For production use cases with large corpora, consider the sqlite-vec
//! extension or a dedicated vector database.

use super::{
    cosine_similarity, ChatStore, Chunk, Conversation, CorpusStore, Document, Message,
    MessageRole, RetrievedChunk,
};
use crate::error::{PensumError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// SQLite-backed corpus and chat store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self::initialize(conn)?;
        info!("Initialized SQLite store at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                storage_ref TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_course_id ON documents(course_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_course_id ON chunks(course_id);

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                requester_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_course_id ON conversations(course_id);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PensumError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(value: &str) -> Uuid {
    Uuid::parse_str(value).unwrap_or_default()
}

fn map_document_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let id: String = row.get(0)?;
    let course_id: String = row.get(1)?;
    let size_bytes: i64 = row.get(4)?;
    let uploaded_at: String = row.get(6)?;

    Ok(Document {
        id: parse_uuid(&id),
        course_id: parse_uuid(&course_id),
        name: row.get(2)?,
        mime_type: row.get(3)?,
        size_bytes: size_bytes as u64,
        storage_ref: row.get(5)?,
        uploaded_at: parse_timestamp(&uploaded_at),
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(Message {
        id: parse_uuid(&id),
        conversation_id: parse_uuid(&conversation_id),
        role: MessageRole::from_str(&role).unwrap_or(MessageRole::User),
        content: row.get(3)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn map_conversation_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let course_id: String = row.get(1)?;
    let requester_id: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(Conversation {
        id: parse_uuid(&id),
        course_id: parse_uuid(&course_id),
        requester_id: parse_uuid(&requester_id),
        title: row.get(3)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO documents (id, course_id, name, mime_type, size_bytes, storage_ref, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                document.id.to_string(),
                document.course_id.to_string(),
                document.name,
                document.mime_type,
                document.size_bytes as i64,
                document.storage_ref,
                document.uploaded_at.to_rfc3339(),
            ],
        )?;

        debug!("Inserted document {}", document.id);
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.lock()?;

        let result = conn.query_row(
            r#"
            SELECT id, course_id, name, mime_type, size_bytes, storage_ref, uploaded_at
            FROM documents WHERE id = ?1
            "#,
            params![id.to_string()],
            map_document_row,
        );

        match result {
            Ok(document) => Ok(Some(document)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_documents(&self, course_id: Uuid) -> Result<Vec<Document>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, course_id, name, mime_type, size_bytes, storage_ref, uploaded_at
            FROM documents
            WHERE course_id = ?1
            ORDER BY uploaded_at DESC
            "#,
        )?;

        let documents = stmt.query_map(params![course_id.to_string()], map_document_row)?;
        Ok(documents.filter_map(|d| d.ok()).collect())
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let chunks_deleted = tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![id.to_string()],
        )?;
        let documents_deleted = tx.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![id.to_string()],
        )?;

        if documents_deleted == 0 {
            return Err(PensumError::NotFound(format!("document {}", id)));
        }

        tx.commit()?;
        info!("Deleted document {} and {} chunks", id, chunks_deleted);
        Ok(())
    }

    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for chunk in chunks {
            let embedding_bytes = Self::embedding_to_bytes(&chunk.embedding);

            tx.execute(
                r#"
                INSERT INTO chunks (id, document_id, course_id, chunk_index, content, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.course_id.to_string(),
                    chunk.chunk_index,
                    chunk.content,
                    embedding_bytes,
                    chunk.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        info!("Inserted {} chunks", chunks.len());
        Ok(chunks.len())
    }

    async fn chunks_exist(&self, document_id: Uuid) -> Result<bool> {
        Ok(self.count_chunks(document_id).await? > 0)
    }

    async fn count_chunks(&self, document_id: Uuid) -> Result<usize> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    #[instrument(skip(self, query_embedding))]
    async fn match_chunks(
        &self,
        query_embedding: &[f32],
        course_id: Uuid,
        min_similarity: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT content, document_id, chunk_index, embedding
            FROM chunks
            WHERE course_id = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![course_id.to_string()], |row| {
            let content: String = row.get(0)?;
            let document_id: String = row.get(1)?;
            let chunk_index: i32 = row.get(2)?;
            let embedding_bytes: Vec<u8> = row.get(3)?;
            Ok((content, document_id, chunk_index, embedding_bytes))
        })?;

        let mut results: Vec<RetrievedChunk> = rows
            .filter_map(|row| row.ok())
            .map(|(content, document_id, chunk_index, embedding_bytes)| {
                let embedding = Self::bytes_to_embedding(&embedding_bytes);
                RetrievedChunk {
                    similarity: cosine_similarity(query_embedding, &embedding),
                    content,
                    document_id: parse_uuid(&document_id),
                    chunk_index,
                }
            })
            .filter(|r| r.similarity >= min_similarity)
            .collect();

        // Sort by similarity descending
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    #[instrument(skip(self, conversation), fields(conversation_id = %conversation.id))]
    async fn create_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO conversations (id, course_id, requester_id, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                conversation.id.to_string(),
                conversation.course_id.to_string(),
                conversation.requester_id.to_string(),
                conversation.title,
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;

        debug!("Created conversation {}", conversation.id);
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.lock()?;

        let result = conn.query_row(
            r#"
            SELECT id, course_id, requester_id, title, created_at, updated_at
            FROM conversations WHERE id = ?1
            "#,
            params![id.to_string()],
            map_conversation_row,
        );

        match result {
            Ok(conversation) => Ok(Some(conversation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh_title(&self, id: Uuid, title: &str) -> Result<()> {
        let conn = self.lock()?;

        let updated = conn.execute(
            "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), title, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            return Err(PensumError::NotFound(format!("conversation {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id))]
    async fn append_message(&self, message: &Message) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.role.as_str(),
                message.content,
                message.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![
                message.conversation_id.to_string(),
                message.created_at.to_rfc3339()
            ],
        )?;

        tx.commit()?;
        debug!("Appended {} message to {}", message.role.as_str(), message.conversation_id);
        Ok(())
    }

    async fn recent_messages(&self, conversation_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let conn = self.lock()?;

        // rowid breaks ties for messages created in the same instant
        let mut stmt = conn.prepare(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), limit as i64],
            map_message_row,
        )?;

        let mut messages: Vec<Message> = rows.filter_map(|m| m.ok()).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;

        let rows = stmt.query_map(params![conversation_id.to_string()], map_message_row)?;
        Ok(rows.filter_map(|m| m.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(
        document_id: Uuid,
        course_id: Uuid,
        index: i32,
        content: &str,
        embedding: Vec<f32>,
    ) -> Chunk {
        Chunk::new(document_id, course_id, index, content.to_string(), embedding)
    }

    #[tokio::test]
    async fn test_document_and_chunk_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let course_id = Uuid::new_v4();

        let document = Document::new(
            course_id,
            "lecture-1.pdf".to_string(),
            "application/pdf".to_string(),
            2048,
            format!("{}/lecture-1.pdf", course_id),
        );
        store.insert_document(&document).await.unwrap();

        let fetched = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "lecture-1.pdf");
        assert_eq!(fetched.size_bytes, 2048);

        assert!(!store.chunks_exist(document.id).await.unwrap());

        let chunks = vec![
            chunk_with(document.id, course_id, 0, "First part", vec![1.0, 0.0, 0.0]),
            chunk_with(document.id, course_id, 1, "Second part", vec![0.0, 1.0, 0.0]),
        ];
        assert_eq!(store.insert_chunks(&chunks).await.unwrap(), 2);
        assert!(store.chunks_exist(document.id).await.unwrap());
        assert_eq!(store.count_chunks(document.id).await.unwrap(), 2);

        let matches = store
            .match_chunks(&[1.0, 0.0, 0.0], course_id, 0.5, 5)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "First part");
        assert!((matches[0].similarity - 1.0).abs() < 0.001);

        store.delete_document(document.id).await.unwrap();
        assert!(store.get_document(document.id).await.unwrap().is_none());
        assert_eq!(store.count_chunks(document.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_match_chunks_is_course_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        let course_a = Uuid::new_v4();
        let course_b = Uuid::new_v4();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();

        store
            .insert_chunks(&[
                chunk_with(doc_a, course_a, 0, "calculus notes", vec![1.0, 0.0]),
                chunk_with(doc_b, course_b, 0, "biology notes", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let matches = store
            .match_chunks(&[1.0, 0.0], course_a, 0.0, 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "calculus notes");
    }

    #[tokio::test]
    async fn test_match_chunks_respects_threshold_and_limit() {
        let store = SqliteStore::in_memory().unwrap();
        let course_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        store
            .insert_chunks(&[
                chunk_with(document_id, course_id, 0, "exact", vec![1.0, 0.0]),
                chunk_with(document_id, course_id, 1, "close", vec![0.9, 0.1]),
                chunk_with(document_id, course_id, 2, "orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = store
            .match_chunks(&[1.0, 0.0], course_id, 0.7, 1)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].content, "exact");
    }

    #[tokio::test]
    async fn test_delete_missing_document_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.delete_document(Uuid::new_v4()).await;
        assert!(matches!(result, Err(PensumError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_conversation_and_messages() {
        let store = SqliteStore::in_memory().unwrap();
        let conversation =
            Conversation::new(Uuid::new_v4(), Uuid::new_v4(), "What is a monad".to_string());
        store.create_conversation(&conversation).await.unwrap();

        for i in 0..15 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            store
                .append_message(&Message::new(conversation.id, role, format!("message {}", i)))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(conversation.id, 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "message 5");
        assert_eq!(recent[9].content, "message 14");

        let all = store.list_messages(conversation.id).await.unwrap();
        assert_eq!(all.len(), 15);
        assert_eq!(all[0].content, "message 0");

        let updated = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert!(updated.updated_at >= conversation.updated_at);
    }

    #[tokio::test]
    async fn test_refresh_title() {
        let store = SqliteStore::in_memory().unwrap();
        let conversation = Conversation::new(Uuid::new_v4(), Uuid::new_v4(), "New conversation".to_string());
        store.create_conversation(&conversation).await.unwrap();

        store
            .refresh_title(conversation.id, "What is a closure")
            .await
            .unwrap();
        let fetched = store.get_conversation(conversation.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "What is a closure");

        let missing = store.refresh_title(Uuid::new_v4(), "nope").await;
        assert!(matches!(missing, Err(PensumError::NotFound(_))));
    }

    #[test]
    fn test_embedding_bytes_round_trip() {
        let embedding = vec![0.25f32, -1.5, 3.0, 0.0];
        let bytes = SqliteStore::embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 16);
        assert_eq!(SqliteStore::bytes_to_embedding(&bytes), embedding);
    }
}
