//! Pensum - Course Material RAG
//!
//! A CLI and API server for indexing course documents and answering questions
//! grounded in them.
//!
//! The name "Pensum" is the Norwegian/Scandinavian word for a course's
//! required reading.
//!
//! # Overview
//!
//! Pensum allows you to:
//! - Ingest course documents (PDF, Word, spreadsheets, plain text)
//! - Build a searchable vector index from their contents
//! - Stream grounded answers from OpenAI or Anthropic models
//! - Record conversations durably, scoped per course and requester
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `extract` - Text extraction from document formats
//! - `chunking` - Overlapping text chunking
//! - `embedding` - Embedding generation
//! - `store` - Document, chunk and conversation persistence
//! - `storage` - Raw object storage for uploaded files
//! - `ingest` - Ingestion pipeline and background queue
//! - `retrieval` - Similarity retrieval over indexed chunks
//! - `chat` - Grounded conversation streaming
//! - `server` - HTTP API surface
//!
//! # Example
//!
//! ```rust,no_run
//! use pensum::chunking::chunk_text;
//!
//! let chunks = chunk_text("Week one covers induction...", 1000, 200);
//! println!("{} chunks", chunks.len());
//! ```

pub mod chat;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod store;

pub use error::{PensumError, Result};
