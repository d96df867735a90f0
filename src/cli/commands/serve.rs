//! Serve command - HTTP API server for integration with other systems.

use crate::chat::ChatEngine;
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::embedding::OpenAIEmbedder;
use crate::extract::Extractors;
use crate::ingest::{IngestQueue, Ingestor};
use crate::retrieval::RetrievalEngine;
use crate::server::{self, AppState};
use crate::storage::FsObjectStore;
use crate::store::SqliteStore;
use anyhow::Result;
use std::sync::Arc;

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);

    let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
    let objects = Arc::new(FsObjectStore::new(settings.objects_dir()));
    let embedder = Arc::new(OpenAIEmbedder::new(&settings.embedding));

    let ingestor = Arc::new(Ingestor::new(
        Extractors::new(),
        embedder.clone(),
        store.clone(),
        objects.clone(),
        settings.chunking.clone(),
    ));
    let queue = IngestQueue::start(ingestor);

    let retrieval = Arc::new(RetrievalEngine::new(
        store.clone(),
        embedder,
        settings.retrieval.clone(),
    ));
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let chat = Arc::new(ChatEngine::new(
        retrieval,
        store.clone(),
        prompts,
        settings.chat.clone(),
    ));

    let state = Arc::new(AppState {
        corpus: store.clone(),
        chats: store,
        objects,
        chat,
        queue,
    });
    let app = server::router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Pensum API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Chat (SSE)", "POST   /chat");
    Output::kv("Upload Documents", "POST   /documents");
    Output::kv("Delete Document", "DELETE /documents/:id");
    Output::kv("List Documents", "GET    /courses/:course_id/documents");
    Output::kv("Queue Ingestion", "POST   /ingest");
    Output::kv("Conversation", "GET    /conversations/:id/messages");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}
