//! HTTP API surface.
//!
//! REST endpoints for document upload, ingestion and grounded chat.
//! Requests carry their identity in the `x-requester-id` header;
//! authentication itself lives outside this service, in front of it.

use crate::chat::{ChatEngine, ChatEvent, ChatRequest};
use crate::config::ChatProvider;
use crate::error::PensumError;
use crate::extract::mime_for_path;
use crate::ingest::{IngestJob, IngestQueue};
use crate::storage::{storage_ref_for, ObjectStore};
use crate::store::{ChatStore, CorpusStore, Document, MessageRole};
use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};
use uuid::Uuid;

/// Header carrying the caller's identity.
const REQUESTER_HEADER: &str = "x-requester-id";

/// Shared application state.
pub struct AppState {
    pub corpus: Arc<dyn CorpusStore>,
    pub chats: Arc<dyn ChatStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub chat: Arc<ChatEngine>,
    pub queue: IngestQueue,
}

/// Build the API router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/ingest", post(ingest))
        .route("/documents", post(upload_documents))
        .route("/documents/{id}", delete(delete_document))
        .route("/courses/{course_id}/documents", get(list_course_documents))
        .route("/conversations/{id}/messages", get(conversation_messages))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    course_id: Uuid,
    #[serde(default)]
    conversation_id: Option<Uuid>,
    /// Provider override for this turn.
    #[serde(default)]
    provider: Option<ChatProvider>,
}

#[derive(Deserialize)]
struct IngestBody {
    document_ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct IngestAccepted {
    accepted: usize,
}

#[derive(Serialize)]
struct UploadResponse {
    documents: Vec<Document>,
    total: usize,
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<DocumentInfo>,
    total: usize,
}

#[derive(Serialize)]
struct DocumentInfo {
    id: Uuid,
    name: String,
    mime_type: String,
    size_bytes: u64,
    uploaded_at: DateTime<Utc>,
    chunk_count: usize,
}

#[derive(Serialize)]
struct MessageListResponse {
    conversation_id: Uuid,
    title: String,
    messages: Vec<MessageInfo>,
}

#[derive(Serialize)]
struct MessageInfo {
    id: Uuid,
    role: MessageRole,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Map a pipeline error onto a status code and JSON body.
fn error_response(e: PensumError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        PensumError::NotFound(_) => StatusCode::NOT_FOUND,
        PensumError::InvalidInput(_) | PensumError::UnsupportedFormat(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() }))
}

fn requester_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(REQUESTER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a conversation turn, streaming the answer as server-sent events.
///
/// Frames are `data: {"chunk": text}` while the answer streams, then a
/// terminal `data: {"done": true, "conversation_id": id}`. A failed turn
/// emits `data: {"error": message}` instead and the stream closes.
async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> axum::response::Response {
    let Some(requester_id) = requester_from(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: format!("Missing or invalid {} header", REQUESTER_HEADER),
            }),
        )
            .into_response();
    };

    let request = ChatRequest {
        course_id: body.course_id,
        requester_id,
        message: body.message,
        conversation_id: body.conversation_id,
        provider: body.provider,
    };

    match state.chat.converse(request).await {
        Ok(events) => {
            let frames = events.map(|event| {
                let frame = match event {
                    Ok(ChatEvent::Delta(text)) => serde_json::json!({ "chunk": text }),
                    Ok(ChatEvent::Done { conversation_id }) => {
                        serde_json::json!({ "done": true, "conversation_id": conversation_id })
                    }
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                Ok::<Event, Infallible>(Event::default().data(frame.to_string()))
            });
            Sse::new(frames)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

/// Queue documents for ingestion.
async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestBody>,
) -> axum::response::Response {
    let accepted = body.document_ids.len();
    let job = IngestJob {
        document_ids: body.document_ids,
    };

    match state.queue.submit(job).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(IngestAccepted { accepted })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Accept a multipart upload: a `course_id` field plus one or more files.
///
/// Files are stored, recorded and queued for ingestion. A file that fails
/// to store is logged and skipped; the rest of the upload proceeds.
async fn upload_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut course_id = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: e.to_string(),
                    }),
                )
                    .into_response()
            }
        };

        if let Some(file_name) = field.file_name() {
            let file_name = file_name.to_string();
            match field.bytes().await {
                Ok(bytes) => files.push((file_name, bytes.to_vec())),
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: e.to_string(),
                        }),
                    )
                        .into_response()
                }
            }
        } else if field.name() == Some("course_id") {
            let text = match field.text().await {
                Ok(text) => text,
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: e.to_string(),
                        }),
                    )
                        .into_response()
                }
            };
            course_id = match Uuid::parse_str(text.trim()) {
                Ok(id) => Some(id),
                Err(_) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: "course_id must be a UUID".to_string(),
                        }),
                    )
                        .into_response()
                }
            };
        }
    }

    let Some(course_id) = course_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "course_id field is required".to_string(),
            }),
        )
            .into_response();
    };
    if files.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No files in upload".to_string(),
            }),
        )
            .into_response();
    }

    let mut documents = Vec::new();
    for (name, data) in files {
        match store_upload(&state, course_id, &name, &data).await {
            Ok(document) => documents.push(document),
            Err(e) => error!("Failed to store upload {}: {}", name, e),
        }
    }

    if !documents.is_empty() {
        let job = IngestJob {
            document_ids: documents.iter().map(|d| d.id).collect(),
        };
        if let Err(e) = state.queue.submit(job).await {
            error!("Failed to queue ingestion for upload: {}", e);
        }
    }

    (
        StatusCode::CREATED,
        Json(UploadResponse {
            total: documents.len(),
            documents,
        }),
    )
        .into_response()
}

/// Store one uploaded file and its metadata record.
async fn store_upload(
    state: &AppState,
    course_id: Uuid,
    name: &str,
    data: &[u8],
) -> crate::error::Result<Document> {
    let mime_type = mime_for_path(name);
    let storage_ref = storage_ref_for(course_id, name);

    state.objects.put(&storage_ref, data).await?;

    let document = Document::new(
        course_id,
        name.to_string(),
        mime_type.to_string(),
        data.len() as u64,
        storage_ref.clone(),
    );
    if let Err(e) = state.corpus.insert_document(&document).await {
        // Clean up the stored object.
        if let Err(cleanup) = state.objects.delete(&storage_ref).await {
            warn!("Failed to remove object after insert failure: {}", cleanup);
        }
        return Err(e);
    }

    Ok(document)
}

/// Delete a document, its chunks and its stored object.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let document = match state.corpus.get_document(id).await {
        Ok(Some(document)) => document,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Document not found: {}", id),
                }),
            )
                .into_response()
        }
        Err(e) => return error_response(e).into_response(),
    };

    if let Err(e) = state.objects.delete(&document.storage_ref).await {
        warn!(
            "Failed to remove stored object {}: {}",
            document.storage_ref, e
        );
    }

    match state.corpus.delete_document(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// List a course's documents with their chunk counts.
async fn list_course_documents(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> axum::response::Response {
    let documents = match state.corpus.list_documents(course_id).await {
        Ok(documents) => documents,
        Err(e) => return error_response(e).into_response(),
    };

    let mut infos = Vec::with_capacity(documents.len());
    for document in documents {
        let chunk_count = match state.corpus.count_chunks(document.id).await {
            Ok(count) => count,
            Err(e) => return error_response(e).into_response(),
        };
        infos.push(DocumentInfo {
            id: document.id,
            name: document.name,
            mime_type: document.mime_type,
            size_bytes: document.size_bytes,
            uploaded_at: document.uploaded_at,
            chunk_count,
        });
    }

    Json(DocumentListResponse {
        total: infos.len(),
        documents: infos,
    })
    .into_response()
}

/// Full message history of a conversation, scoped to its requester.
async fn conversation_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let Some(requester_id) = requester_from(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: format!("Missing or invalid {} header", REQUESTER_HEADER),
            }),
        )
            .into_response();
    };

    let conversation = match state.chats.get_conversation(id).await {
        Ok(Some(conversation)) => conversation,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Conversation not found: {}", id),
                }),
            )
                .into_response()
        }
        Err(e) => return error_response(e).into_response(),
    };

    // Another requester's conversation looks like no conversation at all.
    if conversation.requester_id != requester_id {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Conversation not found: {}", id),
            }),
        )
            .into_response();
    }

    match state.chats.list_messages(id).await {
        Ok(messages) => Json(MessageListResponse {
            conversation_id: id,
            title: conversation.title,
            messages: messages
                .into_iter()
                .map(|m| MessageInfo {
                    id: m.id,
                    role: m.role,
                    content: m.content,
                    created_at: m.created_at,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
