//! Ask command implementation.

use crate::chat::{ChatEngine, ChatEvent, ChatRequest};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{ChatProvider, Prompts, Settings};
use crate::embedding::OpenAIEmbedder;
use crate::retrieval::RetrievalEngine;
use crate::store::SqliteStore;
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    course_id: Uuid,
    provider: Option<ChatProvider>,
    settings: Settings,
) -> Result<()> {
    let kind = provider.unwrap_or(settings.chat.provider);

    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Converse(kind)) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
    let embedder = Arc::new(OpenAIEmbedder::new(&settings.embedding));
    let retrieval = Arc::new(RetrievalEngine::new(
        store.clone(),
        embedder,
        settings.retrieval.clone(),
    ));
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let requester_id = settings.chat.requester_id;
    let engine = ChatEngine::new(retrieval, store, prompts, settings.chat.clone());

    let request = ChatRequest {
        course_id,
        requester_id,
        message: question.to_string(),
        conversation_id: None,
        provider,
    };

    let spinner = Output::spinner("Searching course material...");
    let mut stream = match engine.converse(request).await {
        Ok(stream) => stream,
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    };

    let mut stdout = std::io::stdout();
    let mut started = false;
    while let Some(event) = stream.next().await {
        match event {
            Ok(ChatEvent::Delta(fragment)) => {
                if !started {
                    spinner.finish_and_clear();
                    println!();
                    started = true;
                }
                print!("{}", fragment);
                stdout.flush()?;
            }
            Ok(ChatEvent::Done { .. }) => {}
            Err(e) => {
                if !started {
                    spinner.finish_and_clear();
                }
                println!();
                Output::error(&format!("{}", e));
                return Err(e.into());
            }
        }
    }
    if !started {
        spinner.finish_and_clear();
    }
    println!("\n");

    Ok(())
}
