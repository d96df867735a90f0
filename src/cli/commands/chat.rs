//! Interactive chat command.

use crate::chat::{ChatEngine, ChatEvent, ChatRequest};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{ChatProvider, Prompts, Settings};
use crate::embedding::OpenAIEmbedder;
use crate::retrieval::RetrievalEngine;
use crate::store::SqliteStore;
use anyhow::Result;
use console::style;
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Run the interactive chat command.
///
/// Every turn after the first continues the same recorded conversation,
/// so follow-up questions see their history.
pub async fn run_chat(
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

    println!("\n{}", style("Pensum Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'new' to start a fresh conversation.")
            .dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut conversation_id: Option<Uuid> = None;

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("new") {
            conversation_id = None;
            Output::info("Started a new conversation.");
            continue;
        }

        let request = ChatRequest {
            course_id,
            requester_id,
            message: input.to_string(),
            conversation_id,
            provider,
        };

        match engine.converse(request).await {
            Ok(mut stream) => {
                print!("\n{} ", style("Pensum:").cyan().bold());
                stdout.flush()?;

                let mut failed = false;
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(ChatEvent::Delta(fragment)) => {
                            print!("{}", fragment);
                            stdout.flush()?;
                        }
                        Ok(ChatEvent::Done {
                            conversation_id: id,
                        }) => {
                            conversation_id = Some(id);
                        }
                        Err(e) => {
                            println!();
                            Output::error(&format!("{}", e));
                            failed = true;
                            break;
                        }
                    }
                }
                if !failed {
                    println!("\n");
                }
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
