//! Grounded conversation streaming.
//!
//! [`ChatEngine::converse`] ties the pipeline's read side together: it
//! retrieves course context for the requester's message, replays recent
//! conversation history, streams the provider's answer fragment by
//! fragment and records both turns durably. The requester's message is
//! persisted before the first fragment; the assistant's message only
//! after the stream completed.

mod anthropic;
mod openai;
mod provider;

pub use anthropic::AnthropicChatProvider;
pub use openai::OpenAiChatProvider;
pub use provider::{CompletionProvider, CompletionStream, Prompt, PromptMessage};

use crate::config::{ChatProvider, ChatSettings, Prompts};
use crate::error::{PensumError, Result};
use crate::retrieval::{join_context, RetrievalEngine};
use crate::store::{ChatStore, Conversation, Message, MessageRole};
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Characters of the opening message used as a conversation title.
const TITLE_LENGTH: usize = 50;

/// Events buffered between the completion driver and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// One conversation turn to run.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Course whose materials ground the answer.
    pub course_id: Uuid,
    /// Who is asking.
    pub requester_id: Uuid,
    /// The message to answer.
    pub message: String,
    /// Existing conversation to continue, or `None` to start one.
    pub conversation_id: Option<Uuid>,
    /// Provider override for this turn; falls back to the configured one.
    pub provider: Option<ChatProvider>,
}

/// Incremental output of a conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// One fragment of the assistant's answer.
    Delta(String),
    /// Terminal event once the full answer has been recorded.
    Done {
        /// The conversation the turn was recorded under.
        conversation_id: Uuid,
    },
}

/// Stream of events for one conversation turn.
///
/// An `Err` item is terminal: the turn failed and no assistant message
/// was recorded.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// Orchestrates grounded, durable, streaming conversation turns.
pub struct ChatEngine {
    retrieval: Arc<RetrievalEngine>,
    chats: Arc<dyn ChatStore>,
    openai: Arc<dyn CompletionProvider>,
    anthropic: Arc<dyn CompletionProvider>,
    prompts: Prompts,
    settings: ChatSettings,
}

impl ChatEngine {
    /// Create a chat engine with both completion providers wired up.
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        chats: Arc<dyn ChatStore>,
        prompts: Prompts,
        settings: ChatSettings,
    ) -> Self {
        Self {
            retrieval,
            chats,
            openai: Arc::new(OpenAiChatProvider::new(&settings)),
            anthropic: Arc::new(AnthropicChatProvider::new(&settings)),
            prompts,
            settings,
        }
    }

    /// Replace the provider backing `kind`. Used by tests.
    pub fn with_provider(
        mut self,
        kind: ChatProvider,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        match kind {
            ChatProvider::Openai => self.openai = provider,
            ChatProvider::Anthropic => self.anthropic = provider,
        }
        self
    }

    fn provider_for(&self, kind: ChatProvider) -> Arc<dyn CompletionProvider> {
        match kind {
            ChatProvider::Openai => Arc::clone(&self.openai),
            ChatProvider::Anthropic => Arc::clone(&self.anthropic),
        }
    }

    /// Run one conversation turn, streaming the answer as it arrives.
    ///
    /// The requester's message is durable before the first `Delta`; the
    /// assistant's answer is recorded only once the provider stream ends
    /// cleanly, after which `Done` carries the conversation ID. A provider
    /// failure surfaces as the stream's terminal `Err` and leaves no
    /// assistant message behind.
    #[instrument(skip(self, request), fields(course_id = %request.course_id))]
    pub async fn converse(&self, request: ChatRequest) -> Result<ChatStream> {
        if request.message.trim().is_empty() {
            return Err(PensumError::InvalidInput(
                "Message must not be empty".to_string(),
            ));
        }

        let kind = request.provider.unwrap_or(self.settings.provider);
        let provider = self.provider_for(kind);

        // Ground the turn in course material. Retrieval degrades to an
        // empty context rather than failing the conversation.
        let hits = self
            .retrieval
            .search(&request.message, request.course_id, self.retrieval.top_k())
            .await;
        let system = self.prompts.grounding_system(&join_context(&hits));

        // Resume an existing conversation or open a new one.
        let mut history = Vec::new();
        let mut opened_here = false;
        let conversation_id = match request.conversation_id {
            Some(id) => {
                self.chats
                    .get_conversation(id)
                    .await?
                    .ok_or_else(|| PensumError::NotFound(format!("conversation {}", id)))?;
                history = self
                    .chats
                    .recent_messages(id, self.settings.history_limit)
                    .await?;
                id
            }
            None => {
                opened_here = true;
                let conversation = Conversation::new(
                    request.course_id,
                    request.requester_id,
                    title_from(&request.message),
                );
                self.chats.create_conversation(&conversation).await?;
                conversation.id
            }
        };

        let mut turns: Vec<PromptMessage> = history
            .iter()
            .map(|message| PromptMessage {
                role: message.role,
                content: message.content.clone(),
            })
            .collect();
        turns.push(PromptMessage {
            role: MessageRole::User,
            content: request.message.clone(),
        });
        let prompt = Prompt {
            system,
            messages: turns,
        };

        // The requester's turn must be durable before any streaming.
        let user_message =
            Message::new(conversation_id, MessageRole::User, request.message.clone());
        self.chats.append_message(&user_message).await?;

        info!(
            conversation_id = %conversation_id,
            provider = %kind,
            context_chunks = hits.len(),
            history_len = history.len(),
            "Starting completion"
        );

        let upstream = provider.stream_completion(&prompt).await?;

        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let chats = Arc::clone(&self.chats);
        let title = opened_here.then(|| title_from(&request.message));
        tokio::spawn(drive_completion(
            upstream,
            sender,
            chats,
            conversation_id,
            title,
        ));

        let events = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        });
        Ok(Box::pin(events))
    }
}

/// Pump the provider stream into the event channel, then persist.
///
/// Accumulates the full answer locally while forwarding each fragment
/// unbuffered. A failed send means the consumer went away; the provider
/// stream is dropped and nothing further is recorded.
async fn drive_completion(
    mut upstream: CompletionStream,
    sender: mpsc::Sender<Result<ChatEvent>>,
    chats: Arc<dyn ChatStore>,
    conversation_id: Uuid,
    refreshed_title: Option<String>,
) {
    let mut answer = String::new();

    while let Some(part) = upstream.next().await {
        match part {
            Ok(fragment) => {
                answer.push_str(&fragment);
                if sender.send(Ok(ChatEvent::Delta(fragment))).await.is_err() {
                    debug!("Chat consumer disconnected, abandoning completion");
                    return;
                }
            }
            Err(e) => {
                warn!("Completion stream failed: {}", e);
                let _ = sender.send(Err(e)).await;
                return;
            }
        }
    }

    if !answer.is_empty() {
        let message = Message::new(conversation_id, MessageRole::Assistant, answer);
        if let Err(e) = chats.append_message(&message).await {
            let _ = sender.send(Err(e)).await;
            return;
        }
        if let Some(title) = refreshed_title {
            if let Err(e) = chats.refresh_title(conversation_id, &title).await {
                warn!("Failed to refresh conversation title: {}", e);
            }
        }
    }

    let _ = sender
        .send(Ok(ChatEvent::Done { conversation_id }))
        .await;
}

/// Conversation title, cut from the opening message.
fn title_from(message: &str) -> String {
    message.chars().take(TITLE_LENGTH).collect()
}
