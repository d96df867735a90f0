//! Completion provider seam.
//!
//! A [`Prompt`] is the one internal representation of a grounded
//! conversation turn; each provider maps it onto its own wire format.

use crate::error::Result;
use crate::store::MessageRole;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// One conversation turn handed to a completion provider.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    /// Who authored the turn.
    pub role: MessageRole,
    /// Turn text.
    pub content: String,
}

/// A fully assembled completion prompt.
///
/// `system` is the rendered grounding instruction with retrieved course
/// context already substituted in. `messages` holds the prior turns in
/// chronological order, ending with the requester's latest message.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Grounding instruction for the model.
    pub system: String,
    /// Conversation turns, oldest first.
    pub messages: Vec<PromptMessage>,
}

/// Incremental answer fragments from a provider.
///
/// Each item is one fragment of the assistant's answer; an `Err` item is
/// terminal for the turn.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for streaming chat completion backends.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming completion for the prompt.
    async fn stream_completion(&self, prompt: &Prompt) -> Result<CompletionStream>;
}
