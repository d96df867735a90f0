//! OpenAI chat completion provider.

use super::provider::{CompletionProvider, CompletionStream, Prompt};
use crate::config::ChatSettings;
use crate::error::{PensumError, Result};
use crate::http::create_client;
use crate::store::MessageRole;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::{future, StreamExt};
use tracing::{debug, instrument};

/// Streams completions from the OpenAI chat API.
///
/// The grounding instruction travels as a leading system message; the
/// conversation turns follow in order.
pub struct OpenAiChatProvider {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiChatProvider {
    /// Create a provider from chat settings.
    pub fn new(settings: &ChatSettings) -> Self {
        Self {
            client: create_client(),
            model: settings.openai_model.clone(),
            temperature: settings.temperature,
        }
    }

    /// Map a prompt onto the chat completions request shape.
    fn build_request(&self, prompt: &Prompt) -> Result<CreateChatCompletionRequest> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(prompt.messages.len() + 1);

        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.clone())
                .build()
                .map_err(|e| PensumError::Completion(e.to_string()))?
                .into(),
        );

        for turn in &prompt.messages {
            let message: ChatCompletionRequestMessage = match turn.role {
                MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| PensumError::Completion(e.to_string()))?
                    .into(),
                MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| PensumError::Completion(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| PensumError::Completion(e.to_string()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChatProvider {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn stream_completion(&self, prompt: &Prompt) -> Result<CompletionStream> {
        let request = self.build_request(prompt)?;

        debug!("Opening completion stream with {} turns", prompt.messages.len());

        let upstream = self.client.chat().create_stream(request).await.map_err(|e| {
            PensumError::OpenAI(format!("Failed to open completion stream: {}", e))
        })?;

        let stream = upstream.filter_map(|part| {
            let item = match part {
                Ok(response) => response
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .filter(|content| !content.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(PensumError::OpenAI(format!(
                    "Completion stream failed: {}",
                    e
                )))),
            };
            future::ready(item)
        });

        Ok(Box::pin(stream))
    }
}
