//! Anthropic chat completion provider.
//!
//! Speaks the messages API directly over reqwest: the grounding
//! instruction goes in the request's separate `system` field and the
//! response arrives as a server-sent event stream that is parsed
//! incrementally.

use super::provider::{CompletionProvider, CompletionStream, Prompt};
use crate::config::ChatSettings;
use crate::error::{PensumError, Result};
use crate::http::create_default_http_client;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// API version header value required by the messages endpoint.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Streams completions from the Anthropic messages API.
pub struct AnthropicChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl AnthropicChatProvider {
    /// Create a provider from chat settings.
    ///
    /// The API key is read from `ANTHROPIC_API_KEY`; a missing key is
    /// reported when a completion is requested, not at construction.
    pub fn new(settings: &ChatSettings) -> Self {
        Self {
            client: create_default_http_client(),
            base_url: settings.anthropic_base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: settings.anthropic_model.clone(),
            max_tokens: settings.max_tokens,
        }
    }

    /// Map a prompt onto the messages API request shape.
    fn build_request(&self, prompt: &Prompt) -> MessagesRequest {
        let messages = prompt
            .messages
            .iter()
            .map(|turn| WireMessage {
                role: turn.role.as_str(),
                content: turn.content.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt.system.clone(),
            messages,
            stream: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicChatProvider {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn stream_completion(&self, prompt: &Prompt) -> Result<CompletionStream> {
        if self.api_key.is_empty() {
            return Err(PensumError::Completion(
                "ANTHROPIC_API_KEY is not set".to_string(),
            ));
        }

        let url = format!("{}/v1/messages", self.base_url);
        let request = self.build_request(prompt);

        debug!("Opening message stream with {} turns", request.messages.len());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PensumError::Completion(format!(
                "Anthropic request failed: HTTP {} - {}",
                status, body
            )));
        }

        let mut parser = SseParser::new();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => stream::iter(parser.feed(&bytes)),
                Err(e) => stream::iter(vec![Err(PensumError::Completion(format!(
                    "Completion stream failed: {}",
                    e
                )))]),
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

/// Incremental parser for the messages API event stream.
///
/// Bytes arrive in arbitrary network-sized pieces; lines are only decoded
/// once complete so multi-byte characters split across pieces survive.
/// Text fragments come from `content_block_delta` events carrying a
/// `text_delta`; `message_stop` ends the logical stream and anything after
/// it is ignored.
struct SseParser {
    buffer: Vec<u8>,
    done: bool,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<EventDelta>,
    #[serde(default)]
    error: Option<EventError>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventError {
    message: String,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Feed raw bytes, returning the answer fragments they complete.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut fragments = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.done {
                continue;
            }

            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };

            if let Ok(event) = serde_json::from_str::<StreamEvent>(data.trim_start()) {
                match event.kind.as_str() {
                    "content_block_delta" => {
                        let text = event
                            .delta
                            .filter(|delta| delta.kind.as_deref() == Some("text_delta"))
                            .and_then(|delta| delta.text);
                        if let Some(text) = text {
                            fragments.push(Ok(text));
                        }
                    }
                    "message_stop" => self.done = true,
                    "error" => {
                        let message = event
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "unknown error".to_string());
                        fragments.push(Err(PensumError::Completion(format!(
                            "Anthropic stream error: {}",
                            message
                        ))));
                        self.done = true;
                    }
                    _ => {}
                }
            }
        }

        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::provider::PromptMessage;
    use crate::store::MessageRole;

    fn collect_ok(fragments: Vec<Result<String>>) -> Vec<String> {
        fragments.into_iter().map(|f| f.unwrap()).collect()
    }

    #[test]
    fn test_parser_extracts_text_deltas() {
        let mut parser = SseParser::new();
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n",
            "\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
        );

        let fragments = collect_ok(parser.feed(body.as_bytes()));
        assert_eq!(fragments, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn test_parser_reassembles_split_lines() {
        let mut parser = SseParser::new();
        let line =
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Blåbærsyltetøy\"}}\n";
        let bytes = line.as_bytes();

        // Split in the middle of the multi-byte 'æ'.
        let split = line.find("Blåbær").unwrap() + "Blåb".len() + 1;
        assert!(std::str::from_utf8(&bytes[..split]).is_err());

        let first = parser.feed(&bytes[..split]);
        assert!(first.is_empty());

        let second = collect_ok(parser.feed(&bytes[split..]));
        assert_eq!(second, vec!["Blåbærsyltetøy".to_string()]);
    }

    #[test]
    fn test_parser_ignores_everything_after_message_stop() {
        let mut parser = SseParser::new();
        let body = concat!(
            "data: {\"type\":\"message_stop\"}\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n",
        );

        assert!(parser.feed(body.as_bytes()).is_empty());
    }

    #[test]
    fn test_parser_surfaces_error_events() {
        let mut parser = SseParser::new();
        let body =
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n";

        let fragments = parser.feed(body.as_bytes());
        assert_eq!(fragments.len(), 1);
        let err = fragments.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn test_parser_skips_non_text_deltas() {
        let mut parser = SseParser::new();
        let body = concat!(
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\",\"stop_sequence\":null}}\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n",
            "not an event line\n",
        );

        assert!(parser.feed(body.as_bytes()).is_empty());
    }

    #[test]
    fn test_build_request_puts_grounding_in_system_field() {
        let provider = AnthropicChatProvider::new(&ChatSettings::default());
        let prompt = Prompt {
            system: "Answer from the course materials.".to_string(),
            messages: vec![
                PromptMessage {
                    role: MessageRole::User,
                    content: "What is a monoid?".to_string(),
                },
                PromptMessage {
                    role: MessageRole::Assistant,
                    content: "A set with an associative operation and identity.".to_string(),
                },
            ],
        };

        let request = provider.build_request(&prompt);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["system"], "Answer from the course materials.");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
    }
}
