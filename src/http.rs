//! HTTP client construction shared by the embedding and completion providers.

use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for provider API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client with configured timeout.
///
/// Uses a 5-minute timeout by default to prevent hung API calls.
pub fn create_client() -> Client<OpenAIConfig> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client<OpenAIConfig> {
    Client::with_config(OpenAIConfig::default()).with_http_client(create_http_client(timeout))
}

/// Create a plain reqwest client with the given timeout.
///
/// Used directly by providers that speak their own wire protocol
/// (e.g. the Anthropic messages API) rather than going through
/// the async-openai client.
pub fn create_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Default client for raw-HTTP providers.
pub fn create_default_http_client() -> reqwest::Client {
    create_http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}
