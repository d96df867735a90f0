//! Pre-flight checks before expensive operations.
//!
//! Validates that required API keys are configured before starting
//! operations that would otherwise fail midway.

use crate::config::ChatProvider;
use crate::error::{PensumError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion embeds chunks through OpenAI.
    Ingest,
    /// Conversations embed the query and call a completion provider.
    Converse(ChatProvider),
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation) -> Result<()> {
    for key in required_keys(operation) {
        check_env_key(key)?;
    }
    Ok(())
}

/// Environment variables an operation cannot run without.
///
/// Query embedding always goes through OpenAI, so conversations need that
/// key whichever completion provider answers.
fn required_keys(operation: Operation) -> &'static [&'static str] {
    match operation {
        Operation::Ingest => &["OPENAI_API_KEY"],
        Operation::Converse(ChatProvider::Openai) => &["OPENAI_API_KEY"],
        Operation::Converse(ChatProvider::Anthropic) => &["OPENAI_API_KEY", "ANTHROPIC_API_KEY"],
    }
}

/// Check that an API key is present in the environment.
fn check_env_key(name: &str) -> Result<()> {
    match std::env::var(name) {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(PensumError::Config(format!(
            "{} is empty. Set it with: export {}='sk-...'",
            name, name
        ))),
        Err(_) => Err(PensumError::Config(format!(
            "{} not set. Set it with: export {}='sk-...'",
            name, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_operations_need_one_key() {
        assert_eq!(required_keys(Operation::Ingest), ["OPENAI_API_KEY"]);
        assert_eq!(
            required_keys(Operation::Converse(ChatProvider::Openai)),
            ["OPENAI_API_KEY"]
        );
    }

    #[test]
    fn test_anthropic_conversations_need_both_keys() {
        let keys = required_keys(Operation::Converse(ChatProvider::Anthropic));
        assert!(keys.contains(&"OPENAI_API_KEY"));
        assert!(keys.contains(&"ANTHROPIC_API_KEY"));
    }
}
