//! Configuration module for Pensum.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{GroundingPrompts, Prompts};
pub use settings::{
    ChatProvider, ChatSettings, ChunkingSettings, EmbeddingSettings, GeneralSettings,
    PromptSettings, RetrievalSettings, ServerSettings, Settings, StorageSettings,
};
