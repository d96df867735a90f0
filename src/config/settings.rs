//! Configuration settings for Pensum.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub chat: ChatSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}


/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.pensum".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database holding documents, chunks and conversations.
    pub sqlite_path: String,
    /// Directory where uploaded document files are kept.
    pub objects_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.pensum/pensum.db".to_string(),
            objects_dir: "~/.pensum/objects".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Document chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target chunk size in characters.
    pub target_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
        }
    }
}

/// Similarity retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks to retrieve per query.
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to qualify.
    pub min_similarity: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.7,
        }
    }
}

/// Chat completion provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// OpenAI chat completions (default).
    #[default]
    Openai,
    /// Anthropic messages API.
    Anthropic,
}

impl std::str::FromStr for ChatProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ChatProvider::Openai),
            "anthropic" | "claude" => Ok(ChatProvider::Anthropic),
            _ => Err(format!("Unknown chat provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatProvider::Openai => write!(f, "openai"),
            ChatProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Conversation and completion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Completion provider (openai, anthropic).
    pub provider: ChatProvider,
    /// Model for OpenAI completions.
    pub openai_model: String,
    /// Model for Anthropic completions.
    pub anthropic_model: String,
    /// Base URL for the Anthropic messages API.
    pub anthropic_base_url: String,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of prior messages included in each completion.
    pub history_limit: usize,
    /// Requester identity recorded on conversations started from the CLI.
    pub requester_id: Uuid,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            provider: ChatProvider::Openai,
            openai_model: "gpt-4o-mini".to_string(),
            anthropic_model: "claude-3-5-sonnet-20241022".to_string(),
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            history_limit: 10,
            requester_id: Uuid::nil(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7700,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}


impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints the components rely on.
    ///
    /// The chunker in particular assumes `overlap < target_size`; violating
    /// that would make the window stop advancing.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunking.target_size == 0 {
            return Err(crate::error::PensumError::Config(
                "chunking.target_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.target_size {
            return Err(crate::error::PensumError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.chunking.overlap, self.chunking.target_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(crate::error::PensumError::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(crate::error::PensumError::Config(format!(
                "retrieval.min_similarity ({}) must be between 0.0 and 1.0",
                self.retrieval.min_similarity
            )));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PensumError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pensum")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.sqlite_path)
    }

    /// Get the expanded object storage directory.
    pub fn objects_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.objects_dir)
    }
}
