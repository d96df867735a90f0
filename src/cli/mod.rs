//! CLI module for Pensum.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::ChatProvider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Pensum - Course Material RAG
///
/// A CLI and API server for indexing course documents and asking grounded
/// questions about them. The name "Pensum" is the Norwegian/Scandinavian
/// word for a course's required reading.
#[derive(Parser, Debug)]
#[command(name = "pensum")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Pensum and verify configuration
    Init,

    /// Store course files and index them for retrieval
    Ingest {
        /// Files to ingest (pdf, docx, xlsx, txt, md, csv)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Course the documents belong to
        #[arg(long)]
        course: Uuid,
    },

    /// Ask a one-shot question about a course's material
    Ask {
        /// The question to ask
        question: String,

        /// Course whose material grounds the answer
        #[arg(long)]
        course: Uuid,

        /// Completion provider for this question (openai, anthropic)
        #[arg(short, long)]
        provider: Option<ChatProvider>,
    },

    /// Start an interactive chat session about a course
    Chat {
        /// Course whose material grounds the conversation
        #[arg(long)]
        course: Uuid,

        /// Completion provider for the session (openai, anthropic)
        #[arg(short, long)]
        provider: Option<ChatProvider>,
    },

    /// List a course's documents
    Documents {
        /// Course whose documents to list
        #[arg(long)]
        course: Uuid,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
