//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod documents;
mod ingest;
mod init;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use documents::run_documents;
pub use ingest::run_ingest;
pub use init::run_init;
pub use serve::run_serve;
