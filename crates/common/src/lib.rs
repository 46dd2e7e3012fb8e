//! Inocua Core Library
//!
//! Retrieval and arbitration engine for food-safety questions:
//! - Chunk store and document catalog, loaded once per process
//! - Query expansion and vector retrieval with source diversification
//! - Lexical domain gating and direct document lookup
//! - Answer arbitration over embedding and completion providers
//! - Error types, configuration and metrics shared with the gateway

pub mod alias;
pub mod answer;
pub mod arbiter;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod errors;
pub mod expansion;
pub mod gate;
pub mod lexicon;
pub mod metrics;
pub mod rerank;
pub mod resilience;
pub mod retrieval;
pub mod store;
pub mod text;

// Re-export commonly used types
pub use arbiter::{ChatResponse, DocumentLink, ResponseArbitrator};
pub use completion::Completer;
pub use config::AppConfig;
pub use corpus::{CorpusProvider, SharedCorpus};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
