//! In-memory chunk store
//!
//! Holds the embedded text fragments used for retrieval. A store is built once
//! from the ingestion artifact and is immutable afterwards; requests share it
//! through an `Arc`.

mod artifact;

pub use artifact::{Artifact, ArtifactRecord};

use crate::errors::{AppError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// One embedded fragment of a source document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub title: String,
    /// Originating document, used for diversification and citation
    pub source: String,
    pub text: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// Immutable collection of chunks sharing one vector dimension
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    records: Vec<Arc<ChunkRecord>>,
    dimension: usize,
    version: Option<String>,
}

impl ChunkStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a store from already materialized records.
    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Self> {
        let mut dimension = 0;
        for (index, record) in records.iter().enumerate() {
            if record.text.trim().is_empty() {
                return Err(malformed(index, "empty text"));
            }
            if record.vector.is_empty() {
                return Err(malformed(index, "empty embedding"));
            }
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(malformed(index, "non-finite embedding value"));
            }
            if dimension == 0 {
                dimension = record.vector.len();
            } else if record.vector.len() != dimension {
                return Err(malformed(
                    index,
                    &format!("dimension {} differs from {}", record.vector.len(), dimension),
                ));
            }
        }

        Ok(Self {
            records: records.into_iter().map(Arc::new).collect(),
            dimension,
            version: None,
        })
    }

    /// Parse and validate artifact bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let artifact = Artifact::parse(bytes)?;

        if let Some(expected) = artifact.embeddings {
            if expected != artifact.records.len() {
                tracing::warn!(
                    declared = expected,
                    found = artifact.records.len(),
                    "Artifact embedding count does not match its records"
                );
            }
        }

        let mut records = Vec::with_capacity(artifact.records.len());
        for (index, raw) in artifact.records.into_iter().enumerate() {
            let source = raw
                .source
                .filter(|s| !s.trim().is_empty())
                .or_else(|| raw.title.clone().filter(|t| !t.trim().is_empty()))
                .ok_or_else(|| malformed(index, "missing source"))?;
            let text = raw.text.ok_or_else(|| malformed(index, "missing text"))?;
            let vector = raw.embedding.ok_or_else(|| malformed(index, "missing embedding"))?;

            records.push(ChunkRecord {
                id: raw.id.unwrap_or_else(|| format!("{}#{}", source, index)),
                title: raw.title.unwrap_or_else(|| source.clone()),
                source,
                text,
                vector,
            });
        }

        let mut store = Self::from_records(records)?;
        store.version = artifact.version;
        Ok(store)
    }

    /// Read and validate the artifact at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let store = Self::from_json(&bytes)?;

        tracing::info!(
            path = %path.display(),
            records = store.len(),
            dimension = store.dimension(),
            version = store.version().unwrap_or("legacy"),
            "Chunk store loaded"
        );
        Ok(store)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Vector dimension shared by every record (0 when empty)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn records(&self) -> &[Arc<ChunkRecord>] {
        &self.records
    }
}

fn malformed(index: usize, reason: &str) -> AppError {
    AppError::MalformedArtifact {
        message: format!("record {}: {}", index, reason),
    }
}
