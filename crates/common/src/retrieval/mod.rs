//! Vector retrieval over the chunk store
//!
//! Exhaustive linear scoring: the corpus is small enough that every chunk is
//! compared against every expansion vector. A chunk keeps its best score
//! across expansions, results are diversified so each source document
//! appears at most once, and the highest score seen anywhere is reported as
//! the confidence signal for the domain gate.

use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::expansion::QueryExpander;
use crate::metrics;
use crate::store::{ChunkRecord, ChunkStore};
use futures::future::try_join_all;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Cosine similarity; 0.0 when either norm is zero or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A scored chunk
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Arc<ChunkRecord>,
    pub score: f32,
}

/// Ranked candidates, at most one per source, plus the best score observed
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub candidates: Vec<RetrievalCandidate>,
    pub max_score: f32,
}

/// Embeds expansions and scores the store
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    expander: QueryExpander,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, expander: QueryExpander) -> Self {
        Self { embedder, expander }
    }

    /// Retrieve up to `k` candidates from distinct sources.
    pub async fn retrieve(&self, query: &str, store: &ChunkStore, k: usize) -> Result<RetrievalResult> {
        if store.is_empty() {
            tracing::debug!("Empty store, skipping retrieval");
            return Ok(RetrievalResult::default());
        }

        let start = Instant::now();
        let expansions = self.expander.expand(query);
        let vectors = try_join_all(expansions.iter().map(|q| self.embedder.embed(q))).await?;

        if let Some(v) = vectors.iter().find(|v| v.len() != store.dimension()) {
            tracing::warn!(
                query_dimension = v.len(),
                store_dimension = store.dimension(),
                "Query embedding dimension differs from the store; scores will be zero"
            );
        }

        let scored: Vec<RetrievalCandidate> = store
            .records()
            .iter()
            .map(|chunk| {
                let score = vectors
                    .iter()
                    .map(|q| cosine_similarity(q, &chunk.vector))
                    .fold(f32::NEG_INFINITY, f32::max);
                RetrievalCandidate {
                    chunk: chunk.clone(),
                    score,
                }
            })
            .collect();

        let max_score = scored.iter().map(|c| c.score).fold(f32::NEG_INFINITY, f32::max);
        let candidates = diversify(rank(scored), k);

        let elapsed = start.elapsed();
        metrics::record_retrieval(elapsed.as_secs_f64(), max_score);
        tracing::info!(
            expansions = expansions.len(),
            max_score = max_score,
            candidates = candidates.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Retrieval completed"
        );

        Ok(RetrievalResult { candidates, max_score })
    }
}

/// Drop non-positive scores and sort descending; ties keep store order.
fn rank(mut scored: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    scored.retain(|c| c.score > 0.0);
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored
}

/// Keep the best candidate of each source until `k` sources are collected.
fn diversify(ranked: Vec<RetrievalCandidate>, k: usize) -> Vec<RetrievalCandidate> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(k);
    for candidate in ranked {
        if kept.len() >= k {
            break;
        }
        if seen.insert(candidate.chunk.source.clone()) {
            kept.push(candidate);
        }
    }
    kept
}
