//! Model-assisted reranking
//!
//! Asks the completion model to pick the most relevant candidates by index.
//! The reply must be a JSON object `{"indices": [..]}` of distinct in-range
//! integers; anything else (including transport failures) falls back to the
//! first `max` candidates in retrieval order. Reranking never fails a request.

use crate::completion::{ChatMessage, Completer};
use crate::metrics;
use crate::retrieval::RetrievalCandidate;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

const RERANK_SYSTEM_PROMPT: &str = "Sos un evaluador de relevancia para consultas de seguridad alimentaria. \
Recibís una consulta y fragmentos numerados. Respondé únicamente con un objeto JSON \
de la forma {\"indices\": [i, j, ...]} con los números de los fragmentos más relevantes, \
del más al menos relevante. No agregues texto fuera del JSON.";

#[derive(Debug, Error, PartialEq)]
enum RerankParseError {
    #[error("reply is not a JSON object")]
    NotJson,

    #[error("reply has no `indices` array")]
    MissingIndices,

    #[error("index {0} is not a non-negative integer")]
    NotAnInteger(Value),

    #[error("index {index} is out of range for {len} candidates")]
    OutOfRange { index: u64, len: usize },

    #[error("index {0} appears more than once")]
    Duplicate(u64),

    #[error("no indices selected")]
    Empty,
}

/// Reranks retrieval candidates with the completion model
pub struct LlmReranker {
    completer: Arc<dyn Completer>,
    max: usize,
    preview_chars: usize,
}

impl LlmReranker {
    pub fn new(completer: Arc<dyn Completer>, max: usize, preview_chars: usize) -> Self {
        Self {
            completer,
            max: max.max(1),
            preview_chars,
        }
    }

    /// Return the selected subset, or the first `max` candidates on any failure.
    pub async fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        if candidates.len() <= 1 {
            return candidates;
        }

        let messages = [
            ChatMessage::system(RERANK_SYSTEM_PROMPT),
            ChatMessage::user(self.build_prompt(query, &candidates)),
        ];

        let reply = match self.completer.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Rerank call failed, keeping retrieval order");
                metrics::record_rerank_fallback("transport");
                return self.fallback(candidates);
            }
        };

        match parse_indices(&reply, candidates.len()) {
            Ok(indices) => {
                tracing::debug!(selected = ?indices, "Rerank applied");
                let mut slots: Vec<Option<RetrievalCandidate>> = candidates.into_iter().map(Some).collect();
                indices
                    .into_iter()
                    .take(self.max)
                    .filter_map(|i| slots[i].take())
                    .collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unusable rerank reply, keeping retrieval order");
                metrics::record_rerank_fallback("parse");
                self.fallback(candidates)
            }
        }
    }

    fn build_prompt(&self, query: &str, candidates: &[RetrievalCandidate]) -> String {
        let mut prompt = format!("Consulta: \"{}\"\n\nFragmentos:\n", query);
        for (i, candidate) in candidates.iter().enumerate() {
            let preview: String = candidate.chunk.text.chars().take(self.preview_chars).collect();
            prompt.push_str(&format!("[{}] {}\n{}\n\n", i, candidate.chunk.title, preview));
        }
        prompt.push_str(&format!("Elegí como máximo {} índices.", self.max));
        prompt
    }

    fn fallback(&self, mut candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        candidates.truncate(self.max);
        candidates
    }
}

fn parse_indices(reply: &str, len: usize) -> Result<Vec<usize>, RerankParseError> {
    let body = strip_code_fence(reply.trim());
    let value: Value = serde_json::from_str(body).map_err(|_| RerankParseError::NotJson)?;
    let Value::Object(map) = value else {
        return Err(RerankParseError::NotJson);
    };
    let Some(Value::Array(raw)) = map.get("indices") else {
        return Err(RerankParseError::MissingIndices);
    };

    let mut seen = HashSet::new();
    let mut indices = Vec::with_capacity(raw.len());
    for entry in raw {
        let index = entry
            .as_u64()
            .ok_or_else(|| RerankParseError::NotAnInteger(entry.clone()))?;
        if index >= len as u64 {
            return Err(RerankParseError::OutOfRange { index, len });
        }
        if !seen.insert(index) {
            return Err(RerankParseError::Duplicate(index));
        }
        indices.push(index as usize);
    }

    if indices.is_empty() {
        return Err(RerankParseError::Empty);
    }
    Ok(indices)
}

/// Accept replies wrapped in a single markdown code fence.
fn strip_code_fence(reply: &str) -> &str {
    let Some(inner) = reply.strip_prefix("```") else {
        return reply;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, Result};
    use crate::store::tests::record;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedCompleter {
        reply: Result<String>,
        calls: AtomicUsize,
    }

    impl ScriptedCompleter {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Completer for ScriptedCompleter {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(AppError::CompletionTimeout { timeout_ms: 30_000 }),
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn candidates(n: usize) -> Vec<RetrievalCandidate> {
        (0..n)
            .map(|i| RetrievalCandidate {
                chunk: Arc::new(record(&format!("doc{}.pdf", i), "texto", vec![1.0])),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    fn sources(c: &[RetrievalCandidate]) -> Vec<String> {
        c.iter().map(|c| c.chunk.source.clone()).collect()
    }

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_indices(r#"{"indices": [2, 0]}"#, 3).unwrap(), vec![2, 0]);
        assert_eq!(parse_indices("```json\n{\"indices\": [1]}\n```", 3).unwrap(), vec![1]);
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        assert_eq!(parse_indices("los mejores son 1 y 2", 3), Err(RerankParseError::NotJson));
        assert_eq!(parse_indices("[1, 2]", 3), Err(RerankParseError::NotJson));
        assert_eq!(parse_indices(r#"{"ids": [1]}"#, 3), Err(RerankParseError::MissingIndices));
        assert!(matches!(parse_indices(r#"{"indices": [1.5]}"#, 3), Err(RerankParseError::NotAnInteger(_))));
        assert!(matches!(parse_indices(r#"{"indices": [-1]}"#, 3), Err(RerankParseError::NotAnInteger(_))));
        assert!(matches!(parse_indices(r#"{"indices": ["1"]}"#, 3), Err(RerankParseError::NotAnInteger(_))));
        assert_eq!(
            parse_indices(r#"{"indices": [3]}"#, 3),
            Err(RerankParseError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(parse_indices(r#"{"indices": [1, 1]}"#, 3), Err(RerankParseError::Duplicate(1)));
        assert_eq!(parse_indices(r#"{"indices": []}"#, 3), Err(RerankParseError::Empty));
    }

    #[tokio::test]
    async fn test_rerank_applies_selection() {
        let completer = Arc::new(ScriptedCompleter::ok(r#"{"indices": [2, 0]}"#));
        let reranker = LlmReranker::new(completer.clone(), 8, 100);
        let out = reranker.rerank("consulta", candidates(3)).await;
        assert_eq!(sources(&out), vec!["doc2.pdf", "doc0.pdf"]);
        assert_eq!(completer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rerank_caps_selection() {
        let completer = Arc::new(ScriptedCompleter::ok(r#"{"indices": [3, 2, 1, 0]}"#));
        let out = LlmReranker::new(completer, 2, 100).rerank("consulta", candidates(4)).await;
        assert_eq!(sources(&out), vec!["doc3.pdf", "doc2.pdf"]);
    }

    #[tokio::test]
    async fn test_parse_failure_falls_back() {
        let completer = Arc::new(ScriptedCompleter::ok(r#"{"indices": [9]}"#));
        let out = LlmReranker::new(completer, 2, 100).rerank("consulta", candidates(3)).await;
        assert_eq!(sources(&out), vec!["doc0.pdf", "doc1.pdf"]);
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let completer = Arc::new(ScriptedCompleter {
            reply: Err(AppError::CompletionTimeout { timeout_ms: 1 }),
            calls: AtomicUsize::new(0),
        });
        let out = LlmReranker::new(completer, 8, 100).rerank("consulta", candidates(3)).await;
        assert_eq!(sources(&out), vec!["doc0.pdf", "doc1.pdf", "doc2.pdf"]);
    }

    #[tokio::test]
    async fn test_single_candidate_skips_model() {
        let completer = Arc::new(ScriptedCompleter::ok("{}"));
        let out = LlmReranker::new(completer.clone(), 8, 100).rerank("consulta", candidates(1)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    }
}
