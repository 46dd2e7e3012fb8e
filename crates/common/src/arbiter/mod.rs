//! Response arbitration
//!
//! Orchestrates one chat turn. The first applicable branch wins:
//!
//! 0. root-cause analysis request: fixed Ishikawa / 5-whys template, no model calls
//! 1. document-fetch intent with alias hits: direct links
//! 2. document-fetch intent without hits: "not found" with suggestions
//! 3. retrieval, then the domain gate:
//!    - `Reject`: scope decline
//!    - `Clarify`: slot questions, no completion call
//!    - `Accept`: optional rerank, grounded completion, citations
//!
//! Embedding and completion failures are caught here and turned into a single
//! `unavailable` response; nothing else can fail.

use crate::alias::DocumentAliasResolver;
use crate::answer;
use crate::completion::{create_completer, Completer};
use crate::config::AppConfig;
use crate::corpus::{FsCorpusProvider, SharedCorpus};
use crate::embeddings::{create_embedder, Embedder};
use crate::errors::Result;
use crate::expansion::QueryExpander;
use crate::gate::{DomainGate, GateDecision};
use crate::lexicon::Lexicon;
use crate::metrics;
use crate::rerank::LlmReranker;
use crate::retrieval::Retriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Title and location of a fetchable document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub title: String,
    pub url: String,
}

/// One chat reply, tagged by `mode`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChatResponse {
    Links { items: Vec<DocumentLink> },
    Answer { text: String, sources: Vec<String> },
    Clarify { questions: Vec<String> },
    Decline { text: String },
    Unavailable { text: String },
}

impl ChatResponse {
    pub fn mode(&self) -> &'static str {
        match self {
            ChatResponse::Links { .. } => "links",
            ChatResponse::Answer { .. } => "answer",
            ChatResponse::Clarify { .. } => "clarify",
            ChatResponse::Decline { .. } => "decline",
            ChatResponse::Unavailable { .. } => "unavailable",
        }
    }
}

pub struct ResponseArbitrator {
    corpus: Arc<SharedCorpus>,
    lexicon: Arc<Lexicon>,
    resolver: DocumentAliasResolver,
    retriever: Retriever,
    reranker: Option<LlmReranker>,
    gate: DomainGate,
    completer: Arc<dyn Completer>,
    top_k: usize,
    docs_base_url: String,
}

impl ResponseArbitrator {
    /// Wire the engine from its collaborators
    pub fn new(
        config: &AppConfig,
        corpus: Arc<SharedCorpus>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        let lexicon = Arc::new(Lexicon::default());
        let retrieval = &config.retrieval;
        let reranker = retrieval
            .rerank_enabled
            .then(|| LlmReranker::new(completer.clone(), retrieval.rerank_max, retrieval.preview_chars));

        Self {
            corpus,
            resolver: DocumentAliasResolver::new(lexicon.clone()),
            lexicon,
            retriever: Retriever::new(embedder, QueryExpander::new(retrieval.max_expansions)),
            reranker,
            gate: DomainGate::new(&config.gate),
            completer,
            top_k: retrieval.top_k,
            docs_base_url: config.corpus.docs_base_url.clone(),
        }
    }

    /// Build providers and the filesystem corpus from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.completion)?;
        let corpus = Arc::new(SharedCorpus::new(Arc::new(FsCorpusProvider::from_config(&config.corpus))));

        tracing::info!(
            embedding_model = embedder.model_name(),
            completion_model = completer.model_name(),
            rerank = config.retrieval.rerank_enabled,
            "Arbitrator configured"
        );
        Ok(Self::new(config, corpus, embedder, completer))
    }

    pub fn corpus(&self) -> &Arc<SharedCorpus> {
        &self.corpus
    }

    /// Answer one user message. Never fails.
    pub async fn respond(&self, message: &str) -> ChatResponse {
        let start = Instant::now();

        let response = match self.arbitrate(message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, code = ?e.code(), "External service failure during arbitration");
                ChatResponse::Unavailable {
                    text: answer::UNAVAILABLE_TEXT.to_string(),
                }
            }
        };

        let elapsed = start.elapsed();
        metrics::record_chat(elapsed.as_secs_f64(), response.mode());
        tracing::info!(
            mode = response.mode(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Chat response"
        );
        response
    }

    async fn arbitrate(&self, message: &str) -> Result<ChatResponse> {
        let query = message.trim();
        if query.is_empty() {
            return Ok(ChatResponse::Clarify {
                questions: vec![answer::EMPTY_QUERY_QUESTION.to_string()],
            });
        }

        let signals = self.lexicon.analyze(query);
        if signals.root_cause {
            return Ok(ChatResponse::Answer {
                text: answer::root_cause_analysis(query),
                sources: vec![],
            });
        }

        let corpus = self.corpus.get().await;

        if signals.fetch_intent {
            let documents = corpus.catalog.documents();
            let hits = self.resolver.resolve(query, documents);
            if !hits.is_empty() {
                let items = hits
                    .into_iter()
                    .map(|doc| DocumentLink {
                        title: doc.title.clone(),
                        url: answer::document_url(&self.docs_base_url, &doc.filename),
                    })
                    .collect();
                return Ok(ChatResponse::Links { items });
            }

            let suggestions: Vec<&str> = self
                .resolver
                .suggest(query, documents)
                .into_iter()
                .map(|d| d.title.as_str())
                .collect();
            let catalog: Vec<&str> = documents.iter().map(|d| d.title.as_str()).collect();
            tracing::info!(suggestions = suggestions.len(), "Requested document not found");
            return Ok(ChatResponse::Decline {
                text: answer::not_found_text(&suggestions, &catalog),
            });
        }

        let retrieval = self.retriever.retrieve(query, &corpus.store, self.top_k).await?;
        let decision = self.gate.evaluate(&signals, retrieval.max_score);
        tracing::info!(
            decision = decision.as_str(),
            max_score = retrieval.max_score,
            domain_score = signals.domain_score,
            slots = signals.slot_coverage(),
            "Gate decision"
        );

        match decision {
            GateDecision::Reject => Ok(ChatResponse::Decline {
                text: answer::DECLINE_TEXT.to_string(),
            }),
            GateDecision::Clarify { questions, .. } => Ok(ChatResponse::Clarify { questions }),
            GateDecision::Accept => {
                let mut context = retrieval.candidates;
                if let Some(reranker) = &self.reranker {
                    context = reranker.rerank(query, context).await;
                }

                let messages = answer::build_messages(query, &context);
                let reply = self.completer.complete(&messages).await?;

                let mut text = answer::sanitize(&reply);
                if text.is_empty() {
                    tracing::warn!("Empty completion, using fallback answer");
                    text = answer::fallback_answer(&context);
                }

                Ok(ChatResponse::Answer {
                    text,
                    sources: answer::citations(&context),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DocumentCatalog, DocumentEntry};
    use crate::completion::ChatMessage;
    use crate::errors::AppError;
    use crate::retrieval::tests::TableEmbedder;
    use crate::store::tests::record;
    use crate::store::ChunkStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Completer that records every prompt it receives
    struct RecordingCompleter {
        reply: Option<String>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl RecordingCompleter {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_user_prompt(&self) -> String {
            let prompts = self.prompts.lock().unwrap();
            prompts.last().unwrap()[1].content.clone()
        }
    }

    #[async_trait]
    impl Completer for RecordingCompleter {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.reply.clone().ok_or(AppError::CompletionError {
                message: "502 Bad Gateway".to_string(),
                transient: true,
            })
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn catalog() -> DocumentCatalog {
        DocumentCatalog::new(vec![
            DocumentEntry::new("manual de bpm.pdf"),
            DocumentEntry::new("procedimiento sanitizantes.pdf"),
            DocumentEntry::new("poes comedor.pdf"),
        ])
    }

    fn store() -> ChunkStore {
        ChunkStore::from_records(vec![
            record("manual de bpm.pdf", "Las cámaras de carne se mantienen entre 0 y 4 °C.", vec![1.0, 0.0]),
            record("manual de bpm.pdf", "Registrar la temperatura dos veces por turno.", vec![0.95, 0.05]),
            record("procedimiento sanitizantes.pdf", "Sanitizante a 200 ppm.", vec![0.9, 0.3]),
            record("poes comedor.pdf", "Limpieza del comedor.", vec![0.0, 1.0]),
        ])
        .unwrap()
    }

    fn arbitrator(
        store: ChunkStore,
        embedder: Arc<TableEmbedder>,
        completer: Arc<RecordingCompleter>,
        config: AppConfig,
    ) -> ResponseArbitrator {
        let corpus = Arc::new(SharedCorpus::from_parts(store, catalog()));
        ResponseArbitrator::new(&config, corpus, embedder, completer)
    }

    #[tokio::test]
    async fn test_definition_with_empty_store_is_answered() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("BPM son las Buenas Prácticas de Manufactura.");
        let engine = arbitrator(ChunkStore::empty(), embedder.clone(), completer.clone(), AppConfig::default());

        let response = engine.respond("¿qué es BPM?").await;

        assert_eq!(
            response,
            ChatResponse::Answer {
                text: "BPM son las Buenas Prácticas de Manufactura.".to_string(),
                sources: vec![],
            }
        );
        assert_eq!(embedder.calls(), 0);
        assert_eq!(completer.calls(), 1);
        assert!(completer.last_user_prompt().contains("no se recuperaron fragmentos"));
    }

    #[tokio::test]
    async fn test_document_request_returns_links_without_model_calls() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("no debería usarse");
        let engine = arbitrator(store(), embedder.clone(), completer.clone(), AppConfig::default());

        let response = engine.respond("dame el pdf de sanitizante").await;

        assert_eq!(
            response,
            ChatResponse::Links {
                items: vec![DocumentLink {
                    title: "Procedimiento sanitizantes".to_string(),
                    url: "/docs/procedimiento%20sanitizantes.pdf".to_string(),
                }],
            }
        );
        assert_eq!(embedder.calls(), 0);
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_root_cause_request_uses_template_without_model_calls() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("no debería usarse");
        let engine = arbitrator(store(), embedder.clone(), completer.clone(), AppConfig::default());

        let response = engine.respond("Necesito un Ishikawa de productos vencidos en góndola").await;

        let ChatResponse::Answer { text, sources } = response else {
            panic!("expected answer");
        };
        assert!(text.contains("**Problema:** Productos vencidos en góndola"));
        assert!(text.contains("Acciones preventivas"));
        assert!(sources.is_empty());
        assert_eq!(embedder.calls(), 0);
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_document_is_declined_with_catalog() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("no debería usarse");
        let engine = arbitrator(store(), embedder.clone(), completer.clone(), AppConfig::default());

        match engine.respond("dame el pdf del horario de la cantina").await {
            ChatResponse::Decline { text } => {
                assert!(text.starts_with("No encontré ese documento."));
                assert!(text.contains("- Manual de bpm"));
            }
            other => panic!("expected decline, got {:?}", other),
        }
        assert_eq!(embedder.calls(), 0);
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_out_of_scope_is_rejected() {
        // Scores at most 0.0 against every chunk
        let embedder = Arc::new(TableEmbedder::constant(vec![0.0, -1.0]));
        let completer = RecordingCompleter::replying("no debería usarse");
        let engine = arbitrator(store(), embedder, completer.clone(), AppConfig::default());

        let response = engine.respond("¿cuál es el clima hoy?").await;

        assert_eq!(
            response,
            ChatResponse::Decline {
                text: answer::DECLINE_TEXT.to_string(),
            }
        );
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_broad_query_gets_clarifying_questions() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let weak_match = ChunkStore::from_records(vec![record(
            "manual de bpm.pdf",
            "Control de temperatura.",
            vec![0.72, (1.0f32 - 0.72 * 0.72).sqrt()],
        )])
        .unwrap();
        let completer = RecordingCompleter::replying("no debería usarse");
        let engine = arbitrator(weak_match, embedder, completer.clone(), AppConfig::default());

        match engine.respond("temperatura").await {
            ChatResponse::Clarify { questions } => {
                assert!(!questions.is_empty() && questions.len() <= 3);
                assert!(questions.iter().any(|q| q.contains("sector") || q.contains("etapa")));
            }
            other => panic!("expected clarify, got {:?}", other),
        }
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_strong_match_is_answered_with_grounded_citations() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("Entre 0 y 4 °C. ¿Querés el PDF?");
        let engine = arbitrator(store(), embedder, completer.clone(), AppConfig::default());

        let response = engine.respond("temperatura").await;

        let ChatResponse::Answer { text, sources } = response else {
            panic!("expected answer");
        };
        assert_eq!(text, "Entre 0 y 4 °C.");
        assert_eq!(sources, vec!["manual de bpm.pdf", "procedimiento sanitizantes.pdf"]);

        let prompt = completer.last_user_prompt();
        for source in &sources {
            assert!(prompt.contains(&format!("({})", source)));
        }
        assert!(!prompt.contains("poes comedor.pdf"));
    }

    #[tokio::test]
    async fn test_empty_completion_uses_fallback() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("¿Querés el PDF?");
        let engine = arbitrator(store(), embedder, completer, AppConfig::default());

        match engine.respond("temperatura de la cámara de carnes").await {
            ChatResponse::Answer { text, .. } => {
                assert!(text.contains("Las cámaras de carne se mantienen entre 0 y 4 °C."));
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_completion_failure_is_unavailable() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let engine = arbitrator(store(), embedder, RecordingCompleter::failing(), AppConfig::default());

        let response = engine.respond("¿qué es BPM?").await;
        assert_eq!(response.mode(), "unavailable");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"mode": "unavailable", "text": answer::UNAVAILABLE_TEXT})
        );
    }

    #[tokio::test]
    async fn test_rerank_uses_second_completion() {
        let mut config = AppConfig::default();
        config.retrieval.rerank_enabled = true;
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let completer = RecordingCompleter::replying("{\"indices\": [1]}");
        let engine = arbitrator(store(), embedder, completer.clone(), config);

        let response = engine.respond("temperatura").await;

        // One rerank call plus one answer call, and the answer cites only the kept chunk
        assert_eq!(completer.calls(), 2);
        match response {
            ChatResponse::Answer { sources, .. } => {
                assert_eq!(sources, vec!["procedimiento sanitizantes.pdf"]);
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[test]
    fn test_response_wire_shapes() {
        let links = ChatResponse::Links {
            items: vec![DocumentLink {
                title: "Manual 5s".to_string(),
                url: "/docs/manual%205s.pdf".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&links).unwrap(),
            serde_json::json!({"mode": "links", "items": [{"title": "Manual 5s", "url": "/docs/manual%205s.pdf"}]})
        );

        let clarify: ChatResponse =
            serde_json::from_value(serde_json::json!({"mode": "clarify", "questions": ["¿Qué sector?"]})).unwrap();
        assert_eq!(clarify.mode(), "clarify");
    }

    #[test]
    fn test_blank_message_asks_for_a_question() {
        let embedder = Arc::new(TableEmbedder::constant(vec![1.0, 0.0]));
        let engine = arbitrator(store(), embedder, RecordingCompleter::replying("x"), AppConfig::default());
        let response = tokio_test::block_on(engine.respond("   "));
        assert_eq!(response.mode(), "clarify");
    }
}
