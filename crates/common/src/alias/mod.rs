//! Direct document lookup for "give me document X" requests
//!
//! Independent of vector search. Three matching rules are tried in order and
//! the first that yields anything wins:
//!
//! 1. normalized name containment (either direction)
//! 2. the keyword alias table
//! 3. token overlap between the query and document names
//!
//! Results are unique by filename and capped at [`MAX_HITS`].

use crate::catalog::{DocumentDescriptor, MIN_TOKEN_CHARS};
use crate::lexicon::Lexicon;
use crate::text::{contains_term, normalize, tokens};
use std::collections::HashSet;
use std::sync::Arc;

pub const MAX_HITS: usize = 3;

/// Shared prefix length for "did you mean" suggestions
const SUGGESTION_PREFIX_CHARS: usize = 5;

/// A group of interchangeable names for one kind of document
#[derive(Debug, Clone, Copy)]
pub struct DocumentAlias {
    pub keys: &'static [&'static str],
}

pub const ALIASES: &[DocumentAlias] = &[
    DocumentAlias {
        keys: &["sanitizante", "medición de sanitizante", "g-pg-007", "j-512"],
    },
    DocumentAlias {
        keys: &["queso"],
    },
    DocumentAlias {
        keys: &["dulce", "dulces fraccionados"],
    },
    DocumentAlias {
        keys: &["caa", "código alimentario argentino", "código alimentario"],
    },
    DocumentAlias {
        keys: &["bpm", "manual de bpm", "buenas prácticas"],
    },
    DocumentAlias {
        keys: &["5s", "manual 5s", "cinco s"],
    },
    DocumentAlias {
        keys: &["plaga", "mip", "manejo integrado de plagas"],
    },
    DocumentAlias {
        keys: &["poes comedor", "comedor"],
    },
];

#[derive(Debug, Clone)]
pub struct DocumentAliasResolver {
    aliases: Vec<Vec<String>>,
    lexicon: Arc<Lexicon>,
}

impl DocumentAliasResolver {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self::with_aliases(ALIASES, lexicon)
    }

    pub fn with_aliases(aliases: &[DocumentAlias], lexicon: Arc<Lexicon>) -> Self {
        let aliases = aliases
            .iter()
            .map(|a| a.keys.iter().map(|k| normalize(k)).filter(|k| !k.is_empty()).collect())
            .collect();
        Self { aliases, lexicon }
    }

    /// Documents the query asks for, best first (0 to [`MAX_HITS`]).
    pub fn resolve<'a>(&self, query: &str, documents: &'a [DocumentDescriptor]) -> Vec<&'a DocumentDescriptor> {
        let q = normalize(query);
        if q.is_empty() || documents.is_empty() {
            return Vec::new();
        }

        let (rule, hits) = [
            ("name", self.by_name(&q, documents)),
            ("alias", self.by_alias(&q, documents)),
            ("tokens", self.by_tokens(&q, documents)),
        ]
        .into_iter()
        .find(|(_, hits)| !hits.is_empty())
        .unwrap_or(("none", Vec::new()));

        let hits = cap_unique(hits);
        tracing::debug!(rule = rule, hits = hits.len(), "Document alias resolution");
        hits
    }

    /// Near matches for a request that resolved to nothing
    pub fn suggest<'a>(&self, query: &str, documents: &'a [DocumentDescriptor]) -> Vec<&'a DocumentDescriptor> {
        let q = normalize(query);
        let prefixes: Vec<String> = self
            .query_tokens(&q)
            .filter(|t| t.chars().count() >= SUGGESTION_PREFIX_CHARS)
            .map(|t| t.chars().take(SUGGESTION_PREFIX_CHARS).collect())
            .collect();
        if prefixes.is_empty() {
            return Vec::new();
        }

        let scored = documents.iter().map(|doc| {
            let score = prefixes
                .iter()
                .filter(|p| doc.tokens.iter().any(|t| t.starts_with(p.as_str())))
                .count();
            (doc, score)
        });
        cap_unique(rank(scored))
    }

    fn by_name<'a>(&self, q: &str, documents: &'a [DocumentDescriptor]) -> Vec<&'a DocumentDescriptor> {
        documents
            .iter()
            .filter(|doc| doc.names().any(|name| q.contains(name) || name.contains(q)))
            .collect()
    }

    fn by_alias<'a>(&self, q: &str, documents: &'a [DocumentDescriptor]) -> Vec<&'a DocumentDescriptor> {
        let mut hits = Vec::new();
        for keys in &self.aliases {
            if !keys.iter().any(|k| contains_term(q, k)) {
                continue;
            }
            hits.extend(
                documents
                    .iter()
                    .filter(|doc| doc.names().any(|name| keys.iter().any(|k| contains_term(name, k)))),
            );
        }
        hits
    }

    fn by_tokens<'a>(&self, q: &str, documents: &'a [DocumentDescriptor]) -> Vec<&'a DocumentDescriptor> {
        let query_tokens: Vec<&str> = self.query_tokens(q).collect();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let scored = documents.iter().map(|doc| {
            let score = query_tokens
                .iter()
                .filter(|qt| doc.tokens.iter().any(|dt| same_word(qt, dt)))
                .count();
            (doc, score)
        });
        rank(scored)
    }

    /// Query tokens long enough to name a document, minus fetch vocabulary
    fn query_tokens<'q>(&'q self, q: &'q str) -> impl Iterator<Item = &'q str> + 'q {
        tokens(q, MIN_TOKEN_CHARS).filter(|t| !self.lexicon.is_intent_word(t))
    }
}

/// Equal up to a trailing plural `s` / `es`
fn same_word(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    match long.strip_prefix(short) {
        Some("") | Some("s") | Some("es") => true,
        _ => false,
    }
}

/// Positive scores, best first, ties in catalog order
fn rank<'a>(scored: impl Iterator<Item = (&'a DocumentDescriptor, usize)>) -> Vec<&'a DocumentDescriptor> {
    let mut scored: Vec<_> = scored.filter(|(_, s)| *s > 0).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(doc, _)| doc).collect()
}

fn cap_unique(hits: Vec<&DocumentDescriptor>) -> Vec<&DocumentDescriptor> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|doc| seen.insert(doc.filename.as_str()))
        .take(MAX_HITS)
        .collect()
}
