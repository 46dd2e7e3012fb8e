//! Catalog of deliverable documents
//!
//! Built once from a directory listing or manifest. Only the alias resolver
//! reads it; retrieval never touches the catalog.

use crate::text::{normalize, tokens};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimum token length kept for overlap matching
pub const MIN_TOKEN_CHARS: usize = 4;

/// Raw listing entry as returned by a corpus provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl DocumentEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            title: None,
        }
    }
}

/// A fetchable document with its precomputed match keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentDescriptor {
    pub filename: String,
    pub title: String,
    #[serde(skip)]
    pub normalized_title: String,
    #[serde(skip)]
    pub normalized_filename: String,
    #[serde(skip)]
    pub tokens: BTreeSet<String>,
}

impl DocumentDescriptor {
    pub fn from_entry(entry: DocumentEntry) -> Self {
        let title = entry
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| humanize(&entry.filename));
        let normalized_title = normalize(&title);
        let normalized_filename = normalize(&entry.filename);
        let tokens = tokens(&normalized_title, MIN_TOKEN_CHARS)
            .chain(tokens(&normalized_filename, MIN_TOKEN_CHARS))
            .map(str::to_string)
            .collect();

        Self {
            filename: entry.filename,
            title,
            normalized_title,
            normalized_filename,
            tokens,
        }
    }

    /// Normalized names this document answers to
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.normalized_title.as_str())
            .chain(std::iter::once(self.normalized_filename.as_str()))
            .filter(|n| !n.is_empty())
    }
}

/// Ordered, immutable list of documents
#[derive(Debug, Clone, Default)]
pub struct DocumentCatalog {
    documents: Vec<DocumentDescriptor>,
}

impl DocumentCatalog {
    pub fn new(entries: Vec<DocumentEntry>) -> Self {
        Self {
            documents: entries.into_iter().map(DocumentDescriptor::from_entry).collect(),
        }
    }

    pub fn documents(&self) -> &[DocumentDescriptor] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Display title derived from a filename: `manual_de-bpm.pdf` -> `Manual de bpm`
pub fn humanize(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("pdf") => stem,
        _ => filename,
    };
    let spaced = stem.replace(['-', '_'], " ");
    let trimmed = spaced.trim();

    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize() {
        assert_eq!(humanize("procedimiento sanitizantes.pdf"), "Procedimiento sanitizantes");
        assert_eq!(humanize("manual_de-bpm.PDF"), "Manual de bpm");
        assert_eq!(humanize("énfasis.pdf"), "Énfasis");
        assert_eq!(humanize(".pdf"), "");
    }

    #[test]
    fn test_descriptor_keys() {
        let doc = DocumentDescriptor::from_entry(DocumentEntry::new("Manejo Integrado de Plagas.pdf"));
        assert_eq!(doc.title, "Manejo Integrado de Plagas");
        assert_eq!(doc.normalized_title, "manejo integrado de plagas");
        assert_eq!(doc.normalized_filename, "manejo integrado de plagas");
        assert!(doc.tokens.contains("plagas"));
        assert!(!doc.tokens.contains("de"));
    }

    #[test]
    fn test_explicit_title_wins() {
        let entry = DocumentEntry {
            filename: "g-pg-007.pdf".to_string(),
            title: Some("Medición de sanitizante".to_string()),
        };
        let doc = DocumentDescriptor::from_entry(entry);
        assert_eq!(doc.title, "Medición de sanitizante");
        assert_eq!(doc.names().collect::<Vec<_>>(), vec!["medicion de sanitizante", "g pg 007"]);
    }
}
