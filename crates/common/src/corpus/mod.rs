//! Corpus loading with a single-flight guard
//!
//! The chunk store and the document catalog are the only process-wide shared
//! state. [`SharedCorpus`] loads both exactly once: the first caller runs the
//! provider, concurrent callers await that same load, and everybody gets the
//! same `Arc<Corpus>` afterwards. Tests inject fixture data through
//! [`SharedCorpus::from_parts`] or a custom [`CorpusProvider`].

use crate::catalog::{DocumentCatalog, DocumentEntry};
use crate::config::CorpusConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::store::ChunkStore;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Source of the precomputed artifact and the document listing
#[async_trait]
pub trait CorpusProvider: Send + Sync {
    async fn load_chunks(&self) -> Result<ChunkStore>;

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>>;
}

/// Reads the artifact and the documents directory from the local filesystem
pub struct FsCorpusProvider {
    artifact_path: PathBuf,
    docs_dir: PathBuf,
}

impl FsCorpusProvider {
    pub fn new(artifact_path: impl Into<PathBuf>, docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            docs_dir: docs_dir.into(),
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new(&config.artifact_path, &config.docs_dir)
    }
}

#[async_trait]
impl CorpusProvider for FsCorpusProvider {
    async fn load_chunks(&self) -> Result<ChunkStore> {
        ChunkStore::load(&self.artifact_path).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>> {
        let mut dir = tokio::fs::read_dir(&self.docs_dir).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_ascii_lowercase().ends_with(".pdf") {
                entries.push(DocumentEntry::new(name));
            }
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }
}

/// Everything a request reads: chunks and documents
#[derive(Debug, Default)]
pub struct Corpus {
    pub store: ChunkStore,
    pub catalog: DocumentCatalog,
}

/// Lazily loaded, read-only corpus shared by all requests
pub struct SharedCorpus {
    provider: Option<Arc<dyn CorpusProvider>>,
    cell: OnceCell<Arc<Corpus>>,
}

impl SharedCorpus {
    pub fn new(provider: Arc<dyn CorpusProvider>) -> Self {
        Self {
            provider: Some(provider),
            cell: OnceCell::new(),
        }
    }

    /// Already loaded corpus, for fixtures and tests
    pub fn from_parts(store: ChunkStore, catalog: DocumentCatalog) -> Self {
        Self {
            provider: None,
            cell: OnceCell::new_with(Some(Arc::new(Corpus { store, catalog }))),
        }
    }

    /// Get the corpus, loading it on first use.
    pub async fn get(&self) -> Arc<Corpus> {
        self.cell.get_or_init(|| self.load()).await.clone()
    }

    /// The corpus if a load has already finished
    pub fn loaded(&self) -> Option<Arc<Corpus>> {
        self.cell.get().cloned()
    }

    async fn load(&self) -> Arc<Corpus> {
        let Some(provider) = &self.provider else {
            return Arc::new(Corpus::default());
        };

        let store = match provider.load_chunks().await {
            Ok(store) => store,
            Err(e) => {
                let kind = match e {
                    AppError::MalformedArtifact { .. } => "malformed",
                    _ => "unreadable",
                };
                tracing::warn!(error = %e, kind = kind, "Artifact not usable, serving with an empty store");
                ChunkStore::empty()
            }
        };

        let catalog = match provider.list_documents().await {
            Ok(entries) => DocumentCatalog::new(entries),
            Err(e) => {
                tracing::warn!(error = %e, "Document listing failed, serving with an empty catalog");
                DocumentCatalog::default()
            }
        };

        metrics::record_corpus(store.len());
        tracing::info!(chunks = store.len(), documents = catalog.len(), "Corpus ready");

        Arc::new(Corpus { store, catalog })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::record;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        loads: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CorpusProvider for CountingProvider {
        async fn load_chunks(&self) -> Result<ChunkStore> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(AppError::MalformedArtifact {
                    message: "record 0: missing text".to_string(),
                });
            }
            ChunkStore::from_records(vec![record("manual de bpm.pdf", "Lavado de manos", vec![1.0, 0.0])])
        }

        async fn list_documents(&self) -> Result<Vec<DocumentEntry>> {
            Ok(vec![DocumentEntry::new("manual de bpm.pdf")])
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_use_loads_once() {
        let provider = Arc::new(CountingProvider {
            loads: AtomicUsize::new(0),
            fail: false,
        });
        let corpus = Arc::new(SharedCorpus::new(provider.clone()));
        assert!(corpus.loaded().is_none());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let corpus = corpus.clone();
                tokio::spawn(async move { corpus.get().await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let first = results[0].as_ref().unwrap().clone();
        for result in &results {
            assert!(Arc::ptr_eq(&first, result.as_ref().unwrap()));
        }

        assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
        assert_eq!(first.store.len(), 1);
        assert_eq!(first.catalog.len(), 1);
        assert!(corpus.loaded().is_some());
    }

    #[tokio::test]
    async fn test_malformed_artifact_degrades_to_empty_store() {
        let provider = Arc::new(CountingProvider {
            loads: AtomicUsize::new(0),
            fail: true,
        });
        let corpus = SharedCorpus::new(provider.clone());

        let loaded = corpus.get().await;
        assert!(loaded.store.is_empty());
        assert_eq!(loaded.catalog.len(), 1);

        // A failed artifact is not retried on every request
        corpus.get().await;
        assert_eq!(provider.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fs_provider_lists_pdfs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        for name in ["poes comedor.pdf", "Manual 5S.PDF", "notas.txt"] {
            std::fs::write(docs.join(name), b"%PDF").unwrap();
        }
        std::fs::create_dir(docs.join("archivo.pdf")).unwrap();

        let provider = FsCorpusProvider::new(dir.path().join("embeddings.json"), &docs);
        let names: Vec<String> = provider
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.filename)
            .collect();
        assert_eq!(names, vec!["Manual 5S.PDF", "poes comedor.pdf"]);

        // Missing artifact: the shared corpus still comes up
        let corpus = SharedCorpus::new(Arc::new(provider)).get().await;
        assert!(corpus.store.is_empty());
        assert_eq!(corpus.catalog.len(), 2);
    }

    #[test]
    fn test_from_parts_is_preloaded() {
        let corpus = SharedCorpus::from_parts(ChunkStore::empty(), DocumentCatalog::default());
        assert!(corpus.loaded().is_some());
        let got = tokio_test::block_on(corpus.get());
        assert!(got.store.is_empty());
    }
}
