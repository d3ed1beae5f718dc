//! Vector store façade over the lexical and dense backends.
//!
//! [`VectorStore::open`] resolves the embedding provider once and commits to
//! a backend for the lifetime of the instance: the in-memory TF-IDF
//! [`LexicalIndex`] for the `lexical` provider, or the SQLite-persisted
//! [`DenseIndex`] for the cloud providers. Callers never see the backend —
//! they get one uniform insert/query surface.
//!
//! Querying an empty store returns an empty sequence, not an error; callers
//! producing user-facing output are expected to treat an empty store as
//! [`MedragError::EmptyStore`](crate::error::MedragError::EmptyStore)
//! themselves before querying.

use tracing::info;

use crate::config::Config;
use crate::dense::DenseIndex;
use crate::embedding::{resolve_provider, DenseEmbedder, ProviderKind, ResolvedProvider};
use crate::error::Result;
use crate::lexical::LexicalIndex;
use crate::models::{Document, ScoredDocument};

/// The backend a store committed to at construction.
enum Backend {
    Lexical(LexicalIndex),
    Dense(DenseIndex),
}

/// Uniform entry point for document insertion and similarity search.
pub struct VectorStore {
    backend: Backend,
    provider: ResolvedProvider,
}

impl VectorStore {
    /// Build a store from configuration.
    ///
    /// The provider is resolved once: a cloud provider that fails its
    /// capability probe degrades to the lexical backend with a logged
    /// warning (recorded in [`fallback`](Self::fallback)). The backend
    /// choice is immutable for the instance's lifetime.
    pub async fn open(config: &Config) -> Result<Self> {
        let provider = resolve_provider(&config.embedding)?;

        let backend = match provider.kind {
            ProviderKind::Lexical => Backend::Lexical(LexicalIndex::new()),
            kind => {
                let embedder = DenseEmbedder::new(kind, &config.embedding)?;
                let index = DenseIndex::open(&config.storage, Box::new(embedder)).await?;
                Backend::Dense(index)
            }
        };

        info!(provider = provider.kind.name(), "opened vector store");
        Ok(Self { backend, provider })
    }

    /// The provider the store resolved to.
    pub fn provider(&self) -> ProviderKind {
        self.provider.kind
    }

    /// The requested provider and reason, when the store degraded to the
    /// lexical backend.
    pub fn fallback(&self) -> Option<&(ProviderKind, String)> {
        self.provider.fallback_from.as_ref()
    }

    /// Append documents to the active backend.
    pub async fn add_documents(&mut self, documents: &[Document]) -> Result<()> {
        match &mut self.backend {
            Backend::Lexical(index) => {
                index.add(documents);
                Ok(())
            }
            Backend::Dense(index) => index.add(documents).await,
        }
    }

    /// Top-k similarity search.
    ///
    /// Guarantees the result has length `min(k, corpus_size)` and is sorted
    /// by descending score. An empty store yields an empty sequence.
    pub async fn similarity_search_with_scores(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        match &self.backend {
            Backend::Lexical(index) => index.search(query, k),
            Backend::Dense(index) => index.search(query, k).await,
        }
    }

    /// True iff the active backend holds zero documents.
    pub fn is_empty(&self) -> bool {
        match &self.backend {
            Backend::Lexical(index) => index.is_empty(),
            Backend::Dense(index) => index.is_empty(),
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Lexical(index) => index.len(),
            Backend::Dense(index) => index.len(),
        }
    }
}
