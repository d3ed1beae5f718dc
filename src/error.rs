//! Error types for the medrag library.
//!
//! The taxonomy distinguishes fatal model-state errors ([`MedragError::NotFitted`])
//! from recoverable configuration/persistence errors. Recoverable errors are
//! expected to be degraded-and-logged by callers; fatal errors propagate to the
//! immediate caller of the failing operation.

use thiserror::Error;

/// Errors that can occur in retrieval, ingestion, and evaluation.
#[derive(Debug, Error)]
pub enum MedragError {
    /// A query embedding was requested before any document batch fit the
    /// lexical model. Fatal for the call; the caller must ingest first.
    #[error("lexical embedder is not fitted; call embed on a document batch first")]
    NotFitted,

    /// The store holds zero documents and the caller requires evidence to
    /// proceed. Raised by callers, never by the store itself.
    #[error("vector store is empty; ingest documents before querying")]
    EmptyStore,

    /// A requested cloud embedding backend cannot be used. Callers fall back
    /// to the local lexical backend and must surface this visibly.
    #[error("embedding backend '{provider}' unavailable: {reason}")]
    BackendUnavailable {
        /// The provider that failed the capability probe.
        provider: String,
        /// Why the probe failed (missing key, bad config, ...).
        reason: String,
    },

    /// A write-through save to durable storage failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// An embedding API call failed after retries were exhausted.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Text extraction from a source file failed.
    #[error("extraction error ({path}): {message}")]
    Extract {
        /// The file that failed to extract.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// An underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A convenience result type for medrag operations.
pub type Result<T> = std::result::Result<T, MedragError>;
