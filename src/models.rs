//! Core data types that flow through ingestion, retrieval, and evaluation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An immutable unit of retrievable content.
///
/// Metadata conventionally carries `source`, `path`, and `chunk_index`; the
/// pair `source` + `chunk_index` is the de-facto external identifier, but
/// nothing enforces uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The chunk text.
    pub content: String,
    /// Key-value metadata attached at ingestion time.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document from content and metadata pairs.
    pub fn new(
        content: impl Into<String>,
        metadata: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: metadata.into_iter().collect(),
        }
    }
}

/// A retrieved [`Document`] paired with a relevance score.
///
/// Higher scores are more relevant. Scores from different store instances or
/// backends are not comparable as absolute quality measures.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    /// The retrieved document.
    pub document: Document,
    /// Raw similarity score from the active backend.
    pub score: f32,
}

/// Metadata keys checked, in priority order, when resolving a stable
/// document identifier for evaluation.
const ID_KEYS: [&str; 4] = ["source", "doc_id", "path", "filename"];

/// Length of the truncated-content pseudo-id fallback.
const PSEUDO_ID_CHARS: usize = 30;

/// Resolve a stable identifier for an indexed document.
///
/// Checks `source`, `doc_id`, `path`, and `filename` metadata keys in that
/// order. When none is present, falls back to the first 30 characters of the
/// content (trimmed) — a degraded, collision-prone pseudo-id.
pub fn resolve_doc_id(doc: &Document) -> String {
    for key in ID_KEYS {
        if let Some(value) = doc.metadata.get(key) {
            return value.clone();
        }
    }
    doc.content
        .chars()
        .take(PSEUDO_ID_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(pairs: &[(&str, &str)]) -> Document {
        Document::new(
            "Community-acquired pneumonia in adults.",
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_resolve_prefers_source() {
        let doc = doc_with(&[("path", "/tmp/a.pdf"), ("source", "guideline1")]);
        assert_eq!(resolve_doc_id(&doc), "guideline1");
    }

    #[test]
    fn test_resolve_priority_order() {
        let doc = doc_with(&[("filename", "a.pdf"), ("doc_id", "d42"), ("path", "/x")]);
        assert_eq!(resolve_doc_id(&doc), "d42");
    }

    #[test]
    fn test_resolve_falls_back_to_truncated_content() {
        let doc = doc_with(&[]);
        assert_eq!(resolve_doc_id(&doc), "Community-acquired pneumonia i");
    }

    #[test]
    fn test_pseudo_id_is_trimmed() {
        let doc = Document::new("  short  ", Vec::<(String, String)>::new());
        assert_eq!(resolve_doc_id(&doc), "short");
    }
}
