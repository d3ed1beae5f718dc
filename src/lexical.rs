//! Local TF-IDF lexical index.
//!
//! A no-network sparse vector backend: documents are embedded with a
//! term-frequency / inverse-document-frequency model fitted over the corpus,
//! and queries are ranked by dot product over the L2-normalized sparse
//! vectors (i.e. cosine similarity).
//!
//! The embedder is a two-state machine: `Unfitted` until the first document
//! batch is seen, `Fitted` afterwards. Fitting again replaces the model and
//! invalidates vectors computed under the prior fit — which is why
//! [`LexicalIndex::add`] always refits over the **full cumulative corpus**
//! and recomputes every stored row, keeping old and new rows comparable.
//! The refit is O(corpus) per add, acceptable at the local/demo scale this
//! backend targets.

use std::collections::{BTreeMap, HashMap};

use crate::error::{MedragError, Result};
use crate::models::{Document, ScoredDocument};

/// A sparse embedding: `(term_index, weight)` pairs sorted by term index.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
}

impl SparseVector {
    fn new(mut entries: Vec<(usize, f32)>) -> Self {
        entries.sort_by_key(|(i, _)| *i);
        Self { entries }
    }

    /// Number of nonzero dimensions.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Dot product of two sparse vectors (merge over sorted indices).
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0f32;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.entries.len() && j < other.entries.len() {
            let (ia, va) = self.entries[i];
            let (ib, vb) = other.entries[j];
            match ia.cmp(&ib) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += va * vb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Scale entries so the vector has unit L2 norm. Zero vectors stay zero.
    fn l2_normalize(&mut self) {
        let norm: f32 = self
            .entries
            .iter()
            .map(|(_, v)| v * v)
            .sum::<f32>()
            .sqrt();
        if norm > f32::EPSILON {
            for (_, v) in &mut self.entries {
                *v /= norm;
            }
        }
    }
}

/// Fitted vocabulary and inverse-document-frequency weights.
struct FittedModel {
    /// Term → column index, assigned in sorted term order.
    vocabulary: HashMap<String, usize>,
    /// Smoothed IDF per column: `ln((1 + n) / (1 + df)) + 1`.
    idf: Vec<f32>,
}

/// Term-frequency / inverse-document-frequency embedder.
///
/// States: `Unfitted` → [`fit_transform`](Self::fit_transform) → `Fitted`.
/// [`embed_query`](Self::embed_query) is legal only in `Fitted` and returns
/// [`MedragError::NotFitted`] otherwise. Refitting replaces the model.
#[derive(Default)]
pub struct TfidfEmbedder {
    model: Option<FittedModel>,
}

impl TfidfEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a document batch has established the model.
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Fit the vocabulary and IDF weights on `texts` and return one
    /// L2-normalized row vector per input, in input order.
    ///
    /// Deterministic for a fixed input order: the vocabulary assigns column
    /// indices in sorted term order. Any previously fitted model is
    /// replaced, so vectors computed under the old fit become incomparable.
    pub fn fit_transform(&mut self, texts: &[String]) -> Vec<SparseVector> {
        let token_lists: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();

        // Document frequency per term, iterated in sorted term order.
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &token_lists {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let n = texts.len();
        let mut vocabulary = HashMap::with_capacity(df.len());
        let mut idf = Vec::with_capacity(df.len());
        for (column, (term, count)) in df.iter().enumerate() {
            vocabulary.insert((*term).to_string(), column);
            idf.push((((1 + n) as f32) / ((1 + count) as f32)).ln() + 1.0);
        }

        let model = FittedModel { vocabulary, idf };
        let rows = token_lists
            .iter()
            .map(|tokens| transform(&model, tokens))
            .collect();
        self.model = Some(model);
        rows
    }

    /// Embed a query under the current fitted model.
    ///
    /// Terms outside the fitted vocabulary are ignored; a query with no
    /// known terms embeds to the zero vector (and scores 0 everywhere).
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::NotFitted`] when no document batch has been
    /// fitted yet.
    pub fn embed_query(&self, text: &str) -> Result<SparseVector> {
        let model = self.model.as_ref().ok_or(MedragError::NotFitted)?;
        Ok(transform(model, &tokenize(text)))
    }
}

/// Lowercased word tokens of at least two characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// TF × IDF for one token list, L2-normalized.
fn transform(model: &FittedModel, tokens: &[String]) -> SparseVector {
    let mut counts: HashMap<usize, f32> = HashMap::new();
    for token in tokens {
        if let Some(&column) = model.vocabulary.get(token) {
            *counts.entry(column).or_insert(0.0) += 1.0;
        }
    }
    let mut vector = SparseVector::new(
        counts
            .into_iter()
            .map(|(column, tf)| (column, tf * model.idf[column]))
            .collect(),
    );
    vector.l2_normalize();
    vector
}

/// In-memory sparse vector index over the full document corpus.
///
/// Append-only: rows are never reordered or removed, so a row's position is
/// a stable handle back to its document. Every [`add`](Self::add) refits the
/// TF-IDF model over the cumulative corpus and recomputes all rows.
#[derive(Default)]
pub struct LexicalIndex {
    documents: Vec<Document>,
    rows: Vec<SparseVector>,
    embedder: TfidfEmbedder,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Append documents and refit the model over the full corpus.
    pub fn add(&mut self, documents: &[Document]) {
        if documents.is_empty() {
            return;
        }
        self.documents.extend_from_slice(documents);
        let texts: Vec<String> = self
            .documents
            .iter()
            .map(|d| d.content.clone())
            .collect();
        self.rows = self.embedder.fit_transform(&texts);
    }

    /// Top-k documents by dot-product similarity to the query.
    ///
    /// Returns an empty sequence for an empty index. Results are sorted by
    /// descending score; ties break toward the earliest-inserted document.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if self.documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query)?;

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (position, row.dot(&query_vec)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredDocument {
                document: self.documents[position].clone(),
                score,
            })
            .collect())
    }
}
