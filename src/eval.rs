//! Offline retrieval evaluation: precision/recall, MAP, NDCG, and MRR.
//!
//! Consumes the same `similarity_search_with_scores` contract as report
//! generation. Retrieved documents are mapped to stable identifiers via
//! [`resolve_doc_id`]; ground truth comes from a qrels TSV
//! (`qid\tdocid\trelevance`) and a queries JSON/JSONL file.
//!
//! NDCG uses the traditional gain formulation: the rank-1 relevance is
//! taken as-is and later ranks contribute `rel / log2(rank)`; the ideal DCG
//! is computed from the relevance grades sorted descending.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Serialize;

use crate::error::{MedragError, Result};
use crate::models::resolve_doc_id;
use crate::store::VectorStore;

/// Relevance judgments: query id → document id → graded relevance.
pub type Qrels = HashMap<String, HashMap<String, i32>>;

/// Per-query evaluation metrics.
#[derive(Debug, Serialize)]
pub struct QueryMetrics {
    pub ap: f64,
    pub ndcg: f64,
    pub mrr: f64,
    pub precision: f64,
    pub recall: f64,
    /// Resolved ids of the retrieved documents, in rank order.
    pub retrieved: Vec<String>,
    /// The judged documents for this query.
    pub relevant: HashMap<String, i32>,
}

/// Corpus-level means across all evaluated queries.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub map: f64,
    pub mean_ndcg: f64,
    pub mean_mrr: f64,
    pub mean_precision: f64,
    pub mean_recall: f64,
}

/// Full evaluation output, serializable to JSON.
#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub per_query: BTreeMap<String, QueryMetrics>,
    pub summary: Summary,
}

/// Load qrels from a TSV file: `qid\tdocid\trelevance`.
///
/// Blank lines and lines starting with `#` are skipped, as are malformed
/// rows with fewer than three columns.
pub fn load_qrels(path: &Path) -> Result<Qrels> {
    let content = std::fs::read_to_string(path)?;
    let mut qrels: Qrels = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            continue;
        }
        let rel: i32 = parts[2].trim().parse().map_err(|_| {
            MedragError::Config(format!("invalid relevance grade in qrels: '{}'", parts[2]))
        })?;
        qrels
            .entry(parts[0].to_string())
            .or_default()
            .insert(parts[1].to_string(), rel);
    }

    Ok(qrels)
}

/// Load queries from a JSON array or JSONL file.
///
/// JSON: `[{"qid": "q1", "query": "..."}, ...]`
/// JSONL: one `{"qid": ..., "query": ...}` object per line.
pub fn load_queries(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)?;
    let trimmed = content.trim_start();

    let items: Vec<serde_json::Value> = if trimmed.starts_with('[') {
        serde_json::from_str(&content)
            .map_err(|e| MedragError::Config(format!("invalid queries JSON: {e}")))?
    } else {
        let mut items = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            items.push(
                serde_json::from_str(line)
                    .map_err(|e| MedragError::Config(format!("invalid queries JSONL: {e}")))?,
            );
        }
        items
    };

    let mut queries = Vec::with_capacity(items.len());
    for item in items {
        let qid = item
            .get("qid")
            .map(json_value_to_string)
            .ok_or_else(|| MedragError::Config("query item missing 'qid'".to_string()))?;
        let query = item
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MedragError::Config("query item missing 'query'".to_string()))?;
        queries.push((qid, query.to_string()));
    }
    Ok(queries)
}

fn json_value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fraction of the first `k` retrieved documents that are relevant.
pub fn precision_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let retrieved_k = &retrieved[..retrieved.len().min(k)];
    if retrieved_k.is_empty() {
        return 0.0;
    }
    let hits = retrieved_k.iter().filter(|d| relevant.contains(*d)).count();
    hits as f64 / retrieved_k.len() as f64
}

/// Fraction of the relevant set found within the first `k` results.
pub fn recall_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let retrieved_k = &retrieved[..retrieved.len().min(k)];
    let hits = retrieved_k.iter().filter(|d| relevant.contains(*d)).count();
    hits as f64 / relevant.len() as f64
}

/// Average of precision@i over the ranks of relevant documents.
pub fn average_precision(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    let mut num_relevant = 0usize;
    let mut score = 0.0;
    for (i, d) in retrieved.iter().enumerate() {
        if relevant.contains(d) {
            num_relevant += 1;
            score += num_relevant as f64 / (i + 1) as f64;
        }
    }
    if num_relevant == 0 {
        0.0
    } else {
        score / num_relevant as f64
    }
}

/// Discounted cumulative gain at `k` (traditional formulation).
pub fn dcg_at_k(retrieved: &[String], rels: &HashMap<String, i32>, k: usize) -> f64 {
    let mut dcg = 0.0;
    for (i, d) in retrieved.iter().take(k).enumerate() {
        let rel = rels.get(d).copied().unwrap_or(0) as f64;
        if i == 0 {
            dcg += rel;
        } else {
            dcg += rel / ((i + 1) as f64).log2();
        }
    }
    dcg
}

/// DCG of the relevance grades sorted descending — the best possible DCG.
fn ideal_dcg(rels: &HashMap<String, i32>, k: usize) -> f64 {
    let mut grades: Vec<i32> = rels.values().copied().collect();
    grades.sort_unstable_by(|a, b| b.cmp(a));

    let mut dcg = 0.0;
    for (i, rel) in grades.iter().take(k).enumerate() {
        let rel = *rel as f64;
        if i == 0 {
            dcg += rel;
        } else {
            dcg += rel / ((i + 1) as f64).log2();
        }
    }
    dcg
}

/// Normalized DCG at `k`; 0.0 when there are no judged documents.
pub fn ndcg_at_k(retrieved: &[String], rels: &HashMap<String, i32>, k: usize) -> f64 {
    if rels.is_empty() {
        return 0.0;
    }
    let ideal = ideal_dcg(rels, k);
    if ideal == 0.0 {
        return 0.0;
    }
    dcg_at_k(retrieved, rels, k) / ideal
}

/// Reciprocal rank of the first relevant document, or 0.0.
pub fn mrr(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    for (i, d) in retrieved.iter().enumerate() {
        if relevant.contains(d) {
            return 1.0 / (i + 1) as f64;
        }
    }
    0.0
}

/// Run every query against the store and aggregate metrics at cutoff `k`.
pub async fn evaluate(
    store: &VectorStore,
    queries: &[(String, String)],
    qrels: &Qrels,
    k: usize,
) -> Result<EvalReport> {
    let mut per_query = BTreeMap::new();
    let (mut sum_ap, mut sum_ndcg, mut sum_mrr, mut sum_prec, mut sum_recall) =
        (0.0, 0.0, 0.0, 0.0, 0.0);

    for (qid, qtext) in queries {
        let hits = store.similarity_search_with_scores(qtext, k).await?;
        let retrieved: Vec<String> = hits.iter().map(|h| resolve_doc_id(&h.document)).collect();

        let rels = qrels.get(qid).cloned().unwrap_or_default();
        let relevant: HashSet<String> = rels
            .iter()
            .filter(|(_, r)| **r > 0)
            .map(|(d, _)| d.clone())
            .collect();

        let metrics = QueryMetrics {
            ap: average_precision(&retrieved, &relevant),
            ndcg: ndcg_at_k(&retrieved, &rels, k),
            mrr: mrr(&retrieved, &relevant),
            precision: precision_at_k(&retrieved, &relevant, k),
            recall: recall_at_k(&retrieved, &relevant, k),
            retrieved,
            relevant: rels,
        };

        sum_ap += metrics.ap;
        sum_ndcg += metrics.ndcg;
        sum_mrr += metrics.mrr;
        sum_prec += metrics.precision;
        sum_recall += metrics.recall;
        per_query.insert(qid.clone(), metrics);
    }

    let n = per_query.len() as f64;
    let mean = |sum: f64| if per_query.is_empty() { 0.0 } else { sum / n };

    Ok(EvalReport {
        summary: Summary {
            map: mean(sum_ap),
            mean_ndcg: mean(sum_ndcg),
            mean_mrr: mean(sum_mrr),
            mean_precision: mean(sum_prec),
            mean_recall: mean(sum_recall),
        },
        per_query,
    })
}
