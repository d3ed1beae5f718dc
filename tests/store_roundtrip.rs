//! Persistence and contract tests for the dense index, using a
//! deterministic local embedder so no network access is needed.

use async_trait::async_trait;
use tempfile::TempDir;

use medrag::config::StorageConfig;
use medrag::dense::DenseIndex;
use medrag::embedding::DenseEmbedding;
use medrag::error::{MedragError, Result};
use medrag::models::Document;

const DIMS: usize = 32;

/// Deterministic bag-of-words hashing embedder for tests.
struct HashingEmbedder;

fn fnv1a(token: &str) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in token.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn embed_text(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; DIMS];
    for token in text.to_lowercase().split_whitespace() {
        let token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
        if token.is_empty() {
            continue;
        }
        vec[(fnv1a(&token) % DIMS as u64) as usize] += 1.0;
    }
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

#[async_trait]
impl DenseEmbedding for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text(text))
    }

    fn model_name(&self) -> String {
        "hashing-test".to_string()
    }
}

/// Same vectors as [`HashingEmbedder`] but reporting a different model name.
struct RenamedHashingEmbedder;

#[async_trait]
impl DenseEmbedding for RenamedHashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text(text))
    }

    fn model_name(&self) -> String {
        "hashing-test-v2".to_string()
    }
}

fn storage_in(dir: &TempDir) -> StorageConfig {
    StorageConfig {
        path: dir.path().join("index.sqlite"),
        on_persist_error: "warn".to_string(),
    }
}

fn doc(content: &str, source: &str) -> Document {
    Document::new(content, [("source".to_string(), source.to_string())])
}

#[tokio::test]
async fn test_fresh_index_is_empty_and_searchable() {
    let dir = TempDir::new().unwrap();
    let index = DenseIndex::open(&storage_in(&dir), Box::new(HashingEmbedder))
        .await
        .unwrap();

    assert!(index.is_empty());
    assert_eq!(index.len(), 0);
    assert!(index.search("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_then_search() {
    let dir = TempDir::new().unwrap();
    let mut index = DenseIndex::open(&storage_in(&dir), Box::new(HashingEmbedder))
        .await
        .unwrap();

    index
        .add(&[
            doc("streptococcus pneumoniae causes pneumonia", "pna"),
            doc("influenza vaccination schedule", "flu"),
        ])
        .await
        .unwrap();

    assert_eq!(index.len(), 2);
    let results = index
        .search("what causes pneumonia", 2)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.metadata["source"], "pna");
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn test_persistence_roundtrip_across_instances() {
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);

    {
        let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
            .await
            .unwrap();
        index
            .add(&[doc("sepsis bundle antibiotics within one hour", "sepsis")])
            .await
            .unwrap();
        index
            .add(&[doc("stroke thrombolysis time window", "stroke")])
            .await
            .unwrap();
    }

    // A fresh instance at the same path must see everything.
    let reloaded = DenseIndex::open(&storage, Box::new(HashingEmbedder))
        .await
        .unwrap();
    assert!(!reloaded.is_empty());
    assert_eq!(reloaded.len(), 2);

    let results = reloaded.search("sepsis antibiotics", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.metadata["source"], "sepsis");
    assert!(results[0].score > 0.0);

    let results = reloaded.search("stroke thrombolysis", 1).await.unwrap();
    assert_eq!(results[0].document.metadata["source"], "stroke");
}

#[tokio::test]
async fn test_roundtrip_preserves_metadata_and_order() {
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);

    {
        let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
            .await
            .unwrap();
        index
            .add(&[
                Document::new(
                    "chunk zero text",
                    [
                        ("source".to_string(), "guide".to_string()),
                        ("path".to_string(), "/docs/guide.pdf".to_string()),
                        ("chunk_index".to_string(), "0".to_string()),
                    ],
                ),
                Document::new(
                    "chunk one text",
                    [
                        ("source".to_string(), "guide".to_string()),
                        ("chunk_index".to_string(), "1".to_string()),
                    ],
                ),
            ])
            .await
            .unwrap();
    }

    let reloaded = DenseIndex::open(&storage, Box::new(HashingEmbedder))
        .await
        .unwrap();
    let results = reloaded.search("chunk zero text", 2).await.unwrap();
    assert_eq!(results[0].document.content, "chunk zero text");
    assert_eq!(results[0].document.metadata["path"], "/docs/guide.pdf");
    assert_eq!(results[0].document.metadata["chunk_index"], "0");
    assert_eq!(results[1].document.metadata["chunk_index"], "1");
}

#[tokio::test]
async fn test_topk_bound_min_of_k_and_corpus() {
    let dir = TempDir::new().unwrap();
    let mut index = DenseIndex::open(&storage_in(&dir), Box::new(HashingEmbedder))
        .await
        .unwrap();
    index
        .add(&[
            doc("alpha topic", "a"),
            doc("beta topic", "b"),
            doc("gamma topic", "c"),
        ])
        .await
        .unwrap();

    assert_eq!(index.search("topic", 0).await.unwrap().len(), 0);
    assert_eq!(index.search("topic", 2).await.unwrap().len(), 2);
    assert_eq!(index.search("topic", 99).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_identical_documents_tie_by_insertion_order() {
    let dir = TempDir::new().unwrap();
    let mut index = DenseIndex::open(&storage_in(&dir), Box::new(HashingEmbedder))
        .await
        .unwrap();
    index
        .add(&[
            doc("identical content here", "first"),
            doc("identical content here", "second"),
        ])
        .await
        .unwrap();

    let results = index.search("identical content here", 2).await.unwrap();
    assert_eq!(results[0].document.metadata["source"], "first");
    assert_eq!(results[1].document.metadata["source"], "second");
}

/// Break write-through persistence out from under a live index.
async fn drop_backing_table(path: &std::path::Path) {
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", path.display()))
        .await
        .unwrap();
    sqlx::query("DROP TABLE documents")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
}

#[tokio::test]
async fn test_warn_policy_keeps_rows_queryable_on_persist_failure() {
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);
    let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
        .await
        .unwrap();
    index
        .add(&[doc("persisted before the failure", "ok")])
        .await
        .unwrap();

    drop_backing_table(&storage.path).await;

    index
        .add(&[doc("kept in memory after the failure", "mem")])
        .await
        .unwrap();
    assert_eq!(index.len(), 2);

    let results = index
        .search("kept in memory after the failure", 1)
        .await
        .unwrap();
    assert_eq!(results[0].document.metadata["source"], "mem");
}

#[tokio::test]
async fn test_fail_policy_propagates_persist_error() {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig {
        path: dir.path().join("index.sqlite"),
        on_persist_error: "fail".to_string(),
    };
    let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
        .await
        .unwrap();
    index
        .add(&[doc("persisted before the failure", "ok")])
        .await
        .unwrap();

    drop_backing_table(&storage.path).await;

    let err = index
        .add(&[doc("cannot be persisted", "bad")])
        .await
        .unwrap_err();
    assert!(matches!(err, MedragError::Persistence(_)), "got {err:?}");
}

#[tokio::test]
async fn test_reopen_under_different_model_still_serves_rows() {
    let dir = TempDir::new().unwrap();
    let storage = storage_in(&dir);

    {
        let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
            .await
            .unwrap();
        index
            .add(&[doc("rows embedded under the old model", "old")])
            .await
            .unwrap();
    }

    // The mismatch is warned about, not fatal: rows load and stay queryable.
    let reloaded = DenseIndex::open(&storage, Box::new(RenamedHashingEmbedder))
        .await
        .unwrap();
    assert_eq!(reloaded.len(), 1);
    let results = reloaded
        .search("rows embedded under the old model", 1)
        .await
        .unwrap();
    assert_eq!(results[0].document.metadata["source"], "old");
}

#[tokio::test]
async fn test_unwritable_path_degrades_to_memory_only() {
    // A directory path cannot be opened as a database file.
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig {
        path: dir.path().to_path_buf(),
        on_persist_error: "warn".to_string(),
    };

    let mut index = DenseIndex::open(&storage, Box::new(HashingEmbedder))
        .await
        .unwrap();
    index.add(&[doc("still works in memory", "m")]).await.unwrap();

    let results = index.search("works in memory", 1).await.unwrap();
    assert_eq!(results[0].document.metadata["source"], "m");
}
