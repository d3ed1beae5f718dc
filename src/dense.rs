//! SQLite-persisted dense vector index.
//!
//! Rows live in memory as `(Document, Vec<f32>)` pairs and are mirrored
//! write-through into a SQLite table, so the corpus survives process
//! restarts without re-ingestion. Construction loads any previously
//! persisted rows in insertion order; a missing database simply starts the
//! index empty, which is not an error.
//!
//! Persist failures follow the configured [`PersistPolicy`]: the default
//! `warn` keeps the in-memory index serving (availability over durability),
//! `fail` propagates a [`MedragError::Persistence`].

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::embedding::DenseEmbedding;
use crate::error::{MedragError, Result};
use crate::models::{Document, ScoredDocument};

/// What to do when a write-through save fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistPolicy {
    /// Log a warning and keep serving from memory.
    Warn,
    /// Propagate the failure to the caller.
    Fail,
}

impl PersistPolicy {
    /// Parse the config string (`warn` | `fail`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "warn" => Ok(Self::Warn),
            "fail" => Ok(Self::Fail),
            other => Err(MedragError::Config(format!(
                "unknown persist-error policy '{other}'"
            ))),
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two dense vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Persistent dense index over a cloud embedding provider.
pub struct DenseIndex {
    embedder: Box<dyn DenseEmbedding>,
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
    /// `None` when the database could not be opened; the index then runs
    /// memory-only for the life of the process.
    pool: Option<SqlitePool>,
    policy: PersistPolicy,
}

impl DenseIndex {
    /// Open the index at the configured path, loading persisted rows.
    ///
    /// A missing database file starts the index empty. A database that
    /// cannot be opened or migrated disables persistence with a warning
    /// rather than failing construction.
    pub async fn open(storage: &StorageConfig, embedder: Box<dyn DenseEmbedding>) -> Result<Self> {
        let policy = PersistPolicy::parse(&storage.on_persist_error)?;

        let pool = match connect(storage).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(
                    path = %storage.path.display(),
                    error = %e,
                    "could not open persistent index; continuing memory-only"
                );
                None
            }
        };

        let mut index = Self {
            embedder,
            documents: Vec::new(),
            vectors: Vec::new(),
            pool,
            policy,
        };

        if let Some(pool) = index.pool.clone() {
            match load_rows(&pool).await {
                Ok(rows) => {
                    let count = rows.len();
                    let active = index.embedder.model_name();
                    if let Some((_, _, stored)) = rows.iter().find(|(_, _, m)| *m != active) {
                        warn!(
                            stored = %stored,
                            active = %active,
                            "persisted rows were embedded under a different model; \
                             their scores will not be comparable"
                        );
                    }
                    for (doc, vec, _) in rows {
                        index.documents.push(doc);
                        index.vectors.push(vec);
                    }
                    if count > 0 {
                        info!(documents = count, "loaded persisted dense index");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to load persisted rows; starting empty");
                }
            }
        }

        Ok(index)
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Embed and append documents, write-through persisting each row.
    ///
    /// # Errors
    ///
    /// Embedding failures always propagate. Persist failures propagate only
    /// under [`PersistPolicy::Fail`]; under `Warn` the rows stay queryable
    /// in memory and the failure is logged.
    pub async fn add(&mut self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(MedragError::Embedding {
                provider: self.embedder.model_name(),
                message: format!(
                    "expected {} embeddings, got {}",
                    documents.len(),
                    vectors.len()
                ),
            });
        }

        let base = self.documents.len();
        self.documents.extend_from_slice(documents);
        self.vectors.extend(vectors.iter().cloned());

        if let Some(pool) = self.pool.clone() {
            let model = self.embedder.model_name();
            for (offset, (doc, vec)) in documents.iter().zip(vectors.iter()).enumerate() {
                if let Err(e) = persist_row(&pool, base + offset, doc, vec, &model).await {
                    match self.policy {
                        PersistPolicy::Warn => {
                            warn!(error = %e, "write-through persist failed; row kept in memory");
                        }
                        PersistPolicy::Fail => {
                            return Err(MedragError::Persistence(e.to_string()));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Top-k documents by cosine similarity to the query.
    ///
    /// An empty index returns an empty sequence without touching the
    /// embedding provider. Ties break toward the earliest-inserted row.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if self.documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vec)| (position, cosine_similarity(vec, &query_vec)))
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

/// Open (creating if missing) the index database and ensure the schema.
async fn connect(storage: &StorageConfig) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = storage.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", storage.path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            position      INTEGER PRIMARY KEY,
            content       TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding     BLOB NOT NULL,
            dims          INTEGER NOT NULL,
            model         TEXT NOT NULL,
            created_at    INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Load all persisted rows in insertion order, with the model each row was
/// embedded under.
async fn load_rows(pool: &SqlitePool) -> anyhow::Result<Vec<(Document, Vec<f32>, String)>> {
    let rows = sqlx::query(
        "SELECT content, metadata_json, embedding, dims, model FROM documents ORDER BY position ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut loaded = Vec::with_capacity(rows.len());
    for row in rows {
        let content: String = row.get("content");
        let metadata_json: String = row.get("metadata_json");
        let blob: Vec<u8> = row.get("embedding");
        let dims: i64 = row.get("dims");
        let model: String = row.get("model");

        let vec = blob_to_vec(&blob);
        if vec.len() as i64 != dims {
            warn!(
                expected = dims,
                actual = vec.len(),
                "persisted embedding length disagrees with its dims column"
            );
        }

        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
        loaded.push((Document { content, metadata }, vec, model));
    }
    Ok(loaded)
}

/// Insert one row at the given position.
async fn persist_row(
    pool: &SqlitePool,
    position: usize,
    doc: &Document,
    vec: &[f32],
    model: &str,
) -> anyhow::Result<()> {
    let metadata_json = serde_json::to_string(&doc.metadata)?;
    let blob = vec_to_blob(vec);
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents (position, content, metadata_json, embedding, dims, model, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(position) DO UPDATE SET
            content = excluded.content,
            metadata_json = excluded.metadata_json,
            embedding = excluded.embedding,
            dims = excluded.dims,
            model = excluded.model
        "#,
    )
    .bind(position as i64)
    .bind(&doc.content)
    .bind(&metadata_json)
    .bind(&blob)
    .bind(vec.len() as i64)
    .bind(model)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
