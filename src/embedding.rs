//! Embedding provider selection and cloud embedding APIs.
//!
//! Three providers are supported:
//! - **`openai`** — OpenAI `POST /v1/embeddings`, batched, with retry/backoff.
//! - **`hf`** — Hugging Face Inference API feature-extraction pipeline.
//! - **`lexical`** — the local TF-IDF embedder (see [`crate::lexical`]); no
//!   network dependency.
//!
//! # Provider Selection
//!
//! Selection happens once, at store construction, via [`resolve_provider`].
//! A requested cloud provider that fails its capability [`probe`] degrades
//! to `lexical` with a logged warning — the fallback is explicit and
//! observable, never a silent catch-all.
//!
//! # Retry Strategy
//!
//! Cloud calls use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::error::{MedragError, Result};

/// A dense text embedder usable by the persistent index.
///
/// Implemented by [`DenseEmbedder`] for the cloud providers; tests provide
/// deterministic local implementations. Queries must be embedded under the
/// same model as documents for scores to be meaningful.
#[async_trait]
pub trait DenseEmbedding: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier recorded alongside persisted vectors.
    fn model_name(&self) -> String;
}

/// Environment variable holding the OpenAI API key.
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable holding the Hugging Face API token.
const HF_TOKEN_VAR: &str = "HF_API_TOKEN";

/// The embedding backends a store can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI embeddings API (dense vectors).
    OpenAi,
    /// Hugging Face Inference API (dense vectors).
    HuggingFace,
    /// Local TF-IDF embedder (sparse vectors).
    Lexical,
}

impl ProviderKind {
    /// Parse a config string (`openai` | `hf` | `lexical`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "hf" => Ok(Self::HuggingFace),
            "lexical" => Ok(Self::Lexical),
            other => Err(MedragError::Config(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }

    /// Config-facing name of the provider.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::HuggingFace => "hf",
            Self::Lexical => "lexical",
        }
    }

    /// True when the provider produces dense vectors via a network API.
    pub fn is_cloud(&self) -> bool {
        !matches!(self, Self::Lexical)
    }
}

/// Outcome of a provider capability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// The provider can be constructed with the current environment/config.
    Available,
    /// The provider cannot be used; carries the human-readable reason.
    Unavailable(String),
}

/// Probe whether a provider can be constructed right now.
///
/// Pure inspection of environment and config: no network call is made, so
/// an `Available` probe can still fail later at request time.
pub fn probe(kind: ProviderKind, config: &EmbeddingConfig) -> ProviderStatus {
    match kind {
        ProviderKind::Lexical => ProviderStatus::Available,
        ProviderKind::OpenAi => {
            if config.model.is_empty() {
                return ProviderStatus::Unavailable("embedding.model is empty".to_string());
            }
            match std::env::var(OPENAI_KEY_VAR) {
                Ok(key) if !key.is_empty() => ProviderStatus::Available,
                _ => ProviderStatus::Unavailable(format!("{OPENAI_KEY_VAR} not set")),
            }
        }
        ProviderKind::HuggingFace => {
            if config.hf_model.is_empty() {
                return ProviderStatus::Unavailable("embedding.hf_model is empty".to_string());
            }
            match std::env::var(HF_TOKEN_VAR) {
                Ok(token) if !token.is_empty() => ProviderStatus::Available,
                _ => ProviderStatus::Unavailable(format!("{HF_TOKEN_VAR} not set")),
            }
        }
    }
}

/// The provider a store ended up with, plus how it got there.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    /// The provider the store will use.
    pub kind: ProviderKind,
    /// Set when a requested cloud provider failed its probe and the store
    /// degraded to the lexical backend.
    pub fallback_from: Option<(ProviderKind, String)>,
}

/// Resolve the configured provider, degrading to `lexical` when a cloud
/// provider is unavailable.
///
/// The degradation is logged as a warning and recorded in the returned
/// [`ResolvedProvider`] so callers can surface it.
pub fn resolve_provider(config: &EmbeddingConfig) -> Result<ResolvedProvider> {
    let requested = ProviderKind::parse(&config.provider)?;

    match probe(requested, config) {
        ProviderStatus::Available => Ok(ResolvedProvider {
            kind: requested,
            fallback_from: None,
        }),
        ProviderStatus::Unavailable(reason) => {
            warn!(
                provider = requested.name(),
                reason = %reason,
                "embedding backend unavailable, falling back to lexical"
            );
            Ok(ResolvedProvider {
                kind: ProviderKind::Lexical,
                fallback_from: Some((requested, reason)),
            })
        }
    }
}

/// Dense embedding client for the cloud providers.
///
/// Deterministic for a fixed provider configuration and input order, as far
/// as the upstream API is. Holds a reusable [`reqwest::Client`] with the
/// configured timeout.
pub struct DenseEmbedder {
    kind: ProviderKind,
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl DenseEmbedder {
    /// Build a dense embedder for `openai` or `hf`.
    ///
    /// # Errors
    ///
    /// Returns [`MedragError::BackendUnavailable`] when the probe fails or
    /// the kind is `Lexical` (which has no network client).
    pub fn new(kind: ProviderKind, config: &EmbeddingConfig) -> Result<Self> {
        if !kind.is_cloud() {
            return Err(MedragError::BackendUnavailable {
                provider: kind.name().to_string(),
                reason: "lexical provider has no dense embedding client".to_string(),
            });
        }
        if let ProviderStatus::Unavailable(reason) = probe(kind, config) {
            return Err(MedragError::BackendUnavailable {
                provider: kind.name().to_string(),
                reason,
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedragError::Embedding {
                provider: kind.name().to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            kind,
            config: config.clone(),
            client,
        })
    }

    /// Which cloud provider this embedder talks to.
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Embed a batch of texts, one vector per input, in input order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.kind {
            ProviderKind::OpenAi => self.embed_openai(texts).await,
            ProviderKind::HuggingFace => self.embed_hf(texts).await,
            ProviderKind::Lexical => unreachable!("checked at construction"),
        }
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| MedragError::Embedding {
            provider: self.kind.name().to_string(),
            message: "empty embedding response".to_string(),
        })
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var(OPENAI_KEY_VAR).map_err(|_| self.err("API key not set"))?;

        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let json = self
            .post_with_retry("https://api.openai.com/v1/embeddings", &api_key, &body)
            .await?;
        self.parse_openai_response(&json)
    }

    async fn embed_hf(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let token = std::env::var(HF_TOKEN_VAR).map_err(|_| self.err("API token not set"))?;

        let url = format!(
            "https://api-inference.huggingface.co/models/{}/pipeline/feature-extraction",
            self.config.hf_model
        );
        let body = serde_json::json!({ "inputs": texts });

        let json = self.post_with_retry(&url, &token, &body).await?;
        self.parse_hf_response(&json, texts.len())
    }

    /// POST a JSON body with bearer auth and exponential-backoff retry.
    async fn post_with_retry(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err: Option<MedragError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {bearer}"))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            self.err(&format!("failed to decode response body: {e}"))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(self.err(&format!("API error {status}: {body_text}")));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    return Err(self.err(&format!("API error {status}: {body_text}")));
                }
                Err(e) => {
                    last_err = Some(self.err(&format!("network error: {e}")));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| self.err("embedding failed after retries")))
    }

    /// Extract `data[].embedding` arrays, in input order.
    fn parse_openai_response(&self, json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| self.err("invalid response: missing data array"))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| self.err("invalid response: missing embedding"))?;
            embeddings.push(
                embedding
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect(),
            );
        }
        Ok(embeddings)
    }

    /// The feature-extraction pipeline returns a plain array of vectors.
    fn parse_hf_response(&self, json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
        let rows = json
            .as_array()
            .ok_or_else(|| self.err("invalid response: expected an array of vectors"))?;

        if rows.len() != expected {
            return Err(self.err(&format!(
                "invalid response: expected {expected} vectors, got {}",
                rows.len()
            )));
        }

        rows.iter()
            .map(|row| {
                row.as_array()
                    .map(|vals| {
                        vals.iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                            .collect()
                    })
                    .ok_or_else(|| self.err("invalid response: row is not a vector"))
            })
            .collect()
    }

    fn err(&self, message: &str) -> MedragError {
        MedragError::Embedding {
            provider: self.kind.name().to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl DenseEmbedding for DenseEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        DenseEmbedder::embed_documents(self, texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        DenseEmbedder::embed_query(self, text).await
    }

    fn model_name(&self) -> String {
        match self.kind {
            ProviderKind::HuggingFace => self.config.hf_model.clone(),
            _ => self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_names() {
        assert_eq!(ProviderKind::parse("openai").unwrap(), ProviderKind::OpenAi);
        assert_eq!(
            ProviderKind::parse("hf").unwrap(),
            ProviderKind::HuggingFace
        );
        assert_eq!(
            ProviderKind::parse("lexical").unwrap(),
            ProviderKind::Lexical
        );
        assert!(ProviderKind::parse("word2vec").is_err());
    }

    #[test]
    fn test_lexical_always_available() {
        let config = EmbeddingConfig::default();
        assert_eq!(
            probe(ProviderKind::Lexical, &config),
            ProviderStatus::Available
        );
    }

    #[test]
    fn test_probe_reports_missing_model() {
        let mut config = EmbeddingConfig::default();
        config.model = String::new();
        match probe(ProviderKind::OpenAi, &config) {
            ProviderStatus::Unavailable(reason) => assert!(reason.contains("model")),
            ProviderStatus::Available => panic!("probe should fail on empty model"),
        }
    }

    #[test]
    fn test_resolve_degrades_to_lexical_on_failed_probe() {
        let mut config = EmbeddingConfig::default();
        config.provider = "openai".to_string();
        // empty model fails the probe regardless of environment keys
        config.model = String::new();

        let resolved = resolve_provider(&config).unwrap();
        assert_eq!(resolved.kind, ProviderKind::Lexical);
        let (requested, reason) = resolved.fallback_from.expect("fallback must be recorded");
        assert_eq!(requested, ProviderKind::OpenAi);
        assert!(reason.contains("model"));
    }

    #[test]
    fn test_resolve_keeps_lexical_without_fallback() {
        let config = EmbeddingConfig::default();
        let resolved = resolve_provider(&config).unwrap();
        assert_eq!(resolved.kind, ProviderKind::Lexical);
        assert!(resolved.fallback_from.is_none());
    }

    #[test]
    fn test_parse_openai_response_shape() {
        let config = EmbeddingConfig::default();
        // bypass probe: build struct directly
        let embedder = DenseEmbedder {
            kind: ProviderKind::OpenAi,
            config,
            client: reqwest::Client::new(),
        };
        let json = serde_json::json!({
            "data": [
                {"embedding": [0.1, 0.2]},
                {"embedding": [0.3, 0.4]},
            ]
        });
        let vecs = embedder.parse_openai_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].len(), 2);
        assert!((vecs[1][1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_hf_response_shape() {
        let config = EmbeddingConfig::default();
        let embedder = DenseEmbedder {
            kind: ProviderKind::HuggingFace,
            config,
            client: reqwest::Client::new(),
        };
        let json = serde_json::json!([[1.0, 0.0], [0.0, 1.0]]);
        let vecs = embedder.parse_hf_response(&json, 2).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!(embedder.parse_hf_response(&json, 3).is_err());
    }
}
