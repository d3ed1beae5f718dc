//! # MedRAG
//!
//! Local-first evidence retrieval for clinical RAG workflows.
//!
//! MedRAG ingests documents (PDF/text), indexes their chunks in a pluggable
//! vector store, answers top-k similarity queries against them, and
//! evaluates retrieval quality offline against relevance judgments.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌───────────────────────┐
//! │  Ingest    │──▶│  VectorStore     │──▶│ LexicalIndex (TF-IDF) │
//! │  PDF/text  │   │  façade          │   ├───────────────────────┤
//! └───────────┘   └────────┬─────────┘   │ DenseIndex (SQLite)   │
//!                          │             └───────────────────────┘
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!        ┌──────────┐           ┌──────────┐
//!        │  Query   │           │  Eval    │
//!        │  (CLI)   │           │ P/R/NDCG │
//!        └──────────┘           └──────────┘
//! ```
//!
//! The store commits to one backend at construction, driven by the
//! configured embedding provider: `lexical` selects the in-memory TF-IDF
//! index, `openai`/`hf` select the persisted dense index. A cloud provider
//! that fails its capability probe degrades to `lexical` with a logged
//! warning.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`embedding`] | Provider probe/selection and cloud embedding APIs |
//! | [`lexical`] | In-memory TF-IDF sparse index |
//! | [`dense`] | SQLite-persisted dense index |
//! | [`store`] | Vector store façade |
//! | [`chunk`] | Overlapping text splitter |
//! | [`ingest`] | File ingestion pipeline |
//! | [`eval`] | Offline retrieval evaluation |

pub mod chunk;
pub mod config;
pub mod dense;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod ingest;
pub mod lexical;
pub mod models;
pub mod store;
