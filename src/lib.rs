// src/lib.rs
// Public library surface for integration tests (and the RPC host embedding
// the engine).
//
// A resumable streaming ingestion engine over a job-based search API:
// initial page → historical backfill → live tailing, with caller-persisted
// checkpoints, offline-gap reconciliation on resume, and a typed
// retryable-vs-permanent error taxonomy.

pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod provider;
pub mod record;
pub mod retry;
pub mod snowflake;
pub mod state;
pub mod stream;

// ---- Re-exports for stable public API ----
pub use crate::config::{ProviderConfig, QueryConfig};
pub use crate::engine::{StreamEngine, TurnOutput};
pub use crate::error::{EngineError, ProviderError, ProviderErrorKind};
pub use crate::provider::{http::HttpSearchProvider, JobRequest, JobStatus, SearchProvider};
pub use crate::record::{Author, SourceItem};
pub use crate::snowflake::SnowflakeId;
pub use crate::state::{Checkpoint, Phase, StreamState};
pub use crate::stream::{ItemStream, StreamOptions};
