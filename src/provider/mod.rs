//! Provider seam: the trait the engine talks to, plus the wire-level types
//! shared by all implementations.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::snowflake::SnowflakeId;

/// Lifecycle of a provider-side search job. Created by `submit_search_job`,
/// polled until terminal, then discarded — job ids never outlive a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    InProgress,
    Done,
    Error,
}

impl JobStatus {
    /// Parse the wire string. Unknown strings map to `InProgress` so a
    /// provider adding states degrades to polling, not a hard failure.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => Self::Submitted,
            "done" => Self::Done,
            "error" => Self::Error,
            _ => Self::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One raw provider hit. The fields the engine reads are lifted out; the
/// untouched payload rides along in `raw` for auditability.
#[derive(Debug, Clone)]
pub struct RawResult {
    pub id: Option<SnowflakeId>,
    pub source: String,
    pub content: String,
    pub metadata: Value,
    pub raw: Value,
}

impl RawResult {
    pub fn from_value(v: Value) -> Self {
        let id = match v.get("id") {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.as_u64().map(SnowflakeId::new),
            _ => None,
        };
        let source = v
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = v
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata = v.get("metadata").cloned().unwrap_or(Value::Null);
        Self {
            id,
            source,
            content,
            metadata,
            raw: v,
        }
    }
}

/// Coerce a results body into a list. The provider returns a JSON array on
/// success and occasionally `null`/an object on no-content; anything that is
/// not an array becomes the empty list.
pub fn coerce_results(body: Value) -> Vec<RawResult> {
    match body {
        Value::Array(items) => items.into_iter().map(RawResult::from_value).collect(),
        _ => Vec::new(),
    }
}

/// What a search job asks for. `next_cursor` is the provider's own paging
/// cursor and is unrelated to the `max_id:`/`since_id:` query cursors.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source_kind: String,
    pub method: String,
    pub query: String,
    pub max_results: u32,
    pub next_cursor: Option<String>,
}

impl JobRequest {
    pub fn new(
        source_kind: impl Into<String>,
        method: impl Into<String>,
        query: impl Into<String>,
        max_results: u32,
    ) -> Self {
        Self {
            source_kind: source_kind.into(),
            method: method.into(),
            query: query.into(),
            max_results,
            next_cursor: None,
        }
    }
}

/// The engine's view of the search provider. Stateless and shareable across
/// streams; implementations must not hold per-stream state.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Submit an async search job; returns the provider job id.
    async fn submit_search_job(&self, req: &JobRequest) -> Result<String, ProviderError>;

    /// Poll a job. Never blocks on the provider side.
    async fn check_job_status(&self, job_id: &str) -> Result<JobStatus, ProviderError>;

    /// Fetch the results of a finished job. Always a list, empty on
    /// no-content.
    async fn get_job_results(&self, job_id: &str) -> Result<Vec<RawResult>, ProviderError>;

    /// Synchronous similarity search (no job round-trip).
    async fn similarity_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError>;

    /// Synchronous hybrid (keyword + similarity) search.
    async fn hybrid_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError>;
}
