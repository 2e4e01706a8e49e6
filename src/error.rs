//! Error taxonomy for the ingestion engine.
//!
//! Two layers: `ProviderError` classifies HTTP/transport failures from the
//! search provider, `EngineError` adds the workflow-level failures (job
//! reported `error`, poll schedule exhausted, turn budget blown). Permanent
//! classes are never retried internally and never advance `StreamState`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider failure class, derived from the HTTP status of the failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderErrorKind {
    Unauthorized,
    Forbidden,
    BadRequest,
    NotFound,
    ServiceUnavailable,
}

impl ProviderErrorKind {
    /// Map an HTTP status to a failure class. Anything that is not one of
    /// the four permanent statuses (400/401/403/404) is treated as a
    /// transient provider outage.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            _ => Self::ServiceUnavailable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::from_status(status), message)
    }

    /// Transport-level failure (connect error, timeout, malformed body).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServiceUnavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
    }

    /// Permanent failures abort immediately; only `SERVICE_UNAVAILABLE`
    /// stays on the retry schedule.
    pub fn is_permanent(&self) -> bool {
        self.kind != ProviderErrorKind::ServiceUnavailable
    }
}

/// Failures surfaced by the job workflow and the stream engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider marked the job terminal with status `error`.
    #[error("search job {job_id} failed on the provider side")]
    JobFailed { job_id: String },

    /// The poll schedule ran out before the job reached `done`.
    #[error("job polling gave up after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// The whole turn exceeded its caller-specified wall-clock budget.
    #[error("turn exceeded its {budget_ms} ms wall-clock budget")]
    BudgetExceeded { budget_ms: u64 },

    /// A persisted checkpoint did not decode into a valid state.
    #[error("invalid stream state: {0}")]
    InvalidState(String),
}

impl EngineError {
    /// True for failures that retrying the same turn cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_permanent(),
            Self::JobFailed { .. } => true,
            Self::Timeout { .. } | Self::BudgetExceeded { .. } => false,
            Self::InvalidState(_) => true,
        }
    }
}
