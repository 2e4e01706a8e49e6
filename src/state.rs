//! Stream continuation state.
//!
//! The in-memory model is a tagged union — each phase carries exactly the
//! fields meaningful to it, so an invalid combination (live with an
//! `oldest_seen_id`, backfill without one) cannot be represented. The
//! serialized face is `Checkpoint`, a flat camelCase record with
//! decimal-string IDs that round-trips with no precision loss; callers
//! persist it and hand it back verbatim.
//!
//! Phases only move forward: `initial → backfill → live`. The engine never
//! resets or deletes state; errors leave it untouched.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::record::SourceItem;
use crate::snowflake::SnowflakeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initial,
    Backfill,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// Brand-new query; nothing observed yet.
    Initial,
    /// Historical sweep in progress, walking `max_id:` pages downward.
    Backfill {
        /// Smallest ID seen during this sweep; non-increasing.
        oldest_seen_id: SnowflakeId,
        /// Largest ID ever observed; non-decreasing.
        most_recent_id: Option<SnowflakeId>,
        total_processed: u64,
    },
    /// Steady tailing of content newer than the watermark.
    Live {
        most_recent_id: Option<SnowflakeId>,
        total_processed: u64,
        backfill_done: bool,
    },
}

impl StreamState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Initial => Phase::Initial,
            Self::Backfill { .. } => Phase::Backfill,
            Self::Live { .. } => Phase::Live,
        }
    }

    pub fn most_recent_id(&self) -> Option<SnowflakeId> {
        match self {
            Self::Initial => None,
            Self::Backfill { most_recent_id, .. } | Self::Live { most_recent_id, .. } => {
                *most_recent_id
            }
        }
    }

    pub fn total_processed(&self) -> u64 {
        match self {
            Self::Initial => 0,
            Self::Backfill {
                total_processed, ..
            }
            | Self::Live {
                total_processed, ..
            } => *total_processed,
        }
    }
}

/// The externally persisted face of `StreamState`.
///
/// `next_poll_ms` is the caller signal: `Some(0)` = invoke again now,
/// `Some(n)` = wait `n` ms first, `None` = the stream is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent_id: Option<SnowflakeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_seen_id: Option<SnowflakeId>,
    #[serde(default)]
    pub backfill_done: bool,
    #[serde(default)]
    pub total_processed: u64,
    #[serde(default)]
    pub next_poll_ms: Option<u32>,
}

impl Checkpoint {
    pub fn from_state(state: &StreamState, next_poll_ms: Option<u32>) -> Self {
        match state {
            StreamState::Initial => Self {
                phase: Phase::Initial,
                most_recent_id: None,
                oldest_seen_id: None,
                backfill_done: false,
                total_processed: 0,
                next_poll_ms,
            },
            StreamState::Backfill {
                oldest_seen_id,
                most_recent_id,
                total_processed,
            } => Self {
                phase: Phase::Backfill,
                most_recent_id: *most_recent_id,
                oldest_seen_id: Some(*oldest_seen_id),
                backfill_done: false,
                total_processed: *total_processed,
                next_poll_ms,
            },
            StreamState::Live {
                most_recent_id,
                total_processed,
                backfill_done,
            } => Self {
                phase: Phase::Live,
                most_recent_id: *most_recent_id,
                oldest_seen_id: None,
                backfill_done: *backfill_done,
                total_processed: *total_processed,
                next_poll_ms,
            },
        }
    }

    /// Decode back into the tagged union, rejecting field combinations the
    /// union cannot represent.
    pub fn into_state(self) -> Result<StreamState, EngineError> {
        match self.phase {
            Phase::Initial => {
                if self.most_recent_id.is_some()
                    || self.oldest_seen_id.is_some()
                    || self.backfill_done
                    || self.total_processed > 0
                {
                    return Err(EngineError::InvalidState(
                        "initial checkpoint carries progress fields".into(),
                    ));
                }
                Ok(StreamState::Initial)
            }
            Phase::Backfill => {
                let oldest_seen_id = self.oldest_seen_id.ok_or_else(|| {
                    EngineError::InvalidState("backfill checkpoint without oldestSeenId".into())
                })?;
                Ok(StreamState::Backfill {
                    oldest_seen_id,
                    most_recent_id: self.most_recent_id,
                    total_processed: self.total_processed,
                })
            }
            Phase::Live => Ok(StreamState::Live {
                most_recent_id: self.most_recent_id,
                total_processed: self.total_processed,
                backfill_done: self.backfill_done,
            }),
        }
    }
}

/// Enforce the item-count budget on an ascending batch, before watermarks
/// are computed. The oldest overflow is dropped so the kept run stays
/// contiguous with the previous page.
pub(crate) fn apply_budget(
    items: &mut Vec<SourceItem>,
    total_processed: u64,
    max_results: Option<u64>,
) {
    if let Some(max) = max_results {
        let remaining = usize::try_from(max.saturating_sub(total_processed)).unwrap_or(usize::MAX);
        if items.len() > remaining {
            let excess = items.len() - remaining;
            items.drain(..excess);
        }
    }
}
