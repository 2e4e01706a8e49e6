//! # Stream engine
//! The orchestrator: given `(query config, previous state?)` it picks a
//! phase, builds a cursor-qualified query, runs one job workflow, and yields
//! `(items, next state)`. Callers persist the state and invoke again.
//!
//! State is only advanced on success paths. Every error — permanent,
//! transient-exhausted, budget — leaves the caller holding the state it
//! passed in, so retrying the same turn is always safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::config::QueryConfig;
use crate::error::{EngineError, ProviderError};
use crate::job::{first_or_not_found, keep_all, JobWorkflow};
use crate::provider::{JobRequest, SearchProvider};
use crate::record::{sort_ascending, SourceItem};
use crate::snowflake::{with_max_id, with_since_id, SnowflakeId};
use crate::state::{apply_budget, StreamState};

/// One-time metrics registration (so series show up wherever they are
/// exported).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("stream_turns_total", "Engine turns executed.");
        describe_counter!("stream_items_total", "Normalized items yielded.");
        describe_counter!(
            "stream_gap_items_total",
            "Items recovered by gap detection after a resume."
        );
        describe_counter!(
            "stream_job_polls_total",
            "Job status checks issued by the workflow."
        );
        describe_counter!(
            "stream_provider_errors_total",
            "Provider HTTP/transport failures."
        );
    });
}

/// Result of one bounded unit of work.
#[derive(Debug)]
pub struct TurnOutput {
    /// Freshly ingested items, ascending by `(created_at, external_id)`.
    pub items: Vec<SourceItem>,
    pub state: StreamState,
    /// `Some(0)` = invoke again now, `Some(n)` = wait `n` ms, `None` = stop.
    pub next_poll_ms: Option<u32>,
}

/// One engine instance drives one logical stream. Independent streams each
/// get their own engine and share only the stateless provider client.
pub struct StreamEngine {
    workflow: JobWorkflow,
    // Whether this instance has already reconciled the offline gap for a
    // live-phase state it was handed. A fresh instance seeing a persisted
    // live state is, by construction, a resume.
    gap_checked: AtomicBool,
}

impl StreamEngine {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self::with_workflow(JobWorkflow::new(provider))
    }

    pub fn with_workflow(workflow: JobWorkflow) -> Self {
        ensure_metrics_described();
        Self {
            workflow,
            gap_checked: AtomicBool::new(false),
        }
    }

    /// Execute one turn. The optional `budget_ms` bounds the whole turn's
    /// wall clock; elapse surfaces as `BudgetExceeded` with state untouched.
    pub async fn turn(
        &self,
        query: &QueryConfig,
        state: Option<StreamState>,
    ) -> Result<TurnOutput, EngineError> {
        match query.budget_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), self.turn_inner(query, state))
                .await
                .map_err(|_| EngineError::BudgetExceeded { budget_ms: ms })?,
            None => self.turn_inner(query, state).await,
        }
    }

    async fn turn_inner(
        &self,
        query: &QueryConfig,
        state: Option<StreamState>,
    ) -> Result<TurnOutput, EngineError> {
        counter!("stream_turns_total").increment(1);
        let state = state.unwrap_or(StreamState::Initial);

        let out = match state {
            StreamState::Initial => self.initial_turn(query).await?,
            StreamState::Backfill {
                oldest_seen_id,
                most_recent_id,
                total_processed,
            } => {
                self.backfill_turn(query, oldest_seen_id, most_recent_id, total_processed)
                    .await?
            }
            StreamState::Live {
                most_recent_id,
                total_processed,
                backfill_done,
            } => {
                let resume = !self.gap_checked.load(Ordering::Acquire);
                match (resume, most_recent_id) {
                    (true, Some(watermark)) => {
                        self.gap_turn(query, watermark, total_processed, backfill_done)
                            .await?
                    }
                    _ => {
                        self.live_turn(query, most_recent_id, total_processed, backfill_done)
                            .await?
                    }
                }
            }
        };

        // Any successful turn means there is no offline interval left to
        // reconcile; only set on success so a failed resume retries the probe.
        self.gap_checked.store(true, Ordering::Release);
        counter!("stream_items_total").increment(out.items.len() as u64);
        Ok(out)
    }

    /// First turn of a brand-new query: no cursor attached.
    async fn initial_turn(&self, query: &QueryConfig) -> Result<TurnOutput, EngineError> {
        let (mut items, fetched) = self
            .fetch_page(query, query.query.clone(), query.page_size)
            .await?;
        let full_page = fetched > 0 && fetched as u32 == query.page_size;
        apply_budget(&mut items, 0, query.max_results);

        let total = items.len() as u64;
        let newest = items.last().map(|i| i.external_id);
        let oldest = items.first().map(|i| i.external_id);
        let budget_left = query.max_results.is_none_or(|m| total < m);

        match (full_page && budget_left, oldest) {
            (true, Some(oldest_seen_id)) => {
                info!(count = total, "full first page, entering backfill");
                Ok(TurnOutput {
                    items,
                    state: StreamState::Backfill {
                        oldest_seen_id,
                        most_recent_id: newest,
                        total_processed: total,
                    },
                    next_poll_ms: Some(0),
                })
            }
            _ => {
                debug!(count = total, "short first page, entering live tail");
                Ok(TurnOutput {
                    items,
                    state: StreamState::Live {
                        most_recent_id: newest,
                        total_processed: total,
                        backfill_done: true,
                    },
                    next_poll_ms: Some(query.live_poll_ms),
                })
            }
        }
    }

    /// Continue the historical sweep: strictly older than the current floor.
    async fn backfill_turn(
        &self,
        query: &QueryConfig,
        oldest_seen_id: SnowflakeId,
        most_recent_id: Option<SnowflakeId>,
        total_processed: u64,
    ) -> Result<TurnOutput, EngineError> {
        let qstr = with_max_id(&query.query, oldest_seen_id.saturating_dec());
        let (mut items, fetched) = self.fetch_page(query, qstr, query.page_size).await?;
        let full_page = fetched > 0 && fetched as u32 == query.page_size;
        apply_budget(&mut items, total_processed, query.max_results);

        let n = items.len() as u64;
        let new_total = total_processed + n;
        let page_oldest = items.first().map(|i| i.external_id);
        let most_recent = newest_of(most_recent_id, items.last().map(|i| i.external_id));
        // Floor is non-increasing: everything fetched sits below the old one.
        let oldest = page_oldest.map_or(oldest_seen_id, |p| p.min(oldest_seen_id));
        let budget_done = query.max_results.is_some_and(|m| new_total >= m);

        if full_page && !budget_done {
            Ok(TurnOutput {
                items,
                state: StreamState::Backfill {
                    oldest_seen_id: oldest,
                    most_recent_id: most_recent,
                    total_processed: new_total,
                },
                next_poll_ms: Some(0),
            })
        } else {
            info!(total = new_total, "backfill complete, entering live tail");
            Ok(TurnOutput {
                items,
                state: StreamState::Live {
                    most_recent_id: most_recent,
                    total_processed: new_total,
                    backfill_done: true,
                },
                next_poll_ms: Some(query.live_poll_ms),
            })
        }
    }

    /// Steady tailing: content strictly newer than the watermark.
    async fn live_turn(
        &self,
        query: &QueryConfig,
        most_recent_id: Option<SnowflakeId>,
        total_processed: u64,
        backfill_done: bool,
    ) -> Result<TurnOutput, EngineError> {
        let qstr = match most_recent_id {
            Some(w) => with_since_id(&query.query, w),
            None => query.query.clone(),
        };
        let (mut items, _) = self.fetch_page(query, qstr, query.page_size).await?;
        if let Some(w) = most_recent_id {
            items.retain(|i| i.external_id > w);
        }

        let n = items.len() as u64;
        let most_recent = newest_of(most_recent_id, items.last().map(|i| i.external_id));
        Ok(TurnOutput {
            items,
            state: StreamState::Live {
                most_recent_id: most_recent,
                total_processed: total_processed + n,
                backfill_done,
            },
            next_poll_ms: Some(query.live_poll_ms),
        })
    }

    /// Resume reconciliation: recover whatever the provider produced while
    /// the engine was offline, oldest-to-newest, then hand over to tailing.
    async fn gap_turn(
        &self,
        query: &QueryConfig,
        watermark: SnowflakeId,
        total_processed: u64,
        backfill_done: bool,
    ) -> Result<TurnOutput, EngineError> {
        // Cheap probe: one result newer than the watermark is enough to know.
        let (_, probe_fetched) = self
            .fetch_page(query, with_since_id(&query.query, watermark), 1)
            .await?;
        if probe_fetched == 0 {
            debug!(%watermark, "no offline gap, resuming steady tail");
            return Ok(TurnOutput {
                items: Vec::new(),
                state: StreamState::Live {
                    most_recent_id: Some(watermark),
                    total_processed,
                    backfill_done,
                },
                next_poll_ms: Some(query.live_poll_ms),
            });
        }

        info!(%watermark, "offline gap detected, reconciling");
        let mut collected: Vec<SourceItem> = Vec::new();
        let mut floor: Option<SnowflakeId> = None;
        loop {
            let qstr = match floor {
                // Start at the newest point, uncursored.
                None => query.query.clone(),
                Some(f) => with_max_id(&query.query, f.saturating_dec()),
            };
            let (page, _) = self.fetch_page(query, qstr, query.page_size).await?;
            if page.is_empty() {
                // Safety stop: the provider ran out before continuity.
                break;
            }
            let reached_watermark = page.iter().any(|i| i.external_id <= watermark);
            let page_oldest = page.first().map(|i| i.external_id);
            collected.extend(page.into_iter().filter(|i| i.external_id > watermark));
            if reached_watermark {
                break;
            }
            match (floor, page_oldest) {
                // The cursor must move strictly downward; bail if it stalls.
                (Some(f), Some(p)) if p >= f => break,
                (_, Some(p)) => floor = Some(p),
                (_, None) => break,
            }
        }

        sort_ascending(&mut collected);
        collected.dedup_by_key(|i| i.external_id);
        counter!("stream_gap_items_total").increment(collected.len() as u64);

        let n = collected.len() as u64;
        let most_recent = newest_of(Some(watermark), collected.last().map(|i| i.external_id));
        info!(recovered = n, "gap closed, resuming steady tail");
        Ok(TurnOutput {
            items: collected,
            state: StreamState::Live {
                most_recent_id: most_recent,
                total_processed: total_processed + n,
                backfill_done,
            },
            next_poll_ms: Some(query.live_poll_ms),
        })
    }

    /// Run one job for a page of results and normalize into delivery order.
    /// Also reports how many results the provider actually returned:
    /// page-fullness decisions key on the fetched count, not on how many
    /// survived normalization.
    async fn fetch_page(
        &self,
        query: &QueryConfig,
        query_string: String,
        limit: u32,
    ) -> Result<(Vec<SourceItem>, usize), EngineError> {
        let req = JobRequest {
            source_kind: query.source_kind.clone(),
            method: query.method.clone(),
            query: query_string,
            max_results: limit,
            next_cursor: None,
        };
        let raw = self.workflow.execute(&req, keep_all).await?;
        let fetched = raw.len();
        let mut items: Vec<SourceItem> = raw.into_iter().filter_map(SourceItem::from_raw).collect();
        sort_ascending(&mut items);
        Ok((items, fetched))
    }

    /// Direct lookup of a single item by ID.
    pub async fn get_by_id(
        &self,
        source_kind: &str,
        id: SnowflakeId,
    ) -> Result<SourceItem, EngineError> {
        let req = JobRequest::new(source_kind, "getbyid", id.to_string(), 1);
        let raw = self.workflow.execute(&req, first_or_not_found).await?;
        SourceItem::from_raw(raw).ok_or_else(|| {
            EngineError::Provider(ProviderError::not_found(format!(
                "result for {id} carried no usable id"
            )))
        })
    }

    /// Direct lookup of several items in one job.
    pub async fn get_bulk(
        &self,
        source_kind: &str,
        ids: &[SnowflakeId],
    ) -> Result<Vec<SourceItem>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let req = JobRequest::new(source_kind, "getbyids", joined, ids.len() as u32);
        let raw = self.workflow.execute(&req, keep_all).await?;
        let mut items: Vec<SourceItem> = raw.into_iter().filter_map(SourceItem::from_raw).collect();
        sort_ascending(&mut items);
        Ok(items)
    }

    /// Synchronous similarity search, normalized into delivery order.
    pub async fn similarity_search(
        &self,
        req: &JobRequest,
    ) -> Result<Vec<SourceItem>, EngineError> {
        let raw = self.workflow.provider().similarity_search(req).await?;
        let mut items: Vec<SourceItem> = raw.into_iter().filter_map(SourceItem::from_raw).collect();
        sort_ascending(&mut items);
        Ok(items)
    }

    /// Synchronous hybrid search, normalized into delivery order.
    pub async fn hybrid_search(&self, req: &JobRequest) -> Result<Vec<SourceItem>, EngineError> {
        let raw = self.workflow.provider().hybrid_search(req).await?;
        let mut items: Vec<SourceItem> = raw.into_iter().filter_map(SourceItem::from_raw).collect();
        sort_ascending(&mut items);
        Ok(items)
    }
}

/// Watermark advance: never decreases.
fn newest_of(a: Option<SnowflakeId>, b: Option<SnowflakeId>) -> Option<SnowflakeId> {
    a.into_iter().chain(b).max()
}
