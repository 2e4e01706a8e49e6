//! One bounded async job: submit → poll-with-backoff → fetch results.
//!
//! Each observed condition is classified: `done` stops the schedule,
//! job-status `error` and permanent HTTP failures abort immediately,
//! everything else (still running, transient HTTP) stays on the schedule.
//! Exhausting the schedule is a `Timeout`, distinct from provider errors.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::provider::{JobRequest, JobStatus, RawResult, SearchProvider};
use crate::retry::RetryPolicy;

pub struct JobWorkflow {
    provider: Arc<dyn SearchProvider>,
    policy: RetryPolicy,
}

impl JobWorkflow {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::job_polling(),
        }
    }

    pub fn with_policy(provider: Arc<dyn SearchProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider(&self) -> &Arc<dyn SearchProvider> {
        &self.provider
    }

    /// Run one job to completion and apply `transform` to the raw results.
    pub async fn execute<T>(
        &self,
        req: &JobRequest,
        transform: impl FnOnce(Vec<RawResult>) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let job_id = self.provider.submit_search_job(req).await?;
        debug!(job_id, method = %req.method, "search job submitted");

        let mut done = false;
        for attempt in 0..self.policy.max_attempts {
            counter!("stream_job_polls_total").increment(1);
            match self.provider.check_job_status(&job_id).await {
                Ok(JobStatus::Done) => {
                    done = true;
                    break;
                }
                Ok(JobStatus::Error) => {
                    return Err(EngineError::JobFailed { job_id });
                }
                Ok(status) => {
                    debug!(job_id, ?status, attempt, "job still running");
                }
                Err(e) if e.is_permanent() => return Err(e.into()),
                Err(e) => {
                    warn!(job_id, error = %e, attempt, "transient status failure");
                }
            }
            if attempt + 1 < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        if !done {
            return Err(EngineError::Timeout {
                attempts: self.policy.max_attempts,
            });
        }

        let results = self.provider.get_job_results(&job_id).await?;
        transform(results)
    }
}

/// Identity transform: hand the whole result list back.
pub fn keep_all(results: Vec<RawResult>) -> Result<Vec<RawResult>, EngineError> {
    Ok(results)
}

/// Single-item lookups: first element, or `NOT_FOUND` on an empty list.
pub fn first_or_not_found(results: Vec<RawResult>) -> Result<RawResult, EngineError> {
    results.into_iter().next().ok_or_else(|| {
        EngineError::Provider(crate::error::ProviderError::not_found(
            "job finished with no results",
        ))
    })
}
