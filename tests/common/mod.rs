// tests/common/mod.rs
#![allow(dead_code)] // each test binary uses a different slice of this module
// Scripted provider shared by the integration tests: canned result pages
// are consumed in call order, job statuses can be scripted per status
// check, and every request is recorded for assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use search_stream_ingest::provider::{coerce_results, RawResult};
use search_stream_ingest::{JobRequest, JobStatus, ProviderError, SearchProvider};

#[derive(Default)]
pub struct ScriptedProvider {
    pages: Mutex<VecDeque<Result<Vec<Value>, ProviderError>>>,
    statuses: Mutex<VecDeque<Result<JobStatus, ProviderError>>>,
    pub requests: Mutex<Vec<JobRequest>>,
    pub status_calls: AtomicU32,
    next_job: AtomicU32,
    /// Artificial latency before returning results (for budget tests).
    pub results_delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider whose result fetches take `delay` of (virtual) time.
    pub fn delayed(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            results_delay: Some(delay),
            ..Self::default()
        })
    }

    /// Queue one successful result page.
    pub fn push_page(self: &Arc<Self>, items: Vec<Value>) -> Arc<Self> {
        self.pages.lock().push_back(Ok(items));
        Arc::clone(self)
    }

    /// Queue one failing fetch.
    pub fn push_error(self: &Arc<Self>, err: ProviderError) -> Arc<Self> {
        self.pages.lock().push_back(Err(err));
        Arc::clone(self)
    }

    /// Script the next status-check outcomes; once drained, checks return
    /// `Done`.
    pub fn script_statuses(
        self: &Arc<Self>,
        statuses: Vec<Result<JobStatus, ProviderError>>,
    ) -> Arc<Self> {
        *self.statuses.lock() = statuses.into();
        Arc::clone(self)
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.query.clone()).collect()
    }
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    async fn submit_search_job(&self, req: &JobRequest) -> Result<String, ProviderError> {
        self.requests.lock().push(req.clone());
        let n = self.next_job.fetch_add(1, Ordering::SeqCst);
        Ok(format!("job-{n}"))
    }

    async fn check_job_status(&self, _job_id: &str) -> Result<JobStatus, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().pop_front().unwrap_or(Ok(JobStatus::Done))
    }

    async fn get_job_results(&self, _job_id: &str) -> Result<Vec<RawResult>, ProviderError> {
        if let Some(delay) = self.results_delay {
            tokio::time::sleep(delay).await;
        }
        match self.pages.lock().pop_front() {
            Some(Ok(items)) => Ok(coerce_results(Value::Array(items))),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn similarity_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError> {
        self.requests.lock().push(req.clone());
        match self.pages.lock().pop_front() {
            Some(Ok(items)) => Ok(coerce_results(Value::Array(items))),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn hybrid_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError> {
        self.similarity_search(req).await
    }
}

/// One provider hit with the given ID and an empty metadata object.
pub fn hit(id: u64) -> Value {
    json!({
        "id": id.to_string(),
        "source": "twitter",
        "content": format!("item {id}"),
        "metadata": {}
    })
}

/// A provider page: newest-first, the way the provider actually responds.
pub fn page_desc(newest: u64, oldest: u64) -> Vec<Value> {
    (oldest..=newest).rev().map(hit).collect()
}
