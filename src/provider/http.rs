//! Reqwest-backed `SearchProvider` for the job-based search API.
//!
//! Transport failures (connect errors, timeouts, 5xx) are retried here on a
//! short exponential schedule; this is deliberately separate from the job
//! polling schedule in the workflow. Permanent statuses (400/401/403/404)
//! abort on the first sight.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::provider::{coerce_results, JobRequest, JobStatus, RawResult, SearchProvider};
use crate::retry::RetryPolicy;

pub struct HttpSearchProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl HttpSearchProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("search-stream-ingest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            retry: RetryPolicy::transport(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn arguments_body(req: &JobRequest) -> Value {
        let mut arguments = json!({
            "type": req.method,
            "query": req.query,
            "max_results": req.max_results,
        });
        if let Some(cursor) = &req.next_cursor {
            arguments["next_cursor"] = json!(cursor);
        }
        json!({ "type": req.source_kind, "arguments": arguments })
    }

    /// One logical call with bounded transport retries.
    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last: Option<ProviderError> = None;

        for attempt in 0..self.retry.max_attempts {
            let mut rb = self.http.request(method.clone(), &url);
            if !self.api_key.is_empty() {
                rb = rb.bearer_auth(&self.api_key);
            }
            if let Some(b) = body {
                rb = rb.json(b);
            }

            match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<Value>().await.map_err(|e| {
                            ProviderError::unavailable(format!("decoding {path}: {e}"))
                        });
                    }
                    let text = resp.text().await.unwrap_or_default();
                    let err =
                        ProviderError::from_status(status.as_u16(), format!("{path}: {text}"));
                    if err.is_permanent() {
                        return Err(err);
                    }
                    last = Some(err);
                }
                Err(e) => {
                    last = Some(ProviderError::unavailable(format!("{path}: {e}")));
                }
            }

            counter!("stream_provider_errors_total").increment(1);
            if attempt + 1 < self.retry.max_attempts {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    path,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(last.unwrap_or_else(|| ProviderError::unavailable(format!("{path}: retries exhausted"))))
    }

    async fn instant_search(
        &self,
        path: &str,
        req: &JobRequest,
    ) -> Result<Vec<RawResult>, ProviderError> {
        let body = Self::arguments_body(req);
        let resp = self.request_json(Method::POST, path, Some(&body)).await?;
        Ok(coerce_results(resp))
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn submit_search_job(&self, req: &JobRequest) -> Result<String, ProviderError> {
        let body = Self::arguments_body(req);
        let resp = self
            .request_json(Method::POST, "/search/jobs", Some(&body))
            .await?;

        if let Some(err) = resp.get("error").and_then(Value::as_str) {
            return Err(ProviderError::new(
                ProviderErrorKind::BadRequest,
                format!("job submission rejected: {err}"),
            ));
        }
        resp.get("uuid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::unavailable("job submission returned no uuid"))
    }

    async fn check_job_status(&self, job_id: &str) -> Result<JobStatus, ProviderError> {
        let resp = self
            .request_json(Method::GET, &format!("/search/jobs/{job_id}/status"), None)
            .await?;
        resp.get("status")
            .and_then(Value::as_str)
            .map(JobStatus::parse)
            .ok_or_else(|| ProviderError::unavailable("status response without a status field"))
    }

    async fn get_job_results(&self, job_id: &str) -> Result<Vec<RawResult>, ProviderError> {
        let resp = self
            .request_json(Method::GET, &format!("/search/jobs/{job_id}/results"), None)
            .await?;
        Ok(coerce_results(resp))
    }

    async fn similarity_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError> {
        self.instant_search("/search/similarity", req).await
    }

    async fn hybrid_search(&self, req: &JobRequest) -> Result<Vec<RawResult>, ProviderError> {
        self.instant_search("/search/hybrid", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_body_shape_matches_the_wire_contract() {
        let mut req = JobRequest::new("twitter", "searchbyquery", "from:fed", 100);
        let body = HttpSearchProvider::arguments_body(&req);
        assert_eq!(body["type"], json!("twitter"));
        assert_eq!(body["arguments"]["type"], json!("searchbyquery"));
        assert_eq!(body["arguments"]["query"], json!("from:fed"));
        assert_eq!(body["arguments"]["max_results"], json!(100));
        assert!(body["arguments"].get("next_cursor").is_none());

        req.next_cursor = Some("abc".into());
        let body = HttpSearchProvider::arguments_body(&req);
        assert_eq!(body["arguments"]["next_cursor"], json!("abc"));
    }
}
