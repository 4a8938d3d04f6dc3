//! Per-domain sampling wrapper.
//!
//! List traffic is capped per domain per rolling second; a denied list
//! returns `ServiceBusy`. With sampling enabled, started/closed writes past
//! the per-domain thresholds are dropped silently: visibility writes are
//! advisory and the index is eventually consistent anyway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::clock::TimeSource;
use crate::config::{IntPropertyFnWithDomainFilter, VisibilityConfig};
use crate::error::{Result, VisibilityError};
use crate::store::VisibilityStore;
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

const WINDOW_MILLIS: i64 = 1_000;

struct DomainWindow {
    window_start: i64,
    count: usize,
}

/// Per-domain admission counter, reset on a rolling second.
struct PerDomainRateLimiter {
    limit: IntPropertyFnWithDomainFilter,
    time_source: Arc<dyn TimeSource>,
    windows: Mutex<HashMap<String, DomainWindow>>,
}

impl PerDomainRateLimiter {
    fn new(limit: IntPropertyFnWithDomainFilter, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            limit,
            time_source,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, domain: &str) -> bool {
        let now = self.time_source.now_millis();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(domain.to_string()).or_insert(DomainWindow {
            window_start: now,
            count: 0,
        });
        if now - window.window_start >= WINDOW_MILLIS {
            window.window_start = now;
            window.count = 0;
        }
        if window.count < (self.limit)(domain) {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub struct SamplingVisibilityStore {
    inner: Arc<dyn VisibilityStore>,
    config: VisibilityConfig,
    list_limiter: PerDomainRateLimiter,
    started_limiter: PerDomainRateLimiter,
    closed_limiter: PerDomainRateLimiter,
    /// Writes dropped by sampling, for operator visibility.
    dropped_writes: AtomicU64,
}

impl SamplingVisibilityStore {
    pub fn new(
        inner: Arc<dyn VisibilityStore>,
        config: VisibilityConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let list_limiter =
            PerDomainRateLimiter::new(config.visibility_list_max_qps.clone(), time_source.clone());
        let started_limiter =
            PerDomainRateLimiter::new(config.visibility_open_max_qps.clone(), time_source.clone());
        let closed_limiter =
            PerDomainRateLimiter::new(config.visibility_closed_max_qps.clone(), time_source);
        Self {
            inner,
            config,
            list_limiter,
            started_limiter,
            closed_limiter,
            dropped_writes: AtomicU64::new(0),
        }
    }

    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }

    fn admit_list(&self, domain: &str) -> Result<()> {
        if self.list_limiter.allow(domain) {
            Ok(())
        } else {
            Err(VisibilityError::ServiceBusy(format!(
                "visibility list request for domain {domain} exceeded max qps"
            )))
        }
    }
}

#[async_trait]
impl VisibilityStore for SamplingVisibilityStore {
    fn get_name(&self) -> String {
        self.inner.get_name()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        if (self.config.enable_sampling)() && !self.started_limiter.allow(&request.domain) {
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            debug!(
                domain = %request.domain,
                run_id = %request.run_id,
                "sampled out started-execution record"
            );
            return Ok(());
        }
        self.inner.record_started(request).await
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        if (self.config.enable_sampling)() && !self.closed_limiter.allow(&request.domain) {
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            debug!(
                domain = %request.domain,
                run_id = %request.run_id,
                "sampled out closed-execution record"
            );
            return Ok(());
        }
        self.inner.record_closed(request).await
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.domain)?;
        self.inner.list_open(request).await
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.domain)?;
        self.inner.list_closed(request).await
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.request.domain)?;
        self.inner.list_open_by_type(request).await
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.request.domain)?;
        self.inner.list_closed_by_type(request).await
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.request.domain)?;
        self.inner.list_open_by_workflow_id(request).await
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.request.domain)?;
        self.inner.list_closed_by_workflow_id(request).await
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit_list(&request.request.domain)?;
        self.inner.list_closed_by_status(request).await
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        self.inner.get_closed_execution(request).await
    }

    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        self.inner.delete_execution(request).await
    }

    fn close(&self) {
        self.inner.close();
    }
}
