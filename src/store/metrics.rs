//! Metrics wrapper over a visibility store.
//!
//! Sits closest to the backend in the wrapper chain so that admission
//! rejections from the outer wrappers are not counted as backend latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{ErrorKind, Result};
use crate::store::{VisibilityOperation, VisibilityStore};
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

/// Counters and latency for one operation.
#[derive(Debug)]
pub struct OperationMetrics {
    /// Total requests.
    pub requests: AtomicU64,
    /// Failures, split by error kind (indexed by [`ErrorKind::index`]).
    pub failures: [AtomicU64; ErrorKind::COUNT],
    /// Sum of observed latencies, nanoseconds.
    pub latency_total_nanos: AtomicU64,
    /// Largest observed latency, nanoseconds.
    pub latency_max_nanos: AtomicU64,
}

impl OperationMetrics {
    const fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            requests: ZERO,
            failures: [ZERO; ErrorKind::COUNT],
            latency_total_nanos: ZERO,
            latency_max_nanos: ZERO,
        }
    }

    fn record(&self, latency: Duration, failure: Option<ErrorKind>) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(kind) = failure {
            self.failures[kind.index()].fetch_add(1, Ordering::Relaxed);
        }
        let nanos = latency.as_nanos().min(u64::MAX as u128) as u64;
        self.latency_total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.latency_max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    pub fn failure_count(&self, kind: ErrorKind) -> u64 {
        self.failures[kind.index()].load(Ordering::Relaxed)
    }
}

/// Per-operation metrics of one wrapped backend.
#[derive(Debug)]
pub struct VisibilityMetrics {
    operations: [OperationMetrics; VisibilityOperation::COUNT],
}

impl VisibilityMetrics {
    pub fn new() -> Arc<Self> {
        const OP: OperationMetrics = OperationMetrics::new();
        Arc::new(Self {
            operations: [OP; VisibilityOperation::COUNT],
        })
    }

    pub fn operation(&self, operation: VisibilityOperation) -> &OperationMetrics {
        &self.operations[operation.index()]
    }
}

pub struct MetricsVisibilityStore {
    inner: Arc<dyn VisibilityStore>,
    metrics: Arc<VisibilityMetrics>,
}

impl MetricsVisibilityStore {
    pub fn new(inner: Arc<dyn VisibilityStore>, metrics: Arc<VisibilityMetrics>) -> Self {
        Self { inner, metrics }
    }

    fn observe<T>(&self, operation: VisibilityOperation, started: Instant, result: &Result<T>) {
        self.metrics
            .operation(operation)
            .record(started.elapsed(), result.as_ref().err().map(|e| e.kind()));
    }
}

#[async_trait]
impl VisibilityStore for MetricsVisibilityStore {
    fn get_name(&self) -> String {
        self.inner.get_name()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.record_started(request).await;
        self.observe(VisibilityOperation::RecordStarted, started, &result);
        result
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.record_closed(request).await;
        self.observe(VisibilityOperation::RecordClosed, started, &result);
        result
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_open(request).await;
        self.observe(VisibilityOperation::ListOpen, started, &result);
        result
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_closed(request).await;
        self.observe(VisibilityOperation::ListClosed, started, &result);
        result
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_open_by_type(request).await;
        self.observe(VisibilityOperation::ListOpenByType, started, &result);
        result
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_closed_by_type(request).await;
        self.observe(VisibilityOperation::ListClosedByType, started, &result);
        result
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_open_by_workflow_id(request).await;
        self.observe(VisibilityOperation::ListOpenByWorkflowId, started, &result);
        result
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_closed_by_workflow_id(request).await;
        self.observe(VisibilityOperation::ListClosedByWorkflowId, started, &result);
        result
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let started = Instant::now();
        let result = self.inner.list_closed_by_status(request).await;
        self.observe(VisibilityOperation::ListClosedByStatus, started, &result);
        result
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        let started = Instant::now();
        let result = self.inner.get_closed_execution(request).await;
        self.observe(VisibilityOperation::GetClosedExecution, started, &result);
        result
    }

    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        let started = Instant::now();
        let result = self.inner.delete_execution(request).await;
        self.observe(VisibilityOperation::DeleteExecution, started, &result);
        result
    }

    fn close(&self) {
        self.inner.close();
    }
}
