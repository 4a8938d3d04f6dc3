//! Rate-limit wrapper over a visibility store.
//!
//! Every operation, read or write, consumes from one token bucket. Denied
//! requests return `ServiceBusy` without touching the wrapped store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::TimeSource;
use crate::error::{Result, VisibilityError};
use crate::store::VisibilityStore;
use crate::tokenbucket::TokenBucket;
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

pub struct RateLimitedVisibilityStore {
    inner: Arc<dyn VisibilityStore>,
    limiter: TokenBucket,
}

impl RateLimitedVisibilityStore {
    /// `max_qps` is read from dynamic configuration at construction time.
    pub fn new(inner: Arc<dyn VisibilityStore>, max_qps: usize, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            inner,
            limiter: TokenBucket::new(max_qps, time_source),
        }
    }

    fn admit(&self) -> Result<()> {
        if self.limiter.try_consume(1) {
            Ok(())
        } else {
            Err(VisibilityError::ServiceBusy(
                "visibility persistence rate limit exceeded".to_string(),
            ))
        }
    }
}

#[async_trait]
impl VisibilityStore for RateLimitedVisibilityStore {
    fn get_name(&self) -> String {
        self.inner.get_name()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        self.admit()?;
        self.inner.record_started(request).await
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        self.admit()?;
        self.inner.record_closed(request).await
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_open(request).await
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_closed(request).await
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_open_by_type(request).await
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_closed_by_type(request).await
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_open_by_workflow_id(request).await
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_closed_by_workflow_id(request).await
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.admit()?;
        self.inner.list_closed_by_status(request).await
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        self.admit()?;
        self.inner.get_closed_execution(request).await
    }

    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        self.admit()?;
        self.inner.delete_execution(request).await
    }

    fn close(&self) {
        self.inner.close();
    }
}
