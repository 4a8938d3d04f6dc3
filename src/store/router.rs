//! Composite router over the configured visibility backends.
//!
//! Reads go to exactly one backend, selected per domain by dynamic
//! configuration. Writes fan out concurrently to every configured backend;
//! a secondary backend answering `OperationNotSupported` is skipped (the
//! search index is populated out-of-band), any other failure surfaces. There
//! is no cross-backend transaction and no retry: dual-write is best-effort.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::BoolPropertyFnWithDomainFilter;
use crate::error::{Result, VisibilityError};
use crate::store::{VisibilityOperation, VisibilityStore};
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

pub struct CompositeVisibilityStore {
    db: Arc<dyn VisibilityStore>,
    search: Option<Arc<dyn VisibilityStore>>,
    read_from_search: BoolPropertyFnWithDomainFilter,
}

impl CompositeVisibilityStore {
    pub fn new(
        db: Arc<dyn VisibilityStore>,
        search: Option<Arc<dyn VisibilityStore>>,
        read_from_search: BoolPropertyFnWithDomainFilter,
    ) -> Self {
        Self {
            db,
            search,
            read_from_search,
        }
    }

    fn read_store(&self, domain: &str) -> &Arc<dyn VisibilityStore> {
        match &self.search {
            Some(search) if (self.read_from_search)(domain) => search,
            _ => &self.db,
        }
    }

    /// First failure wins; the rest are logged. `OperationNotSupported` from
    /// the secondary backend is expected and skipped.
    fn merge_write_results(
        op: VisibilityOperation,
        primary: Result<()>,
        secondary: Option<Result<()>>,
    ) -> Result<()> {
        let secondary = match secondary {
            Some(Err(VisibilityError::OperationNotSupported(reason))) => {
                debug!(operation = op.as_str(), reason = %reason, "secondary backend skipped write");
                Ok(())
            }
            Some(result) => result,
            None => Ok(()),
        };
        match (primary, secondary) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(primary), Ok(())) => Err(primary),
            (Ok(()), Err(secondary)) => Err(secondary),
            (Err(primary), Err(secondary)) => {
                warn!(
                    operation = op.as_str(),
                    error = %secondary,
                    "secondary visibility write failed"
                );
                Err(primary)
            }
        }
    }
}

#[async_trait]
impl VisibilityStore for CompositeVisibilityStore {
    fn get_name(&self) -> String {
        self.db.get_name()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        match &self.search {
            None => self.db.record_started(request).await,
            Some(search) => {
                let (primary, secondary) =
                    tokio::join!(self.db.record_started(request), search.record_started(request));
                Self::merge_write_results(
                    VisibilityOperation::RecordStarted,
                    primary,
                    Some(secondary),
                )
            }
        }
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        match &self.search {
            None => self.db.record_closed(request).await,
            Some(search) => {
                let (primary, secondary) =
                    tokio::join!(self.db.record_closed(request), search.record_closed(request));
                Self::merge_write_results(
                    VisibilityOperation::RecordClosed,
                    primary,
                    Some(secondary),
                )
            }
        }
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.domain).list_open(request).await
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.domain).list_closed(request).await
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.request.domain)
            .list_open_by_type(request)
            .await
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.request.domain)
            .list_closed_by_type(request)
            .await
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.request.domain)
            .list_open_by_workflow_id(request)
            .await
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.request.domain)
            .list_closed_by_workflow_id(request)
            .await
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.read_store(&request.request.domain)
            .list_closed_by_status(request)
            .await
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        self.read_store(&request.domain)
            .get_closed_execution(request)
            .await
    }

    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        match &self.search {
            None => self.db.delete_execution(request).await,
            Some(search) => {
                let (primary, secondary) = tokio::join!(
                    self.db.delete_execution(request),
                    search.delete_execution(request)
                );
                Self::merge_write_results(
                    VisibilityOperation::DeleteExecution,
                    primary,
                    Some(secondary),
                )
            }
        }
    }

    fn close(&self) {
        self.db.close();
        if let Some(search) = &self.search {
            search.close();
        }
    }
}
