//! Visibility store capability trait and its implementations.
//!
//! Every backend and every wrapper realizes the full operation set; backends
//! that cannot serve an operation return `OperationNotSupported` rather than
//! splitting the interface into read-only and write-only halves.

pub mod manager;
pub mod metrics;
pub mod ratelimited;
pub mod router;
pub mod sampling;
pub mod search;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

/// Uniform operation set over visibility backends and wrappers.
///
/// All operations are safe for concurrent invocation. Writes for the same
/// `(domain_id, workflow_id, run_id)` are not ordered by this layer; the
/// caller must record `started` before `closed`.
#[async_trait]
pub trait VisibilityStore: Send + Sync {
    /// Backend identifier.
    fn get_name(&self) -> String;

    /// Records a newly started execution. Idempotent by `run_id`.
    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()>;

    /// Records a newly closed execution. Idempotent by `run_id`.
    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()>;

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse>;

    /// Point lookup of a closed execution; empty response when none matches.
    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse>;

    /// Removes a record. Backends relying on TTL accept and ignore this.
    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()>;

    /// Releases backend resources.
    fn close(&self);
}

/// Operations of the visibility store, for per-operation instrumentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityOperation {
    RecordStarted,
    RecordClosed,
    ListOpen,
    ListClosed,
    ListOpenByType,
    ListClosedByType,
    ListOpenByWorkflowId,
    ListClosedByWorkflowId,
    ListClosedByStatus,
    GetClosedExecution,
    DeleteExecution,
}

impl VisibilityOperation {
    pub const COUNT: usize = 11;

    pub const ALL: [VisibilityOperation; Self::COUNT] = [
        VisibilityOperation::RecordStarted,
        VisibilityOperation::RecordClosed,
        VisibilityOperation::ListOpen,
        VisibilityOperation::ListClosed,
        VisibilityOperation::ListOpenByType,
        VisibilityOperation::ListClosedByType,
        VisibilityOperation::ListOpenByWorkflowId,
        VisibilityOperation::ListClosedByWorkflowId,
        VisibilityOperation::ListClosedByStatus,
        VisibilityOperation::GetClosedExecution,
        VisibilityOperation::DeleteExecution,
    ];

    pub fn index(self) -> usize {
        match self {
            VisibilityOperation::RecordStarted => 0,
            VisibilityOperation::RecordClosed => 1,
            VisibilityOperation::ListOpen => 2,
            VisibilityOperation::ListClosed => 3,
            VisibilityOperation::ListOpenByType => 4,
            VisibilityOperation::ListClosedByType => 5,
            VisibilityOperation::ListOpenByWorkflowId => 6,
            VisibilityOperation::ListClosedByWorkflowId => 7,
            VisibilityOperation::ListClosedByStatus => 8,
            VisibilityOperation::GetClosedExecution => 9,
            VisibilityOperation::DeleteExecution => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisibilityOperation::RecordStarted => "RecordStarted",
            VisibilityOperation::RecordClosed => "RecordClosed",
            VisibilityOperation::ListOpen => "ListOpen",
            VisibilityOperation::ListClosed => "ListClosed",
            VisibilityOperation::ListOpenByType => "ListOpenByType",
            VisibilityOperation::ListClosedByType => "ListClosedByType",
            VisibilityOperation::ListOpenByWorkflowId => "ListOpenByWorkflowID",
            VisibilityOperation::ListClosedByWorkflowId => "ListClosedByWorkflowID",
            VisibilityOperation::ListClosedByStatus => "ListClosedByStatus",
            VisibilityOperation::GetClosedExecution => "GetClosedWorkflowExecution",
            VisibilityOperation::DeleteExecution => "DeleteWorkflowExecution",
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared stub store for wrapper tests.

    use std::sync::Mutex;

    use super::*;
    use crate::error::VisibilityError;

    /// Records calls and answers with empty responses or a configured error.
    #[derive(Default)]
    pub struct StubVisibilityStore {
        pub calls: Mutex<Vec<&'static str>>,
        pub fail_with: Option<VisibilityError>,
    }

    impl StubVisibilityStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(error: VisibilityError) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_with: Some(error),
            }
        }

        pub fn recorded_calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn note(&self, call: &'static str) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn list_response(&self, call: &'static str) -> Result<ListWorkflowExecutionsResponse> {
            self.note(call)?;
            Ok(ListWorkflowExecutionsResponse::default())
        }
    }

    #[async_trait]
    impl VisibilityStore for StubVisibilityStore {
        fn get_name(&self) -> String {
            "stub".to_string()
        }

        async fn record_started(
            &self,
            _request: &RecordWorkflowExecutionStartedRequest,
        ) -> Result<()> {
            self.note("record_started")
        }

        async fn record_closed(
            &self,
            _request: &RecordWorkflowExecutionClosedRequest,
        ) -> Result<()> {
            self.note("record_closed")
        }

        async fn list_open(
            &self,
            _request: &ListWorkflowExecutionsRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_open")
        }

        async fn list_closed(
            &self,
            _request: &ListWorkflowExecutionsRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_closed")
        }

        async fn list_open_by_type(
            &self,
            _request: &ListWorkflowExecutionsByTypeRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_open_by_type")
        }

        async fn list_closed_by_type(
            &self,
            _request: &ListWorkflowExecutionsByTypeRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_closed_by_type")
        }

        async fn list_open_by_workflow_id(
            &self,
            _request: &ListWorkflowExecutionsByWorkflowIdRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_open_by_workflow_id")
        }

        async fn list_closed_by_workflow_id(
            &self,
            _request: &ListWorkflowExecutionsByWorkflowIdRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_closed_by_workflow_id")
        }

        async fn list_closed_by_status(
            &self,
            _request: &ListClosedWorkflowExecutionsByStatusRequest,
        ) -> Result<ListWorkflowExecutionsResponse> {
            self.list_response("list_closed_by_status")
        }

        async fn get_closed_execution(
            &self,
            _request: &GetClosedWorkflowExecutionRequest,
        ) -> Result<GetClosedWorkflowExecutionResponse> {
            self.note("get_closed_execution")?;
            Ok(GetClosedWorkflowExecutionResponse::default())
        }

        async fn delete_execution(&self, _request: &DeleteWorkflowExecutionRequest) -> Result<()> {
            self.note("delete_execution")
        }

        fn close(&self) {
            self.calls.lock().unwrap().push("close");
        }
    }
}
