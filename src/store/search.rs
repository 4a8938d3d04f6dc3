//! Search-index visibility store.
//!
//! Serves the advanced-filter read path over a [`SearchClient`]. Writes are
//! not supported here; documents reach the index through an asynchronous
//! processor. Paging switches transparently between offset mode (while the
//! total fits the index's max result window) and search-after mode.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::VisibilityConfig;
use crate::error::{Result, VisibilityError};
use crate::search::{
    BoolQuery, FieldSort, Query, SearchClient, SearchHit, SearchHits, SearchParameters,
    VisibilityDocument, CLOSE_STATUS, CLOSE_TIME, DOMAIN_ID, RUN_ID, START_TIME, WORKFLOW_ID,
    WORKFLOW_TYPE,
};
use crate::serializer::Serializer;
use crate::store::{VisibilityOperation, VisibilityStore};
use crate::token::SearchPageToken;
use crate::types::{
    CloseStatus, DataBlob, DeleteWorkflowExecutionRequest, EncodingType,
    GetClosedWorkflowExecutionRequest, GetClosedWorkflowExecutionResponse,
    ListClosedWorkflowExecutionsByStatusRequest, ListWorkflowExecutionsByTypeRequest,
    ListWorkflowExecutionsByWorkflowIdRequest, ListWorkflowExecutionsRequest,
    ListWorkflowExecutionsResponse, Memo, RecordWorkflowExecutionClosedRequest,
    RecordWorkflowExecutionStartedRequest, WorkflowExecutionInfo,
};

const SEARCH_STORE_NAME: &str = "search";

/// The index stores times at millisecond resolution; widen nanosecond range
/// bounds by one millisecond on each side.
const ONE_MILLISECOND_IN_NANOS: i64 = 1_000_000;

/// Visibility reads over the full-text index.
pub struct SearchVisibilityStore {
    client: Arc<dyn SearchClient>,
    index: String,
    config: VisibilityConfig,
    serializer: Serializer,
}

impl SearchVisibilityStore {
    pub fn new(client: Arc<dyn SearchClient>, index: impl Into<String>, config: VisibilityConfig) -> Self {
        Self {
            client,
            index: index.into(),
            config,
            serializer: Serializer::new(),
        }
    }

    async fn list(
        &self,
        op: VisibilityOperation,
        request: &ListWorkflowExecutionsRequest,
        extra_match: Option<Query>,
        is_open: bool,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let token = SearchPageToken::decode(&request.next_page_token)?;
        let params = self.build_search_parameters(request, &token, extra_match, is_open);
        let result = self
            .client
            .search(&params)
            .await
            .map_err(|e| VisibilityError::Internal(format!("{} failed: {e}", op.as_str())))?;
        self.build_list_response(result.hits, &token, is_open, request.page_size)
    }

    fn build_search_parameters(
        &self,
        request: &ListWorkflowExecutionsRequest,
        token: &SearchPageToken,
        extra_match: Option<Query>,
        is_open: bool,
    ) -> SearchParameters {
        let sort_field = if is_open { START_TIME } else { CLOSE_TIME };
        let mut query = BoolQuery::new()
            .must(Query::match_field(DOMAIN_ID, request.domain_id.clone()))
            .filter(Query::range(
                sort_field,
                request.earliest_time - ONE_MILLISECOND_IN_NANOS,
                request.latest_time + ONE_MILLISECOND_IN_NANOS,
            ));
        if let Some(extra) = extra_match {
            query = query.must(extra);
        }
        query = if is_open {
            query.must_not(Query::exists(CLOSE_STATUS))
        } else {
            query.must(Query::exists(CLOSE_STATUS))
        };

        let mut params = SearchParameters {
            index: self.index.clone(),
            query,
            from: token.from.max(0) as usize,
            page_size: request.page_size,
            sorter: vec![FieldSort::desc(sort_field), FieldSort::desc(RUN_ID)],
            search_after: Vec::new(),
        };
        if token.has_search_after() {
            params.search_after = vec![json!(token.sort_time), json!(token.tie_breaker)];
        }
        params
    }

    fn build_list_response(
        &self,
        hits: SearchHits,
        token: &SearchPageToken,
        is_open: bool,
        page_size: usize,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let num_hits = hits.hits.len();
        let mut executions = Vec::with_capacity(num_hits);
        for hit in &hits.hits {
            if let Some(info) = self.convert_hit(hit, is_open) {
                executions.push(info);
            }
        }

        let mut next_page_token = Vec::new();
        // A short page means the listing is exhausted.
        if page_size > 0 && num_hits == page_size {
            let max_result_window = (self.config.max_result_window)() as i64;
            if hits.total_hits <= max_result_window {
                next_page_token = SearchPageToken {
                    from: token.from + num_hits as i32,
                    ..Default::default()
                }
                .encode()?;
            } else if let Some(last) = executions.last() {
                // Past the result window offsets stop working; resume from
                // the sort position of the last item instead.
                let sort_time = if is_open {
                    last.start_time
                } else {
                    last.close_time.unwrap_or(0)
                };
                next_page_token = SearchPageToken {
                    from: 0,
                    sort_time,
                    tie_breaker: last.run_id.clone(),
                }
                .encode()?;
            }
        }

        Ok(ListWorkflowExecutionsResponse {
            executions,
            next_page_token,
        })
    }

    fn convert_hit(&self, hit: &SearchHit, is_open: bool) -> Option<WorkflowExecutionInfo> {
        let document: VisibilityDocument = match serde_json::from_value(hit.source.clone()) {
            Ok(document) => document,
            Err(err) => {
                warn!(doc_id = %hit.id, error = %err, "unable to decode search hit source");
                return None;
            }
        };

        let memo = self.decode_memo(&hit.id, &document);
        let execution_time = if document.execution_time == 0 {
            document.start_time
        } else {
            document.execution_time
        };

        let mut info = WorkflowExecutionInfo {
            workflow_id: document.workflow_id,
            run_id: document.run_id,
            workflow_type_name: document.workflow_type,
            start_time: document.start_time,
            execution_time,
            close_time: None,
            close_status: None,
            history_length: None,
            memo,
        };
        if !is_open {
            info.close_time = document.close_time;
            info.close_status = document.close_status.and_then(CloseStatus::from_code);
            info.history_length = document.history_length;
        }
        Some(info)
    }

    /// A malformed memo never fails the read; the field is dropped.
    fn decode_memo(&self, doc_id: &str, document: &VisibilityDocument) -> Option<Memo> {
        if document.memo.is_empty() {
            return None;
        }
        let blob = DataBlob::new(
            document.memo.clone(),
            EncodingType::from_tag(&document.encoding),
        );
        match self.serializer.deserialize_memo(Some(&blob)) {
            Ok(memo) => memo,
            Err(err) => {
                warn!(doc_id, error = %err, "unable to decode memo field");
                None
            }
        }
    }
}

#[async_trait]
impl VisibilityStore for SearchVisibilityStore {
    fn get_name(&self) -> String {
        SEARCH_STORE_NAME.to_string()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        debug!(run_id = %request.run_id, "write issued against the search store");
        Err(VisibilityError::OperationNotSupported(
            "RecordStarted is served by the asynchronous index processor".to_string(),
        ))
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        debug!(run_id = %request.run_id, "write issued against the search store");
        Err(VisibilityError::OperationNotSupported(
            "RecordClosed is served by the asynchronous index processor".to_string(),
        ))
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(VisibilityOperation::ListOpen, request, None, true)
            .await
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(VisibilityOperation::ListClosed, request, None, false)
            .await
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(
            VisibilityOperation::ListOpenByType,
            &request.request,
            Some(Query::match_field(
                WORKFLOW_TYPE,
                request.workflow_type_name.clone(),
            )),
            true,
        )
        .await
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(
            VisibilityOperation::ListClosedByType,
            &request.request,
            Some(Query::match_field(
                WORKFLOW_TYPE,
                request.workflow_type_name.clone(),
            )),
            false,
        )
        .await
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(
            VisibilityOperation::ListOpenByWorkflowId,
            &request.request,
            Some(Query::match_field(WORKFLOW_ID, request.workflow_id.clone())),
            true,
        )
        .await
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(
            VisibilityOperation::ListClosedByWorkflowId,
            &request.request,
            Some(Query::match_field(WORKFLOW_ID, request.workflow_id.clone())),
            false,
        )
        .await
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.list(
            VisibilityOperation::ListClosedByStatus,
            &request.request,
            Some(Query::match_field(CLOSE_STATUS, request.status.code())),
            false,
        )
        .await
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        let mut query = BoolQuery::new()
            .must(Query::match_field(DOMAIN_ID, request.domain_id.clone()))
            .must(Query::exists(CLOSE_STATUS))
            .must(Query::match_field(WORKFLOW_ID, request.workflow_id.clone()));
        if !request.run_id.is_empty() {
            query = query.must(Query::match_field(RUN_ID, request.run_id.clone()));
        }

        let params = SearchParameters {
            index: self.index.clone(),
            query,
            sorter: vec![FieldSort::desc(CLOSE_TIME), FieldSort::desc(RUN_ID)],
            ..Default::default()
        };
        let result = self.client.search(&params).await.map_err(|e| {
            VisibilityError::Internal(format!("GetClosedWorkflowExecution failed: {e}"))
        })?;

        let execution = result
            .hits
            .hits
            .first()
            .and_then(|hit| self.convert_hit(hit, false));
        Ok(GetClosedWorkflowExecutionResponse { execution })
    }

    async fn delete_execution(&self, _request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        // The index relies on retention policies for deletion.
        Ok(())
    }

    fn close(&self) {}
}
