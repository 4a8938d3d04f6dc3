//! Search-index client abstraction.
//!
//! The visibility store talks to the full-text index through [`SearchClient`]
//! and a small structured query DSL, keeping the concrete index technology
//! behind the seam. Documents follow the shape in [`VisibilityDocument`];
//! indexing happens out-of-band through an asynchronous processor.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

/// Document field names of the visibility index.
pub const DOMAIN_ID: &str = "DomainID";
pub const WORKFLOW_ID: &str = "WorkflowID";
pub const RUN_ID: &str = "RunID";
pub const WORKFLOW_TYPE: &str = "WorkflowType";
pub const START_TIME: &str = "StartTime";
pub const EXECUTION_TIME: &str = "ExecutionTime";
pub const CLOSE_TIME: &str = "CloseTime";
pub const CLOSE_STATUS: &str = "CloseStatus";
pub const HISTORY_LENGTH: &str = "HistoryLength";
pub const MEMO: &str = "Memo";
pub const ENCODING: &str = "Encoding";

/// One clause of a structured query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Query {
    /// Field equals value.
    Match { field: String, value: Value },
    /// Field is present and non-null.
    Exists { field: String },
    /// Numeric field within the inclusive range.
    Range { field: String, gte: i64, lte: i64 },
    Bool(BoolQuery),
}

impl Query {
    pub fn match_field(field: &str, value: impl Into<Value>) -> Self {
        Query::Match {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn exists(field: &str) -> Self {
        Query::Exists {
            field: field.to_string(),
        }
    }

    pub fn range(field: &str, gte: i64, lte: i64) -> Self {
        Query::Range {
            field: field.to_string(),
            gte,
            lte,
        }
    }
}

/// Boolean combination of clauses.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub must_not: Vec<Query>,
    pub filter: Vec<Query>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }
}

/// Sort directive over a document field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSort {
    pub field: String,
    pub ascending: bool,
}

impl FieldSort {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

/// One search request against an index.
#[derive(Clone, Debug, Default)]
pub struct SearchParameters {
    pub index: String,
    pub query: BoolQuery,
    /// Offset into the result set; offset paging only.
    pub from: usize,
    /// Zero means the client's default page size.
    pub page_size: usize,
    pub sorter: Vec<FieldSort>,
    /// Sort-key tuple of the last item of the previous page, for deep paging.
    pub search_after: Vec<Value>,
}

/// A matched document.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub id: String,
    pub source: Value,
}

/// Matched documents plus the total match count before paging.
#[derive(Clone, Debug)]
pub struct SearchHits {
    pub total_hits: i64,
    pub hits: Vec<SearchHit>,
}

/// Result of one search request.
#[derive(Clone, Debug)]
pub struct SearchResult {
    pub hits: SearchHits,
}

/// Failure reported by the search client.
#[derive(Debug, thiserror::Error)]
#[error("search request failed: {0}")]
pub struct SearchError(pub String);

/// Client seam to the full-text index.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, params: &SearchParameters) -> Result<SearchResult, SearchError>;
}

/// Indexed shape of a visibility record.
///
/// `CloseTime`/`CloseStatus`/`HistoryLength` are absent on open-execution
/// documents; the exists-clause on `CloseStatus` separates open from closed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityDocument {
    #[serde(rename = "DomainID")]
    pub domain_id: String,
    #[serde(rename = "WorkflowID")]
    pub workflow_id: String,
    #[serde(rename = "RunID")]
    pub run_id: String,
    #[serde(rename = "WorkflowType")]
    pub workflow_type: String,
    #[serde(rename = "StartTime")]
    pub start_time: i64,
    #[serde(rename = "ExecutionTime")]
    pub execution_time: i64,
    #[serde(rename = "CloseTime", skip_serializing_if = "Option::is_none")]
    pub close_time: Option<i64>,
    #[serde(rename = "CloseStatus", skip_serializing_if = "Option::is_none")]
    pub close_status: Option<i32>,
    #[serde(rename = "HistoryLength", skip_serializing_if = "Option::is_none")]
    pub history_length: Option<i64>,
    #[serde(rename = "Memo")]
    pub memo: Vec<u8>,
    #[serde(rename = "Encoding")]
    pub encoding: String,
}

impl VisibilityDocument {
    /// Document id: workflow id and run id, delimiter-joined.
    pub fn document_id(&self) -> String {
        format!("{}~{}", self.workflow_id, self.run_id)
    }

    /// Builds the open-execution document for a started record.
    pub fn from_started(request: &RecordWorkflowExecutionStartedRequest) -> Self {
        Self {
            domain_id: request.domain_id.clone(),
            workflow_id: request.workflow_id.clone(),
            run_id: request.run_id.clone(),
            workflow_type: request.workflow_type_name.clone(),
            start_time: request.start_time,
            execution_time: request.execution_time,
            close_time: None,
            close_status: None,
            history_length: None,
            memo: request.memo.clone(),
            encoding: request.encoding.as_tag().to_string(),
        }
    }

    /// Builds the closed-execution document for a closed record.
    pub fn from_closed(request: &RecordWorkflowExecutionClosedRequest) -> Self {
        Self {
            domain_id: request.domain_id.clone(),
            workflow_id: request.workflow_id.clone(),
            run_id: request.run_id.clone(),
            workflow_type: request.workflow_type_name.clone(),
            start_time: request.start_time,
            execution_time: request.execution_time,
            close_time: Some(request.close_time),
            close_status: Some(request.status.code()),
            history_length: Some(request.history_length),
            memo: request.memo.clone(),
            encoding: request.encoding.as_tag().to_string(),
        }
    }
}
