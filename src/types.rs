//! Domain models for workflow visibility.
//!
//! Visibility is a secondary, eventually-consistent index over workflow
//! executions. Records are keyed by `(domain_id, workflow_id, run_id)`; a
//! record is open until a close event arrives, and close is monotonic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tenant namespace identifier.
pub type DomainId = String;

/// Identifies a single run of a workflow within a domain.
pub type RunId = String;

/// Close status of a finished workflow execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseStatus {
    Completed,
    Failed,
    Canceled,
    Terminated,
    ContinuedAsNew,
    TimedOut,
}

impl CloseStatus {
    /// Numeric code persisted by both backends.
    pub fn code(self) -> i32 {
        match self {
            CloseStatus::Completed => 0,
            CloseStatus::Failed => 1,
            CloseStatus::Canceled => 2,
            CloseStatus::Terminated => 3,
            CloseStatus::ContinuedAsNew => 4,
            CloseStatus::TimedOut => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CloseStatus::Completed),
            1 => Some(CloseStatus::Failed),
            2 => Some(CloseStatus::Canceled),
            3 => Some(CloseStatus::Terminated),
            4 => Some(CloseStatus::ContinuedAsNew),
            5 => Some(CloseStatus::TimedOut),
            _ => None,
        }
    }
}

/// Wire encoding of an embedded payload blob.
///
/// `Json` and `ThriftRw` are the recognized encodings. `Empty` and `Unknown`
/// are legacy tags accepted on read and decoded as JSON. `Gob` and foreign
/// tags are rejected in both directions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingType {
    Json,
    ThriftRw,
    Gob,
    Empty,
    Unknown,
    Other(String),
}

impl EncodingType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "json" => EncodingType::Json,
            "thriftrw" => EncodingType::ThriftRw,
            "gob" => EncodingType::Gob,
            "" => EncodingType::Empty,
            "unknown" => EncodingType::Unknown,
            other => EncodingType::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            EncodingType::Json => "json",
            EncodingType::ThriftRw => "thriftrw",
            EncodingType::Gob => "gob",
            EncodingType::Empty => "",
            EncodingType::Unknown => "unknown",
            EncodingType::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for EncodingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A payload blob together with its encoding tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataBlob {
    pub data: Vec<u8>,
    pub encoding: EncodingType,
}

impl DataBlob {
    pub fn new(data: Vec<u8>, encoding: EncodingType) -> Self {
        Self { data, encoding }
    }
}

/// User-supplied metadata attached to an execution, opaque to the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub fields: BTreeMap<String, Vec<u8>>,
}

impl Memo {
    pub fn new(fields: BTreeMap<String, Vec<u8>>) -> Self {
        Self { fields }
    }
}

/// Kind of a history event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    DecisionTaskScheduled,
    ActivityTaskScheduled,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    TimerStarted,
    TimerFired,
}

/// A single event in a workflow execution history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    /// Nanoseconds since epoch.
    pub timestamp: i64,
    pub event_type: EventType,
    /// Per-event attributes, keyed by attribute name.
    pub details: BTreeMap<String, Vec<u8>>,
}

/// Envelope for a batch of history events on the binary wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub events: Vec<HistoryEvent>,
}

/// Public read shape of a visibility record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionInfo {
    pub workflow_id: String,
    pub run_id: RunId,
    pub workflow_type_name: String,
    /// Nanoseconds since epoch.
    pub start_time: i64,
    /// First-scheduled time; equals `start_time` when the backend stored zero.
    pub execution_time: i64,
    pub close_time: Option<i64>,
    pub close_status: Option<CloseStatus>,
    pub history_length: Option<i64>,
    pub memo: Option<Memo>,
}

/// Adds a record of a newly started execution.
#[derive(Clone, Debug)]
pub struct RecordWorkflowExecutionStartedRequest {
    pub domain_id: DomainId,
    /// Domain name; not persisted, used as the config filter key.
    pub domain: String,
    pub workflow_id: String,
    pub run_id: RunId,
    pub workflow_type_name: String,
    pub start_time: i64,
    pub execution_time: i64,
    pub workflow_timeout_seconds: i64,
    pub memo: Vec<u8>,
    pub encoding: EncodingType,
}

/// Adds a record of a newly closed execution.
#[derive(Clone, Debug)]
pub struct RecordWorkflowExecutionClosedRequest {
    pub domain_id: DomainId,
    /// Domain name; not persisted, used as the config filter key.
    pub domain: String,
    pub workflow_id: String,
    pub run_id: RunId,
    pub workflow_type_name: String,
    pub start_time: i64,
    pub execution_time: i64,
    pub close_time: i64,
    pub status: CloseStatus,
    pub history_length: i64,
    /// Advisory row lifetime; backends enforce via TTL.
    pub retention_seconds: i64,
    pub memo: Vec<u8>,
    pub encoding: EncodingType,
}

/// Lists executions in a domain over a time range.
#[derive(Clone, Debug, Default)]
pub struct ListWorkflowExecutionsRequest {
    pub domain_id: DomainId,
    /// Domain name; not persisted, used as the config filter key.
    pub domain: String,
    /// Inclusive lower bound on the sort time, nanoseconds.
    pub earliest_time: i64,
    /// Inclusive upper bound on the sort time, nanoseconds.
    pub latest_time: i64,
    /// Maximum number of executions per page.
    pub page_size: usize,
    /// Opaque cursor from a previous page; empty for the first page.
    pub next_page_token: Vec<u8>,
}

/// Lists executions of a specific workflow type.
#[derive(Clone, Debug, Default)]
pub struct ListWorkflowExecutionsByTypeRequest {
    pub request: ListWorkflowExecutionsRequest,
    pub workflow_type_name: String,
}

/// Lists executions with a specific workflow id.
#[derive(Clone, Debug, Default)]
pub struct ListWorkflowExecutionsByWorkflowIdRequest {
    pub request: ListWorkflowExecutionsRequest,
    pub workflow_id: String,
}

/// Lists closed executions with a specific close status.
#[derive(Clone, Debug)]
pub struct ListClosedWorkflowExecutionsByStatusRequest {
    pub request: ListWorkflowExecutionsRequest,
    pub status: CloseStatus,
}

/// One page of a listing.
#[derive(Clone, Debug, Default)]
pub struct ListWorkflowExecutionsResponse {
    pub executions: Vec<WorkflowExecutionInfo>,
    /// Cursor for the next page; empty when the listing is exhausted.
    pub next_page_token: Vec<u8>,
}

/// Retrieves the closed record of a specific execution.
#[derive(Clone, Debug, Default)]
pub struct GetClosedWorkflowExecutionRequest {
    pub domain_id: DomainId,
    /// Domain name; not persisted, used as the config filter key.
    pub domain: String,
    pub workflow_id: String,
    /// Empty means any run of the workflow id.
    pub run_id: RunId,
}

/// Response to [`GetClosedWorkflowExecutionRequest`]; empty when no record matches.
#[derive(Clone, Debug, Default)]
pub struct GetClosedWorkflowExecutionResponse {
    pub execution: Option<WorkflowExecutionInfo>,
}

/// Deletes a visibility record. Backends relying on TTL treat this as a no-op.
#[derive(Clone, Debug, Default)]
pub struct DeleteWorkflowExecutionRequest {
    pub domain_id: DomainId,
    pub run_id: RunId,
}
