//! Eventually-consistent visibility index for the Skein workflow platform.
//!
//! Visibility observes two lifecycle events written by the executions engine,
//! *started* and *closed*, and serves paginated listing and point-lookup
//! queries over them. Two backends are provided: a SQLite-backed columnar
//! store whose V2 table scans closed executions by close time, and a
//! search-index store over a pluggable [`search::SearchClient`] for advanced
//! filtering. Around the backends sits a wrapper stack (rate limiting,
//! per-domain sampling, metrics) and a composite router that picks the read
//! backend per domain; [`VisibilityManager`] ties the stack together.
//!
//! Visibility is a best-effort secondary index: there is no cross-backend
//! transaction, and dual writes may leave one backend behind the other.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod search;
pub mod serializer;
pub mod store;
pub mod token;
pub mod tokenbucket;
pub mod types;

pub use clock::{ManualTimeSource, RealTimeSource, TimeSource};
pub use config::VisibilityConfig;
pub use error::{ErrorKind, Result, VisibilityError};
pub use serializer::Serializer;
pub use store::manager::VisibilityManager;
pub use store::metrics::{MetricsVisibilityStore, VisibilityMetrics};
pub use store::ratelimited::RateLimitedVisibilityStore;
pub use store::router::CompositeVisibilityStore;
pub use store::sampling::SamplingVisibilityStore;
pub use store::search::SearchVisibilityStore;
pub use store::sqlite::{Database, SqliteVisibilityStore, SqliteVisibilityStoreV2};
pub use store::{VisibilityOperation, VisibilityStore};
pub use types::{
    CloseStatus, DataBlob, DeleteWorkflowExecutionRequest, EncodingType,
    GetClosedWorkflowExecutionRequest, GetClosedWorkflowExecutionResponse, History, HistoryEvent,
    ListClosedWorkflowExecutionsByStatusRequest, ListWorkflowExecutionsByTypeRequest,
    ListWorkflowExecutionsByWorkflowIdRequest, ListWorkflowExecutionsRequest,
    ListWorkflowExecutionsResponse, Memo, RecordWorkflowExecutionClosedRequest,
    RecordWorkflowExecutionStartedRequest, WorkflowExecutionInfo,
};
