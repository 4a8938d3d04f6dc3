//! Visibility manager façade and stack composition.
//!
//! The manager owns the composed wrapper stack and exposes the uniform
//! operation set to callers. Composition is explicit here, in construction
//! order: rate limit outermost, then sampling, then metrics closest to the
//! backend, then the backend itself; the composite router sits on top and
//! picks the read backend per domain.

use std::sync::Arc;

use crate::clock::TimeSource;
use crate::config::VisibilityConfig;
use crate::error::Result;
use crate::store::metrics::{MetricsVisibilityStore, VisibilityMetrics};
use crate::store::ratelimited::RateLimitedVisibilityStore;
use crate::store::router::CompositeVisibilityStore;
use crate::store::sampling::SamplingVisibilityStore;
use crate::store::VisibilityStore;
use crate::types::{
    DeleteWorkflowExecutionRequest, GetClosedWorkflowExecutionRequest,
    GetClosedWorkflowExecutionResponse, ListClosedWorkflowExecutionsByStatusRequest,
    ListWorkflowExecutionsByTypeRequest, ListWorkflowExecutionsByWorkflowIdRequest,
    ListWorkflowExecutionsRequest, ListWorkflowExecutionsResponse,
    RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest,
};

/// Unified entry point to the visibility subsystem.
pub struct VisibilityManager {
    store: Arc<dyn VisibilityStore>,
    db_metrics: Arc<VisibilityMetrics>,
    search_metrics: Option<Arc<VisibilityMetrics>>,
}

impl VisibilityManager {
    /// Composes the full wrapper stack over the given backends.
    pub fn from_stores(
        db: Arc<dyn VisibilityStore>,
        search: Option<Arc<dyn VisibilityStore>>,
        config: &VisibilityConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let db_metrics = VisibilityMetrics::new();
        let db = wrap_store(db, db_metrics.clone(), config, time_source.clone());

        let mut search_metrics = None;
        let search = search.map(|store| {
            let metrics = VisibilityMetrics::new();
            search_metrics = Some(metrics.clone());
            wrap_store(store, metrics, config, time_source.clone())
        });

        let router =
            CompositeVisibilityStore::new(db, search, config.enable_read_from_search.clone());
        Self {
            store: Arc::new(router),
            db_metrics,
            search_metrics,
        }
    }

    /// Wraps an already-composed store; used by tests and custom bootstraps.
    pub fn new(store: Arc<dyn VisibilityStore>) -> Self {
        Self {
            store,
            db_metrics: VisibilityMetrics::new(),
            search_metrics: None,
        }
    }

    pub fn db_metrics(&self) -> &Arc<VisibilityMetrics> {
        &self.db_metrics
    }

    pub fn search_metrics(&self) -> Option<&Arc<VisibilityMetrics>> {
        self.search_metrics.as_ref()
    }

    pub fn get_name(&self) -> String {
        self.store.get_name()
    }

    pub async fn record_started(
        &self,
        request: &RecordWorkflowExecutionStartedRequest,
    ) -> Result<()> {
        self.store.record_started(request).await
    }

    pub async fn record_closed(
        &self,
        request: &RecordWorkflowExecutionClosedRequest,
    ) -> Result<()> {
        self.store.record_closed(request).await
    }

    pub async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_open(request).await
    }

    pub async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_closed(request).await
    }

    pub async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_open_by_type(request).await
    }

    pub async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_closed_by_type(request).await
    }

    pub async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_open_by_workflow_id(request).await
    }

    pub async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_closed_by_workflow_id(request).await
    }

    pub async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.store.list_closed_by_status(request).await
    }

    pub async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        self.store.get_closed_execution(request).await
    }

    pub async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        self.store.delete_execution(request).await
    }

    /// Tears down all wrapped stores.
    pub fn close(&self) {
        self.store.close();
    }
}

fn wrap_store(
    store: Arc<dyn VisibilityStore>,
    metrics: Arc<VisibilityMetrics>,
    config: &VisibilityConfig,
    time_source: Arc<dyn TimeSource>,
) -> Arc<dyn VisibilityStore> {
    let store: Arc<dyn VisibilityStore> = Arc::new(MetricsVisibilityStore::new(store, metrics));
    let store: Arc<dyn VisibilityStore> = Arc::new(SamplingVisibilityStore::new(
        store,
        config.clone(),
        time_source.clone(),
    ));
    Arc::new(RateLimitedVisibilityStore::new(
        store,
        (config.persistence_max_qps)(),
        time_source,
    ))
}
