//! End-to-end scenarios through the fully composed visibility stack:
//! SQLite V2 backend plus search-index backend, wrapped with rate limiting,
//! sampling, and metrics, routed per domain by the composite store.

use std::collections::BTreeMap;
use std::sync::Arc;

use skein_visibility::config::{fixed_bool, fixed_int_for_all_domains};
use skein_visibility::search::memory::InMemorySearchIndex;
use skein_visibility::search::VisibilityDocument;
use skein_visibility::{
    CloseStatus, Database, EncodingType, ErrorKind, GetClosedWorkflowExecutionRequest,
    ListClosedWorkflowExecutionsByStatusRequest, ListWorkflowExecutionsRequest, ManualTimeSource,
    Memo, RecordWorkflowExecutionClosedRequest, RecordWorkflowExecutionStartedRequest, Serializer,
    SearchVisibilityStore, SqliteVisibilityStore, SqliteVisibilityStoreV2, VisibilityConfig,
    VisibilityManager, VisibilityStore,
};

const INDEX: &str = "skein-visibility";

/// Builds the full stack; domain "advanced" reads from the search index.
fn build_stack(config: VisibilityConfig) -> (VisibilityManager, Arc<InMemorySearchIndex>) {
    let mut config = config;
    config.enable_read_from_search = Arc::new(|domain: &str| domain == "advanced");

    let db = Database::open_in_memory().unwrap();
    let base = Arc::new(SqliteVisibilityStore::new(db.clone()));
    let v2: Arc<dyn VisibilityStore> = Arc::new(SqliteVisibilityStoreV2::new(base, db));

    let search_index = Arc::new(InMemorySearchIndex::new());
    let search_store: Arc<dyn VisibilityStore> = Arc::new(SearchVisibilityStore::new(
        search_index.clone(),
        INDEX,
        config.clone(),
    ));

    let manager = VisibilityManager::from_stores(
        v2,
        Some(search_store),
        &config,
        ManualTimeSource::new(1_000),
    );
    (manager, search_index)
}

fn started(domain: &str, run_id: &str, start_time: i64) -> RecordWorkflowExecutionStartedRequest {
    RecordWorkflowExecutionStartedRequest {
        domain_id: format!("{domain}-uuid"),
        domain: domain.to_string(),
        workflow_id: "wf-1".to_string(),
        run_id: run_id.to_string(),
        workflow_type_name: "OrderWorkflow".to_string(),
        start_time,
        execution_time: 0,
        workflow_timeout_seconds: 60,
        memo: Vec::new(),
        encoding: EncodingType::Json,
    }
}

fn closed(
    domain: &str,
    run_id: &str,
    start_time: i64,
    close_time: i64,
    status: CloseStatus,
) -> RecordWorkflowExecutionClosedRequest {
    RecordWorkflowExecutionClosedRequest {
        domain_id: format!("{domain}-uuid"),
        domain: domain.to_string(),
        workflow_id: "wf-1".to_string(),
        run_id: run_id.to_string(),
        workflow_type_name: "OrderWorkflow".to_string(),
        start_time,
        execution_time: 0,
        close_time,
        status,
        history_length: 7,
        retention_seconds: 0,
        memo: Vec::new(),
        encoding: EncodingType::Json,
    }
}

fn list(domain: &str, earliest: i64, latest: i64, page_size: usize) -> ListWorkflowExecutionsRequest {
    ListWorkflowExecutionsRequest {
        domain_id: format!("{domain}-uuid"),
        domain: domain.to_string(),
        earliest_time: earliest,
        latest_time: latest,
        page_size,
        next_page_token: Vec::new(),
    }
}

#[tokio::test]
async fn open_then_close_reads_back_from_the_columnar_backend() {
    let (manager, _) = build_stack(VisibilityConfig::new());

    manager
        .record_started(&started("plain", "run-1", 1_000_000))
        .await
        .unwrap();
    manager
        .record_closed(&closed("plain", "run-1", 1_000_000, 2_000_000, CloseStatus::Completed))
        .await
        .unwrap();

    let page = manager
        .list_closed(&list("plain", 0, 3_000_000, 10))
        .await
        .unwrap();
    assert_eq!(page.executions.len(), 1);
    let info = &page.executions[0];
    assert_eq!(info.start_time, 1_000_000);
    assert_eq!(info.close_time, Some(2_000_000));
    assert_eq!(info.close_status, Some(CloseStatus::Completed));
    assert_eq!(info.history_length, Some(7));

    let open = manager.list_open(&list("plain", 0, 3_000_000, 10)).await.unwrap();
    assert!(open.executions.is_empty());
}

#[tokio::test]
async fn pagination_is_stable_through_the_stack() {
    let (manager, _) = build_stack(VisibilityConfig::new());
    for i in 1..=25 {
        manager
            .record_closed(&closed(
                "plain",
                &format!("run-{i:03}"),
                500,
                i * 1_000,
                CloseStatus::Completed,
            ))
            .await
            .unwrap();
    }

    let mut request = list("plain", 0, 26_000, 10);
    let mut seen = Vec::new();
    let page1 = manager.list_closed(&request).await.unwrap();
    assert_eq!(page1.executions.len(), 10);
    assert!(!page1.next_page_token.is_empty());
    seen.extend(page1.executions.iter().filter_map(|e| e.close_time));

    request.next_page_token = page1.next_page_token;
    let page2 = manager.list_closed(&request).await.unwrap();
    assert_eq!(page2.executions.len(), 10);
    assert!(!page2.next_page_token.is_empty());
    seen.extend(page2.executions.iter().filter_map(|e| e.close_time));

    request.next_page_token = page2.next_page_token;
    let page3 = manager.list_closed(&request).await.unwrap();
    assert_eq!(page3.executions.len(), 5);
    assert!(page3.next_page_token.is_empty());
    seen.extend(page3.executions.iter().filter_map(|e| e.close_time));

    let expected: Vec<i64> = (1..=25).rev().map(|i| i * 1_000).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn advanced_filter_routes_to_the_search_backend() {
    let (manager, search_index) = build_stack(VisibilityConfig::new());

    // Documents reach the index through the asynchronous processor.
    for (run, close_time, status) in [
        ("run-a", 1_000, CloseStatus::Failed),
        ("run-b", 2_000, CloseStatus::Completed),
        ("run-c", 3_000, CloseStatus::Failed),
    ] {
        let request = closed("advanced", run, 500, close_time, status);
        search_index
            .index_document(INDEX, &VisibilityDocument::from_closed(&request))
            .unwrap();
    }

    let page = manager
        .list_closed_by_status(&ListClosedWorkflowExecutionsByStatusRequest {
            request: list("advanced", 0, 10_000, 10),
            status: CloseStatus::Failed,
        })
        .await
        .unwrap();
    let runs: Vec<&str> = page.executions.iter().map(|e| e.run_id.as_str()).collect();
    assert_eq!(runs, vec!["run-c", "run-a"]);
    assert!(page
        .executions
        .iter()
        .all(|e| e.close_status == Some(CloseStatus::Failed)));
}

#[tokio::test]
async fn default_domains_keep_reading_from_the_columnar_backend() {
    let (manager, search_index) = build_stack(VisibilityConfig::new());

    manager
        .record_closed(&closed("plain", "run-db", 500, 1_000, CloseStatus::Failed))
        .await
        .unwrap();
    // A stray document for the same domain in the index must not be served.
    let foreign = closed("plain", "run-es", 500, 2_000, CloseStatus::Failed);
    search_index
        .index_document(INDEX, &VisibilityDocument::from_closed(&foreign))
        .unwrap();

    let page = manager
        .list_closed_by_status(&ListClosedWorkflowExecutionsByStatusRequest {
            request: list("plain", 0, 10_000, 10),
            status: CloseStatus::Failed,
        })
        .await
        .unwrap();
    let runs: Vec<&str> = page.executions.iter().map(|e| e.run_id.as_str()).collect();
    assert_eq!(runs, vec!["run-db"]);
}

#[tokio::test]
async fn memo_round_trips_through_the_columnar_backend() {
    let (manager, _) = build_stack(VisibilityConfig::new());
    let serializer = Serializer::new();
    let memo = Memo::new(BTreeMap::from([("k".to_string(), b"v".to_vec())]));
    let blob = serializer
        .serialize_memo(Some(&memo), EncodingType::ThriftRw)
        .unwrap()
        .unwrap();

    let mut request = closed("plain", "run-1", 500, 1_000, CloseStatus::Completed);
    request.memo = blob.data;
    request.encoding = blob.encoding;
    manager.record_closed(&request).await.unwrap();

    let result = manager
        .get_closed_execution(&GetClosedWorkflowExecutionRequest {
            domain_id: "plain-uuid".to_string(),
            domain: "plain".to_string(),
            workflow_id: "wf-1".to_string(),
            run_id: "run-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(result.execution.unwrap().memo, Some(memo));
}

#[tokio::test]
async fn sampled_out_writes_disappear_silently() {
    let mut config = VisibilityConfig::new();
    config.visibility_open_max_qps = fixed_int_for_all_domains(0);
    let (manager, _) = build_stack(config);

    manager
        .record_started(&started("plain", "run-1", 1_000))
        .await
        .unwrap();
    let open = manager.list_open(&list("plain", 0, 10_000, 10)).await.unwrap();
    assert!(open.executions.is_empty());
}

#[tokio::test]
async fn sampling_disabled_lets_writes_through() {
    let mut config = VisibilityConfig::new();
    config.enable_sampling = fixed_bool(false);
    config.visibility_open_max_qps = fixed_int_for_all_domains(0);
    let (manager, _) = build_stack(config);

    manager
        .record_started(&started("plain", "run-1", 1_000))
        .await
        .unwrap();
    let open = manager.list_open(&list("plain", 0, 10_000, 10)).await.unwrap();
    assert_eq!(open.executions.len(), 1);
}

#[tokio::test]
async fn malformed_page_token_is_rejected_up_front() {
    let (manager, _) = build_stack(VisibilityConfig::new());
    let mut request = list("plain", 0, 10_000, 10);
    request.next_page_token = b"garbage".to_vec();
    let err = manager.list_closed(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let mut request = list("advanced", 0, 10_000, 10);
    request.next_page_token = b"garbage".to_vec();
    let err = manager.list_closed(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn search_backend_pages_with_tokens_through_the_stack() {
    let (manager, search_index) = build_stack(VisibilityConfig::new());
    for i in 1..=5 {
        let request = closed(
            "advanced",
            &format!("run-{i:03}"),
            500,
            i * 1_000,
            CloseStatus::Completed,
        );
        search_index
            .index_document(INDEX, &VisibilityDocument::from_closed(&request))
            .unwrap();
    }

    let mut request = list("advanced", 0, 10_000, 2);
    let page1 = manager.list_closed(&request).await.unwrap();
    let times: Vec<i64> = page1.executions.iter().filter_map(|e| e.close_time).collect();
    assert_eq!(times, vec![5_000, 4_000]);
    assert!(!page1.next_page_token.is_empty());

    request.next_page_token = page1.next_page_token;
    let page2 = manager.list_closed(&request).await.unwrap();
    let times: Vec<i64> = page2.executions.iter().filter_map(|e| e.close_time).collect();
    assert_eq!(times, vec![3_000, 2_000]);
}
