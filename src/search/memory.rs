//! In-memory search index.
//!
//! Evaluates the structured query DSL over indexed documents. Serves as the
//! index for tests and single-process deployments; the production client
//! implements [`SearchClient`] against the real full-text cluster.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    BoolQuery, FieldSort, Query, SearchClient, SearchError, SearchHit, SearchHits,
    SearchParameters, SearchResult, VisibilityDocument,
};

const DEFAULT_PAGE_SIZE: usize = 10;

/// Thread-safe in-memory document index keyed by index name and document id.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    indices: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a visibility document; re-indexing the same id replaces it.
    pub fn index_document(
        &self,
        index: &str,
        document: &VisibilityDocument,
    ) -> Result<(), SearchError> {
        let source = serde_json::to_value(document).map_err(|e| SearchError(e.to_string()))?;
        self.index_raw(index, &document.document_id(), source);
        Ok(())
    }

    /// Indexes a raw document source under an explicit id.
    pub fn index_raw(&self, index: &str, id: &str, source: Value) {
        let mut indices = self.indices.write().unwrap_or_else(|e| e.into_inner());
        indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    pub fn document_count(&self, index: &str) -> usize {
        let indices = self.indices.read().unwrap_or_else(|e| e.into_inner());
        indices.get(index).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl SearchClient for InMemorySearchIndex {
    async fn search(&self, params: &SearchParameters) -> Result<SearchResult, SearchError> {
        let indices = self.indices.read().unwrap_or_else(|e| e.into_inner());
        let empty = BTreeMap::new();
        let documents = indices.get(&params.index).unwrap_or(&empty);

        let mut matched: Vec<(&String, &Value)> = documents
            .iter()
            .filter(|(_, source)| bool_matches(&params.query, source))
            .collect();
        let total_hits = matched.len() as i64;

        matched.sort_by(|(_, a), (_, b)| compare_by_sorter(a, b, &params.sorter));

        if !params.search_after.is_empty() {
            matched.retain(|(_, source)| {
                is_after_position(source, &params.sorter, &params.search_after)
            });
        }

        let page_size = if params.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            params.page_size
        };
        let hits = matched
            .into_iter()
            .skip(params.from)
            .take(page_size)
            .map(|(id, source)| SearchHit {
                id: id.clone(),
                source: source.clone(),
            })
            .collect();

        Ok(SearchResult {
            hits: SearchHits { total_hits, hits },
        })
    }
}

fn query_matches(query: &Query, source: &Value) -> bool {
    match query {
        Query::Match { field, value } => source.get(field) == Some(value),
        Query::Exists { field } => source.get(field).is_some_and(|v| !v.is_null()),
        Query::Range { field, gte, lte } => source
            .get(field)
            .and_then(Value::as_i64)
            .is_some_and(|v| v >= *gte && v <= *lte),
        Query::Bool(inner) => bool_matches(inner, source),
    }
}

fn bool_matches(query: &BoolQuery, source: &Value) -> bool {
    query.must.iter().all(|q| query_matches(q, source))
        && query.filter.iter().all(|q| query_matches(q, source))
        && !query.must_not.iter().any(|q| query_matches(q, source))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            if let (Some(m), Some(n)) = (x.as_i64(), y.as_i64()) {
                m.cmp(&n)
            } else if let (Some(m), Some(n)) = (x.as_str(), y.as_str()) {
                m.cmp(n)
            } else {
                Ordering::Equal
            }
        }
    }
}

fn compare_by_sorter(a: &Value, b: &Value, sorter: &[FieldSort]) -> Ordering {
    for sort in sorter {
        let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
        let ord = if sort.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// True when the document sorts strictly after the search-after key tuple.
fn is_after_position(source: &Value, sorter: &[FieldSort], after: &[Value]) -> bool {
    for (sort, key) in sorter.iter().zip(after.iter()) {
        let ord = compare_values(source.get(&sort.field), Some(key));
        let ord = if sort.ascending { ord } else { ord.reverse() };
        match ord {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => continue,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::search::{CLOSE_STATUS, CLOSE_TIME, DOMAIN_ID, RUN_ID, WORKFLOW_TYPE};

    fn closed_doc(run_id: &str, close_time: i64, status: i32) -> Value {
        json!({
            "DomainID": "d1",
            "WorkflowID": "wf",
            "RunID": run_id,
            "WorkflowType": "OrderWorkflow",
            "StartTime": close_time - 10,
            "ExecutionTime": close_time - 10,
            "CloseTime": close_time,
            "CloseStatus": status,
            "HistoryLength": 5,
            "Memo": [],
            "Encoding": "json",
        })
    }

    fn index_with_docs(n: i64) -> InMemorySearchIndex {
        let index = InMemorySearchIndex::new();
        for i in 1..=n {
            index.index_raw(
                "visibility",
                &format!("wf~run-{i:03}"),
                closed_doc(&format!("run-{i:03}"), i * 1_000, 0),
            );
        }
        index
    }

    fn closed_query() -> BoolQuery {
        BoolQuery::new()
            .must(Query::match_field(DOMAIN_ID, "d1"))
            .must(Query::exists(CLOSE_STATUS))
            .filter(Query::range(CLOSE_TIME, 0, i64::MAX))
    }

    fn closed_sorter() -> Vec<FieldSort> {
        vec![FieldSort::desc(CLOSE_TIME), FieldSort::desc(RUN_ID)]
    }

    #[tokio::test]
    async fn match_and_sort_descending() {
        let index = index_with_docs(5);
        let result = index
            .search(&SearchParameters {
                index: "visibility".into(),
                query: closed_query(),
                page_size: 10,
                sorter: closed_sorter(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.hits.total_hits, 5);
        let times: Vec<i64> = result
            .hits
            .hits
            .iter()
            .map(|h| h.source[CLOSE_TIME].as_i64().unwrap())
            .collect();
        assert_eq!(times, vec![5_000, 4_000, 3_000, 2_000, 1_000]);
    }

    #[tokio::test]
    async fn must_not_excludes_closed_documents() {
        let index = index_with_docs(3);
        index.index_raw(
            "visibility",
            "wf~open-1",
            json!({
                "DomainID": "d1",
                "WorkflowID": "wf",
                "RunID": "open-1",
                "WorkflowType": "OrderWorkflow",
                "StartTime": 50,
                "ExecutionTime": 50,
                "Memo": [],
                "Encoding": "json",
            }),
        );
        let query = BoolQuery::new()
            .must(Query::match_field(DOMAIN_ID, "d1"))
            .must_not(Query::exists(CLOSE_STATUS));
        let result = index
            .search(&SearchParameters {
                index: "visibility".into(),
                query,
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.hits.total_hits, 1);
        assert_eq!(result.hits.hits[0].source[RUN_ID], "open-1");
    }

    #[tokio::test]
    async fn offset_paging_skips_from() {
        let index = index_with_docs(5);
        let result = index
            .search(&SearchParameters {
                index: "visibility".into(),
                query: closed_query(),
                from: 2,
                page_size: 2,
                sorter: closed_sorter(),
                ..Default::default()
            })
            .await
            .unwrap();
        let times: Vec<i64> = result
            .hits
            .hits
            .iter()
            .map(|h| h.source[CLOSE_TIME].as_i64().unwrap())
            .collect();
        assert_eq!(times, vec![3_000, 2_000]);
        assert_eq!(result.hits.total_hits, 5);
    }

    #[tokio::test]
    async fn search_after_resumes_past_position() {
        let index = index_with_docs(5);
        let result = index
            .search(&SearchParameters {
                index: "visibility".into(),
                query: closed_query(),
                page_size: 10,
                sorter: closed_sorter(),
                search_after: vec![json!(4_000), json!("run-004")],
                ..Default::default()
            })
            .await
            .unwrap();
        let times: Vec<i64> = result
            .hits
            .hits
            .iter()
            .map(|h| h.source[CLOSE_TIME].as_i64().unwrap())
            .collect();
        assert_eq!(times, vec![3_000, 2_000, 1_000]);
    }

    #[tokio::test]
    async fn filter_by_type_and_status() {
        let index = index_with_docs(3);
        index.index_raw("visibility", "wf~failed-1", closed_doc("failed-1", 9_000, 2));
        let query = closed_query().must(Query::match_field(CLOSE_STATUS, 2));
        let result = index
            .search(&SearchParameters {
                index: "visibility".into(),
                query,
                page_size: 10,
                sorter: closed_sorter(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.hits.total_hits, 1);
        assert_eq!(result.hits.hits[0].source[WORKFLOW_TYPE], "OrderWorkflow");
        assert_eq!(result.hits.hits[0].source[RUN_ID], "failed-1");
    }
}
