//! SQLite-backed visibility store.
//!
//! The base store owns the write path and the start-time-keyed listings.
//! [`SqliteVisibilityStoreV2`] layers the close-time-partitioned
//! `closed_executions_v2` table over a wrapped store so that closed-execution
//! listings scan in `close_time DESC` order within a domain partition.
//!
//! Rows carry an `expires_at` column derived from the record's retention;
//! expired rows are filtered on read in lieu of storage-side TTL. Explicit
//! deletes are no-ops.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{Connection, ErrorCode};
use tracing::warn;

use crate::error::{Result, VisibilityError};
use crate::serializer::Serializer;
use crate::store::{VisibilityOperation, VisibilityStore};
use crate::token::KeysetPageState;
use crate::types::{
    CloseStatus, DataBlob, DeleteWorkflowExecutionRequest, EncodingType,
    GetClosedWorkflowExecutionRequest, GetClosedWorkflowExecutionResponse,
    ListClosedWorkflowExecutionsByStatusRequest, ListWorkflowExecutionsByTypeRequest,
    ListWorkflowExecutionsByWorkflowIdRequest, ListWorkflowExecutionsRequest,
    ListWorkflowExecutionsResponse, Memo, RecordWorkflowExecutionClosedRequest,
    RecordWorkflowExecutionStartedRequest, WorkflowExecutionInfo,
};

/// Single-value partition clause; kept as an `IN` clause so the plain closed
/// listing can expand to multiple partitions without a schema change.
const DOMAIN_PARTITION: i64 = 0;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS open_executions (
    domain_id          TEXT    NOT NULL,
    domain_partition   INTEGER NOT NULL,
    workflow_id        TEXT    NOT NULL,
    run_id             TEXT    NOT NULL,
    workflow_type_name TEXT    NOT NULL,
    start_time         INTEGER NOT NULL,
    execution_time     INTEGER NOT NULL,
    memo               BLOB,
    encoding           TEXT    NOT NULL,
    PRIMARY KEY (domain_id, domain_partition, run_id)
);
CREATE INDEX IF NOT EXISTS open_executions_by_start_time
    ON open_executions (domain_id, domain_partition, start_time DESC, run_id DESC);

CREATE TABLE IF NOT EXISTS closed_executions (
    domain_id          TEXT    NOT NULL,
    domain_partition   INTEGER NOT NULL,
    workflow_id        TEXT    NOT NULL,
    run_id             TEXT    NOT NULL,
    workflow_type_name TEXT    NOT NULL,
    start_time         INTEGER NOT NULL,
    execution_time     INTEGER NOT NULL,
    close_time         INTEGER NOT NULL,
    status             INTEGER NOT NULL,
    history_length     INTEGER NOT NULL,
    memo               BLOB,
    encoding           TEXT    NOT NULL,
    expires_at         INTEGER,
    PRIMARY KEY (domain_id, domain_partition, run_id)
);
CREATE INDEX IF NOT EXISTS closed_executions_by_start_time
    ON closed_executions (domain_id, domain_partition, start_time DESC, run_id DESC);

CREATE TABLE IF NOT EXISTS closed_executions_v2 (
    domain_id          TEXT    NOT NULL,
    domain_partition   INTEGER NOT NULL,
    workflow_id        TEXT    NOT NULL,
    run_id             TEXT    NOT NULL,
    workflow_type_name TEXT    NOT NULL,
    start_time         INTEGER NOT NULL,
    execution_time     INTEGER NOT NULL,
    close_time         INTEGER NOT NULL,
    status             INTEGER NOT NULL,
    history_length     INTEGER NOT NULL,
    memo               BLOB,
    encoding           TEXT    NOT NULL,
    expires_at         INTEGER,
    PRIMARY KEY (domain_id, domain_partition, run_id)
);
CREATE INDEX IF NOT EXISTS closed_executions_v2_by_close_time
    ON closed_executions_v2 (domain_id, domain_partition, close_time DESC, run_id DESC);
CREATE INDEX IF NOT EXISTS closed_executions_v2_by_type
    ON closed_executions_v2 (domain_id, domain_partition, workflow_type_name, close_time DESC);
CREATE INDEX IF NOT EXISTS closed_executions_v2_by_workflow_id
    ON closed_executions_v2 (domain_id, domain_partition, workflow_id, close_time DESC);
CREATE INDEX IF NOT EXISTS closed_executions_v2_by_status
    ON closed_executions_v2 (domain_id, domain_partition, status, close_time DESC);
";

/// Shared handle to the visibility database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let conn = Connection::open(path)
            .map_err(|e| VisibilityError::Internal(format!("open visibility db: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| VisibilityError::Internal(format!("set journal_mode: {e}")))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| VisibilityError::Internal(format!("set synchronous: {e}")))?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VisibilityError::Internal(format!("open visibility db: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Arc<Self>> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| VisibilityError::Internal(format!("ensure visibility schema: {e}")))?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
        }))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }

    fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut conn)
    }
}

/// BUSY/LOCKED from the driver means contention, not a broken request.
fn is_throttling_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(cause, _)
            if matches!(cause.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn map_store_err(op: VisibilityOperation, err: rusqlite::Error) -> VisibilityError {
    let message = format!("{} operation failed: {err}", op.as_str());
    if is_throttling_error(&err) {
        VisibilityError::ServiceBusy(message)
    } else {
        VisibilityError::Internal(message)
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_millis().saturating_mul(1_000_000)
}

struct OpenRow {
    workflow_id: String,
    run_id: String,
    start_time: i64,
    execution_time: i64,
    workflow_type_name: String,
    memo: Option<Vec<u8>>,
    encoding: String,
}

struct ClosedRow {
    workflow_id: String,
    run_id: String,
    start_time: i64,
    execution_time: i64,
    close_time: i64,
    workflow_type_name: String,
    status: i32,
    history_length: i64,
    memo: Option<Vec<u8>>,
    encoding: String,
}

fn decode_memo(serializer: &Serializer, run_id: &str, memo: Option<Vec<u8>>, encoding: &str) -> Option<Memo> {
    let data = memo.filter(|data| !data.is_empty())?;
    let blob = DataBlob::new(data, EncodingType::from_tag(encoding));
    match serializer.deserialize_memo(Some(&blob)) {
        Ok(memo) => memo,
        Err(err) => {
            warn!(run_id, error = %err, "unable to decode memo field");
            None
        }
    }
}

fn open_row_to_info(serializer: &Serializer, row: OpenRow) -> WorkflowExecutionInfo {
    let memo = decode_memo(serializer, &row.run_id, row.memo, &row.encoding);
    let execution_time = if row.execution_time == 0 {
        row.start_time
    } else {
        row.execution_time
    };
    WorkflowExecutionInfo {
        workflow_id: row.workflow_id,
        run_id: row.run_id,
        workflow_type_name: row.workflow_type_name,
        start_time: row.start_time,
        execution_time,
        close_time: None,
        close_status: None,
        history_length: None,
        memo,
    }
}

fn closed_row_to_info(serializer: &Serializer, row: ClosedRow) -> WorkflowExecutionInfo {
    let memo = decode_memo(serializer, &row.run_id, row.memo, &row.encoding);
    let execution_time = if row.execution_time == 0 {
        row.start_time
    } else {
        row.execution_time
    };
    let close_status = CloseStatus::from_code(row.status);
    if close_status.is_none() {
        warn!(run_id = %row.run_id, status = row.status, "unknown close status code");
    }
    WorkflowExecutionInfo {
        workflow_id: row.workflow_id,
        run_id: row.run_id,
        workflow_type_name: row.workflow_type_name,
        start_time: row.start_time,
        execution_time,
        close_time: Some(row.close_time),
        close_status,
        history_length: Some(row.history_length),
        memo,
    }
}

/// Runs one closed-execution listing against `table`, keyed by `close_time`
/// when `sort_column` says so, with keyset pagination.
fn query_closed_table(
    db: &Database,
    serializer: &Serializer,
    op: VisibilityOperation,
    table: &str,
    sort_column: &str,
    partition_clause: &str,
    request: &ListWorkflowExecutionsRequest,
    extra_predicate: Option<(&str, Box<dyn ToSql>)>,
) -> Result<ListWorkflowExecutionsResponse> {
    let page_state = KeysetPageState::decode(&request.next_page_token)?;

    let mut sql = format!(
        "SELECT workflow_id, run_id, start_time, execution_time, close_time, \
                workflow_type_name, status, history_length, memo, encoding \
         FROM {table} \
         WHERE domain_id = ? AND {partition_clause} \
           AND {sort_column} >= ? AND {sort_column} <= ? \
           AND (expires_at IS NULL OR expires_at > ?)"
    );
    let mut values: Vec<Box<dyn ToSql>> = vec![
        Box::new(request.domain_id.clone()),
        Box::new(DOMAIN_PARTITION),
        Box::new(request.earliest_time),
        Box::new(request.latest_time),
        Box::new(now_nanos()),
    ];
    if let Some((clause, value)) = extra_predicate {
        sql.push_str(" AND ");
        sql.push_str(clause);
        values.push(value);
    }
    if let Some(state) = &page_state {
        sql.push_str(&format!(
            " AND ({sort_column} < ? OR ({sort_column} = ? AND run_id < ?))"
        ));
        values.push(Box::new(state.sort_time));
        values.push(Box::new(state.sort_time));
        values.push(Box::new(state.run_id.clone()));
    }
    sql.push_str(&format!(" ORDER BY {sort_column} DESC, run_id DESC LIMIT ?"));
    values.push(Box::new(request.page_size as i64));

    let rows = db
        .with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(
                rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                |row| {
                    Ok(ClosedRow {
                        workflow_id: row.get(0)?,
                        run_id: row.get(1)?,
                        start_time: row.get(2)?,
                        execution_time: row.get(3)?,
                        close_time: row.get(4)?,
                        workflow_type_name: row.get(5)?,
                        status: row.get(6)?,
                        history_length: row.get(7)?,
                        memo: row.get(8)?,
                        encoding: row.get(9)?,
                    })
                },
            )?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| map_store_err(op, e))?;

    let next_page_token = next_keyset_token(&rows, request.page_size, |row| {
        let sort_time = if sort_column == "close_time" {
            row.close_time
        } else {
            row.start_time
        };
        (sort_time, row.run_id.clone())
    })?;
    let executions = rows
        .into_iter()
        .map(|row| closed_row_to_info(serializer, row))
        .collect();
    Ok(ListWorkflowExecutionsResponse {
        executions,
        next_page_token,
    })
}

fn next_keyset_token<R>(
    rows: &[R],
    page_size: usize,
    key_of: impl Fn(&R) -> (i64, String),
) -> Result<Vec<u8>> {
    if page_size == 0 || rows.len() < page_size {
        return Ok(Vec::new());
    }
    let (sort_time, run_id) = match rows.last() {
        Some(last) => key_of(last),
        None => return Ok(Vec::new()),
    };
    KeysetPageState { sort_time, run_id }.encode()
}

/// Base SQLite visibility store: writes, open listings, start-time-keyed
/// closed listings, and the closed-execution point lookup.
pub struct SqliteVisibilityStore {
    db: Arc<Database>,
    serializer: Serializer,
}

impl SqliteVisibilityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            serializer: Serializer::new(),
        }
    }

    fn query_open(
        &self,
        op: VisibilityOperation,
        request: &ListWorkflowExecutionsRequest,
        extra_predicate: Option<(&str, Box<dyn ToSql>)>,
    ) -> Result<ListWorkflowExecutionsResponse> {
        let page_state = KeysetPageState::decode(&request.next_page_token)?;

        let mut sql = String::from(
            "SELECT workflow_id, run_id, start_time, execution_time, \
                    workflow_type_name, memo, encoding \
             FROM open_executions \
             WHERE domain_id = ? AND domain_partition = ? \
               AND start_time >= ? AND start_time <= ?",
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![
            Box::new(request.domain_id.clone()),
            Box::new(DOMAIN_PARTITION),
            Box::new(request.earliest_time),
            Box::new(request.latest_time),
        ];
        if let Some((clause, value)) = extra_predicate {
            sql.push_str(" AND ");
            sql.push_str(clause);
            values.push(value);
        }
        if let Some(state) = &page_state {
            sql.push_str(" AND (start_time < ? OR (start_time = ? AND run_id < ?))");
            values.push(Box::new(state.sort_time));
            values.push(Box::new(state.sort_time));
            values.push(Box::new(state.run_id.clone()));
        }
        sql.push_str(" ORDER BY start_time DESC, run_id DESC LIMIT ?");
        values.push(Box::new(request.page_size as i64));

        let rows = self
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mapped = stmt.query_map(
                    rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                    |row| {
                        Ok(OpenRow {
                            workflow_id: row.get(0)?,
                            run_id: row.get(1)?,
                            start_time: row.get(2)?,
                            execution_time: row.get(3)?,
                            workflow_type_name: row.get(4)?,
                            memo: row.get(5)?,
                            encoding: row.get(6)?,
                        })
                    },
                )?;
                mapped.collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| map_store_err(op, e))?;

        let next_page_token = next_keyset_token(&rows, request.page_size, |row| {
            (row.start_time, row.run_id.clone())
        })?;
        let executions = rows
            .into_iter()
            .map(|row| open_row_to_info(&self.serializer, row))
            .collect();
        Ok(ListWorkflowExecutionsResponse {
            executions,
            next_page_token,
        })
    }
}

#[async_trait]
impl VisibilityStore for SqliteVisibilityStore {
    fn get_name(&self) -> String {
        "sqlite".to_string()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO open_executions \
                        (domain_id, domain_partition, workflow_id, run_id, workflow_type_name, \
                         start_time, execution_time, memo, encoding) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                     ON CONFLICT (domain_id, domain_partition, run_id) DO UPDATE SET \
                        workflow_id = excluded.workflow_id, \
                        workflow_type_name = excluded.workflow_type_name, \
                        start_time = excluded.start_time, \
                        execution_time = excluded.execution_time, \
                        memo = excluded.memo, \
                        encoding = excluded.encoding",
                    rusqlite::params![
                        request.domain_id,
                        DOMAIN_PARTITION,
                        request.workflow_id,
                        request.run_id,
                        request.workflow_type_name,
                        request.start_time,
                        request.execution_time,
                        request.memo,
                        request.encoding.as_tag(),
                    ],
                )
            })
            .map_err(|e| map_store_err(VisibilityOperation::RecordStarted, e))?;
        Ok(())
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        let expires_at = if request.retention_seconds > 0 {
            Some(
                request
                    .close_time
                    .saturating_add(request.retention_seconds.saturating_mul(1_000_000_000)),
            )
        } else {
            None
        };
        self.db
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM open_executions \
                     WHERE domain_id = ?1 AND domain_partition = ?2 AND run_id = ?3",
                    rusqlite::params![request.domain_id, DOMAIN_PARTITION, request.run_id],
                )?;
                for table in ["closed_executions", "closed_executions_v2"] {
                    tx.execute(
                        &format!(
                            "INSERT INTO {table} \
                                (domain_id, domain_partition, workflow_id, run_id, \
                                 workflow_type_name, start_time, execution_time, close_time, \
                                 status, history_length, memo, encoding, expires_at) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                             ON CONFLICT (domain_id, domain_partition, run_id) DO UPDATE SET \
                                workflow_id = excluded.workflow_id, \
                                workflow_type_name = excluded.workflow_type_name, \
                                start_time = excluded.start_time, \
                                execution_time = excluded.execution_time, \
                                close_time = excluded.close_time, \
                                status = excluded.status, \
                                history_length = excluded.history_length, \
                                memo = excluded.memo, \
                                encoding = excluded.encoding, \
                                expires_at = excluded.expires_at"
                        ),
                        rusqlite::params![
                            request.domain_id,
                            DOMAIN_PARTITION,
                            request.workflow_id,
                            request.run_id,
                            request.workflow_type_name,
                            request.start_time,
                            request.execution_time,
                            request.close_time,
                            request.status.code(),
                            request.history_length,
                            request.memo,
                            request.encoding.as_tag(),
                            expires_at,
                        ],
                    )?;
                }
                tx.commit()
            })
            .map_err(|e| map_store_err(VisibilityOperation::RecordClosed, e))?;
        Ok(())
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.query_open(VisibilityOperation::ListOpen, request, None)
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosed,
            "closed_executions",
            "start_time",
            "domain_partition = ?",
            request,
            None,
        )
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.query_open(
            VisibilityOperation::ListOpenByType,
            &request.request,
            Some((
                "workflow_type_name = ?",
                Box::new(request.workflow_type_name.clone()),
            )),
        )
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByType,
            "closed_executions",
            "start_time",
            "domain_partition = ?",
            &request.request,
            Some((
                "workflow_type_name = ?",
                Box::new(request.workflow_type_name.clone()),
            )),
        )
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.query_open(
            VisibilityOperation::ListOpenByWorkflowId,
            &request.request,
            Some(("workflow_id = ?", Box::new(request.workflow_id.clone()))),
        )
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByWorkflowId,
            "closed_executions",
            "start_time",
            "domain_partition = ?",
            &request.request,
            Some(("workflow_id = ?", Box::new(request.workflow_id.clone()))),
        )
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByStatus,
            "closed_executions",
            "start_time",
            "domain_partition = ?",
            &request.request,
            Some(("status = ?", Box::new(request.status.code()))),
        )
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        let mut sql = String::from(
            "SELECT workflow_id, run_id, start_time, execution_time, close_time, \
                    workflow_type_name, status, history_length, memo, encoding \
             FROM closed_executions \
             WHERE domain_id = ? AND domain_partition = ? AND workflow_id = ? \
               AND (expires_at IS NULL OR expires_at > ?)",
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![
            Box::new(request.domain_id.clone()),
            Box::new(DOMAIN_PARTITION),
            Box::new(request.workflow_id.clone()),
            Box::new(now_nanos()),
        ];
        if !request.run_id.is_empty() {
            sql.push_str(" AND run_id = ?");
            values.push(Box::new(request.run_id.clone()));
        }
        sql.push_str(" ORDER BY close_time DESC, run_id DESC LIMIT 1");

        let row = self
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query_map(
                    rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
                    |row| {
                        Ok(ClosedRow {
                            workflow_id: row.get(0)?,
                            run_id: row.get(1)?,
                            start_time: row.get(2)?,
                            execution_time: row.get(3)?,
                            close_time: row.get(4)?,
                            workflow_type_name: row.get(5)?,
                            status: row.get(6)?,
                            history_length: row.get(7)?,
                            memo: row.get(8)?,
                            encoding: row.get(9)?,
                        })
                    },
                )?;
                rows.next().transpose()
            })
            .map_err(|e| map_store_err(VisibilityOperation::GetClosedExecution, e))?;

        Ok(GetClosedWorkflowExecutionResponse {
            execution: row.map(|row| closed_row_to_info(&self.serializer, row)),
        })
    }

    async fn delete_execution(&self, _request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        // Reclamation is TTL-driven.
        Ok(())
    }

    fn close(&self) {}
}

/// Closed-execution listings over the close-time-partitioned V2 table; every
/// other operation delegates to the wrapped store.
pub struct SqliteVisibilityStoreV2 {
    inner: Arc<dyn VisibilityStore>,
    db: Arc<Database>,
    serializer: Serializer,
}

impl SqliteVisibilityStoreV2 {
    pub fn new(inner: Arc<dyn VisibilityStore>, db: Arc<Database>) -> Self {
        Self {
            inner,
            db,
            serializer: Serializer::new(),
        }
    }
}

#[async_trait]
impl VisibilityStore for SqliteVisibilityStoreV2 {
    fn get_name(&self) -> String {
        self.inner.get_name()
    }

    async fn record_started(&self, request: &RecordWorkflowExecutionStartedRequest) -> Result<()> {
        self.inner.record_started(request).await
    }

    async fn record_closed(&self, request: &RecordWorkflowExecutionClosedRequest) -> Result<()> {
        self.inner.record_closed(request).await
    }

    async fn list_open(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.inner.list_open(request).await
    }

    async fn list_closed(
        &self,
        request: &ListWorkflowExecutionsRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosed,
            "closed_executions_v2",
            "close_time",
            "domain_partition IN (?)",
            request,
            None,
        )
    }

    async fn list_open_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.inner.list_open_by_type(request).await
    }

    async fn list_closed_by_type(
        &self,
        request: &ListWorkflowExecutionsByTypeRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByType,
            "closed_executions_v2",
            "close_time",
            "domain_partition = ?",
            &request.request,
            Some((
                "workflow_type_name = ?",
                Box::new(request.workflow_type_name.clone()),
            )),
        )
    }

    async fn list_open_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        self.inner.list_open_by_workflow_id(request).await
    }

    async fn list_closed_by_workflow_id(
        &self,
        request: &ListWorkflowExecutionsByWorkflowIdRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByWorkflowId,
            "closed_executions_v2",
            "close_time",
            "domain_partition = ?",
            &request.request,
            Some(("workflow_id = ?", Box::new(request.workflow_id.clone()))),
        )
    }

    async fn list_closed_by_status(
        &self,
        request: &ListClosedWorkflowExecutionsByStatusRequest,
    ) -> Result<ListWorkflowExecutionsResponse> {
        query_closed_table(
            &self.db,
            &self.serializer,
            VisibilityOperation::ListClosedByStatus,
            "closed_executions_v2",
            "close_time",
            "domain_partition = ?",
            &request.request,
            Some(("status = ?", Box::new(request.status.code()))),
        )
    }

    async fn get_closed_execution(
        &self,
        request: &GetClosedWorkflowExecutionRequest,
    ) -> Result<GetClosedWorkflowExecutionResponse> {
        self.inner.get_closed_execution(request).await
    }

    async fn delete_execution(&self, request: &DeleteWorkflowExecutionRequest) -> Result<()> {
        self.inner.delete_execution(request).await
    }

    fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn started(domain_id: &str, workflow_id: &str, run_id: &str, start_time: i64) -> RecordWorkflowExecutionStartedRequest {
        RecordWorkflowExecutionStartedRequest {
            domain_id: domain_id.to_string(),
            domain: "test-domain".to_string(),
            workflow_id: workflow_id.to_string(),
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
        domain_id: &str,
        workflow_id: &str,
        run_id: &str,
        start_time: i64,
        close_time: i64,
        status: CloseStatus,
    ) -> RecordWorkflowExecutionClosedRequest {
        RecordWorkflowExecutionClosedRequest {
            domain_id: domain_id.to_string(),
            domain: "test-domain".to_string(),
            workflow_id: workflow_id.to_string(),
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

    fn list(domain_id: &str, earliest: i64, latest: i64, page_size: usize) -> ListWorkflowExecutionsRequest {
        ListWorkflowExecutionsRequest {
            domain_id: domain_id.to_string(),
            domain: "test-domain".to_string(),
            earliest_time: earliest,
            latest_time: latest,
            page_size,
            next_page_token: Vec::new(),
        }
    }

    fn v2_stack() -> (Arc<SqliteVisibilityStore>, SqliteVisibilityStoreV2) {
        let db = Database::open_in_memory().unwrap();
        let base = Arc::new(SqliteVisibilityStore::new(db.clone()));
        let v2 = SqliteVisibilityStoreV2::new(base.clone(), db);
        (base, v2)
    }

    #[tokio::test]
    async fn open_then_close_read_back() {
        let (_, store) = v2_stack();
        store
            .record_started(&started("d1", "wf-1", "run-1", 1_000_000))
            .await
            .unwrap();
        store
            .record_closed(&closed(
                "d1",
                "wf-1",
                "run-1",
                1_000_000,
                2_000_000,
                CloseStatus::Completed,
            ))
            .await
            .unwrap();

        let page = store.list_closed(&list("d1", 0, 3_000_000, 10)).await.unwrap();
        assert_eq!(page.executions.len(), 1);
        let info = &page.executions[0];
        assert_eq!(info.start_time, 1_000_000);
        assert_eq!(info.close_time, Some(2_000_000));
        assert_eq!(info.close_status, Some(CloseStatus::Completed));
        assert_eq!(info.history_length, Some(7));
        // execution_time was stored as zero and promotes to start_time.
        assert_eq!(info.execution_time, 1_000_000);
        assert!(page.next_page_token.is_empty());

        let open = store.list_open(&list("d1", 0, 3_000_000, 10)).await.unwrap();
        assert!(open.executions.is_empty());
    }

    #[tokio::test]
    async fn pagination_is_stable_across_pages() {
        let (_, store) = v2_stack();
        for i in 1..=25 {
            let run = format!("run-{i:03}");
            store
                .record_closed(&closed("d1", "wf-1", &run, 500, i * 1_000, CloseStatus::Completed))
                .await
                .unwrap();
        }

        let mut request = list("d1", 0, 26_000, 10);
        let page1 = store.list_closed(&request).await.unwrap();
        let times: Vec<i64> = page1.executions.iter().filter_map(|e| e.close_time).collect();
        assert_eq!(times, (16..=25).rev().map(|i| i * 1_000).collect::<Vec<_>>());
        assert!(!page1.next_page_token.is_empty());

        request.next_page_token = page1.next_page_token;
        let page2 = store.list_closed(&request).await.unwrap();
        let times: Vec<i64> = page2.executions.iter().filter_map(|e| e.close_time).collect();
        assert_eq!(times, (6..=15).rev().map(|i| i * 1_000).collect::<Vec<_>>());
        assert!(!page2.next_page_token.is_empty());

        request.next_page_token = page2.next_page_token;
        let page3 = store.list_closed(&request).await.unwrap();
        let times: Vec<i64> = page3.executions.iter().filter_map(|e| e.close_time).collect();
        assert_eq!(times, (1..=5).rev().map(|i| i * 1_000).collect::<Vec<_>>());
        assert!(page3.next_page_token.is_empty());
    }

    #[tokio::test]
    async fn writes_are_idempotent_by_run_id() {
        let (base, store) = v2_stack();
        let start = started("d1", "wf-1", "run-1", 1_000);
        base.record_started(&start).await.unwrap();
        base.record_started(&start).await.unwrap();
        let open = base.list_open(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert_eq!(open.executions.len(), 1);

        let close = closed("d1", "wf-1", "run-1", 1_000, 2_000, CloseStatus::Completed);
        base.record_closed(&close).await.unwrap();
        base.record_closed(&close).await.unwrap();
        let page = store.list_closed(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert_eq!(page.executions.len(), 1);
        assert!(base
            .list_open(&list("d1", 0, 10_000, 10))
            .await
            .unwrap()
            .executions
            .is_empty());
    }

    #[tokio::test]
    async fn inverted_range_returns_empty_page() {
        let (_, store) = v2_stack();
        store
            .record_closed(&closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed))
            .await
            .unwrap();
        let page = store.list_closed(&list("d1", 5_000, 1_000, 10)).await.unwrap();
        assert!(page.executions.is_empty());
        assert!(page.next_page_token.is_empty());
    }

    #[tokio::test]
    async fn filtered_listings_apply_their_predicate() {
        let (_, store) = v2_stack();
        let mut other_type = closed("d1", "wf-2", "run-2", 500, 2_000, CloseStatus::Failed);
        other_type.workflow_type_name = "PaymentWorkflow".to_string();
        store
            .record_closed(&closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed))
            .await
            .unwrap();
        store.record_closed(&other_type).await.unwrap();

        let by_type = store
            .list_closed_by_type(&ListWorkflowExecutionsByTypeRequest {
                request: list("d1", 0, 10_000, 10),
                workflow_type_name: "PaymentWorkflow".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_type.executions.len(), 1);
        assert_eq!(by_type.executions[0].run_id, "run-2");

        let by_id = store
            .list_closed_by_workflow_id(&ListWorkflowExecutionsByWorkflowIdRequest {
                request: list("d1", 0, 10_000, 10),
                workflow_id: "wf-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_id.executions.len(), 1);
        assert_eq!(by_id.executions[0].run_id, "run-1");

        let by_status = store
            .list_closed_by_status(&ListClosedWorkflowExecutionsByStatusRequest {
                request: list("d1", 0, 10_000, 10),
                status: CloseStatus::Failed,
            })
            .await
            .unwrap();
        assert_eq!(by_status.executions.len(), 1);
        assert_eq!(by_status.executions[0].close_status, Some(CloseStatus::Failed));
    }

    #[tokio::test]
    async fn open_listings_scan_by_start_time() {
        let (base, _) = v2_stack();
        for i in 1..=3 {
            base.record_started(&started("d1", "wf-1", &format!("run-{i}"), i * 100))
                .await
                .unwrap();
        }
        let page = base.list_open(&list("d1", 0, 1_000, 10)).await.unwrap();
        let starts: Vec<i64> = page.executions.iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![300, 200, 100]);

        let by_id = base
            .list_open_by_workflow_id(&ListWorkflowExecutionsByWorkflowIdRequest {
                request: list("d1", 0, 1_000, 10),
                workflow_id: "wf-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_id.executions.len(), 3);
    }

    #[tokio::test]
    async fn get_closed_execution_prefers_latest_close() {
        let (base, _) = v2_stack();
        base.record_closed(&closed("d1", "wf-1", "run-a", 100, 1_000, CloseStatus::Completed))
            .await
            .unwrap();
        base.record_closed(&closed("d1", "wf-1", "run-b", 100, 2_000, CloseStatus::Failed))
            .await
            .unwrap();

        let any_run = base
            .get_closed_execution(&GetClosedWorkflowExecutionRequest {
                domain_id: "d1".to_string(),
                domain: "test-domain".to_string(),
                workflow_id: "wf-1".to_string(),
                run_id: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(any_run.execution.as_ref().unwrap().run_id, "run-b");

        let specific = base
            .get_closed_execution(&GetClosedWorkflowExecutionRequest {
                domain_id: "d1".to_string(),
                domain: "test-domain".to_string(),
                workflow_id: "wf-1".to_string(),
                run_id: "run-a".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(specific.execution.as_ref().unwrap().run_id, "run-a");

        let missing = base
            .get_closed_execution(&GetClosedWorkflowExecutionRequest {
                domain_id: "d1".to_string(),
                domain: "test-domain".to_string(),
                workflow_id: "wf-404".to_string(),
                run_id: String::new(),
            })
            .await
            .unwrap();
        assert!(missing.execution.is_none());
    }

    #[tokio::test]
    async fn delete_is_a_noop() {
        let (_, store) = v2_stack();
        store
            .record_closed(&closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed))
            .await
            .unwrap();
        store
            .delete_execution(&DeleteWorkflowExecutionRequest {
                domain_id: "d1".to_string(),
                run_id: "run-1".to_string(),
            })
            .await
            .unwrap();
        let page = store.list_closed(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert_eq!(page.executions.len(), 1);
    }

    #[tokio::test]
    async fn memo_survives_write_and_read() {
        let (_, store) = v2_stack();
        let serializer = Serializer::new();
        let mut fields = BTreeMap::new();
        fields.insert("k".to_string(), b"v".to_vec());
        let memo = Memo::new(fields);
        let blob = serializer
            .serialize_memo(Some(&memo), EncodingType::ThriftRw)
            .unwrap()
            .unwrap();

        let mut request = closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed);
        request.memo = blob.data;
        request.encoding = blob.encoding;
        store.record_closed(&request).await.unwrap();

        let page = store.list_closed(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert_eq!(page.executions[0].memo, Some(memo));
    }

    #[tokio::test]
    async fn expired_rows_are_filtered() {
        let (_, store) = v2_stack();
        let mut request = closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed);
        request.retention_seconds = 1; // expired long ago relative to wall clock
        store.record_closed(&request).await.unwrap();
        let page = store.list_closed(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert!(page.executions.is_empty());
    }

    #[tokio::test]
    async fn malformed_page_token_is_bad_request() {
        let (_, store) = v2_stack();
        let mut request = list("d1", 0, 10_000, 10);
        request.next_page_token = b"garbage".to_vec();
        let err = store.list_closed(&request).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn get_name_passes_through_the_wrapped_store() {
        let (base, v2) = v2_stack();
        assert_eq!(base.get_name(), "sqlite");
        assert_eq!(v2.get_name(), "sqlite");
    }

    #[tokio::test]
    async fn on_disk_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visibility.db");
        {
            let db = Database::open(&path).unwrap();
            let store = SqliteVisibilityStore::new(db);
            store
                .record_closed(&closed("d1", "wf-1", "run-1", 500, 1_000, CloseStatus::Completed))
                .await
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let store = SqliteVisibilityStore::new(db);
        let page = store.list_closed(&list("d1", 0, 10_000, 10)).await.unwrap();
        assert_eq!(page.executions.len(), 1);
    }

    #[test]
    fn throttling_errors_surface_as_service_busy() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err = map_store_err(VisibilityOperation::ListClosed, busy);
        assert_eq!(err.kind(), crate::error::ErrorKind::ServiceBusy);
        assert!(err.to_string().contains("ListClosed operation failed"));

        let other = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        );
        let err = map_store_err(VisibilityOperation::ListClosed, other);
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}
