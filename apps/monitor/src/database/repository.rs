use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Row, params};

use super::models::HistoryRecord;
use super::schema::ensure_schema;
use crate::error::StorageError;
use crate::monitoring::types::{ProbeResult, Status};
use crate::pool::{LibsqlManager, LibsqlPool};

const RECORD_COLUMNS: &str = "id, endpoint, status, response_time_ms, status_code, checked_at";

/// Append-only log of probe results
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ensure the durable schema exists. Idempotent.
    async fn init(&self) -> Result<(), StorageError>;

    /// Append `result` and return its sequence id once it is committed
    async fn save(&self, result: &ProbeResult) -> Result<i64, StorageError>;

    /// Status of the most recent record for `endpoint`
    async fn last_status(&self, endpoint: &str) -> Result<Option<Status>, StorageError>;

    /// Most recent record for `endpoint`
    async fn latest(&self, endpoint: &str) -> Result<Option<HistoryRecord>, StorageError>;

    /// Up to `limit` records across all endpoints, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, StorageError>;
}

/// LibSQL (local SQLite file) history store
pub struct LibsqlHistoryStore {
    pool: LibsqlPool,
    initialized: AtomicBool,
}

impl LibsqlHistoryStore {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool, initialized: AtomicBool::new(false) }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StorageError> {
        Ok(self.pool.get().await?)
    }

    /// A missing table only means "no history" while the schema has never
    /// been created, neither by this handle nor recorded in the file
    async fn missing_schema<T: Send>(
        &self,
        conn: &Connection,
        error: StorageError,
        empty: T,
    ) -> Result<T, StorageError> {
        if !matches!(&error, StorageError::Query(e) if is_missing_table(e)) {
            return Err(error);
        }
        drop(error);

        if self.initialized.load(Ordering::Acquire) || schema_recorded(conn).await? {
            Err(StorageError::SchemaMissing)
        } else {
            Ok(empty)
        }
    }

    async fn query_records(
        conn: &Connection,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let mut rows = conn.query(sql, params).await?;
        let mut records = Vec::new();

        while let Some(row) = rows.next().await? {
            records.push(record_from_row(&row)?);
        }

        Ok(records)
    }
}

#[async_trait]
impl HistoryStore for LibsqlHistoryStore {
    async fn init(&self) -> Result<(), StorageError> {
        let conn = self.get_conn().await?;
        ensure_schema(&conn).await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn save(&self, result: &ProbeResult) -> Result<i64, StorageError> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO checks (endpoint, status, response_time_ms, status_code, checked_at) VALUES (?, ?, ?, ?, ?)",
            params![
                result.endpoint().to_string(),
                result.status().as_str().to_string(),
                result.response_time_ms(),
                result.status_code().map(i64::from),
                result.checked_at().to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn last_status(&self, endpoint: &str) -> Result<Option<Status>, StorageError> {
        let conn = self.get_conn().await?;

        match query_last_status(&conn, endpoint).await {
            Ok(status) => Ok(status),
            Err(error) => self.missing_schema(&conn, error, None).await,
        }
    }

    async fn latest(&self, endpoint: &str) -> Result<Option<HistoryRecord>, StorageError> {
        let conn = self.get_conn().await?;
        let sql =
            format!("SELECT {RECORD_COLUMNS} FROM checks WHERE endpoint = ? ORDER BY id DESC LIMIT 1");

        match Self::query_records(&conn, &sql, params![endpoint.to_string()]).await {
            Ok(records) => Ok(records.into_iter().next()),
            Err(error) => self.missing_schema(&conn, error, None).await,
        }
    }

    async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>, StorageError> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM checks ORDER BY id DESC LIMIT ?");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        match Self::query_records(&conn, &sql, params![limit]).await {
            Ok(records) => Ok(records),
            Err(error) => self.missing_schema(&conn, error, Vec::new()).await,
        }
    }
}

async fn query_last_status(
    conn: &Connection,
    endpoint: &str,
) -> Result<Option<Status>, StorageError> {
    let mut rows = conn
        .query(
            "SELECT id, status FROM checks WHERE endpoint = ? ORDER BY id DESC LIMIT 1",
            params![endpoint.to_string()],
        )
        .await?;

    let Some(row) = rows.next().await? else {
        return Ok(None);
    };

    let id: i64 = row.get(0)?;
    let status: String = row.get(1)?;
    let status = status
        .parse::<Status>()
        .map_err(|e| StorageError::Corrupt { id, reason: e.to_string() })?;

    Ok(Some(status))
}

/// `schema_version` outlives the `checks` table it describes
async fn schema_recorded(conn: &Connection) -> Result<bool, StorageError> {
    let mut rows = match conn.query("SELECT COUNT(*) FROM schema_version", ()).await {
        Ok(rows) => rows,
        Err(e) if is_missing_table(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let versions: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };
    Ok(versions > 0)
}

fn is_missing_table(error: &libsql::Error) -> bool {
    error.to_string().contains("no such table")
}

fn record_from_row(row: &Row) -> Result<HistoryRecord, StorageError> {
    let id: i64 = row.get(0)?;
    let endpoint: String = row.get(1)?;
    let status_text: String = row.get(2)?;
    let response_time_ms: Option<f64> = row.get(3)?;
    let status_code: Option<i64> = row.get(4)?;
    let checked_at: String = row.get(5)?;

    let corrupt = |reason: String| StorageError::Corrupt { id, reason };

    let status = status_text.parse::<Status>().map_err(|e| corrupt(e.to_string()))?;
    let checked_at = DateTime::parse_from_rfc3339(&checked_at)
        .map_err(|e| corrupt(format!("invalid checked_at '{checked_at}': {e}")))?
        .with_timezone(&Utc);

    let result = match (status_code, response_time_ms) {
        (Some(code), Some(ms)) => {
            let code = u16::try_from(code)
                .map_err(|_| corrupt(format!("status code {code} out of range")))?;
            if !ms.is_finite() || ms < 0.0 {
                return Err(corrupt(format!("invalid response time {ms}")));
            }
            ProbeResult::from_parts(endpoint, checked_at, code, ms)
        }
        (None, None) => ProbeResult::unreachable(endpoint, checked_at),
        _ => {
            return Err(corrupt(
                "status code and response time must be recorded together".to_string(),
            ));
        }
    };

    if result.status() != status {
        return Err(corrupt(format!(
            "stored status '{status}' contradicts status code {:?}",
            result.status_code()
        )));
    }

    Ok(HistoryRecord { id, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open_pool;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    async fn create_test_store() -> (LibsqlHistoryStore, TempDir) {
        let temp_dir = tempdir().unwrap();
        let pool = open_pool(temp_dir.path().join("test.db")).await.unwrap();
        (LibsqlHistoryStore::new_from_pool(pool), temp_dir)
    }

    fn up(endpoint: &str) -> ProbeResult {
        ProbeResult::responded(endpoint, Utc::now(), 200, Duration::from_millis(42))
    }

    fn down(endpoint: &str) -> ProbeResult {
        ProbeResult::responded(endpoint, Utc::now(), 500, Duration::from_millis(7))
    }

    async fn table_names(store: &LibsqlHistoryStore) -> Vec<String> {
        let conn = store.get_conn().await.unwrap();
        let mut rows = conn
            .query("SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name", ())
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (store, _dir) = create_test_store().await;

        store.init().await.unwrap();
        let id = store.save(&up("https://a.example")).await.unwrap();
        let schema_after_first = table_names(&store).await;

        store.init().await.unwrap();
        store.init().await.unwrap();

        assert_eq!(table_names(&store).await, schema_after_first);
        assert_eq!(store.recent(10).await.unwrap().len(), 1);
        assert_eq!(store.latest("https://a.example").await.unwrap().unwrap().id, id);

        let conn = store.get_conn().await.unwrap();
        let mut rows = conn.query("SELECT COUNT(*) FROM schema_version", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_sequence_ids_increase() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        let first = store.save(&up("https://a.example")).await.unwrap();
        let second = store.save(&up("https://b.example")).await.unwrap();
        let third = store.save(&down("https://a.example")).await.unwrap();

        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn test_last_status_unknown_endpoint() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        assert_eq!(store.last_status("https://never.example").await.unwrap(), None);
        assert!(store.latest("https://never.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_status_picks_highest_id_with_interleaving() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        store.save(&up("https://a.example")).await.unwrap();
        store.save(&down("https://b.example")).await.unwrap();
        store.save(&down("https://a.example")).await.unwrap();
        store.save(&up("https://b.example")).await.unwrap();
        store.save(&ProbeResult::unreachable("https://c.example", Utc::now())).await.unwrap();
        store.save(&up("https://a.example")).await.unwrap();
        store.save(&down("https://b.example")).await.unwrap();

        assert_eq!(store.last_status("https://a.example").await.unwrap(), Some(Status::Up));
        assert_eq!(store.last_status("https://b.example").await.unwrap(), Some(Status::Down));
        assert_eq!(store.last_status("https://c.example").await.unwrap(), Some(Status::Down));
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        let answered = ProbeResult::responded(
            "https://a.example/health",
            Utc::now(),
            204,
            Duration::from_micros(12_345),
        );
        let id = store.save(&answered).await.unwrap();
        let record = store.latest("https://a.example/health").await.unwrap().unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.result, answered);

        let unreachable = ProbeResult::unreachable("https://b.example", Utc::now());
        store.save(&unreachable).await.unwrap();
        let record = store.latest("https://b.example").await.unwrap().unwrap();
        assert_eq!(record.result, unreachable);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        for endpoint in ["https://a.example", "https://b.example", "https://c.example"] {
            store.save(&up(endpoint)).await.unwrap();
        }

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].result.endpoint(), "https://c.example");
        assert_eq!(recent[1].result.endpoint(), "https://b.example");
    }

    #[tokio::test]
    async fn test_status_change_is_visible_after_save() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        store.save(&up("https://x.example")).await.unwrap();
        store.save(&up("https://x.example")).await.unwrap();

        let next = down("https://x.example");
        let previous = store.last_status("https://x.example").await.unwrap();
        let transition = crate::monitoring::detector::detect(previous, &next).unwrap();
        assert_eq!((transition.from, transition.to), (Status::Up, Status::Down));

        store.save(&next).await.unwrap();
        assert_eq!(store.last_status("https://x.example").await.unwrap(), Some(Status::Down));
    }

    #[tokio::test]
    async fn test_missing_schema_before_init_means_no_history() {
        let (store, _dir) = create_test_store().await;

        assert_eq!(store.last_status("https://a.example").await.unwrap(), None);
        assert!(store.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_schema_after_init_is_fatal() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        let conn = store.get_conn().await.unwrap();
        conn.execute("DROP TABLE checks", ()).await.unwrap();
        drop(conn);

        let error = store.last_status("https://a.example").await.unwrap_err();
        assert!(matches!(error, StorageError::SchemaMissing));
    }

    #[tokio::test]
    async fn test_missing_schema_is_fatal_for_a_fresh_handle() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let first = LibsqlHistoryStore::new_from_pool(open_pool(&db_path).await.unwrap());
        first.init().await.unwrap();
        first.get_conn().await.unwrap().execute("DROP TABLE checks", ()).await.unwrap();

        // Never initialized itself, but the file says the schema existed
        let second = LibsqlHistoryStore::new_from_pool(open_pool(&db_path).await.unwrap());
        let error = second.last_status("https://a.example").await.unwrap_err();
        assert!(matches!(error, StorageError::SchemaMissing));
        assert!(matches!(second.recent(5).await.unwrap_err(), StorageError::SchemaMissing));
    }

    #[tokio::test]
    async fn test_save_while_another_connection_reads() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let writer = LibsqlHistoryStore::new_from_pool(open_pool(&db_path).await.unwrap());
        writer.init().await.unwrap();
        writer.save(&up("https://a.example")).await.unwrap();

        // A second process-like handle with an open read transaction
        let reader_pool = open_pool(&db_path).await.unwrap();
        let reader = reader_pool.get().await.unwrap();
        reader.execute("BEGIN", ()).await.unwrap();
        let mut rows = reader.query("SELECT * FROM checks", ()).await.unwrap();
        assert!(rows.next().await.unwrap().is_some());

        let id = writer.save(&down("https://a.example")).await.unwrap();
        assert_eq!(id, 2);

        drop(rows);
        reader.execute("COMMIT", ()).await.unwrap();
        assert_eq!(writer.last_status("https://a.example").await.unwrap(), Some(Status::Down));
    }

    #[tokio::test]
    async fn test_save_without_schema_fails() {
        let (store, _dir) = create_test_store().await;

        let error = store.save(&up("https://a.example")).await.unwrap_err();
        assert!(matches!(error, StorageError::Query(_)));
    }

    #[tokio::test]
    async fn test_contradictory_row_is_rejected() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        let conn = store.get_conn().await.unwrap();
        conn.execute(
            "INSERT INTO checks (endpoint, status, response_time_ms, status_code, checked_at) VALUES (?, ?, ?, ?, ?)",
            params![
                "https://a.example".to_string(),
                "up".to_string(),
                10.0,
                503,
                Utc::now().to_rfc3339()
            ],
        )
        .await
        .unwrap();
        drop(conn);

        let error = store.latest("https://a.example").await.unwrap_err();
        assert!(matches!(error, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_negative_response_time_is_rejected() {
        let (store, _dir) = create_test_store().await;
        store.init().await.unwrap();

        let conn = store.get_conn().await.unwrap();
        conn.execute(
            "INSERT INTO checks (endpoint, status, response_time_ms, status_code, checked_at) VALUES (?, ?, ?, ?, ?)",
            params![
                "https://a.example".to_string(),
                "up".to_string(),
                -3.0,
                200,
                Utc::now().to_rfc3339()
            ],
        )
        .await
        .unwrap();
        drop(conn);

        let error = store.latest("https://a.example").await.unwrap_err();
        assert!(matches!(error, StorageError::Corrupt { .. }));
    }
}
