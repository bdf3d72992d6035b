use std::{path::Path, time::Duration};

use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

use crate::error::StorageError;

const MAX_CONNECTIONS: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// WAL lets readers proceed alongside the monitor's writes
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;";

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // Wait out other readers and writers (e.g. `history`) instead of failing
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CONNECTION_PRAGMAS).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ())
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (creating if needed) the SQLite file at `path` behind a small pool
pub async fn open_pool(path: impl AsRef<Path>) -> Result<LibsqlPool, StorageError> {
    let path = path.as_ref();
    let database = libsql::Builder::new_local(path).build().await.map_err(|source| {
        StorageError::Open { path: path.display().to_string(), source }
    })?;

    Ok(Pool::builder(LibsqlManager::new(database)).max_size(MAX_CONNECTIONS).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_connections_use_wal() {
        let dir = tempdir().unwrap();
        let pool = open_pool(dir.path().join("pool.db")).await.unwrap();

        let conn = pool.get().await.unwrap();
        let mut rows = conn.query("PRAGMA journal_mode", ()).await.unwrap();
        let mode: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
