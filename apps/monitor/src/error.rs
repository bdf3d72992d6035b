use thiserror::Error;

use crate::config::ConfigError;

/// Failures of the durable history store. All of them are fatal to the
/// monitoring loop.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: libsql::Error,
    },

    #[error("could not build connection pool: {0}")]
    Build(#[from] deadpool::managed::BuildError),

    #[error("could not obtain a database connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("history table is missing although the schema was initialized")]
    SchemaMissing,

    #[error("corrupt history record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("history storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
