//! Durable probe history
//!
//! An append-only `checks` table in a local SQLite file (via libsql), ordered
//! by its autoincrement id.

pub mod models;
pub mod repository;
pub mod schema;

pub use models::HistoryRecord;
pub use repository::{HistoryStore, LibsqlHistoryStore};
