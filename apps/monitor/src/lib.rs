//! Periodic HTTP uptime monitor.
//!
//! Probes a fixed set of endpoints once per cycle, appends every result to a
//! local SQLite history and raises an alert whenever an endpoint flips
//! between up and down.

pub mod config;
pub mod database;
pub mod error;
pub mod monitoring;
pub mod pool;

pub use config::{Config, ConfigError, MonitorSettings};
pub use database::{HistoryRecord, HistoryStore, LibsqlHistoryStore};
pub use error::{MonitorError, StorageError};
pub use monitoring::{HttpProbe, MonitoringScheduler, Probe, ProbeResult, Status, Transition};
