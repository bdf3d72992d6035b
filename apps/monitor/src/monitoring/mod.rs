//! Monitoring engine - the probe, record, compare loop
//!
//! This module is responsible for:
//! - Probing endpoints over HTTP
//! - Detecting status changes between consecutive probes
//! - Scheduling cycles at a fixed cadence

pub mod checker;
pub mod detector;
pub mod scheduler;
pub mod types;

pub use checker::{HttpProbe, Probe};
pub use detector::detect;
pub use scheduler::{CycleReport, MonitoringScheduler, SchedulerState};
pub use types::{MonitorEvent, Observation, ProbeResult, Status, Transition};
