use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability of an endpoint as observed by a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    /// Status implied by an HTTP response code: anything below 400 is up
    pub fn from_status_code(code: u16) -> Self {
        if code < 400 { Status::Up } else { Status::Down }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}', expected 'up' or 'down'")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Status::Up),
            "down" => Ok(Status::Down),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Outcome of one probe against one endpoint.
///
/// A result either carries a status code together with a response time (the
/// endpoint answered) or neither (timeout or transport failure). The status is
/// always derived from the code, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    endpoint: String,
    status: Status,
    response_time_ms: Option<f64>,
    status_code: Option<u16>,
    checked_at: DateTime<Utc>,
}

impl ProbeResult {
    /// The endpoint answered with `status_code` after `elapsed`
    pub fn responded(
        endpoint: impl Into<String>,
        checked_at: DateTime<Utc>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        Self::from_parts(endpoint, checked_at, status_code, elapsed.as_secs_f64() * 1000.0)
    }

    /// The endpoint could not be reached within the timeout
    pub fn unreachable(endpoint: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: Status::Down,
            response_time_ms: None,
            status_code: None,
            checked_at,
        }
    }

    pub(crate) fn from_parts(
        endpoint: impl Into<String>,
        checked_at: DateTime<Utc>,
        status_code: u16,
        response_time_ms: f64,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: Status::from_status_code(status_code),
            response_time_ms: Some(response_time_ms.max(0.0)),
            status_code: Some(status_code),
            checked_at,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn response_time_ms(&self) -> Option<f64> {
        self.response_time_ms
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }
}

/// A change of status between two consecutive observations of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub endpoint: String,
    pub from: Status,
    pub to: Status,
    pub status_code: Option<u16>,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self.status_code {
            Some(code) => code.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "ALERT - STATUS CHANGE: {} went {} -> {} (code: {})",
            self.endpoint,
            self.from.as_str().to_uppercase(),
            self.to.as_str().to_uppercase(),
            code
        )
    }
}

/// Summary of a single probe, emitted for every endpoint on every cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub endpoint: String,
    pub status: Status,
    pub response_time_ms: Option<f64>,
}

impl Observation {
    /// Response time rendered the way the log line shows it
    pub fn response_time_label(&self) -> String {
        match self.response_time_ms {
            Some(ms) => format!("{ms:.0}ms"),
            None => "N/A".to_string(),
        }
    }
}

impl From<&ProbeResult> for Observation {
    fn from(result: &ProbeResult) -> Self {
        Self {
            endpoint: result.endpoint().to_string(),
            status: result.status(),
            response_time_ms: result.response_time_ms(),
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {}",
            self.status.as_str().to_uppercase(),
            self.endpoint,
            self.response_time_label()
        )
    }
}

/// Events published by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Observation(Observation),
    Alert(Transition),
}

impl MonitorEvent {
    pub fn level(&self) -> tracing::Level {
        match self {
            MonitorEvent::Observation(_) => tracing::Level::INFO,
            MonitorEvent::Alert(_) => tracing::Level::WARN,
        }
    }
}
