use serde::Serialize;

use crate::monitoring::types::ProbeResult;

/// A probe result as persisted, with its store-assigned sequence id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: i64,
    #[serde(flatten)]
    pub result: ProbeResult,
}

impl std::fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.result.status_code().map_or("-".to_string(), |code| code.to_string());
        let latency =
            self.result.response_time_ms().map_or("N/A".to_string(), |ms| format!("{ms:.0}ms"));
        write!(
            f,
            "#{} {} [{}] {} code={} time={}",
            self.id,
            self.result.checked_at().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.result.status().as_str().to_uppercase(),
            self.result.endpoint(),
            code,
            latency
        )
    }
}
