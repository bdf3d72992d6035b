use super::types::{ProbeResult, Status, Transition};

/// Compare a fresh result against the status recorded before it.
///
/// Nothing is reported for the first observation of an endpoint or when the
/// status is unchanged.
pub fn detect(previous: Option<Status>, current: &ProbeResult) -> Option<Transition> {
    let from = previous?;
    if from == current.status() {
        return None;
    }

    Some(Transition {
        endpoint: current.endpoint().to_string(),
        from,
        to: current.status(),
        status_code: current.status_code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    const ENDPOINT: &str = "https://example.com";

    fn up() -> ProbeResult {
        ProbeResult::responded(ENDPOINT, Utc::now(), 200, Duration::from_millis(20))
    }

    fn down() -> ProbeResult {
        ProbeResult::responded(ENDPOINT, Utc::now(), 503, Duration::from_millis(20))
    }

    #[test]
    fn test_first_observation_never_alerts() {
        assert_eq!(detect(None, &up()), None);
        assert_eq!(detect(None, &down()), None);
        assert_eq!(detect(None, &ProbeResult::unreachable(ENDPOINT, Utc::now())), None);
    }

    #[test]
    fn test_unchanged_status_does_not_alert() {
        assert_eq!(detect(Some(Status::Up), &up()), None);
        assert_eq!(detect(Some(Status::Down), &down()), None);
        // A different failure mode is still the same status
        assert_eq!(detect(Some(Status::Down), &ProbeResult::unreachable(ENDPOINT, Utc::now())), None);
    }

    #[test]
    fn test_changed_status_alerts() {
        let transition = detect(Some(Status::Up), &down()).unwrap();
        assert_eq!(transition.endpoint, ENDPOINT);
        assert_eq!(transition.from, Status::Up);
        assert_eq!(transition.to, Status::Down);
        assert_eq!(transition.status_code, Some(503));

        let recovery = detect(Some(Status::Down), &up()).unwrap();
        assert_eq!(recovery.from, Status::Down);
        assert_eq!(recovery.to, Status::Up);
        assert_eq!(recovery.status_code, Some(200));
    }

    #[test]
    fn test_unreachable_transition_has_no_code() {
        let transition =
            detect(Some(Status::Up), &ProbeResult::unreachable(ENDPOINT, Utc::now())).unwrap();
        assert_eq!(transition.to, Status::Down);
        assert_eq!(transition.status_code, None);
    }
}
