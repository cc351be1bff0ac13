use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let next = Duration::from_secs_f64((current.as_secs_f64() * 1.5).max(1.0));
    if next > max { max } else { next }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(retriable_status(code), "{code}");
        }
        for code in [200, 400, 401, 403, 404] {
            assert!(!retriable_status(code), "{code}");
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let max = Duration::from_secs(5);
        assert_eq!(backoff(Duration::from_secs(2), max), Duration::from_secs(3));
        assert_eq!(backoff(Duration::ZERO, max), Duration::from_secs(1));
        assert_eq!(backoff(Duration::from_secs(4), max), max);
    }
}
