use std::time::Duration;

const YEAR_SECONDS: u64 = 365 * 24 * 3600;

pub(crate) fn ensure_stale_time_or_panic(stale_time: Option<Duration>) {
    let max_duration = Duration::from_secs(1_000 * YEAR_SECONDS);
    if let Some(d) = stale_time {
        assert!(d <= max_duration, "stale_time is longer than 1000 years");
    }
}
