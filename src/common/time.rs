use std::time::Duration;

pub(crate) type Clock = quanta::Clock;

/// The timestamp type carried by [`QueryEntry`][query-entry] snapshots.
///
/// [query-entry]: ./struct.QueryEntry.html
pub type Instant = quanta::Instant;

pub(crate) fn elapsed_nanos(clock: &Clock, since: Instant) -> u64 {
    let elapsed: Duration = clock.now().saturating_duration_since(since);
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}
