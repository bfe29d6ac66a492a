use std::sync::atomic::{AtomicU64, Ordering};

use crate::stats::ClientStats;

#[derive(Default)]
pub(crate) struct StatsCounter {
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    fetch_success_count: AtomicU64,
    fetch_failure_count: AtomicU64,
    total_fetch_time: AtomicU64,
    invalidated_entry_count: AtomicU64,
    mutation_success_count: AtomicU64,
    mutation_failure_count: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        saturating_add(&self.hit_count, 1);
    }

    pub(crate) fn record_miss(&self) {
        saturating_add(&self.miss_count, 1);
    }

    pub(crate) fn record_fetch_success(&self, fetch_time_nanos: u64) {
        saturating_add(&self.fetch_success_count, 1);
        saturating_add(&self.total_fetch_time, fetch_time_nanos);
    }

    pub(crate) fn record_fetch_failure(&self, fetch_time_nanos: u64) {
        saturating_add(&self.fetch_failure_count, 1);
        saturating_add(&self.total_fetch_time, fetch_time_nanos);
    }

    pub(crate) fn record_invalidations(&self, count: usize) {
        saturating_add(&self.invalidated_entry_count, count as u64);
    }

    pub(crate) fn record_mutation(&self, succeeded: bool) {
        if succeeded {
            saturating_add(&self.mutation_success_count, 1);
        } else {
            saturating_add(&self.mutation_failure_count, 1);
        }
    }

    pub(crate) fn snapshot(&self) -> ClientStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Acquire);

        let mut stats = ClientStats::default();
        stats
            .set_req_counts(load(&self.hit_count), load(&self.miss_count))
            .set_fetch_counts(
                load(&self.fetch_success_count),
                load(&self.fetch_failure_count),
                load(&self.total_fetch_time),
            )
            .set_invalidated_entry_count(load(&self.invalidated_entry_count))
            .set_mutation_counts(
                load(&self.mutation_success_count),
                load(&self.mutation_failure_count),
            );
        stats
    }
}

fn saturating_add(counter: &AtomicU64, value: u64) {
    // The closure always returns `Some`, so `fetch_update` cannot fail.
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_add(value))
    });
}
