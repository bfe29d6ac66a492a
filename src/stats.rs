//! Statistics of a query client.

use std::time::Duration;

/// A snapshot of the statistics of a query client.
///
/// Get one by calling the `stats` method of
/// [`future::QueryClient`][future-client] or [`sync::QueryClient`][sync-client].
///
/// A _hit_ is a `fetch` call served without running the caller's fetch function,
/// either from fresh cached data or from another caller's in-flight fetch. A
/// _miss_ is a `fetch` call whose fetch function ran.
///
/// [future-client]: ../future/struct.QueryClient.html
/// [sync-client]: ../sync/struct.QueryClient.html
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    hit_count: u64,
    miss_count: u64,
    fetch_success_count: u64,
    fetch_failure_count: u64,
    total_fetch_time: u64,
    invalidated_entry_count: u64,
    mutation_success_count: u64,
    mutation_failure_count: u64,
}

impl ClientStats {
    pub(crate) fn set_req_counts(&mut self, hit_count: u64, miss_count: u64) -> &mut Self {
        self.hit_count = hit_count;
        self.miss_count = miss_count;
        self
    }

    pub(crate) fn set_fetch_counts(
        &mut self,
        fetch_success_count: u64,
        fetch_failure_count: u64,
        total_fetch_time: u64,
    ) -> &mut Self {
        self.fetch_success_count = fetch_success_count;
        self.fetch_failure_count = fetch_failure_count;
        self.total_fetch_time = total_fetch_time;
        self
    }

    pub(crate) fn set_invalidated_entry_count(&mut self, count: u64) -> &mut Self {
        self.invalidated_entry_count = count;
        self
    }

    pub(crate) fn set_mutation_counts(&mut self, success: u64, failure: u64) -> &mut Self {
        self.mutation_success_count = success;
        self.mutation_failure_count = failure;
        self
    }

    pub fn request_count(&self) -> u64 {
        self.hit_count.saturating_add(self.miss_count)
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn hit_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            1.0
        } else {
            self.hit_count as f64 / req_count as f64
        }
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    pub fn miss_rate(&self) -> f64 {
        let req_count = self.request_count();
        if req_count == 0 {
            0.0
        } else {
            self.miss_count as f64 / req_count as f64
        }
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_success_count
            .saturating_add(self.fetch_failure_count)
    }

    pub fn fetch_success_count(&self) -> u64 {
        self.fetch_success_count
    }

    pub fn fetch_failure_count(&self) -> u64 {
        self.fetch_failure_count
    }

    pub fn fetch_failure_rate(&self) -> f64 {
        let fetch_count = self.fetch_count();
        if fetch_count == 0 {
            0.0
        } else {
            self.fetch_failure_count as f64 / fetch_count as f64
        }
    }

    /// Total time spent running fetch functions, successful or not.
    pub fn total_fetch_time(&self) -> Duration {
        Duration::from_nanos(self.total_fetch_time)
    }

    pub fn average_fetch_penalty(&self) -> Duration {
        let fetch_count = self.fetch_count();
        if fetch_count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_fetch_time / fetch_count)
        }
    }

    /// The number of entries that went from valid to invalidated, through
    /// mutations or direct invalidation calls.
    pub fn invalidated_entry_count(&self) -> u64 {
        self.invalidated_entry_count
    }

    pub fn mutation_success_count(&self) -> u64 {
        self.mutation_success_count
    }

    pub fn mutation_failure_count(&self) -> u64 {
        self.mutation_failure_count
    }
}
