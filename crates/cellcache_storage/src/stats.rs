use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of a cache's counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CacheStats {
    /// Requests answered by a resident entry.
    pub hits: u64,
    /// Requests that found nothing resident.
    pub misses: u64,
    /// Misses that waited on a load started by another caller instead of loading themselves.
    pub coalesced: u64,
    /// Loader invocations.
    pub loads: u64,
    pub load_failures: u64,
    /// Entries removed after a successful write-back.
    pub evictions: u64,
    pub write_back_failures: u64,
}

impl CacheStats {
    /// Fraction of requests answered without loading, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    write_back_failures: AtomicU64,
}

macro_rules! counter_incr {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl StatCounters {
    counter_incr!(
        hit => hits,
        miss => misses,
        coalesced => coalesced,
        load => loads,
        load_failure => load_failures,
        eviction => evictions,
        write_back_failure => write_back_failures,
    );

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_of_empty_stats_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn snapshot_reflects_increments() {
        let counters = StatCounters::default();
        counters.hit();
        counters.hit();
        counters.hit();
        counters.miss();
        counters.load();

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
