use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how thumbnail requests were served.
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    disk_read_failures: AtomicU64,
    decodes: AtomicU64,
    decode_failures: AtomicU64,
    coalesced: AtomicU64,
    disk_writes: AtomicU64,
    disk_write_failures: AtomicU64,
}

/// Point-in-time copy of `CacheStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub disk_read_failures: u64,
    pub decodes: u64,
    pub decode_failures: u64,
    /// Requests that waited on another caller's in-flight load.
    pub coalesced: u64,
    pub disk_writes: u64,
    pub disk_write_failures: u64,
}

impl CacheStats {
    pub(crate) fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_read_failure(&self) {
        self.disk_read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode(&self, ok: bool) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disk_write(&self, ok: bool) {
        if ok {
            self.disk_writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.disk_write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_read_failures: self.disk_read_failures.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Difference between two snapshots, for per-run reporting.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            memory_hits: self.memory_hits.saturating_sub(earlier.memory_hits),
            disk_hits: self.disk_hits.saturating_sub(earlier.disk_hits),
            disk_read_failures: self.disk_read_failures.saturating_sub(earlier.disk_read_failures),
            decodes: self.decodes.saturating_sub(earlier.decodes),
            decode_failures: self.decode_failures.saturating_sub(earlier.decode_failures),
            coalesced: self.coalesced.saturating_sub(earlier.coalesced),
            disk_writes: self.disk_writes.saturating_sub(earlier.disk_writes),
            disk_write_failures: self.disk_write_failures.saturating_sub(earlier.disk_write_failures),
        }
    }
}
