//! Component F: the counters half of "metrics & diagnostics" (spec §4.6).
//! `dump`/`verify_alloc` live on [`crate::space::VeaSpace`] since they need
//! a live view of the free sets; this type is plain data.

/// Running counters for one `VeaSpace`. Cheap to read; never resets itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub reserve_hint_attempts: u64,
    pub reserve_hint_hits: u64,
    pub reserve_large_attempts: u64,
    pub reserve_large_hits: u64,
    pub reserve_best_fit_attempts: u64,
    pub reserve_best_fit_hits: u64,
    pub reserve_failures: u64,
    pub blocks_reserved: u64,
    pub blocks_published: u64,
    pub blocks_cancelled: u64,
    pub blocks_freed: u64,
    pub aging_migrations: u64,
    pub blocks_migrated: u64,
    pub coalesce_events: u64,
    pub unmap_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}
