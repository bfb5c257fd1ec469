//! `VeaSpace`: the public API surface tying components A–F together.
//!
//! One `VeaSpace` owns exactly one persistent descriptor, its transient
//! mirror, and every stream's hint context. The type is generic over the
//! host's [`HostTxEngine`] and, for tests and `vea-sim`, over a [`Clock`]
//! so aging can be driven deterministically (design notes §9).

use crate::clock::{Clock, SystemClock};
use crate::config::VeaConfig;
use crate::descriptor::PersistentDescriptor;
use crate::error::VeaError;
use crate::extent::Extent;
use crate::hint::HintContext;
use crate::metrics::Metrics;
use crate::reservation::{ReservationEntry, ReservationList};
use crate::transient::TransientFreeMap;
use crate::host_tx::HostTxEngine;

/// Which of the two free-set views a diagnostic operation should consult
/// (spec §12, supplemented from the original's `vea_dump`/`vea_verify_alloc`
/// view flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeView {
    Transient,
    Persistent,
}

/// The result of `verify_alloc` (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocState {
    /// The queried range is present in the requested view's free set.
    Free,
    /// The queried range does not intersect the requested view's free set.
    Allocated,
}

/// `unmap(offset, length)`, invoked on a best-effort basis as aging extents
/// migrate back into the free set (spec §6). Failures are recorded in
/// `Metrics` but never abort the migration — TRIM is advisory.
pub type UnmapCallback<E> = Box<dyn FnMut(u64, u32) -> Result<(), <E as HostTxEngine>::Error>>;

pub struct VeaSpace<E: HostTxEngine, C: Clock = SystemClock> {
    descriptor: PersistentDescriptor<E>,
    transient: TransientFreeMap,
    hints: Vec<HintContext>,
    config: VeaConfig,
    clock: C,
    metrics: Metrics,
    unmap: Option<UnmapCallback<E>>,
}

impl<E: HostTxEngine, C: Clock> std::fmt::Debug for VeaSpace<E, C>
where
    PersistentDescriptor<E>: std::fmt::Debug,
    C: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeaSpace")
            .field("descriptor", &self.descriptor)
            .field("transient", &self.transient)
            .field("hints", &self.hints)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("metrics", &self.metrics)
            .field("unmap", &self.unmap.is_some())
            .finish()
    }
}

impl<E: HostTxEngine> VeaSpace<E, SystemClock> {
    /// Formats a fresh device and loads it, using the OS monotonic clock.
    pub fn format(
        engine: &mut E,
        config: VeaConfig,
        header_blocks: u32,
        capacity: u64,
        hint_stream_count: usize,
        force: bool,
    ) -> Result<Self, VeaError<E::Error>> {
        Self::format_with_clock(engine, config, header_blocks, capacity, hint_stream_count, force, SystemClock)
    }

    /// Loads an already-formatted device, using the OS monotonic clock.
    pub fn load(engine: &E, config: VeaConfig) -> Result<Self, VeaError<E::Error>> {
        Self::load_with_clock(engine, config, SystemClock)
    }
}

impl<E: HostTxEngine, C: Clock> VeaSpace<E, C> {
    pub fn format_with_clock(
        engine: &mut E,
        config: VeaConfig,
        header_blocks: u32,
        capacity: u64,
        hint_stream_count: usize,
        force: bool,
        clock: C,
    ) -> Result<Self, VeaError<E::Error>> {
        let descriptor =
            PersistentDescriptor::format(engine, config.block_size, header_blocks, capacity, hint_stream_count, force)?;
        Ok(Self::from_descriptor(descriptor, config, clock))
    }

    pub fn load_with_clock(engine: &E, config: VeaConfig, clock: C) -> Result<Self, VeaError<E::Error>> {
        let descriptor = PersistentDescriptor::load(engine)?;
        Ok(Self::from_descriptor(descriptor, config, clock))
    }

    fn from_descriptor(descriptor: PersistentDescriptor<E>, config: VeaConfig, clock: C) -> Self {
        let hints = (0..descriptor.hint_count())
            .map(|i| HintContext::hint_load(i, descriptor.hint(i)))
            .collect();
        let transient = TransientFreeMap::from_persistent(descriptor.free_set().clone());
        Self {
            descriptor,
            transient,
            hints,
            config,
            clock,
            metrics: Metrics::new(),
            unmap: None,
        }
    }

    /// Idempotent; drops in-memory state without touching the descriptor.
    pub fn unload(self) {}

    pub fn set_unmap_callback(&mut self, cb: UnmapCallback<E>) {
        self.unmap = Some(cb);
    }

    pub fn config(&self) -> &VeaConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn capacity_blocks(&self) -> u64 {
        self.descriptor.capacity_blocks()
    }

    pub fn header_blocks(&self) -> u32 {
        self.descriptor.header_blocks()
    }

    /// Read-only view of the persistent free set (A), for diagnostics and
    /// the invariant checks property tests run against it directly.
    pub fn free_persistent(&self) -> &crate::free_index::FreeExtentIndex {
        self.descriptor.free_set()
    }

    /// Read-only view of the in-memory free-transient set (B).
    pub fn free_transient(&self) -> &crate::free_index::FreeExtentIndex {
        self.transient.free_transient()
    }

    pub fn hint(&self, index: usize) -> &HintContext {
        &self.hints[index]
    }

    /// Loads (or re-exposes) the persistent hint record for `index` as a
    /// usable context. Spec §4.4's `hint_load`; here a context already
    /// exists for every stream slot sized at `format` time, so this just
    /// returns its index for use with `reserve`.
    pub fn hint_load(&self, index: usize) -> usize {
        assert!(index < self.hints.len(), "hint stream index out of range");
        index
    }

    pub fn hint_unload(&self, _index: usize) {}

    /// Component C: `reserve(space, block_count, hint_ctx, reservation_list)`.
    ///
    /// Takes `engine` because an opportunistic [`Self::migrate_aging`] must
    /// run inside a host transaction when the transient free set has been
    /// exhausted (spec §4.5); the abstract spec elides this plumbing.
    pub fn reserve(
        &mut self,
        engine: &mut E,
        block_count: u32,
        hint_index: Option<usize>,
        list: &mut ReservationList,
    ) -> Result<(), VeaError<E::Error>> {
        if block_count == 0 {
            return Err(VeaError::Invalid("block_count must be greater than zero"));
        }
        if block_count > self.config.max_extent_blocks {
            return Err(VeaError::TooLarge {
                requested: block_count,
                max: self.config.max_extent_blocks,
            });
        }

        if self.transient.free_transient().is_empty() {
            let now = self.clock.now();
            self.migrate_aging(engine, now)?;
        }
        if self.transient.free_transient().is_empty() {
            self.metrics.reserve_failures += 1;
            return Err(VeaError::NoSpace { requested: block_count });
        }

        if let Some(idx) = hint_index {
            self.metrics.reserve_hint_attempts += 1;
            if self.try_hint_path(idx, block_count, list) {
                self.metrics.reserve_hint_hits += 1;
                self.metrics.blocks_reserved += block_count as u64;
                return Ok(());
            }
        }

        if block_count >= self.config.large_threshold {
            self.metrics.reserve_large_attempts += 1;
            let largest = self.transient.free_transient().largest();
            let chosen = match largest {
                Some(extent) if extent.length >= block_count => extent,
                _ => {
                    self.metrics.reserve_failures += 1;
                    return Err(VeaError::NoSpace { requested: block_count });
                }
            };
            self.metrics.reserve_large_hits += 1;
            return self.commit_reservation(chosen.offset, block_count, hint_index, list);
        }

        self.metrics.reserve_best_fit_attempts += 1;
        let chosen = self.transient.free_transient().best_fit(block_count);
        let chosen = match chosen {
            Some(extent) => extent,
            None => {
                self.metrics.reserve_failures += 1;
                return Err(VeaError::NoSpace { requested: block_count });
            }
        };
        self.metrics.reserve_best_fit_hits += 1;
        self.commit_reservation(chosen.offset, block_count, hint_index, list)
    }

    /// Strategy 1 (spec §4.3). Returns `true` only on a genuine hint hit;
    /// on a miss it invalidates the context (abandoning the streak) and
    /// returns `false` so `reserve` falls through to the next strategy.
    fn try_hint_path(&mut self, idx: usize, block_count: u32, list: &mut ReservationList) -> bool {
        let Some(predicted) = self.hints[idx].next_offset() else {
            return false;
        };
        let hits = self
            .transient
            .free_transient()
            .extent_containing(predicted)
            .is_some_and(|e| e.offset == predicted && e.length >= block_count);

        if !hits {
            self.hints[idx].invalidate();
            return false;
        }

        let (hint_offset_before, hint_sequence_before) = self.hints[idx].snapshot();
        self.transient.take(predicted, block_count).expect("hint extent was just verified");
        self.hints[idx].record_reservation(predicted, block_count);
        list.push(ReservationEntry {
            offset: predicted,
            length: block_count,
            hint_index: Some(idx),
            hint_offset_before,
            hint_sequence_before,
        });
        true
    }

    fn commit_reservation(
        &mut self,
        offset: u64,
        length: u32,
        hint_index: Option<usize>,
        list: &mut ReservationList,
    ) -> Result<(), VeaError<E::Error>> {
        self.transient.take(offset, length).expect("chosen extent was just observed free");
        let (hint_offset_before, hint_sequence_before) = match hint_index {
            Some(idx) => {
                let snap = self.hints[idx].snapshot();
                self.hints[idx].record_reservation(offset, length);
                snap
            }
            None => (None, 0),
        };
        list.push(ReservationEntry {
            offset,
            length,
            hint_index,
            hint_offset_before,
            hint_sequence_before,
        });
        self.metrics.blocks_reserved += length as u64;
        Ok(())
    }

    /// Component E: `tx_publish`. Must be called with `engine` already
    /// begun by the caller's own surrounding transaction per spec §4.5 —
    /// here `engine` wraps its own `begin`/`commit`/`abort` around the
    /// whole list since `vea-core` owns no transaction of its own beyond
    /// this call.
    pub fn tx_publish(&mut self, engine: &mut E, list: &mut ReservationList) -> Result<(), VeaError<E::Error>> {
        for entry in list.iter() {
            if !self.transient.is_reserved(entry.offset, entry.length) {
                return Err(VeaError::Invalid("reservation entry is not currently reserved"));
            }
        }
        let entries: Vec<ReservationEntry> = list.iter().copied().collect();

        engine.begin().map_err(VeaError::HostTxFailure)?;
        let snapshot = self.descriptor.snapshot_state();
        let result = self.publish_all(engine, &entries);
        match result {
            Ok(()) => {
                engine.commit().map_err(VeaError::HostTxFailure)?;
                // (B) and the list are only touched once every entry has
                // durably published; a mid-list failure above leaves both
                // untouched so the caller can still cancel the whole list.
                list.drain().for_each(drop);
                for entry in &entries {
                    self.transient
                        .drop_reserved(entry.offset, entry.length)
                        .expect("entry was reserved at the top of tx_publish and untouched since");
                    self.metrics.blocks_published += entry.length as u64;
                }
                Ok(())
            }
            Err(e) => {
                self.descriptor.restore_state(snapshot);
                let _ = engine.abort();
                Err(e)
            }
        }
    }

    /// Publishes every entry against (A) only; (B) is left alone until the
    /// whole batch is known to have committed durably (see `tx_publish`).
    fn publish_all(&mut self, engine: &mut E, entries: &[ReservationEntry]) -> Result<(), VeaError<E::Error>> {
        for entry in entries {
            let (hint_index, new_hint) = match entry.hint_index {
                Some(idx) => (Some(idx), Some(self.hints[idx].to_record())),
                None => (None, None),
            };
            self.descriptor.publish_extent(engine, entry.extent(), hint_index, new_hint)?;
        }
        Ok(())
    }

    /// Component E: `cancel`. No host transaction needed; reverts (B) and
    /// every touched hint context, freeing the list's entries.
    pub fn cancel(&mut self, list: &mut ReservationList) -> Result<(), VeaError<E::Error>> {
        let entries: Vec<ReservationEntry> = list.drain().collect();
        for entry in entries {
            let (_, did_merge) = self
                .transient
                .untake_into_free(entry.offset, entry.length)
                .ok_or(VeaError::Invalid("reservation entry is not currently reserved"))?;
            if did_merge {
                self.metrics.coalesce_events += 1;
            }
            if let Some(idx) = entry.hint_index {
                self.hints[idx].revert_on_cancel(
                    entry.offset,
                    entry.length,
                    entry.hint_offset_before,
                    entry.hint_sequence_before,
                );
            }
            self.metrics.blocks_cancelled += entry.length as u64;
        }
        Ok(())
    }

    /// Component E: `free`. The caller asserts `[offset, offset+length)`
    /// was previously published and is not visible in any of VEA's own
    /// sets; it enters `aging` and cannot be reserved until the aging
    /// window elapses.
    pub fn free(&mut self, offset: u64, length: u32) -> Result<(), VeaError<E::Error>> {
        if length == 0 {
            return Err(VeaError::Invalid("free length must be greater than zero"));
        }
        self.transient
            .free_to_aging(offset, length, self.clock.now())
            .map_err(VeaError::Invalid)?;
        self.metrics.blocks_freed += length as u64;
        Ok(())
    }

    /// Component B/E: promotes every aging extent at least
    /// `config.aging_window` old into the transient free set and into the
    /// persistent descriptor, inside one host transaction. Also reachable
    /// directly (spec §12) for hosts that run a periodic sweep instead of
    /// relying purely on `reserve`'s opportunistic trigger.
    pub fn migrate_aging(&mut self, engine: &mut E, now: std::time::Instant) -> Result<usize, VeaError<E::Error>> {
        let (migrated, coalesce_events) = self.transient.migrate_aging(now, self.config.aging_window);
        if migrated.is_empty() {
            return Ok(0);
        }
        self.metrics.coalesce_events += coalesce_events;

        engine.begin().map_err(VeaError::HostTxFailure)?;
        let snapshot = self.descriptor.snapshot_state();
        let result = self.descriptor.migrate_in(engine, &migrated);
        match result {
            Ok(()) => {
                engine.commit().map_err(VeaError::HostTxFailure)?;
            }
            Err(e) => {
                self.descriptor.restore_state(snapshot);
                let _ = engine.abort();
                return Err(e);
            }
        }

        if let Some(unmap) = self.unmap.as_mut() {
            for extent in &migrated {
                if unmap(extent.offset, extent.length).is_err() {
                    self.metrics.unmap_failures += 1;
                }
            }
        }

        self.metrics.aging_migrations += 1;
        self.metrics.blocks_migrated += migrated.iter().map(|e| e.length as u64).sum::<u64>();
        Ok(migrated.len())
    }

    /// Component F: `verify_alloc`.
    pub fn verify_alloc(&self, view: FreeView, offset: u64, length: u32) -> Result<AllocState, VeaError<E::Error>> {
        if length == 0 {
            return Err(VeaError::Invalid("verify_alloc length must be greater than zero"));
        }
        let end = offset
            .checked_add(length as u64)
            .ok_or(VeaError::Invalid("range overflows the address space"))?;
        if end > self.descriptor.capacity_blocks() {
            return Err(VeaError::Invalid("range extends past device capacity"));
        }
        let candidate = Extent::new(offset, length);
        let free = match view {
            FreeView::Transient => self.transient.free_transient(),
            FreeView::Persistent => self.descriptor.free_set(),
        };
        let present = free.extent_containing(offset).is_some_and(|e| e.contains_range(offset, length));
        if !present && free.iter().any(|e| e.overlaps(&candidate)) {
            return Err(VeaError::Invalid("range straddles a free extent boundary"));
        }
        Ok(if present { AllocState::Free } else { AllocState::Allocated })
    }

    /// Component F: `dump`, a human-readable listing of one view's free set.
    pub fn dump(&self, view: FreeView) -> String {
        let free = match view {
            FreeView::Transient => self.transient.free_transient(),
            FreeView::Persistent => self.descriptor.free_set(),
        };
        let label = match view {
            FreeView::Transient => "transient",
            FreeView::Persistent => "persistent",
        };
        let mut out = format!("{label} free set ({} extents, {} blocks):\n", free.len(), free.total_blocks());
        for extent in free.iter() {
            out.push_str(&format!("  {extent}\n"));
        }
        out
    }
}
