//! Component B: the in-memory mirror of the persistent free set, plus the
//! two sets that only ever exist transiently — `reserved` and `aging`
//! (spec §3, §4.2).
//!
//! `free_transient` is reconstructed from the persistent descriptor at
//! `load` and coalesces like any free set. `reserved` and `aging` are
//! pure run-time bookkeeping: neither is ever persisted directly (aging
//! extents re-enter the persistent free set only once they migrate out).

use crate::extent::Extent;
use crate::free_index::FreeExtentIndex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The in-memory working state a `VeaSpace` mutates on every `reserve`,
/// `cancel`, and `free`.
#[derive(Debug)]
pub struct TransientFreeMap {
    free_transient: FreeExtentIndex,
    reserved: BTreeMap<u64, u32>,
    aging: BTreeMap<u64, (u32, Instant)>,
}

impl TransientFreeMap {
    /// Seeds the transient map from the free set just reconstructed from
    /// the persistent descriptor. `reserved` and `aging` always start empty
    /// — neither survives a reload.
    pub fn from_persistent(free_transient: FreeExtentIndex) -> Self {
        Self {
            free_transient,
            reserved: BTreeMap::new(),
            aging: BTreeMap::new(),
        }
    }

    pub fn free_transient(&self) -> &FreeExtentIndex {
        &self.free_transient
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    pub fn aging_count(&self) -> usize {
        self.aging.len()
    }

    pub fn is_reserved(&self, offset: u64, length: u32) -> bool {
        self.reserved.get(&offset) == Some(&length)
    }

    pub fn is_aging(&self, offset: u64, length: u32) -> bool {
        matches!(self.aging.get(&offset), Some(&(len, _)) if len == length)
    }

    /// Removes `[offset, offset+length)` from `free_transient` into
    /// `reserved`. The region must lie entirely inside one free-transient
    /// extent (internal contract of spec §4.2).
    pub fn take(&mut self, offset: u64, length: u32) -> Option<()> {
        self.free_transient.take(offset, length)?;
        self.reserved.insert(offset, length);
        Some(())
    }

    /// Moves a previously `take`n region straight from `reserved` back into
    /// `free_transient`, coalescing with neighbours (spec §4.5 `cancel`).
    /// Returns `None` if the region was not actually reserved, else the
    /// resulting extent and whether it merged with a neighbour.
    pub fn untake_into_free(&mut self, offset: u64, length: u32) -> Option<(Extent, bool)> {
        let reserved_len = self.reserved.remove(&offset)?;
        if reserved_len != length {
            self.reserved.insert(offset, reserved_len);
            return None;
        }
        Some(self.free_transient.give_coalescing(offset, length))
    }

    /// Removes a `reserved` region without returning it anywhere (spec §4.5
    /// `tx_publish`, step 4: "Does not return it to free-transient.").
    pub fn drop_reserved(&mut self, offset: u64, length: u32) -> Option<()> {
        let reserved_len = self.reserved.remove(&offset)?;
        if reserved_len != length {
            self.reserved.insert(offset, reserved_len);
            return None;
        }
        Some(())
    }

    /// Inserts a freed extent into `aging`, never coalescing (spec §4.2, so
    /// each entry keeps its own age). Fails if the range currently overlaps
    /// anything VEA already considers unallocated — a double-free or a
    /// partially-allocated range, which spec §9's open question rules out of
    /// scope for the caller to attempt.
    pub fn free_to_aging(&mut self, offset: u64, length: u32, now: Instant) -> Result<(), &'static str> {
        let candidate = Extent::new(offset, length);
        if self.free_transient.iter().any(|e| e.overlaps(&candidate)) {
            return Err("range overlaps a free-transient extent");
        }
        if self.reserved.range(..candidate.end()).next_back().is_some_and(|(&o, &l)| Extent::new(o, l).overlaps(&candidate)) {
            return Err("range overlaps a reserved extent");
        }
        if self
            .aging
            .range(..candidate.end())
            .any(|(&o, &(l, _))| Extent::new(o, l).overlaps(&candidate))
        {
            return Err("range overlaps an already-aging extent");
        }
        self.aging.insert(offset, (length, now));
        Ok(())
    }

    /// Promotes every `aging` entry at least `aging_window` old into
    /// `free_transient`, coalescing. Returns the migrated extents (in their
    /// pre-coalesce, as-freed form) so the caller can migrate them into the
    /// persistent descriptor and invoke the unmap callback, plus how many of
    /// them actually merged with a neighbour on the way in.
    pub fn migrate_aging(&mut self, now: Instant, aging_window: Duration) -> (Vec<Extent>, u64) {
        let expired: Vec<u64> = self
            .aging
            .iter()
            .filter(|&(_, &(_, freed_at))| now.saturating_duration_since(freed_at) >= aging_window)
            .map(|(&offset, _)| offset)
            .collect();

        let mut migrated = Vec::with_capacity(expired.len());
        let mut coalesce_events = 0u64;
        for offset in expired {
            let (length, _) = self.aging.remove(&offset).expect("offset came from this map's own iteration");
            let (_, did_merge) = self.free_transient.give_coalescing(offset, length);
            if did_merge {
                coalesce_events += 1;
            }
            migrated.push(Extent::new(offset, length));
        }
        (migrated, coalesce_events)
    }
}
