//! Component A: the persistent space descriptor.
//!
//! Holds the on-disk root record and the free-extent set as it exists on
//! durable storage. Mutated only through a [`HostTxEngine`] transaction
//! (`format`, `tx_publish`, `migrate_aging`); never touched by `reserve` or
//! `cancel`, which operate purely on the transient mirror (component B).
//!
//! Spec §6 gives the root record three root-cell pointers
//! (`by_offset_root`, `by_size_root`, `hint_array_root`) because the
//! original stores each sorted set as its own persistent B-tree. This
//! implementation persists the free set as a single encoded snapshot
//! (`by_offset_root` names that cell; `by_size_root` is unused and kept
//! zeroed) and the per-stream hint records as a single encoded array
//! (`hint_array_root`) — see `DESIGN.md` for why reinventing a generic
//! persistent B-tree is out of scope here.

pub mod layout;

use crate::error::VeaError;
use crate::extent::Extent;
use crate::free_index::FreeExtentIndex;
use crate::host_tx::{HostTxEngine, ROOT_CELL_INDEX};
use layout::{
    FreeExtentRecord, FreeSetSnapshot, HintArraySnapshot, HintRecord, SpaceDescriptorCell, COMPAT_VERSION, MAGIC,
};

/// The persistent space descriptor, reconstructed at `load` time and kept
/// alive for the lifetime of a `VeaSpace`.
#[derive(Debug)]
pub struct PersistentDescriptor<E: HostTxEngine> {
    root_cell: E::CellId,
    snapshot_cell: E::CellId,
    hint_array_cell: E::CellId,
    pub block_size: u32,
    pub header_blocks: u32,
    pub capacity_blocks: u64,
    pub publish_generation: u64,
    free: FreeExtentIndex,
    hints: Vec<HintRecord>,
}

/// A point-in-time copy of the descriptor's in-memory mirror, see
/// [`PersistentDescriptor::snapshot_state`].
pub(crate) struct DescriptorState {
    free: FreeExtentIndex,
    hints: Vec<HintRecord>,
    publish_generation: u64,
}

impl<E: HostTxEngine> PersistentDescriptor<E> {
    pub fn free_set(&self) -> &FreeExtentIndex {
        &self.free
    }

    pub fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks
    }

    pub fn header_blocks(&self) -> u32 {
        self.header_blocks
    }

    pub fn hint(&self, index: usize) -> HintRecord {
        self.hints[index]
    }

    pub fn hint_count(&self) -> usize {
        self.hints.len()
    }

    /// Captures the in-memory mirror (free set, hint records, publish
    /// generation) so a multi-entry `tx_publish` can restore it if a later
    /// entry fails — the host transaction's own abort undoes the storage
    /// side, but undoing these Rust-side fields needs its own mechanism.
    pub(crate) fn snapshot_state(&self) -> DescriptorState {
        DescriptorState {
            free: self.free.clone(),
            hints: self.hints.clone(),
            publish_generation: self.publish_generation,
        }
    }

    pub(crate) fn restore_state(&mut self, state: DescriptorState) {
        self.free = state.free;
        self.hints = state.hints;
        self.publish_generation = state.publish_generation;
    }

    /// Initialises the descriptor with a single free extent
    /// `[header_blocks, capacity)` and `hint_stream_count` invalid hint
    /// records. Fails with `AlreadyFormatted` unless `force` is set and a
    /// descriptor already exists at the root cell.
    pub fn format(
        engine: &mut E,
        block_size: u32,
        header_blocks: u32,
        capacity: u64,
        hint_stream_count: usize,
        force: bool,
    ) -> Result<Self, VeaError<E::Error>> {
        if !block_size.is_power_of_two() {
            return Err(VeaError::BadGeometry("block_size must be a power of two"));
        }
        if header_blocks as u64 >= capacity {
            return Err(VeaError::BadGeometry("header_blocks must be less than capacity"));
        }
        if capacity - header_blocks as u64 > u32::MAX as u64 {
            return Err(VeaError::BadGeometry("capacity does not fit a 32-bit extent length"));
        }

        let root_id = E::CellId::from(ROOT_CELL_INDEX);
        let already_formatted = engine.cell_exists(root_id);
        if already_formatted && !force {
            return Err(VeaError::AlreadyFormatted);
        }

        engine.begin().map_err(VeaError::HostTxFailure)?;
        let result = Self::format_inner(engine, root_id, already_formatted, block_size, header_blocks, capacity, hint_stream_count);
        match result {
            Ok(descriptor) => {
                engine.commit().map_err(VeaError::HostTxFailure)?;
                Ok(descriptor)
            }
            Err(e) => {
                let _ = engine.abort();
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn format_inner(
        engine: &mut E,
        root_id: E::CellId,
        already_formatted: bool,
        block_size: u32,
        header_blocks: u32,
        capacity: u64,
        hint_stream_count: usize,
    ) -> Result<Self, VeaError<E::Error>> {
        // The root cell must be allocated before anything else so a fresh
        // engine's first-come-first-served ids hand it the well-known
        // `ROOT_CELL_INDEX`; its real contents are filled in once the
        // snapshot and hint-array cells it points to exist.
        if !already_formatted {
            let allocated = engine.allocate_cell(&[]).map_err(VeaError::HostTxFailure)?;
            debug_assert_eq!(allocated, root_id, "engine must honor the well-known root cell id");
        }

        let mut free = FreeExtentIndex::new();
        free.insert(header_blocks as u64, (capacity - header_blocks as u64) as u32);

        let snapshot_bytes = layout::encode(&free_set_snapshot(&free));
        let snapshot_id = engine.allocate_cell(&snapshot_bytes).map_err(VeaError::HostTxFailure)?;

        let hints = vec![HintRecord::invalid(); hint_stream_count];
        let hint_array_bytes = layout::encode(&HintArraySnapshot { hints: hints.clone() });
        let hint_array_id = engine.allocate_cell(&hint_array_bytes).map_err(VeaError::HostTxFailure)?;

        let cell = SpaceDescriptorCell {
            magic: MAGIC,
            compat_version: COMPAT_VERSION,
            block_size,
            header_blocks,
            capacity_blocks: capacity,
            by_offset_root: snapshot_id.into(),
            by_size_root: 0,
            hint_array_root: hint_array_id.into(),
            publish_generation: 0,
            reserved: [0u8; 32],
        };
        let cell_bytes = layout::encode(&cell);
        engine.add_range_to_tx(root_id, &cell_bytes).map_err(VeaError::HostTxFailure)?;

        Ok(Self {
            root_cell: root_id,
            snapshot_cell: snapshot_id,
            hint_array_cell: hint_array_id,
            block_size,
            header_blocks,
            capacity_blocks: capacity,
            publish_generation: 0,
            free,
            hints,
        })
    }

    /// Reconstructs the descriptor from durable storage, validating every
    /// persistent invariant. Any violation is reported as `Corruption`
    /// rather than silently repaired.
    pub fn load(engine: &E) -> Result<Self, VeaError<E::Error>> {
        let root_id = E::CellId::from(ROOT_CELL_INDEX);
        if !engine.cell_exists(root_id) {
            return Err(VeaError::Corruption("no space descriptor at the root cell".into()));
        }
        let bytes = engine.read_cell(root_id).map_err(VeaError::HostTxFailure)?;
        let cell: SpaceDescriptorCell =
            layout::decode(&bytes).map_err(|e| VeaError::Corruption(format!("root cell: {e}")))?;

        if cell.magic != MAGIC {
            return Err(VeaError::Corruption("bad magic".into()));
        }
        if cell.compat_version != COMPAT_VERSION {
            return Err(VeaError::Corruption(format!("unsupported compat_version {}", cell.compat_version)));
        }
        if !cell.reserved_is_zero() {
            return Err(VeaError::Corruption("reserved bytes must be zero".into()));
        }
        if !cell.block_size.is_power_of_two() {
            return Err(VeaError::Corruption("block_size is not a power of two".into()));
        }
        if cell.header_blocks as u64 >= cell.capacity_blocks {
            return Err(VeaError::Corruption("header_blocks >= capacity_blocks".into()));
        }

        let snapshot_id = E::CellId::from(cell.by_offset_root);
        let snap_bytes = engine.read_cell(snapshot_id).map_err(VeaError::HostTxFailure)?;
        let snapshot: FreeSetSnapshot =
            layout::decode(&snap_bytes).map_err(|e| VeaError::Corruption(format!("free set: {e}")))?;
        let free = rebuild_free_index(&snapshot, &cell)?;

        let hint_array_id = E::CellId::from(cell.hint_array_root);
        let hint_bytes = engine.read_cell(hint_array_id).map_err(VeaError::HostTxFailure)?;
        let hint_array: HintArraySnapshot =
            layout::decode(&hint_bytes).map_err(|e| VeaError::Corruption(format!("hint array: {e}")))?;

        Ok(Self {
            root_cell: root_id,
            snapshot_cell: snapshot_id,
            hint_array_cell: hint_array_id,
            block_size: cell.block_size,
            header_blocks: cell.header_blocks,
            capacity_blocks: cell.capacity_blocks,
            publish_generation: cell.publish_generation,
            free,
            hints: hint_array.hints,
        })
    }

    /// Idempotent release of in-memory state; never mutates persistent storage.
    pub fn unload(self) {}

    /// Removes `extent` from the persisted free set and, if `hint_index` is
    /// given, updates that stream's persisted hint record — all inside the
    /// caller's already-open transaction. Part of `tx_publish` (component E).
    pub fn publish_extent(
        &mut self,
        engine: &mut E,
        extent: Extent,
        hint_index: Option<usize>,
        new_hint: Option<HintRecord>,
    ) -> Result<(), VeaError<E::Error>> {
        self.free
            .take(extent.offset, extent.length)
            .ok_or_else(|| VeaError::Corruption(format!("publish target {extent} missing from persisted free set")))?;
        self.publish_generation += 1;
        if let (Some(idx), Some(record)) = (hint_index, new_hint) {
            self.hints[idx] = record;
        }
        self.write_snapshot(engine)?;
        self.write_hint_array(engine)?;
        self.write_root(engine)
    }

    /// Adds `extents` back to the persisted free set (migration, spec §4.2).
    pub fn migrate_in(&mut self, engine: &mut E, extents: &[Extent]) -> Result<(), VeaError<E::Error>> {
        for extent in extents {
            // The coalesce-events counter is driven off the transient side
            // (space.rs); this mirrors the same merge on (A) without double
            // counting it.
            let _ = self.free.give_coalescing(extent.offset, extent.length);
        }
        self.write_snapshot(engine)
    }

    fn write_snapshot(&mut self, engine: &mut E) -> Result<(), VeaError<E::Error>> {
        let bytes = layout::encode(&free_set_snapshot(&self.free));
        engine.add_range_to_tx(self.snapshot_cell, &bytes).map_err(VeaError::HostTxFailure)
    }

    fn write_hint_array(&mut self, engine: &mut E) -> Result<(), VeaError<E::Error>> {
        let bytes = layout::encode(&HintArraySnapshot { hints: self.hints.clone() });
        engine.add_range_to_tx(self.hint_array_cell, &bytes).map_err(VeaError::HostTxFailure)
    }

    fn write_root(&mut self, engine: &mut E) -> Result<(), VeaError<E::Error>> {
        let cell = SpaceDescriptorCell {
            magic: MAGIC,
            compat_version: COMPAT_VERSION,
            block_size: self.block_size,
            header_blocks: self.header_blocks,
            capacity_blocks: self.capacity_blocks,
            by_offset_root: self.snapshot_cell.into(),
            by_size_root: 0,
            hint_array_root: self.hint_array_cell.into(),
            publish_generation: self.publish_generation,
            reserved: [0u8; 32],
        };
        let bytes = layout::encode(&cell);
        engine.add_range_to_tx(self.root_cell, &bytes).map_err(VeaError::HostTxFailure)
    }
}

fn free_set_snapshot(free: &FreeExtentIndex) -> FreeSetSnapshot {
    FreeSetSnapshot {
        extents: free.iter().map(|e| FreeExtentRecord { offset: e.offset, length: e.length, flags: 0 }).collect(),
    }
}

fn rebuild_free_index<Err: std::error::Error + Send + Sync + 'static>(
    snapshot: &FreeSetSnapshot,
    cell: &SpaceDescriptorCell,
) -> Result<FreeExtentIndex, VeaError<Err>> {
    let mut free = FreeExtentIndex::new();
    let mut prev_end: Option<u64> = None;
    for record in &snapshot.extents {
        if record.flags != 0 {
            return Err(VeaError::Corruption("free extent record flags must be zero".into()));
        }
        if record.length == 0 {
            return Err(VeaError::Corruption("free extent record has zero length".into()));
        }
        if record.offset < cell.header_blocks as u64 {
            return Err(VeaError::Corruption("free extent overlaps the header region".into()));
        }
        let end = record.offset + record.length as u64;
        if end > cell.capacity_blocks {
            return Err(VeaError::Corruption("free extent extends past capacity".into()));
        }
        if let Some(prev_end) = prev_end {
            if record.offset < prev_end {
                return Err(VeaError::Corruption("free extents overlap".into()));
            }
            if record.offset == prev_end {
                return Err(VeaError::Corruption("adjacent free extents were not merged".into()));
            }
        }
        free.insert(record.offset, record.length);
        prev_end = Some(end);
    }
    Ok(free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_tx::tests_support::MemTxEngine;

    #[test]
    fn format_then_load_round_trips() {
        let mut engine = MemTxEngine::new();
        let descriptor = PersistentDescriptor::format(&mut engine, 4096, 1, 1000, 2, false).unwrap();
        assert_eq!(descriptor.free_set().len(), 1);
        assert_eq!(descriptor.free_set().get(1), Some(Extent::new(1, 999)));

        let loaded = PersistentDescriptor::load(&engine).unwrap();
        assert_eq!(loaded.free_set().len(), 1);
        assert_eq!(loaded.capacity_blocks, 1000);
        assert_eq!(loaded.hint(0).last_offset, HintRecord::INVALID_OFFSET);
    }

    #[test]
    fn reformat_without_force_fails() {
        let mut engine = MemTxEngine::new();
        PersistentDescriptor::format(&mut engine, 4096, 1, 1000, 0, false).unwrap();
        let err = PersistentDescriptor::format(&mut engine, 4096, 1, 1000, 0, false).unwrap_err();
        assert!(matches!(err, VeaError::AlreadyFormatted));
    }

    #[test]
    fn reformat_with_force_discards_prior_state() {
        let mut engine = MemTxEngine::new();
        PersistentDescriptor::format(&mut engine, 4096, 1, 1000, 0, false).unwrap();
        let descriptor = PersistentDescriptor::format(&mut engine, 4096, 2, 2000, 0, true).unwrap();
        assert_eq!(descriptor.capacity_blocks, 2000);
        assert_eq!(descriptor.header_blocks, 2);
    }

    #[test]
    fn publish_extent_splits_rather_than_dropping_the_enclosing_extent() {
        let mut engine = MemTxEngine::new();
        let mut descriptor = PersistentDescriptor::format(&mut engine, 4096, 1, 1000, 0, false).unwrap();
        assert_eq!(descriptor.free_set().total_blocks(), 999);

        engine.begin().unwrap();
        descriptor.publish_extent(&mut engine, Extent::new(1, 10), None, None).unwrap();
        engine.commit().unwrap();

        // The remaining 989 blocks must still be free, not vanish along with
        // the 10 just published.
        assert_eq!(descriptor.free_set().total_blocks(), 989);
        assert_eq!(descriptor.free_set().get(11), Some(Extent::new(11, 989)));

        // A second publish from the middle of that remainder must still find
        // its offset as a key in the persisted free set.
        engine.begin().unwrap();
        descriptor.publish_extent(&mut engine, Extent::new(11, 5), None, None).unwrap();
        engine.commit().unwrap();
        assert_eq!(descriptor.free_set().total_blocks(), 984);
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let mut engine = MemTxEngine::new();
        let err = PersistentDescriptor::format(&mut engine, 4095, 1, 1000, 0, false).unwrap_err();
        assert!(matches!(err, VeaError::BadGeometry(_)));

        let err = PersistentDescriptor::format(&mut engine, 4096, 1000, 1000, 0, false).unwrap_err();
        assert!(matches!(err, VeaError::BadGeometry(_)));
    }
}
