//! The capability the host storage stack supplies to make allocator
//! mutations crash-consistent (spec §4.5, design notes §9).
//!
//! `vea-core` never talks to persistent memory directly; it only ever
//! mutates the persistent descriptor (component A) through an engine
//! implementing this trait. `crates/vea-store` ships a reference, in-process
//! implementation for tests and for hosts that don't yet have a real PMEM
//! transaction engine wired up.

/// A crash-consistency primitive supplied by the host.
///
/// Cells are opaque, host-assigned storage slots; `vea-core` only ever reads
/// and writes whole cells as byte blobs it has already encoded (see
/// `descriptor::layout`). The trait mirrors the five primitives design notes
/// §9 calls out: `begin`, `commit`, `abort`, `allocate_cell`/`free_cell`, and
/// `add_range_to_tx`.
pub trait HostTxEngine {
    /// Opaque identifier for a persistent cell. Stored inside the space
    /// descriptor's root record (as `by_offset_root` etc.) so it must round-
    /// trip through `u64`.
    type CellId: Copy + Eq + std::fmt::Debug + Into<u64> + From<u64>;
    /// The engine's own error type, wrapped by [`crate::error::VeaError::HostTxFailure`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens a transaction. All `allocate_cell`/`free_cell`/`add_range_to_tx`
    /// calls until the matching `commit`/`abort` belong to it.
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Durably applies every change made since `begin`.
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Discards every change made since `begin`; as if they never happened.
    fn abort(&mut self) -> Result<(), Self::Error>;

    /// Allocates a new persistent cell holding `bytes`, returning its id.
    /// Visible only after `commit`.
    fn allocate_cell(&mut self, bytes: &[u8]) -> Result<Self::CellId, Self::Error>;

    /// Marks `id` for release; the slot becomes reusable only after `commit`.
    fn free_cell(&mut self, id: Self::CellId) -> Result<(), Self::Error>;

    /// Adds an update to `id`'s contents to the transaction's write set.
    fn add_range_to_tx(&mut self, id: Self::CellId, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads a cell's current committed contents (outside any transaction).
    fn read_cell(&self, id: Self::CellId) -> Result<Vec<u8>, Self::Error>;

    /// Whether `id` currently names a committed, live cell. Used by `format`
    /// to distinguish "never formatted" from a real read failure.
    fn cell_exists(&self, id: Self::CellId) -> bool;
}

/// The well-known cell id the space descriptor's root record lives at.
/// Every `HostTxEngine` implementation must treat this id as pre-reserved.
pub const ROOT_CELL_INDEX: u64 = 0;

/// A minimal in-memory `HostTxEngine`, used by `vea-core`'s own unit tests.
/// `vea-store` is the real reference implementation; this one only needs to
/// be correct, not durable.
#[cfg(test)]
pub(crate) mod tests_support {
    use super::HostTxEngine;
    use std::collections::HashMap;
    use thiserror::Error;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemCellId(u64);

    impl From<MemCellId> for u64 {
        fn from(id: MemCellId) -> u64 {
            id.0
        }
    }

    impl From<u64> for MemCellId {
        fn from(raw: u64) -> Self {
            MemCellId(raw)
        }
    }

    #[derive(Debug, Error)]
    pub enum MemTxError {
        #[error("cell {0:?} does not exist")]
        NoSuchCell(MemCellId),
        #[error("no transaction is open")]
        NoTransaction,
    }

    #[derive(Debug, Default, Clone)]
    enum Slot {
        #[default]
        Free,
        Occupied(Vec<u8>),
    }

    /// A simple staged-write transaction: `begin` snapshots nothing (cells
    /// are only ever touched through this engine while a transaction is
    /// open in practice), `allocate_cell`/`add_range_to_tx`/`free_cell`
    /// stage into `pending`, and `commit` applies it all at once while
    /// `abort` just drops it.
    #[derive(Debug, Default)]
    pub struct MemTxEngine {
        cells: HashMap<u64, Slot>,
        next_id: u64,
        in_tx: bool,
        pending: Vec<(u64, Slot)>,
        pending_next_id: u64,
    }

    impl MemTxEngine {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl HostTxEngine for MemTxEngine {
        type CellId = MemCellId;
        type Error = MemTxError;

        fn begin(&mut self) -> Result<(), Self::Error> {
            self.in_tx = true;
            self.pending.clear();
            self.pending_next_id = self.next_id;
            Ok(())
        }

        fn commit(&mut self) -> Result<(), Self::Error> {
            if !self.in_tx {
                return Err(MemTxError::NoTransaction);
            }
            for (id, slot) in self.pending.drain(..) {
                self.cells.insert(id, slot);
            }
            self.next_id = self.pending_next_id;
            self.in_tx = false;
            Ok(())
        }

        fn abort(&mut self) -> Result<(), Self::Error> {
            if !self.in_tx {
                return Err(MemTxError::NoTransaction);
            }
            self.pending.clear();
            self.in_tx = false;
            Ok(())
        }

        fn allocate_cell(&mut self, bytes: &[u8]) -> Result<Self::CellId, Self::Error> {
            let id = self.pending_next_id;
            self.pending_next_id += 1;
            self.pending.push((id, Slot::Occupied(bytes.to_vec())));
            Ok(MemCellId(id))
        }

        fn free_cell(&mut self, id: Self::CellId) -> Result<(), Self::Error> {
            self.pending.push((id.0, Slot::Free));
            Ok(())
        }

        fn add_range_to_tx(&mut self, id: Self::CellId, bytes: &[u8]) -> Result<(), Self::Error> {
            let exists_committed = self.cell_exists(id);
            let exists_pending = self.pending.iter().any(|(pid, slot)| *pid == id.0 && matches!(slot, Slot::Occupied(_)));
            if !exists_committed && !exists_pending {
                return Err(MemTxError::NoSuchCell(id));
            }
            self.pending.push((id.0, Slot::Occupied(bytes.to_vec())));
            Ok(())
        }

        fn read_cell(&self, id: Self::CellId) -> Result<Vec<u8>, Self::Error> {
            match self.cells.get(&id.0) {
                Some(Slot::Occupied(bytes)) => Ok(bytes.clone()),
                _ => Err(MemTxError::NoSuchCell(id)),
            }
        }

        fn cell_exists(&self, id: Self::CellId) -> bool {
            matches!(self.cells.get(&id.0), Some(Slot::Occupied(_)))
        }
    }
}
