use std::collections::HashMap;
use thiserror::Error;
use vea_core::HostTxEngine;

/// Opaque cell identifier handed back by [`CellArenaEngine::allocate_cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl From<CellId> for u64 {
    fn from(id: CellId) -> u64 {
        id.0
    }
}

impl From<u64> for CellId {
    fn from(raw: u64) -> Self {
        CellId(raw)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cell {0:?} does not exist")]
    NoSuchCell(CellId),
    #[error("no transaction is open")]
    NoTransaction,
    #[error("cell {0:?} failed its checksum on read")]
    ChecksumMismatch(CellId),
}

#[derive(Debug, Default, Clone)]
enum Slot {
    #[default]
    Free,
    Occupied(Vec<u8>),
}

fn frame(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    let crc = hasher.finalize();
    let mut framed = Vec::with_capacity(bytes.len() + 4);
    framed.extend_from_slice(bytes);
    framed.extend_from_slice(&crc.to_le_bytes());
    framed
}

fn unframe(id: CellId, framed: &[u8]) -> Result<Vec<u8>, StoreError> {
    if framed.len() < 4 {
        return Err(StoreError::ChecksumMismatch(id));
    }
    let (payload, crc_bytes) = framed.split_at(framed.len() - 4);
    let stored = u32::from_le_bytes(crc_bytes.try_into().expect("split_at(len-4) always leaves 4 bytes"));
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != stored {
        return Err(StoreError::ChecksumMismatch(id));
    }
    Ok(payload.to_vec())
}

/// An in-process arena of CRC-framed persistent cells, staged through a
/// single open transaction at a time — `begin` opens a write-set, `commit`
/// applies it atomically, `abort` discards it.
#[derive(Debug, Default)]
pub struct CellArenaEngine {
    cells: HashMap<u64, Slot>,
    next_id: u64,
    in_tx: bool,
    pending: Vec<(u64, Slot)>,
    pending_next_id: u64,
}

impl CellArenaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corrupts a committed cell's stored bytes in place, for tests that
    /// exercise `load`'s checksum detection.
    pub fn corrupt_cell_for_test(&mut self, id: CellId) {
        if let Some(Slot::Occupied(bytes)) = self.cells.get_mut(&id.0) {
            if let Some(byte) = bytes.first_mut() {
                *byte ^= 0xff;
            }
        }
    }
}

impl HostTxEngine for CellArenaEngine {
    type CellId = CellId;
    type Error = StoreError;

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.in_tx = true;
        self.pending.clear();
        self.pending_next_id = self.next_id;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        if !self.in_tx {
            return Err(StoreError::NoTransaction);
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
            return Err(StoreError::NoTransaction);
        }
        self.pending.clear();
        self.in_tx = false;
        Ok(())
    }

    fn allocate_cell(&mut self, bytes: &[u8]) -> Result<Self::CellId, Self::Error> {
        let id = self.pending_next_id;
        self.pending_next_id += 1;
        self.pending.push((id, Slot::Occupied(frame(bytes))));
        Ok(CellId(id))
    }

    fn free_cell(&mut self, id: Self::CellId) -> Result<(), Self::Error> {
        self.pending.push((id.0, Slot::Free));
        Ok(())
    }

    fn add_range_to_tx(&mut self, id: Self::CellId, bytes: &[u8]) -> Result<(), Self::Error> {
        let exists_committed = self.cell_exists(id);
        let exists_pending = self.pending.iter().any(|(pid, slot)| *pid == id.0 && matches!(slot, Slot::Occupied(_)));
        if !exists_committed && !exists_pending {
            return Err(StoreError::NoSuchCell(id));
        }
        self.pending.push((id.0, Slot::Occupied(frame(bytes))));
        Ok(())
    }

    fn read_cell(&self, id: Self::CellId) -> Result<Vec<u8>, Self::Error> {
        match self.cells.get(&id.0) {
            Some(Slot::Occupied(framed)) => unframe(id, framed),
            _ => Err(StoreError::NoSuchCell(id)),
        }
    }

    fn cell_exists(&self, id: Self::CellId) -> bool {
        matches!(self.cells.get(&id.0), Some(Slot::Occupied(_)))
    }
}
