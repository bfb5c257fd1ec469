//! Bit-stable persistent records (spec §6).
//!
//! These are encoded with `bincode`'s fixed-width little-endian
//! configuration rather than its varint default, since the spec requires a
//! stable on-disk byte layout, not merely a stable Rust type. `vea-store`
//! additionally frames each encoded cell with a `crc32fast` checksum so
//! `load` can report bit-rot as [`crate::error::VeaError::Corruption`]
//! instead of misreading garbage as a wild (but structurally valid) extent.

use serde::{Deserialize, Serialize};

/// `"VEA1"` as big-endian bytes, stored little-endian per spec §6.
pub const MAGIC: u32 = 0x5645_4131;
pub const COMPAT_VERSION: u16 = 1;

/// Returns the bincode configuration used for every persistent record:
/// fixed-width integers, little-endian byte order.
pub fn codec() -> impl bincode::Options {
    use bincode::Options;
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    use bincode::Options;
    codec().serialize(value).expect("persistent record encoding is infallible")
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, bincode::Error> {
    use bincode::Options;
    codec().deserialize(bytes)
}

/// The space descriptor's root record.
///
/// `by_offset_root` / `by_size_root` are vestigial in this implementation
/// (see `DESIGN.md`): rather than two independent persistent B-trees, the
/// free sets are persisted as one encoded snapshot referenced by
/// `snapshot_root`, and these two fields are kept, zeroed, purely so the
/// struct's on-disk shape matches spec §6 byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct SpaceDescriptorCell {
    pub magic: u32,
    pub compat_version: u16,
    pub block_size: u32,
    pub header_blocks: u32,
    pub capacity_blocks: u64,
    pub by_offset_root: u64,
    pub by_size_root: u64,
    pub hint_array_root: u64,
    pub publish_generation: u64,
    pub reserved: [u8; 32],
}

impl SpaceDescriptorCell {
    pub fn reserved_is_zero(&self) -> bool {
        self.reserved == [0u8; 32]
    }
}

/// One free-extent record, as stored in the persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct FreeExtentRecord {
    pub offset: u64,
    pub length: u32,
    pub flags: u32,
}

/// One per-stream hint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct HintRecord {
    pub last_offset: u64,
    pub sequence: u64,
    pub reserved: [u8; 16],
}

impl HintRecord {
    pub const INVALID_OFFSET: u64 = u64::MAX;

    pub fn invalid() -> Self {
        Self {
            last_offset: Self::INVALID_OFFSET,
            sequence: 0,
            reserved: [0u8; 16],
        }
    }
}

/// The full persisted snapshot of the free-extent set: header plus every
/// free extent, in offset order. See the `snapshot_root` note above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSetSnapshot {
    pub extents: Vec<FreeExtentRecord>,
}

/// Every stream's hint record, indexed by stream id. Persisted as one cell
/// (referenced by `hint_array_root`) rather than one cell per stream, for
/// the same reason `FreeSetSnapshot` collapses the two B-tree roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HintArraySnapshot {
    pub hints: Vec<HintRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips() {
        let cell = SpaceDescriptorCell {
            magic: MAGIC,
            compat_version: COMPAT_VERSION,
            block_size: 4096,
            header_blocks: 1,
            capacity_blocks: 1 << 20,
            by_offset_root: 0,
            by_size_root: 0,
            hint_array_root: 7,
            publish_generation: 42,
            reserved: [0u8; 32],
        };
        let bytes = encode(&cell);
        let back: SpaceDescriptorCell = decode(&bytes).unwrap();
        assert_eq!(cell, back);
    }

    #[test]
    fn snapshot_round_trips() {
        let snap = FreeSetSnapshot {
            extents: vec![
                FreeExtentRecord { offset: 0, length: 10, flags: 0 },
                FreeExtentRecord { offset: 20, length: 30, flags: 0 },
            ],
        };
        let bytes = encode(&snap);
        let back: FreeSetSnapshot = decode(&bytes).unwrap();
        assert_eq!(snap, back);
    }
}
