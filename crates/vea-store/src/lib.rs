//! vea-store - a reference `HostTxEngine` for `vea-core`
//!
//! An in-process arena of persistent cells, framed with a `crc32fast`
//! checksum so corrupted bytes are detected on read rather than silently
//! deserialized as a structurally valid (but wrong) record. Not meant for
//! production use against real persistent memory: a real host supplies its
//! own `HostTxEngine` wired to actual PMEM or a WAL-backed store. This
//! crate exists so `vea-core` can be exercised end-to-end in tests and so
//! integrators have a worked example of the trait's contract.

mod engine;

pub use engine::{CellArenaEngine, CellId, StoreError};
