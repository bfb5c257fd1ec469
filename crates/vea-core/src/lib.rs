//! vea-core - the Versioned Extent Allocator's free-space map
//!
//! Manages the free-space map of a raw block device backing a storage
//! pool: a persistent, crash-consistent descriptor of free extents, an
//! in-memory mirror used to satisfy reservations without touching storage
//! on every call, and the hint/publish/cancel/aging machinery that ties
//! them together.
//!
//! `vea-core` never talks to persistent memory or a clock directly — both
//! are capabilities the embedder supplies: a [`HostTxEngine`] for
//! crash-consistent mutation of the on-disk descriptor, and a [`Clock`]
//! for measuring the aging window. This keeps the crate deterministic and
//! unit-testable without any real device or timer.
//!
//! # Example
//!
//! This needs a concrete [`HostTxEngine`]; `vea-store` ships a reference
//! one (`CellArenaEngine`). Sketch, using that crate:
//!
//! ```ignore
//! use vea_core::{VeaConfig, VeaSpace, ReservationList};
//! use vea_store::CellArenaEngine;
//!
//! let mut engine = CellArenaEngine::new();
//! let config = VeaConfig::default();
//! let mut space = VeaSpace::format(&mut engine, config, 1, 1 << 20, 4, false).unwrap();
//!
//! let mut list = ReservationList::new();
//! space.reserve(&mut engine, 8, None, &mut list).unwrap();
//! space.tx_publish(&mut engine, &mut list).unwrap();
//! ```

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod extent;
pub mod free_index;
pub mod hint;
pub mod host_tx;
pub mod metrics;
pub mod reservation;
pub mod space;
pub mod transient;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::VeaConfig;
pub use error::{VeaError, VeaResult};
pub use extent::Extent;
pub use free_index::FreeExtentIndex;
pub use hint::HintContext;
pub use host_tx::HostTxEngine;
pub use metrics::Metrics;
pub use reservation::{ReservationEntry, ReservationList};
pub use space::{AllocState, FreeView, VeaSpace};
