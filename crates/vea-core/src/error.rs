//! Error taxonomy for the allocator (spec §7).

use thiserror::Error;

/// Errors produced by `vea-core` operations.
///
/// Every variant either leaves the affected state unchanged or (for
/// `HostTxFailure` during `tx_publish`/`migrate_aging`) is resolved by the
/// host transaction engine's own rollback — see the module docs on
/// [`crate::space::VeaSpace::tx_publish`].
#[derive(Debug, Error)]
pub enum VeaError<E = std::convert::Infallible> {
    /// No free extent large enough satisfies the reservation.
    #[error("no free extent large enough for {requested} blocks")]
    NoSpace { requested: u32 },

    /// Request exceeds `max_extent_blocks`.
    #[error("requested {requested} blocks exceeds the per-reservation cap of {max}")]
    TooLarge { requested: u32, max: u32 },

    /// `format` was called on an already-initialised descriptor without `force`.
    #[error("descriptor is already formatted (pass force=true to discard it)")]
    AlreadyFormatted,

    /// Invalid block size, capacity, or header-blocks combination.
    #[error("bad geometry: {0}")]
    BadGeometry(&'static str),

    /// A persistent invariant was violated while loading the descriptor.
    #[error("persistent descriptor is corrupt: {0}")]
    Corruption(String),

    /// Caller-supplied offset/length is not currently allocated, or is out of range.
    #[error("invalid range: {0}")]
    Invalid(&'static str),

    /// Propagated from the host transaction engine during publish or migration.
    #[error("host transaction failed")]
    HostTxFailure(#[source] E),
}

impl<E> VeaError<E> {
    /// Maps the wrapped host-engine error type, e.g. to erase it behind `Box<dyn Error>`.
    pub fn map_host_err<F, E2>(self, f: F) -> VeaError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::NoSpace { requested } => VeaError::NoSpace { requested },
            Self::TooLarge { requested, max } => VeaError::TooLarge { requested, max },
            Self::AlreadyFormatted => VeaError::AlreadyFormatted,
            Self::BadGeometry(s) => VeaError::BadGeometry(s),
            Self::Corruption(s) => VeaError::Corruption(s),
            Self::Invalid(s) => VeaError::Invalid(s),
            Self::HostTxFailure(e) => VeaError::HostTxFailure(f(e)),
        }
    }
}

pub type VeaResult<T, E = std::convert::Infallible> = Result<T, VeaError<E>>;
