//! Component D: per-stream sequential-placement oracle (spec §4.4).
//!
//! A `HintContext` is not thread-safe. Callers that share one I/O stream
//! across tasks must serialise their own access to it, same as the rest of
//! `vea-core`'s public surface (spec §5).

use crate::descriptor::layout::HintRecord;

/// Per-stream hint state, round-tripped through a persistent [`HintRecord`]
/// at `hint_load`/publish time.
#[derive(Debug, Clone, Copy)]
pub struct HintContext {
    index: usize,
    next_offset: Option<u64>,
    sequence: u64,
}

impl HintContext {
    /// Reconstructs a context from its persisted record. `index` is the
    /// stream's slot in the descriptor's hint array.
    pub fn hint_load(index: usize, record: HintRecord) -> Self {
        let next_offset = (record.last_offset != HintRecord::INVALID_OFFSET).then_some(record.last_offset);
        Self { index, next_offset, sequence: record.sequence }
    }

    /// Idempotent; a context carries no resources beyond its own fields.
    pub fn hint_unload(self) {}

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn next_offset(&self) -> Option<u64> {
        self.next_offset
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Snapshots the fields a reservation needs to remember in order to
    /// later revert this context on cancel (spec §4.4).
    pub(crate) fn snapshot(&self) -> (Option<u64>, u64) {
        (self.next_offset, self.sequence)
    }

    /// Called by the reservation engine after any successful `reserve`
    /// through this context, hint path or not.
    pub(crate) fn record_reservation(&mut self, offset: u64, length: u32) {
        self.next_offset = Some(offset + length as u64);
        self.sequence += 1;
    }

    /// Abandons the hint without bumping the sequence — used when the hint
    /// path was attempted but the predicted extent was stolen by another
    /// stream, so the *next* strategy's reservation must not look like it
    /// continued this stream's streak.
    pub(crate) fn invalidate(&mut self) {
        self.next_offset = None;
    }

    /// Reverts `next_offset` to the value recorded before a cancelled
    /// reservation, but only if nothing has happened to this context since
    /// (spec §4.4): the cancelled entry must be the most recent one, and the
    /// context must not have moved on. The sequence counter never reverts —
    /// it only ever advances, cancelled or not.
    pub(crate) fn revert_on_cancel(
        &mut self,
        entry_offset: u64,
        entry_length: u32,
        hint_offset_before: Option<u64>,
        hint_sequence_before: u64,
    ) {
        let is_latest = hint_sequence_before + 1 == self.sequence;
        let still_points_here = self.next_offset == Some(entry_offset + entry_length as u64);
        if is_latest && still_points_here {
            self.next_offset = hint_offset_before;
        }
    }

    /// Encodes current state as the persistent record written on publish.
    pub fn to_record(&self) -> HintRecord {
        HintRecord {
            last_offset: self.next_offset.unwrap_or(HintRecord::INVALID_OFFSET),
            sequence: self.sequence,
            reserved: [0u8; 16],
        }
    }
}
