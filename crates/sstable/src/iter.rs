//! The iterator capability shared by everything that can walk records in
//! comparator order.

use anyhow::Result;
use memtable::InternalKey;

/// Ordered walk over [`InternalKey`] records.
///
/// Stepping never fails directly: an IO or corruption error makes the
/// iterator invalid and is latched until [`status`](Self::status) collects
/// it, so loops stay a plain `while valid { .. next() }` and check the
/// status once at the end.
pub trait InternalIterator {
    /// Positions the iterator on the first record.
    fn seek_to_first(&mut self);

    /// Returns `true` while positioned on a record.
    fn valid(&self) -> bool;

    /// Advances to the next record; a no-op once invalid.
    fn next(&mut self);

    /// The record under the iterator, or `None` once exhausted or failed.
    fn internal_key(&self) -> Option<&InternalKey>;

    /// Takes the latched error, if stepping hit one. `Ok` means every record
    /// seen so far was read and verified cleanly.
    fn status(&mut self) -> Result<()>;
}
