//! Row readers.
//!
//! [`StreamReader`] pulls one logical line at a time from a [`Source`];
//! [`Table`](crate::Table) holds a fully parsed buffer. Both are walked
//! through the [`RowCursor`] protocol.

mod source;
mod stream;

pub use source::{ReadSeek, Source};
pub use stream::StreamReader;

use crate::error::Result;
use crate::row::Record;

/// Cursor over the records of a reader.
///
/// A fresh cursor is positioned on the first record.
pub trait RowCursor {
    /// The record under the cursor, `None` once past the end.
    fn current(&self) -> Option<&Record>;

    /// 0-based index of the current record among surfaced records.
    fn position(&self) -> usize;

    /// Move to the next record.
    fn advance(&mut self) -> Result<()>;

    /// Returns true while the cursor is on a record.
    fn is_valid(&self) -> bool {
        self.current().is_some()
    }

    /// Go back to the first record. A no-op for readers that cannot
    /// rewind; see [`RowCursor::is_rewindable`].
    fn rewind(&mut self) -> Result<()>;

    fn is_rewindable(&self) -> bool;
}
