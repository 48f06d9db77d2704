use crate::{pagination::cursor::Cursor, records::row::RowData};

/// One page of a source's finite lazy row sequence (§3 RowBatch).
///
/// A stream of `RowBatch`es is not restartable: if a batch write fails the
/// table is abandoned (the pipeline records the failure and moves to the
/// next table), it is not resumed mid-stream.
#[derive(Debug, Clone)]
pub struct RowBatch {
    pub rows: Vec<RowData>,
    /// Cursor to resume from if the stream were to be reopened; also used by
    /// `readIncremental` to track the change-tracking watermark observed so far.
    pub next_cursor: Cursor,
    /// True once the source has confirmed there is no further data for this table.
    pub reached_end: bool,
}

impl RowBatch {
    pub fn empty() -> Self {
        RowBatch {
            rows: Vec::new(),
            next_cursor: Cursor::None,
            reached_end: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
