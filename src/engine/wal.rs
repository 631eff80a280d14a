//! In-memory write-ahead log
//!
//! Frames are appended in write order. A prefix of the log is committed;
//! frames past the commit point belong to the open transaction and vanish
//! on rollback. A prefix of the committed frames has been copied into the
//! page file by checkpoints ("backfilled").
//!
//! ```text
//! 0 ........ backfilled ........ committed ........ len
//!   copied to page file   committed only   uncommitted
//! ```
//!
//! Every frame carries a CRC32 over its page number and content, checked
//! before the frame is copied into the page file.

use crc32fast::Hasher;

/// Compute the checksum of one frame.
pub fn frame_checksum(page_number: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_number.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// One page image in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    /// 1-based page number
    pub page_number: u32,
    /// Page content
    pub data: Vec<u8>,
    /// CRC32 over page number and content
    pub checksum: u32,
}

impl LogFrame {
    /// Create a frame, computing its checksum.
    pub fn new(page_number: u32, data: Vec<u8>) -> Self {
        let checksum = frame_checksum(page_number, &data);
        Self {
            page_number,
            data,
            checksum,
        }
    }

    /// Check the stored checksum against the content.
    pub fn verify(&self) -> bool {
        frame_checksum(self.page_number, &self.data) == self.checksum
    }
}

/// Write-ahead log of one schema.
#[derive(Debug, Clone, Default)]
pub struct WriteAheadLog {
    frames: Vec<LogFrame>,
    /// Frames up to this index are committed
    committed: usize,
    /// Frames up to this index are in the page file
    backfilled: usize,
    /// Database size in pages as of the last commit
    committed_size: Option<u32>,
}

impl WriteAheadLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one uncommitted frame.
    pub fn append(&mut self, page_number: u32, data: Vec<u8>) {
        self.frames.push(LogFrame::new(page_number, data));
    }

    /// Commit every appended frame, recording the database size.
    pub fn commit(&mut self, db_size: u32) {
        self.committed = self.frames.len();
        self.committed_size = Some(db_size);
    }

    /// Drop every uncommitted frame.
    ///
    /// Returns the number of frames dropped.
    pub fn rollback(&mut self) -> usize {
        let dropped = self.frames.len() - self.committed;
        self.frames.truncate(self.committed);
        dropped
    }

    /// Total frames, committed or not.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the log holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Committed frames.
    pub fn committed_len(&self) -> usize {
        self.committed
    }

    /// Committed frames already copied into the page file.
    pub fn backfilled_len(&self) -> usize {
        self.backfilled
    }

    /// Check if there are frames past the commit point.
    pub fn has_uncommitted(&self) -> bool {
        self.frames.len() > self.committed
    }

    /// Database size recorded by the last commit still in the log.
    pub fn committed_size(&self) -> Option<u32> {
        self.committed_size
    }

    /// Highest page number among the uncommitted frames.
    pub fn max_uncommitted_page(&self) -> Option<u32> {
        self.frames[self.committed..]
            .iter()
            .map(|frame| frame.page_number)
            .max()
    }

    /// Latest image of `page_number` among the first `visible` frames.
    pub fn find(&self, page_number: u32, visible: usize) -> Option<&LogFrame> {
        self.frames[..visible.min(self.frames.len())]
            .iter()
            .rev()
            .find(|frame| frame.page_number == page_number)
    }

    /// Page numbers in `first..=last` with any image in the log, committed
    /// or not.
    pub fn pages_between(&self, first: u32, last: u32) -> impl Iterator<Item = u32> + '_ {
        self.frames
            .iter()
            .map(|frame| frame.page_number)
            .filter(move |&page_number| page_number >= first && page_number <= last)
    }

    /// Committed frames not yet copied into the page file.
    pub fn pending_backfill(&self) -> &[LogFrame] {
        &self.frames[self.backfilled..self.committed]
    }

    /// Record that every committed frame is in the page file.
    pub fn mark_backfilled(&mut self) {
        self.backfilled = self.committed;
    }

    /// Empty the log. Only valid once every frame is backfilled.
    pub fn reset(&mut self) {
        debug_assert_eq!(self.backfilled, self.frames.len());
        self.frames.clear();
        self.committed = 0;
        self.backfilled = 0;
        self.committed_size = None;
    }

    /// Empty the log if every frame is already in the page file, so a new
    /// transaction starts writing from the beginning.
    pub fn restart_if_backfilled(&mut self) -> bool {
        if !self.frames.is_empty() && self.backfilled == self.frames.len() {
            self.reset();
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_frame(&mut self, index: usize) {
        if let Some(frame) = self.frames.get_mut(index) {
            frame.data[0] ^= 0xff;
        }
    }
}
