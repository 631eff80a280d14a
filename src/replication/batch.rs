//! Frame Batch Normalisation
//!
//! Hook callers hand over borrowed page buffers that are only valid for the
//! duration of the call. Before forwarding, the frames are copied into one
//! owned batch: a page-number array and one contiguous page buffer.
//!
//! Allocation is fallible; if it fails nothing is forwarded and the caller
//! receives `NoMem`. The batch owns its buffers, so they are released on
//! every exit path when it goes out of scope.

use super::errors::{ReplicationError, ReplicationResult};
use super::hook::Frame;

/// A normalised batch of frames, ready to be applied by a follower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch {
    /// First batch of a follower-side transaction
    pub is_begin: bool,
    /// Size of every page in bytes
    pub page_size: usize,
    /// Page numbers, in delivery order
    pub page_numbers: Vec<u32>,
    /// Page contents, `page_size` bytes per entry of `page_numbers`
    pub pages: Vec<u8>,
    /// Database size in pages after commit, 0 if unspecified
    pub truncate_size: u32,
    /// Final batch of the transaction
    pub is_commit: bool,
}

impl FrameBatch {
    /// Copy borrowed frames into an owned batch.
    pub fn collect(
        is_begin: bool,
        page_size: usize,
        frames: &[Frame<'_>],
        truncate_size: u32,
        is_commit: bool,
    ) -> ReplicationResult<Self> {
        if page_size == 0 {
            return Err(ReplicationError::contract_violation("page size must be non-zero"));
        }
        if let Some(frame) = frames.iter().find(|f| f.data.len() != page_size) {
            return Err(ReplicationError::contract_violation(format!(
                "frame for page {} has {} bytes, page size is {}",
                frame.page_number,
                frame.data.len(),
                page_size
            )));
        }
        if let Some(frame) = frames.iter().find(|f| f.page_number == 0) {
            return Err(ReplicationError::contract_violation(format!(
                "page numbers start at 1, got {}",
                frame.page_number
            )));
        }

        let total = frames
            .len()
            .checked_mul(page_size)
            .ok_or_else(|| ReplicationError::no_mem("frame batch size overflows"))?;

        let mut page_numbers = Vec::new();
        page_numbers
            .try_reserve_exact(frames.len())
            .map_err(|e| ReplicationError::no_mem(format!("page number array: {}", e)))?;
        let mut pages = Vec::new();
        pages
            .try_reserve_exact(total)
            .map_err(|e| ReplicationError::no_mem(format!("page buffer: {}", e)))?;

        for frame in frames {
            page_numbers.push(frame.page_number);
            pages.extend_from_slice(frame.data);
        }

        Ok(Self {
            is_begin,
            page_size,
            page_numbers,
            pages,
            truncate_size,
            is_commit,
        })
    }

    /// Number of frames in the batch.
    pub fn frame_count(&self) -> usize {
        self.page_numbers.len()
    }

    /// Check if the batch carries no frames.
    pub fn is_empty(&self) -> bool {
        self.page_numbers.is_empty()
    }

    /// Content of the `index`-th frame.
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.page_size)?;
        self.pages.get(start..start + self.page_size)
    }

    /// Iterate the frames in delivery order.
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> {
        self.page_numbers
            .iter()
            .zip(self.pages.chunks_exact(self.page_size))
            .map(|(&page_number, data)| Frame::new(page_number, data))
    }
}

/// A follower target that forwarded batches are applied to.
///
/// Calls are synchronous: a sink that blocks delays the leader's hook
/// return, so leader writes proceed in lockstep with the follower.
pub trait FrameSink: Send {
    /// Apply one forwarded batch.
    fn apply_frames(&mut self, batch: &FrameBatch) -> ReplicationResult<()>;

    /// Discard the follower's uncommitted frames.
    fn apply_undo(&mut self) -> ReplicationResult<()>;

    /// Human-readable target, for logs.
    fn target(&self) -> String;
}
