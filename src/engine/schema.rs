//! Per-schema engine state
//!
//! A schema owns a page file, a write-ahead log, at most one open write
//! transaction and its replication mode. In leader mode every transaction
//! boundary and every flush of dirty pages goes through the plugin hooks;
//! in follower mode local writes are refused and forwarded batches are
//! applied instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::checkpoint::{CheckpointMode, CheckpointResult};
use super::wal::WriteAheadLog;
use crate::replication::{
    Frame, FrameBatch, ReplicationError, ReplicationResult, SessionContext, WalReplication,
};

/// Replication role of one schema.
pub(crate) enum ReplicationMode {
    /// Not replicated
    Disabled,
    /// Writes are announced to `plugin`
    Leader {
        plugin: Arc<dyn WalReplication>,
        session: SessionContext,
    },
    /// Writes arrive through `apply_frames`
    Follower {
        /// A forwarded transaction is open
        applying: bool,
    },
}

impl fmt::Debug for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Leader { plugin, session } => f
                .debug_struct("Leader")
                .field("plugin", &plugin.name())
                .field("session", session)
                .finish(),
            Self::Follower { applying } => f
                .debug_struct("Follower")
                .field("applying", applying)
                .finish(),
        }
    }
}

/// A local write transaction.
#[derive(Debug, Clone, Default)]
struct WriteTxn {
    /// Pages written since the last flush
    dirty: BTreeMap<u32, Vec<u8>>,
    /// Database size in pages when the transaction commits
    size: u32,
    /// Last frame handed to the hooks by a flush
    last_spilled: Option<(u32, Vec<u8>)>,
}

impl WriteTxn {
    fn new(size: u32) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// At least one batch was delivered.
    fn spilled(&self) -> bool {
        self.last_spilled.is_some()
    }
}

/// State of one attached schema.
#[derive(Debug)]
pub(crate) struct Schema {
    name: String,
    page_size: usize,
    autocheckpoint: u32,
    /// Checkpointed page images
    pages: BTreeMap<u32, Vec<u8>>,
    /// Page-file size in pages
    db_size: u32,
    log: WriteAheadLog,
    txn: Option<WriteTxn>,
    mode: ReplicationMode,
}

fn no_transaction(schema: &str) -> ReplicationError {
    ReplicationError::contract_violation(format!("no write transaction open on schema {}", schema))
}

/// Hand one batch to the leader's plugin, if any.
fn replicate(
    mode: &mut ReplicationMode,
    page_size: usize,
    pages: &[(u32, Vec<u8>)],
    truncate_size: u32,
    is_commit: bool,
) -> ReplicationResult<()> {
    let ReplicationMode::Leader { plugin, session } = mode else {
        return Ok(());
    };
    let frames: Vec<Frame<'_>> = pages
        .iter()
        .map(|(page_number, data)| Frame::new(*page_number, data))
        .collect();
    plugin.frames(session, page_size, &frames, truncate_size, is_commit)
}

impl Schema {
    pub(crate) fn new(name: impl Into<String>, page_size: usize, autocheckpoint: u32) -> Self {
        Self {
            name: name.into(),
            page_size,
            autocheckpoint,
            pages: BTreeMap::new(),
            db_size: 0,
            log: WriteAheadLog::new(),
            txn: None,
            mode: ReplicationMode::Disabled,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// A local transaction or a forwarded one is open.
    fn is_busy(&self) -> bool {
        self.txn.is_some() || matches!(self.mode, ReplicationMode::Follower { applying: true })
    }

    fn ensure_quiescent(&self, action: &str) -> ReplicationResult<()> {
        if self.is_busy() {
            return Err(ReplicationError::busy(format!(
                "cannot {} schema {} while a write transaction is open",
                action, self.name
            )));
        }
        Ok(())
    }

    fn committed_size(&self) -> u32 {
        self.log.committed_size().unwrap_or(self.db_size)
    }

    // -------------------------------------------------------------------
    // Replication mode
    // -------------------------------------------------------------------

    pub(crate) fn enable_leader(
        &mut self,
        plugin: Arc<dyn WalReplication>,
        session: SessionContext,
    ) -> ReplicationResult<()> {
        self.ensure_quiescent("enable leader replication on")?;
        info!(schema = %self.name, plugin = %plugin.name(), session = session.arg().0, "leader replication enabled");
        self.mode = ReplicationMode::Leader { plugin, session };
        Ok(())
    }

    pub(crate) fn enable_follower(&mut self) -> ReplicationResult<()> {
        self.ensure_quiescent("enable follower replication on")?;
        info!(schema = %self.name, "follower replication enabled");
        self.mode = ReplicationMode::Follower { applying: false };
        Ok(())
    }

    pub(crate) fn disable(&mut self) -> ReplicationResult<()> {
        self.ensure_quiescent("disable replication on")?;
        if !matches!(self.mode, ReplicationMode::Disabled) {
            info!(schema = %self.name, "replication disabled");
        }
        self.mode = ReplicationMode::Disabled;
        Ok(())
    }

    pub(crate) fn is_enabled(&self) -> (bool, Option<String>) {
        match &self.mode {
            ReplicationMode::Disabled => (false, None),
            ReplicationMode::Leader { plugin, .. } => (true, Some(plugin.name().to_string())),
            ReplicationMode::Follower { .. } => (true, None),
        }
    }

    pub(crate) fn session(&self) -> Option<&SessionContext> {
        match &self.mode {
            ReplicationMode::Leader { session, .. } => Some(session),
            _ => None,
        }
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut SessionContext> {
        match &mut self.mode {
            ReplicationMode::Leader { session, .. } => Some(session),
            _ => None,
        }
    }

    // -------------------------------------------------------------------
    // Local write transactions
    // -------------------------------------------------------------------

    pub(crate) fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub(crate) fn begin(&mut self) -> ReplicationResult<()> {
        if self.txn.is_some() {
            return Err(ReplicationError::contract_violation(format!(
                "write transaction already open on schema {}",
                self.name
            )));
        }
        match &mut self.mode {
            ReplicationMode::Follower { .. } => {
                return Err(ReplicationError::read_only(format!(
                    "schema {} is a replication follower",
                    self.name
                )));
            }
            ReplicationMode::Leader { plugin, session } => plugin.begin(session)?,
            ReplicationMode::Disabled => {}
        }

        self.log.restart_if_backfilled();
        self.txn = Some(WriteTxn::new(self.committed_size()));
        Ok(())
    }

    pub(crate) fn write_page(&mut self, page_number: u32, data: &[u8]) -> ReplicationResult<()> {
        if page_number == 0 {
            return Err(ReplicationError::contract_violation("page numbers start at 1"));
        }
        if data.len() != self.page_size {
            return Err(ReplicationError::contract_violation(format!(
                "page {} has {} bytes, page size is {}",
                page_number,
                data.len(),
                self.page_size
            )));
        }
        self.grow(page_number)?;
        let txn = self.txn.as_mut().ok_or_else(|| no_transaction(&self.name))?;
        txn.dirty.insert(page_number, data.to_vec());
        Ok(())
    }

    pub(crate) fn truncate(&mut self, size: u32) -> ReplicationResult<()> {
        if size == 0 {
            return Err(ReplicationError::contract_violation(
                "a database keeps at least one page",
            ));
        }
        self.grow(size)?;
        let txn = self.txn.as_mut().ok_or_else(|| no_transaction(&self.name))?;
        txn.dirty.retain(|&page_number, _| page_number <= size);
        txn.size = size;
        Ok(())
    }

    /// Extend the open transaction to `size` pages.
    ///
    /// Pages past the current end may still have images from before an
    /// earlier truncation, in the log or in the page file. Those come back
    /// as zeroed dirty pages so the reuse reaches the log and every follower.
    fn grow(&mut self, size: u32) -> ReplicationResult<()> {
        let current = self.txn.as_ref().ok_or_else(|| no_transaction(&self.name))?.size;
        if size <= current {
            return Ok(());
        }
        let first = current + 1;
        let mut stale: BTreeSet<u32> = self.pages.range(first..=size).map(|(&page, _)| page).collect();
        stale.extend(self.log.pages_between(first, size));

        let page_size = self.page_size;
        if let Some(txn) = self.txn.as_mut() {
            for page_number in stale {
                txn.dirty.insert(page_number, vec![0; page_size]);
            }
            txn.size = size;
        }
        Ok(())
    }

    /// Deliver the dirty pages as one non-commit batch.
    pub(crate) fn flush(&mut self) -> ReplicationResult<()> {
        let txn = self.txn.as_mut().ok_or_else(|| no_transaction(&self.name))?;
        if txn.dirty.is_empty() {
            return Ok(());
        }
        let pages: Vec<(u32, Vec<u8>)> = std::mem::take(&mut txn.dirty).into_iter().collect();

        if let Err(err) = replicate(&mut self.mode, self.page_size, &pages, 0, false) {
            return Err(self.fail_transaction(err));
        }

        let last = pages.last().cloned();
        for (page_number, data) in pages {
            self.log.append(page_number, data);
        }
        if let Some(txn) = self.txn.as_mut() {
            txn.last_spilled = last;
        }
        Ok(())
    }

    pub(crate) fn commit(&mut self) -> ReplicationResult<()> {
        let previous_size = self.committed_size();
        let txn = self.txn.as_mut().ok_or_else(|| no_transaction(&self.name))?;
        let size = txn.size;
        let spilled = txn.spilled();
        let mut pages: Vec<(u32, Vec<u8>)> = std::mem::take(&mut txn.dirty).into_iter().collect();
        let last_spilled = txn.last_spilled.take();

        // A commit needs a frame to carry it. Reuse the last delivered one,
        // or the last page when only the size changed.
        if pages.is_empty() {
            if let Some(last) = last_spilled {
                pages.push(last);
            } else if size != previous_size {
                pages.push((size, self.committed_page(size)));
            }
        }

        if !pages.is_empty() {
            if let Err(err) = replicate(&mut self.mode, self.page_size, &pages, size, true) {
                return Err(self.fail_transaction(err));
            }
            for (page_number, data) in pages {
                self.log.append(page_number, data);
            }
            self.log.commit(size);
        }
        self.txn = None;
        debug!(schema = %self.name, size, spilled, frames = self.log.committed_len(), "transaction committed");

        let ended = match &mut self.mode {
            ReplicationMode::Leader { plugin, session } => plugin.end(session),
            _ => Ok(()),
        };
        self.autocheckpoint();
        ended
    }

    pub(crate) fn rollback(&mut self) -> ReplicationResult<()> {
        let txn = self.txn.take().ok_or_else(|| no_transaction(&self.name))?;
        let dropped = self.log.rollback();
        debug!(schema = %self.name, dropped, "transaction rolled back");

        match &mut self.mode {
            ReplicationMode::Leader { plugin, session } if txn.spilled() => {
                plugin.undo(session)?;
                plugin.end(session)
            }
            ReplicationMode::Leader { plugin, session } => plugin.abort(session),
            _ => Ok(()),
        }
    }

    /// Roll back after a failed `frames` hook and close the bracket.
    ///
    /// Returns `err`; failures of the follow-up hooks are only logged.
    fn fail_transaction(&mut self, err: ReplicationError) -> ReplicationError {
        self.txn = None;
        self.log.rollback();

        if let ReplicationMode::Leader { plugin, session } = &mut self.mode {
            if let Err(undo_err) = plugin.undo(session) {
                warn!(schema = %self.name, code = %undo_err.code, "undo after failed frames hook failed");
            } else if let Err(end_err) = plugin.end(session) {
                warn!(schema = %self.name, code = %end_err.code, "end after failed frames hook failed");
            }
        }
        err
    }

    // -------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------

    /// Database size in pages as seen by this connection.
    pub(crate) fn page_count(&self) -> u32 {
        match &self.txn {
            Some(txn) => txn.size,
            None => self.committed_size(),
        }
    }

    /// Content of `page_number`, or `None` past the end of the database.
    pub(crate) fn read_page(&self, page_number: u32) -> Option<Vec<u8>> {
        if page_number == 0 || page_number > self.page_count() {
            return None;
        }
        if let Some(data) = self.txn.as_ref().and_then(|txn| txn.dirty.get(&page_number)) {
            return Some(data.clone());
        }
        let visible = if self.txn.is_some() {
            self.log.len()
        } else {
            self.log.committed_len()
        };
        match self.log.find(page_number, visible) {
            Some(frame) => Some(frame.data.clone()),
            None => Some(self.file_page(page_number)),
        }
    }

    fn committed_page(&self, page_number: u32) -> Vec<u8> {
        match self.log.find(page_number, self.log.committed_len()) {
            Some(frame) => frame.data.clone(),
            None => self.file_page(page_number),
        }
    }

    fn file_page(&self, page_number: u32) -> Vec<u8> {
        self.pages
            .get(&page_number)
            .cloned()
            .unwrap_or_else(|| vec![0; self.page_size])
    }

    // -------------------------------------------------------------------
    // Follower apply path
    // -------------------------------------------------------------------

    pub(crate) fn apply_frames(&mut self, batch: &FrameBatch) -> ReplicationResult<()> {
        let ReplicationMode::Follower { applying } = &mut self.mode else {
            return Err(ReplicationError::contract_violation(format!(
                "schema {} is not a replication follower",
                self.name
            )));
        };
        if batch.page_size != self.page_size {
            return Err(ReplicationError::contract_violation(format!(
                "batch page size {} does not match schema page size {}",
                batch.page_size, self.page_size
            )));
        }
        if batch.is_begin && *applying {
            return Err(ReplicationError::contract_violation(
                "follower transaction already open",
            ));
        }
        if !batch.is_begin && !*applying {
            return Err(ReplicationError::contract_violation(
                "follower received a continuation batch with no open transaction",
            ));
        }

        if batch.is_begin {
            self.log.restart_if_backfilled();
        }
        *applying = true;
        for frame in batch.frames() {
            self.log.append(frame.page_number, frame.data.to_vec());
        }

        if batch.is_commit {
            let size = match batch.truncate_size {
                0 => self
                    .log
                    .max_uncommitted_page()
                    .unwrap_or(0)
                    .max(self.log.committed_size().unwrap_or(self.db_size)),
                size => size,
            };
            self.log.commit(size);
            *applying = false;
        }
        debug!(
            schema = %self.name,
            frames = batch.frame_count(),
            is_begin = batch.is_begin,
            is_commit = batch.is_commit,
            "applied forwarded frames"
        );

        if batch.is_commit {
            self.autocheckpoint();
        }
        Ok(())
    }

    pub(crate) fn apply_undo(&mut self) -> ReplicationResult<()> {
        let ReplicationMode::Follower { applying } = &mut self.mode else {
            return Err(ReplicationError::contract_violation(format!(
                "schema {} is not a replication follower",
                self.name
            )));
        };
        *applying = false;
        let dropped = self.log.rollback();
        debug!(schema = %self.name, dropped, "follower transaction undone");
        Ok(())
    }

    // -------------------------------------------------------------------
    // Checkpoint
    // -------------------------------------------------------------------

    pub(crate) fn checkpoint(&mut self, mode: CheckpointMode) -> ReplicationResult<CheckpointResult> {
        if mode.requires_quiescence() {
            self.ensure_quiescent(&format!("run a {} checkpoint on", mode))?;
        }

        let pending = self.log.pending_backfill();
        if let Some(frame) = pending.iter().find(|frame| !frame.verify()) {
            error!(schema = %self.name, page = frame.page_number, "log frame checksum mismatch");
            return Err(ReplicationError::corrupt(format!(
                "checksum mismatch for page {} in schema {}",
                frame.page_number, self.name
            )));
        }
        for frame in pending {
            self.pages.insert(frame.page_number, frame.data.clone());
        }
        if let Some(size) = self.log.committed_size() {
            self.db_size = size;
            self.pages.retain(|&page_number, _| page_number <= size);
        }
        self.log.mark_backfilled();

        let frames = self.log.committed_len();
        if mode.resets_log() {
            self.log.reset();
        }
        let result = match mode {
            CheckpointMode::Truncate => CheckpointResult::new(0, 0),
            _ => CheckpointResult::new(frames, frames),
        };
        info!(
            schema = %self.name,
            mode = %mode,
            frames_in_log = result.frames_in_log,
            frames_checkpointed = result.frames_checkpointed,
            "checkpoint complete"
        );
        Ok(result)
    }

    fn autocheckpoint(&mut self) {
        if self.autocheckpoint == 0 || self.log.committed_len() < self.autocheckpoint as usize {
            return;
        }
        if let Err(err) = self.checkpoint(CheckpointMode::Passive) {
            warn!(schema = %self.name, code = %err.code, "automatic checkpoint failed");
        }
    }

    #[cfg(test)]
    pub(crate) fn log_mut(&mut self) -> &mut WriteAheadLog {
        &mut self.log
    }
}
