//! Durable transaction status registry.
//!
//! The xid file is an 8-byte big-endian transaction count followed by one
//! status byte per issued xid, starting with xid 1. Every mutation is synced
//! before the call returns.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use super::id::TransactionId;
use super::state::TransactionState;
use crate::storage::disk::{open_file, read_exact_at, with_suffix, write_all_at, OpenMode};
use crate::storage::error::StorageError;

pub const XID_SUFFIX: &str = ".xid";

/// Length of the transaction count header.
const XID_HEADER_LEN: u64 = 8;

/// Error types for transaction operations.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Bad xid file: {0}")]
    BadXidFile(String),

    #[error("Invalid transaction {xid} (issued: {issued})")]
    InvalidXid { xid: TransactionId, issued: u64 },

    #[error("Transaction {xid} is not active: {state}")]
    NotActive {
        xid: TransactionId,
        state: TransactionState,
    },

    #[error("Corrupt status byte {byte:#04x} for transaction {xid}")]
    CorruptStatus { xid: TransactionId, byte: u8 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;

struct XidFile {
    file: File,
    /// Number of xids issued so far; also the highest valid xid.
    count: u64,
}

impl XidFile {
    fn status_offset(xid: TransactionId) -> u64 {
        XID_HEADER_LEN + (xid.0 - 1)
    }

    fn check(&self, xid: TransactionId) -> Result<()> {
        if xid.0 == 0 || xid.0 > self.count {
            return Err(TransactionError::InvalidXid {
                xid,
                issued: self.count,
            });
        }
        Ok(())
    }

    fn read_state(&self, xid: TransactionId) -> Result<TransactionState> {
        self.check(xid)?;
        let mut byte = [0u8; 1];
        read_exact_at(&self.file, &mut byte, Self::status_offset(xid))?;
        TransactionState::from_byte(byte[0])
            .ok_or(TransactionError::CorruptStatus { xid, byte: byte[0] })
    }

    fn write_state(&self, xid: TransactionId, state: TransactionState) -> Result<()> {
        write_all_at(&self.file, &[state.to_byte()], Self::status_offset(xid))?;
        Ok(())
    }

    fn write_count(&self, count: u64) -> Result<()> {
        let mut raw = [0u8; XID_HEADER_LEN as usize];
        BigEndian::write_u64(&mut raw, count);
        write_all_at(&self.file, &raw, 0)?;
        Ok(())
    }
}

/// Records whether each transaction is active, committed or aborted.
pub struct TransactionManager {
    inner: Mutex<XidFile>,
    path: PathBuf,
}

impl TransactionManager {
    /// Creates `<prefix>.xid` with a zero transaction count.
    pub fn create(prefix: impl AsRef<Path>) -> Result<Self> {
        let path = with_suffix(prefix.as_ref(), XID_SUFFIX);
        let file = open_file(&path, OpenMode::Create)?;

        let xids = XidFile { file, count: 0 };
        xids.write_count(0)?;
        xids.file.sync_all()?;

        debug!("xid file {:?} created", path);
        Ok(Self {
            inner: Mutex::new(xids),
            path,
        })
    }

    /// Opens `<prefix>.xid` and checks its header against its length.
    pub fn open(prefix: impl AsRef<Path>) -> Result<Self> {
        let path = with_suffix(prefix.as_ref(), XID_SUFFIX);
        let file = open_file(&path, OpenMode::Open)?;

        let file_len = file.metadata()?.len();
        if file_len < XID_HEADER_LEN {
            return Err(TransactionError::BadXidFile(format!(
                "file is {} bytes, shorter than the header",
                file_len
            )));
        }

        let mut raw = [0u8; XID_HEADER_LEN as usize];
        read_exact_at(&file, &mut raw, 0)?;
        let count = BigEndian::read_u64(&raw);

        let expected = count
            .checked_add(XID_HEADER_LEN)
            .ok_or_else(|| TransactionError::BadXidFile(format!("count {} overflows", count)))?;
        if file_len < expected {
            return Err(TransactionError::BadXidFile(format!(
                "{} transactions need {} bytes, file has {}",
                count, expected, file_len
            )));
        }
        if file_len > expected {
            // A status byte written by a begin() whose header update never
            // landed; the next begin() reuses the slot.
            warn!(
                "xid file {:?} has {} bytes past the last issued xid",
                path,
                file_len - expected
            );
        }

        debug!("xid file {:?} opened, {} transactions", path, count);
        Ok(Self {
            inner: Mutex::new(XidFile { file, count }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new transaction and returns its id.
    pub fn begin(&self) -> Result<TransactionId> {
        let mut xids = self.inner.lock();
        let xid = TransactionId(xids.count + 1);

        xids.write_state(xid, TransactionState::Active)?;
        xids.write_count(xid.0)?;
        xids.file.sync_all()?;
        xids.count = xid.0;

        Ok(xid)
    }

    pub fn commit(&self, xid: TransactionId) -> Result<()> {
        self.finish(xid, TransactionState::Committed)
    }

    pub fn abort(&self, xid: TransactionId) -> Result<()> {
        self.finish(xid, TransactionState::Aborted)
    }

    /// Moves an active transaction to a terminal state.
    ///
    /// Repeating the same terminal state is a no-op. Moving from one terminal
    /// state to the other fails with [`TransactionError::NotActive`].
    fn finish(&self, xid: TransactionId, target: TransactionState) -> Result<()> {
        let xids = self.inner.lock();
        match xids.read_state(xid)? {
            TransactionState::Active => {}
            current if current == target => return Ok(()),
            current => {
                return Err(TransactionError::NotActive {
                    xid,
                    state: current,
                })
            }
        }

        xids.write_state(xid, target)?;
        xids.file.sync_all()?;
        Ok(())
    }

    /// Current state of `xid`. The super transaction is always committed.
    pub fn state(&self, xid: TransactionId) -> Result<TransactionState> {
        if xid.is_super() {
            return Ok(TransactionState::Committed);
        }
        self.inner.lock().read_state(xid)
    }

    pub fn is_active(&self, xid: TransactionId) -> Result<bool> {
        Ok(self.state(xid)?.is_active())
    }

    pub fn is_committed(&self, xid: TransactionId) -> Result<bool> {
        Ok(self.state(xid)?.is_committed())
    }

    pub fn is_aborted(&self, xid: TransactionId) -> Result<bool> {
        Ok(self.state(xid)?.is_aborted())
    }

    /// Number of transactions issued so far.
    pub fn transaction_count(&self) -> u64 {
        self.inner.lock().count
    }

    pub fn close(self) -> Result<()> {
        let xids = self.inner.into_inner();
        xids.file.sync_all()?;
        debug!("xid file {:?} closed", self.path);
        Ok(())
    }
}

/// A handle to a transaction that automatically aborts on drop if still active.
pub struct Transaction {
    id: TransactionId,
    manager: Arc<TransactionManager>,
    finished: bool,
}

impl Transaction {
    /// Begins a transaction and wraps it in a handle.
    pub fn new(manager: Arc<TransactionManager>) -> Result<Self> {
        let id = manager.begin()?;
        Ok(Self {
            id,
            manager,
            finished: false,
        })
    }

    /// Gets the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.manager.commit(self.id)
    }

    /// Aborts the transaction.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.manager.abort(self.id)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.manager.abort(self.id) {
                warn!("failed to abort {} on drop: {}", self.id, e);
            }
        }
    }
}
