//! Append-only checksummed log.
//!
//! Every `log` call is durable when it returns. Opening an existing log scans
//! it from the first record and cuts off everything from the first record
//! that is incomplete or fails its checksum, which is what an interrupted
//! append leaves behind.

use super::record::{self, fold, FrameHeader, LOG_HEADER_LEN, OF_DATA};
use crate::storage::disk::{open_file, read_exact_at, with_suffix, write_all_at, OpenMode};
use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const LOG_SUFFIX: &str = ".log";

struct LogState {
    file: File,
    /// Read cursor used by `next`.
    position: u64,
    file_len: u64,
    /// Fold of every record frame, in order.
    checksum: u32,
}

impl LogState {
    /// Reads the frame at the cursor if it is complete and its checksum holds.
    fn read_frame(&self) -> StorageResult<Option<Vec<u8>>> {
        if self.position + OF_DATA as u64 > self.file_len {
            return Ok(None);
        }

        let mut raw = [0u8; OF_DATA];
        read_exact_at(&self.file, &mut raw, self.position)?;
        let header = FrameHeader::parse(&raw);
        if self.position + header.frame_len() > self.file_len {
            return Ok(None);
        }

        let mut frame = vec![0u8; header.frame_len() as usize];
        read_exact_at(&self.file, &mut frame, self.position)?;
        if !header.verifies(&frame[OF_DATA..]) {
            return Ok(None);
        }

        Ok(Some(frame))
    }

    fn write_checksum(&self) -> StorageResult<()> {
        let mut raw = [0u8; LOG_HEADER_LEN as usize];
        BigEndian::write_u32(&mut raw, self.checksum);
        write_all_at(&self.file, &raw, 0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Refolds the global checksum over the records that verify, cuts the
    /// file after the last of them and rewrites the header. Leaves the cursor
    /// at the first record and returns how many records survived.
    fn rebuild(&mut self) -> StorageResult<usize> {
        let mut checksum = 0;
        let mut records = 0;

        self.position = LOG_HEADER_LEN;
        while let Some(frame) = self.read_frame()? {
            checksum = fold(checksum, &frame);
            self.position += frame.len() as u64;
            records += 1;
        }

        if self.position < self.file_len {
            self.file.set_len(self.position)?;
            self.file_len = self.position;
        }
        self.checksum = checksum;
        self.write_checksum()?;
        self.position = LOG_HEADER_LEN;

        Ok(records)
    }
}

pub struct Logger {
    state: Mutex<LogState>,
    path: PathBuf,
}

impl Logger {
    /// Creates `<prefix>.log` holding only a zero checksum.
    pub fn create(prefix: impl AsRef<Path>) -> StorageResult<Self> {
        let path = with_suffix(prefix.as_ref(), LOG_SUFFIX);
        let file = open_file(&path, OpenMode::Create)?;

        let state = LogState {
            file,
            position: LOG_HEADER_LEN,
            file_len: LOG_HEADER_LEN,
            checksum: 0,
        };
        state.write_checksum()?;

        debug!("log {:?} created", path);
        Ok(Self {
            state: Mutex::new(state),
            path,
        })
    }

    /// Opens `<prefix>.log` and removes any bad tail.
    pub fn open(prefix: impl AsRef<Path>) -> StorageResult<Self> {
        let path = with_suffix(prefix.as_ref(), LOG_SUFFIX);
        let file = open_file(&path, OpenMode::Open)?;

        let file_len = file.metadata()?.len();
        if file_len < LOG_HEADER_LEN {
            return Err(StorageError::BadLogFileHeader);
        }

        let mut raw = [0u8; LOG_HEADER_LEN as usize];
        read_exact_at(&file, &mut raw, 0)?;

        let mut state = LogState {
            file,
            position: LOG_HEADER_LEN,
            file_len,
            checksum: BigEndian::read_u32(&raw),
        };
        Self::remove_bad_tail(&path, &mut state)?;

        debug!("log {:?} opened, {} bytes", path, state.file_len);
        Ok(Self {
            state: Mutex::new(state),
            path,
        })
    }

    /// Scans every record from the start, stopping at the first one that is
    /// incomplete or fails its checksum, then truncates the file right after
    /// the last good record and rewrites the global checksum.
    fn remove_bad_tail(path: &Path, state: &mut LogState) -> StorageResult<()> {
        let stored = state.checksum;
        let file_len = state.file_len;
        let records = state.rebuild()?;

        if state.file_len < file_len {
            warn!(
                "log {:?}: dropping {} bytes of bad tail after {} records",
                path,
                file_len - state.file_len,
                records
            );
        }
        if state.checksum != stored {
            warn!(
                "log {:?}: global checksum {:#010x} does not match records ({:#010x})",
                path, stored, state.checksum
            );
        }

        if state.file_len < file_len || state.checksum != stored {
            info!("log {:?} healed", path);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record at the end of the file and syncs before returning.
    pub fn log(&self, data: &[u8]) -> StorageResult<()> {
        let frame = record::encode(data);

        let mut state = self.state.lock();
        let end = state.file_len;
        write_all_at(&state.file, &frame, end)?;
        state.file_len = end + frame.len() as u64;
        state.checksum = fold(state.checksum, &frame);
        state.write_checksum()
    }

    /// Returns the payload at the read cursor and advances past it, or `None`
    /// at the end of the valid records.
    pub fn next(&self) -> StorageResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        let Some(mut frame) = state.read_frame()? else {
            return Ok(None);
        };
        state.position += frame.len() as u64;
        Ok(Some(frame.split_off(OF_DATA)))
    }

    /// Moves the read cursor back to the first record.
    pub fn rewind(&self) {
        self.state.lock().position = LOG_HEADER_LEN;
    }

    /// Cuts the file to at most `len` bytes, never into the header.
    ///
    /// A record left incomplete by the cut is dropped as well, so the file
    /// always ends on a record boundary. The global checksum is refolded over
    /// the records that remain and the read cursor goes back to the first
    /// record.
    pub fn truncate(&self, len: u64) -> StorageResult<()> {
        let mut state = self.state.lock();
        let len = len.max(LOG_HEADER_LEN);
        if len < state.file_len {
            state.file.set_len(len)?;
            state.file_len = len;
        }
        let records = state.rebuild()?;
        debug!(
            "log {:?} truncated to {} bytes, {} records",
            self.path, state.file_len, records
        );
        Ok(())
    }

    /// Current file length in bytes.
    pub fn len(&self) -> u64 {
        self.state.lock().file_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= LOG_HEADER_LEN
    }

    pub fn close(self) -> StorageResult<()> {
        let state = self.state.into_inner();
        state.file.sync_all()?;
        debug!("log {:?} closed", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn replay(logger: &Logger) -> Result<Vec<Vec<u8>>> {
        logger.rewind();
        let mut records = Vec::new();
        while let Some(payload) = logger.next()? {
            records.push(payload);
        }
        Ok(records)
    }

    fn stored_checksum(path: &Path) -> Result<u32> {
        let raw = std::fs::read(path)?;
        Ok(BigEndian::read_u32(&raw[..4]))
    }

    #[test]
    fn test_create_writes_header() -> Result<()> {
        let dir = tempdir()?;
        let logger = Logger::create(dir.path().join("db"))?;
        assert_eq!(logger.len(), 4);
        assert!(logger.is_empty());
        assert_eq!(logger.next()?, None);

        let path = logger.path().to_path_buf();
        logger.close()?;
        assert_eq!(std::fs::read(&path)?, vec![0, 0, 0, 0]);

        Ok(())
    }

    #[test]
    fn test_log_and_replay() -> Result<()> {
        let dir = tempdir()?;
        let logger = Logger::create(dir.path().join("db"))?;

        let payloads: [&[u8]; 3] = [b"first", b"", b"third record"];
        for p in payloads {
            logger.log(p)?;
        }

        assert_eq!(replay(&logger)?, payloads);
        assert_eq!(logger.next()?, None);

        // Rewind starts over.
        assert_eq!(replay(&logger)?.len(), 3);

        Ok(())
    }

    #[test]
    fn test_header_tracks_records() -> Result<()> {
        let dir = tempdir()?;
        let logger = Logger::create(dir.path().join("db"))?;
        logger.log(b"a")?;
        logger.log(b"bc")?;

        let expected = fold(fold(0, &record::encode(b"a")), &record::encode(b"bc"));
        assert_eq!(stored_checksum(logger.path())?, expected);

        Ok(())
    }

    #[test]
    fn test_reopen_keeps_records() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");

        let logger = Logger::create(&prefix)?;
        logger.log(b"one")?;
        logger.log(b"two")?;
        let len = logger.len();
        logger.close()?;

        let logger = Logger::open(&prefix)?;
        assert_eq!(logger.len(), len);
        assert_eq!(replay(&logger)?, vec![b"one".to_vec(), b"two".to_vec()]);

        logger.log(b"three")?;
        assert_eq!(replay(&logger)?.len(), 3);

        Ok(())
    }

    #[test]
    fn test_open_drops_garbage_tail() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");

        let logger = Logger::create(&prefix)?;
        logger.log(b"kept")?;
        let good_len = logger.len();
        let good_checksum = stored_checksum(logger.path())?;
        let path = logger.path().to_path_buf();
        logger.close()?;

        OpenOptions::new()
            .append(true)
            .open(&path)?
            .write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01])?;

        let logger = Logger::open(&prefix)?;
        assert_eq!(logger.len(), good_len);
        assert_eq!(std::fs::metadata(&path)?.len(), good_len);
        assert_eq!(stored_checksum(&path)?, good_checksum);
        assert_eq!(replay(&logger)?, vec![b"kept".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_open_drops_corrupted_record() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");

        let logger = Logger::create(&prefix)?;
        logger.log(b"good")?;
        let good_len = logger.len();
        logger.log(b"bad")?;
        logger.log(b"after bad")?;
        let path = logger.path().to_path_buf();
        logger.close()?;

        // Flip a payload byte of the second record.
        let mut raw = std::fs::read(&path)?;
        raw[good_len as usize + OF_DATA] ^= 0xFF;
        std::fs::write(&path, &raw)?;

        let logger = Logger::open(&prefix)?;
        assert_eq!(logger.len(), good_len);
        assert_eq!(replay(&logger)?, vec![b"good".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_open_drops_half_written_record() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");

        let logger = Logger::create(&prefix)?;
        logger.log(b"complete")?;
        let good_len = logger.len();
        logger.log(b"interrupted append")?;
        let path = logger.path().to_path_buf();
        logger.close()?;

        OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_len(good_len + 10)?;

        let logger = Logger::open(&prefix)?;
        assert_eq!(logger.len(), good_len);
        assert_eq!(replay(&logger)?, vec![b"complete".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_truncate_refolds_header() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");

        let logger = Logger::create(&prefix)?;
        logger.log(b"a")?;
        let after_a = logger.len();
        logger.log(b"b")?;

        logger.truncate(after_a)?;
        assert_eq!(logger.len(), after_a);
        assert_eq!(stored_checksum(logger.path())?, fold(0, &record::encode(b"a")));

        logger.log(b"c")?;
        let expected = fold(fold(0, &record::encode(b"a")), &record::encode(b"c"));
        assert_eq!(stored_checksum(logger.path())?, expected);
        logger.close()?;

        // Nothing to heal on reopen.
        let logger = Logger::open(&prefix)?;
        assert_eq!(stored_checksum(logger.path())?, expected);
        assert_eq!(replay(&logger)?, vec![b"a".to_vec(), b"c".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_truncate_mid_record_and_cursor() -> Result<()> {
        let dir = tempdir()?;
        let logger = Logger::create(dir.path().join("db"))?;
        logger.log(b"first")?;
        let after_first = logger.len();
        logger.log(b"second")?;
        logger.log(b"third")?;

        // Cursor sits past everything that is about to be cut.
        assert_eq!(replay(&logger)?.len(), 3);

        logger.truncate(after_first + 3)?;
        assert_eq!(logger.len(), after_first);
        assert_eq!(std::fs::metadata(logger.path())?.len(), after_first);
        assert_eq!(logger.next()?, Some(b"first".to_vec()));
        assert_eq!(logger.next()?, None);

        // Cutting into the header keeps an empty, valid log.
        logger.truncate(0)?;
        assert!(logger.is_empty());
        assert_eq!(stored_checksum(logger.path())?, 0);
        logger.log(b"again")?;
        assert_eq!(replay(&logger)?, vec![b"again".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_open_short_header() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");
        std::fs::write(with_suffix(&prefix, LOG_SUFFIX), [0u8, 1])?;

        assert!(matches!(
            Logger::open(&prefix),
            Err(StorageError::BadLogFileHeader)
        ));
        Ok(())
    }

    #[test]
    fn test_create_existing() -> Result<()> {
        let dir = tempdir()?;
        let prefix = dir.path().join("db");
        Logger::create(&prefix)?.close()?;

        assert!(matches!(
            Logger::create(&prefix),
            Err(StorageError::FileExists(_))
        ));
        Ok(())
    }

    #[test]
    fn test_next_does_not_advance_on_failure() -> Result<()> {
        let dir = tempdir()?;
        let logger = Logger::create(dir.path().join("db"))?;
        logger.log(b"only")?;

        logger.rewind();
        assert!(logger.next()?.is_some());
        assert_eq!(logger.next()?, None);

        // A record appended later is picked up from the same cursor.
        logger.log(b"later")?;
        assert_eq!(logger.next()?, Some(b"later".to_vec()));

        Ok(())
    }

    #[test]
    fn test_concurrent_log() -> Result<()> {
        let dir = tempdir()?;
        let logger = Arc::new(Logger::create(dir.path().join("db"))?);

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let logger = Arc::clone(&logger);
                thread::spawn(move || {
                    for i in 0..25u8 {
                        logger.log(&[t, i]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut records = replay(&logger)?;
        assert_eq!(records.len(), 100);
        records.sort();
        records.dedup();
        assert_eq!(records.len(), 100);

        Ok(())
    }
}
