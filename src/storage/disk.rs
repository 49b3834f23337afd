//! File handling shared by the page store, the log and the xid file.
//!
//! Every read and write names its own offset. No component relies on the
//! implicit cursor of a `File`, so two logical operations can never observe
//! each other's seek position.

pub mod page_file;

pub use page_file::{PageFile, PAGE_SIZE};

use crate::storage::error::{StorageError, StorageResult};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// How a backing file is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must not exist yet.
    Create,
    /// The file must already exist.
    Open,
}

/// Appends `suffix` to a path prefix, e.g. `data/db` + `.log` -> `data/db.log`.
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Opens a backing file read/write, mapping filesystem preconditions onto
/// typed errors.
pub fn open_file(path: &Path, mode: OpenMode) -> StorageResult<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    match mode {
        OpenMode::Create => {
            options.create_new(true);
        }
        OpenMode::Open => {
            if !path.exists() {
                return Err(StorageError::FileNotExists(path.to_path_buf()));
            }
        }
    }

    let file = options.open(path).map_err(|e| match e.kind() {
        ErrorKind::AlreadyExists => StorageError::FileExists(path.to_path_buf()),
        ErrorKind::NotFound => StorageError::FileNotExists(path.to_path_buf()),
        ErrorKind::PermissionDenied => StorageError::FileCannotRW(path.to_path_buf()),
        _ => StorageError::Io(e),
    })?;

    // Privileged processes can open read-only files for writing; still refuse.
    if file.metadata()?.permissions().readonly() {
        return Err(StorageError::FileCannotRW(path.to_path_buf()));
    }

    Ok(file)
}

#[cfg(unix)]
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
}

#[cfg(unix)]
pub fn write_all_at(file: &File, data: &[u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, data, offset)
}

#[cfg(windows)]
pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
pub fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
