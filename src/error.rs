/*
 * This file is part of ufsim.
 *
 * ufsim is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * ufsim is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * ufsim. If not, see <https://www.gnu.org/licenses/>.
 */

//! The closed set of outcomes a core operation can produce.
//!
//! There is no separate string table: [`FsError`]'s [`Display`](std::fmt::Display)
//! impl, derived through `thiserror`, *is* the one-line diagnostic a caller
//! prints. `SUCCESS` from the original retcode set has no variant here since
//! success is expressed by `Ok(..)`.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// Every way a core or high-level operation can fail.
#[derive(Error, Debug, Clone)]
pub enum FsError {
    /// A null/absent reference or an out-of-range offset was supplied.
    #[error("invalid input")]
    InvalidInput,

    /// An underlying allocation failed in a way the model does not expect.
    #[error("system error")]
    SystemError,

    /// The inode free list is empty.
    #[error("no inode available")]
    InodeUnavailable,

    /// The data-block bitmap has no free bit.
    #[error("no data block available")]
    DblockUnavailable,

    /// Not enough free data/index blocks to satisfy a growth operation.
    #[error("insufficient data blocks for this operation")]
    InsufficientDblocks,

    /// A file was expected to be a different [`FileType`](crate::image::FileType).
    #[error("invalid file type")]
    InvalidFileType,

    /// The bytes loaded from disk do not describe a valid image.
    #[error("invalid binary image format")]
    InvalidBinaryFormat,

    /// A regular file was looked up and does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A directory component of a path does not exist, or is not a directory.
    #[error("directory not found: {0}")]
    DirNotFound(String),

    /// An entry was looked up in a context where its kind is ambiguous.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name was the empty string where a name is required.
    #[error("empty filename")]
    EmptyFilename,

    /// A name is reserved (".", "..") or otherwise unusable.
    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// `remove_directory` was called on a directory with more than "." and "..".
    #[error("directory not empty: {0}")]
    DirNotEmpty(String),

    /// `new_file` target name already names a file.
    #[error("file already exists: {0}")]
    FileExist(String),

    /// `new_directory` target name already names a directory.
    #[error("directory already exists: {0}")]
    DirectoryExist(String),

    /// `remove_directory` was called on the terminal's working directory.
    #[error("attempt to delete the current working directory")]
    AttemptDeleteCwd,

    /// The binary image file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::sync::Arc<std::io::Error>,
    },

    /// Reserved for commands recognized but not implemented by the CLI.
    #[error("not implemented")]
    NotImplemented,
}

impl FsError {
    /// Maps this error onto the `-1` convention used by the high-level,
    /// C-shaped `new_file`/`remove_file`/... API described in §4.6: every
    /// failure is `-1`, success is `0`. Kept distinct from `Display` since
    /// the numeric code is a historical convention, not part of the
    /// diagnostic text.
    pub fn as_retcode(&self) -> i32 {
        -1
    }
}

// `std::io::Error` has no `PartialEq` impl, so this can't be derived. Two
// `Io` errors compare equal iff their paths match; everything else is
// structural.
impl PartialEq for FsError {
    fn eq(&self, other: &Self) -> bool {
        use FsError::*;
        match (self, other) {
            (InvalidInput, InvalidInput) => true,
            (SystemError, SystemError) => true,
            (InodeUnavailable, InodeUnavailable) => true,
            (DblockUnavailable, DblockUnavailable) => true,
            (InsufficientDblocks, InsufficientDblocks) => true,
            (InvalidFileType, InvalidFileType) => true,
            (InvalidBinaryFormat, InvalidBinaryFormat) => true,
            (FileNotFound(a), FileNotFound(b)) => a == b,
            (DirNotFound(a), DirNotFound(b)) => a == b,
            (NotFound(a), NotFound(b)) => a == b,
            (EmptyFilename, EmptyFilename) => true,
            (InvalidFilename(a), InvalidFilename(b)) => a == b,
            (DirNotEmpty(a), DirNotEmpty(b)) => a == b,
            (FileExist(a), FileExist(b)) => a == b,
            (DirectoryExist(a), DirectoryExist(b)) => a == b,
            (AttemptDeleteCwd, AttemptDeleteCwd) => true,
            (Io { path: a, .. }, Io { path: b, .. }) => a == b,
            (NotImplemented, NotImplemented) => true,
            _ => false,
        }
    }
}

impl Eq for FsError {}

impl From<std::io::Error> for FsError {
    fn from(source: std::io::Error) -> Self {
        FsError::Io {
            path: PathBuf::new(),
            source: std::sync::Arc::new(source),
        }
    }
}
