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

//! An open file: an inode index plus a cursor offset, layered over
//! [`crate::inode_io`]. A [`FileHandle`] does not borrow the [`Image`] it
//! was opened against — every method takes it explicitly, the same
//! convention used throughout the crate — so a handle can outlive any
//! particular borrow of the image between calls.

use crate::error::{FsError, FsResult};
use crate::image::{FileType, Image};
use crate::inode_io;
use crate::path;

/// Reference point for [`FileHandle::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Start,
    Current,
    End,
}

/// A cursor onto a `DATA_FILE` inode. `0 <= offset <= file_size` holds at
/// every observable point between calls.
#[derive(Debug)]
pub struct FileHandle {
    inode: u16,
    offset: u64,
}

/// Resolves `path` and opens it for I/O. Fails `INVALID_FILE_TYPE` if the
/// target is a directory.
pub fn open(image: &Image, working_directory: u16, path: &[u8]) -> FsResult<FileHandle> {
    let inode = path::resolve_full(image, working_directory, path)?;
    if image.inode(inode).file_type() != FileType::DataFile {
        return Err(FsError::InvalidFileType);
    }
    Ok(FileHandle { inode, offset: 0 })
}

impl FileHandle {
    pub fn inode(&self) -> u16 {
        self.inode
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads up to `n` bytes at the current offset, advancing it by the
    /// number of bytes actually returned.
    pub fn read(&mut self, image: &Image, n: usize) -> Vec<u8> {
        let data = inode_io::inode_read_data(image, self.inode, self.offset, n);
        self.offset += data.len() as u64;
        data
    }

    /// Overwrites/appends `buf` at the current offset and advances it by
    /// `buf.len()`. `inode_modify_data` already implements the
    /// overwrite/append split, so this is a thin cursor wrapper around it.
    pub fn write(&mut self, image: &mut Image, buf: &[u8]) -> FsResult<()> {
        inode_io::inode_modify_data(image, self.inode, self.offset, buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    /// Moves the cursor. A negative resulting offset fails `INVALID_INPUT`
    /// without mutating the handle; an offset past `file_size` is clamped
    /// to `file_size`.
    pub fn seek(&mut self, image: &Image, mode: SeekMode, offset: i64) -> FsResult<u64> {
        let file_size = image.inode(self.inode).size() as i64;
        let requested = match mode {
            SeekMode::Start => offset,
            SeekMode::Current => self.offset as i64 + offset,
            SeekMode::End => file_size + offset,
        };
        if requested < 0 {
            return Err(FsError::InvalidInput);
        }
        self.offset = (requested as u64).min(file_size as u64);
        Ok(self.offset)
    }

    /// Consumes the handle. Taking `self` by value makes double-close a
    /// compile error rather than a runtime one.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc;
    use crate::directory;
    use crate::image::{perm, Image, ROOT_INODE};

    fn new_file(image: &mut Image, name: &[u8]) -> u16 {
        let idx = alloc::claim_inode(image).unwrap();
        image
            .inode_mut(idx)
            .reset_in_use(FileType::DataFile, perm::ALL, name);
        directory::add_entry(image, ROOT_INODE, idx, name).unwrap();
        idx
    }

    #[test]
    fn open_rejects_directories() {
        let image = Image::fresh(8, 8);
        assert_eq!(
            open(&image, ROOT_INODE, b".").unwrap_err(),
            FsError::InvalidFileType
        );
    }

    #[test]
    fn write_then_read_advances_cursor() {
        let mut image = Image::fresh(8, 8);
        new_file(&mut image, b"a.txt");
        let mut h = open(&image, ROOT_INODE, b"a.txt").unwrap();
        h.write(&mut image, b"hello world").unwrap();
        assert_eq!(h.offset(), 11);
        h.seek(&image, SeekMode::Start, 0).unwrap();
        let read = h.read(&image, 5);
        assert_eq!(read, b"hello");
        assert_eq!(h.offset(), 5);
    }

    #[test]
    fn seek_clamps_past_end_and_rejects_negative() {
        let mut image = Image::fresh(8, 8);
        new_file(&mut image, b"a.txt");
        let mut h = open(&image, ROOT_INODE, b"a.txt").unwrap();
        h.write(&mut image, b"1234").unwrap();
        assert_eq!(h.seek(&image, SeekMode::End, 100).unwrap(), 4);
        assert_eq!(
            h.seek(&image, SeekMode::Start, -1).unwrap_err(),
            FsError::InvalidInput
        );
        assert_eq!(h.offset(), 4); // unchanged by the failed seek
    }

    #[test]
    fn write_overwrites_then_appends() {
        let mut image = Image::fresh(8, 8);
        new_file(&mut image, b"a.txt");
        let mut h = open(&image, ROOT_INODE, b"a.txt").unwrap();
        h.write(&mut image, b"aaaa").unwrap();
        h.seek(&image, SeekMode::Start, 2).unwrap();
        h.write(&mut image, b"bbbb").unwrap();
        h.seek(&image, SeekMode::Start, 0).unwrap();
        assert_eq!(h.read(&image, 6), b"aabbbb");
    }
}
