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

//! Directories are ordinary files whose byte stream is a flat sequence of
//! 16-byte entries (2-byte little-endian inode index, 14-byte zero-padded
//! name). An entry with inode index 0 is a tombstone: the root inode can
//! never be a child, so 0 is a safe "deleted" marker. This module is the
//! only place that interprets a directory's bytes that way; everything
//! below it (`inode_io`) just sees a file.

use crate::error::{FsError, FsResult};
use crate::image::{Image, DIR_ENTRY_SIZE, MAX_FILE_NAME_LEN, ROOT_INODE};
use crate::inode_io;

/// An entry's inode index of 0 means "tombstone" — except at offset 0 of
/// the root directory itself, which is root's own "." entry (inode index
/// 0, since root's own index is 0). That one slot aliases the tombstone
/// marker by construction and must never be scanned over or reused.
fn is_tombstone(dir_inode: u16, offset: u64, inode_index: u16) -> bool {
    inode_index == 0 && !(dir_inode == ROOT_INODE && offset == 0)
}

/// The reserved names every non-trivial directory contains but which
/// `new_file`/`new_directory`/`remove_directory` refuse as a basename.
pub fn is_reserved_name(name: &[u8]) -> bool {
    name == b"." || name == b".."
}

fn clip_name(name: &[u8]) -> &[u8] {
    let truncated = &name[..name.len().min(MAX_FILE_NAME_LEN)];
    let end = truncated.iter().position(|&b| b == 0).unwrap_or(truncated.len());
    &truncated[..end]
}

fn decode_entry(bytes: &[u8]) -> (u16, &[u8]) {
    let inode_index = u16::from_le_bytes([bytes[0], bytes[1]]);
    let raw_name = &bytes[2..DIR_ENTRY_SIZE];
    let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    (inode_index, &raw_name[..end])
}

fn encode_entry(inode_index: u16, name: &[u8]) -> [u8; DIR_ENTRY_SIZE] {
    let mut record = [0u8; DIR_ENTRY_SIZE];
    record[0..2].copy_from_slice(&inode_index.to_le_bytes());
    let n = name.len().min(MAX_FILE_NAME_LEN);
    record[2..2 + n].copy_from_slice(&name[..n]);
    record
}

/// Linear scan in storage order, skipping tombstones. Returns the entry's
/// byte offset and child inode index.
pub fn find_entry(image: &Image, dir_inode: u16, name: &[u8]) -> Option<(u64, u16)> {
    let wanted = clip_name(name);
    let size = image.inode(dir_inode).size();
    let mut offset = 0u64;
    while offset < size {
        let raw = inode_io::inode_read_data(image, dir_inode, offset, DIR_ENTRY_SIZE);
        let (inode_index, entry_name) = decode_entry(&raw);
        if !is_tombstone(dir_inode, offset, inode_index) && entry_name == wanted {
            return Some((offset, inode_index));
        }
        offset += DIR_ENTRY_SIZE as u64;
    }
    None
}

/// Binds `name` to `child_index` in `dir_inode`: reuses the first
/// tombstone slot found, otherwise grows the directory by one entry.
pub fn add_entry(image: &mut Image, dir_inode: u16, child_index: u16, name: &[u8]) -> FsResult<()> {
    let record = encode_entry(child_index, name);
    let size = image.inode(dir_inode).size();
    let mut offset = 0u64;
    while offset < size {
        let raw = inode_io::inode_read_data(image, dir_inode, offset, DIR_ENTRY_SIZE);
        let (inode_index, _) = decode_entry(&raw);
        if is_tombstone(dir_inode, offset, inode_index) {
            inode_io::inode_modify_data(image, dir_inode, offset, &record)?;
            log::trace!("directory {dir_inode}: reused tombstone at offset {offset}");
            return Ok(());
        }
        offset += DIR_ENTRY_SIZE as u64;
    }
    inode_io::inode_write_data(image, dir_inode, &record)?;
    log::trace!("directory {dir_inode}: appended new entry at offset {size}");
    Ok(())
}

/// Tombstones the entry bound to `name`, then truncates every trailing
/// tombstone so `file_size` stays a multiple of [`DIR_ENTRY_SIZE`] with a
/// non-tombstone last record.
pub fn remove_entry(image: &mut Image, dir_inode: u16, name: &[u8]) -> FsResult<()> {
    let (offset, _) = find_entry(image, dir_inode, name)
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    inode_io::inode_modify_data(image, dir_inode, offset, &[0u8; DIR_ENTRY_SIZE])?;

    loop {
        let size = image.inode(dir_inode).size();
        if size == 0 {
            break;
        }
        let last_offset = size - DIR_ENTRY_SIZE as u64;
        let raw = inode_io::inode_read_data(image, dir_inode, last_offset, DIR_ENTRY_SIZE);
        let (inode_index, _) = decode_entry(&raw);
        if !is_tombstone(dir_inode, last_offset, inode_index) {
            break;
        }
        inode_io::inode_shrink_data(image, dir_inode, last_offset)?;
    }
    Ok(())
}

/// Iterates every live (non-tombstone) entry in storage order.
pub fn iter_entries(image: &Image, dir_inode: u16) -> Vec<(u16, Vec<u8>)> {
    let size = image.inode(dir_inode).size();
    let mut offset = 0u64;
    let mut out = Vec::new();
    while offset < size {
        let raw = inode_io::inode_read_data(image, dir_inode, offset, DIR_ENTRY_SIZE);
        let (inode_index, name) = decode_entry(&raw);
        if !is_tombstone(dir_inode, offset, inode_index) {
            out.push((inode_index, name.to_vec()));
        }
        offset += DIR_ENTRY_SIZE as u64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc;
    use crate::image::{perm, FileType, Image};

    fn new_dir(image: &mut Image, parent: u16) -> u16 {
        let idx = alloc::claim_inode(image).unwrap();
        image.inode_mut(idx).reset_in_use(FileType::Directory, perm::ALL, b"d");
        let blk = alloc::claim_dblock(image).unwrap();
        image.dblock_mut(blk).fill(0);
        image.inode_mut(idx).set_direct(0, blk);
        image.inode_mut(idx).set_size(0);
        add_entry(image, idx, idx, b".").unwrap();
        add_entry(image, idx, parent, b"..").unwrap();
        idx
    }

    #[test]
    fn add_then_find_round_trip() {
        let mut image = Image::fresh(8, 8);
        let child = alloc::claim_inode(&mut image).unwrap();
        add_entry(&mut image, 0, child, b"a.txt").unwrap();
        let (offset, found) = find_entry(&image, 0, b"a.txt").unwrap();
        assert_eq!(found, child);
        assert_eq!(offset, DIR_ENTRY_SIZE as u64); // after the pre-seeded "."
    }

    #[test]
    fn remove_truncates_trailing_tombstones() {
        let mut image = Image::fresh(8, 8);
        let a = alloc::claim_inode(&mut image).unwrap();
        let b = alloc::claim_inode(&mut image).unwrap();
        add_entry(&mut image, 0, a, b"a").unwrap();
        add_entry(&mut image, 0, b, b"b").unwrap();
        let size_before = image.inode(0).size();
        remove_entry(&mut image, 0, b"b").unwrap();
        assert_eq!(image.inode(0).size(), size_before - DIR_ENTRY_SIZE as u64);
        remove_entry(&mut image, 0, b"a").unwrap();
        // Only "." remains.
        assert_eq!(image.inode(0).size(), DIR_ENTRY_SIZE as u64);
    }

    #[test]
    fn remove_middle_leaves_tombstone_not_truncated() {
        let mut image = Image::fresh(8, 8);
        let a = alloc::claim_inode(&mut image).unwrap();
        let b = alloc::claim_inode(&mut image).unwrap();
        add_entry(&mut image, 0, a, b"a").unwrap();
        add_entry(&mut image, 0, b, b"b").unwrap();
        let size_before = image.inode(0).size();
        remove_entry(&mut image, 0, b"a").unwrap();
        // "b" is still last and alive, so nothing is truncated.
        assert_eq!(image.inode(0).size(), size_before);
        assert!(find_entry(&image, 0, b"a").is_none());
        assert!(find_entry(&image, 0, b"b").is_some());
    }

    #[test]
    fn add_reuses_tombstone_slot_before_growing() {
        let mut image = Image::fresh(8, 8);
        let a = alloc::claim_inode(&mut image).unwrap();
        let b = alloc::claim_inode(&mut image).unwrap();
        add_entry(&mut image, 0, a, b"a").unwrap();
        let size_with_a = image.inode(0).size();
        remove_entry(&mut image, 0, b"a").unwrap();
        assert_eq!(image.inode(0).size(), size_with_a - DIR_ENTRY_SIZE as u64);
        add_entry(&mut image, 0, b, b"b").unwrap();
        // Reused the slot "a" vacated rather than growing past size_with_a.
        assert_eq!(image.inode(0).size(), size_with_a);
    }

    #[test]
    fn nested_directory_has_dot_and_dotdot() {
        let mut image = Image::fresh(8, 8);
        let child = new_dir(&mut image, 0);
        assert_eq!(image.inode(child).size(), 2 * DIR_ENTRY_SIZE as u64);
        let entries = iter_entries(&image, child);
        assert_eq!(entries[0].1, b".");
        assert_eq!(entries[1].1, b"..");
    }
}
