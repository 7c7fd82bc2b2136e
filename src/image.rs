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

//! The [`Image`] owns every byte of simulated storage: the inode table, the
//! data-block free bitmap, and the data blocks themselves. It knows nothing
//! about paths, directories or file handles — those live in the layers
//! above and reach storage only through [`crate::alloc`] and
//! [`crate::inode_io`].

use bytemuck::{Pod, Zeroable};

/// Size in bytes of a single data block.
pub const DATA_BLOCK_SIZE: usize = 64;
/// Maximum length, in bytes, of a file or directory name.
pub const MAX_FILE_NAME_LEN: usize = 14;
/// Number of direct block pointers stored in each inode.
pub const INODE_DIRECT_BLOCK_COUNT: usize = 4;
/// On-disk size of one inode record.
pub const INODE_RECORD_SIZE: usize = 48;
/// Number of data-block indices stored in one index block (the final 4-byte
/// slot is reserved for the link to the next index block in the chain).
pub const INDEX_BLOCK_SLOTS: usize = (DATA_BLOCK_SIZE / 4) - 1;
/// Size, in bytes, of one directory entry (2-byte inode index + 14-byte name).
pub const DIR_ENTRY_SIZE: usize = 2 + MAX_FILE_NAME_LEN;

/// The inode index of the root directory. Permanently allocated; never on
/// the free list; the sentinel "no free inode"/"no child" value.
pub const ROOT_INODE: u16 = 0;
/// The data-block index reserved for the root directory's first block.
pub const ROOT_DBLOCK: u32 = 0;

/// A file's type, stored in the low bits of the on-disk `kind_or_next_free`
/// field. Only meaningful while the inode is IN-USE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    DataFile = 0,
    Directory = 1,
}

impl FileType {
    fn from_raw(raw: u16) -> Self {
        match raw {
            1 => FileType::Directory,
            _ => FileType::DataFile,
        }
    }
}

/// Permission bits. Stored but never enforced (see spec Non-goals).
pub mod perm {
    pub const READ: u16 = 1;
    pub const WRITE: u16 = 2;
    pub const EXECUTE: u16 = 4;
    pub const ALL: u16 = READ | WRITE | EXECUTE;
}

/// The 48-byte on-disk shape of one inode.
///
/// This is a discriminated union of a "free" view (only
/// [`RawInode::next_free`] is meaningful) and an "in-use" view (the rest of
/// the accessors). The discriminant lives outside the record: an inode is
/// free iff it is reachable from [`Image::free_inode_head`].
///
/// Every multi-byte field is stored as a raw little-endian byte array
/// rather than a native integer, so the record's in-memory bit layout is
/// identical on every host architecture and no field introduces padding —
/// `size_of::<RawInode>() == INODE_RECORD_SIZE` unconditionally.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RawInode {
    kind_or_next_free: [u8; 2],
    perm: [u8; 2],
    name: [u8; MAX_FILE_NAME_LEN],
    reserved: [u8; 2],
    size: [u8; 8],
    direct: [[u8; 4]; INODE_DIRECT_BLOCK_COUNT],
    indirect: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<RawInode>() == INODE_RECORD_SIZE);

impl RawInode {
    /// A zeroed record: free shape, next_free = 0.
    pub const fn zeroed_record() -> Self {
        RawInode {
            kind_or_next_free: [0; 2],
            perm: [0; 2],
            name: [0; MAX_FILE_NAME_LEN],
            reserved: [0; 2],
            size: [0; 8],
            direct: [[0; 4]; INODE_DIRECT_BLOCK_COUNT],
            indirect: [0; 4],
        }
    }

    // --- free-list shape ---

    pub fn next_free(&self) -> u16 {
        u16::from_le_bytes(self.kind_or_next_free)
    }

    pub fn set_next_free(&mut self, next: u16) {
        self.kind_or_next_free = next.to_le_bytes();
    }

    // --- in-use shape ---

    pub fn file_type(&self) -> FileType {
        FileType::from_raw(u16::from_le_bytes(self.kind_or_next_free))
    }

    pub fn set_file_type(&mut self, ty: FileType) {
        self.kind_or_next_free = (ty as u16).to_le_bytes();
    }

    pub fn perm(&self) -> u16 {
        u16::from_le_bytes(self.perm)
    }

    pub fn set_perm(&mut self, perm: u16) {
        self.perm = (perm & perm::ALL).to_le_bytes();
    }

    /// The stored name, trimmed of trailing NUL padding. Not guaranteed to
    /// be valid UTF-8.
    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..end]
    }

    /// Sets the name, truncating to [`MAX_FILE_NAME_LEN`] bytes and
    /// zero-padding the remainder. A name of exactly 14 bytes is stored
    /// without a terminator, matching the on-disk convention.
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; MAX_FILE_NAME_LEN];
        let n = name.len().min(MAX_FILE_NAME_LEN);
        self.name[..n].copy_from_slice(&name[..n]);
    }

    pub fn size(&self) -> u64 {
        u64::from_le_bytes(self.size)
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size.to_le_bytes();
    }

    pub fn direct(&self, i: usize) -> u32 {
        u32::from_le_bytes(self.direct[i])
    }

    pub fn set_direct(&mut self, i: usize, block: u32) {
        self.direct[i] = block.to_le_bytes();
    }

    pub fn indirect(&self) -> u32 {
        u32::from_le_bytes(self.indirect)
    }

    pub fn set_indirect(&mut self, block: u32) {
        self.indirect = block.to_le_bytes();
    }

    /// Resets every in-use payload field to empty, preserving nothing.
    /// Used when claiming a fresh inode for a new file/directory.
    pub fn reset_in_use(&mut self, ty: FileType, perm: u16, name: &[u8]) {
        self.set_file_type(ty);
        self.set_perm(perm);
        self.set_name(name);
        self.set_size(0);
        for i in 0..INODE_DIRECT_BLOCK_COUNT {
            self.set_direct(i, 0);
        }
        self.set_indirect(0);
    }
}

/// The whole simulated file system: inode table, data-block bitmap, and the
/// data blocks themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub(crate) inode_table: Vec<RawInode>,
    pub(crate) free_inode_head: u16,
    pub(crate) dblock_bitmap: Vec<u8>,
    pub(crate) dblock_bytes: Vec<u8>,
    dblock_count: u32,
}

impl Image {
    /// Builds a fresh image: `inode_count` inodes (index 0 pre-seeded as
    /// root) and `dblock_count` 64-byte data blocks (block 0 reserved for
    /// the root directory's content).
    ///
    /// `inode_count` must be at least 1 and `dblock_count` at least 1 or
    /// this would be unable to host the root; both are expected to be
    /// validated by the caller (the CLI's `new` command).
    pub fn fresh(inode_count: usize, dblock_count: u32) -> Self {
        assert!(inode_count >= 1, "an image needs at least the root inode");
        assert!(dblock_count >= 1, "an image needs at least the root block");

        let mut inode_table = vec![RawInode::zeroed_record(); inode_count];
        // Free list: 1 -> 2 -> ... -> (n-1) -> 0. Inode 0 is excluded (root).
        for i in 1..inode_count {
            let next = if i + 1 < inode_count { (i + 1) as u16 } else { 0 };
            inode_table[i].set_next_free(next);
        }
        let free_inode_head = if inode_count > 1 { 1 } else { 0 };

        // Root: directory, perms rwx, size = one entry ("." -> self), block 0.
        let root = &mut inode_table[ROOT_INODE as usize];
        root.reset_in_use(FileType::Directory, perm::ALL, b"root");
        root.set_size(DIR_ENTRY_SIZE as u64);
        root.set_direct(0, ROOT_DBLOCK);

        let bitmap_len = (dblock_count as usize).div_ceil(8);
        let mut dblock_bitmap = vec![0xffu8; bitmap_len];
        // Block 0 is in use (bit 0 of byte 0 is bit index 7 per the pinned
        // bit order: bit (7 - (i mod 8)) <-> block i).
        dblock_bitmap[0] &= !(1 << 7);

        let mut dblock_bytes = vec![0u8; dblock_count as usize * DATA_BLOCK_SIZE];
        // Block 0 holds a single "." entry pointing at inode 0; the rest is
        // already zero.
        dblock_bytes[0..2].copy_from_slice(&ROOT_INODE.to_le_bytes());
        dblock_bytes[2] = b'.';

        Image {
            inode_table,
            free_inode_head,
            dblock_bitmap,
            dblock_bytes,
            dblock_count,
        }
    }

    /// Rebuilds an `Image` from its four constituent arrays, as produced by
    /// [`crate::binimage::load`]. Bypasses the fresh-image invariants
    /// entirely: the caller (`binimage`) is responsible for having read
    /// them from a well-formed byte stream.
    pub(crate) fn from_raw_parts(
        inode_table: Vec<RawInode>,
        free_inode_head: u16,
        dblock_bitmap: Vec<u8>,
        dblock_bytes: Vec<u8>,
        dblock_count: u32,
    ) -> Self {
        Image {
            inode_table,
            free_inode_head,
            dblock_bitmap,
            dblock_bytes,
            dblock_count,
        }
    }

    pub fn inode_count(&self) -> usize {
        self.inode_table.len()
    }

    pub fn dblock_count(&self) -> u32 {
        self.dblock_count
    }

    pub fn free_inode_head(&self) -> u16 {
        self.free_inode_head
    }

    pub fn inode(&self, idx: u16) -> &RawInode {
        &self.inode_table[idx as usize]
    }

    pub fn inode_mut(&mut self, idx: u16) -> &mut RawInode {
        &mut self.inode_table[idx as usize]
    }

    pub fn dblock(&self, idx: u32) -> &[u8] {
        let off = idx as usize * DATA_BLOCK_SIZE;
        &self.dblock_bytes[off..off + DATA_BLOCK_SIZE]
    }

    pub fn dblock_mut(&mut self, idx: u32) -> &mut [u8] {
        let off = idx as usize * DATA_BLOCK_SIZE;
        &mut self.dblock_bytes[off..off + DATA_BLOCK_SIZE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_image_scenario_1() {
        let image = Image::fresh(8, 8);
        assert_eq!(crate::alloc::available_inodes(&image), 7);
        assert_eq!(crate::alloc::available_dblocks(&image), 7);
        let root = image.inode(ROOT_INODE);
        assert_eq!(root.size(), DIR_ENTRY_SIZE as u64);
        assert_eq!(root.direct(0), 0);
        let blk = image.dblock(0);
        assert_eq!(u16::from_le_bytes([blk[0], blk[1]]), 0);
        assert_eq!(&blk[2..3], b".");
    }

    #[test]
    fn root_is_never_free_and_block_zero_in_use() {
        let image = Image::fresh(4, 4);
        assert_ne!(image.free_inode_head, ROOT_INODE);
        // bit 0 of byte 0 (block 0) must read "in use" (0).
        assert_eq!(image.dblock_bitmap[0] & 0x80, 0);
    }
}
