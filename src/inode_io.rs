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

//! Byte-level I/O on top of an inode's direct and chained-indirect block
//! addressing. This is the only module allowed to mutate an inode's block
//! pointers and the contents of blocks it owns.
//!
//! Addressing: for logical block `i` (0-based), `i < INODE_DIRECT_BLOCK_COUNT`
//! reads `direct[i]`; otherwise `j = i - INODE_DIRECT_BLOCK_COUNT` walks the
//! singly-linked chain of index blocks anchored at `indirect`, landing on
//! slot `j % INDEX_BLOCK_SLOTS` of the `j / INDEX_BLOCK_SLOTS`-th node.

use crate::alloc;
use crate::error::{FsError, FsResult};
use crate::image::{Image, DATA_BLOCK_SIZE, INDEX_BLOCK_SLOTS, INODE_DIRECT_BLOCK_COUNT};

/// Offset, within an index block, of the "next index block" link.
const NEXT_LINK_SLOT: usize = INDEX_BLOCK_SLOTS;

fn block_count_for_size(size: u64) -> u32 {
    size.div_ceil(DATA_BLOCK_SIZE as u64) as u32
}

fn index_blocks_for_data_blocks(data_blocks: u32) -> u32 {
    let overflow = data_blocks.saturating_sub(INODE_DIRECT_BLOCK_COUNT as u32);
    (overflow as u64).div_ceil(INDEX_BLOCK_SLOTS as u64) as u32
}

fn read_u32_at(block: &[u8], slot: usize) -> u32 {
    let off = slot * 4;
    u32::from_le_bytes(block[off..off + 4].try_into().unwrap())
}

fn write_u32_at(block: &mut [u8], slot: usize, value: u32) {
    let off = slot * 4;
    block[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn index_slot(image: &Image, blk: u32, slot: usize) -> u32 {
    read_u32_at(image.dblock(blk), slot)
}

fn index_set_slot(image: &mut Image, blk: u32, slot: usize, value: u32) {
    write_u32_at(image.dblock_mut(blk), slot, value);
}

fn index_next(image: &Image, blk: u32) -> u32 {
    index_slot(image, blk, NEXT_LINK_SLOT)
}

fn index_set_next(image: &mut Image, blk: u32, next: u32) {
    index_set_slot(image, blk, NEXT_LINK_SLOT, next);
}

/// Translates a logical block index into a physical data-block index,
/// without allocating. Returns `None` if that part of the chain does not
/// exist (which should only happen for `i` at or beyond the inode's
/// current block count).
fn translate_read_only(image: &Image, inode_idx: u16, logical_i: u32) -> Option<u32> {
    if (logical_i as usize) < INODE_DIRECT_BLOCK_COUNT {
        let blk = image.inode(inode_idx).direct(logical_i as usize);
        return (blk != 0).then_some(blk);
    }
    let j = logical_i - INODE_DIRECT_BLOCK_COUNT as u32;
    let index_block_num = j / INDEX_BLOCK_SLOTS as u32;
    let slot = (j % INDEX_BLOCK_SLOTS as u32) as usize;
    let mut cur = image.inode(inode_idx).indirect();
    if cur == 0 {
        return None;
    }
    for _ in 0..index_block_num {
        cur = index_next(image, cur);
        if cur == 0 {
            return None;
        }
    }
    let blk = index_slot(image, cur, slot);
    (blk != 0).then_some(blk)
}

/// Translates a logical block index to a physical one, allocating whatever
/// is missing along the way (the direct slot, an index block, or the final
/// data block). Every newly claimed block is zeroed before being linked in.
///
/// Callers MUST have already verified (via [`check_write_capacity`]) that
/// enough data blocks are available for every allocation this call could
/// possibly perform.
fn translate_for_write(image: &mut Image, inode_idx: u16, logical_i: u32) -> FsResult<u32> {
    if (logical_i as usize) < INODE_DIRECT_BLOCK_COUNT {
        let existing = image.inode(inode_idx).direct(logical_i as usize);
        if existing != 0 {
            return Ok(existing);
        }
        let new = alloc::claim_dblock(image)?;
        image.dblock_mut(new).fill(0);
        image.inode_mut(inode_idx).set_direct(logical_i as usize, new);
        return Ok(new);
    }
    let j = logical_i - INODE_DIRECT_BLOCK_COUNT as u32;
    let index_block_num = j / INDEX_BLOCK_SLOTS as u32;
    let slot = (j % INDEX_BLOCK_SLOTS as u32) as usize;

    let mut cur = image.inode(inode_idx).indirect();
    if cur == 0 {
        let new = alloc::claim_dblock(image)?;
        image.dblock_mut(new).fill(0);
        image.inode_mut(inode_idx).set_indirect(new);
        cur = new;
    }
    for _ in 0..index_block_num {
        let mut next = index_next(image, cur);
        if next == 0 {
            next = alloc::claim_dblock(image)?;
            image.dblock_mut(next).fill(0);
            index_set_next(image, cur, next);
        }
        cur = next;
    }
    let existing = index_slot(image, cur, slot);
    if existing != 0 {
        return Ok(existing);
    }
    let new = alloc::claim_dblock(image)?;
    image.dblock_mut(new).fill(0);
    index_set_slot(image, cur, slot, new);
    Ok(new)
}

/// Verifies that growing a file of `current_size` bytes by `n` bytes would
/// not exceed the number of data blocks currently available, without
/// mutating anything. Shared by [`inode_write_data`] and
/// [`inode_modify_data`]'s append pre-check (§9 O1).
fn check_write_capacity(image: &Image, current_size: u64, n: u64) -> FsResult<()> {
    if n == 0 {
        return Ok(());
    }
    let current_data_blocks = block_count_for_size(current_size);
    let required_data_blocks = block_count_for_size(current_size + n);
    let current_index_blocks = index_blocks_for_data_blocks(current_data_blocks);
    let required_index_blocks = index_blocks_for_data_blocks(required_data_blocks);
    let additional =
        (required_data_blocks - current_data_blocks) + (required_index_blocks - current_index_blocks);
    if alloc::available_dblocks(image) < additional as usize {
        return Err(FsError::InsufficientDblocks);
    }
    Ok(())
}

/// Appends `buf` to the end of the inode's content. All-or-nothing: if
/// there are not enough data/index blocks, the image is left untouched.
pub fn inode_write_data(image: &mut Image, inode_idx: u16, buf: &[u8]) -> FsResult<()> {
    let size = image.inode(inode_idx).size();
    let n = buf.len() as u64;
    check_write_capacity(image, size, n)?;

    let mut pos = size;
    let mut remaining = buf;
    while !remaining.is_empty() {
        let logical_i = (pos / DATA_BLOCK_SIZE as u64) as u32;
        let offset_in_block = (pos % DATA_BLOCK_SIZE as u64) as usize;
        let phys = translate_for_write(image, inode_idx, logical_i)?;
        let take = remaining.len().min(DATA_BLOCK_SIZE - offset_in_block);
        image.dblock_mut(phys)[offset_in_block..offset_in_block + take]
            .copy_from_slice(&remaining[..take]);
        pos += take as u64;
        remaining = &remaining[take..];
    }
    image.inode_mut(inode_idx).set_size(size + n);
    log::trace!("inode {inode_idx}: wrote {n} bytes, size now {}", size + n);
    Ok(())
}

/// Reads up to `n` bytes starting at `offset`. Returns fewer than `n` bytes
/// (possibly zero) once `offset + returned_len == file_size`. Never fails
/// on a well-formed image.
pub fn inode_read_data(image: &Image, inode_idx: u16, offset: u64, n: usize) -> Vec<u8> {
    let size = image.inode(inode_idx).size();
    if offset >= size {
        return Vec::new();
    }
    let to_read = (size - offset).min(n as u64) as usize;
    let mut out = Vec::with_capacity(to_read);
    let mut pos = offset;
    while out.len() < to_read {
        let logical_i = (pos / DATA_BLOCK_SIZE as u64) as u32;
        let offset_in_block = (pos % DATA_BLOCK_SIZE as u64) as usize;
        let take = (to_read - out.len()).min(DATA_BLOCK_SIZE - offset_in_block);
        match translate_read_only(image, inode_idx, logical_i) {
            Some(phys) => {
                let block = image.dblock(phys);
                out.extend_from_slice(&block[offset_in_block..offset_in_block + take]);
            }
            // A well-formed image never hits this; treat a hole defensively
            // as zero-filled rather than panicking.
            None => out.extend(std::iter::repeat(0u8).take(take)),
        }
        pos += take as u64;
    }
    out
}

/// Overwrites `buf` starting at `offset`; bytes past the current end are
/// appended. The overwrite portion never allocates; only the append tail
/// can. Per §9 O1, the append's block budget is checked up front, so a
/// failing append never leaves the overwrite portion committed.
pub fn inode_modify_data(image: &mut Image, inode_idx: u16, offset: u64, buf: &[u8]) -> FsResult<()> {
    let size = image.inode(inode_idx).size();
    if offset > size {
        return Err(FsError::InvalidInput);
    }
    let overwrite_len = (size - offset).min(buf.len() as u64);
    let (overwrite_part, append_part) = buf.split_at(overwrite_len as usize);

    check_write_capacity(image, size, append_part.len() as u64)?;

    let mut pos = offset;
    let mut remaining = overwrite_part;
    while !remaining.is_empty() {
        let logical_i = (pos / DATA_BLOCK_SIZE as u64) as u32;
        let offset_in_block = (pos % DATA_BLOCK_SIZE as u64) as usize;
        let phys = translate_read_only(image, inode_idx, logical_i)
            .expect("overwrite region lies within the existing, already-allocated file");
        let take = remaining.len().min(DATA_BLOCK_SIZE - offset_in_block);
        image.dblock_mut(phys)[offset_in_block..offset_in_block + take]
            .copy_from_slice(&remaining[..take]);
        pos += take as u64;
        remaining = &remaining[take..];
    }

    if !append_part.is_empty() {
        inode_write_data(image, inode_idx, append_part)?;
    }
    Ok(())
}

/// Reduces `file_size` to `new_size`, releasing every data block (and any
/// index block left fully empty) beyond the new end.
pub fn inode_shrink_data(image: &mut Image, inode_idx: u16, new_size: u64) -> FsResult<()> {
    let size = image.inode(inode_idx).size();
    if new_size > size {
        return Err(FsError::InvalidInput);
    }
    let old_blocks = block_count_for_size(size);
    let new_blocks = block_count_for_size(new_size);

    for logical_i in (new_blocks..old_blocks).rev() {
        release_logical_block(image, inode_idx, logical_i)?;
    }
    prune_index_chain(image, inode_idx)?;

    // Deterministic trailing bytes: zero what's left of the new last block.
    if new_size % DATA_BLOCK_SIZE as u64 != 0 {
        if let Some(phys) = translate_read_only(image, inode_idx, new_blocks.saturating_sub(1)) {
            let tail_off = (new_size % DATA_BLOCK_SIZE as u64) as usize;
            image.dblock_mut(phys)[tail_off..].fill(0);
        }
    }

    image.inode_mut(inode_idx).set_size(new_size);
    Ok(())
}

/// `inode_shrink_data(image, inode_idx, 0)`.
pub fn inode_release_data(image: &mut Image, inode_idx: u16) -> FsResult<()> {
    inode_shrink_data(image, inode_idx, 0)
}

fn release_logical_block(image: &mut Image, inode_idx: u16, logical_i: u32) -> FsResult<()> {
    if (logical_i as usize) < INODE_DIRECT_BLOCK_COUNT {
        let blk = image.inode(inode_idx).direct(logical_i as usize);
        if blk != 0 {
            alloc::release_dblock(image, blk)?;
            image.inode_mut(inode_idx).set_direct(logical_i as usize, 0);
        }
        return Ok(());
    }
    let j = logical_i - INODE_DIRECT_BLOCK_COUNT as u32;
    let index_block_num = j / INDEX_BLOCK_SLOTS as u32;
    let slot = (j % INDEX_BLOCK_SLOTS as u32) as usize;
    let mut cur = image.inode(inode_idx).indirect();
    for _ in 0..index_block_num {
        if cur == 0 {
            return Ok(());
        }
        cur = index_next(image, cur);
    }
    if cur == 0 {
        return Ok(());
    }
    let blk = index_slot(image, cur, slot);
    if blk != 0 {
        alloc::release_dblock(image, blk)?;
        index_set_slot(image, cur, slot, 0);
    }
    Ok(())
}

/// Walks the indirect chain releasing any index block whose
/// [`INDEX_BLOCK_SLOTS`] data-block slots are all empty, re-linking the
/// chain (or the inode's anchor) around it.
fn prune_index_chain(image: &mut Image, inode_idx: u16) -> FsResult<()> {
    let mut prev: Option<u32> = None;
    let mut cur = image.inode(inode_idx).indirect();
    while cur != 0 {
        let next = index_next(image, cur);
        let empty = (0..INDEX_BLOCK_SLOTS).all(|s| index_slot(image, cur, s) == 0);
        if empty {
            alloc::release_dblock(image, cur)?;
            match prev {
                Some(p) => index_set_next(image, p, next),
                None => image.inode_mut(inode_idx).set_indirect(next),
            }
        } else {
            prev = Some(cur);
        }
        cur = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;

    fn fresh_file(inode_count: usize, dblock_count: u32) -> (Image, u16) {
        let mut image = Image::fresh(inode_count, dblock_count);
        let idx = alloc::claim_inode(&mut image).unwrap();
        image
            .inode_mut(idx)
            .reset_in_use(crate::image::FileType::DataFile, crate::image::perm::ALL, b"f");
        (image, idx)
    }

    #[test]
    fn write_then_read_law() {
        let (mut image, idx) = fresh_file(8, 16);
        let buf = vec![0x20u8; 128];
        inode_write_data(&mut image, idx, &buf).unwrap();
        assert_eq!(image.inode(idx).size(), 128);
        let read = inode_read_data(&image, idx, 0, 128);
        assert_eq!(read, buf);
        // Exactly 2 direct blocks, both allocated.
        assert_ne!(image.inode(idx).direct(0), 0);
        assert_ne!(image.inode(idx).direct(1), 0);
        assert_eq!(image.inode(idx).direct(2), 0);
    }

    #[test]
    fn crossing_into_indirect_chain() {
        let (mut image, idx) = fresh_file(8, 16);
        let buf = vec![0xAAu8; 4 * 64 + 1];
        inode_write_data(&mut image, idx, &buf).unwrap();
        assert_ne!(image.inode(idx).indirect(), 0);
        let chain = image.inode(idx).indirect();
        assert_ne!(index_slot(&image, chain, 0), 0);
        for s in 1..INDEX_BLOCK_SLOTS {
            assert_eq!(index_slot(&image, chain, s), 0);
        }
    }

    #[test]
    fn shrink_round_trip_preserves_prefix() {
        let (mut image, idx) = fresh_file(8, 64);
        let buf: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        inode_write_data(&mut image, idx, &buf).unwrap();
        inode_shrink_data(&mut image, idx, 280).unwrap();
        assert_eq!(image.inode(idx).size(), 280);
        let read = inode_read_data(&image, idx, 0, 280);
        assert_eq!(read, buf[..280]);
    }

    #[test]
    fn release_equivalent_to_shrink_to_zero() {
        let (mut image, idx) = fresh_file(8, 16);
        inode_write_data(&mut image, idx, &[1u8; 300]).unwrap();
        inode_release_data(&mut image, idx).unwrap();
        assert_eq!(image.inode(idx).size(), 0);
        assert_eq!(image.inode(idx).indirect(), 0);
        for i in 0..INODE_DIRECT_BLOCK_COUNT {
            assert_eq!(image.inode(idx).direct(i), 0);
        }
    }

    #[test]
    fn modify_overwrite_law() {
        let (mut image, idx) = fresh_file(8, 16);
        inode_write_data(&mut image, idx, &[0u8; 64]).unwrap();
        inode_modify_data(&mut image, idx, 10, &[7u8; 20]).unwrap();
        assert_eq!(image.inode(idx).size(), 64);
        let read = inode_read_data(&image, idx, 10, 20);
        assert_eq!(read, vec![7u8; 20]);
    }

    #[test]
    fn modify_with_append_tail() {
        let (mut image, idx) = fresh_file(8, 16);
        inode_write_data(&mut image, idx, &[0u8; 10]).unwrap();
        inode_modify_data(&mut image, idx, 5, &[9u8; 20]).unwrap();
        assert_eq!(image.inode(idx).size(), 25);
        assert_eq!(inode_read_data(&image, idx, 5, 20), vec![9u8; 20]);
    }

    #[test]
    fn insufficient_dblocks_mutates_nothing() {
        let (mut image, idx) = fresh_file(4, 2);
        // Only block 1 remains free (block 0 is root's).
        let before = alloc::available_dblocks(&image);
        let err = inode_write_data(&mut image, idx, &[0u8; 64 * 5]).unwrap_err();
        assert_eq!(err, FsError::InsufficientDblocks);
        assert_eq!(alloc::available_dblocks(&image), before);
        assert_eq!(image.inode(idx).size(), 0);
    }

    #[test]
    fn read_past_end_is_empty() {
        let (mut image, idx) = fresh_file(8, 16);
        inode_write_data(&mut image, idx, &[1u8; 10]).unwrap();
        assert_eq!(inode_read_data(&image, idx, 10, 5), Vec::<u8>::new());
        assert_eq!(inode_read_data(&image, idx, 20, 5), Vec::<u8>::new());
    }

    #[test]
    fn random_chunked_writes_round_trip() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let (mut image, idx) = fresh_file(16, 256);
        let mut expected = Vec::new();
        for _ in 0..20 {
            let len = rng.gen_range(0..=200);
            let chunk: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            inode_write_data(&mut image, idx, &chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }
        assert_eq!(image.inode(idx).size(), expected.len() as u64);
        assert_eq!(inode_read_data(&image, idx, 0, expected.len()), expected);
    }
}
