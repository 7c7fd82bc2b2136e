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

//! `save`/`load` of an [`Image`] to/from a single flat file, byte-exact
//! with the pinned on-disk layout:
//!
//! ```text
//! inode_count      : u64
//! free_inode_head  : u16
//! dblock_count     : u64
//! inode_table      : inode_count * 48 bytes
//! dblock_bitmap    : ceil(dblock_count / 8) bytes
//! dblocks          : dblock_count * 64 bytes
//! ```
//!
//! Every field is packed explicitly with `to_le_bytes`/`from_le_bytes`
//! rather than transmuted wholesale, so the format never depends on the
//! host's pointer width or endianness even though `RawInode` is itself a
//! `bytemuck::Pod` byte-for-byte record.

use std::path::Path;
use std::sync::Arc;

use crate::error::{FsError, FsResult};
use crate::image::{Image, RawInode, DATA_BLOCK_SIZE, INODE_RECORD_SIZE};

const HEADER_SIZE: usize = 8 + 2 + 8;

fn io_err(path: &Path, source: std::io::Error) -> FsError {
    FsError::Io { path: path.to_path_buf(), source: Arc::new(source) }
}

/// Serializes `image` to `path` in one buffered `write_all`.
pub fn save(image: &Image, path: &Path) -> FsResult<()> {
    let inode_table_size = image.inode_count() * INODE_RECORD_SIZE;
    let bitmap_size = image.dblock_bitmap.len();
    let dblocks_size = image.dblock_bytes.len();
    let mut buf = Vec::with_capacity(HEADER_SIZE + inode_table_size + bitmap_size + dblocks_size);

    buf.extend_from_slice(&(image.inode_count() as u64).to_le_bytes());
    buf.extend_from_slice(&image.free_inode_head().to_le_bytes());
    buf.extend_from_slice(&(image.dblock_count() as u64).to_le_bytes());
    for idx in 0..image.inode_count() {
        buf.extend_from_slice(bytemuck::bytes_of(image.inode(idx as u16)));
    }
    buf.extend_from_slice(&image.dblock_bitmap);
    buf.extend_from_slice(&image.dblock_bytes);

    std::fs::write(path, &buf).map_err(|e| io_err(path, e))?;
    log::info!("saved image ({} bytes) to {}", buf.len(), path.display());
    Ok(())
}

/// Parses an `Image` out of `path`. Fails `INVALID_BINARY_FORMAT` if the
/// file is shorter than the header implies at any stage of slicing.
pub fn load(path: &Path) -> FsResult<Image> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    if bytes.len() < HEADER_SIZE {
        return Err(FsError::InvalidBinaryFormat);
    }

    let inode_count = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize;
    let free_inode_head = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
    let dblock_count = u64::from_le_bytes(bytes[10..18].try_into().unwrap()) as u32;

    let inode_table_size = inode_count * INODE_RECORD_SIZE;
    let bitmap_size = (dblock_count as usize).div_ceil(8);
    let dblocks_size = dblock_count as usize * DATA_BLOCK_SIZE;
    let expected_len = HEADER_SIZE + inode_table_size + bitmap_size + dblocks_size;
    if bytes.len() < expected_len {
        return Err(FsError::InvalidBinaryFormat);
    }

    let mut offset = HEADER_SIZE;
    let mut inode_table = Vec::with_capacity(inode_count);
    for _ in 0..inode_count {
        let record: &RawInode = bytemuck::from_bytes(&bytes[offset..offset + INODE_RECORD_SIZE]);
        inode_table.push(*record);
        offset += INODE_RECORD_SIZE;
    }

    let dblock_bitmap = bytes[offset..offset + bitmap_size].to_vec();
    offset += bitmap_size;
    let dblock_bytes = bytes[offset..offset + dblocks_size].to_vec();

    log::info!("loaded image ({} bytes) from {}", bytes.len(), path.display());
    Ok(Image::from_raw_parts(inode_table, free_inode_head, dblock_bitmap, dblock_bytes, dblock_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc;

    #[test]
    fn round_trips_a_fresh_image() {
        let image = Image::fresh(8, 8);
        let dir = std::env::temp_dir().join(format!("ufsim-test-{}", std::process::id()));
        save(&image, &dir).unwrap();
        let loaded = load(&dir).unwrap();
        assert_eq!(image, loaded);
        std::fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn round_trips_after_mutation_including_trailing_bitmap_bits() {
        let mut image = Image::fresh(5, 10);
        let idx = alloc::claim_inode(&mut image).unwrap();
        crate::inode_io::inode_write_data(&mut image, idx, &[7u8; 200]).unwrap();

        let path = std::env::temp_dir().join(format!("ufsim-test-mut-{}", std::process::id()));
        save(&image, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(image, loaded);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn truncated_file_is_invalid_format() {
        let path = std::env::temp_dir().join(format!("ufsim-test-short-{}", std::process::id()));
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert_eq!(load(&path).unwrap_err(), FsError::InvalidBinaryFormat);
        std::fs::remove_file(&path).unwrap();
    }
}
