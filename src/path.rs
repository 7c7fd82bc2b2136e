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

//! Resolves '/'-separated paths against a working-directory inode. Paths
//! are byte slices, not `str`: the core accepts any name that excludes '/'
//! and NUL, so UTF-8 validity is only enforced at the CLI boundary.

use crate::directory;
use crate::error::{FsError, FsResult};
use crate::image::{FileType, Image, DIR_ENTRY_SIZE, ROOT_INODE};
use crate::inode_io;

/// Splits on '/', dropping empty components — so a leading or doubled '/'
/// is silently ignored, since every path is relative to a working
/// directory and there is no distinct absolute syntax.
fn split_components(path: &[u8]) -> Vec<&[u8]> {
    path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect()
}

fn name_to_string(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// The inode bound to ".." for `current`. The root special-cases to
/// itself: it was never given an explicit ".." entry (see the design
/// notes on root's directory layout), so reading an offset-16 record
/// would either be out of bounds or read the wrong thing.
pub fn parent_of(image: &Image, current: u16) -> u16 {
    if current == ROOT_INODE {
        return ROOT_INODE;
    }
    let raw = inode_io::inode_read_data(image, current, DIR_ENTRY_SIZE as u64, DIR_ENTRY_SIZE);
    u16::from_le_bytes([raw[0], raw[1]])
}

fn step(image: &Image, cur: u16, comp: &[u8]) -> FsResult<u16> {
    if comp == b"." {
        return Ok(cur);
    }
    if comp == b".." {
        return Ok(parent_of(image, cur));
    }
    if image.inode(cur).file_type() != FileType::Directory {
        return Err(FsError::DirNotFound(name_to_string(comp)));
    }
    directory::find_entry(image, cur, comp)
        .map(|(_, idx)| idx)
        .ok_or_else(|| FsError::DirNotFound(name_to_string(comp)))
}

/// Walks every component of `path`, starting at `start`. Fails
/// `DIR_NOT_FOUND` the moment a component (intermediate or final) cannot
/// be found under a directory.
pub fn resolve_full(image: &Image, start: u16, path: &[u8]) -> FsResult<u16> {
    let mut cur = start;
    for comp in split_components(path) {
        cur = step(image, cur, comp)?;
    }
    Ok(cur)
}

/// Resolves every component but the last, returning `(parent_inode,
/// basename)`. A trailing '/' (and hence an empty basename) is treated as
/// if it were absent. An entirely empty path has no basename and fails
/// `EMPTY_FILENAME`.
pub fn resolve_parent(image: &Image, start: u16, path: &[u8]) -> FsResult<(u16, Vec<u8>)> {
    let comps = split_components(path);
    let (basename, init) = comps.split_last().ok_or(FsError::EmptyFilename)?;
    let mut cur = start;
    for comp in init {
        cur = step(image, cur, comp)?;
    }
    if image.inode(cur).file_type() != FileType::Directory {
        return Err(FsError::DirNotFound(name_to_string(basename)));
    }
    Ok((cur, basename.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc;
    use crate::image::{perm, FileType as Ft};

    fn make_dir(image: &mut Image, parent: u16, name: &[u8]) -> u16 {
        let idx = alloc::claim_inode(image).unwrap();
        image.inode_mut(idx).reset_in_use(Ft::Directory, perm::ALL, name);
        let blk = alloc::claim_dblock(image).unwrap();
        image.dblock_mut(blk).fill(0);
        image.inode_mut(idx).set_direct(0, blk);
        image.inode_mut(idx).set_size(0);
        directory::add_entry(image, idx, idx, b".").unwrap();
        directory::add_entry(image, idx, parent, b"..").unwrap();
        directory::add_entry(image, parent, idx, name).unwrap();
        idx
    }

    #[test]
    fn resolves_nested_path_with_dots() {
        let mut image = Image::fresh(8, 8);
        let a = make_dir(&mut image, ROOT_INODE, b"a");
        let b = make_dir(&mut image, a, b"b");
        assert_eq!(resolve_full(&image, ROOT_INODE, b"a/b").unwrap(), b);
        assert_eq!(resolve_full(&image, b, b"..").unwrap(), a);
        assert_eq!(resolve_full(&image, b, b"../..").unwrap(), ROOT_INODE);
        assert_eq!(resolve_full(&image, ROOT_INODE, b"a/./b/..").unwrap(), a);
    }

    #[test]
    fn doubled_and_leading_slashes_collapse() {
        let mut image = Image::fresh(8, 8);
        let a = make_dir(&mut image, ROOT_INODE, b"a");
        assert_eq!(resolve_full(&image, ROOT_INODE, b"//a//").unwrap(), a);
    }

    #[test]
    fn missing_intermediate_fails_dir_not_found() {
        let image = Image::fresh(8, 8);
        assert!(matches!(
            resolve_full(&image, ROOT_INODE, b"missing/x"),
            Err(FsError::DirNotFound(_))
        ));
    }

    #[test]
    fn root_dotdot_is_root() {
        let image = Image::fresh(8, 8);
        assert_eq!(parent_of(&image, ROOT_INODE), ROOT_INODE);
    }

    #[test]
    fn resolve_parent_strips_trailing_slash() {
        let mut image = Image::fresh(8, 8);
        make_dir(&mut image, ROOT_INODE, b"a");
        let (parent, basename) = resolve_parent(&image, ROOT_INODE, b"a/x/").unwrap();
        assert_eq!(basename, b"x");
        assert_eq!(parent, resolve_full(&image, ROOT_INODE, b"a").unwrap());
    }
}
