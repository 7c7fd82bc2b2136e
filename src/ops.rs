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

//! The path-driven, shell-facing operations: create/remove files and
//! directories, change directory, list, tree, and render the current
//! path. Every function here takes a [`Terminal`] — the ambient pairing
//! of an [`Image`] and a working-directory inode every command runs
//! against — and does nothing `PathResolver`/`DirectoryOps`/`InodeIO`/
//! `Allocator` don't already do; this layer only sequences them and turns
//! their failures into the right diagnostic.

use crate::alloc;
use crate::directory;
use crate::error::{FsError, FsResult};
use crate::image::{perm, FileType, Image, DIR_ENTRY_SIZE, MAX_FILE_NAME_LEN, ROOT_INODE};
use crate::inode_io;
use crate::path;

/// The image plus the working-directory inode every command runs
/// against, owned for the lifetime of a session.
pub struct Terminal {
    pub image: Image,
    pub working_directory: u16,
}

impl Terminal {
    pub fn new(image: Image) -> Self {
        Terminal { image, working_directory: ROOT_INODE }
    }
}

fn name_to_string(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn perm_triplet(bits: u16) -> String {
    format!(
        "{}{}{}",
        if bits & perm::READ != 0 { 'r' } else { '-' },
        if bits & perm::WRITE != 0 { 'w' } else { '-' },
        if bits & perm::EXECUTE != 0 { 'x' } else { '-' },
    )
}

fn reject_reserved(name: &[u8]) -> FsResult<()> {
    if directory::is_reserved_name(name) {
        return Err(FsError::InvalidFilename(name_to_string(name)));
    }
    if name.is_empty() {
        return Err(FsError::EmptyFilename);
    }
    Ok(())
}

/// Creates a regular file at `path` with the given permission bits.
pub fn new_file(term: &mut Terminal, path: &[u8], perm: u16) -> FsResult<()> {
    let (parent, basename) = path::resolve_parent(&term.image, term.working_directory, path)?;
    reject_reserved(&basename)?;
    if directory::find_entry(&term.image, parent, &basename).is_some() {
        return Err(FsError::FileExist(name_to_string(&basename)));
    }

    let idx = alloc::claim_inode(&mut term.image)?;
    term.image
        .inode_mut(idx)
        .reset_in_use(FileType::DataFile, perm, trim_name(&basename));

    if let Err(e) = directory::add_entry(&mut term.image, parent, idx, &basename) {
        let _ = alloc::release_inode(&mut term.image, idx);
        return Err(e);
    }
    log::debug!("created file {idx} as {}", name_to_string(&basename));
    Ok(())
}

/// Creates a directory at `path`, pre-populated with "." and "..".
pub fn new_directory(term: &mut Terminal, path: &[u8]) -> FsResult<()> {
    let (parent, basename) = path::resolve_parent(&term.image, term.working_directory, path)?;
    reject_reserved(&basename)?;
    if directory::find_entry(&term.image, parent, &basename).is_some() {
        return Err(FsError::DirectoryExist(name_to_string(&basename)));
    }

    let idx = alloc::claim_inode(&mut term.image)?;
    term.image
        .inode_mut(idx)
        .reset_in_use(FileType::Directory, 0, trim_name(&basename));

    let result = (|| -> FsResult<()> {
        let blk = alloc::claim_dblock(&mut term.image)?;
        term.image.dblock_mut(blk).fill(0);
        term.image.inode_mut(idx).set_direct(0, blk);
        directory::add_entry(&mut term.image, idx, idx, b".")?;
        directory::add_entry(&mut term.image, idx, parent, b"..")?;
        directory::add_entry(&mut term.image, parent, idx, &basename)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = inode_io::inode_release_data(&mut term.image, idx);
        let _ = alloc::release_inode(&mut term.image, idx);
        return Err(e);
    }
    log::debug!("created directory {idx} as {}", name_to_string(&basename));
    Ok(())
}

fn trim_name(name: &[u8]) -> &[u8] {
    &name[..name.len().min(MAX_FILE_NAME_LEN)]
}

/// Removes a regular file.
pub fn remove_file(term: &mut Terminal, path: &[u8]) -> FsResult<()> {
    let (parent, basename) = path::resolve_parent(&term.image, term.working_directory, path)?;
    let (_, idx) = directory::find_entry(&term.image, parent, &basename)
        .ok_or_else(|| FsError::FileNotFound(name_to_string(&basename)))?;
    if term.image.inode(idx).file_type() != FileType::DataFile {
        return Err(FsError::InvalidFileType);
    }
    directory::remove_entry(&mut term.image, parent, &basename)?;
    inode_io::inode_release_data(&mut term.image, idx)?;
    alloc::release_inode(&mut term.image, idx)?;
    log::debug!("removed file {idx}");
    Ok(())
}

/// Removes an empty directory that is not the current working directory.
pub fn remove_directory(term: &mut Terminal, path: &[u8]) -> FsResult<()> {
    let (parent, basename) = path::resolve_parent(&term.image, term.working_directory, path)?;
    if directory::is_reserved_name(&basename) {
        return Err(FsError::InvalidFilename(name_to_string(&basename)));
    }
    let (_, idx) = directory::find_entry(&term.image, parent, &basename)
        .ok_or_else(|| FsError::DirNotFound(name_to_string(&basename)))?;
    if term.image.inode(idx).file_type() != FileType::Directory {
        return Err(FsError::InvalidFileType);
    }
    if term.image.inode(idx).size() != 2 * DIR_ENTRY_SIZE as u64 {
        return Err(FsError::DirNotEmpty(name_to_string(&basename)));
    }
    if idx == term.working_directory {
        return Err(FsError::AttemptDeleteCwd);
    }

    directory::remove_entry(&mut term.image, parent, &basename)?;
    inode_io::inode_release_data(&mut term.image, idx)?;
    alloc::release_inode(&mut term.image, idx)?;
    log::debug!("removed directory {idx}");
    Ok(())
}

/// Changes the working directory.
pub fn change_directory(term: &mut Terminal, path: &[u8]) -> FsResult<()> {
    let idx = path::resolve_full(&term.image, term.working_directory, path)?;
    if term.image.inode(idx).file_type() != FileType::Directory {
        return Err(FsError::InvalidFileType);
    }
    term.working_directory = idx;
    Ok(())
}

/// One line per entry (directory target) or a single line (file target),
/// ready to be printed by the caller.
pub fn list(term: &Terminal, path: &[u8]) -> FsResult<Vec<String>> {
    let idx = path::resolve_full(&term.image, term.working_directory, path)?;
    let inode = term.image.inode(idx);
    if inode.file_type() == FileType::DataFile {
        return Ok(vec![format!(
            "f{}\t{}\t{}",
            perm_triplet(inode.perm()),
            inode.size(),
            name_to_string(inode.name())
        )]);
    }

    let mut lines = Vec::new();
    for (child_idx, entry_name) in directory::iter_entries(&term.image, idx) {
        let child = term.image.inode(child_idx);
        let type_char = if child.file_type() == FileType::Directory { 'd' } else { 'f' };
        let mut line = format!(
            "{type_char}{}\t{}\t{}",
            perm_triplet(child.perm()),
            child.size(),
            name_to_string(&entry_name)
        );
        if entry_name == b"." || entry_name == b".." {
            line.push_str(&format!(" -> {}", name_to_string(child.name())));
        }
        lines.push(line);
    }
    Ok(lines)
}

fn tree_into(image: &Image, idx: u16, depth: usize, out: &mut Vec<String>) {
    let indent = "   ".repeat(depth);
    out.push(format!("{indent}{}", name_to_string(image.inode(idx).name())));
    if image.inode(idx).file_type() == FileType::Directory {
        for (child_idx, entry_name) in directory::iter_entries(image, idx) {
            if entry_name == b"." || entry_name == b".." {
                continue;
            }
            tree_into(image, child_idx, depth + 1, out);
        }
    }
}

/// Recursive listing of `path`, one line per node, indented three spaces
/// per depth level.
pub fn tree(term: &Terminal, path: &[u8]) -> FsResult<Vec<String>> {
    let idx = path::resolve_full(&term.image, term.working_directory, path)?;
    let mut out = Vec::new();
    tree_into(&term.image, idx, 0, &mut out);
    Ok(out)
}

/// `"root/.../<cwd file_name>"`, built by walking ".." to the root and
/// reversing the collected names.
pub fn get_path_string(term: &Terminal) -> String {
    let mut names = Vec::new();
    let mut cur = term.working_directory;
    loop {
        names.push(name_to_string(term.image.inode(cur).name()));
        if cur == ROOT_INODE {
            break;
        }
        cur = path::parent_of(&term.image, cur);
    }
    names.reverse();
    names.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(inode_count: usize, dblock_count: u32) -> Terminal {
        Terminal::new(Image::fresh(inode_count, dblock_count))
    }

    #[test]
    fn new_file_twice_fails_with_file_exist() {
        let mut t = term(8, 8);
        let before = alloc::available_inodes(&t.image);
        new_file(&mut t, b"a.txt", perm::ALL).unwrap();
        let after_one = alloc::available_inodes(&t.image);
        assert_eq!(before - after_one, 1);
        assert_eq!(
            new_file(&mut t, b"a.txt", perm::ALL).unwrap_err(),
            FsError::FileExist("a.txt".into())
        );
        assert_eq!(alloc::available_inodes(&t.image), after_one);
    }

    #[test]
    fn remove_empty_directory_then_reject_nonempty() {
        let mut t = term(8, 8);
        new_directory(&mut t, b"d").unwrap();
        remove_directory(&mut t, b"d").unwrap();
        assert!(path::resolve_full(&t.image, ROOT_INODE, b"d").is_err());

        new_directory(&mut t, b"d").unwrap();
        new_file(&mut t, b"d/x", perm::ALL).unwrap();
        assert_eq!(
            remove_directory(&mut t, b"d").unwrap_err(),
            FsError::DirNotEmpty("d".into())
        );
    }

    #[test]
    fn cannot_remove_cwd() {
        let mut t = term(8, 8);
        new_directory(&mut t, b"d").unwrap();
        change_directory(&mut t, b"d").unwrap();
        assert_eq!(
            remove_directory(&mut t, b".").unwrap_err(),
            FsError::AttemptDeleteCwd
        );
    }

    #[test]
    fn get_path_string_reflects_nesting() {
        let mut t = term(8, 8);
        new_directory(&mut t, b"a").unwrap();
        change_directory(&mut t, b"a").unwrap();
        new_directory(&mut t, b"b").unwrap();
        change_directory(&mut t, b"b").unwrap();
        assert_eq!(get_path_string(&t), "root/a/b");
    }

    #[test]
    fn list_directory_shows_dot_dotdot_alias() {
        let mut t = term(8, 8);
        let lines = list(&t, b".").unwrap();
        assert!(lines[0].starts_with('d'));
        assert!(lines[0].contains("-> root"));
    }

    #[test]
    fn tree_descends_skipping_dot_entries() {
        let mut t = term(8, 8);
        new_directory(&mut t, b"a").unwrap();
        new_file(&mut t, b"a/f", perm::ALL).unwrap();
        let lines = tree(&t, b".").unwrap();
        assert_eq!(lines[0], "root");
        assert!(lines.iter().any(|l| l.trim() == "a"));
        assert!(lines.iter().any(|l| l.trim() == "f"));
    }
}
