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

//! The REPL front-end: tokenizes lines on whitespace, looks the first
//! token up in a static command table, and prints whatever each command
//! returns. This binary is the only thing in the crate allowed to touch
//! [`binimage`] or stdio.

use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;

use ufsim::handle::{self, SeekMode};
use ufsim::image::{perm, Image};
use ufsim::ops::{self, Terminal};
use ufsim::binimage;

/// In-memory simulation of a classical UNIX-style file system, driven by
/// a line-oriented command language.
#[derive(Parser, Debug)]
#[command(name = "ufsim", version, about)]
struct Args {
    /// Optional script file. Once exhausted, input continues from stdin.
    script: Option<PathBuf>,
}

const COMMANDS: &[(&str, &str)] = &[
    ("new", "new <inode_count> <dblock_count> — build a fresh in-memory image"),
    ("load", "load <path> — read an image from a file"),
    ("save", "save <path> — write the current image to a file"),
    ("fs", "fs — print available/total inode and data-block counts"),
    ("available", "available — alias of fs"),
    ("ls", "ls [path] — list a directory or describe a file"),
    ("tree", "tree [path] — recursive listing"),
    ("newfile", "newfile <path> <perm-octal> — create a regular file"),
    ("newdir", "newdir <path> — create a directory"),
    ("rmfile", "rmfile <path> — remove a regular file"),
    ("rmdir", "rmdir <path> — remove an empty directory"),
    ("cd", "cd <path> — change the working directory"),
    ("write", "write <path> <text...> — open-or-create, append text, close"),
    ("cat", "cat <path> — print a file's contents"),
    ("dump", "dump <path> — hex-dump a file's raw bytes"),
    ("patch", "patch <path> <offset> <byte...> — overwrite bytes at offset"),
    ("help", "help — list this command table"),
];

fn main() {
    env_logger::init();
    let args = Args::parse();
    let mut term: Option<Terminal> = None;

    let script_lines: Vec<String> = match &args.script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(contents) => contents.lines().map(str::to_owned).collect(),
            Err(e) => {
                eprintln!("failed to open script {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Vec::new(),
    };

    for line in script_lines {
        run_line(&mut term, &line);
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        run_line(&mut term, &line);
    }
}

fn run_line(term: &mut Option<Terminal>, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&cmd) = tokens.first() else { return };
    match dispatch(term, cmd, &tokens[1..]) {
        Ok(lines) => lines.iter().for_each(|l| println!("{l}")),
        Err(msg) => println!("{msg}"),
    }
}

fn require<'a>(term: &'a mut Option<Terminal>) -> Result<&'a mut Terminal, String> {
    term.as_mut().ok_or_else(|| "no image loaded; use 'new' or 'load' first".to_string())
}

fn dispatch(term: &mut Option<Terminal>, cmd: &str, args: &[&str]) -> Result<Vec<String>, String> {
    match cmd {
        "new" => {
            let [inodes, blocks] = args else {
                return Err("usage: new <inode_count> <dblock_count>".into());
            };
            let inode_count: usize = inodes.parse().map_err(|_| "invalid inode_count".to_string())?;
            let dblock_count: u32 = blocks.parse().map_err(|_| "invalid dblock_count".to_string())?;
            *term = Some(Terminal::new(Image::fresh(inode_count, dblock_count)));
            Ok(vec![])
        }
        "load" => {
            let [path] = args else { return Err("usage: load <path>".into()) };
            let image = binimage::load(std::path::Path::new(path)).map_err(|e| e.to_string())?;
            *term = Some(Terminal::new(image));
            Ok(vec![])
        }
        "save" => {
            let [path] = args else { return Err("usage: save <path>".into()) };
            let t = require(term)?;
            binimage::save(&t.image, std::path::Path::new(path)).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "fs" | "available" => {
            let t = require(term)?;
            Ok(vec![format!(
                "{}/{} inodes free, {}/{} blocks free",
                ufsim::alloc::available_inodes(&t.image),
                t.image.inode_count(),
                ufsim::alloc::available_dblocks(&t.image),
                t.image.dblock_count(),
            )])
        }
        "ls" => {
            let t = require(term)?;
            let path = args.first().copied().unwrap_or(".");
            ops::list(t, path.as_bytes()).map_err(|e| e.to_string())
        }
        "tree" => {
            let t = require(term)?;
            let path = args.first().copied().unwrap_or(".");
            ops::tree(t, path.as_bytes()).map_err(|e| e.to_string())
        }
        "newfile" => {
            let [path, perm_octal] = args else {
                return Err("usage: newfile <path> <perm-octal>".into());
            };
            let t = require(term)?;
            let bits = u16::from_str_radix(perm_octal, 8).map_err(|_| "invalid permission octal".to_string())?;
            ops::new_file(t, path.as_bytes(), bits & perm::ALL).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "newdir" => {
            let [path] = args else { return Err("usage: newdir <path>".into()) };
            let t = require(term)?;
            ops::new_directory(t, path.as_bytes()).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "rmfile" => {
            let [path] = args else { return Err("usage: rmfile <path>".into()) };
            let t = require(term)?;
            ops::remove_file(t, path.as_bytes()).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "rmdir" => {
            let [path] = args else { return Err("usage: rmdir <path>".into()) };
            let t = require(term)?;
            ops::remove_directory(t, path.as_bytes()).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "cd" => {
            let [path] = args else { return Err("usage: cd <path>".into()) };
            let t = require(term)?;
            ops::change_directory(t, path.as_bytes()).map_err(|e| e.to_string())?;
            Ok(vec![])
        }
        "write" => {
            let [path, text @ ..] = args else {
                return Err("usage: write <path> <text...>".into());
            };
            let t = require(term)?;
            let joined = text.join(" ");
            let mut h = match handle::open(&t.image, t.working_directory, path.as_bytes()) {
                Ok(h) => h,
                Err(_) => {
                    ops::new_file(t, path.as_bytes(), perm::ALL).map_err(|e| e.to_string())?;
                    handle::open(&t.image, t.working_directory, path.as_bytes()).map_err(|e| e.to_string())?
                }
            };
            h.seek(&t.image, SeekMode::End, 0).map_err(|e| e.to_string())?;
            h.write(&mut t.image, joined.as_bytes()).map_err(|e| e.to_string())?;
            h.close();
            Ok(vec![])
        }
        "cat" => {
            let [path] = args else { return Err("usage: cat <path>".into()) };
            let t = require(term)?;
            let mut h = handle::open(&t.image, t.working_directory, path.as_bytes()).map_err(|e| e.to_string())?;
            let size = t.image.inode(h.inode()).size() as usize;
            let data = h.read(&t.image, size);
            h.close();
            Ok(vec![String::from_utf8_lossy(&data).into_owned()])
        }
        "dump" => {
            let [path] = args else { return Err("usage: dump <path>".into()) };
            let t = require(term)?;
            let mut h = handle::open(&t.image, t.working_directory, path.as_bytes()).map_err(|e| e.to_string())?;
            let size = t.image.inode(h.inode()).size() as usize;
            let data = h.read(&t.image, size);
            h.close();
            Ok(data
                .chunks(16)
                .map(|chunk| chunk.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" "))
                .collect())
        }
        "patch" => {
            let [path, offset, bytes @ ..] = args else {
                return Err("usage: patch <path> <offset> <byte...>".into());
            };
            let t = require(term)?;
            let offset: u64 = offset.parse().map_err(|_| "invalid offset".to_string())?;
            let bytes: Vec<u8> = bytes
                .iter()
                .map(|s| s.parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|_| "invalid byte value".to_string())?;
            let mut h = handle::open(&t.image, t.working_directory, path.as_bytes()).map_err(|e| e.to_string())?;
            h.seek(&t.image, SeekMode::Start, offset as i64).map_err(|e| e.to_string())?;
            h.write(&mut t.image, &bytes).map_err(|e| e.to_string())?;
            h.close();
            Ok(vec![])
        }
        "help" => Ok(COMMANDS.iter().map(|(_, usage)| usage.to_string()).collect()),
        other => Err(format!("unknown command '{other}'; type 'help' for the command table")),
    }
}
