// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Directory content decoding: run-length `(header, entries)` chunks,
//! and the arena-owned stream of entries `opendir` hands back.

use crate::error::{corrupt, Error, Result};
use crate::inode::{check_name_len, InodeVariant};
use crate::metadata::MetaRef;

/// A directory entry's basic type, as recorded on disk (always the
/// non-extended type id, even when the target inode is an extended
/// variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Regular,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

impl EntryKind {
    fn from_raw(v: u16) -> Result<EntryKind> {
        Ok(match v {
            1 => EntryKind::Dir,
            2 => EntryKind::Regular,
            3 => EntryKind::Symlink,
            4 => EntryKind::BlockDevice,
            5 => EntryKind::CharDevice,
            6 => EntryKind::Fifo,
            7 => EntryKind::Socket,
            _ => corrupt!("unknown directory entry type"),
        })
    }

    pub fn from_inode(inode: &InodeVariant) -> EntryKind {
        use crate::inode::{InodeType, InodeVariant::*};
        match inode {
            Dir(_) | ExtDir(_) => EntryKind::Dir,
            Reg(_) | ExtReg(_) => EntryKind::Regular,
            Symlink(_) | ExtSymlink(_) => EntryKind::Symlink,
            Device(d) | ExtDevice(d) => match d.header.inode_type {
                InodeType::BlkDev | InodeType::LBlkDev => EntryKind::BlockDevice,
                _ => EntryKind::CharDevice,
            },
            Ipc(i) | ExtIpc(i) => match i.header.inode_type {
                InodeType::Fifo | InodeType::LFifo => EntryKind::Fifo,
                _ => EntryKind::Socket,
            },
        }
    }
}

/// One raw directory entry, decoded but not yet resolved to a target
/// inode. `name` borrows from the directory table's decoded arena.
#[derive(Debug, Clone)]
pub struct RawEntry<'a> {
    pub inode_ref: MetaRef,
    pub inode_number: u32,
    pub kind: EntryKind,
    pub name: &'a [u8],
}

struct ChunkHeader {
    count: u32,
    start_block: u32,
    inode_number_base: u32,
}

fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(b[at..at + 2].try_into().unwrap())
}
fn le_i16(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes(b[at..at + 2].try_into().unwrap())
}
fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}

fn decode_chunk_header(b: &[u8]) -> Result<ChunkHeader> {
    if b.len() < 12 {
        corrupt!("directory chunk header truncated");
    }
    Ok(ChunkHeader {
        count: le_u32(b, 0),
        start_block: le_u32(b, 4),
        inode_number_base: le_u32(b, 8),
    })
}

/// Scans the directory content at `bytes[0..content_len]`, calling
/// `visit` for every entry in on-disk order. `content_len` is the
/// directory inode's `file_size - 3`.
pub fn scan<'a>(
    bytes: &'a [u8],
    content_len: usize,
    mut visit: impl FnMut(RawEntry<'a>) -> Result<()>,
) -> Result<()> {
    if bytes.len() < content_len {
        corrupt!("directory table truncated");
    }
    let mut pos = 0usize;
    while pos < content_len {
        let header = decode_chunk_header(&bytes[pos..])?;
        pos += 12;
        for _ in 0..=header.count {
            if pos + 8 > bytes.len() {
                corrupt!("directory entry header truncated");
            }
            let offset = le_u16(bytes, pos);
            let inode_offset = le_i16(bytes, pos + 2);
            let kind = EntryKind::from_raw(le_u16(bytes, pos + 4))?;
            let name_size = le_u16(bytes, pos + 6) as usize + 1;
            check_name_len(name_size)?;
            pos += 8;
            if pos + name_size > bytes.len() {
                corrupt!("directory entry name truncated");
            }
            let name = &bytes[pos..pos + name_size];
            pos += name_size;

            let inode_number = (header.inode_number_base as i64 + inode_offset as i64) as u32;
            visit(RawEntry {
                inode_ref: MetaRef::new(header.start_block, offset),
                inode_number,
                kind,
                name,
            })?;
        }
    }
    if pos != content_len {
        corrupt!("directory content length mismatch");
    }
    Ok(())
}

/// Returns `true` iff a directory inode's `file_size` denotes an empty
/// directory (just the 3-byte stub, no entries).
pub fn is_empty_dir(file_size: u64) -> bool {
    file_size == 3
}

/// An entry yielded by `readdir`, resolved against its target inode.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: Vec<u8>,
    pub kind: EntryKind,
    /// File size in bytes; only meaningful for `EntryKind::Regular`.
    pub size: Option<u64>,
}
