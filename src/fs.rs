// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The public filesystem API: `probe`, `opendir`, `read`, `size`, and
//! the `DirStream` that owns a decoded image's inode and directory
//! tables for the lifetime of a traversal.

use crate::block::BlockSource;
use crate::dir::{self, Entry, RawEntry};
use crate::error::{Error, Result};
use crate::file::{self, RegularFile};
use crate::fragment::FragmentTable;
use crate::inode::{self, InodeVariant};
use crate::metadata::MetaTable;
use crate::superblock::{SuperBlock, SUPERBLOCK_SIZE};
use tracing::{debug, instrument};

/// Checks that `source` begins with a valid SquashFS superblock,
/// without decoding any other table.
#[instrument(skip(source))]
pub fn probe(source: &dyn BlockSource) -> Result<SuperBlock> {
    let mut header = [0u8; SUPERBLOCK_SIZE];
    source.read_at(0, &mut header)?;
    let sb = SuperBlock::parse(&header)?;
    debug!(block_size = sb.block_size, inodes = sb.inodes, "probed image");
    Ok(sb)
}

/// Owns the fully-decoded inode table, directory table, and fragment
/// table for the lifetime of a traversal rooted at one path lookup.
/// Every [`Entry`] yielded from it is derived from this storage; when
/// the `DirStream` drops, ordinary `Vec` deallocation releases it.
pub struct DirStream {
    entries: Vec<Entry>,
    cursor: usize,
}

impl DirStream {
    fn from_entries(entries: Vec<Entry>) -> DirStream {
        DirStream { entries, cursor: 0 }
    }

    /// Yields entries in on-disk order, then `None` once exhausted.
    pub fn readdir(&mut self) -> Option<Entry> {
        let e = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Iterator for DirStream {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.readdir()
    }
}

/// A no-op wrapper over dropping a [`DirStream`], kept only so the
/// five-operation surface from the public API reads one-to-one with
/// callers that expect an explicit release step.
pub fn closedir(_stream: DirStream) {}

/// The tables decoded from one image, shared across path lookups.
struct Tables {
    sb: SuperBlock,
    inode_table: MetaTable,
    dir_table: MetaTable,
    fragments: Option<FragmentTable>,
}

impl Tables {
    fn load(source: &dyn BlockSource) -> Result<Tables> {
        let sb = probe(source)?;

        let inode_table_end = first_present(&[
            sb.directory_table_start,
            sb.fragment_table_start,
            sb.export_table_start,
            sb.id_table_start,
            sb.bytes_used,
        ])
        .unwrap_or(sb.bytes_used);
        let inode_table = MetaTable::decode(source, sb.compression, sb.inode_table_start, inode_table_end)?;

        let dir_table_end = first_present(&[sb.fragment_table_start, sb.export_table_start, sb.id_table_start, sb.bytes_used])
            .unwrap_or(sb.bytes_used);
        let dir_table = MetaTable::decode(source, sb.compression, sb.directory_table_start, dir_table_end)?;

        let fragments = if sb.has_fragment_table() {
            let frag_end = first_present(&[sb.export_table_start, sb.id_table_start, sb.bytes_used]).unwrap_or(sb.bytes_used);
            Some(FragmentTable::load(source, sb.compression, sb.fragment_table_start, sb.fragments, frag_end)?)
        } else {
            None
        };

        Ok(Tables { sb, inode_table, dir_table, fragments })
    }

    fn find_inode(&self, inode_number: u32) -> Result<InodeVariant> {
        inode::find_inode(self.inode_table.bytes(), self.sb.block_size, inode_number)
    }

    fn root_inode(&self) -> Result<InodeVariant> {
        self.find_inode(self.sb.inodes)
    }

    /// Resolves a directory inode's content into flat bytes.
    fn dir_content(&self, inode: &InodeVariant) -> Result<&[u8]> {
        let (start_block, offset, file_size) =
            inode.dir_ref().ok_or(Error::NotDir)?;
        let content_len = (file_size.max(3) - 3) as usize;
        let meta_ref = crate::metadata::MetaRef::new(start_block, offset);
        let flat = self.dir_table.resolve(meta_ref)?;
        self.dir_table.slice(flat, content_len)
    }

    fn list_dir(&self, inode: &InodeVariant) -> Result<Vec<Entry>> {
        let content = self.dir_content(inode)?;
        let (_, _, file_size) = inode.dir_ref().ok_or(Error::NotDir)?;
        let content_len = (file_size.max(3) - 3) as usize;

        let mut entries = Vec::new();
        let mut err = None;
        let visit = |raw: RawEntry<'_>| -> Result<()> {
            match self.find_inode(raw.inode_number) {
                Ok(target) => {
                    let size = match &target {
                        InodeVariant::Reg(r) => Some(r.file_size as u64),
                        InodeVariant::ExtReg(r) => Some(r.file_size),
                        _ => None,
                    };
                    entries.push(Entry { name: raw.name.to_vec(), kind: raw.kind, size });
                    Ok(())
                }
                Err(e) => {
                    err = Some(e);
                    Ok(())
                }
            }
        };
        dir::scan(content, content_len, visit)?;
        if let Some(e) = err {
            return Err(e);
        }
        Ok(entries)
    }

    /// Walks `path`'s components starting at the root inode, per the
    /// path-resolution algorithm in the component design.
    fn resolve_path(&self, path: &[u8]) -> Result<(InodeVariant, bool)> {
        let trailing_slash = path.len() > 1 && path.ends_with(b"/");
        let mut current = self.root_inode()?;
        let components: Vec<&[u8]> = path
            .split(|&b| b == b'/')
            .filter(|c| !c.is_empty())
            .collect();

        for component in components {
            if !current.is_dir() {
                return Err(Error::NotDir);
            }
            let content = self.dir_content(&current)?;
            let (_, _, file_size) = current.dir_ref().ok_or(Error::NotDir)?;
            let content_len = (file_size.max(3) - 3) as usize;

            let mut found: Option<u32> = None;
            dir::scan(content, content_len, |raw: RawEntry<'_>| {
                if found.is_none() && raw.name == component {
                    found = Some(raw.inode_number);
                }
                Ok(())
            })?;

            let inode_number = found.ok_or(Error::NotFound)?;
            current = self.find_inode(inode_number)?;
        }

        Ok((current, trailing_slash))
    }
}

fn first_present(candidates: &[u64]) -> Option<u64> {
    candidates.iter().copied().find(|&v| v != crate::superblock::NOT_PRESENT)
}

/// Resolves `path` to a directory and decodes it fully, returning a
/// [`DirStream`] over its entries. `path` need not include a trailing
/// slash; `/` alone denotes the root.
#[instrument(skip(source))]
pub fn opendir(source: &dyn BlockSource, path: &[u8]) -> Result<DirStream> {
    let tables = Tables::load(source)?;
    // A trailing slash forces directory semantics, but a non-directory
    // inode is rejected either way, so `_` is fine here.
    let (inode, _trailing_slash) = tables.resolve_path(path)?;
    if !inode.is_dir() {
        return Err(Error::NotDir);
    }
    let entries = tables.list_dir(&inode)?;
    debug!(count = entries.len(), "opened directory");
    Ok(DirStream::from_entries(entries))
}

/// Reads bytes `[byte_offset, byte_offset+len)` of the regular file at
/// `path`, invoking `sink` once per emitted chunk. Returns the number
/// of bytes actually written.
#[instrument(skip(source, sink))]
pub fn read(
    source: &dyn BlockSource,
    path: &[u8],
    byte_offset: u64,
    len: u64,
    sink: &mut dyn FnMut(&[u8]) -> Result<()>,
) -> Result<u64> {
    let tables = Tables::load(source)?;
    let (inode, trailing_slash) = tables.resolve_path(path)?;
    if trailing_slash {
        return Err(Error::NotDir);
    }

    let file = match &inode {
        InodeVariant::Reg(r) => RegularFile::from(r),
        InodeVariant::ExtReg(r) => RegularFile::from(r),
        _ => return Err(Error::Unsupported("read is only defined for regular files")),
    };

    file::stream(
        source,
        tables.sb.compression,
        tables.sb.block_size,
        &file,
        tables.fragments.as_ref(),
        byte_offset,
        len,
        sink,
    )
}

/// Resolves `path` and reports its size: `file_size` for regular
/// files, `symlink_size` for symlinks.
#[instrument(skip(source))]
pub fn size(source: &dyn BlockSource, path: &[u8]) -> Result<u64> {
    let tables = Tables::load(source)?;
    let (inode, _) = tables.resolve_path(path)?;
    Ok(inode.size())
}
