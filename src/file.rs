// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming a regular file's bytes: data blocks in order, then the
//! optional shared fragment tail.

use crate::block::BlockSource;
use crate::codec::{decompress_block, Compression};
use crate::error::{corrupt, Error, Result};
use crate::fragment::FragmentTable;
use crate::inode::{ExtRegInode, RegInode, NO_FRAGMENT};

const SIZE_MASK: u32 = 0x00FF_FFFF;
const UNCOMPRESSED_FLAG: u32 = 1 << 24;
/// Slack tolerated above `block_size` before a block's on-disk size is
/// rejected as corrupt; real images never need this but a lax bound
/// avoids false negatives on pathological but valid compressors.
const SLACK: u32 = 256;

/// A uniform view over basic and extended regular-file inodes, since
/// the data-block streaming algorithm is identical for both.
pub struct RegularFile<'a> {
    pub start_block: u64,
    pub fragment: u32,
    pub offset: u32,
    pub file_size: u64,
    pub block_sizes: &'a [u32],
}

impl<'a> From<&'a RegInode> for RegularFile<'a> {
    fn from(r: &'a RegInode) -> RegularFile<'a> {
        RegularFile {
            start_block: r.start_block,
            fragment: r.fragment,
            offset: r.offset,
            file_size: r.file_size as u64,
            block_sizes: &r.block_sizes,
        }
    }
}

impl<'a> From<&'a ExtRegInode> for RegularFile<'a> {
    fn from(r: &'a ExtRegInode) -> RegularFile<'a> {
        RegularFile {
            start_block: r.start_block,
            fragment: r.fragment,
            offset: r.offset,
            file_size: r.file_size,
            block_sizes: &r.block_sizes,
        }
    }
}

impl RegularFile<'_> {
    pub fn has_fragment(&self) -> bool {
        self.fragment != NO_FRAGMENT
    }
}

/// Streams bytes `[byte_offset, byte_offset+len)` of `file` to `sink`.
/// `len` is clamped to whatever remains of `file_size` past
/// `byte_offset`. Returns the number of bytes actually written.
pub fn stream(
    source: &dyn BlockSource,
    compression: Compression,
    block_size: u32,
    file: &RegularFile<'_>,
    fragments: Option<&FragmentTable>,
    byte_offset: u64,
    len: u64,
    sink: &mut dyn FnMut(&[u8]) -> Result<()>,
) -> Result<u64> {
    let file_size = file.file_size;
    if byte_offset >= file_size {
        return Ok(0);
    }
    let want_end = byte_offset.saturating_add(len).min(file_size);
    if want_end <= byte_offset {
        return Ok(0);
    }

    let mut written = 0u64;
    let mut cursor_file_pos = 0u64; // position in the logical file
    let mut disk_cursor = file.start_block;
    let block_size_u64 = block_size as u64;

    for &entry in file.block_sizes {
        if cursor_file_pos >= want_end {
            break;
        }
        let on_disk = entry & SIZE_MASK;
        let compressed = entry & UNCOMPRESSED_FLAG == 0;
        if on_disk > block_size + SLACK {
            corrupt!("data block on-disk size exceeds block_size");
        }

        let block_start = disk_cursor;
        disk_cursor += on_disk as u64;

        let block_logical_len = block_size_u64.min(file_size - cursor_file_pos);
        let block_logical_end = cursor_file_pos + block_logical_len;

        if block_logical_end > byte_offset && cursor_file_pos < want_end {
            let mut raw = vec![0u8; on_disk as usize];
            if on_disk > 0 {
                source.read_at(block_start, &mut raw)?;
            }

            let block_data: Vec<u8> = if on_disk == 0 {
                vec![0u8; block_logical_len as usize]
            } else if compressed {
                let mut decoded = vec![0u8; block_size as usize];
                let n = decompress_block(compression, true, &raw, &mut decoded)?;
                decoded.truncate(n);
                decoded
            } else {
                raw
            };

            let lo = byte_offset.max(cursor_file_pos) - cursor_file_pos;
            let hi = want_end.min(block_logical_end) - cursor_file_pos;
            if hi as usize > block_data.len() {
                corrupt!("decompressed block shorter than file_size implies");
            }
            sink(&block_data[lo as usize..hi as usize])?;
            written += hi - lo;
        }

        cursor_file_pos = block_logical_end;
    }

    if file.has_fragment() && cursor_file_pos < want_end {
        let fragments = fragments.ok_or(Error::CorruptImage("file has fragment but no fragment table"))?;
        let entry = fragments.lookup(file.fragment)?;
        let tail_len = file_size - cursor_file_pos;

        let mut raw = vec![0u8; entry.on_disk_size as usize];
        source.read_at(entry.start, &mut raw)?;
        let fragment_block: Vec<u8> = if entry.compressed {
            let mut decoded = vec![0u8; block_size as usize];
            let n = decompress_block(compression, true, &raw, &mut decoded)?;
            decoded.truncate(n);
            decoded
        } else {
            raw
        };

        let frag_start = file.offset as usize;
        let frag_end = frag_start + tail_len as usize;
        if frag_end > fragment_block.len() {
            corrupt!("fragment tail runs past decompressed fragment block");
        }
        let tail = &fragment_block[frag_start..frag_end];

        let lo = byte_offset.max(cursor_file_pos) - cursor_file_pos;
        let hi = want_end - cursor_file_pos;
        sink(&tail[lo as usize..hi as usize])?;
        written += hi - lo;
    }

    if written > file_size {
        corrupt!("stream wrote more bytes than file_size");
    }
    Ok(written)
}
