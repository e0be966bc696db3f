// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The metadata plane: reconstructing a flat decompressed byte stream
//! from a sequence of on-disk 8 KiB-or-less metadata blocks, and
//! translating between the two coordinate systems callers use to
//! address it.
//!
//! [`MetaRef`] is the "on-disk" coordinate: a byte offset of a block
//! header relative to a table's start, plus a byte offset inside that
//! block's decompressed payload. It's what inodes and the superblock's
//! `root_inode` store. [`DecodedOffset`] is the "flat" coordinate: a
//! byte offset into the fully-decoded table. Keeping these as distinct
//! types means a mix-up is a type error, not a bug found at runtime.

use crate::block::BlockSource;
use crate::codec::{decompress_block, Compression};
use crate::error::{corrupt, Result};

pub const BLOCK_PAYLOAD_MAX: usize = 8192;
const HEADER_SIZE: u64 = 2;

/// A metadata reference `(start_block, offset)` as it appears packed
/// into a 64-bit inode field or a directory entry: low 16 bits are the
/// in-block offset, the next 32 bits are the start-block byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRef {
    pub start_block: u32,
    pub offset: u16,
}

impl MetaRef {
    pub fn new(start_block: u32, offset: u16) -> MetaRef {
        MetaRef { start_block, offset }
    }

    pub fn from_packed(packed: u64) -> MetaRef {
        MetaRef { offset: (packed & 0xFFFF) as u16, start_block: ((packed >> 16) & 0xFFFF_FFFF) as u32 }
    }
}

/// A byte offset into a table's fully-decoded, flattened content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecodedOffset(pub u64);

struct PhysicalBlock {
    /// Byte offset of this block's 2-byte header, relative to the
    /// table's start.
    position: u64,
    /// Cumulative decoded bytes preceding this block.
    cumulative_decoded: u64,
    compressed: bool,
}

/// A table fully decoded into one contiguous buffer, plus the index
/// needed to translate [`MetaRef`]s addressing it into [`DecodedOffset`]s.
pub struct MetaTable {
    bytes: Vec<u8>,
    blocks: Vec<PhysicalBlock>,
}

impl MetaTable {
    /// Decodes every metadata block from `table_start` up to (but not
    /// crossing) `table_end_bound`, both absolute image byte offsets.
    pub fn decode(
        source: &dyn BlockSource,
        compression: Compression,
        table_start: u64,
        table_end_bound: u64,
    ) -> Result<MetaTable> {
        let mut blocks = Vec::new();
        let mut bytes = Vec::new();
        let mut position = 0u64;

        while table_start + position < table_end_bound {
            let header_off = table_start + position;
            if header_off + HEADER_SIZE > table_end_bound {
                corrupt!("metadata block header overruns table bound");
            }
            let (decoded, block_total, compressed) =
                decode_one_block(source, compression, header_off)?;
            if header_off + block_total > table_end_bound {
                corrupt!("metadata block overruns table bound");
            }

            blocks.push(PhysicalBlock {
                position,
                cumulative_decoded: bytes.len() as u64,
                compressed,
            });
            bytes.extend_from_slice(&decoded);

            position += block_total;
        }

        Ok(MetaTable { bytes, blocks })
    }

    /// Translates a `MetaRef` (on-disk coordinates) into a flat
    /// `DecodedOffset` into this table's fully-decoded bytes.
    pub fn resolve(&self, r: MetaRef) -> Result<DecodedOffset> {
        let idx = self
            .blocks
            .binary_search_by_key(&(r.start_block as u64), |b| b.position)
            .map_err(|_| crate::error::Error::CorruptImage("metadata reference points at no block"))?;
        let block = &self.blocks[idx];
        if r.offset as usize >= BLOCK_PAYLOAD_MAX {
            corrupt!("metadata in-block offset out of range");
        }
        Ok(DecodedOffset(block.cumulative_decoded + r.offset as u64))
    }

    /// The fully-decoded table content.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns `len` bytes starting at `offset`, erroring if the range
    /// runs past the end of the decoded table.
    pub fn slice(&self, offset: DecodedOffset, len: usize) -> Result<&[u8]> {
        let start = offset.0 as usize;
        let end = start
            .checked_add(len)
            .ok_or(crate::error::Error::CorruptImage("decoded offset overflow"))?;
        if end > self.bytes.len() {
            corrupt!("decoded offset runs past end of table");
        }
        Ok(&self.bytes[start..end])
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[cfg(test)]
    pub fn block_was_compressed(&self, index: usize) -> bool {
        self.blocks[index].compressed
    }
}

/// Reads and decodes exactly one metadata block whose header sits at
/// absolute offset `header_off`. Returns the decoded payload, the
/// total on-disk size consumed (header + raw payload), and whether it
/// was stored compressed. Used both by [`MetaTable::decode`]'s table
/// scan and by callers (the fragment table) that only need one block.
pub fn decode_one_block(
    source: &dyn BlockSource,
    compression: Compression,
    header_off: u64,
) -> Result<(Vec<u8>, u64, bool)> {
    let mut header_buf = [0u8; 2];
    source.read_at(header_off, &mut header_buf)?;
    let header = u16::from_le_bytes(header_buf);
    let data_size = (header & 0x7FFF) as u32;
    let uncompressed = header & 0x8000 != 0;

    if data_size as usize > BLOCK_PAYLOAD_MAX {
        corrupt!("metadata block payload exceeds 8 KiB");
    }

    let mut raw = vec![0u8; data_size as usize];
    source.read_at(header_off + HEADER_SIZE, &mut raw)?;

    let decoded = if uncompressed {
        raw
    } else {
        let mut decoded = vec![0u8; BLOCK_PAYLOAD_MAX];
        let written = decompress_block(compression, true, &raw, &mut decoded)?;
        decoded.truncate(written);
        decoded
    };

    Ok((decoded, HEADER_SIZE + data_size as u64, !uncompressed))
}
