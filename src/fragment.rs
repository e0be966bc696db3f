// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two-level fragment table: an index of pointers to metadata
//! blocks, each holding up to 512 fragment entries.

use crate::block::BlockSource;
use crate::codec::Compression;
use crate::error::{corrupt, Error, Result};
use crate::metadata::decode_one_block;

const ENTRIES_PER_METADATA_BLOCK: usize = 512;
const ENTRY_SIZE: usize = 16;
pub const UNCOMPRESSED_FLAG: u32 = 1 << 24;

/// A decoded fragment-block-entry: where the fragment block sits in
/// the image, how big it is on disk, and whether it's compressed.
#[derive(Debug, Clone, Copy)]
pub struct FragmentEntry {
    pub start: u64,
    pub on_disk_size: u32,
    pub compressed: bool,
}

/// The fragment table in its fully-resolved form: every metadata block
/// the index points at has been decoded up front, matching the eager
/// decode strategy used for the inode and directory tables.
pub struct FragmentTable {
    entries: Vec<FragmentEntry>,
}

fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}
fn le_u64(b: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(b[at..at + 8].try_into().unwrap())
}

impl FragmentTable {
    /// Loads all `fragment_count` entries reachable from the two-level
    /// structure rooted at `fragment_table_start`.
    pub fn load(
        source: &dyn BlockSource,
        compression: Compression,
        fragment_table_start: u64,
        fragment_count: u32,
        table_end_bound: u64,
    ) -> Result<FragmentTable> {
        let nblocks = (fragment_count as usize).div_ceil(ENTRIES_PER_METADATA_BLOCK);
        let mut entries = Vec::with_capacity(fragment_count as usize);

        for block_idx in 0..nblocks {
            let mut ptr_buf = [0u8; 8];
            let ptr_off = fragment_table_start + (block_idx as u64) * 8;
            if ptr_off + 8 > table_end_bound {
                corrupt!("fragment index pointer runs past table bound");
            }
            source.read_at(ptr_off, &mut ptr_buf)?;
            let block_start = u64::from_le_bytes(ptr_buf);

            let (bytes, _, _) = decode_one_block(source, compression, block_start)?;
            let bytes = bytes.as_slice();

            let remaining = fragment_count as usize - block_idx * ENTRIES_PER_METADATA_BLOCK;
            let in_this_block = remaining.min(ENTRIES_PER_METADATA_BLOCK);
            if bytes.len() < in_this_block * ENTRY_SIZE {
                corrupt!("fragment metadata block too short");
            }
            for i in 0..in_this_block {
                let at = i * ENTRY_SIZE;
                let start = le_u64(bytes, at);
                let size_field = le_u32(bytes, at + 8);
                entries.push(FragmentEntry {
                    start,
                    on_disk_size: size_field & 0x00FF_FFFF,
                    compressed: size_field & UNCOMPRESSED_FLAG == 0,
                });
            }
        }

        Ok(FragmentTable { entries })
    }

    /// Looks up fragment entry `index`, the value stored in a regular
    /// file inode's `fragment` field.
    pub fn lookup(&self, index: u32) -> Result<FragmentEntry> {
        self.entries.get(index as usize).copied().ok_or(Error::CorruptImage("fragment index out of range"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_fragment_metadata_block(entries: &[(u64, u32, bool)]) -> Vec<u8> {
        let mut payload = Vec::new();
        for &(start, on_disk_size, compressed) in entries {
            payload.extend_from_slice(&start.to_le_bytes());
            let flag = if compressed { 0 } else { UNCOMPRESSED_FLAG };
            payload.extend_from_slice(&(on_disk_size | flag).to_le_bytes());
            payload.extend_from_slice(&0u32.to_le_bytes()); // pad
        }
        let header = (payload.len() as u16) | 0x8000; // uncompressed
        let mut block = header.to_le_bytes().to_vec();
        block.extend_from_slice(&payload);
        block
    }

    #[test]
    fn loads_single_block_single_entry() {
        let meta_block = build_fragment_metadata_block(&[(4096, 1500, true)]);
        // Layout: [8-byte pointer][metadata block]
        let mut img = Vec::new();
        let ptr_value = 8u64; // metadata block starts right after the pointer
        img.extend_from_slice(&ptr_value.to_le_bytes());
        img.extend_from_slice(&meta_block);

        let table = FragmentTable::load(&(&img[..] as &[u8]), Compression::Gzip, 0, 1, img.len() as u64).unwrap();
        assert_eq!(table.len(), 1);
        let e = table.lookup(0).unwrap();
        assert_eq!(e.start, 4096);
        assert_eq!(e.on_disk_size, 1500);
        assert!(e.compressed);
    }

    #[test]
    fn uncompressed_flag_is_bit_24() {
        let meta_block = build_fragment_metadata_block(&[(0, 100, false)]);
        let mut img = 8u64.to_le_bytes().to_vec();
        img.extend_from_slice(&meta_block);
        let table = FragmentTable::load(&(&img[..] as &[u8]), Compression::Gzip, 0, 1, img.len() as u64).unwrap();
        assert!(!table.lookup(0).unwrap().compressed);
    }

    #[test]
    fn lookup_out_of_range_is_corrupt() {
        let meta_block = build_fragment_metadata_block(&[(0, 10, true)]);
        let mut img = 8u64.to_le_bytes().to_vec();
        img.extend_from_slice(&meta_block);
        let table = FragmentTable::load(&(&img[..] as &[u8]), Compression::Gzip, 0, 1, img.len() as u64).unwrap();
        assert!(table.lookup(5).is_err());
    }
}
