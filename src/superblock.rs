// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The 96-byte SquashFS superblock: the root of every other table.

use crate::codec::Compression;
use crate::error::{corrupt, Error, Result};

pub const MAGIC: u32 = 0x7371_7368;
pub const SUPERBLOCK_SIZE: usize = 96;
pub const NOT_PRESENT: u64 = 0xFFFF_FFFF_FFFF_FFFF;

bitflags::bitflags! {
    /// Superblock-level feature flags (`squashfs_super_block.flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const UNCOMPRESSED_INODES    = 1 << 0;
        const UNCOMPRESSED_DATA      = 1 << 1;
        const CHECK                  = 1 << 2;
        const UNCOMPRESSED_FRAGMENTS = 1 << 3;
        const NO_FRAGMENTS           = 1 << 4;
        const ALWAYS_FRAGMENTS       = 1 << 5;
        const DUPLICATES             = 1 << 6;
        const EXPORTABLE             = 1 << 7;
        const UNCOMPRESSED_XATTRS    = 1 << 8;
        const NO_XATTRS              = 1 << 9;
        const COMPRESSOR_OPTIONS     = 1 << 10;
    }
}

/// A decoded superblock. Field names and widths follow the on-disk
/// record exactly; see the data model for the byte layout.
#[derive(Debug, Clone)]
pub struct SuperBlock {
    pub inodes: u32,
    pub mkfs_time: u32,
    pub block_size: u32,
    pub fragments: u32,
    pub compression: Compression,
    pub block_log: u16,
    pub flags: Flags,
    pub no_ids: u16,
    pub s_major: u16,
    pub s_minor: u16,
    pub root_inode: u64,
    pub bytes_used: u64,
    pub id_table_start: u64,
    pub xattr_id_table_start: u64,
    pub inode_table_start: u64,
    pub directory_table_start: u64,
    pub fragment_table_start: u64,
    pub export_table_start: u64,
}

fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(b[at..at + 4].try_into().unwrap())
}

fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes(b[at..at + 2].try_into().unwrap())
}

fn le_u64(b: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(b[at..at + 8].try_into().unwrap())
}

impl SuperBlock {
    /// Parses a superblock from the first [`SUPERBLOCK_SIZE`] bytes of
    /// an image, checking `magic` and every structural invariant.
    pub fn parse(bytes: &[u8]) -> Result<SuperBlock> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(Error::CorruptImage("image shorter than superblock"));
        }
        if le_u32(bytes, 0) != MAGIC {
            return Err(Error::BadMagic);
        }

        let sb = SuperBlock {
            inodes: le_u32(bytes, 4),
            mkfs_time: le_u32(bytes, 8),
            block_size: le_u32(bytes, 12),
            fragments: le_u32(bytes, 16),
            compression: Compression::from_id(le_u16(bytes, 20))?,
            block_log: le_u16(bytes, 22),
            flags: Flags::from_bits_truncate(le_u16(bytes, 24)),
            no_ids: le_u16(bytes, 26),
            s_major: le_u16(bytes, 28),
            s_minor: le_u16(bytes, 30),
            root_inode: le_u64(bytes, 32),
            bytes_used: le_u64(bytes, 40),
            id_table_start: le_u64(bytes, 48),
            xattr_id_table_start: le_u64(bytes, 56),
            inode_table_start: le_u64(bytes, 64),
            directory_table_start: le_u64(bytes, 72),
            fragment_table_start: le_u64(bytes, 80),
            export_table_start: le_u64(bytes, 88),
        };
        sb.validate()?;
        Ok(sb)
    }

    fn validate(&self) -> Result<()> {
        if self.block_size != 1u32 << self.block_log {
            corrupt!("block_size does not match block_log");
        }
        if !(4096..=1 << 20).contains(&self.block_size) {
            corrupt!("block_size out of range");
        }
        for start in [
            self.id_table_start,
            self.xattr_id_table_start,
            self.inode_table_start,
            self.directory_table_start,
            self.fragment_table_start,
            self.export_table_start,
        ] {
            if start != NOT_PRESENT && start > self.bytes_used {
                corrupt!("table start exceeds bytes_used");
            }
        }
        Ok(())
    }

    /// The root inode's metadata reference, decoded from `root_inode`.
    pub fn root_meta_ref(&self) -> crate::metadata::MetaRef {
        crate::metadata::MetaRef::from_packed(self.root_inode)
    }

    pub fn has_fragment_table(&self) -> bool {
        self.fragment_table_start != NOT_PRESENT && self.fragments > 0
    }
}

static_assertions::const_assert_eq!(SUPERBLOCK_SIZE, 96);
