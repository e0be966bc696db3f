// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human-readable dumps of the superblock, inode table, directory
//! table, and a single path's entry. Backs the `sqfsdump` CLI; not
//! part of the core read path.

use crate::block::BlockSource;
use crate::dir::{self, EntryKind};
use crate::error::Result;
use crate::inode::InodeVariant;
use crate::superblock::{Flags, SuperBlock};
use std::fmt::Write as _;

pub fn dump_superblock(sb: &SuperBlock) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- SUPER BLOCK INFORMATION ---");
    let _ = writeln!(out, "Magic number: hsqs");
    let _ = writeln!(out, "Number of inodes: {}", sb.inodes);
    let _ = writeln!(out, "Filesystem creation date: {}", format_mkfs_time(sb.mkfs_time));
    let _ = writeln!(out, "Block size: {} kB", sb.block_size / 1000);
    let _ = writeln!(out, "Number of fragments: {}", sb.fragments);
    let _ = writeln!(out, "Block log: {}", sb.block_log);
    let _ = writeln!(out, "Compression type: {}", sb.compression.name().to_uppercase());
    let _ = writeln!(out, "Super Block Flags: {:#x}", sb.flags.bits());
    let _ = writeln!(out, "Major/Minor numbers: {}/{}", sb.s_major, sb.s_minor);
    let root = sb.root_meta_ref();
    let _ = writeln!(out, "Root inode: start_block={:#x} offset={:#x}", root.start_block, root.offset);
    let _ = writeln!(out, "Bytes used: {}", sb.bytes_used);
    let _ = writeln!(out, "Id table start: {:#x}", sb.id_table_start);
    let _ = writeln!(out, "(xattr) Id table start: {:#x}", sb.xattr_id_table_start);
    let _ = writeln!(out, "Inode table start: {:#x}", sb.inode_table_start);
    let _ = writeln!(out, "Directory table start: {:#x}", sb.directory_table_start);
    let _ = writeln!(out, "Fragment table start: {:#x}", sb.fragment_table_start);
    let _ = writeln!(out, "Export table start: {:#x}", sb.export_table_start);

    let _ = writeln!(out, " --- SUPER BLOCK FLAGS ---");
    for (flag, label) in [
        (Flags::UNCOMPRESSED_INODES, "Uncompressed inodes"),
        (Flags::UNCOMPRESSED_DATA, "Uncompressed data"),
        (Flags::UNCOMPRESSED_FRAGMENTS, "Uncompressed frags"),
        (Flags::NO_FRAGMENTS, "No fragments"),
        (Flags::ALWAYS_FRAGMENTS, "Always fragments"),
        (Flags::DUPLICATES, "Duplicates"),
        (Flags::EXPORTABLE, "Exportable"),
        (Flags::UNCOMPRESSED_XATTRS, "Uncompressed xattrs"),
        (Flags::NO_XATTRS, "No xattrs"),
        (Flags::COMPRESSOR_OPTIONS, "Compressor options present"),
    ] {
        if sb.flags.contains(flag) {
            let _ = writeln!(out, "{label}");
        }
    }

    out
}

/// Converts a SquashFS `mkfs_time` (seconds since the Unix epoch, UTC)
/// to a civil date/time string, without a timezone database: enough
/// for a diagnostic dump, where only the UTC instant matters.
fn format_mkfs_time(epoch_seconds: u32) -> String {
    let days = epoch_seconds as i64 / 86400;
    let secs_of_day = epoch_seconds as i64 % 86400;
    let (y, m, d) = civil_from_days(days);
    let h = secs_of_day / 3600;
    let min = (secs_of_day % 3600) / 60;
    let s = secs_of_day % 60;
    format!("{y:04}-{m:02}-{d:02} {h:02}:{min:02}:{s:02} UTC")
}

/// Howard Hinnant's `civil_from_days` algorithm: days-since-epoch to a
/// proleptic Gregorian (year, month, day).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

pub fn dump_inode(inode: &InodeVariant) -> String {
    let mut out = String::new();
    let header = inode.header();
    let _ = write!(
        out,
        "inode #{} type={:?} mode={:#o} uid_idx={} gid_idx={} mtime={}",
        header.inode_number, header.inode_type, header.mode, header.uid_index, header.gid_index, header.mtime
    );
    match inode {
        InodeVariant::Dir(d) => {
            let _ = write!(out, " start_block={} offset={} file_size={} parent={}", d.start_block, d.offset, d.file_size, d.parent_inode);
        }
        InodeVariant::ExtDir(d) => {
            let _ = write!(
                out,
                " start_block={} offset={} file_size={} parent={} i_count={}",
                d.start_block, d.offset, d.file_size, d.parent_inode, d.i_count
            );
        }
        InodeVariant::Reg(r) => {
            let _ = write!(out, " file_size={} fragment={:#x} offset={} blocks={}", r.file_size, r.fragment, r.offset, r.block_sizes.len());
        }
        InodeVariant::ExtReg(r) => {
            let _ = write!(out, " file_size={} fragment={:#x} offset={} blocks={}", r.file_size, r.fragment, r.offset, r.block_sizes.len());
        }
        InodeVariant::Symlink(s) | InodeVariant::ExtSymlink(s) => {
            let _ = write!(out, " symlink_size={} target={}", s.symlink_size, String::from_utf8_lossy(&s.target));
        }
        InodeVariant::Device(d) | InodeVariant::ExtDevice(d) => {
            let _ = write!(out, " nlink={} rdev={:#x}", d.nlink, d.rdev);
        }
        InodeVariant::Ipc(i) | InodeVariant::ExtIpc(i) => {
            let _ = write!(out, " nlink={}", i.nlink);
        }
    }
    out
}

/// Dumps every inode in the fully-decoded inode table, in on-disk
/// (inode-stream) order rather than by inode number.
pub fn dump_inode_table(table_bytes: &[u8], block_size: u32) -> Result<String> {
    let mut out = String::new();
    let mut offset = 0usize;
    while offset < table_bytes.len() {
        let (inode, size) = crate::inode::decode_inode(&table_bytes[offset..], block_size)?;
        let _ = writeln!(out, "{}", dump_inode(&inode));
        offset += size;
    }
    Ok(out)
}

/// Dumps every `(header, entries)` chunk in a directory's content.
pub fn dump_dir_content(content: &[u8], content_len: usize) -> Result<String> {
    let mut out = String::new();
    dir::scan(content, content_len, |raw| {
        let kind = match raw.kind {
            EntryKind::Dir => "d",
            EntryKind::Regular => "-",
            EntryKind::Symlink => "l",
            EntryKind::BlockDevice => "b",
            EntryKind::CharDevice => "c",
            EntryKind::Fifo => "p",
            EntryKind::Socket => "s",
        };
        let _ = writeln!(
            out,
            "{kind} inode={} name={}",
            raw.inode_number,
            String::from_utf8_lossy(raw.name)
        );
        Ok(())
    })?;
    Ok(out)
}

/// Dumps one entry resolved from `path`, as used by `-e`.
pub fn dump_entry(source: &dyn BlockSource, path: &[u8]) -> Result<String> {
    let size = crate::fs::size(source, path)?;
    let mut out = String::new();
    let _ = writeln!(out, "path={} size={}", String::from_utf8_lossy(path), size);
    Ok(out)
}
