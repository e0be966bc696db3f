// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end exercise of the public API against one hand-assembled
//! image, covering every lettered scenario from the testable-properties
//! section: a plain file at the root (A, C), a nested path whose file
//! has both a sparse data block and a fragment tail (B), a missing path
//! (D), a trailing-slash lookup against a non-directory (E), and an
//! empty directory (F).
//!
//! No `mksquashfs` binary is available in this environment, so the
//! image is built by hand from the same on-disk primitives the crate
//! decodes: a 96-byte superblock, one uncompressed metadata block for
//! the inode table, one for the directory table, and a two-level
//! fragment table with a single entry.

use sqfsro::inode::NO_FRAGMENT;
use sqfsro::superblock::{MAGIC, NOT_PRESENT, SUPERBLOCK_SIZE};
use sqfsro::Error;

const UNCOMPRESSED_FLAG: u32 = 1 << 24;
const BLOCK_SIZE: u32 = 4096;

struct ImageBuilder {
    buf: Vec<u8>,
}

impl ImageBuilder {
    fn new() -> ImageBuilder {
        ImageBuilder { buf: vec![0u8; SUPERBLOCK_SIZE] }
    }

    fn append(&mut self, bytes: &[u8]) -> u64 {
        let at = self.buf.len() as u64;
        self.buf.extend_from_slice(bytes);
        at
    }

    fn append_uncompressed_metadata(&mut self, payload: &[u8]) -> u64 {
        let at = self.buf.len() as u64;
        let header = (payload.len() as u16) | 0x8000;
        self.buf.extend_from_slice(&header.to_le_bytes());
        self.buf.extend_from_slice(payload);
        at
    }
}

fn dir_inode_bytes(inode_number: u32, start_block: u32, offset: u16, file_size: u16, parent: u32) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    b[0..2].copy_from_slice(&1u16.to_le_bytes()); // Dir
    b[12..16].copy_from_slice(&inode_number.to_le_bytes());
    b.extend_from_slice(&start_block.to_le_bytes());
    b.extend_from_slice(&1u32.to_le_bytes()); // nlink
    b.extend_from_slice(&file_size.to_le_bytes());
    b.extend_from_slice(&offset.to_le_bytes());
    b.extend_from_slice(&parent.to_le_bytes());
    b
}

fn reg_inode_bytes(
    inode_number: u32,
    start_block: u32,
    fragment: u32,
    frag_offset: u32,
    file_size: u32,
    block_sizes: &[u32],
) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    b[0..2].copy_from_slice(&2u16.to_le_bytes()); // Reg
    b[12..16].copy_from_slice(&inode_number.to_le_bytes());
    b.extend_from_slice(&start_block.to_le_bytes());
    b.extend_from_slice(&fragment.to_le_bytes());
    b.extend_from_slice(&frag_offset.to_le_bytes());
    b.extend_from_slice(&file_size.to_le_bytes());
    for &s in block_sizes {
        b.extend_from_slice(&s.to_le_bytes());
    }
    b
}

fn symlink_inode_bytes(inode_number: u32, nlink: u32, target: &[u8]) -> Vec<u8> {
    let mut b = vec![0u8; 16];
    b[0..2].copy_from_slice(&3u16.to_le_bytes()); // Symlink
    b[12..16].copy_from_slice(&inode_number.to_le_bytes());
    b.extend_from_slice(&nlink.to_le_bytes());
    b.extend_from_slice(&(target.len() as u32).to_le_bytes());
    b.extend_from_slice(target);
    b
}

fn dir_chunk(start_block: u32, inode_base: u32, entries: &[(u16, i16, u16, &[u8])]) -> Vec<u8> {
    let mut b = Vec::new();
    b.extend_from_slice(&((entries.len() - 1) as u32).to_le_bytes());
    b.extend_from_slice(&start_block.to_le_bytes());
    b.extend_from_slice(&inode_base.to_le_bytes());
    for &(offset, inode_offset, kind, name) in entries {
        b.extend_from_slice(&offset.to_le_bytes());
        b.extend_from_slice(&inode_offset.to_le_bytes());
        b.extend_from_slice(&kind.to_le_bytes());
        b.extend_from_slice(&((name.len() - 1) as u16).to_le_bytes());
        b.extend_from_slice(name);
    }
    b
}

/// Builds an image with this tree:
///
/// ```text
/// /
/// |-- hello.txt   (13 bytes, single uncompressed data block, no fragment)
/// |-- a/
/// |   `-- b/
/// |       `-- c.bin   (4100 zero bytes: one sparse data block + a 4-byte
/// |                     fragment tail)
/// `-- empty/      (file_size == 3, no entries)
/// ```
///
/// Inode numbers: 1=hello.txt, 2=c.bin, 3=dir b, 4=dir a, 5=dir empty,
/// 6=root (the root inode number must equal `superblock.inodes`), 7=link
/// (a symlink to "hello.txt"). The symlink inode is stored ahead of two
/// other inodes in the inode table, so a wrong symlink size desyncs the
/// linear `find_inode` walk and misdecodes everything after it.
fn build_image() -> Vec<u8> {
    let mut img = ImageBuilder::new();

    let hello_data: &[u8] = b"Hello, world!";
    let hello_data_start = img.append(hello_data);

    // c.bin's fragment tail: 4100 % 4096 = 4 zero bytes, stored raw.
    let frag_data_start = img.append(&[0u8; 4]);

    let dir_b_chunk = dir_chunk(0, 0, &[(0, 2, 2, b"c.bin")]);
    let dir_a_chunk = dir_chunk(0, 0, &[(0, 3, 1, b"b")]);
    let root_chunk = dir_chunk(
        0,
        0,
        &[
            (0, 1, 2, b"hello.txt"),
            (0, 4, 1, b"a"),
            (0, 5, 1, b"empty"),
            (0, 7, 3, b"link"),
        ],
    );

    // All three chunks live in one decoded metadata block, back to back;
    // each directory inode's `offset` is this chunk's byte position
    // within that block.
    let dir_b_offset = 0u16;
    let dir_a_offset = dir_b_chunk.len() as u16;
    let root_offset = dir_a_offset + dir_a_chunk.len() as u16;
    let empty_offset = 0u16; // content_len is 0, so any in-bounds offset works

    let mut dir_payload = Vec::new();
    dir_payload.extend_from_slice(&dir_b_chunk);
    dir_payload.extend_from_slice(&dir_a_chunk);
    dir_payload.extend_from_slice(&root_chunk);

    let dir_b_file_size = (dir_b_chunk.len() + 3) as u16;
    let dir_a_file_size = (dir_a_chunk.len() + 3) as u16;
    let root_file_size = (root_chunk.len() + 3) as u16;

    let hello_block_sizes = [hello_data.len() as u32 | UNCOMPRESSED_FLAG];
    let hello_inode = reg_inode_bytes(1, hello_data_start as u32, NO_FRAGMENT, 0, hello_data.len() as u32, &hello_block_sizes);

    let cbin_file_size = 4100u32;
    let cbin_block_sizes = [0u32]; // one sparse (all-zero) data block
    let cbin_inode = reg_inode_bytes(2, 0, 0, 0, cbin_file_size, &cbin_block_sizes);

    // Stored ahead of three other inodes, so a wrong fixed size here
    // would misdecode the rest of the table.
    let link_inode = symlink_inode_bytes(7, 1, b"hello.txt");

    let dir_b_inode = dir_inode_bytes(3, 0, dir_b_offset, dir_b_file_size, 6);
    let dir_a_inode = dir_inode_bytes(4, 0, dir_a_offset, dir_a_file_size, 6);
    let dir_empty_inode = dir_inode_bytes(5, 0, empty_offset, 3, 6);
    let root_inode = dir_inode_bytes(6, 0, root_offset, root_file_size, 6);

    let mut inode_payload = Vec::new();
    inode_payload.extend_from_slice(&hello_inode);
    inode_payload.extend_from_slice(&cbin_inode);
    inode_payload.extend_from_slice(&link_inode);
    inode_payload.extend_from_slice(&dir_b_inode);
    inode_payload.extend_from_slice(&dir_a_inode);
    inode_payload.extend_from_slice(&dir_empty_inode);
    inode_payload.extend_from_slice(&root_inode);

    let inode_table_start = img.append_uncompressed_metadata(&inode_payload);
    let directory_table_start = img.append_uncompressed_metadata(&dir_payload);

    // Fragment table: a one-entry, two-level structure. The pointer
    // array is one u64 pointing immediately past itself, at a metadata
    // block holding the single fragment entry.
    let fragment_table_start = img.buf.len() as u64;
    let frag_meta_block_start = fragment_table_start + 8;
    img.append(&frag_meta_block_start.to_le_bytes());

    let mut frag_entry_payload = Vec::new();
    frag_entry_payload.extend_from_slice(&frag_data_start.to_le_bytes());
    frag_entry_payload.extend_from_slice(&(4u32 | UNCOMPRESSED_FLAG).to_le_bytes());
    frag_entry_payload.extend_from_slice(&0u32.to_le_bytes());
    img.append_uncompressed_metadata(&frag_entry_payload);

    let bytes_used = img.buf.len() as u64;

    let mut sb = vec![0u8; SUPERBLOCK_SIZE];
    sb[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    sb[4..8].copy_from_slice(&6u32.to_le_bytes()); // inodes
    sb[12..16].copy_from_slice(&BLOCK_SIZE.to_le_bytes());
    sb[16..20].copy_from_slice(&1u32.to_le_bytes()); // fragments
    sb[20..22].copy_from_slice(&1u16.to_le_bytes()); // gzip (never actually invoked)
    sb[22..24].copy_from_slice(&12u16.to_le_bytes()); // block_log: 1<<12 == 4096
    sb[26..28].copy_from_slice(&1u16.to_le_bytes()); // no_ids
    sb[28..30].copy_from_slice(&4u16.to_le_bytes()); // s_major
    sb[40..48].copy_from_slice(&bytes_used.to_le_bytes());
    sb[48..56].copy_from_slice(&NOT_PRESENT.to_le_bytes()); // id_table_start
    sb[56..64].copy_from_slice(&NOT_PRESENT.to_le_bytes()); // xattr_id_table_start
    sb[64..72].copy_from_slice(&inode_table_start.to_le_bytes());
    sb[72..80].copy_from_slice(&directory_table_start.to_le_bytes());
    sb[80..88].copy_from_slice(&fragment_table_start.to_le_bytes());
    sb[88..96].copy_from_slice(&NOT_PRESENT.to_le_bytes()); // export_table_start

    img.buf[0..SUPERBLOCK_SIZE].copy_from_slice(&sb);
    img.buf
}

#[test]
fn scenario_a_hello_file_listed_and_read_whole() {
    let img = build_image();
    let source: &[u8] = &img;

    let mut stream = sqfsro::opendir(&source, b"/").unwrap();
    let mut names: Vec<(Vec<u8>, Option<u64>)> = Vec::new();
    while let Some(entry) = stream.readdir() {
        names.push((entry.name, entry.size));
    }
    assert!(names.contains(&(b"hello.txt".to_vec(), Some(13))));
    assert!(names.iter().any(|(n, _)| n == b"a"));
    assert!(names.iter().any(|(n, _)| n == b"empty"));

    let mut out = Vec::new();
    let written = sqfsro::read(&source, b"/hello.txt", 0, 13, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(written, 13);
    assert_eq!(out, b"Hello, world!");
}

#[test]
fn scenario_b_nested_path_sparse_block_plus_fragment() {
    let img = build_image();
    let source: &[u8] = &img;

    assert_eq!(sqfsro::size(&source, b"/a/b/c.bin").unwrap(), 4100);

    let mut out = Vec::new();
    let written = sqfsro::read(&source, b"/a/b/c.bin", 0, 4100, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(written, 4100);
    assert_eq!(out.len(), 4100);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn scenario_b_partial_read_spans_data_block_and_fragment_boundary() {
    let img = build_image();
    let source: &[u8] = &img;

    // Bytes [4094, 4100) straddle the sparse data block's end (at 4096)
    // and the fragment tail's 4 bytes.
    let mut out = Vec::new();
    let written = sqfsro::read(&source, b"/a/b/c.bin", 4094, 6, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(written, 6);
    assert_eq!(out, vec![0u8; 6]);
}

#[test]
fn scenario_c_partial_read_of_hello_file() {
    let img = build_image();
    let source: &[u8] = &img;

    let mut out = Vec::new();
    sqfsro::read(&source, b"/hello.txt", 7, 5, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(out, b"world");
}

#[test]
fn scenario_d_missing_path_is_not_found_and_writes_nothing() {
    let img = build_image();
    let source: &[u8] = &img;

    let mut out = Vec::new();
    let err = sqfsro::read(&source, b"/nope", 0, 1, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, Error::NotFound));
    assert!(out.is_empty());
}

#[test]
fn scenario_e_trailing_slash_on_regular_file_is_not_dir() {
    let img = build_image();
    let source: &[u8] = &img;

    assert!(matches!(sqfsro::opendir(&source, b"/hello.txt/"), Err(Error::NotDir)));
}

#[test]
fn scenario_f_empty_directory_yields_no_entries() {
    let img = build_image();
    let source: &[u8] = &img;

    let mut stream = sqfsro::opendir(&source, b"/empty/").unwrap();
    assert!(stream.is_empty());
    assert!(stream.readdir().is_none());
}

#[test]
fn opendir_is_idempotent_across_calls() {
    let img = build_image();
    let source: &[u8] = &img;

    let collect = |s: &mut sqfsro::DirStream| -> Vec<(Vec<u8>, Option<u64>)> {
        let mut v = Vec::new();
        while let Some(e) = s.readdir() {
            v.push((e.name, e.size));
        }
        v
    };

    let mut first = sqfsro::opendir(&source, b"/").unwrap();
    let mut second = sqfsro::opendir(&source, b"/").unwrap();
    assert_eq!(collect(&mut first), collect(&mut second));
}

#[test]
fn every_inode_number_is_found_by_walking_the_table() {
    let img = build_image();
    let source: &[u8] = &img;

    let sb = sqfsro::probe(&source).unwrap();
    let table = sqfsro::metadata::MetaTable::decode(
        &source,
        sb.compression,
        sb.inode_table_start,
        sb.directory_table_start,
    )
    .unwrap();

    for n in 1..=sb.inodes {
        let inode = sqfsro::inode::find_inode(table.bytes(), sb.block_size, n).unwrap();
        assert_eq!(inode.header().inode_number, n);
    }
}

#[test]
fn probe_reports_block_size_and_inode_count() {
    let img = build_image();
    let source: &[u8] = &img;
    let sb = sqfsro::probe(&source).unwrap();
    assert_eq!(sb.block_size, BLOCK_SIZE);
    assert_eq!(sb.inodes, 6);
}

#[test]
fn symlink_size_is_reported_and_later_inodes_still_resolve() {
    let img = build_image();
    let source: &[u8] = &img;

    // "link" is stored ahead of dir b, dir a, dir empty, and root in the
    // inode table; if the symlink's on-disk size is wrong, the linear
    // walk desyncs and one of those lookups fails or returns garbage.
    let mut stream = sqfsro::opendir(&source, b"/").unwrap();
    let link = stream
        .by_ref()
        .find(|e| e.name == b"link")
        .expect("link entry listed in root");
    assert_eq!(link.kind, sqfsro::EntryKind::Symlink);

    assert_eq!(sqfsro::size(&source, b"/link").unwrap(), 9); // "hello.txt".len()

    assert_eq!(sqfsro::size(&source, b"/a/b/c.bin").unwrap(), 4100);
    assert_eq!(sqfsro::size(&source, b"/hello.txt").unwrap(), 13);
    let mut empty = sqfsro::opendir(&source, b"/empty/").unwrap();
    assert!(empty.readdir().is_none());
}

#[test]
fn mmap_backed_image_on_a_real_file_reads_identically() {
    use sqfsro::block::MmapSource;
    use std::io::Write;

    let img = build_image();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&img).unwrap();
    file.flush().unwrap();

    let source = MmapSource::new(file.as_file()).unwrap();

    let mut out = Vec::new();
    let written = sqfsro::read(&source, b"/hello.txt", 0, 13, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(written, 13);
    assert_eq!(out, b"Hello, world!");
    assert_eq!(sqfsro::size(&source, b"/a/b/c.bin").unwrap(), 4100);
}

#[test]
fn sector_device_backed_image_handles_unaligned_reads() {
    use sqfsro::block::{FileSectorDevice, SectorDeviceSource};
    use std::io::Write;

    // A sector size that does not evenly divide the superblock or the
    // metadata-block headers, so every higher-level read this crate
    // issues is necessarily unaligned at least once.
    const SECTOR_SIZE: usize = 512;

    let mut img = build_image();
    while img.len() % SECTOR_SIZE != 0 {
        img.push(0);
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&img).unwrap();
    file.flush().unwrap();

    let device = FileSectorDevice::new(file.reopen().unwrap(), SECTOR_SIZE).unwrap();
    let source = SectorDeviceSource::new(device);

    let mut out = Vec::new();
    let written = sqfsro::read(&source, b"/a/b/c.bin", 4094, 6, &mut |c| {
        out.extend_from_slice(c);
        Ok(())
    })
    .unwrap();
    assert_eq!(written, 6);
    assert_eq!(out, vec![0u8; 6]);
}
