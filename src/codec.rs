// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decompression of metadata and data blocks.
//!
//! Only zlib is implemented; the other five algorithms the on-disk
//! format allows for (lzo, lz4, xz, lzma, zstd) are recognized at the
//! superblock level but rejected with [`Error::Unsupported`] the first
//! time a compressed block actually needs decoding.

use crate::error::{Error, Result};
use miniz_oxide::inflate::core::inflate_flags::TINFL_FLAG_PARSE_ZLIB_HEADER;
use miniz_oxide::inflate::core::{decompress, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

/// The compression algorithm recorded in the superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Lzma,
    Lzo,
    Xz,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn from_id(id: u16) -> Result<Compression> {
        Ok(match id {
            1 => Compression::Gzip,
            2 => Compression::Lzma,
            3 => Compression::Lzo,
            4 => Compression::Xz,
            5 => Compression::Lz4,
            6 => Compression::Zstd,
            _ => return Err(Error::CorruptImage("unknown compression id")),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Lzma => "lzma",
            Compression::Lzo => "lzo",
            Compression::Xz => "xz",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

/// Inflates `input` (a zlib stream) into `out`, which is a capacity
/// bound, not an exact-size requirement. Returns the number of bytes
/// actually produced. Errors if the stream is malformed, doesn't
/// consume all of `input`, or would overflow `out`.
pub fn inflate_zlib(input: &[u8], out: &mut [u8]) -> Result<usize> {
    let mut decomp = DecompressorOxide::new();
    let (status, in_consumed, out_consumed) =
        decompress(&mut decomp, input, out, 0, TINFL_FLAG_PARSE_ZLIB_HEADER);

    match status {
        TINFLStatus::Done => {}
        _ => return Err(Error::CorruptImage("zlib stream decode failed")),
    }
    if in_consumed != input.len() {
        return Err(Error::CorruptImage("zlib stream length mismatch"));
    }
    Ok(out_consumed)
}

/// Decompresses one block according to `compression` into `out`, a
/// capacity bound. `compressed` selects whether `input` needs
/// inflating at all (a block can be stored verbatim when compression
/// would not have shrunk it). Returns the number of bytes produced.
pub fn decompress_block(
    compression: Compression,
    compressed: bool,
    input: &[u8],
    out: &mut [u8],
) -> Result<usize> {
    if !compressed {
        if input.len() > out.len() {
            return Err(Error::CorruptImage("uncompressed block exceeds capacity"));
        }
        out[..input.len()].copy_from_slice(input);
        return Ok(input.len());
    }
    match compression {
        Compression::Gzip => inflate_zlib(input, out),
        other => Err(Error::Unsupported(other.name())),
    }
}
