// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only access to SquashFS filesystem images.
//!
//! The entry points are [`fs::probe`], [`fs::opendir`], [`fs::read`],
//! and [`fs::size`], all taking a [`block::BlockSource`], either a
//! memory-mapped image ([`block::MmapSource`]) or a sector-addressed
//! block device ([`block::SectorDeviceSource`]). Everything else in
//! this crate is the machinery those four functions are built from:
//! the metadata plane ([`metadata`]), typed inode/directory decoding
//! ([`inode`], [`dir`]), the fragment table ([`fragment`]), and the
//! file-content streamer ([`file`]).

pub mod block;
pub mod codec;
pub mod dir;
pub mod diag;
pub mod error;
pub mod file;
pub mod fragment;
pub mod fs;
pub mod inode;
pub mod metadata;
pub mod superblock;

pub use block::{BlockSource, FileSectorDevice, MmapSource, SectorDevice, SectorDeviceSource};
pub use dir::{Entry, EntryKind};
pub use error::{Error, Result};
pub use fs::{closedir, opendir, probe, read, size, DirStream};
pub use superblock::SuperBlock;
