// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Random-access read of the bytes backing a SquashFS image.
//!
//! A [`BlockSource`] is a capability to read `len` bytes at an absolute
//! byte offset, with guaranteed full reads or a failure, never a short
//! read. Two providers exist: [`MmapSource`], for an image that is fully
//! memory-mapped (the common case, and the degenerate "sector size = 1"
//! case from the design), and [`SectorDeviceSource`], for an image that
//! sits on a block device exposing fixed-size sectors.

use crate::error::{corrupt, Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

pub trait BlockSource: Send + Sync {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// The total size of the underlying image, in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fully memory-mapped image. `read_at` is a bounds-checked slice copy.
pub struct MmapSource {
    map: memmap2::Mmap,
}

impl MmapSource {
    /// Maps `file` read-only for its entire length.
    pub fn new(file: &File) -> Result<MmapSource> {
        let map = unsafe { memmap2::Mmap::map(file)? };
        Ok(MmapSource { map })
    }

    /// Wraps an already-loaded image held entirely in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<MmapSource> {
        let mut map = memmap2::MmapMut::map_anon(bytes.len().max(1))?;
        map[..bytes.len()].copy_from_slice(&bytes);
        Ok(MmapSource { map: map.make_read_only()? })
    }
}

impl BlockSource for MmapSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let offset = offset as usize;
        let end = offset
            .checked_add(buf.len())
            .ok_or(Error::CorruptImage("read past end of image"))?;
        if end > self.map.len() {
            corrupt!("read past end of image");
        }
        buf.copy_from_slice(&self.map[offset..end]);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.map.len() as u64
    }
}

/// A device exposing fixed-size sectors. Implementors only need to
/// service whole, aligned sector reads; [`SectorDeviceSource`] handles
/// the unaligned-offset arithmetic on top.
pub trait SectorDevice: Send + Sync {
    /// Size of one sector, in bytes. Fixed for the device's lifetime.
    fn sector_size(&self) -> usize;

    /// Total number of sectors on the device.
    fn sector_count(&self) -> u64;

    /// Reads `dst.len() / sector_size()` whole sectors starting at
    /// sector `index` into `dst`.
    fn read_sectors(&self, index: u64, dst: &mut [u8]) -> Result<()>;
}

/// Adapts a [`SectorDevice`] into a [`BlockSource`] by translating
/// arbitrary byte-range reads into sector-aligned reads.
pub struct SectorDeviceSource<D> {
    device: D,
}

impl<D: SectorDevice> SectorDeviceSource<D> {
    pub fn new(device: D) -> SectorDeviceSource<D> {
        SectorDeviceSource { device }
    }
}

impl<D: SectorDevice> BlockSource for SectorDeviceSource<D> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let sector_size = self.device.sector_size() as u64;
        let first_sector = offset / sector_size;
        let within = (offset % sector_size) as usize;
        let span = within as u64 + buf.len() as u64;
        let nsectors = span.div_ceil(sector_size);

        let mut scratch = vec![0u8; (nsectors * sector_size) as usize];
        self.device.read_sectors(first_sector, &mut scratch)?;
        buf.copy_from_slice(&scratch[within..within + buf.len()]);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.device.sector_count() * self.device.sector_size() as u64
    }
}

/// A plain file used as a [`SectorDevice`], for exercising the
/// sector-aligned read path without real block-device hardware.
pub struct FileSectorDevice {
    file: Mutex<File>,
    sector_size: usize,
    sector_count: u64,
}

impl FileSectorDevice {
    pub fn new(file: File, sector_size: usize) -> Result<FileSectorDevice> {
        let len = file.metadata()?.len();
        let sector_count = len / sector_size as u64;
        Ok(FileSectorDevice { file: Mutex::new(file), sector_size, sector_count })
    }
}

impl SectorDevice for FileSectorDevice {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&self, index: u64, dst: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().expect("sector device mutex poisoned");
        file.seek(SeekFrom::Start(index * self.sector_size as u64))?;
        file.read_exact(dst)?;
        Ok(())
    }
}

impl BlockSource for &[u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let offset = offset as usize;
        let end = offset
            .checked_add(buf.len())
            .ok_or(Error::CorruptImage("read past end of image"))?;
        if end > self.len() {
            corrupt!("read past end of image");
        }
        buf.copy_from_slice(&self[offset..end]);
        Ok(())
    }

    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }
}
