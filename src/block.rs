//! Block I/O layer: reads and writes one block at a time against the open
//! disk image file. Every higher layer funnels its disk access through
//! this type; there is no caching and no partial I/O.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// A seekable disk image, addressed in fixed-size blocks.
pub struct BlockDevice {
    file: File,
    block_size: u32,
}

impl BlockDevice {
    pub fn new(file: File, block_size: u32) -> Self {
        Self { file, block_size }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Reads block `n` into `buf`, which must be exactly `block_size` bytes.
    pub fn read_block(&mut self, n: u32, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        log::trace!("block read: {n}");
        self.file.seek(SeekFrom::Start(n as u64 * self.block_size as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` (exactly `block_size` bytes) to block `n`.
    pub fn write_block(&mut self, n: u32, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        log::trace!("block write: {n}");
        self.file.seek(SeekFrom::Start(n as u64 * self.block_size as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Allocates a zeroed block-sized buffer.
    pub fn new_block_buf(&self) -> Vec<u8> {
        vec![0u8; self.block_size as usize]
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_roundtrip() {
        let file = tempfile::tempfile().unwrap();
        file.set_len(4096 * 4).unwrap();
        let mut dev = BlockDevice::new(file, 4096);

        let mut buf = dev.new_block_buf();
        buf[0] = 0xAB;
        buf[4095] = 0xCD;
        dev.write_block(2, &buf).unwrap();

        let mut readback = dev.new_block_buf();
        dev.read_block(2, &mut readback).unwrap();
        assert_eq!(readback, buf);

        let mut other = dev.new_block_buf();
        dev.read_block(0, &mut other).unwrap();
        assert_eq!(other, vec![0u8; 4096]);
    }
}
