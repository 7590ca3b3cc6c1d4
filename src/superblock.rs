//! The on-disk superblock: a fixed record in block 0 describing the
//! layout of the rest of the image.

use crate::inode::INODE_SIZE;
use crate::util::ceil_division;

/// Identifies this disk image format ("DATA FILE" in leetspeak, per the
/// reference this crate was ported from).
pub const MAGIC: u32 = 0xDA7AF17E;

#[derive(Debug, Clone)]
pub struct Superblock {
    pub magic: u32,
    pub total_blocks: u32,
    pub total_inodes: u32,
    pub block_size: u32,
    pub inode_bitmap_start: u32,
    pub block_bitmap_start: u32,
    pub inode_table_start: u32,
    pub data_blocks_start: u32,
}

impl Superblock {
    /// Computes a fresh layout for a disk image of `total_size` bytes with
    /// the given `block_size`, following the same arithmetic as the
    /// reference implementation's `fs_format`.
    pub fn layout(total_size: u64, block_size: u32) -> Self {
        let total_blocks = (total_size / block_size as u64) as u32;
        let total_inodes = ((total_blocks / 4) as u32).max(16);

        let inode_bitmap_start = 1u32;
        let inode_bitmap_blocks = ceil_division(total_inodes as u64, 8 * block_size as u64) as u32;
        let block_bitmap_start = inode_bitmap_start + inode_bitmap_blocks;
        let block_bitmap_blocks = ceil_division(total_blocks as u64, 8 * block_size as u64) as u32;
        let inode_table_start = block_bitmap_start + block_bitmap_blocks;
        let inode_table_blocks =
            ceil_division(total_inodes as u64 * INODE_SIZE as u64, block_size as u64) as u32;
        let data_blocks_start = inode_table_start + inode_table_blocks;

        Self {
            magic: MAGIC,
            total_blocks,
            total_inodes,
            block_size,
            inode_bitmap_start,
            block_bitmap_start,
            inode_table_start,
            data_blocks_start,
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.total_blocks.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_inodes.to_le_bytes());
        buf[12..16].copy_from_slice(&self.block_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.inode_bitmap_start.to_le_bytes());
        buf[20..24].copy_from_slice(&self.block_bitmap_start.to_le_bytes());
        buf[24..28].copy_from_slice(&self.inode_table_start.to_le_bytes());
        buf[28..32].copy_from_slice(&self.data_blocks_start.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            total_blocks: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            total_inodes: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            block_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            inode_bitmap_start: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            block_bitmap_start: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            inode_table_start: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
            data_blocks_start: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_reference_scenario_a() {
        // `create 64 4`: 64 KiB disk, 4 KiB blocks.
        let sb = Superblock::layout(64 * 1024, 4 * 1024);
        assert_eq!(sb.total_blocks, 16);
        assert_eq!(sb.total_inodes, 16);
        assert_eq!(sb.inode_bitmap_start, 1);
        assert_eq!(sb.block_bitmap_start, 2);
        assert!(sb.inode_table_start >= sb.block_bitmap_start);
        assert!(sb.data_blocks_start < sb.total_blocks);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let sb = Superblock::layout(64 * 1024, 4 * 1024);
        let mut buf = vec![0u8; 4096];
        sb.encode(&mut buf);
        let back = Superblock::decode(&buf);
        assert_eq!(back.magic, MAGIC);
        assert_eq!(back.total_blocks, sb.total_blocks);
        assert_eq!(back.data_blocks_start, sb.data_blocks_start);
    }
}
