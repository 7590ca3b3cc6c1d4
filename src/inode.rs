//! Inode store: fixed-size inode records packed into the inode table,
//! addressed by inode number.

use crate::block::BlockDevice;
use crate::error::Result;

/// Direct block pointers per inode.
pub const DIRECT_BLOCKS: usize = 12;

/// On-disk size of one inode record, in bytes: type(4) + size(4) +
/// link_count(4) + created(8) + modified(8) + accessed(8) +
/// direct_blocks(12*4).
pub const INODE_SIZE: u32 = 4 + 4 + 4 + 8 + 8 + 8 + DIRECT_BLOCKS as u32 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    File,
    Directory,
}

impl InodeType {
    fn to_tag(self) -> u32 {
        match self {
            InodeType::File => 0,
            InodeType::Directory => 1,
        }
    }

    fn from_tag(tag: u32) -> Self {
        match tag {
            1 => InodeType::Directory,
            _ => InodeType::File,
        }
    }
}

/// An in-memory copy of one on-disk inode record.
#[derive(Debug, Clone)]
pub struct Inode {
    pub kind: InodeType,
    pub size: u32,
    pub link_count: u32,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub direct_blocks: [u32; DIRECT_BLOCKS],
}

impl Inode {
    pub fn empty(kind: InodeType) -> Self {
        Self {
            kind,
            size: 0,
            link_count: 0,
            created: 0,
            modified: 0,
            accessed: 0,
            direct_blocks: [0; DIRECT_BLOCKS],
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == InodeType::Directory
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.kind.to_tag().to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.link_count.to_le_bytes());
        buf[12..20].copy_from_slice(&self.created.to_le_bytes());
        buf[20..28].copy_from_slice(&self.modified.to_le_bytes());
        buf[28..36].copy_from_slice(&self.accessed.to_le_bytes());
        for (i, block) in self.direct_blocks.iter().enumerate() {
            let off = 36 + i * 4;
            buf[off..off + 4].copy_from_slice(&block.to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let kind = InodeType::from_tag(u32::from_le_bytes(buf[0..4].try_into().unwrap()));
        let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let link_count = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let created = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let modified = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let accessed = u64::from_le_bytes(buf[28..36].try_into().unwrap());
        let mut direct_blocks = [0u32; DIRECT_BLOCKS];
        for (i, block) in direct_blocks.iter_mut().enumerate() {
            let off = 36 + i * 4;
            *block = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        Self {
            kind,
            size,
            link_count,
            created,
            modified,
            accessed,
            direct_blocks,
        }
    }
}

/// Addresses inode records within `[inode_table_start, data_blocks_start)`.
pub struct InodeStore {
    pub table_start: u32,
}

impl InodeStore {
    pub fn new(table_start: u32) -> Self {
        Self { table_start }
    }

    fn inodes_per_block(dev: &BlockDevice) -> u32 {
        dev.block_size() / INODE_SIZE
    }

    fn locate(&self, dev: &BlockDevice, inode_num: u32) -> (u32, usize) {
        let per_block = Self::inodes_per_block(dev);
        let block = self.table_start + inode_num / per_block;
        let offset = (inode_num % per_block) as usize * INODE_SIZE as usize;
        (block, offset)
    }

    pub fn read(&self, dev: &mut BlockDevice, inode_num: u32) -> Result<Inode> {
        let (block, offset) = self.locate(dev, inode_num);
        log::trace!("inode read: {inode_num} (block {block}, offset {offset})");
        let mut buf = dev.new_block_buf();
        dev.read_block(block, &mut buf)?;
        Ok(Inode::decode(&buf[offset..offset + INODE_SIZE as usize]))
    }

    pub fn write(&self, dev: &mut BlockDevice, inode_num: u32, inode: &Inode) -> Result<()> {
        let (block, offset) = self.locate(dev, inode_num);
        log::trace!("inode write: {inode_num} (block {block}, offset {offset})");
        let mut buf = dev.new_block_buf();
        dev.read_block(block, &mut buf)?;
        inode.encode(&mut buf[offset..offset + INODE_SIZE as usize]);
        dev.write_block(block, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut inode = Inode::empty(InodeType::Directory);
        inode.size = 128;
        inode.link_count = 3;
        inode.created = 10;
        inode.modified = 20;
        inode.accessed = 30;
        inode.direct_blocks[0] = 7;
        inode.direct_blocks[1] = 9;

        let mut buf = vec![0u8; INODE_SIZE as usize];
        inode.encode(&mut buf);
        let decoded = Inode::decode(&buf);

        assert_eq!(decoded.kind, InodeType::Directory);
        assert_eq!(decoded.size, 128);
        assert_eq!(decoded.link_count, 3);
        assert_eq!(decoded.created, 10);
        assert_eq!(decoded.modified, 20);
        assert_eq!(decoded.accessed, 30);
        assert_eq!(decoded.direct_blocks[0], 7);
        assert_eq!(decoded.direct_blocks[1], 9);
    }

    #[test]
    fn read_write_via_store() {
        let file = tempfile::tempfile().unwrap();
        file.set_len(4096 * 4).unwrap();
        let mut dev = BlockDevice::new(file, 4096);
        let store = InodeStore::new(0);

        let mut inode = Inode::empty(InodeType::File);
        inode.size = 42;
        store.write(&mut dev, 5, &inode).unwrap();

        let back = store.read(&mut dev, 5).unwrap();
        assert_eq!(back.size, 42);
        assert_eq!(back.kind, InodeType::File);

        // A neighboring inode in the same block must remain zeroed.
        let neighbor = store.read(&mut dev, 6).unwrap();
        assert_eq!(neighbor.size, 0);
    }
}
