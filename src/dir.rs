//! Directory layer: treats a directory inode's direct blocks as a sequence
//! of fixed-size directory entries.

use crate::block::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::{Inode, InodeStore};

/// Maximum entry name length, including the NUL terminator.
pub const MAX_NAME: usize = 60;

/// On-disk size of one directory entry: name(60) + inode_num(4).
pub const ENTRY_SIZE: u32 = MAX_NAME as u32 + 4;

/// One (name, inode number) pair, decoded from its 64-byte on-disk slot.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub inode_num: u32,
}

fn encode_entry(name: &str, inode_num: u32, buf: &mut [u8]) {
    debug_assert!(buf.len() == ENTRY_SIZE as usize);
    buf[..MAX_NAME].fill(0);
    let bytes = name.as_bytes();
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[MAX_NAME..].copy_from_slice(&inode_num.to_le_bytes());
}

fn decode_name(buf: &[u8]) -> String {
    let nul = buf[..MAX_NAME].iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
    String::from_utf8_lossy(&buf[..nul]).into_owned()
}

fn decode_entry(buf: &[u8]) -> DirEntry {
    let name = decode_name(buf);
    let inode_num = u32::from_le_bytes(buf[MAX_NAME..MAX_NAME + 4].try_into().unwrap());
    DirEntry { name, inode_num }
}

fn is_empty_slot(buf: &[u8]) -> bool {
    buf[0] == 0
}

/// Looks up `name` in `dir_inode`'s direct blocks. Returns the inode number
/// of the first non-empty entry whose name matches exactly (NUL-terminated
/// comparison).
pub fn lookup(dev: &mut BlockDevice, dir_inode: &Inode, name: &str) -> Result<Option<u32>> {
    log::trace!("dir lookup: '{name}'");
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut buf = dev.new_block_buf();
    for &block_num in dir_inode.direct_blocks.iter() {
        if block_num == 0 {
            continue;
        }
        dev.read_block(block_num, &mut buf)?;
        for slot in 0..entries_per_block {
            let off = (slot * ENTRY_SIZE) as usize;
            let entry_buf = &buf[off..off + ENTRY_SIZE as usize];
            if is_empty_slot(entry_buf) {
                continue;
            }
            let entry = decode_entry(entry_buf);
            if entry.name == name {
                return Ok(Some(entry.inode_num));
            }
        }
    }
    Ok(None)
}

/// Adds `(name, child_num)` to the first empty slot of an already-allocated
/// block of `dir_inode`, updates its size, and persists it via `store`.
/// Fails with `DirectoryFull` if no slot is free.
pub fn add(
    dev: &mut BlockDevice,
    store: &InodeStore,
    dir_inode: &mut Inode,
    dir_num: u32,
    name: &str,
    child_num: u32,
) -> Result<()> {
    log::trace!("dir add: '{name}' -> inode {child_num} in dir {dir_num}");
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut buf = dev.new_block_buf();
    for &block_num in dir_inode.direct_blocks.iter() {
        if block_num == 0 {
            continue;
        }
        dev.read_block(block_num, &mut buf)?;
        for slot in 0..entries_per_block {
            let off = (slot * ENTRY_SIZE) as usize;
            let entry_buf = &mut buf[off..off + ENTRY_SIZE as usize];
            if !is_empty_slot(entry_buf) {
                continue;
            }
            encode_entry(name, child_num, entry_buf);
            dir_inode.size += ENTRY_SIZE;
            store.write(dev, dir_num, dir_inode)?;
            return dev.write_block(block_num, &buf);
        }
    }
    Err(FsError::DirectoryFull)
}

/// Zeroes the entry named `name` inside `dir_inode`'s blocks, decrements its
/// size, and persists it via `store`.
pub fn remove(
    dev: &mut BlockDevice,
    store: &InodeStore,
    dir_inode: &mut Inode,
    dir_num: u32,
    name: &str,
) -> Result<()> {
    log::trace!("dir remove: '{name}' from dir {dir_num}");
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut buf = dev.new_block_buf();
    for &block_num in dir_inode.direct_blocks.iter() {
        if block_num == 0 {
            continue;
        }
        dev.read_block(block_num, &mut buf)?;
        for slot in 0..entries_per_block {
            let off = (slot * ENTRY_SIZE) as usize;
            let entry_buf = &mut buf[off..off + ENTRY_SIZE as usize];
            if is_empty_slot(entry_buf) {
                continue;
            }
            if decode_name(entry_buf) != name {
                continue;
            }
            entry_buf.fill(0);
            dir_inode.size -= ENTRY_SIZE;
            store.write(dev, dir_num, dir_inode)?;
            return dev.write_block(block_num, &buf);
        }
    }
    Err(FsError::NotFound(name.to_string()))
}

/// Overwrites the name of an existing entry in place, leaving its inode
/// number untouched. Used by `rename`.
pub fn rename_entry(
    dev: &mut BlockDevice,
    dir_inode: &Inode,
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut buf = dev.new_block_buf();
    for &block_num in dir_inode.direct_blocks.iter() {
        if block_num == 0 {
            continue;
        }
        dev.read_block(block_num, &mut buf)?;
        for slot in 0..entries_per_block {
            let off = (slot * ENTRY_SIZE) as usize;
            let entry_buf = &mut buf[off..off + ENTRY_SIZE as usize];
            if is_empty_slot(entry_buf) {
                continue;
            }
            if decode_name(entry_buf) != old_name {
                continue;
            }
            let inode_num = u32::from_le_bytes(entry_buf[MAX_NAME..MAX_NAME + 4].try_into().unwrap());
            encode_entry(new_name, inode_num, entry_buf);
            return dev.write_block(block_num, &buf);
        }
    }
    Err(FsError::NotFound(old_name.to_string()))
}

/// Rewrites the `..` entry of `dir_inode` (its first direct block) to point
/// at `new_parent`. Used by `mv` when relocating a subdirectory.
pub fn retarget_dotdot(dev: &mut BlockDevice, dir_inode: &Inode, new_parent: u32) -> Result<()> {
    rewrite_entry_target(dev, dir_inode.direct_blocks[0], "..", new_parent)
}

fn rewrite_entry_target(dev: &mut BlockDevice, block_num: u32, name: &str, new_target: u32) -> Result<()> {
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut buf = dev.new_block_buf();
    dev.read_block(block_num, &mut buf)?;
    for slot in 0..entries_per_block {
        let off = (slot * ENTRY_SIZE) as usize;
        let entry_buf = &mut buf[off..off + ENTRY_SIZE as usize];
        if is_empty_slot(entry_buf) {
            continue;
        }
        if decode_name(entry_buf) != name {
            continue;
        }
        entry_buf[MAX_NAME..].copy_from_slice(&new_target.to_le_bytes());
        return dev.write_block(block_num, &buf);
    }
    Err(FsError::NotFound(name.to_string()))
}

/// Yields every non-empty entry across `dir_inode`'s direct blocks, in
/// block/slot order. Does not suppress `.`/`..`.
pub fn enumerate(dev: &mut BlockDevice, dir_inode: &Inode) -> Result<Vec<DirEntry>> {
    let entries_per_block = dev.block_size() / ENTRY_SIZE;
    let mut out = Vec::new();
    let mut buf = dev.new_block_buf();
    for &block_num in dir_inode.direct_blocks.iter() {
        if block_num == 0 {
            continue;
        }
        dev.read_block(block_num, &mut buf)?;
        for slot in 0..entries_per_block {
            let off = (slot * ENTRY_SIZE) as usize;
            let entry_buf = &buf[off..off + ENTRY_SIZE as usize];
            if is_empty_slot(entry_buf) {
                continue;
            }
            out.push(decode_entry(entry_buf));
        }
    }
    Ok(out)
}

/// Writes a fresh data block containing only `.` -> `self_num` and
/// `..` -> `parent_num`, used when initializing a new directory.
pub fn write_fresh_block(dev: &mut BlockDevice, block_num: u32, self_num: u32, parent_num: u32) -> Result<()> {
    let mut buf = dev.new_block_buf();
    encode_entry(".", self_num, &mut buf[0..ENTRY_SIZE as usize]);
    encode_entry("..", parent_num, &mut buf[ENTRY_SIZE as usize..2 * ENTRY_SIZE as usize]);
    dev.write_block(block_num, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::InodeType;

    fn fresh_dev(blocks: u32, block_size: u32) -> BlockDevice {
        let file = tempfile::tempfile().unwrap();
        file.set_len(blocks as u64 * block_size as u64).unwrap();
        BlockDevice::new(file, block_size)
    }

    #[test]
    fn add_lookup_remove() {
        let mut dev = fresh_dev(4, 256);
        let store = InodeStore::new(0);
        let mut dir = Inode::empty(InodeType::Directory);
        dir.direct_blocks[0] = 2;
        dev.write_block(2, &dev.new_block_buf()).unwrap();

        add(&mut dev, &store, &mut dir, 0, "a", 5).unwrap();
        assert_eq!(lookup(&mut dev, &dir, "a").unwrap(), Some(5));
        assert_eq!(lookup(&mut dev, &dir, "missing").unwrap(), None);

        remove(&mut dev, &store, &mut dir, 0, "a").unwrap();
        assert_eq!(lookup(&mut dev, &dir, "a").unwrap(), None);
    }

    #[test]
    fn directory_full_when_block_exhausted() {
        let block_size = ENTRY_SIZE * 2;
        let mut dev = fresh_dev(4, block_size);
        let store = InodeStore::new(0);
        let mut dir = Inode::empty(InodeType::Directory);
        dir.direct_blocks[0] = 2;
        dev.write_block(2, &dev.new_block_buf()).unwrap();

        add(&mut dev, &store, &mut dir, 0, "a", 1).unwrap();
        add(&mut dev, &store, &mut dir, 0, "b", 2).unwrap();
        let err = add(&mut dev, &store, &mut dir, 0, "c", 3).unwrap_err();
        assert!(matches!(err, FsError::DirectoryFull));
    }

    #[test]
    fn enumerate_lists_dot_and_dotdot() {
        let mut dev = fresh_dev(4, 256);
        write_fresh_block(&mut dev, 2, 0, 0).unwrap();
        let mut dir = Inode::empty(InodeType::Directory);
        dir.direct_blocks[0] = 2;
        dir.size = ENTRY_SIZE * 2;

        let entries = enumerate(&mut dev, &dir).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", ".."]);
    }
}
