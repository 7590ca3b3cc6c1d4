//! The `FileSystem` session: format/mount/unmount lifecycle plus every
//! namespace operation (mkdir, rmdir, cd, ls, stat, import, cat, rm, mv,
//! rename, echo, df, delete). This is the only layer that owns multi-step
//! invariants; `block`, `bitmap`, `inode`, and `dir` are plain mechanism.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::dir::{self, DirEntry, ENTRY_SIZE, MAX_NAME};
use crate::error::{FsError, Result};
use crate::inode::{Inode, InodeStore, InodeType, DIRECT_BLOCKS};
use crate::superblock::Superblock;
use crate::util::get_timestamp;
use crate::block::BlockDevice;

/// Root directory always lives at inode 0.
pub const ROOT_INODE: u32 = 0;

/// Type of a namespace item, as reported by `ls` and `check_item_type`.
pub type ItemKind = InodeType;

/// Disk usage figures reported by `df`.
#[derive(Debug, Clone, Copy)]
pub struct DiskUsage {
    pub total_inodes: u32,
    pub used_inodes: u32,
    pub free_inodes: u32,
    pub total_blocks: u32,
    pub used_blocks: u32,
    pub free_blocks: u32,
    pub total_kb: u32,
    pub used_kb: u32,
    pub free_kb: u32,
}

/// `echo`'s redirection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `>`: truncate the file (or create it) before writing.
    Truncate,
    /// `>>`: append after the file's current contents, creating it empty
    /// first if it does not exist.
    Append,
}

impl WriteMode {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Truncate),
            ">>" => Some(Self::Append),
            _ => None,
        }
    }
}

/// An open disk image: the live session between `mount` and `unmount`.
///
/// Owns the only mutable state the engine has: the file handle, the cached
/// superblock, the current-directory inode number, and the verbose flag.
/// Every namespace operation re-reads the blocks it touches; nothing here
/// caches inode or bitmap content across calls.
pub struct FileSystem {
    dev: BlockDevice,
    sb: Superblock,
    inodes: InodeStore,
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
    cwd: u32,
    verbose: bool,
}

/// Formats a fresh disk image at `path`. Leaves no open session behind;
/// call `FileSystem::mount` afterwards to use it.
pub fn format(path: impl AsRef<Path>, total_kb: u32, block_kb: u32) -> Result<()> {
    let total_size = total_kb as u64 * 1024;
    let block_size = block_kb * 1024;
    if block_size == 0 || total_size == 0 {
        return Err(FsError::Invalid("disk and block size must be nonzero".into()));
    }
    let sb = Superblock::layout(total_size, block_size);
    if sb.data_blocks_start >= sb.total_blocks {
        return Err(FsError::Invalid(
            "disk too small to hold its own metadata".into(),
        ));
    }
    log::debug!(
        "format: {} blocks of {} bytes, data starts at block {}",
        sb.total_blocks,
        sb.block_size,
        sb.data_blocks_start
    );

    let file = File::create(path.as_ref())?;
    file.set_len(sb.total_blocks as u64 * sb.block_size as u64)?;
    let mut dev = BlockDevice::new(file, sb.block_size);

    let mut sb_block = dev.new_block_buf();
    sb.encode(&mut sb_block);
    dev.write_block(0, &sb_block)?;

    let inode_bitmap = Bitmap::new(sb.inode_bitmap_start, sb.total_inodes);
    let block_bitmap = Bitmap::new(sb.block_bitmap_start, sb.total_blocks);

    // The metadata region (everything below `data_blocks_start`) is
    // permanently marked used in the block bitmap; it is never freed.
    block_bitmap.fill_up_to(&mut dev, sb.data_blocks_start)?;

    let root_num = inode_bitmap
        .find_free_from(&mut dev, 0)?
        .ok_or(FsError::NoInodes)?;
    if root_num != ROOT_INODE {
        return Err(FsError::Invalid(
            "first allocated inode was not inode 0".into(),
        ));
    }
    inode_bitmap.set(&mut dev, root_num, true)?;

    let root_block = sb.data_blocks_start;
    block_bitmap.set(&mut dev, root_block, true)?;

    let now = get_timestamp();
    let mut root_inode = Inode::empty(InodeType::Directory);
    root_inode.size = ENTRY_SIZE * 2;
    root_inode.link_count = 2;
    root_inode.created = now;
    root_inode.modified = now;
    root_inode.accessed = now;
    root_inode.direct_blocks[0] = root_block;

    let inodes = InodeStore::new(sb.inode_table_start);
    inodes.write(&mut dev, root_num, &root_inode)?;
    dir::write_fresh_block(&mut dev, root_block, root_num, root_num)?;
    dev.flush()?;

    log::info!(
        "root directory created at inode {root_num}, data block {root_block}"
    );
    Ok(())
}

impl FileSystem {
    /// Opens `path`, validates the superblock magic, and starts a session
    /// rooted at inode 0.
    pub fn mount(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        // The superblock lives at a fixed offset; read it directly before a
        // `BlockDevice` (which needs to already know the block size) exists.
        use std::io::{Read, Seek, SeekFrom};
        file.seek(SeekFrom::Start(0))?;
        let mut probe = [0u8; 32];
        file.read_exact(&mut probe)?;
        let sb = Superblock::decode(&probe);
        if sb.magic != crate::superblock::MAGIC {
            return Err(FsError::BadMagic);
        }

        let dev = BlockDevice::new(file, sb.block_size);
        let inode_bitmap = Bitmap::new(sb.inode_bitmap_start, sb.total_inodes);
        let block_bitmap = Bitmap::new(sb.block_bitmap_start, sb.total_blocks);
        let inodes = InodeStore::new(sb.inode_table_start);

        log::info!("mounted disk image with {} total blocks", sb.total_blocks);
        Ok(Self {
            dev,
            sb,
            inodes,
            inode_bitmap,
            block_bitmap,
            cwd: ROOT_INODE,
            verbose: false,
        })
    }

    /// Flushes and closes the session. Equivalent to dropping the value,
    /// spelled out for callers that want the transition to be explicit.
    pub fn unmount(mut self) -> Result<()> {
        self.dev.flush()
    }

    /// Toggles the crate's log level filter at runtime; does not alter
    /// control flow anywhere, purely observational per the engine's verbose
    /// hook contract.
    pub fn set_verbose(&mut self, on: bool) {
        self.verbose = on;
        if on {
            log::set_max_level(log::LevelFilter::Trace);
        } else {
            log::set_max_level(log::LevelFilter::Warn);
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn cwd(&self) -> u32 {
        self.cwd
    }

    // --- internal helpers -------------------------------------------------

    fn read_inode(&mut self, num: u32) -> Result<Inode> {
        self.inodes.read(&mut self.dev, num)
    }

    fn write_inode(&mut self, num: u32, inode: &Inode) -> Result<()> {
        self.inodes.write(&mut self.dev, num, inode)
    }

    fn read_cwd(&mut self) -> Result<Inode> {
        self.read_inode(self.cwd)
    }

    fn alloc_inode(&mut self) -> Result<u32> {
        log::trace!("searching for a free inode from bit 1");
        let num = self
            .inode_bitmap
            .find_free_from(&mut self.dev, 1)?
            .ok_or(FsError::NoInodes)?;
        self.inode_bitmap.set(&mut self.dev, num, true)?;
        Ok(num)
    }

    fn free_inode(&mut self, num: u32) -> Result<()> {
        self.inode_bitmap.set(&mut self.dev, num, false)
    }

    fn alloc_block(&mut self) -> Result<u32> {
        log::trace!("searching for a free data block from bit {}", self.sb.data_blocks_start);
        let num = self
            .block_bitmap
            .find_free_from(&mut self.dev, self.sb.data_blocks_start)?
            .ok_or(FsError::NoBlocks)?;
        self.block_bitmap.set(&mut self.dev, num, true)?;
        Ok(num)
    }

    /// Frees a data block. Metadata blocks (below `data_blocks_start`) are
    /// never freed, even if a corrupt inode were to reference one.
    fn free_block(&mut self, num: u32) -> Result<()> {
        if num < self.sb.data_blocks_start {
            log::warn!("refusing to free metadata block {num}");
            return Ok(());
        }
        self.block_bitmap.set(&mut self.dev, num, false)
    }

    fn lookup(&mut self, dir_inode: &Inode, name: &str) -> Result<Option<u32>> {
        dir::lookup(&mut self.dev, dir_inode, name)
    }

    fn require_found(&mut self, dir_inode: &Inode, name: &str) -> Result<u32> {
        self.lookup(dir_inode, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    fn reject_dot_names(name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(FsError::Invalid(name.to_string()));
        }
        Ok(())
    }

    fn validate_new_name(name: &str) -> Result<()> {
        if name.len() >= MAX_NAME {
            return Err(FsError::NameTooLong(name.to_string()));
        }
        Ok(())
    }

    /// Allocates an inode of kind `kind`, adds `(name, inode)` to `parent`,
    /// initializes the new inode, and returns its number. Frees the inode
    /// on any failure so nothing leaks.
    fn create_entry(
        &mut self,
        parent: &mut Inode,
        parent_num: u32,
        name: &str,
        kind: InodeType,
    ) -> Result<u32> {
        Self::validate_new_name(name)?;
        let new_num = self.alloc_inode()?;
        if let Err(e) = dir::add(&mut self.dev, &self.inodes, parent, parent_num, name, new_num) {
            self.free_inode(new_num)?;
            return Err(e);
        }
        let now = get_timestamp();
        let mut inode = Inode::empty(kind);
        inode.link_count = 1;
        inode.created = now;
        inode.modified = now;
        inode.accessed = now;
        self.write_inode(new_num, &inode)?;
        Ok(new_num)
    }

    // --- namespace operations ----------------------------------------------

    /// Creates a new, empty subdirectory of `cwd`.
    pub fn mkdir(&mut self, name: &str) -> Result<()> {
        log::debug!("mkdir '{name}'");
        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        if self.lookup(&parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        Self::validate_new_name(name)?;

        let new_num = self.alloc_inode()?;
        let new_block = match self.alloc_block() {
            Ok(b) => b,
            Err(e) => {
                self.free_inode(new_num)?;
                return Err(e);
            }
        };
        if let Err(e) = dir::add(&mut self.dev, &self.inodes, &mut parent, parent_num, name, new_num) {
            self.free_inode(new_num)?;
            self.free_block(new_block)?;
            return Err(e);
        }

        let now = get_timestamp();
        let mut new_inode = Inode::empty(InodeType::Directory);
        new_inode.size = ENTRY_SIZE * 2;
        new_inode.link_count = 2;
        new_inode.created = now;
        new_inode.modified = now;
        new_inode.accessed = now;
        new_inode.direct_blocks[0] = new_block;
        self.write_inode(new_num, &new_inode)?;

        dir::write_fresh_block(&mut self.dev, new_block, new_num, parent_num)?;

        parent.link_count += 1;
        self.write_inode(parent_num, &parent)?;
        Ok(())
    }

    /// Removes a subdirectory of `cwd`; fails unless it holds only `.`
    /// and `..`.
    pub fn rmdir(&mut self, name: &str) -> Result<()> {
        log::debug!("rmdir '{name}'");
        Self::reject_dot_names(name)?;
        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        let target_num = self.require_found(&parent, name)?;
        let target = self.read_inode(target_num)?;
        if !target.is_directory() {
            return Err(FsError::NotADirectory(name.to_string()));
        }
        if target.size > ENTRY_SIZE * 2 {
            return Err(FsError::NotEmpty(name.to_string()));
        }

        dir::remove(&mut self.dev, &self.inodes, &mut parent, parent_num, name)?;
        self.free_block(target.direct_blocks[0])?;
        self.free_inode(target_num)?;

        parent.link_count -= 1;
        self.write_inode(parent_num, &parent)?;
        Ok(())
    }

    /// Changes the current directory to the named child of `cwd`.
    pub fn cd(&mut self, name: &str) -> Result<()> {
        log::debug!("cd '{name}'");
        let current = self.read_cwd()?;
        let target_num = self.require_found(&current, name)?;
        let target = self.read_inode(target_num)?;
        if !target.is_directory() {
            return Err(FsError::NotADirectory(name.to_string()));
        }
        self.cwd = target_num;
        Ok(())
    }

    /// Rebuilds the absolute path of `cwd` by repeatedly walking `..` and
    /// scanning the parent for the matching entry. Never panics; on any
    /// inconsistency it returns a marker path instead of propagating.
    pub fn get_current_path(&mut self) -> String {
        if self.cwd == ROOT_INODE {
            return "/".to_string();
        }
        let mut segments = Vec::new();
        let mut current = self.cwd;
        loop {
            let child = match self.read_inode(current) {
                Ok(i) => i,
                Err(_) => return "/<error>".to_string(),
            };
            let parent_num = match self.lookup(&child, "..") {
                Ok(Some(n)) => n,
                _ => return "/<error>".to_string(),
            };
            if parent_num == current {
                break;
            }
            let parent = match self.read_inode(parent_num) {
                Ok(i) => i,
                Err(_) => return "/<error>".to_string(),
            };
            let entries = match dir::enumerate(&mut self.dev, &parent) {
                Ok(e) => e,
                Err(_) => return "/<error>".to_string(),
            };
            let name = entries
                .iter()
                .find(|e| e.inode_num == current && e.name != "." && e.name != "..")
                .map(|e| e.name.clone())
                .unwrap_or_else(|| "?".to_string());
            segments.push(name);
            current = parent_num;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Lists `cwd`'s entries, including `.` and `..`.
    pub fn ls(&mut self) -> Result<Vec<(String, ItemKind)>> {
        log::debug!("ls");
        let dir_inode = self.read_cwd()?;
        let entries = dir::enumerate(&mut self.dev, &dir_inode)?;
        let mut out = Vec::with_capacity(entries.len());
        for DirEntry { name, inode_num } in entries {
            let kind = self.read_inode(inode_num)?.kind;
            out.push((name, kind));
        }
        Ok(out)
    }

    /// Looks up `name` in `cwd` and returns its inode record.
    pub fn stat(&mut self, name: &str) -> Result<Inode> {
        log::debug!("stat '{name}'");
        let dir_inode = self.read_cwd()?;
        let num = self.require_found(&dir_inode, name)?;
        self.read_inode(num)
    }

    /// Returns whether `name` is a file, directory, or absent in `cwd`.
    pub fn check_item_type(&mut self, name: &str) -> Result<Option<ItemKind>> {
        let dir_inode = self.read_cwd()?;
        match self.lookup(&dir_inode, name)? {
            Some(num) => Ok(Some(self.read_inode(num)?.kind)),
            None => Ok(None),
        }
    }

    /// Copies a host file into `cwd` as `dest_name`.
    pub fn import(&mut self, host_path: impl AsRef<Path>, dest_name: &str) -> Result<()> {
        let host_path = host_path.as_ref();
        log::debug!("import '{}' as '{dest_name}'", host_path.display());
        let mut host = File::open(host_path)
            .map_err(|e| FsError::HostOpen(host_path.display().to_string(), e))?;
        let len = host
            .metadata()
            .map_err(|e| FsError::HostOpen(host_path.display().to_string(), e))?
            .len();
        let block_size = self.sb.block_size as u64;
        let blocks_needed = crate::util::ceil_division(len, block_size) as usize;

        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        if self.lookup(&parent, dest_name)?.is_some() {
            return Err(FsError::AlreadyExists(dest_name.to_string()));
        }
        if blocks_needed > DIRECT_BLOCKS {
            return Err(FsError::FileTooLarge);
        }
        Self::validate_new_name(dest_name)?;

        let new_num = self.alloc_inode()?;
        let mut allocated = Vec::with_capacity(blocks_needed);
        for _ in 0..blocks_needed {
            match self.alloc_block() {
                Ok(b) => allocated.push(b),
                Err(e) => {
                    for b in &allocated {
                        self.free_block(*b)?;
                    }
                    self.free_inode(new_num)?;
                    return Err(e);
                }
            }
        }

        use std::io::Read;
        let mut remaining = len;
        for &block_num in &allocated {
            let mut buf = self.dev.new_block_buf();
            let to_read = remaining.min(block_size) as usize;
            if let Err(e) = host.read_exact(&mut buf[..to_read]) {
                for b in &allocated {
                    self.free_block(*b)?;
                }
                self.free_inode(new_num)?;
                return Err(FsError::Io(e));
            }
            // The trailing bytes of a partially-filled block are zero-padded
            // rather than left indeterminate, so imports are deterministic.
            if let Err(e) = self.dev.write_block(block_num, &buf) {
                for b in &allocated {
                    self.free_block(*b)?;
                }
                self.free_inode(new_num)?;
                return Err(e);
            }
            remaining -= to_read as u64;
        }

        let now = get_timestamp();
        let mut new_inode = Inode::empty(InodeType::File);
        new_inode.size = len as u32;
        new_inode.link_count = 1;
        new_inode.created = now;
        new_inode.modified = now;
        new_inode.accessed = now;
        for (slot, block_num) in new_inode.direct_blocks.iter_mut().zip(&allocated) {
            *slot = *block_num;
        }
        self.write_inode(new_num, &new_inode)?;

        if let Err(e) = dir::add(&mut self.dev, &self.inodes, &mut parent, parent_num, dest_name, new_num) {
            for b in &allocated {
                self.free_block(*b)?;
            }
            self.free_inode(new_num)?;
            return Err(e);
        }
        Ok(())
    }

    /// Reads the entire contents of a file in `cwd`.
    pub fn cat(&mut self, name: &str) -> Result<Vec<u8>> {
        log::debug!("cat '{name}'");
        let dir_inode = self.read_cwd()?;
        let num = self.require_found(&dir_inode, name)?;
        let mut inode = self.read_inode(num)?;
        if inode.is_directory() {
            return Err(FsError::NotAFile(name.to_string()));
        }

        let block_size = self.sb.block_size as usize;
        let mut out = Vec::with_capacity(inode.size as usize);
        let mut remaining = inode.size as usize;
        for &block_num in &inode.direct_blocks {
            if block_num == 0 || remaining == 0 {
                break;
            }
            let mut buf = self.dev.new_block_buf();
            self.dev.read_block(block_num, &mut buf)?;
            let take = remaining.min(block_size);
            out.extend_from_slice(&buf[..take]);
            remaining -= take;
        }

        inode.accessed = get_timestamp();
        self.write_inode(num, &inode)?;
        Ok(out)
    }

    /// Removes a file from `cwd`, freeing its inode and every direct block.
    pub fn rm(&mut self, name: &str) -> Result<()> {
        log::debug!("rm '{name}'");
        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        let target_num = self.require_found(&parent, name)?;
        let target = self.read_inode(target_num)?;
        if target.is_directory() {
            return Err(FsError::NotAFile(name.to_string()));
        }

        for &block_num in &target.direct_blocks {
            if block_num != 0 {
                self.free_block(block_num)?;
            }
        }
        self.free_inode(target_num)?;
        dir::remove(&mut self.dev, &self.inodes, &mut parent, parent_num, name)?;
        Ok(())
    }

    /// Recursively removes a file or directory. Depth-first; stops at the
    /// first child error. Restores `cwd` on return, success or failure.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        log::debug!("delete '{name}' (recursive)");
        let saved_cwd = self.cwd;
        let result = self.delete_inner(name);
        self.cwd = saved_cwd;
        result
    }

    fn delete_inner(&mut self, name: &str) -> Result<()> {
        let dir_inode = self.read_cwd()?;
        let target_num = self.require_found(&dir_inode, name)?;
        let target = self.read_inode(target_num)?;

        if !target.is_directory() {
            return self.rm(name);
        }

        self.cd(name)?;
        let entries = self.ls()?;
        for (child_name, _) in entries {
            if child_name == "." || child_name == ".." {
                continue;
            }
            self.delete_inner(&child_name)?;
        }
        self.cd("..")?;
        self.rmdir(name)
    }

    /// Renames an entry in place within `cwd`.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        log::debug!("rename '{old_name}' -> '{new_name}'");
        Self::reject_dot_names(old_name)?;
        Self::reject_dot_names(new_name)?;
        Self::validate_new_name(new_name)?;

        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        self.require_found(&parent, old_name)?;
        if self.lookup(&parent, new_name)?.is_some() {
            return Err(FsError::AlreadyExists(new_name.to_string()));
        }

        dir::rename_entry(&mut self.dev, &parent, old_name, new_name)?;
        parent.modified = get_timestamp();
        self.write_inode(parent_num, &parent)?;
        Ok(())
    }

    /// Moves `src` (a `cwd` entry) into the directory named `dst_dir`
    /// (also a `cwd` entry). Not rolled back on partial failure: a crash
    /// between the two directory updates can leave `src` listed in both.
    pub fn mv(&mut self, src: &str, dst_dir: &str) -> Result<()> {
        log::debug!("mv '{src}' -> '{dst_dir}'");
        Self::reject_dot_names(src)?;
        if src == dst_dir {
            return Err(FsError::Invalid(
                "source and destination cannot be the same".to_string(),
            ));
        }

        let old_parent_num = self.cwd;
        let mut old_parent = self.read_cwd()?;
        let src_num = self.require_found(&old_parent, src)?;
        let dst_num = self.require_found(&old_parent, dst_dir)?;

        let src_inode = self.read_inode(src_num)?;
        let mut dst_dir_inode = self.read_inode(dst_num)?;
        if !dst_dir_inode.is_directory() {
            return Err(FsError::NotADirectory(dst_dir.to_string()));
        }
        if self.lookup(&dst_dir_inode, src)?.is_some() {
            return Err(FsError::AlreadyExists(src.to_string()));
        }

        dir::add(&mut self.dev, &self.inodes, &mut dst_dir_inode, dst_num, src, src_num)?;

        if src_inode.is_directory() {
            dir::retarget_dotdot(&mut self.dev, &src_inode, dst_num)?;
            old_parent.link_count -= 1;
            dst_dir_inode.link_count += 1;
            self.write_inode(old_parent_num, &old_parent)?;
            self.write_inode(dst_num, &dst_dir_inode)?;
        }

        dir::remove(&mut self.dev, &self.inodes, &mut old_parent, old_parent_num, src)?;
        Ok(())
    }

    /// Writes `text` to `filename` in `cwd`, truncating or appending per
    /// `mode`. Creates the file if it does not already exist.
    pub fn echo(&mut self, filename: &str, text: &str, mode: WriteMode) -> Result<()> {
        log::debug!("echo -> '{filename}' ({mode:?})");
        let parent_num = self.cwd;
        let mut parent = self.read_cwd()?;
        let mut existing = self.lookup(&parent, filename)?;

        if mode == WriteMode::Truncate && existing.is_some() {
            self.rm(filename)?;
            existing = None;
            parent = self.read_cwd()?;
        }

        let target_num = match existing {
            Some(n) => n,
            None => self.create_entry(&mut parent, parent_num, filename, InodeType::File)?,
        };

        let mut inode = self.read_inode(target_num)?;
        if inode.is_directory() {
            return Err(FsError::NotAFile(filename.to_string()));
        }

        let text_bytes = text.as_bytes();
        let block_size = self.sb.block_size as usize;
        let new_size = inode.size as usize + text_bytes.len();
        let blocks_needed = crate::util::ceil_division(new_size as u64, block_size as u64) as usize;
        if blocks_needed > DIRECT_BLOCKS {
            return Err(FsError::FileTooLarge);
        }

        let mut block_index = inode.size as usize / block_size;
        let mut offset_in_block = inode.size as usize % block_size;
        let mut written = 0usize;
        while written < text_bytes.len() {
            if inode.direct_blocks[block_index] == 0 {
                inode.direct_blocks[block_index] = self.alloc_block()?;
            }
            let block_num = inode.direct_blocks[block_index];
            let mut buf = self.dev.new_block_buf();
            if offset_in_block > 0 {
                self.dev.read_block(block_num, &mut buf)?;
            }
            let space = block_size - offset_in_block;
            let take = space.min(text_bytes.len() - written);
            buf[offset_in_block..offset_in_block + take]
                .copy_from_slice(&text_bytes[written..written + take]);
            self.dev.write_block(block_num, &buf)?;
            written += take;
            offset_in_block = 0;
            block_index += 1;
        }

        inode.size = new_size as u32;
        inode.modified = get_timestamp();
        inode.accessed = inode.modified;
        self.write_inode(target_num, &inode)?;
        Ok(())
    }

    /// Reports inode and block usage.
    pub fn df(&mut self) -> Result<DiskUsage> {
        log::debug!("df");
        let used_inodes = self.inode_bitmap.count_set(&mut self.dev)?;
        let used_blocks = self.block_bitmap.count_set(&mut self.dev)?;
        let total_inodes = self.sb.total_inodes;
        let total_blocks = self.sb.total_blocks;
        let block_size = self.sb.block_size as u64;
        Ok(DiskUsage {
            total_inodes,
            used_inodes,
            free_inodes: total_inodes - used_inodes,
            total_blocks,
            used_blocks,
            free_blocks: total_blocks - used_blocks,
            total_kb: (total_blocks as u64 * block_size / 1024) as u32,
            used_kb: (used_blocks as u64 * block_size / 1024) as u32,
            free_kb: ((total_blocks - used_blocks) as u64 * block_size / 1024) as u32,
        })
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        let _ = self.dev.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_fs(total_kb: u32, block_kb: u32) -> (tempfile::TempPath, FileSystem) {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.into_temp_path();
        format(&path, total_kb, block_kb).unwrap();
        let fs = FileSystem::mount(&path).unwrap();
        (path, fs)
    }

    #[test]
    fn scenario_a_format_and_mount() {
        let (_path, mut fs) = fresh_fs(64, 4);
        assert_eq!(fs.superblock().total_blocks, 16);
        assert_eq!(fs.superblock().total_inodes, 16);
        assert_eq!(fs.superblock().inode_bitmap_start, 1);
        assert_eq!(fs.superblock().block_bitmap_start, 2);

        let usage = fs.df().unwrap();
        assert_eq!(usage.used_inodes, 1);
        assert_eq!(usage.used_blocks, fs.superblock().data_blocks_start + 1);
    }

    #[test]
    fn scenario_b_mkdir_cd_rmdir() {
        let (_path, mut fs) = fresh_fs(64, 4);
        let baseline = fs.df().unwrap();
        let root_link_count_before = fs.stat(".").unwrap().link_count;

        fs.mkdir("a").unwrap();
        assert_eq!(fs.stat(".").unwrap().link_count, root_link_count_before + 1);
        assert_eq!(fs.stat("a").unwrap().link_count, 2);

        fs.cd("a").unwrap();
        let a_link_count_before = fs.stat(".").unwrap().link_count;
        fs.mkdir("b").unwrap();
        assert_eq!(fs.stat(".").unwrap().link_count, a_link_count_before + 1);
        fs.cd("..").unwrap();

        assert!(matches!(fs.rmdir("a").unwrap_err(), FsError::NotEmpty(_)));

        fs.cd("a").unwrap();
        fs.rmdir("b").unwrap();
        assert_eq!(fs.stat(".").unwrap().link_count, a_link_count_before);
        fs.cd("..").unwrap();
        fs.rmdir("a").unwrap();
        assert_eq!(fs.stat(".").unwrap().link_count, root_link_count_before);

        let after = fs.df().unwrap();
        assert_eq!(after.used_inodes, baseline.used_inodes);
        assert_eq!(after.used_blocks, baseline.used_blocks);
    }

    #[test]
    fn scenario_c_import_cat_rm() {
        let (_path, mut fs) = fresh_fs(64, 4);
        let baseline = fs.df().unwrap();

        let mut host = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        let payload = vec![b'x'; 5000];
        host.write_all(&payload).unwrap();
        host.flush().unwrap();

        fs.import(host.path(), "f").unwrap();
        let content = fs.cat("f").unwrap();
        assert_eq!(content, payload);

        fs.rm("f").unwrap();
        let after = fs.df().unwrap();
        assert_eq!(after.used_inodes, baseline.used_inodes);
        assert_eq!(after.used_blocks, baseline.used_blocks);
    }

    #[test]
    fn scenario_d_mv_between_dirs() {
        let (_path, mut fs) = fresh_fs(64, 4);
        fs.mkdir("a").unwrap();
        fs.mkdir("b").unwrap();
        let a_num = fs.stat("a").unwrap().direct_blocks[0];
        let root_link_count_before = fs.stat(".").unwrap().link_count;
        let b_link_count_before = {
            fs.cd("b").unwrap();
            let n = fs.stat(".").unwrap().link_count;
            fs.cd("..").unwrap();
            n
        };

        fs.mv("a", "b").unwrap();
        assert_eq!(fs.check_item_type("a").unwrap(), None);
        assert_eq!(fs.stat(".").unwrap().link_count, root_link_count_before - 1);

        fs.cd("b").unwrap();
        assert_eq!(fs.stat(".").unwrap().link_count, b_link_count_before + 1);
        assert_eq!(fs.check_item_type("a").unwrap(), Some(ItemKind::Directory));
        assert_eq!(fs.stat("a").unwrap().direct_blocks[0], a_num);

        let b_num = fs.cwd();
        fs.cd("a").unwrap();
        fs.cd("..").unwrap();
        assert_eq!(fs.cwd(), b_num);
    }

    #[test]
    fn get_current_path_does_not_insert_placeholder_segment_for_root() {
        let (_path, mut fs) = fresh_fs(64, 4);
        assert_eq!(fs.get_current_path(), "/");

        fs.mkdir("a").unwrap();
        fs.cd("a").unwrap();
        assert_eq!(fs.get_current_path(), "/a");

        fs.mkdir("b").unwrap();
        fs.cd("b").unwrap();
        assert_eq!(fs.get_current_path(), "/a/b");

        fs.cd("..").unwrap();
        fs.cd("..").unwrap();
        assert_eq!(fs.get_current_path(), "/");
    }

    #[test]
    fn scenario_e_echo_append() {
        let (_path, mut fs) = fresh_fs(64, 4);
        fs.echo("log", "hi", WriteMode::Truncate).unwrap();
        assert_eq!(fs.cat("log").unwrap(), b"hi");

        fs.echo("log", " there", WriteMode::Append).unwrap();
        assert_eq!(fs.cat("log").unwrap(), b"hi there");
    }

    #[test]
    fn scenario_f_bad_magic() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.into_temp_path();
        format(&path, 64, 4).unwrap();

        {
            use std::io::Write;
            let mut f = OpenOptions::new().write(true).open(&path).unwrap();
            f.write_all(&[0u8; 32]).unwrap();
        }

        let err = FileSystem::mount(&path).unwrap_err();
        assert!(matches!(err, FsError::BadMagic));
    }

    #[test]
    fn rename_to_self_name_fails_with_already_exists() {
        let (_path, mut fs) = fresh_fs(64, 4);
        fs.mkdir("a").unwrap();
        let err = fs.rename("a", "a").unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[test]
    fn delete_recursive_restores_cwd() {
        let (_path, mut fs) = fresh_fs(64, 4);
        fs.mkdir("a").unwrap();
        fs.cd("a").unwrap();
        fs.mkdir("b").unwrap();
        fs.echo("f", "data", WriteMode::Truncate).unwrap();
        fs.cd("..").unwrap();

        let cwd_before = fs.cwd();
        fs.delete("a").unwrap();
        assert_eq!(fs.cwd(), cwd_before);
        assert_eq!(fs.check_item_type("a").unwrap(), None);
    }

    #[test]
    fn mount_roundtrip_preserves_state() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.into_temp_path();
        format(&path, 64, 4).unwrap();
        {
            let mut fs = FileSystem::mount(&path).unwrap();
            fs.mkdir("persisted").unwrap();
            fs.unmount().unwrap();
        }
        let mut fs = FileSystem::mount(&path).unwrap();
        assert_eq!(
            fs.check_item_type("persisted").unwrap(),
            Some(InodeType::Directory)
        );
    }

    #[test]
    fn import_file_too_large_is_rejected_and_rolled_back() {
        let (_path, mut fs) = fresh_fs(64, 4);
        let baseline = fs.df().unwrap();

        let mut host = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        // 13 blocks of 4096 bytes exceeds DIRECT_BLOCKS (12).
        host.write_all(&vec![0u8; 4096 * 13]).unwrap();
        host.flush().unwrap();

        let err = fs.import(host.path(), "big").unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge));
        let after = fs.df().unwrap();
        assert_eq!(after.used_inodes, baseline.used_inodes);
        assert_eq!(after.used_blocks, baseline.used_blocks);
    }
}
