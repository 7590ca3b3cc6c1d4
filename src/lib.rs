//! A user-space simulation of a classic Unix-style filesystem, persisted in
//! a single host file: a disk image with a superblock, inode/block
//! bitmaps, an inode table, and a data region, mutated through a small set
//! of namespace operations (mkdir, rmdir, cd, ls, stat, import, cat, rm,
//! mv, rename, echo, df, delete).
//!
//! The five layers, leaves-first: [`block`] (raw block I/O), [`bitmap`]
//! (inode/data-block allocation), [`inode`] (fixed-size inode records),
//! [`dir`] (directory entries inside a directory inode's direct blocks),
//! and [`fs`] (the [`fs::FileSystem`] session plus every namespace
//! operation). [`error`] holds the shared error type; [`shell`] is the
//! interactive command loop built on top of [`fs`].

pub mod bitmap;
pub mod block;
pub mod dir;
pub mod error;
pub mod fs;
pub mod inode;
pub mod shell;
pub mod superblock;
pub mod util;

pub use error::{FsError, Result};
pub use fs::FileSystem;

/// Conventional path for the disk image the CLI creates and mounts.
pub const DISK_PATH: &str = "fsim.disk";
