//! Error kinds shared by every layer of the engine.

use std::io;

/// Everything that can go wrong while formatting, mounting, or operating on
/// a disk image.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// A namespace operation was attempted while no image was mounted.
    #[error("no disk image is mounted")]
    NotMounted,
    /// A host I/O call (seek, read, write, open) failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// `mount` read a superblock whose magic number did not match.
    #[error("bad magic number: not an fsim disk image")]
    BadMagic,
    /// The inode bitmap has no free bit.
    #[error("no free inodes")]
    NoInodes,
    /// The block bitmap has no free bit.
    #[error("no free data blocks")]
    NoBlocks,
    /// Every allocated block of a directory is full and no more can be
    /// allocated to hold a new entry.
    #[error("directory is full")]
    DirectoryFull,
    /// The target name is already present in the parent directory.
    #[error("an item named '{0}' already exists")]
    AlreadyExists(String),
    /// The name was not found in the current directory.
    #[error("'{0}' not found")]
    NotFound(String),
    /// The named item exists but is not a directory.
    #[error("'{0}' is not a directory")]
    NotADirectory(String),
    /// The named item exists but is not a file.
    #[error("'{0}' is not a file")]
    NotAFile(String),
    /// `rmdir` was attempted on a directory holding more than `.` and `..`.
    #[error("'{0}' is not empty")]
    NotEmpty(String),
    /// A new name exceeds `MAX_NAME - 1` bytes (room for the NUL).
    #[error("name too long: '{0}'")]
    NameTooLong(String),
    /// A forbidden name (`.` or `..`) was given where a mutable name is
    /// required.
    #[error("'{0}' is not a valid name here")]
    Invalid(String),
    /// The requested size would exceed `D * block_size`.
    #[error("file too large for direct-block capacity")]
    FileTooLarge,
    /// The host file passed to `import` could not be opened.
    #[error("could not open host file '{0}': {1}")]
    HostOpen(String, io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
