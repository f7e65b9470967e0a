#![forbid(unsafe_code)]
//! Runtime error types for Strata.
//!
//! Two-layer model: the parsing layer (`strata-types::ParseError`) reports
//! on-disk format violations and stays independent of this crate; `FsError`
//! is the single user-facing error type returned by the filesystem driver
//! and the VFS. Parse errors convert into `FsError` at the driver boundary.
//!
//! Every variant maps to exactly one POSIX errno via [`FsError::to_errno`].
//! The match is exhaustive so adding a variant without assigning an errno
//! is a compile error.

use thiserror::Error;

/// Unified error type for all filesystem and VFS operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// Null or malformed caller input (bad fd, bad seek, relative path
    /// where an absolute one is required).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The superblock failed its magic or geometry checks at mount time.
    #[error("invalid superblock: {0}")]
    InvalidSuperblock(String),

    /// A derived block-group index fell outside the descriptor table.
    #[error("invalid group index {group} (filesystem has {groups} groups)")]
    InvalidGroupIndex { group: u32, groups: u32 },

    /// An inode number outside the valid 1-based range.
    #[error("invalid inode number {ino}")]
    InvalidInode { ino: u32 },

    /// The inode does not use extent addressing (legacy indirect block
    /// maps are intentionally not implemented).
    #[error("inode {ino} does not use extent addressing")]
    UnsupportedAddressing { ino: u32 },

    /// A logical block falls in a sparse hole: no extent covers it.
    /// Distinct from an I/O failure.
    #[error("logical block {logical} is not mapped by any extent")]
    BlockNotMapped { logical: u32 },

    /// An extent node failed its magic or structural checks mid-traversal.
    #[error("corrupt extent node at block {block}: {detail}")]
    CorruptExtentNode { block: u64, detail: String },

    /// A directory block violated the record-length invariants.
    #[error("corrupt directory block at block {block}: {detail}")]
    CorruptDirectory { block: u64, detail: String },

    /// A path component does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path component that must be a directory is not one.
    #[error("not a directory")]
    NotDirectory,

    /// A file operation was attempted on a directory.
    #[error("is a directory")]
    IsDirectory,

    /// Path or name exceeds the configured length limits.
    #[error("name too long")]
    NameTooLong,

    /// The node's operation table does not provide this operation.
    #[error("operation not supported: {op}")]
    Unsupported { op: &'static str },

    /// A write was attempted on a read-only filesystem.
    #[error("read-only filesystem")]
    ReadOnly,

    /// The file-descriptor or mount table is full.
    #[error("out of resources: {0}")]
    OutOfResources(&'static str),

    /// Underlying device error, passed through opaquely.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Convert this error into a POSIX errno.
    ///
    /// Consumers (a shell, a libc shim) translate the uniform failure
    /// signal into their own surface; the mapping lives here so it stays
    /// exhaustive.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::InvalidArgument(_) | Self::InvalidSuperblock(_) => libc::EINVAL,
            Self::InvalidGroupIndex { .. } | Self::InvalidInode { .. } => libc::EINVAL,
            Self::UnsupportedAddressing { .. } | Self::Unsupported { .. } => libc::EOPNOTSUPP,
            Self::BlockNotMapped { .. } => libc::ENXIO,
            Self::CorruptExtentNode { .. } | Self::CorruptDirectory { .. } => libc::EIO,
            Self::NotFound(_) => libc::ENOENT,
            Self::NotDirectory => libc::ENOTDIR,
            Self::IsDirectory => libc::EISDIR,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::ReadOnly => libc::EROFS,
            Self::OutOfResources(_) => libc::ENFILE,
        }
    }
}

/// Result alias using `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;
