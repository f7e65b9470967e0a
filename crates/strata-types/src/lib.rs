#![forbid(unsafe_code)]
//! Primitive types shared across the Strata workspace.
//!
//! Unit-carrying wrappers (`BlockNo`, `InodeNo`, `GroupNo`, `BlockSize`)
//! prevent mixing block numbers, byte offsets, and inode numbers, and the
//! bounds-checked little-endian read helpers are the only way parsing code
//! touches raw bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Byte offset of the superblock from the start of the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Size of the on-disk superblock region in bytes.
pub const SUPERBLOCK_SIZE: usize = 1024;
/// Superblock magic signature.
pub const SUPER_MAGIC: u16 = 0xEF53;
/// Extent-node header magic.
pub const EXTENT_MAGIC: u16 = 0xF30A;

/// Group descriptor size when the superblock does not record one.
pub const GROUP_DESC_SIZE_DEFAULT: u16 = 32;

/// Maximum symlink target length stored inline in the inode block area.
pub const FAST_SYMLINK_MAX: usize = 60;

/// A physical block number on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNo(pub u64);

/// A 1-based inode number. Inode 0 is never valid on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNo(pub u32);

impl InodeNo {
    /// The root directory inode.
    pub const ROOT: Self = Self(2);
    /// First inode available for ordinary files.
    pub const FIRST_ORDINARY: Self = Self(11);
}

/// A block-group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupNo(pub u32);

/// Validated filesystem block size.
///
/// Derived from the superblock's log field as `1024 << log`; only
/// 1024/2048/4096 are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockSize(u32);

impl BlockSize {
    pub fn from_log(log_block_size: u32) -> Result<Self, ParseError> {
        let shift = 10_u32
            .checked_add(log_block_size)
            .ok_or(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "shift overflow",
            })?;
        let value = 1_u32
            .checked_shl(shift)
            .ok_or(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "shift overflow",
            })?;
        if !matches!(value, 1024 | 2048 | 4096) {
            return Err(ParseError::InvalidField {
                field: "s_log_block_size",
                reason: "unsupported block size",
            });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of the start of `block`, `None` on overflow.
    #[must_use]
    pub fn block_to_byte(self, block: BlockNo) -> Option<u64> {
        block.0.checked_mul(u64::from(self.0))
    }

    /// Number of blocks needed to hold `bytes` bytes.
    #[must_use]
    pub fn blocks_for(self, bytes: u64) -> u64 {
        bytes.div_ceil(u64::from(self.0))
    }
}

impl BlockNo {
    #[must_use]
    pub fn checked_add(self, count: u64) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }
}

/// Errors produced while decoding on-disk bytes.
///
/// Runtime consumers convert these into the user-facing error type at the
/// filesystem boundary; the parsing layer stays independent of it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

/// Borrow `len` bytes at `offset`, failing instead of panicking.
#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Decode a NUL-padded fixed-width label field.
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

// ── POSIX file mode constants ───────────────────────────────────────────────

/// File type mask (upper 4 bits of mode).
pub const S_IFMT: u16 = 0o170_000;
/// Named pipe (FIFO).
pub const S_IFIFO: u16 = 0o010_000;
/// Character device.
pub const S_IFCHR: u16 = 0o020_000;
/// Directory.
pub const S_IFDIR: u16 = 0o040_000;
/// Block device.
pub const S_IFBLK: u16 = 0o060_000;
/// Regular file.
pub const S_IFREG: u16 = 0o100_000;
/// Symbolic link.
pub const S_IFLNK: u16 = 0o120_000;
/// Socket.
pub const S_IFSOCK: u16 = 0o140_000;

// ── Inode flags (i_flags) ───────────────────────────────────────────────────

/// Immutable file.
pub const INODE_FL_IMMUTABLE: u32 = 0x0000_0010;
/// Append-only file.
pub const INODE_FL_APPEND: u32 = 0x0000_0020;
/// Hash-indexed directory.
pub const INODE_FL_INDEX: u32 = 0x0000_1000;
/// Huge file (block count in fs blocks, not 512-byte sectors).
pub const INODE_FL_HUGE_FILE: u32 = 0x0004_0000;
/// Inode uses extent-based addressing.
pub const INODE_FL_EXTENTS: u32 = 0x0008_0000;
/// Inode stores data inline.
pub const INODE_FL_INLINE_DATA: u32 = 0x1000_0000;

// ── Inode/group math ────────────────────────────────────────────────────────

/// Block group that owns an inode. Inode numbers are 1-based.
#[must_use]
pub fn inode_to_group(ino: InodeNo, inodes_per_group: u32) -> GroupNo {
    GroupNo(ino.0.saturating_sub(1) / inodes_per_group)
}

/// Index of an inode inside its group's inode table.
#[must_use]
pub fn inode_index_in_group(ino: InodeNo, inodes_per_group: u32) -> u32 {
    ino.0.saturating_sub(1) % inodes_per_group
}

impl fmt::Display for BlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
