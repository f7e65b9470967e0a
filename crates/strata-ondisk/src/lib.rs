#![forbid(unsafe_code)]
//! On-disk format parsing.
//!
//! Everything here is pure: bytes in, structures or [`ParseError`] out. No
//! device access, no allocation beyond the parsed values themselves. The
//! filesystem driver decides what a parse failure means (mount failure,
//! corruption, hole).
//!
//! All multi-byte fields are little-endian. Split low/high fields are
//! recombined into full-width values at parse time so no caller ever sees
//! a half.

use serde::{Deserialize, Serialize};
use strata_types::{
    BlockSize, EXTENT_MAGIC, FAST_SYMLINK_MAX, GROUP_DESC_SIZE_DEFAULT, INODE_FL_EXTENTS,
    INODE_FL_INDEX, ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG,
    S_IFSOCK, SUPER_MAGIC, SUPERBLOCK_SIZE, read_fixed, read_le_u16, read_le_u32, read_u8,
    trim_nul_padded,
};

// ── Feature flags ───────────────────────────────────────────────────────────

/// Compatible feature flags (`s_feature_compat`). Advisory; unknown bits
/// are safe to ignore on a read-only mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatFeatures(pub u32);

impl CompatFeatures {
    pub const DIR_PREALLOC: Self = Self(0x0001);
    pub const HAS_JOURNAL: Self = Self(0x0004);
    pub const EXT_ATTR: Self = Self(0x0008);
    pub const RESIZE_INODE: Self = Self(0x0010);
    pub const DIR_INDEX: Self = Self(0x0020);

    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }
}

/// Incompatible feature flags (`s_feature_incompat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatFeatures(pub u32);

impl IncompatFeatures {
    pub const COMPRESSION: Self = Self(0x0001);
    pub const FILETYPE: Self = Self(0x0002);
    pub const RECOVER: Self = Self(0x0004);
    pub const JOURNAL_DEV: Self = Self(0x0008);
    pub const META_BG: Self = Self(0x0010);
    pub const EXTENTS: Self = Self(0x0040);
    pub const BIT64: Self = Self(0x0080);
    pub const MMP: Self = Self(0x0100);
    pub const FLEX_BG: Self = Self(0x0200);
    pub const INLINE_DATA: Self = Self(0x8000);
    pub const ENCRYPT: Self = Self(0x0001_0000);

    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }
}

/// Read-only-compatible feature flags (`s_feature_ro_compat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoCompatFeatures(pub u32);

impl RoCompatFeatures {
    pub const SPARSE_SUPER: Self = Self(0x0001);
    pub const LARGE_FILE: Self = Self(0x0002);
    pub const HUGE_FILE: Self = Self(0x0008);
    pub const DIR_NLINK: Self = Self(0x0020);
    pub const EXTRA_ISIZE: Self = Self(0x0040);
    pub const METADATA_CSUM: Self = Self(0x0400);

    #[must_use]
    pub fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }
}

// ── Superblock ──────────────────────────────────────────────────────────────

/// Parsed superblock.
///
/// Split 64-bit counters are recombined; the block size is derived from
/// the log field and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub free_blocks_count: u64,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub block_size: BlockSize,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub first_ino: u32,
    pub desc_size: u16,

    pub magic: u16,
    pub uuid: [u8; 16],
    pub volume_name: String,
    pub last_mounted: String,

    pub rev_level: u32,
    pub minor_rev_level: u16,
    pub creator_os: u32,

    pub feature_compat: CompatFeatures,
    pub feature_incompat: IncompatFeatures,
    pub feature_ro_compat: RoCompatFeatures,

    pub state: u16,
    pub errors: u16,
    pub mnt_count: u16,
    pub max_mnt_count: u16,

    pub mtime: u32,
    pub wtime: u32,
    pub lastcheck: u32,

    pub journal_inum: u32,
}

impl Superblock {
    /// Parse a superblock from its 1024-byte on-disk region.
    pub fn parse(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < SUPERBLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: SUPERBLOCK_SIZE,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x38)?;
        if magic != SUPER_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: u32::from(SUPER_MAGIC),
                actual: u32::from(magic),
            });
        }

        let blocks_lo = u64::from(read_le_u32(region, 0x04)?);
        let blocks_hi = u64::from(read_le_u32(region, 0x150)?);
        let free_blocks_lo = u64::from(read_le_u32(region, 0x0C)?);
        let free_blocks_hi = u64::from(read_le_u32(region, 0x158)?);

        let block_size = BlockSize::from_log(read_le_u32(region, 0x18)?)?;

        Ok(Self {
            inodes_count: read_le_u32(region, 0x00)?,
            blocks_count: blocks_lo | (blocks_hi << 32),
            free_blocks_count: free_blocks_lo | (free_blocks_hi << 32),
            free_inodes_count: read_le_u32(region, 0x10)?,
            first_data_block: read_le_u32(region, 0x14)?,
            block_size,
            blocks_per_group: read_le_u32(region, 0x20)?,
            inodes_per_group: read_le_u32(region, 0x28)?,
            inode_size: read_le_u16(region, 0x58)?,
            first_ino: read_le_u32(region, 0x54)?,
            desc_size: read_le_u16(region, 0xFE)?,

            magic,
            uuid: read_fixed::<16>(region, 0x68)?,
            volume_name: trim_nul_padded(&read_fixed::<16>(region, 0x78)?),
            last_mounted: trim_nul_padded(&read_fixed::<64>(region, 0x88)?),

            rev_level: read_le_u32(region, 0x4C)?,
            minor_rev_level: read_le_u16(region, 0x3E)?,
            creator_os: read_le_u32(region, 0x48)?,

            feature_compat: CompatFeatures(read_le_u32(region, 0x5C)?),
            feature_incompat: IncompatFeatures(read_le_u32(region, 0x60)?),
            feature_ro_compat: RoCompatFeatures(read_le_u32(region, 0x64)?),

            state: read_le_u16(region, 0x3A)?,
            errors: read_le_u16(region, 0x3C)?,
            mnt_count: read_le_u16(region, 0x34)?,
            max_mnt_count: read_le_u16(region, 0x36)?,

            mtime: read_le_u32(region, 0x2C)?,
            wtime: read_le_u32(region, 0x30)?,
            lastcheck: read_le_u32(region, 0x40)?,

            journal_inum: read_le_u32(region, 0xE0)?,
        })
    }

    /// Whether the filesystem declares extent-based addressing.
    #[must_use]
    pub fn has_extents(&self) -> bool {
        self.feature_incompat.contains(IncompatFeatures::EXTENTS)
    }

    #[must_use]
    pub fn is_64bit(&self) -> bool {
        self.feature_incompat.contains(IncompatFeatures::BIT64)
    }

    /// Effective group-descriptor size. The legacy default applies when
    /// the superblock records zero.
    #[must_use]
    pub fn group_desc_size(&self) -> u16 {
        if self.desc_size == 0 {
            GROUP_DESC_SIZE_DEFAULT
        } else {
            self.desc_size
        }
    }

    /// Number of block groups, `ceil(blocks / blocks_per_group)`.
    #[must_use]
    pub fn groups_count(&self) -> u32 {
        if self.blocks_per_group == 0 {
            return 0;
        }
        let groups = self.blocks_count.div_ceil(u64::from(self.blocks_per_group));
        u32::try_from(groups).unwrap_or(u32::MAX)
    }

    /// Basic geometry sanity applied at mount time.
    pub fn validate_geometry(&self) -> Result<(), ParseError> {
        if self.blocks_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_blocks_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inodes_per_group == 0 {
            return Err(ParseError::InvalidField {
                field: "s_inodes_per_group",
                reason: "cannot be zero",
            });
        }
        if self.inode_size < 128 || !self.inode_size.is_power_of_two() {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "must be a power of two >= 128",
            });
        }
        if u32::from(self.inode_size) > self.block_size.get() {
            return Err(ParseError::InvalidField {
                field: "s_inode_size",
                reason: "exceeds block size",
            });
        }
        if self.is_64bit() && self.group_desc_size() < 64 {
            return Err(ParseError::InvalidField {
                field: "s_desc_size",
                reason: "64BIT feature set but desc_size < 64",
            });
        }
        Ok(())
    }
}

// ── Group descriptor ────────────────────────────────────────────────────────

/// Parsed block-group descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDesc {
    pub block_bitmap: u64,
    pub inode_bitmap: u64,
    pub inode_table: u64,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub used_dirs_count: u32,
    pub flags: u16,
    pub itable_unused: u32,
}

impl GroupDesc {
    /// Parse one descriptor. The high halves exist only in 64-byte
    /// descriptors; 32-byte descriptors read zero for them.
    pub fn parse(bytes: &[u8], desc_size: u16) -> Result<Self, ParseError> {
        let desc_len = usize::from(desc_size);
        if bytes.len() < desc_len || desc_len < usize::from(GROUP_DESC_SIZE_DEFAULT) {
            return Err(ParseError::InsufficientData {
                needed: desc_len.max(usize::from(GROUP_DESC_SIZE_DEFAULT)),
                offset: 0,
                actual: bytes.len(),
            });
        }

        let block_bitmap_lo = u64::from(read_le_u32(bytes, 0x00)?);
        let inode_bitmap_lo = u64::from(read_le_u32(bytes, 0x04)?);
        let inode_table_lo = u64::from(read_le_u32(bytes, 0x08)?);
        let free_blocks_lo = u32::from(read_le_u16(bytes, 0x0C)?);
        let free_inodes_lo = u32::from(read_le_u16(bytes, 0x0E)?);
        let used_dirs_lo = u32::from(read_le_u16(bytes, 0x10)?);
        let flags = read_le_u16(bytes, 0x12)?;
        let itable_unused_lo = u32::from(read_le_u16(bytes, 0x1C)?);

        let (
            block_bitmap_hi,
            inode_bitmap_hi,
            inode_table_hi,
            free_blocks_hi,
            free_inodes_hi,
            used_dirs_hi,
            itable_unused_hi,
        ) = if desc_len >= 64 {
            (
                u64::from(read_le_u32(bytes, 0x20)?),
                u64::from(read_le_u32(bytes, 0x24)?),
                u64::from(read_le_u32(bytes, 0x28)?),
                u32::from(read_le_u16(bytes, 0x2C)?),
                u32::from(read_le_u16(bytes, 0x2E)?),
                u32::from(read_le_u16(bytes, 0x30)?),
                u32::from(read_le_u16(bytes, 0x32)?),
            )
        } else {
            (0, 0, 0, 0, 0, 0, 0)
        };

        Ok(Self {
            block_bitmap: block_bitmap_lo | (block_bitmap_hi << 32),
            inode_bitmap: inode_bitmap_lo | (inode_bitmap_hi << 32),
            inode_table: inode_table_lo | (inode_table_hi << 32),
            free_blocks_count: free_blocks_lo | (free_blocks_hi << 16),
            free_inodes_count: free_inodes_lo | (free_inodes_hi << 16),
            used_dirs_count: used_dirs_lo | (used_dirs_hi << 16),
            flags,
            itable_unused: itable_unused_lo | (itable_unused_hi << 16),
        })
    }
}

// ── Inode ───────────────────────────────────────────────────────────────────

/// Parsed inode record.
///
/// `block_area` is the raw 60-byte `i_block` region: the extent-tree root
/// for extent files, or the inline target for fast symlinks. Kept as an
/// owned buffer so the record is self-contained once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links_count: u16,
    pub blocks: u64,
    pub flags: u32,
    pub generation: u32,
    pub file_acl: u64,

    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,

    pub block_area: Vec<u8>,
}

impl Inode {
    /// Parse an inode from raw bytes. Requires at least the 128-byte base
    /// record; the high halves at `0x74..0x80` are read when present.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 128 {
            return Err(ParseError::InsufficientData {
                needed: 128,
                offset: 0,
                actual: bytes.len(),
            });
        }

        let uid_lo = u32::from(read_le_u16(bytes, 0x02)?);
        let gid_lo = u32::from(read_le_u16(bytes, 0x18)?);
        let size_lo = u64::from(read_le_u32(bytes, 0x04)?);
        let size_hi = u64::from(read_le_u32(bytes, 0x6C)?);
        let blocks_lo = u64::from(read_le_u32(bytes, 0x1C)?);
        let file_acl_lo = u64::from(read_le_u32(bytes, 0x68)?);

        let blocks_hi = u64::from(read_le_u16(bytes, 0x74)?);
        let file_acl_hi = u64::from(read_le_u16(bytes, 0x76)?);
        let uid_hi = u32::from(read_le_u16(bytes, 0x78)?);
        let gid_hi = u32::from(read_le_u16(bytes, 0x7A)?);

        Ok(Self {
            mode: read_le_u16(bytes, 0x00)?,
            uid: uid_lo | (uid_hi << 16),
            gid: gid_lo | (gid_hi << 16),
            size: size_lo | (size_hi << 32),
            links_count: read_le_u16(bytes, 0x1A)?,
            blocks: blocks_lo | (blocks_hi << 32),
            flags: read_le_u32(bytes, 0x20)?,
            generation: read_le_u32(bytes, 0x64)?,
            file_acl: file_acl_lo | (file_acl_hi << 32),

            atime: read_le_u32(bytes, 0x08)?,
            ctime: read_le_u32(bytes, 0x0C)?,
            mtime: read_le_u32(bytes, 0x10)?,
            dtime: read_le_u32(bytes, 0x14)?,

            block_area: read_fixed::<60>(bytes, 0x28)?.to_vec(),
        })
    }

    /// Whether the inode uses extent-based addressing.
    #[must_use]
    pub fn uses_extents(&self) -> bool {
        (self.flags & INODE_FL_EXTENTS) != 0
    }

    /// Whether this directory uses a hash-tree index.
    #[must_use]
    pub fn has_htree_index(&self) -> bool {
        (self.flags & INODE_FL_INDEX) != 0
    }

    #[must_use]
    pub fn file_type_mode(&self) -> u16 {
        self.mode & S_IFMT
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type_mode() == S_IFREG
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type_mode() == S_IFDIR
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type_mode() == S_IFLNK
    }

    #[must_use]
    pub fn is_chrdev(&self) -> bool {
        self.file_type_mode() == S_IFCHR
    }

    #[must_use]
    pub fn is_blkdev(&self) -> bool {
        self.file_type_mode() == S_IFBLK
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.file_type_mode() == S_IFIFO
    }

    #[must_use]
    pub fn is_socket(&self) -> bool {
        self.file_type_mode() == S_IFSOCK
    }

    /// Permission bits (lower 12 bits of mode).
    #[must_use]
    pub fn permission_bits(&self) -> u16 {
        self.mode & 0o7777
    }

    /// Whether this is a fast symlink: target stored inline in the block
    /// area instead of data blocks.
    #[must_use]
    pub fn is_fast_symlink(&self) -> bool {
        self.is_symlink() && !self.uses_extents() && self.size <= FAST_SYMLINK_MAX as u64
    }

    /// Inline target bytes of a fast symlink, `None` otherwise.
    #[must_use]
    pub fn fast_symlink_target(&self) -> Option<&[u8]> {
        if !self.is_fast_symlink() {
            return None;
        }
        let len = usize::try_from(self.size).ok()?;
        self.block_area.get(..len)
    }
}

// ── Extent tree nodes ───────────────────────────────────────────────────────

/// Extent-node header. Present at the start of the inode block area and of
/// every external tree block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentHeader {
    pub magic: u16,
    pub entries: u16,
    pub max_entries: u16,
    pub depth: u16,
    pub generation: u32,
}

/// Size of the extent header and of each entry, both 12 bytes.
pub const EXTENT_HEADER_SIZE: usize = 12;
pub const EXTENT_ENTRY_SIZE: usize = 12;

/// Length values above this mark the extent unwritten (reads as zeros).
const EXT_INIT_MAX_LEN: u16 = 1_u16 << 15;

/// A leaf extent: `len` logical blocks starting at `logical_block`, mapped
/// to physical blocks starting at `physical_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub logical_block: u32,
    pub raw_len: u16,
    pub physical_start: u64,
}

impl Extent {
    /// Whether the extent is allocated but unwritten.
    #[must_use]
    pub fn is_unwritten(self) -> bool {
        self.raw_len > EXT_INIT_MAX_LEN
    }

    /// Covered length in blocks, with the unwritten bit masked off.
    #[must_use]
    pub fn actual_len(self) -> u16 {
        if self.raw_len <= EXT_INIT_MAX_LEN {
            self.raw_len
        } else {
            self.raw_len - EXT_INIT_MAX_LEN
        }
    }
}

/// An index entry in an internal extent node, pointing at a child block
/// that covers logical blocks from `logical_block` onward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentIndex {
    pub logical_block: u32,
    pub child_block: u64,
}

/// Entries of one extent node, discriminated by the header depth: internal
/// nodes (depth > 0) hold indexes, leaves (depth 0) hold extents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtentNode {
    Leaf(Vec<Extent>),
    Index(Vec<ExtentIndex>),
}

/// Parse one extent node (header plus entries) from a byte buffer.
///
/// The buffer is the 60-byte inode block area for the root, or a whole
/// filesystem block for external nodes.
pub fn parse_extent_node(bytes: &[u8]) -> Result<(ExtentHeader, ExtentNode), ParseError> {
    if bytes.len() < EXTENT_HEADER_SIZE {
        return Err(ParseError::InsufficientData {
            needed: EXTENT_HEADER_SIZE,
            offset: 0,
            actual: bytes.len(),
        });
    }

    let header = ExtentHeader {
        magic: read_le_u16(bytes, 0x00)?,
        entries: read_le_u16(bytes, 0x02)?,
        max_entries: read_le_u16(bytes, 0x04)?,
        depth: read_le_u16(bytes, 0x06)?,
        generation: read_le_u32(bytes, 0x08)?,
    };

    if header.magic != EXTENT_MAGIC {
        return Err(ParseError::InvalidMagic {
            expected: u32::from(EXTENT_MAGIC),
            actual: u32::from(header.magic),
        });
    }

    if header.entries > header.max_entries {
        return Err(ParseError::InvalidField {
            field: "eh_entries",
            reason: "entries exceed max_entries",
        });
    }

    let entries_len = usize::from(header.entries);
    let needed = EXTENT_HEADER_SIZE
        .checked_add(entries_len.saturating_mul(EXTENT_ENTRY_SIZE))
        .ok_or(ParseError::InvalidField {
            field: "eh_entries",
            reason: "entry span overflow",
        })?;
    if bytes.len() < needed {
        return Err(ParseError::InsufficientData {
            needed,
            offset: EXTENT_HEADER_SIZE,
            actual: bytes.len().saturating_sub(EXTENT_HEADER_SIZE),
        });
    }

    if header.depth == 0 {
        let mut extents = Vec::with_capacity(entries_len);
        for idx in 0..entries_len {
            let base = EXTENT_HEADER_SIZE + idx * EXTENT_ENTRY_SIZE;
            let logical_block = read_le_u32(bytes, base)?;
            let raw_len = read_le_u16(bytes, base + 4)?;
            let start_hi = u64::from(read_le_u16(bytes, base + 6)?);
            let start_lo = u64::from(read_le_u32(bytes, base + 8)?);
            extents.push(Extent {
                logical_block,
                raw_len,
                physical_start: start_lo | (start_hi << 32),
            });
        }
        Ok((header, ExtentNode::Leaf(extents)))
    } else {
        let mut indexes = Vec::with_capacity(entries_len);
        for idx in 0..entries_len {
            let base = EXTENT_HEADER_SIZE + idx * EXTENT_ENTRY_SIZE;
            let logical_block = read_le_u32(bytes, base)?;
            let child_lo = u64::from(read_le_u32(bytes, base + 4)?);
            let child_hi = u64::from(read_le_u16(bytes, base + 8)?);
            indexes.push(ExtentIndex {
                logical_block,
                child_block: child_lo | (child_hi << 32),
            });
        }
        Ok((header, ExtentNode::Index(indexes)))
    }
}

// ── Directory entries ───────────────────────────────────────────────────────

/// File-type tag carried in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DirFileType {
    Unknown = 0,
    RegFile = 1,
    Dir = 2,
    Chrdev = 3,
    Blkdev = 4,
    Fifo = 5,
    Sock = 6,
    Symlink = 7,
}

impl DirFileType {
    #[must_use]
    pub fn from_raw(val: u8) -> Self {
        match val {
            1 => Self::RegFile,
            2 => Self::Dir,
            3 => Self::Chrdev,
            4 => Self::Blkdev,
            5 => Self::Fifo,
            6 => Self::Sock,
            7 => Self::Symlink,
            _ => Self::Unknown,
        }
    }
}

/// Directory entry header size (inode + rec_len + name_len + file_type).
pub const DIR_ENTRY_HEADER_LEN: usize = 8;

/// A borrowed directory entry referencing name bytes inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntryRef<'a> {
    pub ino: u32,
    pub rec_len: u16,
    pub file_type: DirFileType,
    pub name: &'a [u8],
}

impl DirEntryRef<'_> {
    /// Copy into an owned [`DirEntry`].
    #[must_use]
    pub fn to_owned(&self) -> DirEntry {
        DirEntry {
            ino: self.ino,
            rec_len: self.rec_len,
            file_type: self.file_type,
            name: self.name.to_vec(),
        }
    }
}

/// An owned directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub ino: u32,
    pub rec_len: u16,
    pub file_type: DirFileType,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Lossy UTF-8 view of the name.
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.name == b"."
    }

    #[must_use]
    pub fn is_dotdot(&self) -> bool {
        self.name == b".."
    }
}

/// Bounds-checked cursor over the packed entries of one directory block.
///
/// Yields live entries (`inode != 0`), skips deleted slots, and stops at a
/// zero `rec_len` terminator, which may appear before the physical end of
/// the block. Every advance is validated against the remaining span, so a
/// corrupt `rec_len` surfaces as an error instead of a wild read.
pub struct DirCursor<'a> {
    block: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> DirCursor<'a> {
    #[must_use]
    pub fn new(block: &'a [u8]) -> Self {
        Self {
            block,
            offset: 0,
            done: false,
        }
    }

    fn fail(&mut self, field: &'static str, reason: &'static str) -> ParseError {
        self.done = true;
        ParseError::InvalidField { field, reason }
    }

    fn step(&mut self) -> Option<Result<DirEntryRef<'a>, ParseError>> {
        loop {
            if self.done || self.offset + DIR_ENTRY_HEADER_LEN > self.block.len() {
                return None;
            }

            let ino = match read_le_u32(self.block, self.offset) {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let rec_len = match read_le_u16(self.block, self.offset + 4) {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let name_len = match read_u8(self.block, self.offset + 6) {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let file_type_raw = match read_u8(self.block, self.offset + 7) {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            // Terminator: remaining space in the block is one free record.
            if rec_len == 0 {
                self.done = true;
                return None;
            }

            let rec_len_usize = usize::from(rec_len);
            if rec_len_usize < DIR_ENTRY_HEADER_LEN {
                return Some(Err(self.fail("de_rec_len", "rec_len below header size")));
            }
            if rec_len_usize % 4 != 0 {
                return Some(Err(self.fail("de_rec_len", "rec_len not 4-byte aligned")));
            }
            let Some(entry_end) = self.offset.checked_add(rec_len_usize) else {
                return Some(Err(self.fail("de_rec_len", "offset overflow")));
            };
            if entry_end > self.block.len() {
                return Some(Err(
                    self.fail("de_rec_len", "entry extends past block boundary")
                ));
            }

            let name_end = self.offset + DIR_ENTRY_HEADER_LEN + usize::from(name_len);
            if name_end > entry_end {
                return Some(Err(self.fail("de_name_len", "name extends past rec_len")));
            }

            let name = &self.block[self.offset + DIR_ENTRY_HEADER_LEN..name_end];
            self.offset = entry_end;

            // Deleted entries keep their slot but clear the inode.
            if ino == 0 {
                continue;
            }

            return Some(Ok(DirEntryRef {
                ino,
                rec_len,
                file_type: DirFileType::from_raw(file_type_raw),
                name,
            }));
        }
    }
}

impl<'a> Iterator for DirCursor<'a> {
    type Item = Result<DirEntryRef<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step()
    }
}

/// Parse all live entries of one directory block into owned records.
pub fn parse_dir_block(block: &[u8]) -> Result<Vec<DirEntry>, ParseError> {
    DirCursor::new(block)
        .map(|res| res.map(|e| e.to_owned()))
        .collect()
}
