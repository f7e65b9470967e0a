#![forbid(unsafe_code)]
//! Synthetic ext4 image builder.
//!
//! Produces small single-group images with 1024-byte blocks for
//! integration tests: a superblock, one group descriptor, an inode table,
//! and files/directories/symlinks wired up through real extent roots and
//! packed directory blocks. The layout is fixed and documented so tests
//! can corrupt specific structures by offset.
//!
//! Block layout:
//!
//! | block | content |
//! |-------|---------|
//! | 0     | boot area (first 1024 bytes) — the superblock lives at byte 1024, i.e. block 1 |
//! | 2     | group descriptor table |
//! | 3, 4  | block / inode bitmaps (present but unused by the reader) |
//! | 5..13 | inode table (32 inodes × 256 bytes) |
//! | 16..  | data blocks, allocated upward |

use strata_types::{
    EXTENT_MAGIC, INODE_FL_EXTENTS, S_IFDIR, S_IFLNK, S_IFREG, SUPER_MAGIC,
};

/// Fixed block size of generated images.
pub const BLOCK_SIZE: u32 = 1024;
/// Inode record size.
pub const INODE_SIZE: u16 = 256;
/// Inodes in the single group.
pub const INODES_PER_GROUP: u32 = 32;
/// First block of the inode table.
pub const INODE_TABLE_BLOCK: u64 = 5;
/// First block handed out by the data allocator.
pub const FIRST_ALLOC_BLOCK: u64 = 16;
/// The root directory inode.
pub const ROOT_INO: u32 = 2;

const EXTENT_HEADER_SIZE: usize = 12;
const EXTENT_ENTRY_SIZE: usize = 12;
const DIR_HEADER_LEN: usize = 8;

/// Write a little-endian u16 into an image buffer.
pub fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

/// Write a little-endian u32 into an image buffer.
pub fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

/// Directory entry file-type tags.
pub mod ftype {
    pub const REG: u8 = 1;
    pub const DIR: u8 = 2;
    pub const SYMLINK: u8 = 7;
}

/// A file added to the image, with enough placement detail for tests to
/// assert extent math or corrupt structures.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub ino: u32,
    /// First physical block of the (contiguous) data run; 0 for empty files.
    pub first_block: u64,
    /// Number of data blocks.
    pub block_count: u64,
}

/// A file whose extent tree has one index level.
#[derive(Debug, Clone)]
pub struct DeepFileInfo {
    pub ino: u32,
    /// The external leaf node block referenced from the inode's root index.
    pub leaf_node_block: u64,
    /// First data block.
    pub first_block: u64,
}

struct DirState {
    ino: u32,
    parent: u32,
    block: u64,
    entries: Vec<(u32, u8, Vec<u8>)>,
}

/// Builds one image; call the `add_*` methods, then [`ImageBuilder::finish`].
pub struct ImageBuilder {
    image: Vec<u8>,
    block_count: u64,
    next_block: u64,
    next_ino: u32,
    dirs: Vec<DirState>,
}

impl ImageBuilder {
    /// Create an image of `block_count` 1024-byte blocks holding an empty
    /// root directory.
    #[must_use]
    pub fn new(block_count: u64) -> Self {
        assert!(block_count >= 32, "image too small for the fixed layout");

        let mut builder = Self {
            image: vec![0_u8; (block_count * u64::from(BLOCK_SIZE)) as usize],
            block_count,
            next_block: FIRST_ALLOC_BLOCK,
            next_ino: 11,
            dirs: Vec::new(),
        };

        builder.write_superblock();
        builder.write_group_desc();

        let root_block = builder.alloc_block();
        builder.dirs.push(DirState {
            ino: ROOT_INO,
            parent: ROOT_INO,
            block: root_block,
            entries: Vec::new(),
        });
        builder.write_dir_inode(ROOT_INO, root_block);
        builder.rewrite_dir_block(0);

        builder
    }

    /// Total image blocks.
    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    fn write_superblock(&mut self) {
        let sb = &mut self.image[1024..2048];
        put_u32(sb, 0x00, INODES_PER_GROUP); // inodes_count
        put_u32(sb, 0x04, self.block_count as u32); // blocks_count_lo
        put_u32(sb, 0x10, INODES_PER_GROUP - 11); // free_inodes_count
        put_u32(sb, 0x14, 1); // first_data_block
        put_u32(sb, 0x18, 0); // log_block_size -> 1024
        put_u32(sb, 0x20, 8192); // blocks_per_group
        put_u32(sb, 0x28, INODES_PER_GROUP); // inodes_per_group
        put_u16(sb, 0x38, SUPER_MAGIC);
        put_u16(sb, 0x3A, 1); // state: clean
        put_u32(sb, 0x4C, 1); // rev_level
        put_u32(sb, 0x54, 11); // first_ino
        put_u16(sb, 0x58, INODE_SIZE);
        put_u32(sb, 0x60, 0x0002 | 0x0040); // incompat: FILETYPE | EXTENTS
        sb[0x78..0x83].copy_from_slice(b"strata-test");
    }

    fn write_group_desc(&mut self) {
        let gd_off = 2 * BLOCK_SIZE as usize;
        let gd = &mut self.image[gd_off..gd_off + 32];
        put_u32(gd, 0x00, 3); // block bitmap
        put_u32(gd, 0x04, 4); // inode bitmap
        put_u32(gd, 0x08, INODE_TABLE_BLOCK as u32); // inode table
        put_u16(gd, 0x0C, 0); // free blocks
        put_u16(gd, 0x0E, (INODES_PER_GROUP - 11) as u16); // free inodes
        put_u16(gd, 0x10, 1); // used dirs
    }

    fn alloc_block(&mut self) -> u64 {
        let block = self.next_block;
        assert!(block < self.block_count, "image out of data blocks");
        self.next_block += 1;
        block
    }

    fn alloc_blocks(&mut self, n: u64) -> u64 {
        let first = self.next_block;
        for _ in 0..n {
            self.alloc_block();
        }
        first
    }

    fn alloc_ino(&mut self) -> u32 {
        let ino = self.next_ino;
        assert!(ino <= INODES_PER_GROUP, "image out of inodes");
        self.next_ino += 1;
        ino
    }

    /// Overwrite one whole data block.
    pub fn write_block(&mut self, block: u64, data: &[u8]) {
        assert!(data.len() <= BLOCK_SIZE as usize);
        let off = (block * u64::from(BLOCK_SIZE)) as usize;
        self.image[off..off + data.len()].copy_from_slice(data);
    }

    // ── inode records ───────────────────────────────────────────────────

    fn inode_offset(ino: u32) -> usize {
        assert!(ino >= 1);
        (INODE_TABLE_BLOCK * u64::from(BLOCK_SIZE)) as usize
            + (ino as usize - 1) * INODE_SIZE as usize
    }

    fn write_raw_inode(&mut self, ino: u32, mode: u16, size: u64, flags: u32, links: u16, block_area: &[u8; 60]) {
        let off = Self::inode_offset(ino);
        let raw = &mut self.image[off..off + INODE_SIZE as usize];
        raw.fill(0);
        put_u16(raw, 0x00, mode);
        put_u32(raw, 0x04, (size & 0xFFFF_FFFF) as u32);
        put_u32(raw, 0x6C, (size >> 32) as u32);
        put_u16(raw, 0x1A, links);
        put_u32(raw, 0x20, flags);
        raw[0x28..0x28 + 60].copy_from_slice(block_area);
    }

    fn write_dir_inode(&mut self, ino: u32, block: u64) {
        let root = extent_leaf_root(&[(0, 1, block)]);
        self.write_raw_inode(
            ino,
            S_IFDIR | 0o755,
            u64::from(BLOCK_SIZE),
            INODE_FL_EXTENTS,
            2,
            &root,
        );
    }

    // ── directory blocks ────────────────────────────────────────────────

    fn dir_index(&self, ino: u32) -> usize {
        self.dirs
            .iter()
            .position(|d| d.ino == ino)
            .unwrap_or_else(|| panic!("inode {ino} is not a directory in this image"))
    }

    fn rewrite_dir_block(&mut self, dir: usize) {
        let state = &self.dirs[dir];
        let block = state.block;

        let mut all: Vec<(u32, u8, Vec<u8>)> = vec![
            (state.ino, ftype::DIR, b".".to_vec()),
            (state.parent, ftype::DIR, b"..".to_vec()),
        ];
        all.extend(state.entries.iter().cloned());

        let mut buf = vec![0_u8; BLOCK_SIZE as usize];
        let mut off = 0;
        for (i, (ino, ft, name)) in all.iter().enumerate() {
            let min = (DIR_HEADER_LEN + name.len() + 3) & !3;
            let rec_len = if i + 1 == all.len() {
                BLOCK_SIZE as usize - off
            } else {
                min
            };
            put_u32(&mut buf, off, *ino);
            put_u16(&mut buf, off + 4, rec_len as u16);
            buf[off + 6] = name.len() as u8;
            buf[off + 7] = *ft;
            buf[off + DIR_HEADER_LEN..off + DIR_HEADER_LEN + name.len()].copy_from_slice(name);
            off += rec_len;
        }

        self.write_block(block, &buf);
    }

    fn add_entry(&mut self, parent: u32, ino: u32, ft: u8, name: &str) {
        let dir = self.dir_index(parent);
        self.dirs[dir].entries.push((ino, ft, name.as_bytes().to_vec()));
        self.rewrite_dir_block(dir);
    }

    // ── files ───────────────────────────────────────────────────────────

    /// Add a regular file with contiguous data blocks and a single-extent
    /// root.
    pub fn add_file(&mut self, parent: u32, name: &str, data: &[u8]) -> FileInfo {
        let blocks = (data.len() as u64).div_ceil(u64::from(BLOCK_SIZE));
        let first = if blocks > 0 { self.alloc_blocks(blocks) } else { 0 };
        self.add_file_at_blocks(parent, name, data, first, blocks)
    }

    /// Add a regular file whose data is placed at an explicit physical
    /// block, bypassing the allocator. The caller must pick blocks that do
    /// not collide with allocator output.
    pub fn add_file_at(&mut self, parent: u32, name: &str, data: &[u8], phys: u64) -> FileInfo {
        let blocks = (data.len() as u64).div_ceil(u64::from(BLOCK_SIZE));
        self.add_file_at_blocks(parent, name, data, phys, blocks)
    }

    fn add_file_at_blocks(
        &mut self,
        parent: u32,
        name: &str,
        data: &[u8],
        first: u64,
        blocks: u64,
    ) -> FileInfo {
        let ino = self.alloc_ino();

        let root = if blocks > 0 {
            extent_leaf_root(&[(0, blocks as u16, first)])
        } else {
            extent_leaf_root(&[])
        };
        self.write_raw_inode(
            ino,
            S_IFREG | 0o644,
            data.len() as u64,
            INODE_FL_EXTENTS,
            1,
            &root,
        );

        for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
            self.write_block(first + i as u64, chunk);
        }

        self.add_entry(parent, ino, ftype::REG, name);
        FileInfo {
            ino,
            first_block: first,
            block_count: blocks,
        }
    }

    /// Add a file whose first `hole_blocks` logical blocks are unmapped;
    /// `data` starts at logical block `hole_blocks`.
    pub fn add_file_with_hole(
        &mut self,
        parent: u32,
        name: &str,
        hole_blocks: u32,
        data: &[u8],
    ) -> FileInfo {
        let ino = self.alloc_ino();
        let blocks = (data.len() as u64).div_ceil(u64::from(BLOCK_SIZE));
        let first = self.alloc_blocks(blocks);
        let size = u64::from(hole_blocks) * u64::from(BLOCK_SIZE) + data.len() as u64;

        let root = extent_leaf_root(&[(hole_blocks, blocks as u16, first)]);
        self.write_raw_inode(ino, S_IFREG | 0o644, size, INODE_FL_EXTENTS, 1, &root);

        for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
            self.write_block(first + i as u64, chunk);
        }

        self.add_entry(parent, ino, ftype::REG, name);
        FileInfo {
            ino,
            first_block: first,
            block_count: blocks,
        }
    }

    /// Add a file covered by a single unwritten extent of `blocks` blocks.
    pub fn add_unwritten_file(&mut self, parent: u32, name: &str, blocks: u16) -> FileInfo {
        let ino = self.alloc_ino();
        let first = self.alloc_blocks(u64::from(blocks));
        let size = u64::from(blocks) * u64::from(BLOCK_SIZE);

        // Fill the backing blocks with garbage: reads must still be zeros.
        for i in 0..u64::from(blocks) {
            self.write_block(first + i, &[0xAB_u8; BLOCK_SIZE as usize]);
        }

        let raw_len = blocks | (1 << 15);
        let root = extent_leaf_root(&[(0, raw_len, first)]);
        self.write_raw_inode(ino, S_IFREG | 0o644, size, INODE_FL_EXTENTS, 1, &root);

        self.add_entry(parent, ino, ftype::REG, name);
        FileInfo {
            ino,
            first_block: first,
            block_count: u64::from(blocks),
        }
    }

    /// Add a file whose extent tree has one index level: the inode root
    /// holds a single index entry pointing at an external leaf block.
    pub fn add_file_deep(&mut self, parent: u32, name: &str, data: &[u8]) -> DeepFileInfo {
        let ino = self.alloc_ino();
        let leaf_node_block = self.alloc_block();
        let blocks = (data.len() as u64).div_ceil(u64::from(BLOCK_SIZE));
        let first = self.alloc_blocks(blocks);

        // External leaf node occupying a whole block.
        let mut leaf = vec![0_u8; BLOCK_SIZE as usize];
        let max_entries = ((BLOCK_SIZE as usize - EXTENT_HEADER_SIZE) / EXTENT_ENTRY_SIZE) as u16;
        put_u16(&mut leaf, 0x00, EXTENT_MAGIC);
        put_u16(&mut leaf, 0x02, 1);
        put_u16(&mut leaf, 0x04, max_entries);
        put_u16(&mut leaf, 0x06, 0); // depth 0
        write_leaf_entry(&mut leaf, EXTENT_HEADER_SIZE, 0, blocks as u16, first);
        self.write_block(leaf_node_block, &leaf);

        let root = extent_index_root(&[(0, leaf_node_block)], 1);
        self.write_raw_inode(
            ino,
            S_IFREG | 0o644,
            data.len() as u64,
            INODE_FL_EXTENTS,
            1,
            &root,
        );

        for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
            self.write_block(first + i as u64, chunk);
        }

        self.add_entry(parent, ino, ftype::REG, name);
        DeepFileInfo {
            ino,
            leaf_node_block,
            first_block: first,
        }
    }

    /// Add a subdirectory with its own data block, `.` and `..` included.
    pub fn add_dir(&mut self, parent: u32, name: &str) -> u32 {
        let ino = self.alloc_ino();
        let block = self.alloc_block();
        self.write_dir_inode(ino, block);
        self.dirs.push(DirState {
            ino,
            parent,
            block,
            entries: Vec::new(),
        });
        self.rewrite_dir_block(self.dirs.len() - 1);
        self.add_entry(parent, ino, ftype::DIR, name);
        ino
    }

    /// Add a fast symlink: target stored inline in the inode block area.
    pub fn add_fast_symlink(&mut self, parent: u32, name: &str, target: &str) -> u32 {
        assert!(target.len() <= 60, "fast symlink target too long");
        let ino = self.alloc_ino();

        let mut area = [0_u8; 60];
        area[..target.len()].copy_from_slice(target.as_bytes());
        self.write_raw_inode(ino, S_IFLNK | 0o777, target.len() as u64, 0, 1, &area);

        self.add_entry(parent, ino, ftype::SYMLINK, name);
        ino
    }

    /// Add a slow symlink: target stored in a data block behind an extent.
    pub fn add_slow_symlink(&mut self, parent: u32, name: &str, target: &str) -> u32 {
        let ino = self.alloc_ino();
        let block = self.alloc_block();

        let root = extent_leaf_root(&[(0, 1, block)]);
        self.write_raw_inode(
            ino,
            S_IFLNK | 0o777,
            target.len() as u64,
            INODE_FL_EXTENTS,
            1,
            &root,
        );
        self.write_block(block, target.as_bytes());

        self.add_entry(parent, ino, ftype::SYMLINK, name);
        ino
    }

    /// Byte offset of an inode record, for targeted corruption in tests.
    #[must_use]
    pub fn inode_byte_offset(ino: u32) -> usize {
        Self::inode_offset(ino)
    }

    /// Finalize and return the image bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.image
    }
}

/// Build a 60-byte inode extent root holding up to 4 leaf extents.
fn extent_leaf_root(extents: &[(u32, u16, u64)]) -> [u8; 60] {
    assert!(extents.len() <= 4, "inode root holds at most 4 extents");
    let mut root = [0_u8; 60];
    put_u16(&mut root, 0x00, EXTENT_MAGIC);
    put_u16(&mut root, 0x02, extents.len() as u16);
    put_u16(&mut root, 0x04, 4);
    put_u16(&mut root, 0x06, 0);
    for (i, &(logical, raw_len, phys)) in extents.iter().enumerate() {
        write_leaf_entry(
            &mut root,
            EXTENT_HEADER_SIZE + i * EXTENT_ENTRY_SIZE,
            logical,
            raw_len,
            phys,
        );
    }
    root
}

/// Build a 60-byte inode extent root holding index entries at `depth`.
fn extent_index_root(indexes: &[(u32, u64)], depth: u16) -> [u8; 60] {
    assert!(indexes.len() <= 4, "inode root holds at most 4 indexes");
    let mut root = [0_u8; 60];
    put_u16(&mut root, 0x00, EXTENT_MAGIC);
    put_u16(&mut root, 0x02, indexes.len() as u16);
    put_u16(&mut root, 0x04, 4);
    put_u16(&mut root, 0x06, depth);
    for (i, &(logical, child)) in indexes.iter().enumerate() {
        let base = EXTENT_HEADER_SIZE + i * EXTENT_ENTRY_SIZE;
        put_u32(&mut root, base, logical);
        put_u32(&mut root, base + 4, (child & 0xFFFF_FFFF) as u32);
        put_u16(&mut root, base + 8, (child >> 32) as u16);
    }
    root
}

fn write_leaf_entry(buf: &mut [u8], base: usize, logical: u32, raw_len: u16, phys: u64) {
    put_u32(buf, base, logical);
    put_u16(buf, base + 4, raw_len);
    put_u16(buf, base + 6, (phys >> 32) as u16);
    put_u32(buf, base + 8, (phys & 0xFFFF_FFFF) as u32);
}
