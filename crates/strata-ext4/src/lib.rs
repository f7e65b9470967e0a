#![forbid(unsafe_code)]
//! Read-only ext4 driver.
//!
//! [`Ext4Fs`] is the mounted filesystem: the parsed superblock, derived
//! geometry, and the group-descriptor table, over an [`ByteDevice`]. On
//! top of it sit the inode reader, the extent-tree resolver, the file-data
//! assembler, and the directory decoder, and [`Ext4Fs::node`] bridges an
//! inode into a [`VfsNode`] for the VFS layer.
//!
//! Everything is a pure read: no caches, no write-back. `write` on a node
//! reports zero bytes written.

use std::sync::Arc;
use strata_block::ByteDevice;
use strata_error::{FsError, Result};
use strata_ondisk::{
    DirCursor, DirEntry, DirFileType, ExtentNode, GroupDesc, Inode, Superblock, parse_extent_node,
};
use strata_types::{
    BlockNo, InodeNo, ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFSOCK,
    SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE, inode_index_in_group, inode_to_group,
};
use strata_vfs::{NAME_MAX, NodeKind, NodeOps, NodeStat, OpenFlags, VfsDirEntry, VfsNode};
use tracing::{debug, info, trace};

/// Upper bound on extent-tree depth; deeper trees are corrupt.
const MAX_EXTENT_DEPTH: u16 = 5;

/// An inode copied out of the inode table, together with its number.
///
/// Lives inside the node operation object for as long as the node is
/// referenced; the driver itself keeps no per-inode state.
#[derive(Debug, Clone)]
pub struct InodeHandle {
    pub ino: InodeNo,
    pub raw: Inode,
}

/// A mounted read-only ext4 filesystem.
pub struct Ext4Fs {
    dev: Arc<dyn ByteDevice>,
    sb: Superblock,
    block_size: u32,
    block_count: u64,
    group_count: u32,
    inodes_per_group: u32,
    blocks_per_group: u32,
    group_descs: Vec<GroupDesc>,
}

impl std::fmt::Debug for Ext4Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ext4Fs")
            .field("block_size", &self.block_size)
            .field("block_count", &self.block_count)
            .field("group_count", &self.group_count)
            .finish_non_exhaustive()
    }
}

fn mount_parse_error(e: &ParseError) -> FsError {
    FsError::InvalidSuperblock(e.to_string())
}

impl Ext4Fs {
    /// Mount the filesystem on `dev`.
    ///
    /// Reads and validates the superblock, derives the geometry, and loads
    /// the whole group-descriptor table. Any failure drops every resource
    /// acquired so far.
    pub fn mount(dev: Arc<dyn ByteDevice>) -> Result<Arc<Self>> {
        let mut region = vec![0_u8; SUPERBLOCK_SIZE];
        dev.read_exact_at(SUPERBLOCK_OFFSET, &mut region)?;

        let sb = Superblock::parse(&region).map_err(|e| mount_parse_error(&e))?;
        sb.validate_geometry().map_err(|e| mount_parse_error(&e))?;

        let block_size = sb.block_size.get();
        let block_count = sb.blocks_count;
        let group_count = sb.groups_count();
        let desc_size = sb.group_desc_size();

        // Descriptor table: group_count * desc_size bytes, rounded up to
        // whole blocks, starting right after the superblock's block.
        let table_bytes = u64::from(group_count) * u64::from(desc_size);
        let table_blocks = table_bytes.div_ceil(u64::from(block_size));
        let gdt_start = u64::from(sb.first_data_block) + 1;

        let table_len = table_blocks
            .checked_mul(u64::from(block_size))
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| FsError::InvalidSuperblock("descriptor table too large".to_owned()))?;
        let mut table = vec![0_u8; table_len];
        for (i, chunk) in table.chunks_mut(block_size as usize).enumerate() {
            let offset = (gdt_start + i as u64)
                .checked_mul(u64::from(block_size))
                .ok_or_else(|| {
                    FsError::InvalidSuperblock("descriptor table offset overflow".to_owned())
                })?;
            dev.read_exact_at(offset, chunk)?;
        }

        let mut group_descs = Vec::with_capacity(group_count as usize);
        for g in 0..group_count {
            let start = g as usize * usize::from(desc_size);
            let desc = GroupDesc::parse(&table[start..], desc_size)
                .map_err(|e| mount_parse_error(&e))?;
            group_descs.push(desc);
        }

        info!(
            volume = %sb.volume_name,
            block_size,
            block_count,
            group_count,
            inodes_per_group = sb.inodes_per_group,
            "ext4: mounted filesystem"
        );

        Ok(Arc::new(Self {
            dev,
            block_size,
            block_count,
            group_count,
            inodes_per_group: sb.inodes_per_group,
            blocks_per_group: sb.blocks_per_group,
            group_descs,
            sb,
        }))
    }

    /// The parsed superblock.
    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[must_use]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    #[must_use]
    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    #[must_use]
    pub fn blocks_per_group(&self) -> u32 {
        self.blocks_per_group
    }

    /// Read one whole filesystem block into `buf`.
    fn read_block_into(&self, block: BlockNo, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.block_size as usize);
        let offset = block
            .0
            .checked_mul(u64::from(self.block_size))
            .ok_or_else(|| FsError::InvalidArgument("block offset overflow".to_owned()))?;
        self.dev.read_exact_at(offset, buf)
    }

    // ── Inode reader ────────────────────────────────────────────────────

    /// Read an inode record by number.
    ///
    /// Validation happens before any device access: inode 0 is
    /// `InvalidInode`, a derived group outside the descriptor table is
    /// `InvalidGroupIndex`.
    pub fn read_inode(&self, ino: InodeNo) -> Result<Inode> {
        if ino.0 == 0 {
            return Err(FsError::InvalidInode { ino: ino.0 });
        }

        let group = inode_to_group(ino, self.inodes_per_group);
        let Some(desc) = self.group_descs.get(group.0 as usize) else {
            return Err(FsError::InvalidGroupIndex {
                group: group.0,
                groups: self.group_count,
            });
        };

        let index = inode_index_in_group(ino, self.inodes_per_group);
        let inode_size = u64::from(self.sb.inode_size);
        let byte_in_table = u64::from(index) * inode_size;
        let block = desc.inode_table + byte_in_table / u64::from(self.block_size);
        let offset_in_block = (byte_in_table % u64::from(self.block_size)) as usize;

        let mut buf = vec![0_u8; self.block_size as usize];
        self.read_block_into(BlockNo(block), &mut buf)?;

        Inode::parse(&buf[offset_in_block..offset_in_block + inode_size as usize])
            .map_err(|_| FsError::InvalidInode { ino: ino.0 })
    }

    /// Read an inode and wrap it with its number.
    pub fn inode(&self, ino: InodeNo) -> Result<InodeHandle> {
        Ok(InodeHandle {
            ino,
            raw: self.read_inode(ino)?,
        })
    }

    // ── Extent-tree resolver ────────────────────────────────────────────

    /// Translate a logical file block to a physical block through the
    /// inode's extent tree.
    ///
    /// A logical block in a sparse hole (no covering extent, or an extent
    /// still unwritten) is `BlockNotMapped`; a node failing its magic,
    /// ordering, or depth checks is `CorruptExtentNode`.
    pub fn resolve_block(&self, handle: &InodeHandle, logical: u32) -> Result<u64> {
        if !self.sb.has_extents() || !handle.raw.uses_extents() {
            return Err(FsError::UnsupportedAddressing {
                ino: handle.ino.0,
            });
        }

        let (header, root) = parse_extent_node(&handle.raw.block_area).map_err(|e| {
            FsError::CorruptExtentNode {
                block: 0,
                detail: format!("inode {} extent root: {e}", handle.ino),
            }
        })?;
        if header.depth > MAX_EXTENT_DEPTH {
            return Err(FsError::CorruptExtentNode {
                block: 0,
                detail: format!("inode {} extent root depth {}", handle.ino, header.depth),
            });
        }

        let mut depth = header.depth;
        let mut node = root;
        let mut current_block = 0_u64;
        // One scratch buffer serves every level of the descent.
        let mut scratch = vec![0_u8; self.block_size as usize];

        loop {
            match node {
                ExtentNode::Leaf(extents) => {
                    check_ascending_extents(&extents, current_block)?;
                    trace!(
                        ino = handle.ino.0,
                        logical,
                        entries = extents.len(),
                        "ext4: scanning extent leaf"
                    );
                    for ext in &extents {
                        let len = u32::from(ext.actual_len());
                        let start = ext.logical_block;
                        if logical >= start && logical < start.saturating_add(len) {
                            if ext.is_unwritten() {
                                return Err(FsError::BlockNotMapped { logical });
                            }
                            return Ok(ext.physical_start + u64::from(logical - start));
                        }
                    }
                    return Err(FsError::BlockNotMapped { logical });
                }
                ExtentNode::Index(indexes) => {
                    check_ascending_indexes(&indexes, current_block)?;
                    // Predecessor search: last index whose first covered
                    // logical block is <= the target.
                    let pos = indexes.partition_point(|idx| idx.logical_block <= logical);
                    if pos == 0 {
                        return Err(FsError::BlockNotMapped { logical });
                    }
                    let child = indexes[pos - 1].child_block;
                    trace!(
                        ino = handle.ino.0,
                        logical,
                        child,
                        depth,
                        "ext4: descending extent index"
                    );

                    self.read_block_into(BlockNo(child), &mut scratch)?;
                    let (child_header, child_node) =
                        parse_extent_node(&scratch).map_err(|e| FsError::CorruptExtentNode {
                            block: child,
                            detail: e.to_string(),
                        })?;
                    if child_header.depth + 1 != depth {
                        return Err(FsError::CorruptExtentNode {
                            block: child,
                            detail: format!(
                                "depth mismatch: parent {depth}, child {}",
                                child_header.depth
                            ),
                        });
                    }

                    depth -= 1;
                    current_block = child;
                    node = child_node;
                }
            }
        }
    }

    // ── File-data assembler ─────────────────────────────────────────────

    /// Read one logical file block into `buf` (`buf.len()` must equal the
    /// block size).
    ///
    /// Blocks past the file's block count and blocks in sparse holes are
    /// zero-filled rather than failing; real errors propagate.
    pub fn read_file_block(&self, handle: &InodeHandle, logical: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size as usize {
            return Err(FsError::InvalidArgument(format!(
                "block buffer size mismatch: got={} expected={}",
                buf.len(),
                self.block_size
            )));
        }

        let max_block = handle.raw.size.div_ceil(u64::from(self.block_size));
        if u64::from(logical) >= max_block {
            buf.fill(0);
            return Ok(());
        }

        match self.resolve_block(handle, logical) {
            Ok(phys) => self.read_block_into(BlockNo(phys), buf),
            Err(FsError::BlockNotMapped { .. }) => {
                buf.fill(0);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Read file bytes at `offset` into `buf`, clamped to the file size.
    ///
    /// Returns the number of bytes read: 0 at or past end-of-file, short
    /// counts at the tail. On error the destination contents are
    /// unspecified.
    pub fn read_range(&self, handle: &InodeHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = handle.raw.size;
        if offset >= size {
            return Ok(0);
        }

        let available = size - offset;
        let to_read = usize::try_from(available.min(buf.len() as u64)).unwrap_or(buf.len());

        let bs = u64::from(self.block_size);
        let bs_usize = self.block_size as usize;
        let mut scratch = vec![0_u8; bs_usize];
        let mut done = 0_usize;

        while done < to_read {
            let current = offset + done as u64;
            let logical = u32::try_from(current / bs).map_err(|_| FsError::InvalidArgument(
                "file offset exceeds addressable blocks".to_owned(),
            ))?;
            let in_block = (current % bs) as usize;
            let chunk = (bs_usize - in_block).min(to_read - done);

            self.read_file_block(handle, logical, &mut scratch)?;
            buf[done..done + chunk].copy_from_slice(&scratch[in_block..in_block + chunk]);
            done += chunk;
        }

        Ok(done)
    }

    // ── Directory decoder ───────────────────────────────────────────────

    fn for_each_dir_entry<T>(
        &self,
        handle: &InodeHandle,
        mut visit: impl FnMut(&strata_ondisk::DirEntryRef<'_>) -> Option<T>,
    ) -> Result<Option<T>> {
        if !handle.raw.is_dir() {
            return Err(FsError::NotDirectory);
        }

        let blocks = handle.raw.size.div_ceil(u64::from(self.block_size));
        let mut block_buf = vec![0_u8; self.block_size as usize];

        for lb in 0..blocks {
            let logical = u32::try_from(lb).map_err(|_| FsError::CorruptDirectory {
                block: lb,
                detail: "directory block count overflow".to_owned(),
            })?;
            self.read_file_block(handle, logical, &mut block_buf)?;

            for entry in DirCursor::new(&block_buf) {
                let entry = entry.map_err(|e| FsError::CorruptDirectory {
                    block: lb,
                    detail: e.to_string(),
                })?;
                if let Some(found) = visit(&entry) {
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }

    /// Find a directory entry by exact name.
    ///
    /// Scans every data block in order and stops at the first match.
    pub fn find_entry(&self, handle: &InodeHandle, name: &[u8]) -> Result<Option<DirEntry>> {
        self.for_each_dir_entry(handle, |entry| {
            (entry.name == name).then(|| entry.to_owned())
        })
    }

    /// Return the directory entry at ordinal `index`, counting only live
    /// entries across the whole directory.
    pub fn entry_at_index(&self, handle: &InodeHandle, index: u32) -> Result<Option<DirEntry>> {
        let mut seen = 0_u32;
        self.for_each_dir_entry(handle, |entry| {
            if seen == index {
                Some(entry.to_owned())
            } else {
                seen += 1;
                None
            }
        })
    }

    // ── Symlinks ────────────────────────────────────────────────────────

    /// Read a symlink target: inline from the inode for fast symlinks,
    /// through data blocks otherwise.
    pub fn read_symlink(&self, handle: &InodeHandle) -> Result<Vec<u8>> {
        if !handle.raw.is_symlink() {
            return Err(FsError::InvalidArgument(format!(
                "inode {} is not a symlink",
                handle.ino
            )));
        }

        if let Some(target) = handle.raw.fast_symlink_target() {
            return Ok(target.to_vec());
        }

        let len = usize::try_from(handle.raw.size).map_err(|_| FsError::InvalidArgument(
            "symlink target size overflow".to_owned(),
        ))?;
        let mut buf = vec![0_u8; len];
        let n = self.read_range(handle, 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    // ── VFS node bridge ─────────────────────────────────────────────────

    /// Instantiate the VFS node for the root directory (inode 2).
    pub fn root_node(fs: &Arc<Self>) -> Result<VfsNode> {
        Self::node_named(fs, InodeNo::ROOT, "/")
    }

    /// Instantiate a VFS node for an arbitrary inode.
    pub fn node(fs: &Arc<Self>, ino: InodeNo) -> Result<VfsNode> {
        Self::node_named(fs, ino, "")
    }

    fn node_named(fs: &Arc<Self>, ino: InodeNo, name: &str) -> Result<VfsNode> {
        let handle = fs.inode(ino)?;
        let kind = classify_mode(&handle.raw);
        debug!(ino = ino.0, ?kind, size = handle.raw.size, "ext4: instantiating node");

        Ok(VfsNode {
            name: truncate_name(name),
            kind,
            perm: handle.raw.permission_bits(),
            uid: handle.raw.uid,
            gid: handle.raw.gid,
            size: handle.raw.size,
            ino: u64::from(ino.0),
            links: u32::from(handle.raw.links_count),
            atime: handle.raw.atime,
            mtime: handle.raw.mtime,
            ctime: handle.raw.ctime,
            ops: Arc::new(Ext4NodeOps {
                fs: Arc::clone(fs),
                handle,
            }),
        })
    }
}

impl Drop for Ext4Fs {
    fn drop(&mut self) {
        info!(volume = %self.sb.volume_name, "ext4: filesystem released");
    }
}

/// Classify inode mode bits into a node kind.
///
/// Unrecognized mode bits fall back to a regular file; exotic images stay
/// mountable.
fn classify_mode(inode: &Inode) -> NodeKind {
    match inode.file_type_mode() {
        S_IFDIR => NodeKind::Directory,
        S_IFLNK => NodeKind::Symlink,
        S_IFCHR => NodeKind::CharDevice,
        S_IFBLK => NodeKind::BlockDevice,
        S_IFIFO => NodeKind::Pipe,
        S_IFSOCK => NodeKind::Socket,
        // S_IFREG and anything unrecognized.
        _ => NodeKind::File,
    }
}

fn dir_type_to_kind(ft: DirFileType) -> NodeKind {
    match ft {
        DirFileType::Dir => NodeKind::Directory,
        DirFileType::Symlink => NodeKind::Symlink,
        DirFileType::Chrdev => NodeKind::CharDevice,
        DirFileType::Blkdev => NodeKind::BlockDevice,
        DirFileType::Fifo => NodeKind::Pipe,
        DirFileType::Sock => NodeKind::Socket,
        DirFileType::RegFile | DirFileType::Unknown => NodeKind::File,
    }
}

/// Clamp a name to the VFS limit; never overflows, never errors.
fn truncate_name(name: &str) -> String {
    if name.len() <= NAME_MAX {
        return name.to_owned();
    }
    let mut end = NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

fn check_ascending_extents(
    extents: &[strata_ondisk::Extent],
    block: u64,
) -> Result<()> {
    for pair in extents.windows(2) {
        if pair[1].logical_block <= pair[0].logical_block {
            return Err(FsError::CorruptExtentNode {
                block,
                detail: "leaf extents not strictly ascending".to_owned(),
            });
        }
    }
    Ok(())
}

fn check_ascending_indexes(
    indexes: &[strata_ondisk::ExtentIndex],
    block: u64,
) -> Result<()> {
    for pair in indexes.windows(2) {
        if pair[1].logical_block <= pair[0].logical_block {
            return Err(FsError::CorruptExtentNode {
                block,
                detail: "index entries not strictly ascending".to_owned(),
            });
        }
    }
    Ok(())
}

/// Node operations binding one inode to the VFS contract.
struct Ext4NodeOps {
    fs: Arc<Ext4Fs>,
    handle: InodeHandle,
}

impl NodeOps for Ext4NodeOps {
    fn open(&self, _flags: OpenFlags) -> Result<()> {
        // Stateless at this layer.
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.handle.raw.is_dir() {
            return Err(FsError::IsDirectory);
        }
        self.fs.read_range(&self.handle, offset, buf)
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<usize> {
        // Read-only filesystem: accept the call, write nothing.
        Ok(0)
    }

    fn readdir(&self, index: u32) -> Result<Option<VfsDirEntry>> {
        let Some(entry) = self.fs.entry_at_index(&self.handle, index)? else {
            return Ok(None);
        };
        Ok(Some(VfsDirEntry {
            name: truncate_name(&entry.name_str()),
            ino: u64::from(entry.ino),
            kind: dir_type_to_kind(entry.file_type),
        }))
    }

    fn finddir(&self, name: &str) -> Result<Option<VfsNode>> {
        let Some(entry) = self.fs.find_entry(&self.handle, name.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(Ext4Fs::node_named(&self.fs, InodeNo(entry.ino), name)?))
    }

    fn stat(&self) -> Result<NodeStat> {
        let raw = &self.handle.raw;
        Ok(NodeStat {
            dev: 0,
            ino: u64::from(self.handle.ino.0),
            mode: raw.mode,
            nlink: u32::from(raw.links_count),
            uid: raw.uid,
            gid: raw.gid,
            rdev: 0,
            size: raw.size,
            blksize: self.fs.block_size(),
            blocks: raw.blocks,
            atime: raw.atime,
            mtime: raw.mtime,
            ctime: raw.ctime,
        })
    }

    fn readlink(&self) -> Result<Vec<u8>> {
        self.fs.read_symlink(&self.handle)
    }
}
