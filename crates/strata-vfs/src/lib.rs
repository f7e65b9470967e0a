#![forbid(unsafe_code)]
//! Virtual filesystem layer.
//!
//! Presents every backing filesystem behind one node abstraction: a
//! [`VfsNode`] carries identity and attributes plus an [`NodeOps`] object
//! implementing the fixed operation set. Path resolution walks nodes
//! component by component through `finddir`, substituting mounted
//! filesystem roots at mount points.
//!
//! Process-wide state is confined to the [`Vfs`] registry: a bounded mount
//! table and a bounded file-descriptor table, each behind its own coarse
//! lock. The registry is created once and dropped at shutdown; handles
//! into it are small integers.

use parking_lot::Mutex;
use std::io::SeekFrom;
use std::sync::Arc;
use strata_error::{FsError, Result};
use tracing::{debug, info};

/// Maximum number of simultaneously open file descriptors.
pub const MAX_OPEN_FILES: usize = 256;
/// Maximum number of simultaneous mounts.
pub const MAX_MOUNTS: usize = 32;
/// Maximum accepted path length.
pub const MAX_PATH_LEN: usize = 512;
/// Maximum length of a single path component.
pub const NAME_MAX: usize = 255;

bitflags::bitflags! {
    /// Open-mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY    = 0x0001;
        const RDWR      = 0x0002;
        const APPEND    = 0x0008;
        const CREAT     = 0x0100;
        const TRUNC     = 0x0200;
        const EXCL      = 0x0400;
        const NOFOLLOW  = 0x0800;
        const DIRECTORY = 0x1000;
    }
}

impl OpenFlags {
    /// Read-only open: no mode bits set.
    pub const RDONLY: Self = Self::empty();

    /// Whether the descriptor permits writing.
    #[must_use]
    pub fn is_writable(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// Node type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Pipe,
    Socket,
}

/// A directory entry as surfaced by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsDirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: NodeKind,
}

/// Attributes reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStat {
    pub dev: u32,
    pub ino: u64,
    pub mode: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

/// A filesystem node: attributes plus the operation object that binds the
/// backing filesystem.
#[derive(Clone)]
pub struct VfsNode {
    pub name: String,
    pub kind: NodeKind,
    pub perm: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub ino: u64,
    pub links: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub ops: Arc<dyn NodeOps>,
}

impl std::fmt::Debug for VfsNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ino", &self.ino)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn unsupported<T>(op: &'static str) -> Result<T> {
    Err(FsError::Unsupported { op })
}

/// The fixed operation set a filesystem binds to its nodes.
///
/// `read` and `stat` are mandatory; everything else defaults to the
/// uniform "operation absent" failure so a missing operation is an error
/// for the caller, never a panic.
pub trait NodeOps: Send + Sync {
    /// Called when a descriptor is opened on the node.
    fn open(&self, _flags: OpenFlags) -> Result<()> {
        Ok(())
    }

    /// Called when the last descriptor on the node is closed.
    fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Read up to `buf.len()` bytes at `offset`; returns bytes read.
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` at `offset`; returns bytes written.
    fn write(&self, _offset: u64, _buf: &[u8]) -> Result<usize> {
        unsupported("write")
    }

    /// Return the directory entry at ordinal `index`, or `None` past the end.
    fn readdir(&self, _index: u32) -> Result<Option<VfsDirEntry>> {
        unsupported("readdir")
    }

    /// Look up `name` in this directory.
    fn finddir(&self, _name: &str) -> Result<Option<VfsNode>> {
        unsupported("finddir")
    }

    /// Full attribute record.
    fn stat(&self) -> Result<NodeStat>;

    /// Target bytes of a symbolic link.
    fn readlink(&self) -> Result<Vec<u8>> {
        unsupported("readlink")
    }

    fn create(&self, _name: &str, _mode: u16) -> Result<()> {
        unsupported("create")
    }

    fn unlink(&self, _name: &str) -> Result<()> {
        unsupported("unlink")
    }

    fn mkdir(&self, _name: &str, _mode: u16) -> Result<()> {
        unsupported("mkdir")
    }

    fn rmdir(&self, _name: &str) -> Result<()> {
        unsupported("rmdir")
    }

    fn rename(&self, _old_name: &str, _new_name: &str) -> Result<()> {
        unsupported("rename")
    }

    fn link(&self, _target_path: &str, _name: &str) -> Result<()> {
        unsupported("link")
    }

    fn symlink(&self, _target: &str, _name: &str) -> Result<()> {
        unsupported("symlink")
    }

    fn chmod(&self, _mode: u16) -> Result<()> {
        unsupported("chmod")
    }

    fn chown(&self, _uid: u32, _gid: u32) -> Result<()> {
        unsupported("chown")
    }

    fn truncate(&self, _size: u64) -> Result<()> {
        unsupported("truncate")
    }
}

// ── Path normalization ──────────────────────────────────────────────────────

/// Normalize a path: collapse `.`, resolve `..` without ascending above
/// the root, drop duplicate separators.
///
/// Pure string processing, no filesystem access, idempotent. Rejects
/// over-length paths and over-length components.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.len() >= MAX_PATH_LEN {
        return Err(FsError::NameTooLong);
    }

    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                // Never ascend above the root; excess `..` in a relative
                // path is dropped the same way.
                parts.pop();
            }
            name => {
                if name.len() > NAME_MAX {
                    return Err(FsError::NameTooLong);
                }
                parts.push(name);
            }
        }
    }

    if parts.is_empty() {
        return Ok(if absolute { "/" } else { "." }.to_owned());
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));
    Ok(out)
}

/// Split a normalized path into `(parent, basename)`.
///
/// `/a/b` -> `("/a", "b")`, `/a` -> `("/", "a")`, `a` -> `(".", "a")`.
#[must_use]
pub fn split_path(normalized: &str) -> (&str, &str) {
    match normalized.rfind('/') {
        None => (".", normalized),
        Some(0) => ("/", &normalized[1..]),
        Some(pos) => (&normalized[..pos], &normalized[pos + 1..]),
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// A file-descriptor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(pub usize);

struct MountEntry {
    path: String,
    node: VfsNode,
}

struct FileHandle {
    node: VfsNode,
    flags: OpenFlags,
    position: u64,
}

/// The process-wide VFS registry: root node, mount table, descriptor table.
pub struct Vfs {
    root: Mutex<Option<VfsNode>>,
    mounts: Mutex<Vec<Option<MountEntry>>>,
    fds: Mutex<Vec<Option<FileHandle>>>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Create an empty registry. Nothing is mounted; every lookup fails
    /// until a root filesystem is attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Mutex::new(None),
            mounts: Mutex::new((0..MAX_MOUNTS).map(|_| None).collect()),
            fds: Mutex::new((0..MAX_OPEN_FILES).map(|_| None).collect()),
        }
    }

    fn mount_override(&self, walked: &str) -> Option<VfsNode> {
        let mounts = self.mounts.lock();
        mounts
            .iter()
            .flatten()
            .find(|entry| entry.path == walked)
            .map(|entry| entry.node.clone())
    }

    /// Resolve a path to a node.
    ///
    /// Walks from the root through each component's `finddir`; a mounted
    /// path transparently yields the mounted filesystem's root instead of
    /// the underlying node.
    pub fn lookup(&self, path: &str) -> Result<VfsNode> {
        let norm = normalize_path(path)?;
        let root = self
            .root
            .lock()
            .clone()
            .ok_or_else(|| FsError::NotFound(norm.clone()))?;

        if norm == "/" {
            return Ok(root);
        }

        let mut node = root;
        let mut walked = String::with_capacity(norm.len());
        for comp in norm.trim_start_matches('/').split('/') {
            if node.kind != NodeKind::Directory {
                return Err(FsError::NotDirectory);
            }
            let next = node
                .ops
                .finddir(comp)?
                .ok_or_else(|| FsError::NotFound(comp.to_owned()))?;

            walked.push('/');
            walked.push_str(comp);
            node = self.mount_override(&walked).unwrap_or(next);
        }

        Ok(node)
    }

    /// Mount a filesystem's root node at `path`.
    ///
    /// Mounting at `/` installs (or replaces) the global root. Anywhere
    /// else requires an existing root and a directory at the target.
    pub fn mount(&self, path: &str, node: VfsNode) -> Result<()> {
        let norm = normalize_path(path)?;

        if norm == "/" {
            *self.root.lock() = Some(node);
            info!(path = %norm, "vfs: mounted root filesystem");
            return Ok(());
        }

        if self.root.lock().is_none() {
            return Err(FsError::InvalidArgument(
                "root filesystem must be mounted first".to_owned(),
            ));
        }

        let target = self.lookup(&norm)?;
        if target.kind != NodeKind::Directory {
            return Err(FsError::NotDirectory);
        }

        let mut mounts = self.mounts.lock();
        if mounts.iter().flatten().any(|entry| entry.path == norm) {
            return Err(FsError::InvalidArgument(format!(
                "{norm} is already a mount point"
            )));
        }
        let slot = mounts
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(FsError::OutOfResources("mount table full"))?;
        *slot = Some(MountEntry { path: norm.clone(), node });

        info!(path = %norm, "vfs: mounted filesystem");
        Ok(())
    }

    /// Remove the mount at `path`. The root filesystem cannot be unmounted.
    pub fn unmount(&self, path: &str) -> Result<()> {
        let norm = normalize_path(path)?;
        if norm == "/" {
            return Err(FsError::InvalidArgument(
                "cannot unmount the root filesystem".to_owned(),
            ));
        }

        let mut mounts = self.mounts.lock();
        let slot = mounts
            .iter_mut()
            .find(|slot| {
                slot.as_ref()
                    .is_some_and(|entry| entry.path == norm)
            })
            .ok_or_else(|| FsError::NotFound(norm.clone()))?;
        *slot = None;
        drop(mounts);

        info!(path = %norm, "vfs: unmounted filesystem");
        Ok(())
    }

    // ── Descriptor operations ───────────────────────────────────────────

    /// Open `path` and allocate a descriptor.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<Fd> {
        let node = self.lookup(path)?;
        node.ops.open(flags)?;

        let mut fds = self.fds.lock();
        let Some(index) = fds.iter().position(|slot| slot.is_none()) else {
            // Undo the open before reporting exhaustion.
            drop(fds);
            node.ops.close()?;
            return Err(FsError::OutOfResources("file descriptor table full"));
        };
        fds[index] = Some(FileHandle {
            node,
            flags,
            position: 0,
        });
        debug!(fd = index, path, "vfs: opened descriptor");
        Ok(Fd(index))
    }

    /// Close a descriptor.
    pub fn close(&self, fd: Fd) -> Result<()> {
        let mut fds = self.fds.lock();
        let slot = fds
            .get_mut(fd.0)
            .ok_or_else(|| bad_fd(fd))?;
        let handle = slot.as_ref().ok_or_else(|| bad_fd(fd))?;
        handle.node.ops.close()?;
        *slot = None;
        Ok(())
    }

    /// Read from the descriptor's cursor, advancing it by the bytes read.
    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let mut fds = self.fds.lock();
        let handle = fds
            .get_mut(fd.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| bad_fd(fd))?;
        let n = handle.node.ops.read(handle.position, buf)?;
        handle.position += n as u64;
        Ok(n)
    }

    /// Write at the descriptor's cursor, advancing it by the bytes written.
    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let mut fds = self.fds.lock();
        let handle = fds
            .get_mut(fd.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| bad_fd(fd))?;
        let n = handle.node.ops.write(handle.position, buf)?;
        handle.position += n as u64;
        Ok(n)
    }

    /// Reposition the descriptor's cursor.
    ///
    /// Read-only descriptors may not seek past end-of-file.
    pub fn seek(&self, fd: Fd, pos: SeekFrom) -> Result<u64> {
        let mut fds = self.fds.lock();
        let handle = fds
            .get_mut(fd.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| bad_fd(fd))?;

        let new_position = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => handle
                .position
                .checked_add_signed(delta)
                .ok_or_else(|| FsError::InvalidArgument("seek out of range".to_owned()))?,
            SeekFrom::End(delta) => handle
                .node
                .size
                .checked_add_signed(delta)
                .ok_or_else(|| FsError::InvalidArgument("seek out of range".to_owned()))?,
        };

        if new_position > handle.node.size && !handle.flags.is_writable() {
            return Err(FsError::InvalidArgument(
                "cannot seek past end of file on a read-only descriptor".to_owned(),
            ));
        }

        handle.position = new_position;
        Ok(new_position)
    }

    /// Attributes of the node at `path`.
    pub fn stat(&self, path: &str) -> Result<NodeStat> {
        self.lookup(path)?.ops.stat()
    }

    /// Attributes of the node behind a descriptor.
    pub fn fstat(&self, fd: Fd) -> Result<NodeStat> {
        let fds = self.fds.lock();
        let handle = fds
            .get(fd.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| bad_fd(fd))?;
        handle.node.ops.stat()
    }

    /// Read the directory entry at ordinal `index` under `path`.
    pub fn readdir(&self, path: &str, index: u32) -> Result<Option<VfsDirEntry>> {
        let node = self.lookup(path)?;
        if node.kind != NodeKind::Directory {
            return Err(FsError::NotDirectory);
        }
        node.ops.readdir(index)
    }

    fn parent_of(&self, path: &str) -> Result<(VfsNode, String)> {
        let norm = normalize_path(path)?;
        let (parent_path, base) = split_path(&norm);
        if base.is_empty() {
            return Err(FsError::InvalidArgument(format!(
                "path has no final component: {norm}"
            )));
        }
        let parent = self.lookup(parent_path)?;
        if parent.kind != NodeKind::Directory {
            return Err(FsError::NotDirectory);
        }
        Ok((parent, base.to_owned()))
    }

    /// Create a regular file under the parent of `path`.
    pub fn create(&self, path: &str, mode: u16) -> Result<()> {
        let (parent, base) = self.parent_of(path)?;
        parent.ops.create(&base, mode)
    }

    /// Create a directory under the parent of `path`.
    pub fn mkdir(&self, path: &str, mode: u16) -> Result<()> {
        let (parent, base) = self.parent_of(path)?;
        parent.ops.mkdir(&base, mode)
    }

    /// Remove the directory at `path`.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let (parent, base) = self.parent_of(path)?;
        parent.ops.rmdir(&base)
    }

    /// Remove the file at `path`.
    pub fn unlink(&self, path: &str) -> Result<()> {
        let (parent, base) = self.parent_of(path)?;
        parent.ops.unlink(&base)
    }

    /// Rename within a single directory; cross-directory renames are not
    /// supported by this layer.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let (old_parent_path, old_base) = {
            let norm = normalize_path(old_path)?;
            let (p, b) = split_path(&norm);
            (p.to_owned(), b.to_owned())
        };
        let (new_parent_path, new_base) = {
            let norm = normalize_path(new_path)?;
            let (p, b) = split_path(&norm);
            (p.to_owned(), b.to_owned())
        };

        let old_parent = self.lookup(&old_parent_path)?;
        let new_parent = self.lookup(&new_parent_path)?;
        if old_parent.kind != NodeKind::Directory || new_parent.kind != NodeKind::Directory {
            return Err(FsError::NotDirectory);
        }

        if old_parent_path != new_parent_path {
            return Err(FsError::Unsupported {
                op: "rename across directories",
            });
        }
        old_parent.ops.rename(&old_base, &new_base)
    }

    /// Create a hard link at `new_path` to the node at `old_path`.
    pub fn link(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_norm = normalize_path(old_path)?;
        let target = self.lookup(&old_norm)?;
        if target.kind == NodeKind::Directory {
            return Err(FsError::IsDirectory);
        }
        let (new_parent, new_base) = self.parent_of(new_path)?;
        new_parent.ops.link(&old_norm, &new_base)
    }

    /// Create a symbolic link at `link_path` pointing to `target`.
    pub fn symlink(&self, target: &str, link_path: &str) -> Result<()> {
        let (parent, base) = self.parent_of(link_path)?;
        parent.ops.symlink(target, &base)
    }

    /// Read the target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<Vec<u8>> {
        let node = self.lookup(path)?;
        if node.kind != NodeKind::Symlink {
            return Err(FsError::InvalidArgument(format!(
                "not a symlink: {path}"
            )));
        }
        node.ops.readlink()
    }

    /// Change permission bits of the node at `path`.
    pub fn chmod(&self, path: &str, mode: u16) -> Result<()> {
        self.lookup(path)?.ops.chmod(mode)
    }

    /// Change ownership of the node at `path`.
    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        self.lookup(path)?.ops.chown(uid, gid)
    }

    /// Truncate the regular file at `path`.
    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let node = self.lookup(path)?;
        if node.kind != NodeKind::File {
            return Err(FsError::InvalidArgument(format!(
                "not a regular file: {path}"
            )));
        }
        node.ops.truncate(size)
    }

    /// Truncate the regular file behind a descriptor.
    pub fn ftruncate(&self, fd: Fd, size: u64) -> Result<()> {
        let fds = self.fds.lock();
        let handle = fds
            .get(fd.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| bad_fd(fd))?;
        if handle.node.kind != NodeKind::File {
            return Err(FsError::InvalidArgument(
                "not a regular file".to_owned(),
            ));
        }
        let node = handle.node.clone();
        drop(fds);
        node.ops.truncate(size)
    }
}

fn bad_fd(fd: Fd) -> FsError {
    FsError::InvalidArgument(format!("bad file descriptor {}", fd.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── in-memory mock filesystem ───────────────────────────────────────

    struct MemFileOps {
        ino: u64,
        data: Vec<u8>,
    }

    impl NodeOps for MemFileOps {
        fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
            let len = self.data.len() as u64;
            if offset >= len {
                return Ok(0);
            }
            let start = offset as usize;
            let n = buf.len().min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }

        fn stat(&self) -> Result<NodeStat> {
            Ok(NodeStat {
                ino: self.ino,
                size: self.data.len() as u64,
                ..NodeStat::default()
            })
        }
    }

    struct MemDirOps {
        ino: u64,
        children: Vec<VfsNode>,
    }

    impl NodeOps for MemDirOps {
        fn read(&self, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
            Err(FsError::IsDirectory)
        }

        fn readdir(&self, index: u32) -> Result<Option<VfsDirEntry>> {
            Ok(self.children.get(index as usize).map(|c| VfsDirEntry {
                name: c.name.clone(),
                ino: c.ino,
                kind: c.kind,
            }))
        }

        fn finddir(&self, name: &str) -> Result<Option<VfsNode>> {
            Ok(self.children.iter().find(|c| c.name == name).cloned())
        }

        fn stat(&self) -> Result<NodeStat> {
            Ok(NodeStat {
                ino: self.ino,
                ..NodeStat::default()
            })
        }
    }

    fn file_node(name: &str, ino: u64, data: &[u8]) -> VfsNode {
        VfsNode {
            name: name.to_owned(),
            kind: NodeKind::File,
            perm: 0o644,
            uid: 0,
            gid: 0,
            size: data.len() as u64,
            ino,
            links: 1,
            atime: 0,
            mtime: 0,
            ctime: 0,
            ops: Arc::new(MemFileOps {
                ino,
                data: data.to_vec(),
            }),
        }
    }

    fn dir_node(name: &str, ino: u64, children: Vec<VfsNode>) -> VfsNode {
        VfsNode {
            name: name.to_owned(),
            kind: NodeKind::Directory,
            perm: 0o755,
            uid: 0,
            gid: 0,
            size: 0,
            ino,
            links: 2,
            atime: 0,
            mtime: 0,
            ctime: 0,
            ops: Arc::new(MemDirOps { ino, children }),
        }
    }

    fn sample_root() -> VfsNode {
        dir_node(
            "/",
            1,
            vec![
                file_node("hello.txt", 10, b"hello world"),
                dir_node("etc", 20, vec![file_node("config", 21, b"key=value\n")]),
                dir_node("mnt", 30, vec![]),
            ],
        )
    }

    // ── normalization ───────────────────────────────────────────────────

    #[test]
    fn normalize_collapses_dot_and_dotdot() {
        assert_eq!(normalize_path("/a/./b/../c").unwrap(), "/a/c");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("/../..").unwrap(), "/");
        assert_eq!(normalize_path("//a///b//").unwrap(), "/a/b");
        assert_eq!(normalize_path("a/b/..").unwrap(), "a");
        assert_eq!(normalize_path("a/..").unwrap(), ".");
    }

    #[test]
    fn normalize_is_idempotent() {
        for path in ["/a/./b/../c", "/", "", "a/b/../../c", "//x//y/z/..", "/mnt/data"] {
            let once = normalize_path(path).unwrap();
            let twice = normalize_path(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {path:?}");
        }
    }

    #[test]
    fn normalize_rejects_long_paths() {
        let long = "/".to_owned() + &"a/".repeat(MAX_PATH_LEN);
        assert!(matches!(normalize_path(&long), Err(FsError::NameTooLong)));

        let long_name = format!("/{}", "x".repeat(NAME_MAX + 1));
        assert!(matches!(
            normalize_path(&long_name),
            Err(FsError::NameTooLong)
        ));
    }

    #[test]
    fn split_path_cases() {
        assert_eq!(split_path("/a/b"), ("/a", "b"));
        assert_eq!(split_path("/a"), ("/", "a"));
        assert_eq!(split_path("a"), (".", "a"));
    }

    // ── lookup ──────────────────────────────────────────────────────────

    #[test]
    fn lookup_walks_components() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        assert_eq!(vfs.lookup("/").unwrap().ino, 1);
        assert_eq!(vfs.lookup("/hello.txt").unwrap().ino, 10);
        assert_eq!(vfs.lookup("/etc/config").unwrap().ino, 21);
        assert_eq!(vfs.lookup("/etc/../hello.txt").unwrap().ino, 10);
    }

    #[test]
    fn lookup_reports_missing_and_nondir() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        assert!(matches!(
            vfs.lookup("/nope"),
            Err(FsError::NotFound(name)) if name == "nope"
        ));
        assert!(matches!(
            vfs.lookup("/hello.txt/inside"),
            Err(FsError::NotDirectory)
        ));
    }

    #[test]
    fn lookup_without_root_fails() {
        let vfs = Vfs::new();
        assert!(matches!(vfs.lookup("/anything"), Err(FsError::NotFound(_))));
    }

    // ── mounts ──────────────────────────────────────────────────────────

    #[test]
    fn mount_redirects_traversal() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let inner = dir_node("/", 100, vec![file_node("data.bin", 101, b"abc")]);
        vfs.mount("/mnt", inner).unwrap();

        assert_eq!(vfs.lookup("/mnt").unwrap().ino, 100);
        assert_eq!(vfs.lookup("/mnt/data.bin").unwrap().ino, 101);
    }

    #[test]
    fn unmount_restores_prior_node() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let before = vfs.lookup("/mnt").unwrap().ino;
        let inner = dir_node("/", 100, vec![]);
        vfs.mount("/mnt", inner).unwrap();
        assert_eq!(vfs.lookup("/mnt").unwrap().ino, 100);

        vfs.unmount("/mnt").unwrap();
        assert_eq!(vfs.lookup("/mnt").unwrap().ino, before);
    }

    #[test]
    fn mount_requires_existing_directory() {
        let vfs = Vfs::new();
        let other = dir_node("/", 100, vec![]);
        assert!(vfs.mount("/mnt", other.clone()).is_err());

        vfs.mount("/", sample_root()).unwrap();
        assert!(matches!(
            vfs.mount("/hello.txt", other.clone()),
            Err(FsError::NotDirectory)
        ));
        assert!(matches!(
            vfs.mount("/missing", other),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn unmount_root_is_forbidden() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();
        assert!(vfs.unmount("/").is_err());
    }

    #[test]
    fn duplicate_mount_rejected_and_table_bounded() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let inner = dir_node("/", 100, vec![]);
        vfs.mount("/mnt", inner.clone()).unwrap();
        assert!(vfs.mount("/mnt", inner).is_err());
    }

    // ── descriptors ─────────────────────────────────────────────────────

    #[test]
    fn open_read_close_cycle() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let fd = vfs.open("/hello.txt", OpenFlags::RDONLY).unwrap();
        let mut buf = [0_u8; 5];
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        // Cursor advanced; next read continues.
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b" worl");

        vfs.close(fd).unwrap();
        assert!(vfs.read(fd, &mut buf).is_err());
    }

    #[test]
    fn seek_rules() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();
        let fd = vfs.open("/hello.txt", OpenFlags::RDONLY).unwrap();

        assert_eq!(vfs.seek(fd, SeekFrom::Start(6)).unwrap(), 6);
        let mut buf = [0_u8; 5];
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");

        assert_eq!(vfs.seek(fd, SeekFrom::End(-1)).unwrap(), 10);
        assert_eq!(vfs.seek(fd, SeekFrom::Current(-10)).unwrap(), 0);

        // Read-only descriptors cannot pass end-of-file.
        assert!(vfs.seek(fd, SeekFrom::End(1)).is_err());
        assert!(vfs.seek(fd, SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn descriptor_table_exhaustion() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let mut fds = Vec::new();
        for _ in 0..MAX_OPEN_FILES {
            fds.push(vfs.open("/hello.txt", OpenFlags::RDONLY).unwrap());
        }
        assert!(matches!(
            vfs.open("/hello.txt", OpenFlags::RDONLY),
            Err(FsError::OutOfResources(_))
        ));

        vfs.close(fds[0]).unwrap();
        assert!(vfs.open("/hello.txt", OpenFlags::RDONLY).is_ok());
    }

    #[test]
    fn readdir_and_stat() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        let first = vfs.readdir("/", 0).unwrap().unwrap();
        assert_eq!(first.name, "hello.txt");
        assert!(vfs.readdir("/", 99).unwrap().is_none());
        assert!(matches!(
            vfs.readdir("/hello.txt", 0),
            Err(FsError::NotDirectory)
        ));

        assert_eq!(vfs.stat("/hello.txt").unwrap().size, 11);
        let fd = vfs.open("/etc/config", OpenFlags::RDONLY).unwrap();
        assert_eq!(vfs.fstat(fd).unwrap().ino, 21);
    }

    #[test]
    fn mutating_operations_report_unsupported() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();

        assert!(matches!(
            vfs.mkdir("/newdir", 0o755),
            Err(FsError::Unsupported { op: "mkdir" })
        ));
        assert!(matches!(
            vfs.unlink("/hello.txt"),
            Err(FsError::Unsupported { op: "unlink" })
        ));
        assert!(matches!(
            vfs.rename("/hello.txt", "/other.txt"),
            Err(FsError::Unsupported { op: "rename" })
        ));
        assert!(matches!(
            vfs.rename("/hello.txt", "/etc/other.txt"),
            Err(FsError::Unsupported {
                op: "rename across directories"
            })
        ));
        assert!(matches!(
            vfs.chmod("/hello.txt", 0o600),
            Err(FsError::Unsupported { op: "chmod" })
        ));
        assert!(matches!(
            vfs.truncate("/hello.txt", 0),
            Err(FsError::Unsupported { op: "truncate" })
        ));
        assert!(matches!(
            vfs.link("/hello.txt", "/etc/hello2"),
            Err(FsError::Unsupported { op: "link" })
        ));
        assert!(matches!(
            vfs.symlink("/hello.txt", "/etc/sym"),
            Err(FsError::Unsupported { op: "symlink" })
        ));
    }

    #[test]
    fn truncate_requires_regular_file() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();
        assert!(matches!(
            vfs.truncate("/etc", 0),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn readlink_requires_symlink() {
        let vfs = Vfs::new();
        vfs.mount("/", sample_root()).unwrap();
        assert!(matches!(
            vfs.readlink("/hello.txt"),
            Err(FsError::InvalidArgument(_))
        ));
    }
}
