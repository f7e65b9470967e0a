#![forbid(unsafe_code)]
//! Block I/O layer.
//!
//! The filesystem driver consumes a [`ByteDevice`]: pread/pwrite-style
//! byte-addressed I/O with explicit bounds. [`ByteBlockDevice`] adapts a
//! byte device into whole-block reads for callers that think in blocks.
//!
//! Reads are synchronous and uncached; a stalled device read stalls the
//! caller.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use strata_error::{FsError, Result};
use strata_types::BlockNo;

/// Byte-addressed device (pread/pwrite semantics).
///
/// Offsets and lengths are in bytes; callers are responsible for block
/// alignment where it matters. Out-of-range access is an error, never a
/// short read.
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes at `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` at `offset`. Unused by the read path.
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()>;
}

fn check_range(offset: u64, len: usize, device_len: u64) -> Result<()> {
    let len_u64 = u64::try_from(len)
        .map_err(|_| FsError::InvalidArgument("I/O length overflows u64".to_owned()))?;
    let end = offset
        .checked_add(len_u64)
        .ok_or_else(|| FsError::InvalidArgument("I/O range overflows u64".to_owned()))?;
    if end > device_len {
        return Err(FsError::InvalidArgument(format!(
            "I/O out of bounds: offset={offset} len={len} device_len={device_len}"
        )));
    }
    Ok(())
}

/// File-backed byte device over a filesystem image.
///
/// Uses `std::os::unix::fs::FileExt`, so no shared seek position is
/// involved and concurrent readers are safe.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
    writable: bool,
}

impl FileByteDevice {
    /// Open an image read-write, falling back to read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
        })
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(FsError::ReadOnly);
        }
        check_range(offset, buf.len(), self.len)?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }
}

/// In-memory byte device over an owned image buffer.
///
/// Used by fixture-driven tests and for mounting images loaded wholesale
/// into memory.
#[derive(Debug)]
pub struct MemByteDevice {
    bytes: Mutex<Vec<u8>>,
    len: u64,
}

impl MemByteDevice {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        Self {
            bytes: Mutex::new(bytes),
            len,
        }
    }

    /// Clone out the current image contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl ByteDevice for MemByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        let bytes = self.bytes.lock();
        let start = offset as usize;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len)?;
        let mut bytes = self.bytes.lock();
        let start = offset as usize;
        bytes[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

/// Block-addressed view over a [`ByteDevice`].
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_size: u32,
    block_count: u64,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: u32) -> Result<Self> {
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(FsError::InvalidArgument(format!(
                "invalid block_size={block_size} (must be a power of two)"
            )));
        }
        let len = inner.len_bytes();
        let block_size_u64 = u64::from(block_size);
        if len % block_size_u64 != 0 {
            return Err(FsError::InvalidArgument(format!(
                "device length {len} is not a multiple of block_size {block_size}"
            )));
        }
        let block_count = len / block_size_u64;
        Ok(Self {
            inner,
            block_size,
            block_count,
        })
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
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Read one whole block into `buf`; `buf.len()` must equal the block size.
    pub fn read_block(&self, block: BlockNo, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size as usize {
            return Err(FsError::InvalidArgument(format!(
                "block buffer size mismatch: got={} expected={}",
                buf.len(),
                self.block_size
            )));
        }
        if block.0 >= self.block_count {
            return Err(FsError::InvalidArgument(format!(
                "block out of range: block={} block_count={}",
                block.0, self.block_count
            )));
        }
        let offset = block
            .0
            .checked_mul(u64::from(self.block_size))
            .ok_or_else(|| FsError::InvalidArgument("block offset overflow".to_owned()))?;
        self.inner.read_exact_at(offset, buf)
    }
}
