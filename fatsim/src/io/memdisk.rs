use crate::io::block::{BlockNumber, BlockStorage};
use crate::{DEFAULT_BLOCK_SIZE, DEFAULT_DISK_CAPACITY};
use std::io::ErrorKind;
use std::ops::Range;

/// A volatile disk held entirely in memory. Every byte belongs to exactly one
/// block, `offset / block_size`.
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    space: Vec<u8>,
    block_size: usize,
    block_count: usize,
}

impl MemoryDisk {
    /// Returns a copy of the bytes in `range`.
    pub fn read_range(&self, range: Range<usize>) -> std::io::Result<Vec<u8>> {
        self.check_range(&range)?;
        Ok(self.space[range].to_vec())
    }

    /// Copies `data` onto the disk starting at byte `offset`.
    pub fn write_range(&mut self, offset: usize, data: &[u8]) -> std::io::Result<()> {
        let end = offset.checked_add(data.len()).ok_or_else(|| {
            std::io::Error::new(ErrorKind::InvalidInput, "byte range out of bounds")
        })?;
        let range = offset..end;
        self.check_range(&range)?;
        self.space[range].copy_from_slice(data);
        Ok(())
    }

    /// The raw disk contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.space
    }

    fn check_range(&self, range: &Range<usize>) -> std::io::Result<()> {
        if range.start > range.end || range.end > self.space.len() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "byte range out of bounds",
            ));
        }
        Ok(())
    }

    fn block_range(&self, blocknr: BlockNumber) -> std::io::Result<Range<usize>> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        let start = blocknr * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self {
            space: vec![0x00; DEFAULT_DISK_CAPACITY],
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_DISK_CAPACITY / DEFAULT_BLOCK_SIZE,
        }
    }
}

impl BlockStorage for MemoryDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr)?;
        if buf.len() < self.block_size {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        buf[..self.block_size].copy_from_slice(&self.space[range]);
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        let range = self.block_range(blocknr)?;
        if buf.len() > self.block_size {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer exceeds block size",
            ));
        }
        let block = &mut self.space[range];
        block[..buf.len()].copy_from_slice(buf);
        // Zero whatever the buffer did not cover.
        for byte in block[buf.len()..].iter_mut() {
            *byte = 0x00;
        }
        Ok(())
    }
}

/// Configures the geometry of a [`MemoryDisk`]. Unset values fall back to the
/// crate defaults (8 byte blocks, 1024 byte disk).
pub struct MemoryDiskBuilder {
    block_size: usize,
    block_count: Option<usize>,
    capacity: Option<usize>,
}

impl Default for MemoryDiskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDiskBuilder {
    pub fn new() -> Self {
        MemoryDiskBuilder {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: None,
            capacity: None,
        }
    }

    /// Sets the size of one block in bytes.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = Some(blocks);
        self.capacity = None;
        self
    }

    /// Sets the total disk size in bytes. Must be an exact multiple of the
    /// block size.
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self.block_count = None;
        self
    }

    /// Allocates the zero-filled disk.
    pub fn build(self) -> std::io::Result<MemoryDisk> {
        if self.block_size == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block size must be non-zero",
            ));
        }
        let block_count = match (self.block_count, self.capacity) {
            (Some(blocks), _) => blocks,
            (None, Some(bytes)) => {
                if bytes % self.block_size != 0 {
                    return Err(std::io::Error::new(
                        ErrorKind::InvalidInput,
                        "capacity must be a multiple of the block size",
                    ));
                }
                bytes / self.block_size
            }
            (None, None) => DEFAULT_DISK_CAPACITY / self.block_size,
        };
        if block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "disk must contain at least one block",
            ));
        }

        Ok(MemoryDisk {
            space: vec![0x00; block_count * self.block_size],
            block_size: self.block_size,
            block_count,
        })
    }
}
