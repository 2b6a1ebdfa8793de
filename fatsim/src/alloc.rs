use crate::fs::{FsError, Result};
use crate::io::BlockNumber;
use std::ops::Range;
use zerocopy::AsBytes;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// One bit per block, packed into 64 bit words. Bit `n` of word `n / 64`
/// tracks block `n`.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packed words as raw bytes in host order.
    pub fn serialize(&self) -> &[u8] {
        self.bitmap.as_slice().as_bytes()
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        // Grab of the u64 containing the significant bit.
        let outer_offset = self.bitmap[blocknr / 64];

        let inner_offset = blocknr % 64;
        let mask = 0b01_u64 << inner_offset;
        match (outer_offset & mask) >> inner_offset {
            0 => State::Free,
            1 => State::Used,
            _ => unreachable!("Block state returned a non 0 or 1 value. This likely indicates an error with bitmasking"),
        }
    }

    pub fn set_reserved(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        let mask = 0b01_u64 << (blocknr % 64);
        self.bitmap[blocknr / 64] |= mask;
    }

    pub fn set_free(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        let mask = 0b01_u64 << (blocknr % 64);
        self.bitmap[blocknr / 64] &= !mask;
    }

    /// Number of blocks currently marked free.
    pub fn count_free(&self) -> usize {
        let used: u32 = self.bitmap.iter().map(|word| word.count_ones()).sum();
        self.len - used as usize
    }
}

/// Block occupancy together with the free space ledger it backs.
///
/// [`OccupancyMap::set_occupied`] is the only way to change either, so the
/// ledger always equals `block_size` times the number of free blocks.
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    bitmap: Bitmap,
    block_size: usize,
    free_space: usize,
}

impl OccupancyMap {
    /// Every block starts out free.
    pub fn new(block_count: usize, block_size: usize) -> Self {
        Self {
            bitmap: Bitmap::new(block_count),
            block_size,
            free_space: block_count * block_size,
        }
    }

    /// Marks `blocknr` used or free and adjusts the free space ledger by one
    /// block. Returns `false`, leaving everything untouched, when the block is
    /// already in the requested state.
    pub fn set_occupied(&mut self, blocknr: BlockNumber, used: bool) -> bool {
        match (self.bitmap.get(blocknr), used) {
            (State::Free, true) => {
                self.bitmap.set_reserved(blocknr);
                self.free_space -= self.block_size;
                true
            }
            (State::Used, false) => {
                self.bitmap.set_free(blocknr);
                self.free_space += self.block_size;
                true
            }
            _ => false,
        }
    }

    pub fn is_used(&self, blocknr: BlockNumber) -> bool {
        self.bitmap.get(blocknr) == State::Used
    }

    pub fn has_space_for(&self, bytes: usize) -> bool {
        bytes <= self.free_space
    }

    /// Free space in bytes.
    pub fn free_space(&self) -> usize {
        self.free_space
    }

    pub fn free_blocks(&self) -> usize {
        self.free_space / self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.bitmap.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// `true` for every used block, in block order.
    pub fn snapshot(&self) -> Vec<bool> {
        (0..self.bitmap.len()).map(|i| self.is_used(i)).collect()
    }

    /// Maximal runs of contiguous free blocks in ascending order.
    pub fn free_runs(&self) -> Vec<Range<BlockNumber>> {
        let mut runs = Vec::new();
        let mut start = None;
        for i in 0..self.bitmap.len() {
            match (self.bitmap.get(i), start) {
                (State::Free, None) => start = Some(i),
                (State::Used, Some(s)) => {
                    runs.push(s..i);
                    start = None;
                }
                _ => {}
            }
        }
        // A run reaching the last block is never closed by a used block.
        if let Some(s) = start {
            runs.push(s..self.bitmap.len());
        }
        runs
    }

    pub fn free_block_iter(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            marker: 0,
            bitmap: &self.bitmap,
        }
    }
}

/// Walks the bitmap in block order yielding every free block.
pub struct FreeBlocks<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: usize,
    bitmap: &'a Bitmap,
}

impl<'a> Iterator for FreeBlocks<'a> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        for i in self.marker..self.bitmap.len() {
            if let State::Free = self.bitmap.get(i) {
                self.marker = i + 1;
                return Some(i);
            }
        }
        self.marker = self.bitmap.len();
        None
    }
}

/// Picks blocks for a new file.
///
/// The policy prefers the tightest contiguous free run that still fits the
/// whole file, leaving larger runs intact for later requests. Ties go to the
/// run closest to the start of the disk.
///
/// ## Fallback
///
/// When no single run is long enough the file is scattered over the first free
/// blocks in disk order. This always succeeds as long as the total free space
/// suffices, at the cost of a fragmented chain.
pub struct BestFitAllocation<'a> {
    occupancy: &'a OccupancyMap,
}

impl<'a> BestFitAllocation<'a> {
    pub fn new(occupancy: &'a OccupancyMap) -> Self {
        Self { occupancy }
    }

    /// Returns exactly `count` free blocks in ascending order. The order is
    /// the order the blocks are chained in.
    ///
    /// # Errors
    ///
    /// `AllocationImpossible` if fewer than `count` blocks are free. Callers
    /// check free space first, so this indicates a corrupted ledger.
    pub fn find_blocks(&self, count: usize) -> Result<Vec<BlockNumber>> {
        if count == 0 {
            return Err(FsError::InvalidArgument(
                "block count must be positive".to_string(),
            ));
        }

        if let Some(run) = self.best_fit(count) {
            debug!(
                "Best fit for {} blocks is run {}..{} ({} free).",
                count,
                run.start,
                run.end,
                run.len()
            );
            return Ok(run.take(count).collect());
        }

        let blocks: Vec<BlockNumber> = self.occupancy.free_block_iter().take(count).collect();
        if blocks.len() < count {
            error!(
                "Bitmap holds {} free blocks but {} were required.",
                blocks.len(),
                count
            );
            return Err(FsError::AllocationImpossible {
                needed: count,
                found: blocks.len(),
            });
        }
        warn!(
            "No contiguous run of {} blocks, allocating fragmented chain {:?}.",
            count, blocks
        );
        Ok(blocks)
    }

    fn best_fit(&self, count: usize) -> Option<Range<BlockNumber>> {
        // `min_by_key` keeps the first of equal elements, which is the leftmost run.
        self.occupancy
            .free_runs()
            .into_iter()
            .filter(|run| run.len() >= count)
            .min_by_key(|run| run.len())
    }
}
