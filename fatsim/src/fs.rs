use crate::alloc::{BestFitAllocation, OccupancyMap};
use crate::fat::{AllocationTable, FatEntry};
use crate::io::{BlockNumber, BlockStorage};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not enough free space: {requested} bytes requested, {available} available")]
    InsufficientSpace { requested: usize, available: usize },
    #[error("name \"{0}\" is already used")]
    NameAlreadyUsed(String),
    #[error("invalid size {requested}: must free at least one block of the {current} allocated bytes")]
    InvalidSize { requested: usize, current: usize },
    #[error("could not find {needed} free blocks ({found} available), bitmap and free space disagree")]
    AllocationImpossible { needed: usize, found: usize },
    #[error("found no entry named \"{0}\"")]
    DoesNotExist(String),
    #[error("already at the root directory")]
    AtRoot,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("file system inconsistent: {0}")]
    Inconsistent(String),
    #[error("invalid file system block layout")]
    InvalidBlock(#[from] std::io::Error),
}

impl FsError {
    /// Internal consistency faults. The engine state can no longer be trusted
    /// once one of these is returned.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FsError::AllocationImpossible { .. } | FsError::Inconsistent(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Blocks needed to hold `len` bytes. Any byte spilling past a block boundary
/// takes a whole extra block.
pub fn needed_blocks(len: usize, block_size: usize) -> usize {
    len / block_size + usize::from(len % block_size != 0)
}

/// The storage handed out for one file.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Allocation {
    /// First block of the chain, `None` for a file without blocks.
    pub head: Option<BlockNumber>,
    /// Length of the chain.
    pub blocks: usize,
    /// `blocks` times the block size.
    pub rounded_size: usize,
}

/// The block allocation engine: an arena of blocks, the allocation table
/// chaining them into files and the bitmap recording which are in use.
///
/// # Layout
/// =====================================================
/// | Bitmap (1 bit/block) | FAT (1 entry/block) | Data |
/// =====================================================
///
/// The bitmap and table live beside the device; every block of the device
/// holds file data.
pub struct FatFs<T: BlockStorage> {
    dev: T,
    occupancy: OccupancyMap,
    fat: AllocationTable,
}

impl<T: BlockStorage> FatFs<T> {
    /// Initializes an empty file system onto owned block storage.
    pub fn create(dev: T) -> Result<Self> {
        if dev.block_size() == 0 || dev.block_count() == 0 {
            return Err(FsError::InvalidArgument(
                "device must have a non-zero block size and block count".to_string(),
            ));
        }
        let occupancy = OccupancyMap::new(dev.block_count(), dev.block_size());
        let fat = AllocationTable::new(dev.block_count());
        debug!(
            "Created file system with {} blocks of {} bytes.",
            dev.block_count(),
            dev.block_size()
        );

        Ok(FatFs {
            dev,
            occupancy,
            fat,
        })
    }

    pub fn block_size(&self) -> usize {
        self.dev.block_size()
    }

    pub fn block_count(&self) -> usize {
        self.dev.block_count()
    }

    pub fn needed_blocks(&self, len: usize) -> usize {
        needed_blocks(len, self.block_size())
    }

    /// Allocates, links and reserves a chain large enough for `byte_size`
    /// bytes. A zero byte file gets no blocks at all.
    ///
    /// # Errors
    ///
    /// `InsufficientSpace` when the size rounded up to whole blocks exceeds
    /// the free space.
    pub fn create_file_storage(&mut self, byte_size: usize) -> Result<Allocation> {
        let blocks = self.needed_blocks(byte_size);
        // Saturates near `usize::MAX`.
        let rounded_size = blocks.saturating_mul(self.block_size());
        if !self.occupancy.has_space_for(rounded_size) {
            warn!(
                "Rejected allocation of {} bytes, {} free.",
                rounded_size,
                self.occupancy.free_space()
            );
            return Err(FsError::InsufficientSpace {
                requested: rounded_size,
                available: self.occupancy.free_space(),
            });
        }
        if blocks == 0 {
            return Ok(Allocation {
                head: None,
                blocks,
                rounded_size,
            });
        }

        let chain = BestFitAllocation::new(&self.occupancy).find_blocks(blocks)?;
        self.fat.link_chain(&chain);
        for &blocknr in chain.iter() {
            self.occupancy.set_occupied(blocknr, true);
        }
        info!("Allocated chain {:?} for {} bytes.", chain, byte_size);

        Ok(Allocation {
            head: chain.first().copied(),
            blocks,
            rounded_size,
        })
    }

    /// Writes `data` over the chain starting at `head`, one block sized
    /// fragment per block. The last fragment is zero padded.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the chain has exactly as many blocks as `data`
    /// needs.
    pub fn write_file_data(&mut self, head: Option<BlockNumber>, data: &[u8]) -> Result<()> {
        let chain: Vec<BlockNumber> = self.fat.chain(head).collect();
        let fragments = self.needed_blocks(data.len());
        if fragments != chain.len() {
            return Err(FsError::InvalidArgument(format!(
                "{} bytes need {} blocks but the chain holds {}",
                data.len(),
                fragments,
                chain.len()
            )));
        }

        let block_size = self.block_size();
        for (&blocknr, fragment) in chain.iter().zip(data.chunks(block_size)) {
            self.dev.write_block(blocknr, fragment)?;
            self.occupancy.set_occupied(blocknr, true);
        }
        debug!("Wrote {} bytes over chain {:?}.", data.len(), chain);
        Ok(())
    }

    /// Reads every block of the chain, trailing padding included.
    pub fn read_file_data(&self, head: Option<BlockNumber>) -> Result<Vec<u8>> {
        let chain: Vec<BlockNumber> = self.fat.chain(head).collect();
        let block_size = self.block_size();
        let mut content = vec![0; chain.len() * block_size];
        for (&blocknr, buf) in chain.iter().zip(content.chunks_mut(block_size)) {
            self.dev.read_block(blocknr, buf)?;
        }
        Ok(content)
    }

    /// Frees the whole chain. Returns the number of released blocks.
    pub fn delete_file_storage(&mut self, head: Option<BlockNumber>) -> usize {
        let released = self.fat.release_chain(head, &mut self.occupancy);
        info!("Released {} blocks starting at {:?}.", released, head);
        released
    }

    /// Shrinks the chain to the blocks needed for `new_byte_size` bytes.
    ///
    /// # Errors
    ///
    /// `InvalidSize` unless the new size frees at least one whole block.
    pub fn truncate_file_storage(
        &mut self,
        head: Option<BlockNumber>,
        new_byte_size: usize,
    ) -> Result<Allocation> {
        let current = self.fat.chain(head).count();
        let keep = self.needed_blocks(new_byte_size);
        if keep >= current {
            warn!(
                "Rejected truncation to {} bytes of a {} block chain.",
                new_byte_size, current
            );
            return Err(FsError::InvalidSize {
                requested: new_byte_size,
                current: current * self.block_size(),
            });
        }

        let released = self
            .fat
            .release_chain_suffix(head, keep, &mut self.occupancy);
        info!(
            "Truncated chain {:?} to {} blocks, released {}.",
            head, keep, released
        );
        Ok(Allocation {
            head: if keep == 0 { None } else { head },
            blocks: keep,
            rounded_size: keep * self.block_size(),
        })
    }

    /// Blocks of the chain starting at `head`, in chain order.
    pub fn chain_blocks(&self, head: Option<BlockNumber>) -> Vec<BlockNumber> {
        self.fat.chain(head).collect()
    }

    pub fn occupancy_snapshot(&self) -> Vec<bool> {
        self.occupancy.snapshot()
    }

    pub fn chain_snapshot(&self) -> Vec<Option<BlockNumber>> {
        self.fat.snapshot()
    }

    pub fn free_space(&self) -> usize {
        self.occupancy.free_space()
    }

    pub fn has_space_for(&self, bytes: usize) -> bool {
        self.occupancy.has_space_for(bytes)
    }

    pub fn bitmap_bytes(&self) -> &[u8] {
        self.occupancy.bitmap().serialize()
    }

    pub fn disk(&self) -> &T {
        &self.dev
    }

    /// Checks the engine against the set of live chain heads: chains are in
    /// range, acyclic and pairwise disjoint, a block is used exactly when some
    /// chain reaches it, unreachable blocks carry no links, and the free space
    /// ledger matches the bitmap.
    pub fn check_consistency(&self, heads: &[Option<BlockNumber>]) -> Result<()> {
        let block_count = self.block_count();
        let mut owner: Vec<Option<BlockNumber>> = vec![None; block_count];

        for &head in heads.iter().flatten() {
            if head >= block_count {
                return Err(self.inconsistent(format!("chain head {} is out of range", head)));
            }
            for blocknr in self.fat.chain(Some(head)) {
                if let Some(first) = owner[blocknr] {
                    return Err(self.inconsistent(format!(
                        "block {} reached from chain {} and chain {}",
                        blocknr, first, head
                    )));
                }
                owner[blocknr] = Some(head);
                if let FatEntry::Next(next) = self.fat.get(blocknr) {
                    if next >= block_count {
                        return Err(self.inconsistent(format!(
                            "block {} links to out of range block {}",
                            blocknr, next
                        )));
                    }
                }
            }
        }

        for (blocknr, reached) in owner.iter().enumerate() {
            let used = self.occupancy.is_used(blocknr);
            match (reached, used) {
                (Some(head), false) => {
                    return Err(self.inconsistent(format!(
                        "block {} of chain {} is marked free",
                        blocknr, head
                    )))
                }
                (None, true) => {
                    return Err(
                        self.inconsistent(format!("block {} is used but unreachable", blocknr))
                    )
                }
                (None, false) if self.fat.get(blocknr) != FatEntry::EndOfChain => {
                    return Err(
                        self.inconsistent(format!("free block {} still links onward", blocknr))
                    )
                }
                _ => {}
            }
        }

        let expected = self.block_size() * self.occupancy.bitmap().count_free();
        if self.occupancy.free_space() != expected {
            return Err(self.inconsistent(format!(
                "free space is {} bytes but the bitmap accounts for {}",
                self.occupancy.free_space(),
                expected
            )));
        }
        Ok(())
    }

    fn inconsistent(&self, detail: String) -> FsError {
        error!("Consistency check failed: {}.", detail);
        FsError::Inconsistent(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryDisk, MemoryDiskBuilder};

    fn create_test_fs(blocks: usize) -> FatFs<MemoryDisk> {
        let dev = MemoryDiskBuilder::new()
            .with_block_size(8)
            .with_block_count(blocks)
            .build()
            .expect("Could not initialize memory disk.");
        FatFs::create(dev).unwrap()
    }

    fn live_heads(allocs: &[Allocation]) -> Vec<Option<BlockNumber>> {
        allocs.iter().map(|a| a.head).collect()
    }

    #[test]
    fn needed_blocks_rounds_up() {
        assert_eq!(needed_blocks(0, 8), 0);
        assert_eq!(needed_blocks(1, 8), 1);
        assert_eq!(needed_blocks(8, 8), 1);
        assert_eq!(needed_blocks(9, 8), 2);
        assert_eq!(needed_blocks(16, 8), 2);
    }

    #[test]
    fn needed_blocks_does_not_overflow() {
        assert_eq!(needed_blocks(usize::MAX, 8), usize::MAX / 8 + 1);
        assert_eq!(needed_blocks(usize::MAX, 1), usize::MAX);
    }

    #[test]
    fn huge_sizes_return_typed_errors() {
        let mut fs = create_test_fs(4);
        match fs.create_file_storage(usize::MAX) {
            Err(FsError::InsufficientSpace { available, .. }) => assert_eq!(available, 32),
            other => panic!("unexpected result {:?}", other),
        }

        let alloc = fs.create_file_storage(16).unwrap();
        match fs.truncate_file_storage(alloc.head, usize::MAX) {
            Err(FsError::InvalidSize { requested, current }) => {
                assert_eq!(requested, usize::MAX);
                assert_eq!(current, 16);
            }
            other => panic!("unexpected result {:?}", other),
        }
        fs.check_consistency(&[alloc.head]).unwrap();
    }

    #[test]
    fn introspection_exposes_bitmap_and_disk() {
        let mut fs = create_test_fs(130);
        let alloc = fs.create_file_storage(3).unwrap();
        fs.write_file_data(alloc.head, b"abc").unwrap();

        // 130 blocks pack into three 64 bit words.
        let bitmap = fs.bitmap_bytes();
        assert_eq!(bitmap.len(), 24);
        assert_eq!(bitmap.iter().map(|b| b.count_ones()).sum::<u32>(), 1);
        assert_eq!(fs.disk().as_bytes().len(), 130 * 8);
        assert_eq!(&fs.disk().as_bytes()[..3], b"abc");
    }

    #[test]
    fn create_reserves_rounded_blocks() {
        let mut fs = create_test_fs(16);
        let alloc = fs.create_file_storage(20).unwrap();

        assert_eq!(alloc.head, Some(0));
        assert_eq!(alloc.blocks, 3);
        assert_eq!(alloc.rounded_size, 24);
        assert_eq!(fs.free_space(), 13 * 8);
        assert_eq!(fs.chain_blocks(alloc.head), vec![0, 1, 2]);
        fs.check_consistency(&[alloc.head]).unwrap();
    }

    #[test]
    fn empty_file_has_no_chain() {
        let mut fs = create_test_fs(4);
        let alloc = fs.create_file_storage(0).unwrap();

        assert_eq!(alloc.head, None);
        assert_eq!(fs.free_space(), 32);
        assert!(fs.read_file_data(alloc.head).unwrap().is_empty());
        fs.write_file_data(alloc.head, &[]).unwrap();
    }

    #[test]
    fn create_beyond_free_space_fails() {
        let mut fs = create_test_fs(4);
        fs.create_file_storage(17).unwrap();

        match fs.create_file_storage(9) {
            Err(FsError::InsufficientSpace {
                requested,
                available,
            }) => {
                assert_eq!(requested, 16);
                assert_eq!(available, 8);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(fs.free_space(), 8);
    }

    #[test]
    fn write_then_read_returns_padded_blocks() {
        let mut fs = create_test_fs(8);
        let alloc = fs.create_file_storage(11).unwrap();
        fs.write_file_data(alloc.head, b"hello world").unwrap();

        let content = fs.read_file_data(alloc.head).unwrap();
        assert_eq!(content.len(), 16);
        assert_eq!(&content[..11], b"hello world");
        assert_eq!(&content[11..], &[0; 5]);
    }

    #[test]
    fn write_with_mismatched_chain_is_rejected() {
        let mut fs = create_test_fs(8);
        let alloc = fs.create_file_storage(8).unwrap();

        match fs.write_file_data(alloc.head, b"more than one block") {
            Err(FsError::InvalidArgument(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn fragmented_chain_reads_in_chain_order() {
        let mut fs = create_test_fs(6);
        let a = fs.create_file_storage(8).unwrap();
        let b = fs.create_file_storage(8).unwrap();
        let c = fs.create_file_storage(8).unwrap();
        let d = fs.create_file_storage(8).unwrap();
        fs.delete_file_storage(a.head);
        fs.delete_file_storage(c.head);
        // Free blocks are now 0, 2, 4 and 5; a 3 block file must scatter.
        let e = fs.create_file_storage(24).unwrap();
        fs.write_file_data(e.head, b"AAAAAAAABBBBBBBBCCCCCCCC").unwrap();

        assert_eq!(fs.chain_blocks(e.head), vec![0, 2, 4]);
        assert_eq!(
            fs.read_file_data(e.head).unwrap(),
            b"AAAAAAAABBBBBBBBCCCCCCCC".to_vec()
        );
        fs.check_consistency(&[b.head, d.head, e.head]).unwrap();
    }

    #[test]
    fn delete_releases_every_block() {
        let mut fs = create_test_fs(8);
        let keep = fs.create_file_storage(8).unwrap();
        let gone = fs.create_file_storage(30).unwrap();
        let blocks = fs.chain_blocks(gone.head);

        assert_eq!(fs.delete_file_storage(gone.head), 4);

        let occupancy = fs.occupancy_snapshot();
        assert!(blocks.iter().all(|&b| !occupancy[b]));
        assert_eq!(fs.free_space(), 7 * 8);
        fs.check_consistency(&[keep.head]).unwrap();
    }

    #[test]
    fn truncate_by_one_block_releases_trailing_block() {
        let mut fs = create_test_fs(8);
        let alloc = fs.create_file_storage(24).unwrap();

        let shrunk = fs.truncate_file_storage(alloc.head, 16).unwrap();
        assert_eq!(shrunk.blocks, 2);
        assert_eq!(shrunk.head, alloc.head);
        assert_eq!(fs.chain_blocks(alloc.head), vec![0, 1]);
        assert_eq!(fs.occupancy_snapshot()[..3], [true, true, false]);
        assert_eq!(fs.chain_snapshot()[1], None);
        fs.check_consistency(&[alloc.head]).unwrap();
    }

    #[test]
    fn truncate_within_last_block_is_rejected() {
        let mut fs = create_test_fs(8);
        let alloc = fs.create_file_storage(24).unwrap();

        match fs.truncate_file_storage(alloc.head, 17) {
            Err(FsError::InvalidSize { requested, current }) => {
                assert_eq!(requested, 17);
                assert_eq!(current, 24);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(fs.truncate_file_storage(alloc.head, 40).is_err());
        assert_eq!(fs.chain_blocks(alloc.head).len(), 3);
    }

    #[test]
    fn truncate_to_zero_empties_file() {
        let mut fs = create_test_fs(8);
        let alloc = fs.create_file_storage(24).unwrap();

        let shrunk = fs.truncate_file_storage(alloc.head, 0).unwrap();
        assert_eq!(shrunk.head, None);
        assert_eq!(fs.free_space(), 64);
        fs.check_consistency(&[shrunk.head]).unwrap();
    }

    #[test]
    fn consistency_check_flags_unreachable_blocks() {
        let mut fs = create_test_fs(8);
        let a = fs.create_file_storage(16).unwrap();
        let b = fs.create_file_storage(8).unwrap();

        fs.check_consistency(&live_heads(&[a, b])).unwrap();
        let err = fs.check_consistency(&live_heads(&[a])).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn consistency_check_flags_shared_blocks() {
        let mut fs = create_test_fs(8);
        let a = fs.create_file_storage(16).unwrap();

        match fs.check_consistency(&[a.head, a.head]) {
            Err(FsError::Inconsistent(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
