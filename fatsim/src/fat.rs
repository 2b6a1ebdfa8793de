use crate::alloc::OccupancyMap;
use crate::io::BlockNumber;

/// A single allocation table slot.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FatEntry {
    /// The block following this one in the owning file.
    Next(BlockNumber),
    /// Last block of a chain, or a block that belongs to no chain.
    EndOfChain,
}

impl FatEntry {
    pub fn next(self) -> Option<BlockNumber> {
        match self {
            FatEntry::Next(blocknr) => Some(blocknr),
            FatEntry::EndOfChain => None,
        }
    }
}

/// The file allocation table: one entry per block linking each block of a
/// file to its successor.
#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries: Vec<FatEntry>,
}

impl AllocationTable {
    pub fn new(block_count: usize) -> Self {
        Self {
            entries: vec![FatEntry::EndOfChain; block_count],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, blocknr: BlockNumber) -> FatEntry {
        self.entries[blocknr]
    }

    /// Links `blocks` into a chain in the given order. The bitmap is left for
    /// the caller to update.
    pub fn link_chain(&mut self, blocks: &[BlockNumber]) {
        for pair in blocks.windows(2) {
            self.entries[pair[0]] = FatEntry::Next(pair[1]);
        }
        if let Some(&last) = blocks.last() {
            self.entries[last] = FatEntry::EndOfChain;
        }
    }

    /// Iterates the blocks of the chain starting at `head`.
    pub fn chain(&self, head: Option<BlockNumber>) -> Chain<'_> {
        Chain {
            table: self,
            cursor: head,
            remaining: self.entries.len(),
        }
    }

    /// Frees every block of the chain starting at `head`, returning how many
    /// blocks were released. An empty chain is a no-op.
    pub fn release_chain(
        &mut self,
        head: Option<BlockNumber>,
        occupancy: &mut OccupancyMap,
    ) -> usize {
        self.release_chain_suffix(head, 0, occupancy)
    }

    /// Keeps the first `keep_blocks` blocks of the chain, terminates the chain
    /// after them and frees the remainder. Returns how many blocks were freed.
    pub fn release_chain_suffix(
        &mut self,
        head: Option<BlockNumber>,
        keep_blocks: usize,
        occupancy: &mut OccupancyMap,
    ) -> usize {
        let blocks: Vec<BlockNumber> = self.chain(head).collect();
        if let Some(&new_last) = keep_blocks.checked_sub(1).and_then(|i| blocks.get(i)) {
            self.entries[new_last] = FatEntry::EndOfChain;
        }

        let mut released = 0;
        for &blocknr in blocks.iter().skip(keep_blocks) {
            self.entries[blocknr] = FatEntry::EndOfChain;
            occupancy.set_occupied(blocknr, false);
            released += 1;
        }
        if released > 0 {
            debug!(
                "Released {} blocks after keeping {} of chain {:?}.",
                released, keep_blocks, head
            );
        }
        released
    }

    /// Next pointers for every block, `None` marking end of chain.
    pub fn snapshot(&self) -> Vec<Option<BlockNumber>> {
        self.entries.iter().map(|entry| entry.next()).collect()
    }
}

/// Walks a chain through the allocation table.
///
/// Never yields more items than the table has entries, so a corrupted table
/// holding a cycle terminates instead of spinning.
pub struct Chain<'a> {
    table: &'a AllocationTable,
    cursor: Option<BlockNumber>,
    remaining: usize,
}

impl<'a> Iterator for Chain<'a> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        if self.remaining == 0 || current >= self.table.len() {
            self.cursor = None;
            return None;
        }
        self.remaining -= 1;
        self.cursor = self.table.get(current).next();
        Some(current)
    }
}
