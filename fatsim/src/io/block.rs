/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Fixed geometry block storage. The allocation engine only ever addresses the
/// device a whole block at a time; byte offsets are derived as
/// `blocknr * block_size()`.
pub trait BlockStorage {
    /// The size of a single block in bytes.
    fn block_size(&self) -> usize;
    /// The total number of blocks on the device.
    fn block_count(&self) -> usize;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer shorter than a
    /// block, will return an error.
    fn read_block(&self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number. Buffers shorter
    /// than a block leave the remainder of the block zeroed.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or a buffer longer than a block,
    /// will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;

    /// Total size of the device in bytes.
    fn capacity(&self) -> usize {
        self.block_size() * self.block_count()
    }
}
