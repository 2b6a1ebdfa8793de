//! An in-memory FAT style file system: a fixed size disk split into blocks, a
//! file allocation table chaining the blocks of each file, a bitmap of used
//! blocks and a directory tree of file records.
//!
//! [`fs::FatFs`] is the allocation engine. [`manager::FileManager`] layers
//! name based operations and directory navigation on top of it.

#[macro_use]
extern crate log;

pub mod alloc;
pub mod dir;
pub mod fat;
pub mod fs;
pub mod io;
pub mod manager;
pub mod report;

/// Default size of one block in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 8;
/// Default size of the whole disk in bytes.
pub const DEFAULT_DISK_CAPACITY: usize = 1024;

pub use crate::dir::{DirId, FileRecord};
pub use crate::fat::FatEntry;
pub use crate::fs::{needed_blocks, Allocation, FatFs, FsError, Result};
pub use crate::io::{BlockNumber, BlockStorage, MemoryDisk, MemoryDiskBuilder};
pub use crate::manager::FileManager;
