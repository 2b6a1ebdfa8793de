use crate::dir::{DirId, Directory, DirectoryTree, FileRecord};
use crate::fs::{FatFs, FsError, Result};
use crate::io::{BlockNumber, BlockStorage, MemoryDisk};

/// Name based file operations relative to a current working directory.
///
/// Owns both the allocation engine and the directory tree, so every change to
/// a chain and to the record pointing at it happens under the same `&mut`.
pub struct FileManager<T: BlockStorage> {
    fs: FatFs<T>,
    tree: DirectoryTree,
    cwd: DirId,
}

impl FileManager<MemoryDisk> {
    /// A manager over the default 1024 byte disk of 8 byte blocks.
    pub fn with_defaults() -> Result<Self> {
        Self::new(MemoryDisk::default())
    }
}

impl<T: BlockStorage> FileManager<T> {
    pub fn new(dev: T) -> Result<Self> {
        let tree = DirectoryTree::new();
        Ok(Self {
            fs: FatFs::create(dev)?,
            cwd: tree.root(),
            tree,
        })
    }

    pub fn engine(&self) -> &FatFs<T> {
        &self.fs
    }

    pub fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    pub fn current_dir(&self) -> &Directory {
        self.tree.get(self.cwd)
    }

    /// Names of the files in the current directory, sorted.
    pub fn files(&self) -> Vec<&str> {
        self.current_dir().files.keys().map(String::as_str).collect()
    }

    /// Names of the subdirectories of the current directory, sorted.
    pub fn subdirectories(&self) -> Vec<&str> {
        self.current_dir().subdirs.keys().map(String::as_str).collect()
    }

    pub fn current_path(&self) -> String {
        self.tree.path(self.cwd)
    }

    /// Creates `name` in the current directory holding `data`.
    ///
    /// # Errors
    ///
    /// `NameAlreadyUsed` if a file of that name exists here, `InsufficientSpace`
    /// if the data rounded up to whole blocks does not fit.
    pub fn create_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(FsError::InvalidArgument(format!(
                "\"{}\" is not a valid file name",
                name
            )));
        }
        if self.current_dir().files.contains_key(name) {
            return Err(FsError::NameAlreadyUsed(name.to_string()));
        }

        let alloc = self.fs.create_file_storage(data.len())?;
        if let Err(e) = self.fs.write_file_data(alloc.head, data) {
            self.fs.delete_file_storage(alloc.head);
            return Err(e);
        }

        let record = FileRecord {
            name: name.to_string(),
            size: data.len(),
            rounded_size: alloc.rounded_size,
            head: alloc.head,
        };
        self.tree
            .get_mut(self.cwd)
            .files
            .insert(name.to_string(), record);
        info!("Created file \"{}\" in \"{}\".", name, self.current_path());
        Ok(())
    }

    pub fn file(&self, name: &str) -> Result<&FileRecord> {
        self.current_dir()
            .files
            .get(name)
            .ok_or_else(|| FsError::DoesNotExist(name.to_string()))
    }

    /// Contents of `name` trimmed to its logical size.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let record = self.file(name)?;
        let mut content = self.fs.read_file_data(record.head)?;
        content.truncate(record.size);
        Ok(content)
    }

    /// Releases the storage of `name` and removes it from the current directory.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let record = self
            .tree
            .get_mut(self.cwd)
            .files
            .remove(name)
            .ok_or_else(|| FsError::DoesNotExist(name.to_string()))?;
        self.fs.delete_file_storage(record.head);
        info!("Deleted file \"{}\" from \"{}\".", name, self.current_path());
        Ok(())
    }

    /// Shrinks `name` to `new_size` bytes, releasing its trailing blocks.
    ///
    /// # Errors
    ///
    /// `InvalidSize` unless at least one whole block is freed.
    pub fn truncate_file(&mut self, name: &str, new_size: usize) -> Result<()> {
        let head = self.file(name)?.head;
        let alloc = self.fs.truncate_file_storage(head, new_size)?;

        if let Some(record) = self.tree.get_mut(self.cwd).files.get_mut(name) {
            record.size = new_size;
            record.rounded_size = alloc.rounded_size;
            record.head = alloc.head;
        }
        Ok(())
    }

    pub fn create_dir(&mut self, name: &str) -> Result<()> {
        self.tree.create_dir(self.cwd, name)?;
        info!(
            "Created directory \"{}\" in \"{}\".",
            name,
            self.current_path()
        );
        Ok(())
    }

    pub fn enter_dir(&mut self, name: &str) -> Result<()> {
        self.cwd = self
            .tree
            .child(self.cwd, name)
            .ok_or_else(|| FsError::DoesNotExist(name.to_string()))?;
        Ok(())
    }

    pub fn exit_dir(&mut self) -> Result<()> {
        self.cwd = self.tree.parent(self.cwd).ok_or(FsError::AtRoot)?;
        Ok(())
    }

    pub fn enter_root(&mut self) {
        self.cwd = self.tree.root();
    }

    /// Runs the engine consistency check against every file in the tree.
    pub fn verify(&self) -> Result<()> {
        let heads: Vec<Option<BlockNumber>> =
            self.tree.all_files().iter().map(|f| f.head).collect();
        self.fs.check_consistency(&heads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryDiskBuilder;

    fn small_manager(blocks: usize) -> FileManager<MemoryDisk> {
        let dev = MemoryDiskBuilder::new()
            .with_block_size(8)
            .with_block_count(blocks)
            .build()
            .unwrap();
        FileManager::new(dev).unwrap()
    }

    #[test]
    fn created_file_reads_back_trimmed() {
        let mut fm = FileManager::with_defaults().unwrap();
        fm.create_file("notes", b"twelve bytes").unwrap();

        assert_eq!(fm.read_file("notes").unwrap(), b"twelve bytes".to_vec());
        let record = fm.file("notes").unwrap();
        assert_eq!(record.size, 12);
        assert_eq!(record.rounded_size, 16);
        fm.verify().unwrap();
    }

    #[test]
    fn duplicate_file_name_is_rejected_without_allocating() {
        let mut fm = small_manager(8);
        fm.create_file("a", b"x").unwrap();
        let free = fm.engine().free_space();

        match fm.create_file("a", b"y") {
            Err(FsError::NameAlreadyUsed(name)) => assert_eq!(name, "a"),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(fm.engine().free_space(), free);
    }

    #[test]
    fn file_too_large_is_rejected() {
        let mut fm = small_manager(2);
        match fm.create_file("big", &[1; 17]) {
            Err(FsError::InsufficientSpace { .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(fm.file("big").is_err());
    }

    #[test]
    fn delete_frees_space_and_record() {
        let mut fm = small_manager(8);
        fm.create_file("a", &[7; 20]).unwrap();
        fm.delete_file("a").unwrap();

        assert_eq!(fm.engine().free_space(), 64);
        assert!(fm.current_dir().files.is_empty());
        match fm.delete_file("a") {
            Err(FsError::DoesNotExist(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
        fm.verify().unwrap();
    }

    #[test]
    fn truncate_updates_record() {
        let mut fm = small_manager(8);
        fm.create_file("a", b"0123456789abcdefXYZ").unwrap();
        fm.truncate_file("a", 10).unwrap();

        let record = fm.file("a").unwrap();
        assert_eq!(record.size, 10);
        assert_eq!(record.rounded_size, 16);
        assert_eq!(fm.read_file("a").unwrap(), b"0123456789".to_vec());
        assert!(fm.truncate_file("a", 9).is_err());
        fm.verify().unwrap();
    }

    #[test]
    fn navigation_tracks_current_path() {
        let mut fm = small_manager(8);
        fm.create_dir("docs").unwrap();
        fm.enter_dir("docs").unwrap();
        fm.create_dir("old").unwrap();
        fm.enter_dir("old").unwrap();
        assert_eq!(fm.current_path(), "/root/docs/old");

        fm.exit_dir().unwrap();
        assert_eq!(fm.current_path(), "/root/docs");
        fm.enter_root();
        assert_eq!(fm.current_path(), "/root");
        match fm.exit_dir() {
            Err(FsError::AtRoot) => (),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(fm.enter_dir("missing").is_err());
    }

    #[test]
    fn listings_show_current_directory_only() {
        let mut fm = small_manager(8);
        fm.create_file("b", b"2").unwrap();
        fm.create_file("a", b"1").unwrap();
        fm.create_dir("zeta").unwrap();
        fm.create_dir("alpha").unwrap();

        assert_eq!(fm.files(), vec!["a", "b"]);
        assert_eq!(fm.subdirectories(), vec!["alpha", "zeta"]);

        fm.enter_dir("zeta").unwrap();
        assert!(fm.files().is_empty());
        assert!(fm.subdirectories().is_empty());
    }

    #[test]
    fn files_are_scoped_to_their_directory() {
        let mut fm = small_manager(8);
        fm.create_file("a", b"root").unwrap();
        fm.create_dir("sub").unwrap();
        fm.enter_dir("sub").unwrap();
        fm.create_file("a", b"sub").unwrap();

        assert_eq!(fm.read_file("a").unwrap(), b"sub".to_vec());
        fm.exit_dir().unwrap();
        assert_eq!(fm.read_file("a").unwrap(), b"root".to_vec());
        fm.verify().unwrap();
    }
}
