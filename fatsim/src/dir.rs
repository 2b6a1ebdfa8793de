use crate::fs::{FsError, Result};
use crate::io::BlockNumber;

use std::collections::BTreeMap;

const ROOT_NAME: &str = "root";

/// Handle to a directory inside a [`DirectoryTree`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct DirId(usize);

impl DirId {
    pub const ROOT: DirId = DirId(0);
}

/// Logical file metadata, kept apart from the bytes on disk.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileRecord {
    pub name: String,
    /// Size in bytes as written by the caller.
    pub size: usize,
    /// `size` rounded up to whole blocks.
    pub rounded_size: usize,
    /// First block of the chain, `None` for an empty file.
    pub head: Option<BlockNumber>,
}

#[derive(Debug, Clone)]
pub struct Directory {
    pub name: String,
    pub parent: Option<DirId>,
    pub files: BTreeMap<String, FileRecord>,
    pub subdirs: BTreeMap<String, DirId>,
}

impl Directory {
    fn new(name: &str, parent: Option<DirId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            files: BTreeMap::new(),
            subdirs: BTreeMap::new(),
        }
    }
}

/// Every directory lives in one arena and refers to its parent and children
/// by [`DirId`]. Directories are never removed, so handles stay valid for the
/// life of the tree.
#[derive(Debug, Clone)]
pub struct DirectoryTree {
    nodes: Vec<Directory>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Directory::new(ROOT_NAME, None)],
        }
    }

    pub fn root(&self) -> DirId {
        DirId::ROOT
    }

    pub fn get(&self, id: DirId) -> &Directory {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: DirId) -> &mut Directory {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds an empty subdirectory `name` under `parent`.
    pub fn create_dir(&mut self, parent: DirId, name: &str) -> Result<DirId> {
        if name.is_empty() || name.contains('/') {
            return Err(FsError::InvalidArgument(format!(
                "\"{}\" is not a valid directory name",
                name
            )));
        }
        if self.get(parent).subdirs.contains_key(name) {
            return Err(FsError::NameAlreadyUsed(name.to_string()));
        }
        let id = DirId(self.nodes.len());
        self.nodes.push(Directory::new(name, Some(parent)));
        self.get_mut(parent).subdirs.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn child(&self, parent: DirId, name: &str) -> Option<DirId> {
        self.get(parent).subdirs.get(name).copied()
    }

    pub fn parent(&self, id: DirId) -> Option<DirId> {
        self.get(id).parent
    }

    /// Absolute path of `id`, e.g. `/root/docs/old`.
    pub fn path(&self, id: DirId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(dir) = cursor {
            names.push(self.get(dir).name.as_str());
            cursor = self.parent(dir);
        }
        names.iter().rev().fold(String::new(), |mut path, name| {
            path.push('/');
            path.push_str(name);
            path
        })
    }

    /// Every file record in the tree, depth first.
    pub fn all_files(&self) -> Vec<&FileRecord> {
        let mut files = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let dir = self.get(id);
            files.extend(dir.files.values());
            stack.extend(dir.subdirs.values().rev());
        }
        files
    }
}
