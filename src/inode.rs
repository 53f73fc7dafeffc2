//! Node kinds and the operations they share.
//!
//! Dispatch is a plain `match` over a closed set of variants. Asking a node
//! for an operation its kind does not support yields `NotADirectory` or
//! `IsADirectory`, the same as the kernel would.

use crate::{
    codec::decode_key,
    common::{DirEntry, FsAttr, FsError, FsFileType, FsResult},
    dir::{self, Dir},
    file::File,
    root::Root,
    transaction::{BucketPath, Store},
};

/// Everything that identifies a node. Two nodes with equal ids are the same
/// node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Root,
    Dir(BucketPath),
    File(BucketPath, Vec<u8>),
}

#[derive(Clone)]
pub enum Node {
    Root(Root),
    Dir(Dir),
    File(File),
}

impl Node {
    /// Rebuild a node from its identity. No store access.
    pub fn from_id(store: &Store, id: &NodeId) -> Self {
        match id {
            NodeId::Root => Node::Root(Root::new(store.clone())),
            NodeId::Dir(path) => Node::Dir(Dir::new(store.clone(), path.clone())),
            NodeId::File(path, key) => {
                Node::File(File::new(store.clone(), path.clone(), key.clone()))
            }
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Node::Root(_) => NodeId::Root,
            Node::Dir(dir) => NodeId::Dir(dir.path().clone()),
            Node::File(file) => NodeId::File(file.path().clone(), file.key().to_vec()),
        }
    }

    pub fn kind(&self) -> FsFileType {
        match self {
            Node::Root(_) | Node::Dir(_) => FsFileType::Directory,
            Node::File(_) => FsFileType::RegularFile,
        }
    }

    /// Path of the bucket this node is, for directories.
    fn bucket_path(&self) -> FsResult<BucketPath> {
        match self {
            Node::Root(_) => Ok(BucketPath::root()),
            Node::Dir(dir) => Ok(dir.path().clone()),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    /// Identity of an entry this directory listed.
    pub fn child_id(&self, entry: &DirEntry) -> FsResult<NodeId> {
        let raw = decode_key(&entry.name)?;
        let path = self.bucket_path()?;
        Ok(match entry.kind {
            FsFileType::Directory => NodeId::Dir(path.child(&raw)),
            FsFileType::RegularFile => NodeId::File(path, raw),
        })
    }

    pub fn attr(&self) -> FsResult<FsAttr> {
        match self {
            Node::Root(root) => Ok(root.attr()),
            Node::Dir(dir) => dir.attr(),
            Node::File(file) => file.attr(),
        }
    }

    pub fn readdir(&self) -> FsResult<Vec<DirEntry>> {
        match self {
            Node::Root(root) => root.readdir(),
            Node::Dir(dir) => dir.readdir(),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub fn lookup(&self, name: &str) -> FsResult<Node> {
        match self {
            Node::Root(root) => root.lookup(name).map(Node::Dir),
            Node::Dir(dir) => dir.lookup(name),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub fn create(&self, name: &str, kind: FsFileType) -> FsResult<Node> {
        match self {
            Node::Root(root) => root.create(name, kind).map(Node::Dir),
            Node::Dir(dir) => dir.create(name, kind),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    pub fn remove(&self, name: &str, is_dir: bool) -> FsResult<()> {
        match self {
            Node::Root(root) => root.remove(name, is_dir),
            Node::Dir(dir) => dir.remove(name, is_dir),
            Node::File(_) => Err(FsError::NotADirectory),
        }
    }

    fn store(&self) -> &Store {
        match self {
            Node::Root(root) => root.store(),
            Node::Dir(dir) => dir.store(),
            Node::File(file) => file.store(),
        }
    }

    /// Move the child `name` of this directory to `new_name` under
    /// `new_parent`, returning the kind of what was moved.
    pub fn rename(&self, name: &str, new_parent: &Node, new_name: &str) -> FsResult<FsFileType> {
        let parent = self.bucket_path()?;
        let new_parent = new_parent.bucket_path()?;
        dir::rename(self.store(), &parent, name, &new_parent, new_name)
    }

    pub fn read(&self, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        match self {
            Node::File(file) => file.read(offset, len),
            _ => Err(FsError::IsADirectory),
        }
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        match self {
            Node::File(file) => file.write(offset, data),
            _ => Err(FsError::IsADirectory),
        }
    }

    pub fn truncate(&self, size: u64) -> FsResult<()> {
        match self {
            Node::File(file) => file.truncate(size),
            _ => Err(FsError::IsADirectory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_compare_by_path() {
        let a = NodeId::Dir(BucketPath::root().child(b"users"));
        let b = NodeId::Dir(BucketPath::from(vec![b"users".to_vec()]));
        assert_eq!(a, b);
        assert_ne!(a, NodeId::File(BucketPath::root(), b"users".to_vec()));
    }
}
