//! A bucket at some depth, shown as a directory.
//!
//! Nested buckets become subdirectories and keys become regular files. The
//! node only remembers its path; every call walks down from the top level
//! again inside its own transaction.

use jammdb::Data;
use log::debug;

use crate::{
    codec::{decode_key, encode_key},
    common::{DirEntry, FsAttr, FsError, FsFileType, FsResult},
    file::File,
    inode::Node,
    transaction::{copy_bucket, is_empty, navigate, BucketPath, Container, Store},
};

#[derive(Clone)]
pub struct Dir {
    store: Store,
    path: BucketPath,
}

impl Dir {
    pub fn new(store: Store, path: BucketPath) -> Self {
        Self { store, path }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    /// Fails `NotFound` once the bucket has been removed.
    pub fn attr(&self) -> FsResult<FsAttr> {
        self.store.view(|tx| navigate(tx, &self.path).map(|_| FsAttr::dir()))
    }

    pub fn readdir(&self) -> FsResult<Vec<DirEntry>> {
        self.store.view(|tx| {
            let bucket = navigate(tx, &self.path)?;
            let entries = bucket
                .cursor()
                .map(|data| match data {
                    Data::Bucket(b) => DirEntry {
                        name: encode_key(b.name()),
                        kind: FsFileType::Directory,
                    },
                    Data::KeyValue(kv) => DirEntry {
                        name: encode_key(kv.key()),
                        kind: FsFileType::RegularFile,
                    },
                })
                .collect();
            Ok(entries)
        })
    }

    pub fn lookup(&self, name: &str) -> FsResult<Node> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        let kind = self.store.view(|tx| {
            Container::open(tx, &self.path)?
                .kind_of(&raw)
                .ok_or(FsError::NotFound)
        })?;
        Ok(self.child(raw, kind))
    }

    /// Create a nested bucket or an empty key. Either way an existing entry
    /// of the same name is left alone and `AlreadyExists` is returned.
    pub fn create(&self, name: &str, kind: FsFileType) -> FsResult<Node> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        self.store.update(|tx| {
            let container = Container::open(tx, &self.path)?;
            if container.kind_of(&raw).is_some() {
                return Err(FsError::AlreadyExists);
            }
            match kind {
                FsFileType::Directory => container.create_bucket(&raw).map(|_| ()),
                FsFileType::RegularFile => container.put(&raw, Vec::new()),
            }
        })?;
        debug!("created {:?} {:?} in {:?}", kind, name, self.path);
        Ok(self.child(raw, kind))
    }

    pub fn remove(&self, name: &str, is_dir: bool) -> FsResult<()> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        self.store.update(|tx| {
            let container = Container::open(tx, &self.path)?;
            match (container.kind_of(&raw), is_dir) {
                (None, _) => Err(FsError::NotFound),
                (Some(FsFileType::Directory), true) => container.delete_bucket(&raw),
                (Some(FsFileType::RegularFile), false) => container.delete(&raw),
                (Some(FsFileType::RegularFile), true) => Err(FsError::NotADirectory),
                (Some(FsFileType::Directory), false) => Err(FsError::IsADirectory),
            }
        })?;
        debug!("removed {:?} from {:?}", name, self.path);
        Ok(())
    }

    fn child(&self, raw: Vec<u8>, kind: FsFileType) -> Node {
        match kind {
            FsFileType::Directory => {
                Node::Dir(Dir::new(self.store.clone(), self.path.child(&raw)))
            }
            FsFileType::RegularFile => {
                Node::File(File::new(self.store.clone(), self.path.clone(), raw))
            }
        }
    }
}

/// Move `name` under `parent` to `new_name` under `new_parent` in a single
/// write transaction. Either path may be the store root. Returns the kind of
/// the moved entry.
pub fn rename(
    store: &Store,
    parent: &BucketPath,
    name: &str,
    new_parent: &BucketPath,
    new_name: &str,
) -> FsResult<FsFileType> {
    let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
    let new_raw = decode_key(new_name).map_err(|_| FsError::NotFound)?;
    if parent == new_parent && raw == new_raw {
        return store.view(|tx| {
            Container::open(tx, parent)?
                .kind_of(&raw)
                .ok_or(FsError::NotFound)
        });
    }
    let kind = store.update(|tx| {
        let src = Container::open(tx, parent)?;
        let dst = Container::open(tx, new_parent)?;
        let kind = src.kind_of(&raw).ok_or(FsError::NotFound)?;
        match kind {
            FsFileType::RegularFile => {
                match dst.kind_of(&new_raw) {
                    Some(FsFileType::Directory) => return Err(FsError::IsADirectory),
                    Some(FsFileType::RegularFile) => dst.delete(&new_raw)?,
                    None => {}
                }
                let value = src.value(&raw)?;
                dst.put(&new_raw, value)?;
                src.delete(&raw)?;
            }
            FsFileType::Directory => {
                if new_parent.starts_with(&parent.child(&raw)) {
                    return Err(FsError::InvalidArgument);
                }
                match dst.kind_of(&new_raw) {
                    Some(FsFileType::RegularFile) => return Err(FsError::NotADirectory),
                    Some(FsFileType::Directory) => {
                        if !is_empty(&dst.bucket(&new_raw)?) {
                            return Err(FsError::NotEmpty);
                        }
                        dst.delete_bucket(&new_raw)?;
                    }
                    None => {}
                }
                let from = src.bucket(&raw)?;
                let to = dst.create_bucket(&new_raw)?;
                copy_bucket(&from, &to)?;
                src.delete_bucket(&raw)?;
            }
        }
        Ok(kind)
    })?;
    debug!(
        "renamed {:?} in {:?} to {:?} in {:?}",
        name, parent, new_name, new_parent
    );
    Ok(kind)
}
