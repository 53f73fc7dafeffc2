//! The store itself. Its children are the top-level buckets; it never holds
//! keys of its own.

use log::debug;

use crate::{
    codec::{decode_key, encode_key},
    common::{DirEntry, FsAttr, FsError, FsFileType, FsResult},
    dir::Dir,
    transaction::{BucketPath, Store},
};

#[derive(Clone)]
pub struct Root {
    store: Store,
}

impl Root {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// The root always exists, so no transaction is needed.
    pub fn attr(&self) -> FsAttr {
        FsAttr::dir()
    }

    pub fn readdir(&self) -> FsResult<Vec<DirEntry>> {
        self.store.view(|tx| {
            Ok(tx
                .buckets()
                .map(|(name, _)| DirEntry {
                    name: encode_key(name.name()),
                    kind: FsFileType::Directory,
                })
                .collect())
        })
    }

    pub fn lookup(&self, name: &str) -> FsResult<Dir> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        self.store.view(|tx| {
            tx.get_bucket(raw.clone()).map_err(|_| FsError::NotFound)?;
            Ok(())
        })?;
        Ok(Dir::new(self.store.clone(), BucketPath::root().child(&raw)))
    }

    /// Make a new top-level bucket. Keys cannot live at the root.
    pub fn mkdir(&self, name: &str) -> FsResult<Dir> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        self.store.update(|tx| {
            if tx.get_bucket(raw.clone()).is_ok() {
                return Err(FsError::AlreadyExists);
            }
            tx.create_bucket(raw.clone())?;
            Ok(())
        })?;
        debug!("created bucket {:?}", name);
        Ok(Dir::new(self.store.clone(), BucketPath::root().child(&raw)))
    }

    pub fn create(&self, name: &str, kind: FsFileType) -> FsResult<Dir> {
        match kind {
            FsFileType::Directory => self.mkdir(name),
            FsFileType::RegularFile => Err(FsError::NotPermitted),
        }
    }

    pub fn remove(&self, name: &str, is_dir: bool) -> FsResult<()> {
        let raw = decode_key(name).map_err(|_| FsError::NotFound)?;
        if !is_dir {
            // no files at root
            return Err(FsError::NotFound);
        }
        self.store.update(|tx| {
            if tx.get_bucket(raw.clone()).is_err() {
                return Err(FsError::NotFound);
            }
            tx.delete_bucket(raw.clone())?;
            Ok(())
        })?;
        debug!("deleted bucket {:?}", name);
        Ok(())
    }
}
