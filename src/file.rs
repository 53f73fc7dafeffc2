//! A single key, shown as a regular file whose contents are the value.

use core::cmp::min;

use log::debug;

use crate::{
    common::{FsAttr, FsError, FsResult, MAX_VALUE_SIZE},
    transaction::{BucketPath, Container, Store},
};

#[derive(Clone)]
pub struct File {
    store: Store,
    path: BucketPath,
    key: Vec<u8>,
}

impl File {
    pub fn new(store: Store, path: BucketPath, key: Vec<u8>) -> Self {
        Self { store, path, key }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Bucket holding the key.
    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn attr(&self) -> FsResult<FsAttr> {
        self.store.view(|tx| {
            let value = Container::open(tx, &self.path)?.value(&self.key)?;
            Ok(FsAttr::file(value.len() as u64))
        })
    }

    /// Up to `len` bytes starting at `offset`; short or empty past the end.
    pub fn read(&self, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        self.store.view(|tx| {
            let value = Container::open(tx, &self.path)?.value(&self.key)?;
            let start = min(offset, value.len() as u64) as usize;
            let end = min(start.saturating_add(len), value.len());
            Ok(value[start..end].to_vec())
        })
    }

    /// Overwrite at `offset`, zero-filling any gap past the current end.
    pub fn write(&self, offset: u64, data: &[u8]) -> FsResult<usize> {
        let end = value_len(offset.checked_add(data.len() as u64))?;
        let start = end - data.len();
        self.store.update(|tx| {
            let container = Container::open(tx, &self.path)?;
            let mut value = container.value(&self.key)?;
            if value.len() < end {
                value.resize(end, 0);
            }
            value[start..end].copy_from_slice(data);
            container.put(&self.key, value)?;
            Ok(data.len())
        })
    }

    pub fn truncate(&self, size: u64) -> FsResult<()> {
        let len = value_len(Some(size))?;
        self.store.update(|tx| {
            let container = Container::open(tx, &self.path)?;
            let mut value = container.value(&self.key)?;
            value.resize(len, 0);
            container.put(&self.key, value)
        })?;
        debug!("truncated {:?} in {:?} to {}", self.key, self.path, size);
        Ok(())
    }
}

/// Checked length of a value after a write or truncate.
fn value_len(len: Option<u64>) -> FsResult<usize> {
    len.filter(|len| *len <= MAX_VALUE_SIZE)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or(FsError::FileTooLarge)
}
