//! One store transaction per filesystem operation.
//!
//! [`Store::view`] and [`Store::update`] open a jammdb transaction, hand it
//! to a closure and either commit (update, on `Ok`) or drop it, which rolls
//! every change back. Nodes never hold a transaction between calls.

use std::path::Path;

use jammdb::{Bucket, Data, Tx, DB};
use log::{debug, info};
use smallvec::SmallVec;

use crate::common::{FsError, FsFileType, FsResult};

/// Chain of raw bucket names from the top level down to one namespace.
/// The empty path is the store root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BucketPath(SmallVec<[Vec<u8>; 4]>);

impl BucketPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &[u8]) -> Self {
        let mut path = self.clone();
        path.0.push(name.to_vec());
        path
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.0
    }

    /// True when `self` is `other` or lies somewhere beneath it.
    pub fn starts_with(&self, other: &BucketPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Swap the leading `from` for `to`; `None` when `self` is not under
    /// `from`.
    pub fn rebase(&self, from: &BucketPath, to: &BucketPath) -> Option<BucketPath> {
        let rest = self.0.strip_prefix(from.0.as_slice())?;
        let mut path = to.clone();
        path.0.extend(rest.iter().cloned());
        Some(path)
    }
}

impl From<Vec<Vec<u8>>> for BucketPath {
    fn from(names: Vec<Vec<u8>>) -> Self {
        Self(names.into_iter().collect())
    }
}

/// Shared handle to the open store.
#[derive(Clone)]
pub struct Store {
    db: DB,
}

impl Store {
    /// Open the store file, creating it when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let path = path.as_ref();
        let db = DB::open(path)?;
        info!("opened store {}", path.display());
        Ok(Self { db })
    }

    /// Run `f` inside a read-only transaction.
    pub fn view<T, F>(&self, f: F) -> FsResult<T>
    where
        F: FnOnce(&Tx<'_>) -> FsResult<T>,
    {
        let tx = self.db.tx(false)?;
        f(&tx)
    }

    /// Run `f` inside a read-write transaction, committing only on success.
    pub fn update<T, F>(&self, f: F) -> FsResult<T>
    where
        F: FnOnce(&Tx<'_>) -> FsResult<T>,
    {
        let tx = self.db.tx(true)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                debug!("rolling back write transaction: {}", e);
                Err(e)
            }
        }
    }
}

/// Walk from the top level down `path`. Fails `NotFound` if any namespace
/// along the way is gone.
pub fn navigate<'b, 'tx>(tx: &'b Tx<'tx>, path: &BucketPath) -> FsResult<Bucket<'b, 'tx>> {
    let (first, rest) = path.components().split_first().ok_or(FsError::NotFound)?;
    let mut bucket = tx.get_bucket(first.clone()).map_err(|_| FsError::NotFound)?;
    for name in rest {
        bucket = bucket.get_bucket(name.clone()).map_err(|_| FsError::NotFound)?;
    }
    Ok(bucket)
}

/// Either the transaction itself (the root, which only holds buckets) or a
/// bucket somewhere below it.
pub enum Container<'b, 'tx> {
    Top(&'b Tx<'tx>),
    Nested(Bucket<'b, 'tx>),
}

impl<'b, 'tx> Container<'b, 'tx> {
    pub fn open(tx: &'b Tx<'tx>, path: &BucketPath) -> FsResult<Self> {
        if path.is_root() {
            Ok(Container::Top(tx))
        } else {
            navigate(tx, path).map(Container::Nested)
        }
    }

    /// What lives under `name`, if anything.
    pub fn kind_of(&self, name: &[u8]) -> Option<FsFileType> {
        match self {
            Container::Top(tx) => tx
                .get_bucket(name.to_vec())
                .ok()
                .map(|_| FsFileType::Directory),
            Container::Nested(bucket) => match bucket.get(name.to_vec()) {
                Some(Data::Bucket(_)) => Some(FsFileType::Directory),
                Some(Data::KeyValue(_)) => Some(FsFileType::RegularFile),
                None => None,
            },
        }
    }

    pub fn bucket(&self, name: &[u8]) -> FsResult<Bucket<'b, 'tx>> {
        let bucket = match self {
            Container::Top(tx) => tx.get_bucket(name.to_vec()),
            Container::Nested(bucket) => bucket.get_bucket(name.to_vec()),
        };
        bucket.map_err(|_| FsError::NotFound)
    }

    pub fn create_bucket(&self, name: &[u8]) -> FsResult<Bucket<'b, 'tx>> {
        let bucket = match self {
            Container::Top(tx) => tx.create_bucket(name.to_vec())?,
            Container::Nested(bucket) => bucket.create_bucket(name.to_vec())?,
        };
        Ok(bucket)
    }

    /// Delete a nested bucket and everything inside it.
    pub fn delete_bucket(&self, name: &[u8]) -> FsResult<()> {
        match self {
            Container::Top(tx) => tx.delete_bucket(name.to_vec())?,
            Container::Nested(bucket) => bucket.delete_bucket(name.to_vec())?,
        }
        Ok(())
    }

    pub fn value(&self, key: &[u8]) -> FsResult<Vec<u8>> {
        match self {
            Container::Top(_) => Err(FsError::NotFound),
            Container::Nested(bucket) => match bucket.get(key.to_vec()) {
                Some(Data::KeyValue(kv)) => Ok(kv.value().to_vec()),
                Some(Data::Bucket(_)) => Err(FsError::IsADirectory),
                None => Err(FsError::NotFound),
            },
        }
    }

    pub fn put(&self, key: &[u8], value: Vec<u8>) -> FsResult<()> {
        match self {
            Container::Top(_) => Err(FsError::NotPermitted),
            Container::Nested(bucket) => {
                bucket.put(key.to_vec(), value)?;
                Ok(())
            }
        }
    }

    pub fn delete(&self, key: &[u8]) -> FsResult<()> {
        match self {
            Container::Top(_) => Err(FsError::NotFound),
            Container::Nested(bucket) => {
                bucket.delete(key.to_vec())?;
                Ok(())
            }
        }
    }
}

/// Copy every key and nested bucket of `src` into `dst`, depth first.
pub fn copy_bucket(src: &Bucket<'_, '_>, dst: &Bucket<'_, '_>) -> FsResult<()> {
    let mut children = Vec::new();
    let mut values = Vec::new();
    for data in src.cursor() {
        match data {
            Data::Bucket(b) => children.push(b.name().to_vec()),
            Data::KeyValue(kv) => values.push((kv.key().to_vec(), kv.value().to_vec())),
        }
    }
    for (key, value) in values {
        dst.put(key, value)?;
    }
    for name in children {
        let from = src.get_bucket(name.clone())?;
        let to = dst.create_bucket(name)?;
        copy_bucket(&from, &to)?;
    }
    Ok(())
}

/// True when the bucket holds neither keys nor nested buckets.
pub fn is_empty(bucket: &Bucket<'_, '_>) -> bool {
    bucket.cursor().next().is_none()
}
