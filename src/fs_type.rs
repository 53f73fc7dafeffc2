//! Filesystem driver: owns the store handle for the lifetime of a mount.

use std::path::Path;

use log::{error, info};

use crate::{
    common::FsResult,
    inode::{Node, NodeId},
    root::Root,
    transaction::Store,
};

#[derive(Clone)]
pub struct Dbfs {
    store: Store,
}

impl Dbfs {
    /// Open (or create) the store file backing the mount.
    pub fn open<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let store = Store::open(path.as_ref()).map_err(|e| {
            error!("cannot open store {}: {}", path.as_ref().display(), e);
            e
        })?;
        Ok(Self { store })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn root(&self) -> Root {
        Root::new(self.store.clone())
    }

    pub fn node(&self, id: &NodeId) -> Node {
        Node::from_id(&self.store, id)
    }

    /// Release the store. Nodes still holding a clone of it keep it open
    /// until they are dropped.
    pub fn close(self) {
        info!("closing store");
        drop(self.store);
    }
}
