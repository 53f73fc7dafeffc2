//! A jammdb store mounted as a filesystem.
//!
//! Top-level buckets are directories under the mount root, nested buckets
//! are subdirectories and keys are regular files holding their values.
//! Every filesystem operation runs inside exactly one store transaction.

// Name mapping and the per-operation transaction
pub mod codec;
pub mod common;
pub mod transaction;

// Nodes
mod dir;
mod file;
pub mod inode;
mod root;

pub mod config;
mod fs_type;

#[cfg(feature = "fuse")]
pub mod fuse;


pub use codec::{decode_key, encode_key};
pub use common::{DirEntry, FsAttr, FsError, FsFileType, FsPermission, FsResult};
pub use config::MountConfig;
pub use dir::{rename, Dir};
pub use file::File;
pub use fs_type::Dbfs;
pub use inode::{Node, NodeId};
pub use root::Root;
pub use transaction::{BucketPath, Store};
