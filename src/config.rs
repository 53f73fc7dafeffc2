//! Mount options, optionally read from a JSON file.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::common::{FsError, FsResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountConfig {
    /// Name shown as the mount source.
    pub fsname: String,
    pub read_only: bool,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// How long the kernel may cache attributes and entries.
    pub attr_ttl_ms: u64,
    /// Owner reported for every node; the mounting user when unset.
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fsname: "bucketfs".to_string(),
            read_only: false,
            allow_other: false,
            auto_unmount: false,
            attr_ttl_ms: 1000,
            uid: None,
            gid: None,
        }
    }
}

impl MountConfig {
    pub fn from_json(text: &str) -> FsResult<Self> {
        serde_json::from_str(text).map_err(|e| FsError::Config(format!("bad config: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> FsResult<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            FsError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_millis(self.attr_ttl_ms)
    }
}
