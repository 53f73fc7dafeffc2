//! Error taxonomy and attribute types shared by every node kind

use bitflags::bitflags;
use log::warn;

/// Inode number the kernel reserves for the mount root.
pub const ROOT_INO: u64 = 1;

pub const DEFAULT_DIR_PERM: u32 = 0o755;
pub const DEFAULT_FILE_PERM: u32 = 0o644;

/// Largest value a write or truncate may grow a key to.
pub const MAX_VALUE_SIZE: u64 = 1 << 30;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum FsError {
    #[error("name is not a valid encoded key")]
    InvalidName,
    #[error("no such namespace or key")]
    NotFound,
    #[error("namespace or key already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("operation not permitted")]
    NotPermitted,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("value would exceed the maximum size")]
    FileTooLarge,
    #[error("store failure: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl FsError {
    /// The OS error number the transport replies with.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::InvalidName | FsError::InvalidArgument | FsError::Config(_) => libc::EINVAL,
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::NotPermitted => libc::EPERM,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::Store(_) => libc::EIO,
        }
    }
}

impl From<jammdb::Error> for FsError {
    fn from(e: jammdb::Error) -> Self {
        match e {
            jammdb::Error::BucketMissing | jammdb::Error::KeyValueMissing => FsError::NotFound,
            jammdb::Error::BucketExists => FsError::AlreadyExists,
            jammdb::Error::IncompatibleValue => FsError::IsADirectory,
            other => {
                warn!("store error: {}", other);
                FsError::Store(other.to_string())
            }
        }
    }
}

bitflags! {
    pub struct FsPermission: u32 {
        const S_IFMT = 0o170000;
        const S_IFDIR = 0o040000;
        const S_IFREG = 0o100000;

        const S_IRWXU = 0o700;
        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;

        const S_IRWXG = 0o070;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;

        const S_IRWXO = 0o007;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;
    }
}

impl FsPermission {
    pub fn dir() -> Self {
        FsPermission::S_IFDIR | FsPermission::from_bits_truncate(DEFAULT_DIR_PERM)
    }

    pub fn file() -> Self {
        FsPermission::S_IFREG | FsPermission::from_bits_truncate(DEFAULT_FILE_PERM)
    }

    /// Permission bits without the file type.
    pub fn perm(&self) -> u16 {
        (self.bits() & 0o7777) as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsFileType {
    Directory,
    RegularFile,
}

impl FsFileType {
    pub fn is_dir(&self) -> bool {
        matches!(self, FsFileType::Directory)
    }
}

/// Metadata a node reports. Inode numbers are the transport's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsAttr {
    pub kind: FsFileType,
    pub size: u64,
    pub mode: FsPermission,
    pub hard_links: u32,
}

impl FsAttr {
    pub fn dir() -> Self {
        Self {
            kind: FsFileType::Directory,
            size: 0,
            mode: FsPermission::dir(),
            hard_links: 2,
        }
    }

    pub fn file(size: u64) -> Self {
        Self {
            kind: FsFileType::RegularFile,
            size,
            mode: FsPermission::file(),
            hard_links: 1,
        }
    }
}

/// One listing entry: an encoded name and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FsFileType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists.errno(), libc::EEXIST);
        assert_eq!(FsError::NotADirectory.errno(), libc::ENOTDIR);
        assert_eq!(FsError::IsADirectory.errno(), libc::EISDIR);
        assert_eq!(FsError::FileTooLarge.errno(), libc::EFBIG);
        assert_eq!(FsError::Store("boom".into()).errno(), libc::EIO);
    }

    #[test]
    fn default_modes() {
        let dir = FsPermission::dir();
        assert!(dir.contains(FsPermission::S_IFDIR));
        assert_eq!(dir.perm(), 0o755);
        let file = FsPermission::file();
        assert!(file.contains(FsPermission::S_IFREG));
        assert_eq!(file.perm(), 0o644);
    }

    #[test]
    fn store_errors_convert() {
        assert_eq!(FsError::from(jammdb::Error::BucketMissing), FsError::NotFound);
        assert_eq!(FsError::from(jammdb::Error::BucketExists), FsError::AlreadyExists);
    }
}
