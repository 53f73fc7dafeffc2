//! FUSE transport: turns kernel requests into node operations.
//!
//! Each request resolves its inode to a node value, runs exactly one node
//! operation (and therefore exactly one store transaction) and replies with
//! the result or the errno of the failure.

mod inode_table;

use std::{
    ffi::OsStr,
    io,
    os::unix::fs::MetadataExt,
    path::Path,
    time::{Duration, SystemTime},
};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite,
    Request, TimeOrNow,
};
use libc::c_int;
use log::{debug, info, warn};

pub use inode_table::InodeTable;

use crate::{
    common::{DirEntry, FsAttr, FsError, FsFileType, FsResult},
    config::MountConfig,
    fs_type::Dbfs,
    inode::Node,
};

const BLOCK_SIZE: u32 = 4096;
const NAME_MAX: u32 = 255;
/// `d_ino` for listed entries the kernel has not looked up yet.
const UNKNOWN_INO: u64 = 0xffff_ffff;

pub struct BucketFuse {
    fs: Dbfs,
    inodes: InodeTable,
    ttl: Duration,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl BucketFuse {
    pub fn new(fs: Dbfs, ttl: Duration, uid: u32, gid: u32) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            ttl,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    fn node(&self, ino: u64) -> FsResult<Node> {
        let id = self.inodes.get(ino).ok_or(FsError::NotFound)?;
        Ok(self.fs.node(id))
    }

    fn file_attr(&self, ino: u64, attr: &FsAttr) -> FileAttr {
        let kind = match attr.kind {
            FsFileType::Directory => FileType::Directory,
            FsFileType::RegularFile => FileType::RegularFile,
        };
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind,
            perm: attr.mode.perm(),
            nlink: attr.hard_links,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Attributes of a freshly resolved child, counted as a kernel lookup.
    fn entry(&mut self, node: &Node) -> FsResult<FileAttr> {
        let attr = node.attr()?;
        let ino = self.inodes.lookup(&node.id());
        Ok(self.file_attr(ino, &attr))
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> FsResult<FileAttr> {
        let child = self.node(parent)?.lookup(name_str(name)?)?;
        self.entry(&child)
    }

    fn do_create(&mut self, parent: u64, name: &OsStr, kind: FsFileType) -> FsResult<FileAttr> {
        let child = self.node(parent)?.create(name_str(name)?, kind)?;
        self.entry(&child)
    }

    fn do_remove(&mut self, parent: u64, name: &OsStr, is_dir: bool) -> FsResult<()> {
        let parent = self.node(parent)?;
        let name = name_str(name)?;
        parent.remove(name, is_dir)?;
        let kind = if is_dir {
            FsFileType::Directory
        } else {
            FsFileType::RegularFile
        };
        self.inodes.release(&parent.child_id(&child(name, kind))?);
        Ok(())
    }

    fn do_rename(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> FsResult<()> {
        let from = self.node(parent)?;
        let to = self.node(newparent)?;
        let (name, newname) = (name_str(name)?, name_str(newname)?);
        let kind = from.rename(name, &to, newname)?;
        let old_id = from.child_id(&child(name, kind))?;
        let new_id = to.child_id(&child(newname, kind))?;
        self.inodes.rename(&old_id, &new_id);
        Ok(())
    }

    fn do_setattr(&mut self, ino: u64, size: Option<u64>) -> FsResult<FileAttr> {
        let node = self.node(ino)?;
        if let Some(size) = size {
            node.truncate(size)?;
        }
        let attr = node.attr()?;
        Ok(self.file_attr(ino, &attr))
    }

    /// Directory entries after `offset`, each paired with the offset that
    /// resumes the listing past it.
    fn do_readdir(&self, ino: u64, offset: i64) -> FsResult<Vec<(u64, i64, FileType, String)>> {
        let node = self.node(ino)?;
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for entry in node.readdir()? {
            let child_ino = self
                .inodes
                .find(&node.child_id(&entry)?)
                .unwrap_or(UNKNOWN_INO);
            let kind = if entry.kind.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((child_ino, kind, entry.name));
        }
        let skip = usize::try_from(offset).map_err(|_| FsError::InvalidArgument)?;
        Ok(entries
            .into_iter()
            .enumerate()
            .skip(skip)
            .map(|(i, (ino, kind, name))| (ino, (i + 1) as i64, kind, name))
            .collect())
    }
}

fn child(name: &str, kind: FsFileType) -> DirEntry {
    DirEntry {
        name: name.to_string(),
        kind,
    }
}

/// Names that are not UTF-8 can never have come from the codec.
fn name_str(name: &OsStr) -> FsResult<&str> {
    name.to_str().ok_or(FsError::NotFound)
}

impl Filesystem for BucketFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("filesystem mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("filesystem unmounted, {} inodes live", self.inodes.len());
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup parent={} name={:?}", parent, name);
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.node(ino).and_then(|node| node.attr()) {
            Ok(attr) => reply.attr(&self.ttl, &self.file_attr(ino, &attr)),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr ino={} size={:?}", ino, size);
        match self.do_setattr(ino, size) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        if mode & (libc::S_IFMT as u32) != libc::S_IFREG as u32 {
            reply.error(libc::EPERM);
            return;
        }
        match self.do_create(parent, name, FsFileType::RegularFile) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir parent={} name={:?}", parent, name);
        match self.do_create(parent, name, FsFileType::Directory) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink parent={} name={:?}", parent, name);
        match self.do_remove(parent, name, false) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir parent={} name={:?}", parent, name);
        match self.do_remove(parent, name, true) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!(
            "rename {}/{:?} -> {}/{:?}",
            parent, name, newparent, newname
        );
        if flags != 0 {
            // RENAME_NOREPLACE and RENAME_EXCHANGE are not supported
            reply.error(libc::EINVAL);
            return;
        }
        match self.do_rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.node(ino) {
            Ok(node) if node.kind() == FsFileType::RegularFile => reply.opened(0, 0),
            Ok(_) => reply.error(libc::EISDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self
            .node(ino)
            .and_then(|node| node.read(offset as u64, size as usize))
        {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self
            .node(ino)
            .and_then(|node| node.write(offset as u64, data))
        {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // every write is already committed
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.node(ino) {
            Ok(node) if node.kind() == FsFileType::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.do_readdir(ino, offset) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        for (child_ino, next, kind, name) in entries {
            if reply.add(child_ino, next, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create parent={} name={:?}", parent, name);
        match self.do_create(parent, name, FsFileType::RegularFile) {
            Ok(attr) => reply.created(&self.ttl, &attr, 0, 0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }
}

/// Mount `fs` at `mountpoint` and serve requests until it is unmounted.
pub fn mount<P: AsRef<Path>>(fs: Dbfs, mountpoint: P, config: &MountConfig) -> io::Result<()> {
    let mountpoint = mountpoint.as_ref();
    let owner = std::fs::metadata(mountpoint)?;
    let uid = config.uid.unwrap_or_else(|| owner.uid());
    let gid = config.gid.unwrap_or_else(|| owner.gid());

    let mut options = vec![
        MountOption::FSName(config.fsname.clone()),
        MountOption::Subtype("bucketfs".to_string()),
        MountOption::DefaultPermissions,
        MountOption::NoExec,
    ];
    options.push(if config.read_only {
        MountOption::RO
    } else {
        MountOption::RW
    });
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        if !config.allow_other {
            warn!("auto_unmount without allow_other; fusermount may refuse it");
        }
        options.push(MountOption::AutoUnmount);
    }

    info!("mounting at {}", mountpoint.display());
    let fuse = BucketFuse::new(fs.clone(), config.attr_ttl(), uid, gid);
    let result = fuser::mount2(fuse, mountpoint, &options);
    fs.close();
    result
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::common::ROOT_INO;

    fn session() -> (TempDir, BucketFuse) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let fs = Dbfs::open(dir.path().join("fuse.db")).unwrap();
        (dir, BucketFuse::new(fs, Duration::from_secs(1), 1000, 1000))
    }

    fn mkdir(fuse: &mut BucketFuse, parent: u64, name: &str) -> u64 {
        fuse.do_create(parent, OsStr::new(name), FsFileType::Directory)
            .unwrap()
            .ino
    }

    fn names(fuse: &BucketFuse, ino: u64) -> Vec<String> {
        fuse.do_readdir(ino, 0)
            .unwrap()
            .into_iter()
            .map(|(_, _, _, name)| name)
            .collect()
    }

    #[test]
    fn lookup_is_stable() {
        let (_dir, mut fuse) = session();
        let users = mkdir(&mut fuse, ROOT_INO, "users");
        let again = fuse.do_lookup(ROOT_INO, OsStr::new("users")).unwrap();
        assert_eq!(again.ino, users);
        assert_eq!(again.kind, FileType::Directory);
        assert_eq!(again.uid, 1000);
        assert_eq!(
            fuse.do_lookup(ROOT_INO, OsStr::new("nobody")).err(),
            Some(FsError::NotFound)
        );
    }

    #[test]
    fn renamed_directory_keeps_its_inode() {
        let (_dir, mut fuse) = session();
        let a = mkdir(&mut fuse, ROOT_INO, "a");
        let sub = mkdir(&mut fuse, a, "sub");
        let key = fuse
            .do_create(sub, OsStr::new("k"), FsFileType::RegularFile)
            .unwrap()
            .ino;
        fuse.node(key).unwrap().write(0, b"value").unwrap();

        fuse.do_rename(ROOT_INO, OsStr::new("a"), ROOT_INO, OsStr::new("b"))
            .unwrap();

        assert_eq!(fuse.node(a).unwrap().attr().unwrap().kind, FsFileType::Directory);
        assert_eq!(names(&fuse, a), vec![".", "..", "sub"]);
        assert_eq!(names(&fuse, sub), vec![".", "..", "k"]);
        assert_eq!(fuse.node(key).unwrap().read(0, 16).unwrap(), b"value");
        assert_eq!(fuse.do_lookup(ROOT_INO, OsStr::new("b")).unwrap().ino, a);
        assert_eq!(
            fuse.do_lookup(ROOT_INO, OsStr::new("a")).err(),
            Some(FsError::NotFound)
        );
    }

    #[test]
    fn renamed_file_replaces_target() {
        let (_dir, mut fuse) = session();
        let users = mkdir(&mut fuse, ROOT_INO, "users");
        let alice = fuse
            .do_create(users, OsStr::new("alice"), FsFileType::RegularFile)
            .unwrap()
            .ino;
        let bob = fuse
            .do_create(users, OsStr::new("bob"), FsFileType::RegularFile)
            .unwrap()
            .ino;
        fuse.node(alice).unwrap().write(0, b"hi").unwrap();

        fuse.do_rename(users, OsStr::new("alice"), users, OsStr::new("bob"))
            .unwrap();

        assert_eq!(fuse.node(alice).unwrap().read(0, 16).unwrap(), b"hi");
        assert_eq!(fuse.node(bob).err(), Some(FsError::NotFound));
        assert_eq!(fuse.do_lookup(users, OsStr::new("bob")).unwrap().ino, alice);
    }

    #[test]
    fn remove_unmaps_the_subtree() {
        let (_dir, mut fuse) = session();
        let users = mkdir(&mut fuse, ROOT_INO, "users");
        let alice = fuse
            .do_create(users, OsStr::new("alice"), FsFileType::RegularFile)
            .unwrap()
            .ino;
        fuse.do_remove(ROOT_INO, OsStr::new("users"), true).unwrap();
        assert_eq!(fuse.node(users).err(), Some(FsError::NotFound));
        assert_eq!(fuse.node(alice).err(), Some(FsError::NotFound));
        assert_eq!(fuse.inodes.len(), 1);
    }

    #[test]
    fn readdir_pages_and_does_not_number_entries() {
        let (_dir, mut fuse) = session();
        let users = mkdir(&mut fuse, ROOT_INO, "users");
        for name in ["a", "b", "c"] {
            fuse.node(users)
                .unwrap()
                .create(name, FsFileType::RegularFile)
                .unwrap();
        }
        let before = fuse.inodes.len();

        let all = fuse.do_readdir(users, 0).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].0, users);
        assert!(all[2..].iter().all(|(ino, _, _, _)| *ino == UNKNOWN_INO));
        assert_eq!(fuse.inodes.len(), before);

        let resume = all[2].1;
        let rest: Vec<String> = fuse
            .do_readdir(users, resume)
            .unwrap()
            .into_iter()
            .map(|(_, _, _, name)| name)
            .collect();
        assert_eq!(rest, vec!["b", "c"]);
        assert!(fuse.do_readdir(users, 5).unwrap().is_empty());

        let b = fuse.do_lookup(users, OsStr::new("b")).unwrap().ino;
        let listed = fuse.do_readdir(users, 0).unwrap();
        assert_eq!(listed[3].0, b);
    }

    #[test]
    fn setattr_truncates() {
        let (_dir, mut fuse) = session();
        let users = mkdir(&mut fuse, ROOT_INO, "users");
        let f = fuse
            .do_create(users, OsStr::new("f"), FsFileType::RegularFile)
            .unwrap()
            .ino;
        fuse.node(f).unwrap().write(0, b"hello world").unwrap();

        let attr = fuse.do_setattr(f, Some(5)).unwrap();
        assert_eq!((attr.ino, attr.size), (f, 5));
        assert_eq!(fuse.do_setattr(f, None).unwrap().size, 5);
        assert_eq!(
            fuse.do_setattr(f, Some(u64::MAX)).err(),
            Some(FsError::FileTooLarge)
        );
        assert_eq!(
            fuse.do_setattr(users, Some(0)).err(),
            Some(FsError::IsADirectory)
        );
    }
}
