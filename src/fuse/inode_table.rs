//! Kernel inode numbers for node identities.
//!
//! The core nodes are plain values with no numbering of their own, so the
//! adapter hands out an inode per identity and tracks the kernel's lookup
//! count for it. The root is always `ROOT_INO` and is never evicted.

use std::collections::HashMap;

use crate::{common::ROOT_INO, inode::NodeId};

struct Slot {
    id: NodeId,
    lookups: u64,
}

pub struct InodeTable {
    by_ino: HashMap<u64, Slot>,
    by_id: HashMap<NodeId, u64>,
    next_ino: u64,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            by_ino: HashMap::new(),
            by_id: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        table.by_ino.insert(
            ROOT_INO,
            Slot {
                id: NodeId::Root,
                lookups: 0,
            },
        );
        table.by_id.insert(NodeId::Root, ROOT_INO);
        table
    }

    pub fn get(&self, ino: u64) -> Option<&NodeId> {
        self.by_ino.get(&ino).map(|slot| &slot.id)
    }

    /// Inode already assigned to `id`, if any. Listings use this, since
    /// the kernel does not count the entries it reads from a directory.
    pub fn find(&self, id: &NodeId) -> Option<u64> {
        self.by_id.get(id).copied()
    }

    /// Inode for `id`, counting one kernel reference to it.
    pub fn lookup(&mut self, id: &NodeId) -> u64 {
        let ino = match self.by_id.get(id) {
            Some(ino) => *ino,
            None => {
                let ino = self.next_ino;
                self.next_ino += 1;
                self.by_ino.insert(
                    ino,
                    Slot {
                        id: id.clone(),
                        lookups: 0,
                    },
                );
                self.by_id.insert(id.clone(), ino);
                ino
            }
        };
        if let Some(slot) = self.by_ino.get_mut(&ino) {
            slot.lookups += 1;
        }
        ino
    }

    /// Drop `nlookup` kernel references; the inode is released at zero.
    pub fn forget(&mut self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(slot) = self.by_ino.get_mut(&ino) else {
            return;
        };
        slot.lookups = slot.lookups.saturating_sub(nlookup);
        if slot.lookups == 0 {
            if let Some(slot) = self.by_ino.remove(&ino) {
                self.by_id.remove(&slot.id);
            }
        }
    }

    /// Unmap `id` and everything beneath it once it is gone from the store.
    /// Later `forget`s for those inodes are ignored.
    pub fn release(&mut self, id: &NodeId) {
        let gone: Vec<u64> = self
            .by_ino
            .iter()
            .filter(|(_, slot)| relocate(&slot.id, id, id).is_some())
            .map(|(ino, _)| *ino)
            .collect();
        for ino in gone {
            if let Some(slot) = self.by_ino.remove(&ino) {
                self.by_id.remove(&slot.id);
            }
        }
    }

    /// Follow a rename: inodes under `from` keep their numbers and now name
    /// the matching ids under `to`. Whatever `to` replaced is released.
    pub fn rename(&mut self, from: &NodeId, to: &NodeId) {
        if from == to {
            return;
        }
        self.release(to);
        let moved: Vec<(u64, NodeId)> = self
            .by_ino
            .iter()
            .filter_map(|(ino, slot)| relocate(&slot.id, from, to).map(|id| (*ino, id)))
            .collect();
        for (ino, _) in &moved {
            if let Some(slot) = self.by_ino.get(ino) {
                self.by_id.remove(&slot.id);
            }
        }
        for (ino, id) in moved {
            if let Some(slot) = self.by_ino.get_mut(&ino) {
                slot.id = id.clone();
                self.by_id.insert(id, ino);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_ino.len()
    }
}

/// Where `id` ends up when `from` moves to `to`; `None` if it is not
/// `from` or beneath it.
fn relocate(id: &NodeId, from: &NodeId, to: &NodeId) -> Option<NodeId> {
    match (from, to) {
        (NodeId::File(..), NodeId::File(..)) => (id == from).then(|| to.clone()),
        (NodeId::Dir(from), NodeId::Dir(to)) => match id {
            NodeId::Dir(path) => path.rebase(from, to).map(NodeId::Dir),
            NodeId::File(path, key) => path
                .rebase(from, to)
                .map(|path| NodeId::File(path, key.clone())),
            NodeId::Root => None,
        },
        _ => None,
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::BucketPath;

    fn users() -> NodeId {
        NodeId::Dir(BucketPath::root().child(b"users"))
    }

    #[test]
    fn root_is_reserved() {
        let mut table = InodeTable::new();
        assert_eq!(table.get(ROOT_INO), Some(&NodeId::Root));
        assert_eq!(table.lookup(&NodeId::Root), ROOT_INO);
        table.forget(ROOT_INO, 10);
        assert_eq!(table.get(ROOT_INO), Some(&NodeId::Root));
    }

    #[test]
    fn equal_ids_share_an_inode() {
        let mut table = InodeTable::new();
        let a = table.lookup(&users());
        let b = table.lookup(&users());
        assert_eq!(a, b);
        assert_ne!(a, ROOT_INO);
        let file = table.lookup(&NodeId::File(BucketPath::root().child(b"users"), b"alice".to_vec()));
        assert_ne!(a, file);
    }

    fn dir(names: &[&[u8]]) -> NodeId {
        NodeId::Dir(BucketPath::from(
            names.iter().map(|n| n.to_vec()).collect::<Vec<_>>(),
        ))
    }

    fn file(names: &[&[u8]], key: &[u8]) -> NodeId {
        match dir(names) {
            NodeId::Dir(path) => NodeId::File(path, key.to_vec()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn find_does_not_assign() {
        let mut table = InodeTable::new();
        assert_eq!(table.find(&users()), None);
        assert_eq!(table.len(), 1);
        let ino = table.lookup(&users());
        assert_eq!(table.find(&users()), Some(ino));
    }

    #[test]
    fn rename_carries_the_subtree() {
        let mut table = InodeTable::new();
        let a = table.lookup(&dir(&[b"a"]));
        let sub = table.lookup(&dir(&[b"a", b"sub"]));
        let key = table.lookup(&file(&[b"a", b"sub"], b"k"));
        let other = table.lookup(&dir(&[b"ab"]));

        table.rename(&dir(&[b"a"]), &dir(&[b"x", b"b"]));
        assert_eq!(table.get(a), Some(&dir(&[b"x", b"b"])));
        assert_eq!(table.get(sub), Some(&dir(&[b"x", b"b", b"sub"])));
        assert_eq!(table.get(key), Some(&file(&[b"x", b"b", b"sub"], b"k")));
        assert_eq!(table.get(other), Some(&dir(&[b"ab"])));
        assert_eq!(table.find(&dir(&[b"a"])), None);
        assert_eq!(table.find(&file(&[b"x", b"b", b"sub"], b"k")), Some(key));
    }

    #[test]
    fn rename_releases_the_replaced_entry() {
        let mut table = InodeTable::new();
        let old = table.lookup(&file(&[b"a"], b"old"));
        let target = table.lookup(&file(&[b"a"], b"new"));

        table.rename(&file(&[b"a"], b"old"), &file(&[b"a"], b"new"));
        assert_eq!(table.get(old), Some(&file(&[b"a"], b"new")));
        assert_eq!(table.get(target), None);
        assert_eq!(table.len(), 2);
        table.forget(target, 1);
        assert_eq!(table.get(old), Some(&file(&[b"a"], b"new")));
    }

    #[test]
    fn release_drops_descendants() {
        let mut table = InodeTable::new();
        let a = table.lookup(&dir(&[b"a"]));
        let key = table.lookup(&file(&[b"a"], b"k"));
        let b = table.lookup(&dir(&[b"b"]));

        table.release(&dir(&[b"a"]));
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(key), None);
        assert_eq!(table.get(b), Some(&dir(&[b"b"])));
        table.release(&NodeId::Root);
        assert_eq!(table.get(ROOT_INO), Some(&NodeId::Root));
    }

    #[test]
    fn forget_releases_at_zero() {
        let mut table = InodeTable::new();
        let ino = table.lookup(&users());
        table.lookup(&users());
        table.forget(ino, 1);
        assert_eq!(table.get(ino), Some(&users()));
        table.forget(ino, 1);
        assert_eq!(table.get(ino), None);
        assert_eq!(table.len(), 1);
        assert_ne!(table.lookup(&users()), ino);
    }
}
