//! Inode management for the fuser runtime.
//!
//! The kernel addresses everything by inode number while backends speak
//! absolute paths. [`InodeTable`] keeps both directions in `DashMap`s and
//! tracks the kernel's lookup count per inode so entries are only dropped
//! when the kernel forgets them.

use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Joins a directory path and an entry name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns true if `path` is `prefix` itself or lies below it.
fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
        || (prefix == "/" && path.starts_with('/'))
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Current path of the inode.
    pub path: String,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(path: String, nlookup: u64) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(nlookup),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count by `count`, returning the new value,
    /// or `None` if the count would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::AcqRel);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::Relaxed);
            None
        } else {
            Some(old - count)
        }
    }

    /// Returns the current lookup count.
    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe bidirectional map between inode numbers and paths.
#[derive(Debug)]
pub struct InodeTable {
    path_to_ino: DashMap<String, u64>,
    entries: DashMap<u64, InodeEntry>,
    next_ino: AtomicU64,
}

impl InodeTable {
    /// Creates a table holding only the root directory.
    pub fn new() -> Self {
        let table = Self {
            path_to_ino: DashMap::new(),
            entries: DashMap::new(),
            next_ino: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_ino.insert("/".to_string(), ROOT_INODE);
        table
            .entries
            .insert(ROOT_INODE, InodeEntry::new("/".to_string(), 1));
        table
    }

    fn get_or_insert_with(&self, path: &str, nlookup: u64) -> (u64, bool) {
        if let Some(ino) = self.path_to_ino.get(path) {
            return (*ino, false);
        }
        let mut created = false;
        let ino = *self
            .path_to_ino
            .entry(path.to_string())
            .or_insert_with(|| {
                let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
                self.entries
                    .insert(ino, InodeEntry::new(path.to_string(), nlookup));
                created = true;
                ino
            });
        (ino, created)
    }

    /// Returns the inode for `path`, allocating one if needed, and counts
    /// one kernel lookup against it.
    pub fn lookup(&self, path: &str) -> u64 {
        let (ino, created) = self.get_or_insert_with(path, 1);
        if !created && let Some(entry) = self.entries.get(&ino) {
            entry.inc_nlookup();
        }
        ino
    }

    /// Returns the inode for `path`, allocating one if needed, without
    /// counting a lookup. Used for plain `readdir` entries.
    pub fn peek_or_insert(&self, path: &str) -> u64 {
        self.get_or_insert_with(path, 0).0
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.entries.get(&ino)
    }

    /// The current path of `ino`.
    pub fn path(&self, ino: u64) -> Option<String> {
        self.entries.get(&ino).map(|e| e.path.clone())
    }

    /// The inode currently mapped to `path`.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_ino.get(path).map(|r| *r)
    }

    /// Decrements the lookup count for an inode, evicting it at zero.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }
        if let Some(entry) = self.entries.get(&ino)
            && let Some(remaining) = entry.dec_nlookup(nlookup)
            && remaining == 0
        {
            drop(entry);
            return self.evict(ino);
        }
        false
    }

    fn evict(&self, ino: u64) -> bool {
        match self.entries.remove(&ino) {
            Some((_, entry)) => {
                self.path_to_ino.remove_if(&entry.path, |_, mapped| *mapped == ino);
                true
            }
            None => false,
        }
    }

    /// Unmaps `path` after the backend removed it.
    ///
    /// The inode entry itself stays until the kernel forgets it.
    pub fn remove_path(&self, path: &str) {
        self.path_to_ino.remove(path);
    }

    /// Re-keys `from` and everything below it to live under `to`.
    ///
    /// Mappings previously at or under `to` are dropped first.
    pub fn rename(&self, from: &str, to: &str) {
        self.path_to_ino
            .retain(|path, _| !is_within(path, to) || is_within(path, from));
        let moved: Vec<(String, u64)> = self
            .path_to_ino
            .iter()
            .filter(|e| is_within(e.key(), from))
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        for (old, ino) in moved {
            let new = format!("{to}{}", &old[from.len()..]);
            self.path_to_ino.remove(&old);
            self.path_to_ino.insert(new.clone(), ino);
            if let Some(mut entry) = self.entries.get_mut(&ino) {
                entry.path = new;
            }
        }
    }

    /// Swaps the subtrees at `a` and `b`.
    pub fn exchange(&self, a: &str, b: &str) {
        let take = |root: &str| -> Vec<(String, u64)> {
            let keys: Vec<String> = self
                .path_to_ino
                .iter()
                .filter(|e| is_within(e.key(), root))
                .map(|e| e.key().clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| self.path_to_ino.remove(&k))
                .map(|(k, ino)| (k[root.len()..].to_string(), ino))
                .collect()
        };
        let under_a = take(a);
        let under_b = take(b);
        for (root, entries) in [(b, under_a), (a, under_b)] {
            for (suffix, ino) in entries {
                let new = format!("{root}{suffix}");
                self.path_to_ino.insert(new.clone(), ino);
                if let Some(mut entry) = self.entries.get_mut(&ino) {
                    entry.path = new;
                }
            }
        }
    }

    /// Returns the number of inodes currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
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

    #[test]
    fn test_root_inode_exists() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(table.get_inode("/"), Some(ROOT_INODE));
        assert!(table.is_empty());
    }

    #[test]
    fn test_lookup_counts() {
        let table = InodeTable::new();
        let ino = table.lookup("/docs");
        assert!(ino > ROOT_INODE);
        assert_eq!(table.lookup("/docs"), ino);
        assert_eq!(table.get(ino).unwrap().nlookup(), 2);
    }

    #[test]
    fn test_peek_does_not_count() {
        let table = InodeTable::new();
        let ino = table.peek_or_insert("/a");
        assert_eq!(table.get(ino).unwrap().nlookup(), 0);
        assert_eq!(table.lookup("/a"), ino);
        assert_eq!(table.get(ino).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_forget_evicts() {
        let table = InodeTable::new();
        let ino = table.lookup("/temp");
        assert!(!table.forget(ino, 0));
        assert!(table.forget(ino, 1));
        assert!(table.get(ino).is_none());
        assert!(table.get_inode("/temp").is_none());
    }

    #[test]
    fn test_forget_root_never_evicts() {
        let table = InodeTable::new();
        assert!(!table.forget(ROOT_INODE, 1));
        assert!(table.get(ROOT_INODE).is_some());
    }

    #[test]
    fn test_removed_path_keeps_inode() {
        let table = InodeTable::new();
        let ino = table.lookup("/gone");
        table.remove_path("/gone");
        assert!(table.get_inode("/gone").is_none());
        assert_eq!(table.path(ino).as_deref(), Some("/gone"));
    }

    #[test]
    fn test_rename_moves_subtree_on_component_boundary() {
        let table = InodeTable::new();
        let d = table.lookup("/d");
        let x = table.lookup("/d/x");
        let other = table.lookup("/dx");
        table.rename("/d", "/e");

        assert_eq!(table.get_inode("/e"), Some(d));
        assert_eq!(table.get_inode("/e/x"), Some(x));
        assert_eq!(table.path(x).as_deref(), Some("/e/x"));
        assert_eq!(table.get_inode("/dx"), Some(other));
        assert!(table.get_inode("/d/x").is_none());
    }

    #[test]
    fn test_rename_over_existing_drops_target_mapping() {
        let table = InodeTable::new();
        let a = table.lookup("/a");
        let b = table.lookup("/b");
        table.rename("/a", "/b");
        assert_eq!(table.get_inode("/b"), Some(a));
        assert_eq!(table.path(b).as_deref(), Some("/b"));
        assert!(table.get_inode("/a").is_none());
    }

    #[test]
    fn test_exchange_swaps_subtrees() {
        let table = InodeTable::new();
        let a = table.lookup("/a");
        let ax = table.lookup("/a/x");
        let b = table.lookup("/b");
        table.exchange("/a", "/b");
        assert_eq!(table.get_inode("/b"), Some(a));
        assert_eq!(table.get_inode("/b/x"), Some(ax));
        assert_eq!(table.get_inode("/a"), Some(b));
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
    }
}
