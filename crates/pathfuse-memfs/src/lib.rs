//! An in-memory filesystem served through pathfuse.
//!
//! [`MemFs`] keeps every node in one ordered map keyed by absolute path.
//! Directory contents are the keys sharing a `dir/` prefix, so moving a
//! directory is a matter of re-keying its subtree.
//!
//! The filesystem starts out with the root directory and a single
//! `/helloworld.txt`. Ownership is not stored: every node reports the uid
//! and gid of the mounting session.

use parking_lot::{Mutex, RwLock};
use pathfuse::types::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use pathfuse::{
    DirFiller, Errno, FileInfo, FileStat, Op, OpResult, OpSet, PathFilesystem, ReaddirFlags,
    RenameFlags, SessionContext, StatFs, Timespec, DEFAULT_UMASK,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Name of the file present after every `init`.
pub const HELLO_PATH: &str = "/helloworld.txt";

/// Content of [`HELLO_PATH`].
pub const HELLO_CONTENT: &[u8] = b"Hello, world.\n";

const BLOCK_SIZE: u32 = 4096;
const TOTAL_BLOCKS: u64 = 1 << 20;
const TOTAL_FILES: u64 = 1 << 20;
const NAME_MAX: u32 = 255;
const PERM_MASK: u32 = 0o7777;

/// One file, directory or symbolic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// File type and permission bits.
    pub mode: u32,
    /// File content, or the link target of a symlink.
    pub content: Vec<u8>,
    /// Extended attributes.
    pub xattrs: BTreeMap<String, Vec<u8>>,
    /// Last access time.
    pub atime: Timespec,
    /// Last modification time.
    pub mtime: Timespec,
    /// Last status change time.
    pub ctime: Timespec,
}

impl Node {
    fn new(mode: u32, content: Vec<u8>) -> Self {
        let now = Timespec::now();
        Self {
            mode,
            content,
            xattrs: BTreeMap::new(),
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn dir(perm: u32) -> Self {
        Self::new(S_IFDIR | (perm & PERM_MASK), Vec::new())
    }

    fn file(perm: u32, content: Vec<u8>) -> Self {
        Self::new(S_IFREG | (perm & PERM_MASK), content)
    }

    /// Returns true if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    fn touch(&mut self) {
        let now = Timespec::now();
        self.mtime = now;
        self.ctime = now;
    }
}

/// The parent directory of an absolute path.
fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// The key prefix shared by every entry below `dir`.
fn child_prefix(dir: &str) -> String {
    if dir == "/" {
        "/".to_string()
    } else {
        format!("{dir}/")
    }
}

/// Returns true if `path` is `root` or lies below it.
fn in_subtree(path: &str, root: &str) -> bool {
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

fn initial_nodes(umask: u32) -> BTreeMap<String, Node> {
    let mut nodes = BTreeMap::new();
    nodes.insert("/".to_string(), Node::dir(0o777 & !umask));
    nodes.insert(
        HELLO_PATH.to_string(),
        Node::file(0o666 & !umask, HELLO_CONTENT.to_vec()),
    );
    nodes
}

/// Copies `data` into `buf` with the size-probe convention of the xattr
/// calls: an empty `buf` asks for the size, a short one is `ERANGE`.
fn copy_sized(data: &[u8], buf: &mut [u8]) -> OpResult<usize> {
    if buf.is_empty() {
        return Ok(data.len());
    }
    if buf.len() < data.len() {
        return Err(Errno::ERANGE);
    }
    buf[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// An in-memory filesystem.
#[derive(Debug)]
pub struct MemFs {
    nodes: RwLock<BTreeMap<String, Node>>,
    rename_faults: Mutex<HashMap<String, Errno>>,
}

impl MemFs {
    /// Creates the initial tree using the default creation mask.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(initial_nodes(DEFAULT_UMASK)),
            rename_faults: Mutex::new(HashMap::new()),
        }
    }

    /// Makes every rename that has to move `path` fail with `errno`.
    ///
    /// Entries moved before the failing one are put back.
    pub fn fail_rename_of(&self, path: impl Into<String>, errno: Errno) {
        self.rename_faults.lock().insert(path.into(), errno);
    }

    /// Removes every injected rename failure.
    pub fn clear_faults(&self) {
        self.rename_faults.lock().clear();
    }

    /// Returns true if `path` exists.
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.read().contains_key(path)
    }

    /// A copy of the node at `path`.
    pub fn node(&self, path: &str) -> Option<Node> {
        self.nodes.read().get(path).cloned()
    }

    /// Every path in the tree, in order.
    pub fn paths(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Adds or replaces a regular file, bypassing the creation mask.
    pub fn insert_file(&self, path: &str, perm: u32, content: impl Into<Vec<u8>>) {
        self.nodes
            .write()
            .insert(path.to_string(), Node::file(perm, content.into()));
    }

    /// Adds or replaces an empty directory, bypassing the creation mask.
    pub fn insert_dir(&self, path: &str, perm: u32) {
        self.nodes.write().insert(path.to_string(), Node::dir(perm));
    }

    fn stat_node(cx: &SessionContext, node: &Node) -> FileStat {
        FileStat {
            mode: node.mode,
            nlink: if node.is_dir() { 2 } else { 1 },
            uid: cx.uid,
            gid: cx.gid,
            size: node.content.len() as u64,
            blksize: BLOCK_SIZE,
            atime: node.atime,
            mtime: node.mtime,
            ctime: node.ctime,
            ..FileStat::default()
        }
    }

    /// Inserts a new node after checking its parent and name.
    fn insert_new(&self, path: &str, node: Node) -> OpResult {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(path) {
            return Err(Errno::EEXIST);
        }
        match nodes.get(parent_of(path)) {
            None => return Err(Errno::ENOENT),
            Some(parent) if !parent.is_dir() => return Err(Errno::ENOTDIR),
            Some(_) => {}
        }
        nodes.insert(path.to_string(), node);
        if let Some(parent) = nodes.get_mut(parent_of(path)) {
            parent.touch();
        }
        Ok(())
    }

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&Node) -> OpResult<T>) -> OpResult<T> {
        let nodes = self.nodes.read();
        nodes.get(path).ok_or(Errno::ENOENT).and_then(f)
    }

    fn with_node_mut<T>(
        &self,
        path: &str,
        f: impl FnOnce(&mut Node) -> OpResult<T>,
    ) -> OpResult<T> {
        let mut nodes = self.nodes.write();
        nodes.get_mut(path).ok_or(Errno::ENOENT).and_then(f)
    }

    fn has_children(nodes: &BTreeMap<String, Node>, dir: &str) -> bool {
        let prefix = child_prefix(dir);
        nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .any(|(key, _)| key.len() > prefix.len())
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl PathFilesystem for MemFs {
    const OPERATIONS: OpSet = OpSet::of(&[
        Op::Getattr,
        Op::Readlink,
        Op::Mknod,
        Op::Mkdir,
        Op::Unlink,
        Op::Rmdir,
        Op::Symlink,
        Op::Rename,
        Op::Chmod,
        Op::Truncate,
        Op::Open,
        Op::Read,
        Op::Write,
        Op::Statfs,
        Op::Release,
        Op::Setxattr,
        Op::Getxattr,
        Op::Listxattr,
        Op::Removexattr,
        Op::Opendir,
        Op::Readdir,
        Op::Releasedir,
        Op::Init,
        Op::Destroy,
        Op::Access,
        Op::Create,
        Op::Ftruncate,
        Op::Fgetattr,
        Op::Utimens,
        Op::WriteBuf,
        Op::ReadBuf,
    ]);

    fn init(&self, cx: &SessionContext) {
        *self.nodes.write() = initial_nodes(cx.umask);
        debug!(umask = cx.umask, "Filesystem reset to initial tree");
    }

    fn destroy(&self) {
        debug!(nodes = self.nodes.read().len(), "Filesystem destroyed");
    }

    fn getattr(&self, cx: &SessionContext, path: &str) -> OpResult<FileStat> {
        self.with_node(path, |node| Ok(Self::stat_node(cx, node)))
    }

    fn readlink(&self, _cx: &SessionContext, path: &str) -> OpResult<String> {
        self.with_node(path, |node| {
            if node.mode & S_IFMT != S_IFLNK {
                return Err(Errno::EINVAL);
            }
            String::from_utf8(node.content.clone()).map_err(|_| Errno::EIO)
        })
    }

    fn mknod(&self, cx: &SessionContext, path: &str, mode: u32, _rdev: u64) -> OpResult {
        let kind = match mode & S_IFMT {
            0 => S_IFREG,
            kind => kind,
        };
        let perm = mode & PERM_MASK & !cx.umask;
        self.insert_new(path, Node::new(kind | perm, Vec::new()))
    }

    fn mkdir(&self, cx: &SessionContext, path: &str, mode: u32) -> OpResult {
        self.insert_new(path, Node::dir(mode & !cx.umask))
    }

    fn unlink(&self, _cx: &SessionContext, path: &str) -> OpResult {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            None => Err(Errno::ENOENT),
            Some(node) if node.is_dir() => Err(Errno::EISDIR),
            Some(_) => {
                nodes.remove(path);
                Ok(())
            }
        }
    }

    fn rmdir(&self, _cx: &SessionContext, path: &str) -> OpResult {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            None => return Err(Errno::ENOENT),
            Some(node) if !node.is_dir() => return Err(Errno::ENOTDIR),
            Some(_) => {}
        }
        if path == "/" {
            return Err(Errno::from_raw(libc::EBUSY));
        }
        if Self::has_children(&nodes, path) {
            return Err(Errno::ENOTEMPTY);
        }
        nodes.remove(path);
        Ok(())
    }

    fn symlink(&self, _cx: &SessionContext, target: &str, link: &str) -> OpResult {
        self.insert_new(link, Node::new(S_IFLNK | 0o777, target.as_bytes().to_vec()))
    }

    fn rename(&self, _cx: &SessionContext, from: &str, to: &str, flags: RenameFlags) -> OpResult {
        if flags.contains(RenameFlags::EXCHANGE) {
            return Err(Errno::EINVAL);
        }
        if from == to {
            return Ok(());
        }
        if from == "/" || in_subtree(to, from) {
            return Err(Errno::EINVAL);
        }

        let mut nodes = self.nodes.write();
        let source_is_dir = nodes.get(from).ok_or(Errno::ENOENT)?.is_dir();
        match nodes.get(parent_of(to)) {
            None => return Err(Errno::ENOENT),
            Some(parent) if !parent.is_dir() => return Err(Errno::ENOTDIR),
            Some(_) => {}
        }
        let replaced = match nodes.get(to) {
            Some(_) if flags.contains(RenameFlags::NOREPLACE) => return Err(Errno::EEXIST),
            Some(target) if target.is_dir() && !source_is_dir => return Err(Errno::EISDIR),
            Some(target) if !target.is_dir() && source_is_dir => return Err(Errno::ENOTDIR),
            Some(_) if Self::has_children(&nodes, to) => return Err(Errno::ENOTEMPTY),
            Some(_) => nodes.remove(to),
            None => None,
        };

        let moving: Vec<String> = nodes
            .keys()
            .filter(|key| in_subtree(key, from))
            .cloned()
            .collect();
        let faults = self.rename_faults.lock();
        let mut moved: Vec<(String, String)> = Vec::with_capacity(moving.len());
        for old in moving {
            let new = format!("{to}{}", &old[from.len()..]);
            if let Some(&errno) = faults.get(&old) {
                debug!(from, to, failed = %old, moved = moved.len(), "Rename failed, rolling back");
                for (old, new) in moved.into_iter().rev() {
                    if let Some(node) = nodes.remove(&new) {
                        nodes.insert(old, node);
                    }
                }
                if let Some(node) = replaced {
                    nodes.insert(to.to_string(), node);
                }
                return Err(errno);
            }
            if let Some(node) = nodes.remove(&old) {
                trace!(old = %old, new = %new, "Moved entry");
                nodes.insert(new.clone(), node);
                moved.push((old, new));
            }
        }
        if let Some(node) = nodes.get_mut(to) {
            node.ctime = Timespec::now();
        }
        Ok(())
    }

    fn chmod(&self, _cx: &SessionContext, path: &str, mode: u32) -> OpResult {
        self.with_node_mut(path, |node| {
            node.mode = (node.mode & S_IFMT) | (mode & PERM_MASK);
            node.ctime = Timespec::now();
            Ok(())
        })
    }

    fn truncate(&self, _cx: &SessionContext, path: &str, size: u64) -> OpResult {
        let size = usize::try_from(size).map_err(|_| Errno::EINVAL)?;
        self.with_node_mut(path, |node| {
            if node.is_dir() {
                return Err(Errno::EISDIR);
            }
            node.content.resize(size, 0);
            node.touch();
            Ok(())
        })
    }

    fn open(&self, _cx: &SessionContext, path: &str, fi: &mut FileInfo) -> OpResult {
        let truncate = fi.flags & libc::O_TRUNC != 0;
        self.with_node_mut(path, |node| {
            if truncate && !node.is_dir() {
                node.content.clear();
                node.touch();
            }
            Ok(())
        })
    }

    fn read(
        &self,
        _cx: &SessionContext,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        _fi: &FileInfo,
    ) -> OpResult<usize> {
        self.with_node(path, |node| {
            if node.is_dir() {
                return Err(Errno::EISDIR);
            }
            let start = usize::try_from(offset).unwrap_or(usize::MAX);
            if start >= node.content.len() {
                return Ok(0);
            }
            let count = buf.len().min(node.content.len() - start);
            buf[..count].copy_from_slice(&node.content[start..start + count]);
            Ok(count)
        })
    }

    fn write(
        &self,
        _cx: &SessionContext,
        path: &str,
        data: &[u8],
        offset: u64,
        _fi: &FileInfo,
    ) -> OpResult<usize> {
        let start = usize::try_from(offset).map_err(|_| Errno::EINVAL)?;
        let end = start.checked_add(data.len()).ok_or(Errno::EINVAL)?;
        self.with_node_mut(path, |node| {
            if node.is_dir() {
                return Err(Errno::EISDIR);
            }
            if node.content.len() < end {
                node.content.resize(end, 0);
            }
            node.content[start..end].copy_from_slice(data);
            node.touch();
            Ok(data.len())
        })
    }

    fn statfs(&self, _cx: &SessionContext, _path: &str) -> OpResult<StatFs> {
        let nodes = self.nodes.read();
        let used: u64 = nodes
            .values()
            .map(|n| (n.content.len() as u64).div_ceil(u64::from(BLOCK_SIZE)))
            .sum();
        let files = nodes.len() as u64;
        Ok(StatFs {
            bsize: BLOCK_SIZE,
            frsize: BLOCK_SIZE,
            blocks: TOTAL_BLOCKS,
            bfree: TOTAL_BLOCKS.saturating_sub(used),
            bavail: TOTAL_BLOCKS.saturating_sub(used),
            files: TOTAL_FILES,
            ffree: TOTAL_FILES.saturating_sub(files),
            namemax: NAME_MAX,
        })
    }

    fn release(&self, _cx: &SessionContext, _path: &str, _fi: &FileInfo) -> OpResult {
        Ok(())
    }

    fn setxattr(
        &self,
        _cx: &SessionContext,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> OpResult {
        self.with_node_mut(path, |node| {
            let exists = node.xattrs.contains_key(name);
            if flags & libc::XATTR_CREATE != 0 && exists {
                return Err(Errno::EEXIST);
            }
            if flags & libc::XATTR_REPLACE != 0 && !exists {
                return Err(Errno::ENOATTR);
            }
            node.xattrs.insert(name.to_string(), value.to_vec());
            node.ctime = Timespec::now();
            Ok(())
        })
    }

    fn getxattr(
        &self,
        _cx: &SessionContext,
        path: &str,
        name: &str,
        buf: &mut [u8],
    ) -> OpResult<usize> {
        self.with_node(path, |node| {
            let value = node.xattrs.get(name).ok_or(Errno::ENOATTR)?;
            copy_sized(value, buf)
        })
    }

    fn listxattr(&self, _cx: &SessionContext, path: &str, buf: &mut [u8]) -> OpResult<usize> {
        self.with_node(path, |node| {
            let mut names = Vec::new();
            for name in node.xattrs.keys() {
                names.extend_from_slice(name.as_bytes());
                names.push(0);
            }
            copy_sized(&names, buf)
        })
    }

    fn removexattr(&self, _cx: &SessionContext, path: &str, name: &str) -> OpResult {
        self.with_node_mut(path, |node| {
            node.xattrs.remove(name).ok_or(Errno::ENOATTR)?;
            node.ctime = Timespec::now();
            Ok(())
        })
    }

    fn opendir(&self, _cx: &SessionContext, path: &str, _fi: &mut FileInfo) -> OpResult {
        self.with_node(path, |node| {
            if node.is_dir() { Ok(()) } else { Err(Errno::ENOTDIR) }
        })
    }

    fn readdir(
        &self,
        cx: &SessionContext,
        path: &str,
        _offset: u64,
        _fi: &FileInfo,
        filler: &mut DirFiller<'_>,
        _flags: ReaddirFlags,
    ) -> OpResult {
        let nodes = self.nodes.read();
        let dir = nodes.get(path).ok_or(Errno::ENOENT)?;
        if !dir.is_dir() {
            return Err(Errno::ENOTDIR);
        }

        let own = Self::stat_node(cx, dir);
        if filler.fill_dir(".", Some(&own), 0) {
            return Ok(());
        }
        let parent = nodes.get(parent_of(path)).map(|n| Self::stat_node(cx, n));
        if filler.fill_dir("..", parent.as_ref(), 0) {
            return Ok(());
        }

        let prefix = child_prefix(path);
        for (key, node) in nodes.range(prefix.clone()..) {
            let Some(name) = key.strip_prefix(&prefix) else {
                break;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            if filler.fill_dir(name, Some(&Self::stat_node(cx, node)), 0) {
                break;
            }
        }
        Ok(())
    }

    fn releasedir(&self, _cx: &SessionContext, _path: &str, _fi: &FileInfo) -> OpResult {
        Ok(())
    }

    fn access(&self, _cx: &SessionContext, path: &str, _mask: i32) -> OpResult {
        self.with_node(path, |_| Ok(()))
    }

    fn create(&self, cx: &SessionContext, path: &str, mode: u32, _fi: &mut FileInfo) -> OpResult {
        self.insert_new(path, Node::file(mode & !cx.umask, Vec::new()))
    }

    fn utimens(&self, _cx: &SessionContext, path: &str, times: &[Timespec; 2]) -> OpResult {
        self.with_node_mut(path, |node| {
            node.atime = times[0];
            node.mtime = times[1];
            node.ctime = Timespec::now();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cx() -> SessionContext {
        SessionContext {
            uid: 1000,
            gid: 100,
            pid: 42,
            umask: 0o022,
        }
    }

    #[test]
    fn test_initial_tree() {
        let fs = MemFs::new();
        assert_eq!(fs.paths(), vec!["/".to_string(), HELLO_PATH.to_string()]);
        let st = fs.getattr(&cx(), HELLO_PATH).unwrap();
        assert_eq!(st.mode, S_IFREG | 0o644);
        assert_eq!(st.size, HELLO_CONTENT.len() as u64);
        assert_eq!((st.uid, st.gid), (1000, 100));
    }

    #[test]
    fn test_init_applies_umask() {
        let fs = MemFs::new();
        fs.insert_file("/extra", 0o600, "x");
        let mut session = cx();
        session.umask = 0o077;
        fs.init(&session);
        assert!(!fs.contains("/extra"));
        assert_eq!(fs.node("/").unwrap().mode, S_IFDIR | 0o700);
        assert_eq!(fs.node(HELLO_PATH).unwrap().mode, S_IFREG | 0o600);
    }

    #[test]
    fn test_write_zero_fills_gap() {
        let fs = MemFs::new();
        fs.insert_file("/f", 0o644, "ab");
        let n = fs.write(&cx(), "/f", b"z", 4, &FileInfo::default()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(fs.node("/f").unwrap().content, b"ab\0\0z");
    }

    #[test]
    fn test_mkdir_and_create_need_parent() {
        let fs = MemFs::new();
        let mut fi = FileInfo::default();
        assert_eq!(fs.mkdir(&cx(), "/no/such", 0o755), Err(Errno::ENOENT));
        assert_eq!(
            fs.create(&cx(), "/helloworld.txt/x", 0o644, &mut fi),
            Err(Errno::ENOTDIR)
        );
        assert_eq!(fs.mkdir(&cx(), HELLO_PATH, 0o755), Err(Errno::EEXIST));
        fs.mkdir(&cx(), "/d", 0o777).unwrap();
        assert_eq!(fs.node("/d").unwrap().mode, S_IFDIR | 0o755);
    }

    #[test]
    fn test_unlink_refuses_directories() {
        let fs = MemFs::new();
        fs.insert_dir("/d", 0o755);
        assert_eq!(fs.unlink(&cx(), "/d"), Err(Errno::EISDIR));
        assert_eq!(fs.unlink(&cx(), "/missing"), Err(Errno::ENOENT));
        fs.unlink(&cx(), HELLO_PATH).unwrap();
        assert!(!fs.contains(HELLO_PATH));
    }

    #[test]
    fn test_rename_noreplace_and_exchange() {
        let fs = MemFs::new();
        fs.insert_file("/a", 0o644, "a");
        fs.insert_file("/b", 0o644, "b");
        assert_eq!(
            fs.rename(&cx(), "/a", "/b", RenameFlags::NOREPLACE),
            Err(Errno::EEXIST)
        );
        assert_eq!(
            fs.rename(&cx(), "/a", "/b", RenameFlags::EXCHANGE),
            Err(Errno::EINVAL)
        );
        fs.rename(&cx(), "/a", "/b", RenameFlags::empty()).unwrap();
        assert!(!fs.contains("/a"));
        assert_eq!(fs.node("/b").unwrap().content, b"a");
    }

    #[test]
    fn test_rename_respects_component_boundaries() {
        let fs = MemFs::new();
        fs.insert_dir("/d", 0o755);
        fs.insert_file("/d/x", 0o644, "x");
        fs.insert_file("/dd", 0o644, "sibling");
        fs.rename(&cx(), "/d", "/e", RenameFlags::empty()).unwrap();
        assert!(fs.contains("/e/x"));
        assert!(fs.contains("/dd"));
        assert!(!fs.contains("/ee"));
    }

    #[test]
    fn test_rename_into_own_subtree_is_invalid() {
        let fs = MemFs::new();
        fs.insert_dir("/d", 0o755);
        assert_eq!(
            fs.rename(&cx(), "/d", "/d/inner", RenameFlags::empty()),
            Err(Errno::EINVAL)
        );
    }

    #[test]
    fn test_rename_rollback_restores_replaced_target() {
        let fs = MemFs::new();
        fs.insert_file("/a", 0o644, "new");
        fs.insert_file("/b", 0o644, "old");
        fs.fail_rename_of("/a", Errno::EIO);
        assert_eq!(fs.rename(&cx(), "/a", "/b", RenameFlags::empty()), Err(Errno::EIO));
        assert_eq!(fs.node("/a").unwrap().content, b"new");
        assert_eq!(fs.node("/b").unwrap().content, b"old");

        fs.clear_faults();
        fs.rename(&cx(), "/a", "/b", RenameFlags::empty()).unwrap();
    }

    #[test]
    fn test_xattr_flags_and_size_probe() {
        let fs = MemFs::new();
        let p = HELLO_PATH;
        fs.setxattr(&cx(), p, "user.k", b"value", 0).unwrap();
        assert_eq!(
            fs.setxattr(&cx(), p, "user.k", b"v", libc::XATTR_CREATE),
            Err(Errno::EEXIST)
        );
        assert_eq!(
            fs.setxattr(&cx(), p, "user.none", b"v", libc::XATTR_REPLACE),
            Err(Errno::ENOATTR)
        );

        assert_eq!(fs.getxattr(&cx(), p, "user.k", &mut []), Ok(5));
        let mut small = [0u8; 2];
        assert_eq!(fs.getxattr(&cx(), p, "user.k", &mut small), Err(Errno::ERANGE));
        let mut buf = [0u8; 8];
        assert_eq!(fs.getxattr(&cx(), p, "user.k", &mut buf), Ok(5));
        assert_eq!(&buf[..5], b"value");

        let mut list = [0u8; 16];
        assert_eq!(fs.listxattr(&cx(), p, &mut list), Ok(7));
        assert_eq!(&list[..7], b"user.k\0");

        fs.removexattr(&cx(), p, "user.k").unwrap();
        assert_eq!(fs.removexattr(&cx(), p, "user.k"), Err(Errno::ENOATTR));
    }

    #[test]
    fn test_symlink_roundtrip_and_readlink_on_file() {
        let fs = MemFs::new();
        fs.symlink(&cx(), HELLO_PATH, "/link").unwrap();
        assert_eq!(fs.readlink(&cx(), "/link").unwrap(), HELLO_PATH);
        assert_eq!(fs.readlink(&cx(), HELLO_PATH), Err(Errno::EINVAL));
    }

    #[test]
    fn test_open_with_trunc_clears_content() {
        let fs = MemFs::new();
        let mut fi = FileInfo::with_flags(libc::O_WRONLY | libc::O_TRUNC);
        fs.open(&cx(), HELLO_PATH, &mut fi).unwrap();
        assert!(fs.node(HELLO_PATH).unwrap().content.is_empty());
        assert_eq!(
            fs.open(&cx(), "/missing", &mut FileInfo::default()),
            Err(Errno::ENOENT)
        );
    }

    #[test]
    fn test_statfs_counts_usage() {
        let fs = MemFs::new();
        fs.insert_file("/big", 0o644, vec![1u8; 5000]);
        let st = fs.statfs(&cx(), "/").unwrap();
        assert_eq!(st.bsize, BLOCK_SIZE);
        assert_eq!(st.bfree, TOTAL_BLOCKS - 3);
        assert_eq!(st.ffree, TOTAL_FILES - 3);
    }

    #[test]
    fn test_in_subtree() {
        assert!(in_subtree("/d", "/d"));
        assert!(in_subtree("/d/x", "/d"));
        assert!(!in_subtree("/dd", "/d"));
    }
}
