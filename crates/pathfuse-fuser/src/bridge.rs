//! `fuser::Filesystem` implementation that drives a dispatch table.
//!
//! The kernel speaks inodes; the table speaks paths. Every request is
//! resolved to a path through the [`InodeTable`], turned into a
//! [`RequestContext`], and handed to the bound table entry. Statuses come
//! back as zero, a byte count, or a negated errno and are mapped onto the
//! matching fuser reply.
//!
//! Slots the table leaves unbound reply `ENOSYS`, except `open`, `opendir`,
//! `release`, `releasedir`, `flush` and `statfs`, whose absence is treated
//! as success.

use crate::attr::{file_type, timespec_of, to_file_attr};
use crate::config::MountConfig;
use crate::inode::{InodeTable, ROOT_INODE, child_path};
use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyBmap, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEmpty, ReplyEntry, ReplyIoctl, ReplyLock, ReplyOpen,
    ReplyStatfs, ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use pathfuse::types::{S_IFMT, S_IFREG};
use pathfuse::{
    Adapter, BufVec, DirEmitter, DirHandle, DispatchTable, FileInfo, FileLock, FileStat,
    FillRecord, PathFilesystem, ReaddirFlags, RenameFlags, RequestContext, StatFs, Timespec,
    UtimBuf, read_reply_bytes,
};
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

const FOPEN_DIRECT_IO: u32 = 1 << 0;
const FOPEN_KEEP_CACHE: u32 = 1 << 1;
const FOPEN_NONSEEKABLE: u32 = 1 << 2;

/// `FUSE_WRITE_CACHE`: the write comes from the page cache.
const WRITE_CACHE: u32 = 1 << 0;

/// Longest link target the bridge reads back.
const READLINK_MAX: usize = libc::PATH_MAX as usize;

/// Size of the buffer handed to ioctl when the caller sends no data.
const MAX_IOCTL: usize = 16 * 1024;

/// Unwraps a `Result<T, c_int>` or replies with the error and returns.
macro_rules! tri {
    ($reply:expr, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(errno) => {
                $reply.error(errno);
                return;
            }
        }
    };
}

/// Splits a boundary status into a count or an errno.
fn check(status: i32) -> Result<i32, c_int> {
    if status < 0 { Err(-status) } else { Ok(status) }
}

fn request_context(req: &Request<'_>) -> RequestContext {
    RequestContext::new(req.uid(), req.gid(), req.pid())
}

fn open_flags(fi: &FileInfo) -> u32 {
    let mut flags = 0;
    if fi.direct_io {
        flags |= FOPEN_DIRECT_IO;
    }
    if fi.keep_cache {
        flags |= FOPEN_KEEP_CACHE;
    }
    if fi.nonseekable {
        flags |= FOPEN_NONSEEKABLE;
    }
    flags
}

fn name_str(name: &OsStr) -> Result<&str, c_int> {
    name.to_str().ok_or(libc::EINVAL)
}

fn offset_u64(offset: i64) -> Result<u64, c_int> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

/// One entry captured from a listing call.
#[derive(Debug, Clone)]
struct ListedEntry {
    name: String,
    attr: Option<FileStat>,
    dtype: u32,
    next_offset: u64,
}

/// Buffers everything a backend emits for one listing call.
#[derive(Debug)]
struct EntryCollector {
    handle: DirHandle,
    entries: Vec<ListedEntry>,
}

impl EntryCollector {
    fn new(handle: DirHandle) -> Self {
        Self {
            handle,
            entries: Vec::new(),
        }
    }

    /// True when the backend paginates by itself.
    fn uses_offsets(&self) -> bool {
        self.entries.iter().any(|e| e.next_offset != 0)
    }

    /// Entries from `offset` on, each paired with the offset of its
    /// successor.
    fn page(self, offset: u64) -> Vec<(u64, ListedEntry)> {
        if self.uses_offsets() {
            self.entries
                .into_iter()
                .map(|e| (e.next_offset, e))
                .collect()
        } else {
            self.entries
                .into_iter()
                .enumerate()
                .skip(offset as usize)
                .map(|(i, e)| (i as u64 + 1, e))
                .collect()
        }
    }
}

impl DirEmitter for EntryCollector {
    fn emit(&mut self, handle: DirHandle, record: FillRecord<'_>) -> bool {
        if handle != self.handle {
            warn!(
                expected = self.handle.raw(),
                got = handle.raw(),
                "Dropping entry for foreign listing"
            );
            return false;
        }
        let entry = match record {
            FillRecord::Legacy { name, dtype, .. } => ListedEntry {
                name: name.to_string(),
                attr: None,
                dtype,
                next_offset: 0,
            },
            FillRecord::Entry {
                name,
                attr,
                next_offset,
            } => ListedEntry {
                name: name.to_string(),
                attr: attr.copied(),
                dtype: attr.map_or(0, FileStat::dtype),
                next_offset,
            },
        };
        self.entries.push(entry);
        false
    }
}

/// Serves a [`DispatchTable`] to the kernel through fuser.
pub struct PathBridge<F: PathFilesystem> {
    adapter: Arc<Adapter<F>>,
    table: DispatchTable<F>,
    inodes: InodeTable,
    config: MountConfig,
    next_dir_handle: u64,
}

impl<F: PathFilesystem> PathBridge<F> {
    /// Creates a bridge for `adapter` and its `table`.
    pub fn new(adapter: Arc<Adapter<F>>, table: DispatchTable<F>, config: MountConfig) -> Self {
        Self {
            adapter,
            table,
            inodes: InodeTable::new(),
            config,
            next_dir_handle: 1,
        }
    }

    /// The inode table.
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, c_int> {
        let parent = self.path_of(parent)?;
        Ok(child_path(&parent, name_str(name)?))
    }

    fn stat(&self, ctx: &RequestContext, path: &str, fh: Option<u64>) -> Result<FileStat, c_int> {
        let mut st = FileStat::default();
        let status = match (fh, self.table.fgetattr, self.table.getattr) {
            (Some(fh), Some(fgetattr), _) => {
                fgetattr(&self.adapter, ctx, path, &mut st, &FileInfo::with_handle(fh))
            }
            (_, _, Some(getattr)) => getattr(&self.adapter, ctx, path, &mut st),
            _ => return Err(libc::ENOSYS),
        };
        check(status).map(|_| st)
    }

    /// Stats `path`, counts a lookup for it, and replies with the entry.
    fn reply_entry(&self, ctx: &RequestContext, path: &str, reply: ReplyEntry) {
        let st = tri!(reply, self.stat(ctx, path, None));
        let ino = self.inodes.lookup(path);
        reply.entry(&self.config.entry_ttl, &to_file_attr(&st, ino), 0);
    }

    fn entry_ino(&self, dir: u64, dir_path: &str, name: &str) -> u64 {
        match name {
            "." => dir,
            ".." => self
                .inodes
                .get_inode(parent_of(dir_path))
                .unwrap_or(ROOT_INODE),
            _ => self.inodes.peek_or_insert(&child_path(dir_path, name)),
        }
    }

    fn allocate_dir_handle(&mut self) -> DirHandle {
        let handle = DirHandle::new(self.next_dir_handle);
        self.next_dir_handle = self.next_dir_handle.wrapping_add(1);
        handle
    }

    /// Runs one listing call and returns the requested page.
    fn list(
        &mut self,
        ctx: &RequestContext,
        path: &str,
        fh: u64,
        offset: u64,
        flags: ReaddirFlags,
    ) -> Result<Vec<(u64, ListedEntry)>, c_int> {
        let handle = self.allocate_dir_handle();
        let mut collector = EntryCollector::new(handle);
        let fi = FileInfo::with_handle(fh);
        let status = if let Some(readdir) = self.table.readdir {
            readdir.call(
                &self.adapter,
                ctx,
                path,
                handle,
                &mut collector,
                offset,
                &fi,
                flags.bits(),
            )
        } else if let Some(getdir) = self.table.getdir {
            getdir(&self.adapter, ctx, path, handle, &mut collector)
        } else {
            return Err(libc::ENOSYS);
        };
        check(status)?;
        Ok(collector.page(offset))
    }

    fn set_times(
        &self,
        ctx: &RequestContext,
        path: &str,
        fh: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> Result<(), c_int> {
        let current = if atime.is_none() || mtime.is_none() {
            Some(self.stat(ctx, path, fh)?)
        } else {
            None
        };
        let pick = |given: Option<TimeOrNow>, fallback: fn(&FileStat) -> Timespec| {
            given
                .map(timespec_of)
                .or_else(|| current.as_ref().map(fallback))
                .unwrap_or_default()
        };
        let times = [pick(atime, |st| st.atime), pick(mtime, |st| st.mtime)];
        let status = if let Some(utimens) = self.table.utimens {
            utimens(&self.adapter, ctx, path, &times)
        } else if let Some(utime) = self.table.utime {
            let buf = UtimBuf {
                actime: times[0].sec,
                modtime: times[1].sec,
            };
            utime(&self.adapter, ctx, path, &buf)
        } else {
            return Err(libc::ENOSYS);
        };
        check(status).map(drop)
    }

    fn truncate(
        &self,
        ctx: &RequestContext,
        path: &str,
        fh: Option<u64>,
        size: u64,
    ) -> Result<(), c_int> {
        let status = match (fh, self.table.ftruncate, self.table.truncate) {
            (Some(fh), Some(ftruncate), _) => {
                ftruncate(&self.adapter, ctx, path, size, &FileInfo::with_handle(fh))
            }
            (_, _, Some(truncate)) => truncate(&self.adapter, ctx, path, size),
            _ => return Err(libc::ENOSYS),
        };
        check(status).map(drop)
    }
}

impl<F: PathFilesystem> Filesystem for PathBridge<F> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        if let Some(init) = self.table.init {
            check(init(&self.adapter, &request_context(req)))?;
        }
        info!(
            revision = %self.table.capabilities().revision,
            "FUSE session initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(destroy) = self.table.destroy {
            destroy(&self.adapter);
        }
        info!("FUSE session destroyed");
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = tri!(reply, self.child_of(parent, name));
        self.reply_entry(&request_context(req), &path, reply);
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            trace!(ino, "Evicted inode");
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        let path = tri!(reply, self.path_of(ino));
        let st = tri!(reply, self.stat(&request_context(req), &path, fh));
        reply.attr(&self.config.attr_ttl, &to_file_attr(&st, ino));
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.path_of(ino));

        if let Some(mode) = mode {
            let chmod = tri!(reply, self.table.chmod.ok_or(libc::ENOSYS));
            tri!(reply, check(chmod(&self.adapter, &ctx, &path, mode)));
        }
        if uid.is_some() || gid.is_some() {
            let chown = tri!(reply, self.table.chown.ok_or(libc::ENOSYS));
            let status = chown(
                &self.adapter,
                &ctx,
                &path,
                uid.unwrap_or(u32::MAX),
                gid.unwrap_or(u32::MAX),
            );
            tri!(reply, check(status));
        }
        if let Some(size) = size {
            tri!(reply, self.truncate(&ctx, &path, fh, size));
        }
        if atime.is_some() || mtime.is_some() {
            tri!(reply, self.set_times(&ctx, &path, fh, atime, mtime));
        }

        let st = tri!(reply, self.stat(&ctx, &path, fh));
        reply.attr(&self.config.attr_ttl, &to_file_attr(&st, ino));
    }

    fn readlink(&mut self, req: &Request<'_>, ino: u64, reply: ReplyData) {
        let path = tri!(reply, self.path_of(ino));
        let readlink = tri!(reply, self.table.readlink.ok_or(libc::ENOSYS));
        let mut buf = vec![0u8; READLINK_MAX + 1];
        tri!(
            reply,
            check(readlink(&self.adapter, &request_context(req), &path, &mut buf))
        );
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        reply.data(&buf[..len]);
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let ctx = request_context(req).with_umask(umask);
        let path = tri!(reply, self.child_of(parent, name));
        let status = match (self.table.mknod, self.table.create) {
            (Some(mknod), _) => mknod(&self.adapter, &ctx, &path, mode, u64::from(rdev)),
            (None, Some(create)) if mode & S_IFMT == S_IFREG => {
                let mut fi = FileInfo::with_flags(libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY);
                let status = create(&self.adapter, &ctx, &path, mode, &mut fi);
                if status == 0
                    && let Some(release) = self.table.release
                {
                    release(&self.adapter, &ctx, &path, &mut fi);
                }
                status
            }
            _ => -libc::ENOSYS,
        };
        tri!(reply, check(status));
        self.reply_entry(&ctx, &path, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let ctx = request_context(req).with_umask(umask);
        let path = tri!(reply, self.child_of(parent, name));
        let mkdir = tri!(reply, self.table.mkdir.ok_or(libc::ENOSYS));
        tri!(reply, check(mkdir(&self.adapter, &ctx, &path, mode)));
        self.reply_entry(&ctx, &path, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = tri!(reply, self.child_of(parent, name));
        let unlink = tri!(reply, self.table.unlink.ok_or(libc::ENOSYS));
        tri!(
            reply,
            check(unlink(&self.adapter, &request_context(req), &path))
        );
        self.inodes.remove_path(&path);
        reply.ok();
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = tri!(reply, self.child_of(parent, name));
        let rmdir = tri!(reply, self.table.rmdir.ok_or(libc::ENOSYS));
        tri!(
            reply,
            check(rmdir(&self.adapter, &request_context(req), &path))
        );
        self.inodes.remove_path(&path);
        reply.ok();
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.child_of(parent, link_name));
        let target = tri!(reply, target.to_str().ok_or(libc::EINVAL));
        let symlink = tri!(reply, self.table.symlink.ok_or(libc::ENOSYS));
        tri!(reply, check(symlink(&self.adapter, &ctx, target, &path)));
        self.reply_entry(&ctx, &path, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = tri!(reply, self.child_of(parent, name));
        let to = tri!(reply, self.child_of(newparent, newname));
        let rename = tri!(reply, self.table.rename.ok_or(libc::ENOSYS));
        if flags != 0 && !self.table.capabilities().rename_flags {
            reply.error(libc::EINVAL);
            return;
        }
        tri!(
            reply,
            check(rename.call(&self.adapter, &request_context(req), &from, &to, flags))
        );
        if RenameFlags::from_bits_retain(flags).contains(RenameFlags::EXCHANGE) {
            self.inodes.exchange(&from, &to);
        } else {
            self.inodes.rename(&from, &to);
        }
        reply.ok();
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let ctx = request_context(req);
        let from = tri!(reply, self.path_of(ino));
        let to = tri!(reply, self.child_of(newparent, newname));
        let link = tri!(reply, self.table.link.ok_or(libc::ENOSYS));
        tri!(reply, check(link(&self.adapter, &ctx, &from, &to)));
        self.reply_entry(&ctx, &to, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = tri!(reply, self.path_of(ino));
        let mut fi = FileInfo::with_flags(flags);
        if let Some(open) = self.table.open {
            tri!(
                reply,
                check(open(&self.adapter, &request_context(req), &path, &mut fi))
            );
        }
        reply.opened(fi.fh, open_flags(&fi));
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.path_of(ino));
        let offset = tri!(reply, offset_u64(offset));
        let fi = FileInfo {
            flags,
            fh,
            lock_owner: lock_owner.unwrap_or_default(),
            ..FileInfo::default()
        };

        if let Some(read_buf) = self.table.read_buf {
            let mut out = None;
            let status = read_buf(&self.adapter, &ctx, &path, &mut out, size as usize, offset, &fi);
            tri!(reply, check(status));
            let bytes = tri!(reply, read_reply_bytes(out).map_err(|e| e.raw()));
            reply.data(&bytes);
        } else if let Some(read) = self.table.read {
            let mut buf = vec![0u8; size as usize];
            let n = tri!(
                reply,
                check(read(&self.adapter, &ctx, &path, &mut buf, offset, &fi))
            );
            reply.data(&buf[..n as usize]);
        } else {
            reply.error(libc::ENOSYS);
        }
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.path_of(ino));
        let offset = tri!(reply, offset_u64(offset));
        let fi = FileInfo {
            flags,
            fh,
            writepage: write_flags & WRITE_CACHE != 0,
            lock_owner: lock_owner.unwrap_or_default(),
            ..FileInfo::default()
        };

        let status = if let Some(write_buf) = self.table.write_buf {
            let mut bufv = BufVec::from_mem([data]);
            write_buf(&self.adapter, &ctx, &path, &mut bufv, offset, &fi)
        } else if let Some(write) = self.table.write {
            write(&self.adapter, &ctx, &path, data, offset, &fi)
        } else {
            -libc::ENOSYS
        };
        let written = tri!(reply, check(status));
        reply.written(written as u32);
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        let path = tri!(reply, self.path_of(ino));
        if let Some(flush) = self.table.flush {
            let mut fi = FileInfo {
                fh,
                lock_owner,
                ..FileInfo::default()
            };
            tri!(
                reply,
                check(flush(&self.adapter, &request_context(req), &path, &mut fi))
            );
        }
        reply.ok();
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = tri!(reply, self.path_of(ino));
        if let Some(release) = self.table.release {
            let mut fi = FileInfo {
                flags,
                fh,
                flush,
                lock_owner: lock_owner.unwrap_or_default(),
                ..FileInfo::default()
            };
            let status = release(&self.adapter, &request_context(req), &path, &mut fi);
            if status < 0 {
                debug!(path = %path, status, "Release failed");
            }
        }
        reply.ok();
    }

    fn fsync(&mut self, req: &Request<'_>, ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        let path = tri!(reply, self.path_of(ino));
        let fsync = tri!(reply, self.table.fsync.ok_or(libc::ENOSYS));
        let fi = FileInfo::with_handle(fh);
        tri!(
            reply,
            check(fsync(
                &self.adapter,
                &request_context(req),
                &path,
                i32::from(datasync),
                &fi
            ))
        );
        reply.ok();
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = tri!(reply, self.path_of(ino));
        let mut fi = FileInfo::with_flags(flags);
        if let Some(opendir) = self.table.opendir {
            tri!(
                reply,
                check(opendir(&self.adapter, &request_context(req), &path, &mut fi))
            );
        }
        reply.opened(fi.fh, open_flags(&fi));
    }

    fn readdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.path_of(ino));
        let offset = tri!(reply, offset_u64(offset));
        let page = tri!(
            reply,
            self.list(&ctx, &path, fh, offset, ReaddirFlags::empty())
        );
        for (next, entry) in page {
            let entry_ino = self.entry_ino(ino, &path, &entry.name);
            let kind = if entry.dtype == 0 {
                FileType::RegularFile
            } else {
                file_type(entry.dtype << 12)
            };
            if reply.add(entry_ino, next as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn readdirplus(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectoryPlus,
    ) {
        let ctx = request_context(req);
        let path = tri!(reply, self.path_of(ino));
        let offset = tri!(reply, offset_u64(offset));
        let page = tri!(
            reply,
            self.list(&ctx, &path, fh, offset, ReaddirFlags::PLUS)
        );
        for (next, entry) in page {
            let entry_path = match entry.name.as_str() {
                "." => path.clone(),
                ".." => parent_of(&path).to_string(),
                name => child_path(&path, name),
            };
            let st = match entry.attr {
                Some(st) => st,
                None => match self.stat(&ctx, &entry_path, None) {
                    Ok(st) => st,
                    Err(errno) => {
                        debug!(path = %entry_path, errno, "Skipping entry without attributes");
                        continue;
                    }
                },
            };
            let entry_ino = match entry.name.as_str() {
                "." | ".." => self.entry_ino(ino, &path, &entry.name),
                _ => self.inodes.lookup(&entry_path),
            };
            let attr = to_file_attr(&st, entry_ino);
            if reply.add(
                entry_ino,
                next as i64,
                &entry.name,
                &self.config.entry_ttl,
                &attr,
                0,
            ) {
                if !matches!(entry.name.as_str(), "." | "..") {
                    self.inodes.forget(entry_ino, 1);
                }
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, req: &Request<'_>, ino: u64, fh: u64, flags: i32, reply: ReplyEmpty) {
        let path = tri!(reply, self.path_of(ino));
        if let Some(releasedir) = self.table.releasedir {
            let mut fi = FileInfo {
                flags,
                fh,
                ..FileInfo::default()
            };
            tri!(
                reply,
                check(releasedir(&self.adapter, &request_context(req), &path, &mut fi))
            );
        }
        reply.ok();
    }

    fn fsyncdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let fsyncdir = tri!(reply, self.table.fsyncdir.ok_or(libc::ENOSYS));
        let fi = FileInfo::with_handle(fh);
        tri!(
            reply,
            check(fsyncdir(
                &self.adapter,
                &request_context(req),
                &path,
                i32::from(datasync),
                &fi
            ))
        );
        reply.ok();
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = tri!(reply, self.path_of(ino));
        let mut st = StatFs {
            namemax: 255,
            ..StatFs::default()
        };
        if let Some(statfs) = self.table.statfs {
            tri!(
                reply,
                check(statfs(&self.adapter, &request_context(req), &path, &mut st))
            );
        }
        let st = with_name_limit(st);
        reply.statfs(
            st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namemax, st.frsize,
        );
    }

    fn setxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let name = tri!(reply, name_str(name));
        let setxattr = tri!(reply, self.table.setxattr.ok_or(libc::ENOSYS));
        tri!(
            reply,
            check(setxattr(
                &self.adapter,
                &request_context(req),
                &path,
                name,
                value,
                flags
            ))
        );
        reply.ok();
    }

    fn getxattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let name = tri!(reply, name_str(name));
        let getxattr = tri!(reply, self.table.getxattr.ok_or(libc::ENOSYS));
        let mut buf = vec![0u8; size as usize];
        let len = tri!(
            reply,
            check(getxattr(
                &self.adapter,
                &request_context(req),
                &path,
                name,
                &mut buf
            ))
        );
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..(len as usize).min(buf.len())]);
        }
    }

    fn listxattr(&mut self, req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        let path = tri!(reply, self.path_of(ino));
        let listxattr = tri!(reply, self.table.listxattr.ok_or(libc::ENOSYS));
        let mut buf = vec![0u8; size as usize];
        let len = tri!(
            reply,
            check(listxattr(&self.adapter, &request_context(req), &path, &mut buf))
        );
        if size == 0 {
            reply.size(len as u32);
        } else {
            reply.data(&buf[..(len as usize).min(buf.len())]);
        }
    }

    fn removexattr(&mut self, req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let path = tri!(reply, self.path_of(ino));
        let name = tri!(reply, name_str(name));
        let removexattr = tri!(reply, self.table.removexattr.ok_or(libc::ENOSYS));
        tri!(
            reply,
            check(removexattr(&self.adapter, &request_context(req), &path, name))
        );
        reply.ok();
    }

    fn access(&mut self, req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let path = tri!(reply, self.path_of(ino));
        let access = tri!(reply, self.table.access.ok_or(libc::ENOSYS));
        tri!(
            reply,
            check(access(&self.adapter, &request_context(req), &path, mask))
        );
        reply.ok();
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let ctx = request_context(req).with_umask(umask);
        let path = tri!(reply, self.child_of(parent, name));
        let create = tri!(reply, self.table.create.ok_or(libc::ENOSYS));
        let mut fi = FileInfo::with_flags(flags);
        tri!(reply, check(create(&self.adapter, &ctx, &path, mode, &mut fi)));
        let st = tri!(reply, self.stat(&ctx, &path, Some(fi.fh)));
        let ino = self.inodes.lookup(&path);
        reply.created(
            &self.config.entry_ttl,
            &to_file_attr(&st, ino),
            0,
            fi.fh,
            open_flags(&fi),
        );
    }

    fn getlk(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        reply: ReplyLock,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let lock = tri!(reply, self.table.lock.ok_or(libc::ENOSYS));
        let fi = FileInfo {
            fh,
            lock_owner,
            ..FileInfo::default()
        };
        let mut lk = lock_range(typ, start, end, pid);
        tri!(
            reply,
            check(lock(
                &self.adapter,
                &request_context(req),
                &path,
                &fi,
                libc::F_GETLK,
                &mut lk
            ))
        );
        reply.locked(lk.start, lock_end(&lk), lk.typ, lk.pid);
    }

    fn setlk(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        sleep: bool,
        reply: ReplyEmpty,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let lock = tri!(reply, self.table.lock.ok_or(libc::ENOSYS));
        let fi = FileInfo {
            fh,
            lock_owner,
            ..FileInfo::default()
        };
        let cmd = if sleep { libc::F_SETLKW } else { libc::F_SETLK };
        let mut lk = lock_range(typ, start, end, pid);
        tri!(
            reply,
            check(lock(
                &self.adapter,
                &request_context(req),
                &path,
                &fi,
                cmd,
                &mut lk
            ))
        );
        reply.ok();
    }

    fn bmap(&mut self, req: &Request<'_>, ino: u64, blocksize: u32, idx: u64, reply: ReplyBmap) {
        let path = tri!(reply, self.path_of(ino));
        let bmap = tri!(reply, self.table.bmap.ok_or(libc::ENOSYS));
        let mut idx = idx;
        tri!(
            reply,
            check(bmap(
                &self.adapter,
                &request_context(req),
                &path,
                blocksize as usize,
                &mut idx
            ))
        );
        reply.bmap(idx);
    }

    fn ioctl(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: u32,
        cmd: u32,
        in_data: &[u8],
        out_size: u32,
        reply: ReplyIoctl,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let ioctl = tri!(reply, self.table.ioctl.ok_or(libc::ENOSYS));
        let out_size = (out_size as usize).min(MAX_IOCTL);
        let mut data = in_data.to_vec();
        data.resize(data.len().max(out_size), 0);
        let fi = FileInfo::with_handle(fh);
        let result = tri!(
            reply,
            check(ioctl(
                &self.adapter,
                &request_context(req),
                &path,
                cmd,
                &fi,
                flags,
                &mut data
            ))
        );
        reply.ioctl(result, &data[..out_size]);
    }

    fn fallocate(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        length: i64,
        mode: i32,
        reply: ReplyEmpty,
    ) {
        let path = tri!(reply, self.path_of(ino));
        let offset = tri!(reply, offset_u64(offset));
        let length = tri!(reply, offset_u64(length));
        let fallocate = tri!(reply, self.table.fallocate.ok_or(libc::ENOSYS));
        let fi = FileInfo::with_handle(fh);
        tri!(
            reply,
            check(fallocate(
                &self.adapter,
                &request_context(req),
                &path,
                mode,
                offset,
                length,
                &fi
            ))
        );
        reply.ok();
    }
}

/// Converts the kernel's inclusive `[start, end]` range into a record lock.
fn lock_range(typ: i32, start: u64, end: u64, pid: u32) -> FileLock {
    let len = if end == u64::MAX {
        0
    } else {
        end.saturating_sub(start) + 1
    };
    FileLock {
        typ,
        whence: libc::SEEK_SET,
        start,
        len,
        pid,
    }
}

/// Inclusive end of a record lock; a zero length runs to the end of file.
fn lock_end(lk: &FileLock) -> u64 {
    if lk.len == 0 {
        u64::MAX
    } else {
        lk.start.saturating_add(lk.len - 1)
    }
}

/// Backends that leave `namemax` unset still report the usual 255.
fn with_name_limit(mut st: StatFs) -> StatFs {
    if st.namemax == 0 {
        st.namemax = 255;
    }
    st
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, next_offset: u64) -> ListedEntry {
        ListedEntry {
            name: name.to_string(),
            attr: None,
            dtype: 0,
            next_offset,
        }
    }

    #[test]
    fn test_page_numbers_single_shot_listings() {
        let collector = EntryCollector {
            handle: DirHandle::new(1),
            entries: vec![entry(".", 0), entry("..", 0), entry("a", 0), entry("b", 0)],
        };
        let page = collector.page(2);
        let names: Vec<(u64, &str)> = page.iter().map(|(o, e)| (*o, e.name.as_str())).collect();
        assert_eq!(names, vec![(3, "a"), (4, "b")]);
    }

    #[test]
    fn test_page_keeps_backend_offsets() {
        let collector = EntryCollector {
            handle: DirHandle::new(1),
            entries: vec![entry("c", 7), entry("d", 8)],
        };
        let page = collector.page(6);
        assert_eq!(page.iter().map(|(o, _)| *o).collect::<Vec<_>>(), vec![7, 8]);
    }

    #[test]
    fn test_collector_ignores_foreign_handle() {
        let mut collector = EntryCollector::new(DirHandle::new(4));
        collector.emit(
            DirHandle::new(5),
            FillRecord::Entry {
                name: "x",
                attr: None,
                next_offset: 0,
            },
        );
        collector.emit(
            DirHandle::new(4),
            FillRecord::Legacy {
                name: "y",
                dtype: 4,
                ino: 0,
            },
        );
        assert_eq!(collector.entries.len(), 1);
        assert_eq!(collector.entries[0].dtype, 4);
    }

    #[test]
    fn test_lock_range() {
        let lk = lock_range(libc::F_WRLCK, 10, 19, 3);
        assert_eq!((lk.start, lk.len), (10, 10));
        let whole = lock_range(libc::F_RDLCK, 0, u64::MAX, 3);
        assert_eq!(whole.len, 0);
    }

    #[test]
    fn test_lock_end() {
        let lk = lock_range(libc::F_WRLCK, 10, 19, 3);
        assert_eq!(lock_end(&lk), 19);
        let whole = lock_range(libc::F_RDLCK, 5, u64::MAX, 3);
        assert_eq!(lock_end(&whole), u64::MAX);
        let near_max = FileLock {
            start: u64::MAX - 1,
            len: 10,
            ..FileLock::default()
        };
        assert_eq!(lock_end(&near_max), u64::MAX);
    }

    #[test]
    fn test_name_limit_filled_when_backend_zeroes_it() {
        let zeroed = with_name_limit(StatFs::default());
        assert_eq!(zeroed.namemax, 255);
        let reported = with_name_limit(StatFs {
            namemax: 1024,
            ..StatFs::default()
        });
        assert_eq!(reported.namemax, 1024);
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/"), "/");
    }

    #[test]
    fn test_check_splits_status() {
        assert_eq!(check(5), Ok(5));
        assert_eq!(check(-libc::ENOENT), Err(libc::ENOENT));
    }
}
