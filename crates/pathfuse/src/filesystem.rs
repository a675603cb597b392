//! The path-based operation contract a backend implements.

use crate::bufvec::{self, BufVec};
use crate::dirfill::{DirFiller, ReaddirFlags};
use crate::error::{Errno, OpResult};
use crate::ops::OpSet;
use crate::session::SessionContext;
use crate::types::{
    FileInfo, FileLock, FileStat, LockCmd, PollHandle, RenameFlags, StatFs, Timespec,
};

/// A filesystem addressed by absolute paths.
///
/// Every method has a default. Most return `ENOSYS`; `open`, `release`,
/// `statfs`, `opendir`, `releasedir`, `init` and `destroy` succeed without
/// doing anything. `ftruncate` and `fgetattr` fall back to their path-based
/// counterparts, and `write_buf`/`read_buf` are emulated with `write`/`read`.
///
/// [`OPERATIONS`](Self::OPERATIONS) lists the operations the backend
/// actually provides; the dispatch table leaves every other slot unbound so
/// the runtime can tell "absent" apart from "failed with ENOSYS".
///
/// Implementations are called from many runtime threads at once.
pub trait PathFilesystem: Send + Sync + 'static {
    /// Operations this backend implements.
    const OPERATIONS: OpSet = OpSet::ALL;

    /// Called once the runtime has mounted the filesystem.
    fn init(&self, cx: &SessionContext) {
        let _ = cx;
    }

    /// Called when the filesystem is unmounted.
    fn destroy(&self) {}

    /// File attributes.
    fn getattr(&self, cx: &SessionContext, path: &str) -> OpResult<FileStat> {
        let _ = (cx, path);
        Err(Errno::ENOSYS)
    }

    /// Target of a symbolic link.
    fn readlink(&self, cx: &SessionContext, path: &str) -> OpResult<String> {
        let _ = (cx, path);
        Err(Errno::ENOSYS)
    }

    /// Creates a file node. `mode` carries the file type bits.
    fn mknod(&self, cx: &SessionContext, path: &str, mode: u32, rdev: u64) -> OpResult {
        let _ = (cx, path, mode, rdev);
        Err(Errno::ENOSYS)
    }

    /// Creates a directory.
    fn mkdir(&self, cx: &SessionContext, path: &str, mode: u32) -> OpResult {
        let _ = (cx, path, mode);
        Err(Errno::ENOSYS)
    }

    /// Removes a file.
    fn unlink(&self, cx: &SessionContext, path: &str) -> OpResult {
        let _ = (cx, path);
        Err(Errno::ENOSYS)
    }

    /// Removes an empty directory.
    fn rmdir(&self, cx: &SessionContext, path: &str) -> OpResult {
        let _ = (cx, path);
        Err(Errno::ENOSYS)
    }

    /// Creates `link` pointing at `target`.
    fn symlink(&self, cx: &SessionContext, target: &str, link: &str) -> OpResult {
        let _ = (cx, target, link);
        Err(Errno::ENOSYS)
    }

    /// Renames `from` to `to`. Revisions without rename flags always pass
    /// empty flags.
    fn rename(&self, cx: &SessionContext, from: &str, to: &str, flags: RenameFlags) -> OpResult {
        let _ = (cx, from, to, flags);
        Err(Errno::ENOSYS)
    }

    /// Creates a hard link `to` for `from`.
    fn link(&self, cx: &SessionContext, from: &str, to: &str) -> OpResult {
        let _ = (cx, from, to);
        Err(Errno::ENOSYS)
    }

    /// Changes permission bits.
    fn chmod(&self, cx: &SessionContext, path: &str, mode: u32) -> OpResult {
        let _ = (cx, path, mode);
        Err(Errno::ENOSYS)
    }

    /// Changes ownership. `None` leaves the id unchanged.
    fn chown(
        &self,
        cx: &SessionContext,
        path: &str,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> OpResult {
        let _ = (cx, path, uid, gid);
        Err(Errno::ENOSYS)
    }

    /// Changes the size of a file.
    fn truncate(&self, cx: &SessionContext, path: &str, size: u64) -> OpResult {
        let _ = (cx, path, size);
        Err(Errno::ENOSYS)
    }

    /// Opens a file. The backend may store a handle in `fi.fh`.
    fn open(&self, cx: &SessionContext, path: &str, fi: &mut FileInfo) -> OpResult {
        let _ = (cx, path, fi);
        Ok(())
    }

    /// Reads into `buf` from `offset`, returning the bytes read.
    fn read(
        &self,
        cx: &SessionContext,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        fi: &FileInfo,
    ) -> OpResult<usize> {
        let _ = (cx, path, buf, offset, fi);
        Err(Errno::ENOSYS)
    }

    /// Writes `data` at `offset`, returning the bytes accepted.
    fn write(
        &self,
        cx: &SessionContext,
        path: &str,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
    ) -> OpResult<usize> {
        let _ = (cx, path, data, offset, fi);
        Err(Errno::ENOSYS)
    }

    /// Filesystem statistics.
    fn statfs(&self, cx: &SessionContext, path: &str) -> OpResult<StatFs> {
        let _ = (cx, path);
        Ok(StatFs::default())
    }

    /// Called on each `close(2)` of an open file.
    fn flush(&self, cx: &SessionContext, path: &str, fi: &FileInfo) -> OpResult {
        let _ = (cx, path, fi);
        Err(Errno::ENOSYS)
    }

    /// Called when the last reference to an open file goes away.
    fn release(&self, cx: &SessionContext, path: &str, fi: &FileInfo) -> OpResult {
        let _ = (cx, path, fi);
        Ok(())
    }

    /// Flushes file contents (and metadata unless `datasync`).
    fn fsync(&self, cx: &SessionContext, path: &str, datasync: bool, fi: &FileInfo) -> OpResult {
        let _ = (cx, path, datasync, fi);
        Err(Errno::ENOSYS)
    }

    /// Sets an extended attribute. `flags` carries `XATTR_CREATE`/`XATTR_REPLACE`.
    fn setxattr(
        &self,
        cx: &SessionContext,
        path: &str,
        name: &str,
        value: &[u8],
        flags: i32,
    ) -> OpResult {
        let _ = (cx, path, name, value, flags);
        Err(Errno::ENOSYS)
    }

    /// Reads an extended attribute into `buf`. An empty `buf` asks for the
    /// size only.
    fn getxattr(
        &self,
        cx: &SessionContext,
        path: &str,
        name: &str,
        buf: &mut [u8],
    ) -> OpResult<usize> {
        let _ = (cx, path, name, buf);
        Err(Errno::ENOSYS)
    }

    /// Writes NUL-separated attribute names into `buf`. An empty `buf` asks
    /// for the size only.
    fn listxattr(&self, cx: &SessionContext, path: &str, buf: &mut [u8]) -> OpResult<usize> {
        let _ = (cx, path, buf);
        Err(Errno::ENOSYS)
    }

    /// Removes an extended attribute.
    fn removexattr(&self, cx: &SessionContext, path: &str, name: &str) -> OpResult {
        let _ = (cx, path, name);
        Err(Errno::ENOSYS)
    }

    /// Opens a directory.
    fn opendir(&self, cx: &SessionContext, path: &str, fi: &mut FileInfo) -> OpResult {
        let _ = (cx, path, fi);
        Ok(())
    }

    /// Lists a directory by pushing entries into `filler`.
    ///
    /// Stop as soon as [`DirFiller::fill_dir`] returns `true`. `flags` is
    /// passed through from the runtime as-is.
    fn readdir(
        &self,
        cx: &SessionContext,
        path: &str,
        offset: u64,
        fi: &FileInfo,
        filler: &mut DirFiller<'_>,
        flags: ReaddirFlags,
    ) -> OpResult {
        let _ = (cx, path, offset, fi, filler, flags);
        Err(Errno::ENOSYS)
    }

    /// Releases a directory opened by `opendir`.
    fn releasedir(&self, cx: &SessionContext, path: &str, fi: &FileInfo) -> OpResult {
        let _ = (cx, path, fi);
        Ok(())
    }

    /// Flushes directory contents.
    fn fsyncdir(
        &self,
        cx: &SessionContext,
        path: &str,
        datasync: bool,
        fi: &FileInfo,
    ) -> OpResult {
        let _ = (cx, path, datasync, fi);
        Err(Errno::ENOSYS)
    }

    /// Checks access permissions. `mask` is an `access(2)` mode.
    fn access(&self, cx: &SessionContext, path: &str, mask: i32) -> OpResult {
        let _ = (cx, path, mask);
        Err(Errno::ENOSYS)
    }

    /// Creates and opens a regular file.
    fn create(&self, cx: &SessionContext, path: &str, mode: u32, fi: &mut FileInfo) -> OpResult {
        let _ = (cx, path, mode, fi);
        Err(Errno::ENOSYS)
    }

    /// Changes the size of an open file.
    fn ftruncate(&self, cx: &SessionContext, path: &str, size: u64, fi: &FileInfo) -> OpResult {
        let _ = fi;
        self.truncate(cx, path, size)
    }

    /// Attributes of an open file.
    fn fgetattr(&self, cx: &SessionContext, path: &str, fi: &FileInfo) -> OpResult<FileStat> {
        let _ = fi;
        self.getattr(cx, path)
    }

    /// POSIX record locking.
    fn lock(
        &self,
        cx: &SessionContext,
        path: &str,
        fi: &FileInfo,
        cmd: LockCmd,
        lock: &mut FileLock,
    ) -> OpResult {
        let _ = (cx, path, fi, cmd, lock);
        Err(Errno::ENOSYS)
    }

    /// Sets access and modification times (`[atime, mtime]`).
    fn utimens(&self, cx: &SessionContext, path: &str, times: &[Timespec; 2]) -> OpResult {
        let _ = (cx, path, times);
        Err(Errno::ENOSYS)
    }

    /// Maps a file block index to a device block index.
    fn bmap(&self, cx: &SessionContext, path: &str, blocksize: usize, idx: u64) -> OpResult<u64> {
        let _ = (cx, path, blocksize, idx);
        Err(Errno::ENOSYS)
    }

    /// Device-specific control. `data` is both input and output.
    fn ioctl(
        &self,
        cx: &SessionContext,
        path: &str,
        cmd: u32,
        fi: &FileInfo,
        flags: u32,
        data: &mut [u8],
    ) -> OpResult<i32> {
        let _ = (cx, path, cmd, fi, flags, data);
        Err(Errno::ENOSYS)
    }

    /// Readiness of an open file; returns a `poll(2)` revents mask.
    fn poll(
        &self,
        cx: &SessionContext,
        path: &str,
        fi: &FileInfo,
        handle: Option<PollHandle>,
    ) -> OpResult<u32> {
        let _ = (cx, path, fi, handle);
        Err(Errno::ENOSYS)
    }

    /// Writes a segmented buffer.
    fn write_buf(
        &self,
        cx: &SessionContext,
        path: &str,
        bufv: &mut BufVec,
        offset: u64,
        fi: &FileInfo,
    ) -> OpResult<usize> {
        bufvec::write_vector(self, cx, path, bufv, offset, fi)
    }

    /// Reads into a segmented buffer.
    fn read_buf(
        &self,
        cx: &SessionContext,
        path: &str,
        size: usize,
        offset: u64,
        fi: &FileInfo,
    ) -> OpResult<BufVec> {
        bufvec::read_vector(self, cx, path, size, offset, fi)
    }

    /// BSD whole-file locking. `op` is a `flock(2)` operation.
    fn flock(&self, cx: &SessionContext, path: &str, fi: &FileInfo, op: i32) -> OpResult {
        let _ = (cx, path, fi, op);
        Err(Errno::ENOSYS)
    }

    /// Allocates space for an open file.
    fn fallocate(
        &self,
        cx: &SessionContext,
        path: &str,
        mode: i32,
        offset: u64,
        len: u64,
        fi: &FileInfo,
    ) -> OpResult {
        let _ = (cx, path, mode, offset, len, fi);
        Err(Errno::ENOSYS)
    }
}
