//! Per-slot entry points bound into the dispatch table.
//!
//! Each trampoline resolves the session identity, adapts the slot's
//! parameter shape to [`PathFilesystem`], and turns the result back into a
//! boundary status.

use super::UtimBuf;
use crate::adapter::Adapter;
use crate::bufvec::BufVec;
use crate::dirfill::{DirEmitter, DirFiller, DirHandle, FillShape, ReaddirFlags};
use crate::error::{Errno, IntoStatus, OpResult};
use crate::filesystem::PathFilesystem;
use crate::ops::Op;
use crate::session::SessionContext;
use crate::types::{
    FileInfo, FileLock, FileStat, LockCmd, PollHandle, RenameFlags, RequestContext, StatFs,
    Timespec,
};
use tracing::{debug, info, trace};

fn enter<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    op: Op,
    path: &str,
) -> SessionContext {
    trace!(op = op.name(), path, "Dispatch");
    adapter.session(ctx)
}

fn logged<T>(op: Op, path: &str, result: OpResult<T>) -> OpResult<T> {
    if let Err(e) = &result
        && *e != Errno::ENOENT
    {
        debug!(op = op.name(), path, error = %e, "Operation failed");
    }
    result
}

/// Runs the backend call and writes `Ok` values through `store`.
fn reply<T>(op: Op, path: &str, result: OpResult<T>, store: impl FnOnce(T)) -> i32 {
    match logged(op, path, result) {
        Ok(value) => {
            store(value);
            0
        }
        Err(e) => e.status(),
    }
}

fn status(op: Op, path: &str, result: OpResult) -> i32 {
    logged(op, path, result).into_status()
}

fn optional_id(id: u32) -> Option<u32> {
    (id != u32::MAX).then_some(id)
}

pub(super) fn getattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    out: &mut FileStat,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Getattr, path);
    reply(Op::Getattr, path, adapter.filesystem().getattr(&cx, path), |st| *out = st)
}

pub(super) fn readlink<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    buf: &mut [u8],
) -> i32 {
    let cx = enter(adapter, ctx, Op::Readlink, path);
    if buf.is_empty() {
        return Errno::EINVAL.status();
    }
    reply(Op::Readlink, path, adapter.filesystem().readlink(&cx, path), |target| {
        let n = target.len().min(buf.len() - 1);
        buf[..n].copy_from_slice(&target.as_bytes()[..n]);
        buf[n] = 0;
    })
}

pub(super) fn getdir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    handle: DirHandle,
    emitter: &mut dyn DirEmitter,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Getdir, path);
    let mut filler = DirFiller::new(handle, FillShape::Legacy, emitter);
    let result = adapter.filesystem().readdir(
        &cx,
        path,
        0,
        &FileInfo::default(),
        &mut filler,
        ReaddirFlags::empty(),
    );
    status(Op::Getdir, path, result)
}

pub(super) fn mknod<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mode: u32,
    rdev: u64,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Mknod, path);
    status(Op::Mknod, path, adapter.filesystem().mknod(&cx, path, mode, rdev))
}

pub(super) fn mkdir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mode: u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Mkdir, path);
    status(Op::Mkdir, path, adapter.filesystem().mkdir(&cx, path, mode))
}

pub(super) fn unlink<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Unlink, path);
    status(Op::Unlink, path, adapter.filesystem().unlink(&cx, path))
}

pub(super) fn rmdir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Rmdir, path);
    status(Op::Rmdir, path, adapter.filesystem().rmdir(&cx, path))
}

pub(super) fn symlink<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    target: &str,
    link: &str,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Symlink, link);
    status(Op::Symlink, link, adapter.filesystem().symlink(&cx, target, link))
}

pub(super) fn rename<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    from: &str,
    to: &str,
) -> i32 {
    rename_flags(adapter, ctx, from, to, 0)
}

pub(super) fn rename_flags<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    from: &str,
    to: &str,
    flags: u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Rename, from);
    let result = adapter
        .filesystem()
        .rename(&cx, from, to, RenameFlags::from_bits_retain(flags));
    status(Op::Rename, from, result)
}

pub(super) fn link<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    from: &str,
    to: &str,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Link, from);
    status(Op::Link, from, adapter.filesystem().link(&cx, from, to))
}

pub(super) fn chmod<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mode: u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Chmod, path);
    status(Op::Chmod, path, adapter.filesystem().chmod(&cx, path, mode))
}

pub(super) fn chown<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    uid: u32,
    gid: u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Chown, path);
    let result = adapter
        .filesystem()
        .chown(&cx, path, optional_id(uid), optional_id(gid));
    status(Op::Chown, path, result)
}

pub(super) fn truncate<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    size: u64,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Truncate, path);
    status(Op::Truncate, path, adapter.filesystem().truncate(&cx, path, size))
}

pub(super) fn utime<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    times: &UtimBuf,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Utime, path);
    let times = [
        Timespec::from_secs(times.actime),
        Timespec::from_secs(times.modtime),
    ];
    status(Op::Utime, path, adapter.filesystem().utimens(&cx, path, &times))
}

pub(super) fn open<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Open, path);
    status(Op::Open, path, adapter.filesystem().open(&cx, path, fi))
}

pub(super) fn read<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    buf: &mut [u8],
    offset: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Read, path);
    let size = buf.len();
    let result = adapter.filesystem().read(&cx, path, buf, offset, fi);
    logged(Op::Read, path, result.map(|n| n.min(size))).into_status()
}

pub(super) fn write<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    data: &[u8],
    offset: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Write, path);
    let result = adapter.filesystem().write(&cx, path, data, offset, fi);
    logged(Op::Write, path, result).into_status()
}

pub(super) fn statfs<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    out: &mut StatFs,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Statfs, path);
    reply(Op::Statfs, path, adapter.filesystem().statfs(&cx, path), |st| *out = st)
}

pub(super) fn flush<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Flush, path);
    status(Op::Flush, path, adapter.filesystem().flush(&cx, path, fi))
}

pub(super) fn release<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Release, path);
    status(Op::Release, path, adapter.filesystem().release(&cx, path, fi))
}

pub(super) fn fsync<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    datasync: i32,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Fsync, path);
    let result = adapter.filesystem().fsync(&cx, path, datasync != 0, fi);
    status(Op::Fsync, path, result)
}

pub(super) fn setxattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    name: &str,
    value: &[u8],
    flags: i32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Setxattr, path);
    let result = adapter.filesystem().setxattr(&cx, path, name, value, flags);
    status(Op::Setxattr, path, result)
}

pub(super) fn getxattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    name: &str,
    buf: &mut [u8],
) -> i32 {
    let cx = enter(adapter, ctx, Op::Getxattr, path);
    let result = adapter.filesystem().getxattr(&cx, path, name, buf);
    logged(Op::Getxattr, path, result).into_status()
}

pub(super) fn listxattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    buf: &mut [u8],
) -> i32 {
    let cx = enter(adapter, ctx, Op::Listxattr, path);
    let result = adapter.filesystem().listxattr(&cx, path, buf);
    logged(Op::Listxattr, path, result).into_status()
}

pub(super) fn removexattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    name: &str,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Removexattr, path);
    status(Op::Removexattr, path, adapter.filesystem().removexattr(&cx, path, name))
}

pub(super) fn opendir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Opendir, path);
    status(Op::Opendir, path, adapter.filesystem().opendir(&cx, path, fi))
}

pub(super) fn readdir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    handle: DirHandle,
    emitter: &mut dyn DirEmitter,
    offset: u64,
    fi: &FileInfo,
) -> i32 {
    readdir_flags(adapter, ctx, path, handle, emitter, offset, fi, 0)
}

pub(super) fn readdir_flags<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    handle: DirHandle,
    emitter: &mut dyn DirEmitter,
    offset: u64,
    fi: &FileInfo,
    flags: u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Readdir, path);
    let mut filler = DirFiller::new(handle, FillShape::Offset, emitter);
    let result = adapter.filesystem().readdir(
        &cx,
        path,
        offset,
        fi,
        &mut filler,
        ReaddirFlags::from_bits_retain(flags),
    );
    status(Op::Readdir, path, result)
}

pub(super) fn releasedir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Releasedir, path);
    status(Op::Releasedir, path, adapter.filesystem().releasedir(&cx, path, fi))
}

pub(super) fn fsyncdir<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    datasync: i32,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Fsyncdir, path);
    let result = adapter.filesystem().fsyncdir(&cx, path, datasync != 0, fi);
    status(Op::Fsyncdir, path, result)
}

pub(super) fn init<F: PathFilesystem>(adapter: &Adapter<F>, ctx: &RequestContext) -> i32 {
    let cx = enter(adapter, ctx, Op::Init, "/");
    adapter.filesystem().init(&cx);
    adapter.mark_mounted();
    info!(revision = %adapter.capabilities().revision, "Filesystem initialized");
    0
}

pub(super) fn destroy<F: PathFilesystem>(adapter: &Adapter<F>) {
    trace!(op = Op::Destroy.name(), "Dispatch");
    adapter.filesystem().destroy();
    adapter.mark_unmounted();
    info!("Filesystem destroyed");
}

pub(super) fn access<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mask: i32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Access, path);
    status(Op::Access, path, adapter.filesystem().access(&cx, path, mask))
}

pub(super) fn create<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mode: u32,
    fi: &mut FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Create, path);
    status(Op::Create, path, adapter.filesystem().create(&cx, path, mode, fi))
}

pub(super) fn ftruncate<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    size: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Ftruncate, path);
    status(Op::Ftruncate, path, adapter.filesystem().ftruncate(&cx, path, size, fi))
}

pub(super) fn fgetattr<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    out: &mut FileStat,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Fgetattr, path);
    reply(Op::Fgetattr, path, adapter.filesystem().fgetattr(&cx, path, fi), |st| *out = st)
}

pub(super) fn lock<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &FileInfo,
    cmd: i32,
    lock: &mut FileLock,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Lock, path);
    let Some(cmd) = LockCmd::from_raw(cmd) else {
        return Errno::EINVAL.status();
    };
    status(Op::Lock, path, adapter.filesystem().lock(&cx, path, fi, cmd, lock))
}

pub(super) fn utimens<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    times: &[Timespec; 2],
) -> i32 {
    let cx = enter(adapter, ctx, Op::Utimens, path);
    status(Op::Utimens, path, adapter.filesystem().utimens(&cx, path, times))
}

pub(super) fn bmap<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    blocksize: usize,
    idx: &mut u64,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Bmap, path);
    let result = adapter.filesystem().bmap(&cx, path, blocksize, *idx);
    reply(Op::Bmap, path, result, |mapped| *idx = mapped)
}

pub(super) fn ioctl<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    cmd: u32,
    fi: &FileInfo,
    flags: u32,
    data: &mut [u8],
) -> i32 {
    let cx = enter(adapter, ctx, Op::Ioctl, path);
    let result = adapter.filesystem().ioctl(&cx, path, cmd, fi, flags, data);
    logged(Op::Ioctl, path, result).into_status()
}

pub(super) fn poll<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &FileInfo,
    handle: Option<PollHandle>,
    revents: &mut u32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Poll, path);
    let result = adapter.filesystem().poll(&cx, path, fi, handle);
    reply(Op::Poll, path, result, |mask| *revents = mask)
}

pub(super) fn write_buf<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    bufv: &mut BufVec,
    offset: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::WriteBuf, path);
    let result = adapter.filesystem().write_buf(&cx, path, bufv, offset, fi);
    logged(Op::WriteBuf, path, result).into_status()
}

pub(super) fn read_buf<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    out: &mut Option<BufVec>,
    size: usize,
    offset: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::ReadBuf, path);
    let result = adapter.filesystem().read_buf(&cx, path, size, offset, fi);
    reply(Op::ReadBuf, path, result, |bufv| *out = Some(bufv))
}

pub(super) fn flock<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    fi: &FileInfo,
    op: i32,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Flock, path);
    status(Op::Flock, path, adapter.filesystem().flock(&cx, path, fi, op))
}

pub(super) fn fallocate<F: PathFilesystem>(
    adapter: &Adapter<F>,
    ctx: &RequestContext,
    path: &str,
    mode: i32,
    offset: u64,
    len: u64,
    fi: &FileInfo,
) -> i32 {
    let cx = enter(adapter, ctx, Op::Fallocate, path);
    let result = adapter
        .filesystem()
        .fallocate(&cx, path, mode, offset, len, fi);
    status(Op::Fallocate, path, result)
}
