//! The callback table handed to the driver runtime.
//!
//! A [`DispatchTable`] holds one optional `fn` pointer per slot. A slot is
//! bound only if the negotiated revision has it and the backend lists the
//! operation behind it in [`PathFilesystem::OPERATIONS`]; every other slot
//! stays `None`, which the runtime treats as "capability absent".
//!
//! Entries speak the boundary convention: an `i32` that is zero (or a byte
//! count) on success and a negated errno on failure, with results written
//! through out-parameters.

mod trampoline;

use crate::adapter::Adapter;
use crate::bufvec::BufVec;
use crate::dirfill::DirEmitter;
use crate::dirfill::DirHandle;
use crate::filesystem::PathFilesystem;
use crate::ops::{Op, OpSet};
use crate::revision::Capabilities;
use crate::types::{FileInfo, FileLock, FileStat, PollHandle, RequestContext, StatFs, Timespec};
use std::fmt;

/// Whole-second timestamps of the legacy `utime` slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UtimBuf {
    /// Access time.
    pub actime: i64,
    /// Modification time.
    pub modtime: i64,
}

pub type GetattrFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut FileStat) -> i32;
/// Copies the link target into the buffer, truncated and NUL-terminated.
pub type ReadlinkFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut [u8]) -> i32;
pub type GetdirFn<F> =
    fn(&Adapter<F>, &RequestContext, &str, DirHandle, &mut dyn DirEmitter) -> i32;
pub type MknodFn<F> = fn(&Adapter<F>, &RequestContext, &str, u32, u64) -> i32;
pub type ModeFn<F> = fn(&Adapter<F>, &RequestContext, &str, u32) -> i32;
pub type PathFn<F> = fn(&Adapter<F>, &RequestContext, &str) -> i32;
pub type PairFn<F> = fn(&Adapter<F>, &RequestContext, &str, &str) -> i32;
pub type RenameFlagsFn<F> = fn(&Adapter<F>, &RequestContext, &str, &str, u32) -> i32;
/// `u32::MAX` leaves the id unchanged.
pub type ChownFn<F> = fn(&Adapter<F>, &RequestContext, &str, u32, u32) -> i32;
pub type TruncateFn<F> = fn(&Adapter<F>, &RequestContext, &str, u64) -> i32;
pub type UtimeFn<F> = fn(&Adapter<F>, &RequestContext, &str, &UtimBuf) -> i32;
pub type FileFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut FileInfo) -> i32;
pub type ReadFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut [u8], u64, &FileInfo) -> i32;
pub type WriteFn<F> = fn(&Adapter<F>, &RequestContext, &str, &[u8], u64, &FileInfo) -> i32;
pub type StatfsFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut StatFs) -> i32;
/// Non-zero `datasync` restricts the sync to file contents.
pub type SyncFn<F> = fn(&Adapter<F>, &RequestContext, &str, i32, &FileInfo) -> i32;
pub type SetxattrFn<F> = fn(&Adapter<F>, &RequestContext, &str, &str, &[u8], i32) -> i32;
/// Returns the attribute size; an empty buffer only probes it.
pub type GetxattrFn<F> = fn(&Adapter<F>, &RequestContext, &str, &str, &mut [u8]) -> i32;
/// Returns the size of the name list; an empty buffer only probes it.
pub type ListxattrFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut [u8]) -> i32;
pub type ReaddirFn<F> =
    fn(&Adapter<F>, &RequestContext, &str, DirHandle, &mut dyn DirEmitter, u64, &FileInfo) -> i32;
pub type ReaddirFlagsFn<F> = fn(
    &Adapter<F>,
    &RequestContext,
    &str,
    DirHandle,
    &mut dyn DirEmitter,
    u64,
    &FileInfo,
    u32,
) -> i32;
pub type InitFn<F> = fn(&Adapter<F>, &RequestContext) -> i32;
pub type DestroyFn<F> = fn(&Adapter<F>);
pub type AccessFn<F> = fn(&Adapter<F>, &RequestContext, &str, i32) -> i32;
pub type CreateFn<F> = fn(&Adapter<F>, &RequestContext, &str, u32, &mut FileInfo) -> i32;
pub type FtruncateFn<F> = fn(&Adapter<F>, &RequestContext, &str, u64, &FileInfo) -> i32;
pub type FgetattrFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut FileStat, &FileInfo) -> i32;
/// The command is `F_GETLK`, `F_SETLK` or `F_SETLKW`; anything else is `EINVAL`.
pub type LockFn<F> = fn(&Adapter<F>, &RequestContext, &str, &FileInfo, i32, &mut FileLock) -> i32;
pub type UtimensFn<F> = fn(&Adapter<F>, &RequestContext, &str, &[Timespec; 2]) -> i32;
/// The block index is replaced in place.
pub type BmapFn<F> = fn(&Adapter<F>, &RequestContext, &str, usize, &mut u64) -> i32;
pub type IoctlFn<F> = fn(&Adapter<F>, &RequestContext, &str, u32, &FileInfo, u32, &mut [u8]) -> i32;
pub type PollFn<F> =
    fn(&Adapter<F>, &RequestContext, &str, &FileInfo, Option<PollHandle>, &mut u32) -> i32;
pub type WriteBufFn<F> = fn(&Adapter<F>, &RequestContext, &str, &mut BufVec, u64, &FileInfo) -> i32;
/// Stores the produced vector in the out slot and returns 0.
pub type ReadBufFn<F> =
    fn(&Adapter<F>, &RequestContext, &str, &mut Option<BufVec>, usize, u64, &FileInfo) -> i32;
pub type FlockFn<F> = fn(&Adapter<F>, &RequestContext, &str, &FileInfo, i32) -> i32;
pub type FallocateFn<F> = fn(&Adapter<F>, &RequestContext, &str, i32, u64, u64, &FileInfo) -> i32;

/// The rename slot, shaped by revision.
pub enum RenameEntry<F> {
    /// No flags word.
    Plain(PairFn<F>),
    /// Carries a `RENAME_*` flags word.
    WithFlags(RenameFlagsFn<F>),
}

impl<F> RenameEntry<F> {
    /// Calls the entry, dropping `flags` on the plain shape.
    pub fn call(&self, adapter: &Adapter<F>, ctx: &RequestContext, from: &str, to: &str, flags: u32) -> i32 {
        match self {
            RenameEntry::Plain(f) => f(adapter, ctx, from, to),
            RenameEntry::WithFlags(f) => f(adapter, ctx, from, to, flags),
        }
    }
}

impl<F> Clone for RenameEntry<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for RenameEntry<F> {}

/// The readdir slot, shaped by revision.
pub enum ReaddirEntry<F> {
    /// Offset-aware listing without flags.
    Offset(ReaddirFn<F>),
    /// Offset-aware listing with a flags word.
    WithFlags(ReaddirFlagsFn<F>),
}

impl<F> ReaddirEntry<F> {
    /// Calls the entry, dropping `flags` on the flagless shape.
    pub fn call(
        &self,
        adapter: &Adapter<F>,
        ctx: &RequestContext,
        path: &str,
        handle: DirHandle,
        emitter: &mut dyn DirEmitter,
        offset: u64,
        fi: &FileInfo,
        flags: u32,
    ) -> i32 {
        match self {
            ReaddirEntry::Offset(f) => f(adapter, ctx, path, handle, emitter, offset, fi),
            ReaddirEntry::WithFlags(f) => f(adapter, ctx, path, handle, emitter, offset, fi, flags),
        }
    }
}

impl<F> Clone for ReaddirEntry<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for ReaddirEntry<F> {}

/// One callback table for a backend type `F`.
pub struct DispatchTable<F> {
    pub getattr: Option<GetattrFn<F>>,
    pub readlink: Option<ReadlinkFn<F>>,
    pub getdir: Option<GetdirFn<F>>,
    pub mknod: Option<MknodFn<F>>,
    pub mkdir: Option<ModeFn<F>>,
    pub unlink: Option<PathFn<F>>,
    pub rmdir: Option<PathFn<F>>,
    pub symlink: Option<PairFn<F>>,
    pub rename: Option<RenameEntry<F>>,
    pub link: Option<PairFn<F>>,
    pub chmod: Option<ModeFn<F>>,
    pub chown: Option<ChownFn<F>>,
    pub truncate: Option<TruncateFn<F>>,
    pub utime: Option<UtimeFn<F>>,
    pub open: Option<FileFn<F>>,
    pub read: Option<ReadFn<F>>,
    pub write: Option<WriteFn<F>>,
    pub statfs: Option<StatfsFn<F>>,
    pub flush: Option<FileFn<F>>,
    pub release: Option<FileFn<F>>,
    pub fsync: Option<SyncFn<F>>,
    pub setxattr: Option<SetxattrFn<F>>,
    pub getxattr: Option<GetxattrFn<F>>,
    pub listxattr: Option<ListxattrFn<F>>,
    pub removexattr: Option<PairFn<F>>,
    pub opendir: Option<FileFn<F>>,
    pub readdir: Option<ReaddirEntry<F>>,
    pub releasedir: Option<FileFn<F>>,
    pub fsyncdir: Option<SyncFn<F>>,
    pub init: Option<InitFn<F>>,
    pub destroy: Option<DestroyFn<F>>,
    pub access: Option<AccessFn<F>>,
    pub create: Option<CreateFn<F>>,
    pub ftruncate: Option<FtruncateFn<F>>,
    pub fgetattr: Option<FgetattrFn<F>>,
    pub lock: Option<LockFn<F>>,
    pub utimens: Option<UtimensFn<F>>,
    pub bmap: Option<BmapFn<F>>,
    pub ioctl: Option<IoctlFn<F>>,
    pub poll: Option<PollFn<F>>,
    pub write_buf: Option<WriteBufFn<F>>,
    pub read_buf: Option<ReadBufFn<F>>,
    pub flock: Option<FlockFn<F>>,
    pub fallocate: Option<FallocateFn<F>>,
    capabilities: Capabilities,
}

fn slot<T>(allowed: OpSet, op: Op, entry: T) -> Option<T> {
    allowed.contains(op).then_some(entry)
}

impl<F: PathFilesystem> DispatchTable<F> {
    /// Builds the table for `F` under `caps`.
    ///
    /// Lifecycle hooks are bound whenever the revision has them, so the
    /// adapter always learns about mount and unmount.
    pub fn build(caps: Capabilities) -> Self {
        use trampoline as t;

        let mut allowed: OpSet = caps
            .operations()
            .iter()
            .filter(|op| F::OPERATIONS.contains(op.backing()))
            .collect();
        for hook in [Op::Init, Op::Destroy] {
            if caps.supports(hook) {
                allowed.insert(hook);
            }
        }

        let rename = if caps.rename_flags {
            RenameEntry::WithFlags(t::rename_flags::<F> as RenameFlagsFn<F>)
        } else {
            RenameEntry::Plain(t::rename::<F> as PairFn<F>)
        };
        let readdir = if caps.readdir_flags {
            ReaddirEntry::WithFlags(t::readdir_flags::<F> as ReaddirFlagsFn<F>)
        } else {
            ReaddirEntry::Offset(t::readdir::<F> as ReaddirFn<F>)
        };

        Self {
            getattr: slot(allowed, Op::Getattr, t::getattr::<F> as GetattrFn<F>),
            readlink: slot(allowed, Op::Readlink, t::readlink::<F> as ReadlinkFn<F>),
            getdir: slot(allowed, Op::Getdir, t::getdir::<F> as GetdirFn<F>),
            mknod: slot(allowed, Op::Mknod, t::mknod::<F> as MknodFn<F>),
            mkdir: slot(allowed, Op::Mkdir, t::mkdir::<F> as ModeFn<F>),
            unlink: slot(allowed, Op::Unlink, t::unlink::<F> as PathFn<F>),
            rmdir: slot(allowed, Op::Rmdir, t::rmdir::<F> as PathFn<F>),
            symlink: slot(allowed, Op::Symlink, t::symlink::<F> as PairFn<F>),
            rename: slot(allowed, Op::Rename, rename),
            link: slot(allowed, Op::Link, t::link::<F> as PairFn<F>),
            chmod: slot(allowed, Op::Chmod, t::chmod::<F> as ModeFn<F>),
            chown: slot(allowed, Op::Chown, t::chown::<F> as ChownFn<F>),
            truncate: slot(allowed, Op::Truncate, t::truncate::<F> as TruncateFn<F>),
            utime: slot(allowed, Op::Utime, t::utime::<F> as UtimeFn<F>),
            open: slot(allowed, Op::Open, t::open::<F> as FileFn<F>),
            read: slot(allowed, Op::Read, t::read::<F> as ReadFn<F>),
            write: slot(allowed, Op::Write, t::write::<F> as WriteFn<F>),
            statfs: slot(allowed, Op::Statfs, t::statfs::<F> as StatfsFn<F>),
            flush: slot(allowed, Op::Flush, t::flush::<F> as FileFn<F>),
            release: slot(allowed, Op::Release, t::release::<F> as FileFn<F>),
            fsync: slot(allowed, Op::Fsync, t::fsync::<F> as SyncFn<F>),
            setxattr: slot(allowed, Op::Setxattr, t::setxattr::<F> as SetxattrFn<F>),
            getxattr: slot(allowed, Op::Getxattr, t::getxattr::<F> as GetxattrFn<F>),
            listxattr: slot(allowed, Op::Listxattr, t::listxattr::<F> as ListxattrFn<F>),
            removexattr: slot(allowed, Op::Removexattr, t::removexattr::<F> as PairFn<F>),
            opendir: slot(allowed, Op::Opendir, t::opendir::<F> as FileFn<F>),
            readdir: slot(allowed, Op::Readdir, readdir),
            releasedir: slot(allowed, Op::Releasedir, t::releasedir::<F> as FileFn<F>),
            fsyncdir: slot(allowed, Op::Fsyncdir, t::fsyncdir::<F> as SyncFn<F>),
            init: slot(allowed, Op::Init, t::init::<F> as InitFn<F>),
            destroy: slot(allowed, Op::Destroy, t::destroy::<F> as DestroyFn<F>),
            access: slot(allowed, Op::Access, t::access::<F> as AccessFn<F>),
            create: slot(allowed, Op::Create, t::create::<F> as CreateFn<F>),
            ftruncate: slot(allowed, Op::Ftruncate, t::ftruncate::<F> as FtruncateFn<F>),
            fgetattr: slot(allowed, Op::Fgetattr, t::fgetattr::<F> as FgetattrFn<F>),
            lock: slot(allowed, Op::Lock, t::lock::<F> as LockFn<F>),
            utimens: slot(allowed, Op::Utimens, t::utimens::<F> as UtimensFn<F>),
            bmap: slot(allowed, Op::Bmap, t::bmap::<F> as BmapFn<F>),
            ioctl: slot(allowed, Op::Ioctl, t::ioctl::<F> as IoctlFn<F>),
            poll: slot(allowed, Op::Poll, t::poll::<F> as PollFn<F>),
            write_buf: slot(allowed, Op::WriteBuf, t::write_buf::<F> as WriteBufFn<F>),
            read_buf: slot(allowed, Op::ReadBuf, t::read_buf::<F> as ReadBufFn<F>),
            flock: slot(allowed, Op::Flock, t::flock::<F> as FlockFn<F>),
            fallocate: slot(allowed, Op::Fallocate, t::fallocate::<F> as FallocateFn<F>),
            capabilities: caps,
        }
    }
}

impl<F> DispatchTable<F> {
    /// The feature set this table was built for.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns true if the slot for `op` is bound.
    pub fn is_bound(&self, op: Op) -> bool {
        match op {
            Op::Getattr => self.getattr.is_some(),
            Op::Readlink => self.readlink.is_some(),
            Op::Getdir => self.getdir.is_some(),
            Op::Mknod => self.mknod.is_some(),
            Op::Mkdir => self.mkdir.is_some(),
            Op::Unlink => self.unlink.is_some(),
            Op::Rmdir => self.rmdir.is_some(),
            Op::Symlink => self.symlink.is_some(),
            Op::Rename => self.rename.is_some(),
            Op::Link => self.link.is_some(),
            Op::Chmod => self.chmod.is_some(),
            Op::Chown => self.chown.is_some(),
            Op::Truncate => self.truncate.is_some(),
            Op::Utime => self.utime.is_some(),
            Op::Open => self.open.is_some(),
            Op::Read => self.read.is_some(),
            Op::Write => self.write.is_some(),
            Op::Statfs => self.statfs.is_some(),
            Op::Flush => self.flush.is_some(),
            Op::Release => self.release.is_some(),
            Op::Fsync => self.fsync.is_some(),
            Op::Setxattr => self.setxattr.is_some(),
            Op::Getxattr => self.getxattr.is_some(),
            Op::Listxattr => self.listxattr.is_some(),
            Op::Removexattr => self.removexattr.is_some(),
            Op::Opendir => self.opendir.is_some(),
            Op::Readdir => self.readdir.is_some(),
            Op::Releasedir => self.releasedir.is_some(),
            Op::Fsyncdir => self.fsyncdir.is_some(),
            Op::Init => self.init.is_some(),
            Op::Destroy => self.destroy.is_some(),
            Op::Access => self.access.is_some(),
            Op::Create => self.create.is_some(),
            Op::Ftruncate => self.ftruncate.is_some(),
            Op::Fgetattr => self.fgetattr.is_some(),
            Op::Lock => self.lock.is_some(),
            Op::Utimens => self.utimens.is_some(),
            Op::Bmap => self.bmap.is_some(),
            Op::Ioctl => self.ioctl.is_some(),
            Op::Poll => self.poll.is_some(),
            Op::WriteBuf => self.write_buf.is_some(),
            Op::ReadBuf => self.read_buf.is_some(),
            Op::Flock => self.flock.is_some(),
            Op::Fallocate => self.fallocate.is_some(),
        }
    }

    /// Every bound slot.
    pub fn bound_operations(&self) -> OpSet {
        Op::ALL.into_iter().filter(|&op| self.is_bound(op)).collect()
    }
}

impl<F> Clone for DispatchTable<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for DispatchTable<F> {}

impl<F> fmt::Debug for DispatchTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("revision", &self.capabilities.revision)
            .field("bound", &self.bound_operations())
            .finish()
    }
}
