//! Plain data exchanged between the runtime, the trampolines and backends.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bit mask of the file type in a mode word.
pub const S_IFMT: u32 = libc::S_IFMT as u32;
/// Directory.
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
/// Regular file.
pub const S_IFREG: u32 = libc::S_IFREG as u32;
/// Symbolic link.
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;
/// Character device.
pub const S_IFCHR: u32 = libc::S_IFCHR as u32;
/// Block device.
pub const S_IFBLK: u32 = libc::S_IFBLK as u32;
/// Named pipe.
pub const S_IFIFO: u32 = libc::S_IFIFO as u32;
/// Socket.
pub const S_IFSOCK: u32 = libc::S_IFSOCK as u32;

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timespec {
    /// Whole seconds. Negative values predate the epoch.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nsec: u32,
}

impl Timespec {
    /// A timestamp with whole-second precision.
    pub const fn from_secs(sec: i64) -> Self {
        Self { sec, nsec: 0 }
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Converts to a [`SystemTime`].
    pub fn to_system_time(self) -> SystemTime {
        if self.sec >= 0 {
            UNIX_EPOCH + Duration::new(self.sec as u64, self.nsec)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.sec.unsigned_abs()) + Duration::from_nanos(u64::from(self.nsec))
        }
    }
}

impl From<SystemTime> for Timespec {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                sec: d.as_secs() as i64,
                nsec: d.subsec_nanos(),
            },
            Err(e) => {
                let before = e.duration();
                let mut sec = -(before.as_secs() as i64);
                let mut nsec = 0;
                if before.subsec_nanos() > 0 {
                    sec -= 1;
                    nsec = 1_000_000_000 - before.subsec_nanos();
                }
                Self { sec, nsec }
            }
        }
    }
}

/// File metadata, the equivalent of `struct stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    /// Inode number as known to the backend (0 if it has none).
    pub ino: u64,
    /// File type and permission bits.
    pub mode: u32,
    /// Number of hard links.
    pub nlink: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Device number for device nodes.
    pub rdev: u64,
    /// Size in bytes.
    pub size: u64,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
    /// Last access.
    pub atime: Timespec,
    /// Last modification.
    pub mtime: Timespec,
    /// Last status change.
    pub ctime: Timespec,
}

impl FileStat {
    /// The file type bits of `mode`.
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    /// The `d_type` value used by legacy directory fills.
    pub fn dtype(&self) -> u32 {
        self.file_type() >> 12
    }

    /// Returns true if this describes a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    /// Returns true if this describes a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type() == S_IFREG
    }

    /// Returns true if this describes a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }
}

/// Filesystem statistics, the equivalent of `struct statvfs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
    /// Filesystem block size.
    pub bsize: u32,
    /// Fragment size.
    pub frsize: u32,
    /// Size of the filesystem in `frsize` units.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Free blocks for unprivileged users.
    pub bavail: u64,
    /// Number of inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Maximum filename length.
    pub namemax: u32,
}

/// Per-open state, the equivalent of `struct fuse_file_info`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Open flags as passed to `open(2)`.
    pub flags: i32,
    /// Backend-chosen handle, returned by open/create/opendir.
    pub fh: u64,
    /// Write originates from the page cache.
    pub writepage: bool,
    /// Bypass the page cache for this file.
    pub direct_io: bool,
    /// Keep cached data across opens.
    pub keep_cache: bool,
    /// The file is not seekable.
    pub nonseekable: bool,
    /// Release is also a flush.
    pub flush: bool,
    /// Lock owner for flush/lock/release.
    pub lock_owner: u64,
}

impl FileInfo {
    /// A fresh file info carrying only open flags.
    pub fn with_flags(flags: i32) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// A file info for an already opened handle.
    pub fn with_handle(fh: u64) -> Self {
        Self {
            fh,
            ..Self::default()
        }
    }
}

/// A POSIX record lock, the equivalent of `struct flock`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileLock {
    /// `F_RDLCK`, `F_WRLCK` or `F_UNLCK`.
    pub typ: i32,
    /// `SEEK_SET`, `SEEK_CUR` or `SEEK_END`.
    pub whence: i32,
    /// Start of the locked range.
    pub start: u64,
    /// Length of the range; zero means "to end of file".
    pub len: u64,
    /// Process holding a conflicting lock (filled by `GetLock`).
    pub pid: u32,
}

/// The command of a record-lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCmd {
    /// Test for a conflicting lock.
    GetLock,
    /// Acquire or release without waiting.
    SetLock,
    /// Acquire, waiting for conflicting locks to go away.
    SetLockWait,
}

impl LockCmd {
    /// Decodes an `F_GETLK`/`F_SETLK`/`F_SETLKW` command word.
    pub fn from_raw(cmd: i32) -> Option<Self> {
        match cmd {
            libc::F_GETLK => Some(LockCmd::GetLock),
            libc::F_SETLK => Some(LockCmd::SetLock),
            libc::F_SETLKW => Some(LockCmd::SetLockWait),
            _ => None,
        }
    }

    /// The command word understood by the callback boundary.
    pub fn raw(self) -> i32 {
        match self {
            LockCmd::GetLock => libc::F_GETLK,
            LockCmd::SetLock => libc::F_SETLK,
            LockCmd::SetLockWait => libc::F_SETLKW,
        }
    }
}

/// Opaque handle the runtime uses to deliver poll notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollHandle(pub u64);

#[cfg(target_os = "linux")]
const RENAME_NOREPLACE: u32 = libc::RENAME_NOREPLACE as u32;
#[cfg(target_os = "linux")]
const RENAME_EXCHANGE: u32 = libc::RENAME_EXCHANGE as u32;
// Wire values of the Linux `renameat2` flags, for hosts whose libc lacks them.
#[cfg(not(target_os = "linux"))]
const RENAME_NOREPLACE: u32 = 1;
#[cfg(not(target_os = "linux"))]
const RENAME_EXCHANGE: u32 = 2;

bitflags::bitflags! {
    /// Flags for `rename` on revisions that carry them.
    ///
    /// Bits outside the named flags are kept as received.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenameFlags: u32 {
        /// Fail if the target already exists.
        const NOREPLACE = RENAME_NOREPLACE;
        /// Atomically swap source and target.
        const EXCHANGE = RENAME_EXCHANGE;
    }
}

/// Identity of the caller as reported by the runtime for one request.
///
/// This is the adapter's view of the runtime's opaque request context.
/// The creation mask is only present on revisions that expose it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller user id.
    pub uid: u32,
    /// Caller group id.
    pub gid: u32,
    /// Caller process id; zero for requests without a process.
    pub pid: u32,
    /// Caller file-creation mask.
    pub umask: Option<u32>,
}

impl RequestContext {
    /// A context without a creation mask.
    pub const fn new(uid: u32, gid: u32, pid: u32) -> Self {
        Self {
            uid,
            gid,
            pid,
            umask: None,
        }
    }

    /// Attaches a creation mask.
    #[must_use]
    pub const fn with_umask(mut self, umask: u32) -> Self {
        self.umask = Some(umask);
        self
    }
}
