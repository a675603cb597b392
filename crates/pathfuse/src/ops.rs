//! Names for every slot of the dispatch table, and sets of them.

use std::fmt;

/// One slot of the callback table.
///
/// `Getdir` and `Utime` only exist on old revisions; they are served by the
/// backend's `readdir` and `utimens` respectively (see [`Op::backing`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Op {
    Getattr,
    Readlink,
    Getdir,
    Mknod,
    Mkdir,
    Unlink,
    Rmdir,
    Symlink,
    Rename,
    Link,
    Chmod,
    Chown,
    Truncate,
    Utime,
    Open,
    Read,
    Write,
    Statfs,
    Flush,
    Release,
    Fsync,
    Setxattr,
    Getxattr,
    Listxattr,
    Removexattr,
    Opendir,
    Readdir,
    Releasedir,
    Fsyncdir,
    Init,
    Destroy,
    Access,
    Create,
    Ftruncate,
    Fgetattr,
    Lock,
    Utimens,
    Bmap,
    Ioctl,
    Poll,
    WriteBuf,
    ReadBuf,
    Flock,
    Fallocate,
}

impl Op {
    /// Every slot, in table order.
    pub const ALL: [Op; 44] = [
        Op::Getattr,
        Op::Readlink,
        Op::Getdir,
        Op::Mknod,
        Op::Mkdir,
        Op::Unlink,
        Op::Rmdir,
        Op::Symlink,
        Op::Rename,
        Op::Link,
        Op::Chmod,
        Op::Chown,
        Op::Truncate,
        Op::Utime,
        Op::Open,
        Op::Read,
        Op::Write,
        Op::Statfs,
        Op::Flush,
        Op::Release,
        Op::Fsync,
        Op::Setxattr,
        Op::Getxattr,
        Op::Listxattr,
        Op::Removexattr,
        Op::Opendir,
        Op::Readdir,
        Op::Releasedir,
        Op::Fsyncdir,
        Op::Init,
        Op::Destroy,
        Op::Access,
        Op::Create,
        Op::Ftruncate,
        Op::Fgetattr,
        Op::Lock,
        Op::Utimens,
        Op::Bmap,
        Op::Ioctl,
        Op::Poll,
        Op::WriteBuf,
        Op::ReadBuf,
        Op::Flock,
        Op::Fallocate,
    ];

    /// The backend operation that serves this slot.
    pub const fn backing(self) -> Op {
        match self {
            Op::Getdir => Op::Readdir,
            Op::Utime => Op::Utimens,
            other => other,
        }
    }

    /// The slot name as it appears in the callback table.
    pub const fn name(self) -> &'static str {
        match self {
            Op::Getattr => "getattr",
            Op::Readlink => "readlink",
            Op::Getdir => "getdir",
            Op::Mknod => "mknod",
            Op::Mkdir => "mkdir",
            Op::Unlink => "unlink",
            Op::Rmdir => "rmdir",
            Op::Symlink => "symlink",
            Op::Rename => "rename",
            Op::Link => "link",
            Op::Chmod => "chmod",
            Op::Chown => "chown",
            Op::Truncate => "truncate",
            Op::Utime => "utime",
            Op::Open => "open",
            Op::Read => "read",
            Op::Write => "write",
            Op::Statfs => "statfs",
            Op::Flush => "flush",
            Op::Release => "release",
            Op::Fsync => "fsync",
            Op::Setxattr => "setxattr",
            Op::Getxattr => "getxattr",
            Op::Listxattr => "listxattr",
            Op::Removexattr => "removexattr",
            Op::Opendir => "opendir",
            Op::Readdir => "readdir",
            Op::Releasedir => "releasedir",
            Op::Fsyncdir => "fsyncdir",
            Op::Init => "init",
            Op::Destroy => "destroy",
            Op::Access => "access",
            Op::Create => "create",
            Op::Ftruncate => "ftruncate",
            Op::Fgetattr => "fgetattr",
            Op::Lock => "lock",
            Op::Utimens => "utimens",
            Op::Bmap => "bmap",
            Op::Ioctl => "ioctl",
            Op::Poll => "poll",
            Op::WriteBuf => "write_buf",
            Op::ReadBuf => "read_buf",
            Op::Flock => "flock",
            Op::Fallocate => "fallocate",
        }
    }

    const fn bit(self) -> u64 {
        1 << (self as u8)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of table slots.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpSet(u64);

impl OpSet {
    /// No operations.
    pub const EMPTY: OpSet = OpSet(0);
    /// Every operation.
    pub const ALL: OpSet = OpSet::of(&Op::ALL);

    /// Builds a set in const context.
    ///
    /// ```
    /// use pathfuse::{Op, OpSet};
    ///
    /// const READ_ONLY: OpSet = OpSet::of(&[Op::Getattr, Op::Readdir, Op::Read]);
    /// assert!(READ_ONLY.contains(Op::Read));
    /// assert!(!READ_ONLY.contains(Op::Write));
    /// ```
    pub const fn of(ops: &[Op]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ops.len() {
            bits |= ops[i].bit();
            i += 1;
        }
        OpSet(bits)
    }

    /// Returns a copy with `op` added.
    #[must_use]
    pub const fn with(self, op: Op) -> Self {
        OpSet(self.0 | op.bit())
    }

    /// Returns a copy with `op` removed.
    #[must_use]
    pub const fn without(self, op: Op) -> Self {
        OpSet(self.0 & !op.bit())
    }

    /// Returns true if `op` is a member.
    pub const fn contains(self, op: Op) -> bool {
        self.0 & op.bit() != 0
    }

    /// Adds `op` in place.
    pub fn insert(&mut self, op: Op) {
        self.0 |= op.bit();
    }

    /// Members common to both sets.
    #[must_use]
    pub const fn intersection(self, other: OpSet) -> Self {
        OpSet(self.0 & other.0)
    }

    /// Number of members.
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if the set has no members.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates members in table order.
    pub fn iter(self) -> impl Iterator<Item = Op> {
        Op::ALL.into_iter().filter(move |op| self.contains(*op))
    }
}

impl FromIterator<Op> for OpSet {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        let mut set = OpSet::EMPTY;
        for op in iter {
            set.insert(op);
        }
        set
    }
}

impl fmt::Debug for OpSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Op::name)).finish()
    }
}
