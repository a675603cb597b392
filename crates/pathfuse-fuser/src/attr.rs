//! Conversions between adapter metadata and fuser's attribute types.

use fuser::{FileAttr, FileType, TimeOrNow};
use pathfuse::types::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFSOCK};
use pathfuse::{FileStat, Timespec};

/// Block size reported when the backend leaves `blksize` at zero.
pub const BLOCK_SIZE: u32 = 4096;

/// The fuser file type for a mode word. Modes without type bits are
/// treated as regular files.
pub fn file_type(mode: u32) -> FileType {
    match mode & S_IFMT {
        S_IFDIR => FileType::Directory,
        S_IFLNK => FileType::Symlink,
        S_IFCHR => FileType::CharDevice,
        S_IFBLK => FileType::BlockDevice,
        S_IFIFO => FileType::NamedPipe,
        S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Builds the kernel-facing attributes of `st`, numbered as `ino`.
pub fn to_file_attr(st: &FileStat, ino: u64) -> FileAttr {
    let blksize = if st.blksize == 0 { BLOCK_SIZE } else { st.blksize };
    let blocks = if st.blocks == 0 {
        st.size.div_ceil(512)
    } else {
        st.blocks
    };
    FileAttr {
        ino,
        size: st.size,
        blocks,
        atime: st.atime.to_system_time(),
        mtime: st.mtime.to_system_time(),
        ctime: st.ctime.to_system_time(),
        crtime: st.ctime.to_system_time(),
        kind: file_type(st.mode),
        perm: (st.mode & 0o7777) as u16,
        nlink: st.nlink.max(1),
        uid: st.uid,
        gid: st.gid,
        rdev: st.rdev as u32,
        blksize,
        flags: 0,
    }
}

/// Resolves a setattr timestamp.
pub fn timespec_of(time: TimeOrNow) -> Timespec {
    match time {
        TimeOrNow::SpecificTime(t) => t.into(),
        TimeOrNow::Now => Timespec::now(),
    }
}
