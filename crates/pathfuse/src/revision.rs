//! Protocol revisions and the feature set each one exposes.
//!
//! The driver runtime's callback table changed shape several times: slots
//! were added, some were replaced (`getdir` by `readdir`, `utime` by
//! `utimens`) and some gained parameters (`rename` flags, `readdir` flags).
//! Instead of selecting a shape at build time, the adapter negotiates a
//! [`Capabilities`] value once at startup and lets the table builder and the
//! trampolines consult it.

use crate::ops::{Op, OpSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A revision of the driver runtime's callback table.
///
/// Numbered like `FUSE_USE_VERSION` (major * 10 + minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolRevision {
    /// Base operation set, whole-directory `getdir`.
    V21,
    /// Adds fsync and extended attributes.
    V22,
    /// Adds directory handles and init/destroy hooks.
    V23,
    /// Adds access, create and handle-scoped truncate/getattr.
    V25,
    /// Adds locking, nanosecond timestamps, bmap, ioctl, poll,
    /// scatter/gather buffers, flock and fallocate.
    V26,
    /// Request context carries the caller's creation mask.
    V28,
    /// Rename takes flags, readdir takes flags.
    V30,
}

impl ProtocolRevision {
    /// Every known revision, oldest first.
    pub const ALL: [ProtocolRevision; 7] = [
        ProtocolRevision::V21,
        ProtocolRevision::V22,
        ProtocolRevision::V23,
        ProtocolRevision::V25,
        ProtocolRevision::V26,
        ProtocolRevision::V28,
        ProtocolRevision::V30,
    ];

    /// The newest known revision.
    pub const LATEST: ProtocolRevision = ProtocolRevision::V30;

    /// The `FUSE_USE_VERSION`-style number.
    pub const fn number(self) -> u32 {
        match self {
            ProtocolRevision::V21 => 21,
            ProtocolRevision::V22 => 22,
            ProtocolRevision::V23 => 23,
            ProtocolRevision::V25 => 25,
            ProtocolRevision::V26 => 26,
            ProtocolRevision::V28 => 28,
            ProtocolRevision::V30 => 30,
        }
    }

    /// The newest known revision not above `number`.
    ///
    /// Returns `None` for numbers older than the oldest supported revision.
    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .rev()
            .find(|rev| rev.number() <= number)
    }
}

impl fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Error returned when parsing a [`ProtocolRevision`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseRevisionError {
    /// The text is not a revision number.
    #[error("invalid protocol revision '{0}' (expected e.g. 26, 2.6 or 3.0)")]
    Invalid(String),
    /// The number predates every supported revision.
    #[error("protocol revision {0} is older than the oldest supported revision (21)")]
    TooOld(u32),
}

impl FromStr for ProtocolRevision {
    type Err = ParseRevisionError;

    /// Accepts `26`, `2.6` or `3.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseRevisionError::Invalid(s.to_string());
        let number = match s.split_once('.') {
            Some((major, minor)) => {
                let major: u32 = major.parse().map_err(|_| invalid())?;
                let minor: u32 = minor.parse().map_err(|_| invalid())?;
                if minor > 9 {
                    return Err(invalid());
                }
                major
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(minor))
                    .ok_or_else(invalid)?
            }
            None => s.parse().map_err(|_| invalid())?,
        };
        ProtocolRevision::from_number(number).ok_or(ParseRevisionError::TooOld(number))
    }
}

/// Feature set of one protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The revision these capabilities were derived from.
    pub revision: ProtocolRevision,
    /// fsync and extended-attribute slots.
    pub xattr: bool,
    /// opendir/readdir/releasedir/fsyncdir and init/destroy hooks.
    /// Without it, directories are listed by the single-shot `getdir`.
    pub directory_ops: bool,
    /// access, create, ftruncate and fgetattr.
    pub access_create: bool,
    /// lock, utimens, bmap, ioctl, poll, write_buf, read_buf, flock and
    /// fallocate. Without it, timestamps are set by whole-second `utime`.
    pub advanced: bool,
    /// The request context carries a creation mask.
    pub context_umask: bool,
    /// rename carries a flags word.
    pub rename_flags: bool,
    /// readdir carries a flags word.
    pub readdir_flags: bool,
}

impl Capabilities {
    /// Derives the feature set of `revision`.
    pub fn for_revision(revision: ProtocolRevision) -> Self {
        use ProtocolRevision as R;
        Self {
            revision,
            xattr: revision >= R::V22,
            directory_ops: revision >= R::V23,
            access_create: revision >= R::V25,
            advanced: revision >= R::V26,
            context_umask: revision >= R::V28,
            rename_flags: revision >= R::V30,
            readdir_flags: revision >= R::V30,
        }
    }

    /// Settles on the older of what was asked for and what the runtime speaks.
    pub fn negotiate(requested: ProtocolRevision, supported: ProtocolRevision) -> Self {
        Self::for_revision(requested.min(supported))
    }

    /// Table slots that exist in this revision.
    pub fn operations(&self) -> OpSet {
        let mut ops = OpSet::of(&[
            Op::Getattr,
            Op::Readlink,
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
            Op::Open,
            Op::Read,
            Op::Write,
            Op::Statfs,
            Op::Flush,
            Op::Release,
        ]);
        if self.xattr {
            for op in [Op::Fsync, Op::Setxattr, Op::Getxattr, Op::Listxattr, Op::Removexattr] {
                ops.insert(op);
            }
        }
        if self.directory_ops {
            for op in [
                Op::Opendir,
                Op::Readdir,
                Op::Releasedir,
                Op::Fsyncdir,
                Op::Init,
                Op::Destroy,
            ] {
                ops.insert(op);
            }
        } else {
            ops.insert(Op::Getdir);
        }
        if self.access_create {
            for op in [Op::Access, Op::Create, Op::Ftruncate, Op::Fgetattr] {
                ops.insert(op);
            }
        }
        if self.advanced {
            for op in [
                Op::Lock,
                Op::Utimens,
                Op::Bmap,
                Op::Ioctl,
                Op::Poll,
                Op::WriteBuf,
                Op::ReadBuf,
                Op::Flock,
                Op::Fallocate,
            ] {
                ops.insert(op);
            }
        } else {
            ops.insert(Op::Utime);
        }
        ops
    }

    /// Returns true if `op` has a slot in this revision.
    pub fn supports(&self, op: Op) -> bool {
        self.operations().contains(op)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::for_revision(ProtocolRevision::LATEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("26".parse(), Ok(ProtocolRevision::V26));
        assert_eq!("2.6".parse(), Ok(ProtocolRevision::V26));
        assert_eq!("3.0".parse(), Ok(ProtocolRevision::V30));
        assert_eq!(" 22 ".parse(), Ok(ProtocolRevision::V22));
    }

    #[test]
    fn test_parse_maps_down_to_known_revision() {
        assert_eq!("24".parse(), Ok(ProtocolRevision::V23));
        assert_eq!("29".parse(), Ok(ProtocolRevision::V28));
        assert_eq!("3.5".parse(), Ok(ProtocolRevision::V30));
    }

    #[test]
    fn test_parse_rejects_garbage_and_old() {
        assert!(matches!(
            "x".parse::<ProtocolRevision>(),
            Err(ParseRevisionError::Invalid(_))
        ));
        assert!(matches!(
            "2.10".parse::<ProtocolRevision>(),
            Err(ParseRevisionError::Invalid(_))
        ));
        assert_eq!(
            "20".parse::<ProtocolRevision>(),
            Err(ParseRevisionError::TooOld(20))
        );
    }

    #[test]
    fn test_parse_rejects_dotted_overflow() {
        assert!(matches!(
            "429496730.0".parse::<ProtocolRevision>(),
            Err(ParseRevisionError::Invalid(_))
        ));
        assert!(matches!(
            "429496729.6".parse::<ProtocolRevision>(),
            Err(ParseRevisionError::Invalid(_))
        ));
        assert_eq!(
            "429496729.5".parse::<ProtocolRevision>(),
            Ok(ProtocolRevision::LATEST)
        );
    }

    #[test]
    fn test_display_roundtrip() {
        for rev in ProtocolRevision::ALL {
            assert_eq!(rev.to_string().parse(), Ok(rev));
        }
    }

    #[test]
    fn test_legacy_revision_feature_set() {
        let caps = Capabilities::for_revision(ProtocolRevision::V21);
        assert!(caps.supports(Op::Getdir));
        assert!(caps.supports(Op::Utime));
        assert!(!caps.supports(Op::Readdir));
        assert!(!caps.supports(Op::Init));
        assert!(!caps.supports(Op::Setxattr));
        assert!(!caps.supports(Op::Fsync));
        assert!(!caps.supports(Op::Access));
        assert!(!caps.supports(Op::Utimens));
        assert!(!caps.rename_flags);
    }

    #[test]
    fn test_xattr_arrives_before_directory_ops() {
        let caps = Capabilities::for_revision(ProtocolRevision::V22);
        assert!(caps.supports(Op::Getxattr));
        assert!(caps.supports(Op::Fsync));
        assert!(caps.supports(Op::Getdir));
        assert!(!caps.supports(Op::Opendir));
    }

    #[test]
    fn test_directory_ops_replace_getdir() {
        let caps = Capabilities::for_revision(ProtocolRevision::V23);
        assert!(caps.supports(Op::Readdir));
        assert!(caps.supports(Op::Init));
        assert!(caps.supports(Op::Destroy));
        assert!(!caps.supports(Op::Getdir));
        assert!(!caps.supports(Op::Create));
    }

    #[test]
    fn test_advanced_replaces_utime() {
        let old = Capabilities::for_revision(ProtocolRevision::V25);
        assert!(old.supports(Op::Utime));
        assert!(old.supports(Op::Ftruncate));
        assert!(!old.supports(Op::WriteBuf));

        let new = Capabilities::for_revision(ProtocolRevision::V26);
        assert!(!new.supports(Op::Utime));
        for op in [
            Op::Lock,
            Op::Utimens,
            Op::Bmap,
            Op::Ioctl,
            Op::Poll,
            Op::WriteBuf,
            Op::ReadBuf,
            Op::Flock,
            Op::Fallocate,
        ] {
            assert!(new.supports(op), "{op} should be bound at 26");
        }
        assert!(!new.context_umask);
    }

    #[test]
    fn test_latest_has_flags_and_umask() {
        let caps = Capabilities::default();
        assert_eq!(caps.revision, ProtocolRevision::V30);
        assert!(caps.context_umask);
        assert!(caps.rename_flags);
        assert!(caps.readdir_flags);
        assert!(!caps.supports(Op::Getdir));
        assert!(!caps.supports(Op::Utime));
    }

    #[test]
    fn test_negotiate_takes_older() {
        let caps = Capabilities::negotiate(ProtocolRevision::V30, ProtocolRevision::V26);
        assert_eq!(caps.revision, ProtocolRevision::V26);
        let caps = Capabilities::negotiate(ProtocolRevision::V22, ProtocolRevision::V30);
        assert_eq!(caps.revision, ProtocolRevision::V22);
    }
}
