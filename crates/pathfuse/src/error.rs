//! Status codes exchanged with the driver runtime.
//!
//! The callback boundary speaks plain integers: zero for success and a
//! negated operating-system error number for failure. Inside the adapter
//! and in backend code those statuses are carried as [`Errno`] values in an
//! [`OpResult`], and converted back to the wire form only at the trampoline.
//!
//! Failures that happen around the callback loop (bad mount arguments, a
//! mount syscall that fails) are reported as [`AdapterError`].

use crate::revision::ProtocolRevision;
use std::fmt;
use std::io;
use thiserror::Error;

/// A positive operating-system error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    /// Function not implemented. The default for unoverridden operations.
    pub const ENOSYS: Errno = Errno(libc::ENOSYS);
    /// No such file or directory.
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    /// Directory not empty.
    pub const ENOTEMPTY: Errno = Errno(libc::ENOTEMPTY);
    /// Invalid argument.
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    /// Input/output error.
    pub const EIO: Errno = Errno(libc::EIO);
    /// File exists.
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    /// Not a directory.
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    /// Is a directory.
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    /// Result too large for the supplied buffer.
    pub const ERANGE: Errno = Errno(libc::ERANGE);
    /// Operation not supported.
    pub const ENOTSUP: Errno = Errno(libc::ENOTSUP);
    /// Permission denied.
    pub const EACCES: Errno = Errno(libc::EACCES);
    /// Bad file descriptor.
    pub const EBADF: Errno = Errno(libc::EBADF);

    /// Missing extended attribute.
    #[cfg(target_os = "linux")]
    pub const ENOATTR: Errno = Errno(libc::ENODATA);
    /// Missing extended attribute.
    #[cfg(not(target_os = "linux"))]
    pub const ENOATTR: Errno = Errno(libc::ENOATTR);

    /// Wraps a raw error number. Negative input is treated as a wire status.
    pub const fn from_raw(code: i32) -> Self {
        Errno(code.abs())
    }

    /// Decodes a wire status, returning `None` for success or byte counts.
    pub const fn from_status(status: i32) -> Option<Self> {
        if status < 0 {
            Some(Errno(-status))
        } else {
            None
        }
    }

    /// The positive error number.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// The negated form used on the callback boundary.
    pub const fn status(self) -> i32 {
        -self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", io::Error::from_raw_os_error(self.0), self.0)
    }
}

impl std::error::Error for Errno {}

impl From<io::Error> for Errno {
    fn from(e: io::Error) -> Self {
        Errno(e.to_errno())
    }
}

/// Result type for backend operations.
pub type OpResult<T = ()> = Result<T, Errno>;

/// Conversion of an operation result into its wire status.
pub trait IntoStatus {
    /// Zero or a byte count on success, a negated errno on failure.
    fn into_status(self) -> i32;
}

impl IntoStatus for OpResult<()> {
    fn into_status(self) -> i32 {
        match self {
            Ok(()) => 0,
            Err(e) => e.status(),
        }
    }
}

impl IntoStatus for OpResult<usize> {
    fn into_status(self) -> i32 {
        match self {
            Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
            Err(e) => e.status(),
        }
    }
}

impl IntoStatus for OpResult<i32> {
    fn into_status(self) -> i32 {
        match self {
            Ok(n) => n,
            Err(e) => e.status(),
        }
    }
}

/// Errors raised while setting up or running the driver loop.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The argument vector could not be interpreted.
    #[error("Invalid mount arguments: {0}")]
    InvalidArguments(String),

    /// Mounting or serving the filesystem failed.
    #[error("Mount failed: {0}")]
    Mount(#[from] io::Error),

    /// The requested protocol revision is newer than the runtime speaks.
    #[error("Protocol revision {requested} is not supported by this runtime (newest: {supported})")]
    UnsupportedRevision {
        /// Revision asked for by configuration.
        requested: ProtocolRevision,
        /// Newest revision the runtime implements.
        supported: ProtocolRevision,
    },
}

impl AdapterError {
    /// Converts this error to a libc error code.
    pub fn to_errno(&self) -> i32 {
        match self {
            AdapterError::InvalidArguments(_) => libc::EINVAL,
            AdapterError::Mount(e) => e.to_errno(),
            AdapterError::UnsupportedRevision { .. } => libc::ENOTSUP,
        }
    }
}

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for io::Error {
    fn to_errno(&self) -> i32 {
        self.raw_os_error().unwrap_or(libc::EIO)
    }
}

impl ToErrno for Errno {
    fn to_errno(&self) -> i32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_negated_errno() {
        assert_eq!(Errno::ENOSYS.status(), -libc::ENOSYS);
        assert_eq!(Errno::ENOENT.status(), -libc::ENOENT);
        assert_eq!(Errno::ENOTEMPTY.raw(), libc::ENOTEMPTY);
    }

    #[test]
    fn test_from_status() {
        assert_eq!(Errno::from_status(-libc::ENOENT), Some(Errno::ENOENT));
        assert_eq!(Errno::from_status(0), None);
        assert_eq!(Errno::from_status(17), None);
    }

    #[test]
    fn test_from_raw_accepts_either_sign() {
        assert_eq!(Errno::from_raw(libc::EIO), Errno::EIO);
        assert_eq!(Errno::from_raw(-libc::EIO), Errno::EIO);
    }

    #[test]
    fn test_into_status() {
        assert_eq!(Ok::<(), Errno>(()).into_status(), 0);
        assert_eq!(Err::<(), Errno>(Errno::ENOSYS).into_status(), -libc::ENOSYS);
        assert_eq!(Ok::<usize, Errno>(3).into_status(), 3);
        assert_eq!(Ok::<usize, Errno>(usize::MAX).into_status(), i32::MAX);
        assert_eq!(Err::<usize, Errno>(Errno::EIO).into_status(), -libc::EIO);
    }

    #[test]
    fn test_io_error_mapping() {
        let e = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(e.to_errno(), libc::EACCES);
        assert_eq!(Errno::from(e), Errno::EACCES);

        // No raw OS error falls back to EIO
        let e = io::Error::other("custom error");
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_adapter_error_mapping() {
        assert_eq!(
            AdapterError::InvalidArguments("x".to_string()).to_errno(),
            libc::EINVAL
        );
        let e = AdapterError::Mount(io::Error::from_raw_os_error(libc::EPERM));
        assert_eq!(e.to_errno(), libc::EPERM);
        let e = AdapterError::UnsupportedRevision {
            requested: ProtocolRevision::V30,
            supported: ProtocolRevision::V26,
        };
        assert_eq!(e.to_errno(), libc::ENOTSUP);
        assert!(e.to_string().contains("30"));
    }

    #[test]
    fn test_display_includes_code() {
        let text = Errno::ENOENT.to_string();
        assert!(text.contains(&libc::ENOENT.to_string()));
    }
}
