//! Path-based userspace filesystems on top of a versioned callback table.
//!
//! A backend implements [`PathFilesystem`], a contract addressed by absolute
//! paths with a sensible default for every operation. The adapter turns it
//! into a [`DispatchTable`] of plain `fn` entries whose shape depends on the
//! [`ProtocolRevision`] negotiated with the driver runtime, and hands both
//! to a [`DriverRuntime`].
//!
//! # Features
//!
//! - Seven protocol revisions (21 through 30), selected at startup
//! - Unbound slots for operations the backend does not provide
//! - Caller identity captured once per mount
//! - Directory listings pushed through an explicit sink
//! - Scatter/gather I/O emulated over single-buffer read/write
//!
//! # Usage
//!
//! ```ignore
//! use pathfuse::{PathFilesystem, SessionContext, FileStat, OpResult};
//!
//! struct Hello;
//!
//! impl PathFilesystem for Hello {
//!     fn getattr(&self, cx: &SessionContext, path: &str) -> OpResult<FileStat> {
//!         // ...
//!     }
//! }
//!
//! let status = pathfuse::main(Hello, std::env::args_os(), runtime);
//! std::process::exit(status);
//! ```

pub mod adapter;
pub mod bufvec;
pub mod dirfill;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod filesystem;
pub mod ops;
pub mod revision;
pub mod session;
pub mod types;

pub use adapter::{Adapter, MountState};
pub use bufvec::{Buf, BufData, BufVec, read_reply_bytes, read_vector, write_vector};
pub use dirfill::{DirEmitter, DirFiller, DirHandle, FillRecord, FillShape, ReaddirFlags};
pub use dispatch::{DispatchTable, ReaddirEntry, RenameEntry, UtimBuf};
pub use entry::{DriverRuntime, main, run_with};
pub use error::{AdapterError, Errno, IntoStatus, OpResult, ToErrno};
pub use filesystem::PathFilesystem;
pub use ops::{Op, OpSet};
pub use revision::{Capabilities, ParseRevisionError, ProtocolRevision};
pub use session::{DEFAULT_UMASK, SessionCache, SessionContext};
pub use types::{
    FileInfo, FileLock, FileStat, LockCmd, PollHandle, RenameFlags, RequestContext, StatFs,
    Timespec,
};
