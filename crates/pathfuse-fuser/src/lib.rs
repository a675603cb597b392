//! fuser-based driver runtime for pathfuse filesystems.
//!
//! [`FuserRuntime`] implements [`pathfuse::DriverRuntime`]: it parses the
//! mount argument vector, mounts with `fuser::mount2`, and serves kernel
//! requests through a [`PathBridge`] that turns inode-addressed requests
//! into calls on the path-addressed dispatch table.
//!
//! # Usage
//!
//! ```ignore
//! use pathfuse_fuser::{FuserRuntime, MountConfig};
//!
//! let runtime = FuserRuntime::new(MountConfig::default());
//! let status = pathfuse::main(MyFs::new(), std::env::args_os(), runtime);
//! std::process::exit(status);
//! ```

pub mod args;
pub mod attr;
pub mod bridge;
pub mod config;
pub mod inode;
pub mod runtime;

pub use args::{MountArgs, parse_mount_option};
pub use bridge::PathBridge;
pub use config::{DEFAULT_FSNAME, DEFAULT_TTL, MountConfig};
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
pub use runtime::{FuserRuntime, RuntimeError, exit_code};
