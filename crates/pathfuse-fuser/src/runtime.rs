//! The fuser-backed [`DriverRuntime`].

use crate::args::MountArgs;
use crate::bridge::PathBridge;
use crate::config::MountConfig;
use clap::Parser;
use pathfuse::{Adapter, DispatchTable, DriverRuntime, PathFilesystem, ProtocolRevision};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Process exit statuses returned by [`FuserRuntime::run`].
pub mod exit_code {
    /// The filesystem was mounted, served and unmounted cleanly.
    pub const SUCCESS: i32 = 0;
    /// Mounting or serving failed.
    pub const GENERAL_ERROR: i32 = 1;
    /// The argument vector was malformed.
    pub const USAGE_ERROR: i32 = 2;
}

/// Failures of the fuser session.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Mounting or serving the filesystem failed.
    #[error("Failed to serve {}: {source}", mountpoint.display())]
    Mount {
        /// Where the mount was attempted.
        mountpoint: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl RuntimeError {
    /// The exit status this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::Mount { .. } => exit_code::GENERAL_ERROR,
        }
    }
}

/// Serves dispatch tables through `fuser::mount2`.
#[derive(Debug, Clone, Default)]
pub struct FuserRuntime {
    config: MountConfig,
}

impl FuserRuntime {
    /// Creates a runtime with the given mount configuration.
    pub fn new(config: MountConfig) -> Self {
        Self { config }
    }

    /// The mount configuration.
    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    fn serve<F: PathFilesystem>(
        &self,
        args: &MountArgs,
        adapter: Arc<Adapter<F>>,
        table: DispatchTable<F>,
    ) -> Result<(), RuntimeError> {
        let options = args.mount_options(&self.config);
        if !args.foreground {
            warn!("Background mode is not supported; staying in the foreground");
        }
        info!(
            mountpoint = %args.mountpoint.display(),
            options = options.len(),
            "Mounting filesystem"
        );

        let bridge = PathBridge::new(adapter, table, self.config.clone());
        fuser::mount2(bridge, &args.mountpoint, &options).map_err(|source| RuntimeError::Mount {
            mountpoint: args.mountpoint.clone(),
            source,
        })
    }
}

impl DriverRuntime for FuserRuntime {
    fn revision(&self) -> ProtocolRevision {
        self.config.revision.min(ProtocolRevision::LATEST)
    }

    fn run<F: PathFilesystem>(
        self,
        args: Vec<OsString>,
        adapter: Arc<Adapter<F>>,
        table: DispatchTable<F>,
    ) -> i32 {
        let args = match MountArgs::try_parse_from(args) {
            Ok(args) => args,
            Err(e) => {
                // Help and usage errors both go to the user as-is.
                let _ = e.print();
                return e.exit_code();
            }
        };
        if args.debug {
            info!("-d has no effect; set RUST_LOG=pathfuse=trace to see each call");
        }

        match self.serve(&args, adapter, table) {
            Ok(()) => {
                info!(mountpoint = %args.mountpoint.display(), "Filesystem unmounted");
                exit_code::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Filesystem session failed");
                e.exit_code()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfuse::{Capabilities, OpSet};

    struct Nothing;

    impl PathFilesystem for Nothing {
        const OPERATIONS: OpSet = OpSet::EMPTY;
    }

    fn run_with_args(args: &[&str]) -> i32 {
        let caps = Capabilities::default();
        let table = DispatchTable::<Nothing>::build(caps);
        let adapter = Arc::new(Adapter::new(Nothing, caps));
        FuserRuntime::default().run(args.iter().map(OsString::from).collect(), adapter, table)
    }

    #[test]
    fn test_missing_mountpoint_is_usage_error() {
        assert_eq!(run_with_args(&["prog"]), exit_code::USAGE_ERROR);
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        assert_eq!(run_with_args(&["prog", "/mnt", "--bogus"]), exit_code::USAGE_ERROR);
    }

    #[test]
    fn test_help_exits_cleanly() {
        assert_eq!(run_with_args(&["prog", "--help"]), exit_code::SUCCESS);
    }

    #[test]
    fn test_revision_follows_config() {
        let runtime = FuserRuntime::new(MountConfig::for_revision(ProtocolRevision::V25));
        assert_eq!(runtime.revision(), ProtocolRevision::V25);
        assert_eq!(FuserRuntime::default().revision(), ProtocolRevision::LATEST);
    }

    #[test]
    fn test_mount_error_maps_to_general_error() {
        let e = RuntimeError::Mount {
            mountpoint: PathBuf::from("/nowhere"),
            source: io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert_eq!(e.exit_code(), exit_code::GENERAL_ERROR);
        assert!(e.to_string().contains("/nowhere"));
    }
}
