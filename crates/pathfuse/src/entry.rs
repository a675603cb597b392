//! Handing a backend to a driver runtime.

use crate::adapter::Adapter;
use crate::dispatch::DispatchTable;
use crate::filesystem::PathFilesystem;
use crate::revision::{Capabilities, ProtocolRevision};
use crate::types::RequestContext;
use std::ffi::OsString;
use std::sync::Arc;
use tracing::info;

/// A kernel-facing driver loop that calls into a [`DispatchTable`].
pub trait DriverRuntime {
    /// The newest revision the runtime can serve.
    fn revision(&self) -> ProtocolRevision;

    /// Mounts, serves requests until unmounted, and returns the exit status.
    ///
    /// `args` is the full argument vector, program name included.
    fn run<F: PathFilesystem>(
        self,
        args: Vec<OsString>,
        adapter: Arc<Adapter<F>>,
        table: DispatchTable<F>,
    ) -> i32;
}

/// Serves `fs` through `runtime` and returns the runtime's exit status.
///
/// Blocks until the runtime's loop ends. On revisions without lifecycle
/// hooks the backend's `init` runs before the loop and `destroy` after it.
pub fn main<F, R, I>(fs: F, args: I, runtime: R) -> i32
where
    F: PathFilesystem,
    R: DriverRuntime,
    I: IntoIterator<Item = OsString>,
{
    let capabilities = Capabilities::for_revision(runtime.revision());
    run_with(fs, args, runtime, capabilities)
}

/// Like [`main`], with an explicitly negotiated feature set.
pub fn run_with<F, R, I>(fs: F, args: I, runtime: R, capabilities: Capabilities) -> i32
where
    F: PathFilesystem,
    R: DriverRuntime,
    I: IntoIterator<Item = OsString>,
{
    let table = DispatchTable::<F>::build(capabilities);
    let adapter = Arc::new(Adapter::new(fs, capabilities));
    info!(
        revision = %capabilities.revision,
        bound = table.bound_operations().len(),
        "Starting driver runtime"
    );

    let legacy_lifecycle = !capabilities.directory_ops;
    if legacy_lifecycle {
        let cx = adapter.session(&RequestContext::default());
        adapter.filesystem().init(&cx);
        adapter.mark_mounted();
    }

    let status = runtime.run(args.into_iter().collect(), Arc::clone(&adapter), table);

    if legacy_lifecycle {
        adapter.filesystem().destroy();
        adapter.mark_unmounted();
    }
    info!(status, "Driver runtime exited");
    status
}
