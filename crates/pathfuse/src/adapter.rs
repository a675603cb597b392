//! The per-mount adapter state shared by every trampoline.

use crate::filesystem::PathFilesystem;
use crate::revision::Capabilities;
use crate::session::{SessionCache, SessionContext};
use crate::types::RequestContext;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of a mounted adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// The runtime has not called `init` yet.
    Uninitialized,
    /// Between `init` and `destroy`.
    Mounted,
}

/// A backend together with the state the callback boundary needs.
///
/// The entry point creates exactly one adapter per mount and hands it to
/// the runtime, which passes it back into every dispatch table entry.
#[derive(Debug)]
pub struct Adapter<F> {
    fs: F,
    session: SessionCache,
    mounted: AtomicBool,
    capabilities: Capabilities,
}

impl<F: PathFilesystem> Adapter<F> {
    /// Wraps `fs` for a runtime speaking `capabilities`.
    pub fn new(fs: F, capabilities: Capabilities) -> Self {
        Self {
            fs,
            session: SessionCache::new(capabilities.context_umask),
            mounted: AtomicBool::new(false),
            capabilities,
        }
    }

    /// The wrapped backend.
    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// The negotiated feature set.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Resolves the session identity for a request.
    pub fn session(&self, ctx: &RequestContext) -> SessionContext {
        self.session.resolve(ctx)
    }

    /// The frozen session identity, if one has been captured.
    pub fn cached_session(&self) -> Option<SessionContext> {
        self.session.current()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MountState {
        if self.mounted.load(Ordering::Acquire) {
            MountState::Mounted
        } else {
            MountState::Uninitialized
        }
    }

    pub(crate) fn mark_mounted(&self) {
        self.mounted.store(true, Ordering::Release);
    }

    pub(crate) fn mark_unmounted(&self) {
        self.mounted.store(false, Ordering::Release);
    }

    /// Consumes the adapter, returning the backend.
    pub fn into_inner(self) -> F {
        self.fs
    }
}
