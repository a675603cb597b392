//! Per-mount caller identity, captured once.
//!
//! The identity that backends see is taken from the first request that
//! carries a real process id and then never changes for the lifetime of the
//! adapter. Requests issued by the kernel itself (pid 0) are passed through
//! without freezing anything.

use crate::types::RequestContext;
use std::sync::OnceLock;
use tracing::debug;

/// Creation mask assumed when the runtime does not report one.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Identity handed to every backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Process id of the request that fixed the identity.
    pub pid: u32,
    /// File-creation mask.
    pub umask: u32,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            pid: 0,
            umask: DEFAULT_UMASK,
        }
    }
}

/// Cache-once holder of a [`SessionContext`].
#[derive(Debug)]
pub struct SessionCache {
    frozen: OnceLock<SessionContext>,
    umask_exposed: bool,
}

impl SessionCache {
    /// Creates an empty cache. `umask_exposed` selects whether the request
    /// context's creation mask is honored.
    pub fn new(umask_exposed: bool) -> Self {
        Self {
            frozen: OnceLock::new(),
            umask_exposed,
        }
    }

    /// Returns the cached identity, capturing it from `ctx` if none is cached.
    ///
    /// Concurrent first callers race; exactly one of them wins and every
    /// caller (including the losers) gets the winner's identity.
    pub fn resolve(&self, ctx: &RequestContext) -> SessionContext {
        if let Some(frozen) = self.frozen.get() {
            return *frozen;
        }
        let observed = self.capture(ctx);
        if observed.pid == 0 {
            return observed;
        }
        *self.frozen.get_or_init(|| {
            debug!(
                uid = observed.uid,
                gid = observed.gid,
                pid = observed.pid,
                umask = observed.umask,
                "Session identity frozen"
            );
            observed
        })
    }

    /// The frozen identity, if any request has fixed it yet.
    pub fn current(&self) -> Option<SessionContext> {
        self.frozen.get().copied()
    }

    /// Returns true once a request with a non-zero pid has been seen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    fn capture(&self, ctx: &RequestContext) -> SessionContext {
        let umask = if self.umask_exposed {
            ctx.umask.unwrap_or(DEFAULT_UMASK)
        } else {
            DEFAULT_UMASK
        };
        SessionContext {
            uid: ctx.uid,
            gid: ctx.gid,
            pid: ctx.pid,
            umask,
        }
    }
}
