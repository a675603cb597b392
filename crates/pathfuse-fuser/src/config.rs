//! Mount configuration for the fuser runtime.

use pathfuse::ProtocolRevision;
use std::time::Duration;

/// Default attribute and entry TTL handed to the kernel.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FSNAME: &str = "pathfuse";

/// Configuration options for a fuser-backed mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Callback-table revision to serve.
    ///
    /// Default: the newest revision.
    pub revision: ProtocolRevision,

    /// Time-to-live for attributes returned from getattr/setattr.
    ///
    /// Default: 1 second.
    pub attr_ttl: Duration,

    /// Time-to-live for name lookups.
    ///
    /// Default: 1 second.
    pub entry_ttl: Duration,

    /// Filesystem name (`fsname=`), unless the argument vector sets one.
    pub fsname: String,

    /// Filesystem subtype (`subtype=`).
    pub subtype: Option<String>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            revision: ProtocolRevision::LATEST,
            attr_ttl: DEFAULT_TTL,
            entry_ttl: DEFAULT_TTL,
            fsname: DEFAULT_FSNAME.to_string(),
            subtype: None,
        }
    }
}

impl MountConfig {
    /// Creates a configuration serving `revision`.
    pub fn for_revision(revision: ProtocolRevision) -> Self {
        Self {
            revision,
            ..Default::default()
        }
    }

    /// Sets the callback-table revision.
    #[must_use]
    pub fn revision(mut self, revision: ProtocolRevision) -> Self {
        self.revision = revision;
        self
    }

    /// Sets both attribute and entry TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self.entry_ttl = ttl;
        self
    }

    /// Sets the attribute TTL.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    /// Sets the entry TTL.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Sets the filesystem name.
    #[must_use]
    pub fn fsname(mut self, name: impl Into<String>) -> Self {
        self.fsname = name.into();
        self
    }

    /// Sets the filesystem subtype.
    #[must_use]
    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MountConfig::default();
        assert_eq!(config.revision, ProtocolRevision::V30);
        assert_eq!(config.attr_ttl, Duration::from_secs(1));
        assert_eq!(config.entry_ttl, Duration::from_secs(1));
        assert_eq!(config.fsname, "pathfuse");
        assert!(config.subtype.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MountConfig::for_revision(ProtocolRevision::V26)
            .ttl(Duration::from_secs(5))
            .entry_ttl(Duration::from_secs(2))
            .fsname("memfs")
            .subtype("demo");
        assert_eq!(config.revision, ProtocolRevision::V26);
        assert_eq!(config.attr_ttl, Duration::from_secs(5));
        assert_eq!(config.entry_ttl, Duration::from_secs(2));
        assert_eq!(config.fsname, "memfs");
        assert_eq!(config.subtype.as_deref(), Some("demo"));
    }
}
