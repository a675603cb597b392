//! Directory enumeration sink.
//!
//! The runtime owns the destination of a listing (a reply buffer, a
//! collection, ...) and identifies it with a [`DirHandle`]. Each listing
//! call binds that handle and an emitter into a [`DirFiller`] which the
//! backend's `readdir` receives as an argument and pushes entries into.
//! Nothing is stashed between calls, so nested or concurrent listings never
//! see each other's destination.

use crate::types::FileStat;

/// Opaque identifier of one listing destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirHandle(u64);

impl DirHandle {
    /// Wraps a runtime-chosen identifier.
    pub const fn new(raw: u64) -> Self {
        DirHandle(raw)
    }

    /// The runtime-chosen identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

bitflags::bitflags! {
    /// Flags passed to `readdir` on revisions that carry them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReaddirFlags: u32 {
        /// The runtime wants attributes for each entry (readdirplus).
        const PLUS = 1;
    }
}

/// One entry as delivered to the emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRecord<'a> {
    /// Single-shot listing shape: name, `d_type` and inode number.
    Legacy {
        /// Entry name.
        name: &'a str,
        /// `(mode & S_IFMT) >> 12`, or 0 when unknown.
        dtype: u32,
        /// Inode number, or 0 when unknown.
        ino: u64,
    },
    /// Offset-aware shape.
    Entry {
        /// Entry name.
        name: &'a str,
        /// Attributes, when the backend supplied them.
        attr: Option<&'a FileStat>,
        /// Offset of the next entry, or 0 when the backend lists in one go.
        next_offset: u64,
    },
}

impl FillRecord<'_> {
    /// The entry name.
    pub fn name(&self) -> &str {
        match self {
            FillRecord::Legacy { name, .. } | FillRecord::Entry { name, .. } => name,
        }
    }
}

/// Destination side of a listing, implemented by the runtime.
pub trait DirEmitter {
    /// Accepts one entry for `handle`. Returns `true` when the destination
    /// is full and the backend should stop.
    fn emit(&mut self, handle: DirHandle, record: FillRecord<'_>) -> bool;
}

/// Record shape produced by a [`DirFiller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillShape {
    /// `getdir`-era records.
    Legacy,
    /// `readdir`-era records.
    Offset,
}

/// The sink a backend's `readdir` pushes entries into.
pub struct DirFiller<'a> {
    handle: DirHandle,
    shape: FillShape,
    emitter: &'a mut dyn DirEmitter,
    emitted: usize,
}

impl<'a> DirFiller<'a> {
    /// Binds `emitter` to `handle` for the duration of one listing call.
    pub fn new(handle: DirHandle, shape: FillShape, emitter: &'a mut dyn DirEmitter) -> Self {
        Self {
            handle,
            shape,
            emitter,
            emitted: 0,
        }
    }

    /// The destination this filler writes to.
    pub fn handle(&self) -> DirHandle {
        self.handle
    }

    /// The record shape this filler produces.
    pub fn shape(&self) -> FillShape {
        self.shape
    }

    /// Emits one entry. Returns `true` when the destination is full.
    ///
    /// `next_offset` is ignored by single-shot listings, which instead take
    /// the entry type and inode number from `attr`.
    pub fn fill_dir(&mut self, name: &str, attr: Option<&FileStat>, next_offset: u64) -> bool {
        let record = match self.shape {
            FillShape::Legacy => FillRecord::Legacy {
                name,
                dtype: attr.map_or(0, FileStat::dtype),
                ino: attr.map_or(0, |a| a.ino),
            },
            FillShape::Offset => FillRecord::Entry {
                name,
                attr,
                next_offset,
            },
        };
        self.emitted += 1;
        self.emitter.emit(self.handle, record)
    }

    /// Number of entries emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl std::fmt::Debug for DirFiller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirFiller")
            .field("handle", &self.handle)
            .field("shape", &self.shape)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}
