//! End-to-end behavior of `MemFs` driven through the dispatch table, the
//! way a driver runtime would call it.

use pathfuse::types::{S_IFDIR, S_IFREG};
use pathfuse::{
    Adapter, BufVec, Capabilities, DirEmitter, DirHandle, DispatchTable, FileInfo, FileStat,
    FillRecord, ProtocolRevision, RequestContext, Timespec, read_reply_bytes,
};
use pathfuse_memfs::{HELLO_CONTENT, HELLO_PATH, MemFs};

const ENOENT: i32 = -libc::ENOENT;
const ENOTEMPTY: i32 = -libc::ENOTEMPTY;

struct Mounted {
    adapter: Adapter<MemFs>,
    table: DispatchTable<MemFs>,
    ctx: RequestContext,
}

impl Mounted {
    fn at(revision: ProtocolRevision) -> Self {
        let caps = Capabilities::for_revision(revision);
        let mounted = Self {
            adapter: Adapter::new(MemFs::new(), caps),
            table: DispatchTable::build(caps),
            ctx: RequestContext::new(1000, 1000, 77).with_umask(0o022),
        };
        if let Some(init) = mounted.table.init {
            assert_eq!(init(&mounted.adapter, &mounted.ctx), 0);
        }
        mounted
    }

    fn latest() -> Self {
        Self::at(ProtocolRevision::LATEST)
    }

    fn fs(&self) -> &MemFs {
        self.adapter.filesystem()
    }

    fn getattr(&self, path: &str) -> (i32, FileStat) {
        let mut st = FileStat::default();
        let status = self.table.getattr.unwrap()(&self.adapter, &self.ctx, path, &mut st);
        (status, st)
    }

    fn read(&self, path: &str, count: usize, offset: u64) -> (i32, Vec<u8>) {
        let mut buf = vec![0u8; count];
        let status =
            self.table.read.unwrap()(&self.adapter, &self.ctx, path, &mut buf, offset, &FileInfo::default());
        buf.truncate(status.max(0) as usize);
        (status, buf)
    }

    fn read_buf(&self, path: &str, count: usize, offset: u64) -> (i32, Vec<u8>) {
        let mut out = None;
        let status = self.table.read_buf.unwrap()(
            &self.adapter,
            &self.ctx,
            path,
            &mut out,
            count,
            offset,
            &FileInfo::default(),
        );
        (status, read_reply_bytes(out).unwrap())
    }

    fn write(&self, path: &str, data: &[u8], offset: u64) -> i32 {
        self.table.write.unwrap()(&self.adapter, &self.ctx, path, data, offset, &FileInfo::default())
    }

    fn rename(&self, from: &str, to: &str) -> i32 {
        self.table
            .rename
            .unwrap()
            .call(&self.adapter, &self.ctx, from, to, 0)
    }

    fn list(&self, path: &str) -> (i32, Vec<String>) {
        let mut names = Names::default();
        let status = self.table.readdir.unwrap().call(
            &self.adapter,
            &self.ctx,
            path,
            DirHandle::new(9),
            &mut names,
            0,
            &FileInfo::default(),
            0,
        );
        (status, names.0)
    }
}

#[derive(Default)]
struct Names(Vec<String>);

impl DirEmitter for Names {
    fn emit(&mut self, _handle: DirHandle, record: FillRecord<'_>) -> bool {
        self.0.push(record.name().to_string());
        false
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_init_seeds_hello_file() {
    let m = Mounted::latest();
    let (status, st) = m.getattr(HELLO_PATH);
    assert_eq!(status, 0);
    assert_eq!(st.mode, S_IFREG | 0o644);
    assert_eq!(st.uid, 1000);

    let (status, data) = m.read(HELLO_PATH, 64, 0);
    assert_eq!(status, HELLO_CONTENT.len() as i32);
    assert_eq!(data, HELLO_CONTENT);
}

#[test]
fn test_root_listing() {
    let m = Mounted::latest();
    let (status, names) = m.list("/");
    assert_eq!(status, 0);
    assert_eq!(names, vec![".", "..", "helloworld.txt"]);
}

// ============================================================================
// Scenario A: clamped reads
// ============================================================================

#[test]
fn test_read_clamps_to_content() {
    let m = Mounted::latest();
    m.fs().insert_file("/a.txt", 0o644, "hi");

    let (status, data) = m.read("/a.txt", 5, 1);
    assert_eq!(status, 1);
    assert_eq!(data, b"i");

    let (status, data) = m.read("/a.txt", 5, 10);
    assert_eq!(status, 0);
    assert!(data.is_empty());
}

#[test]
fn test_read_buf_emulation_returns_clamped_bytes() {
    let m = Mounted::latest();
    m.fs().insert_file("/a.txt", 0o644, "hi");

    let (status, data) = m.read_buf("/a.txt", 5, 1);
    assert_eq!(status, 0);
    assert_eq!(data, b"i");

    let (status, data) = m.read_buf(HELLO_PATH, 64, 0);
    assert_eq!(status, 0);
    assert_eq!(data, HELLO_CONTENT);

    let (status, data) = m.read_buf("/a.txt", 5, 10);
    assert_eq!(status, 0);
    assert!(data.is_empty());
}

// ============================================================================
// Scenario B: overwriting writes
// ============================================================================

#[test]
fn test_write_overwrites_and_extends() {
    let m = Mounted::latest();
    m.fs().insert_file("/a.txt", 0o644, "hi");

    assert_eq!(m.write("/a.txt", b"bye", 0), 3);
    assert_eq!(m.fs().node("/a.txt").unwrap().content, b"bye");

    let (_, st) = m.getattr("/a.txt");
    assert_eq!(st.size, 3);
}

#[test]
fn test_write_buf_emulation_reaches_backend() {
    let m = Mounted::latest();
    m.fs().insert_file("/a.txt", 0o644, "hi");

    let mut bufv = BufVec::from_mem([&b"by"[..], &b"e!"[..]]);
    let status = m.table.write_buf.unwrap()(
        &m.adapter,
        &m.ctx,
        "/a.txt",
        &mut bufv,
        0,
        &FileInfo::default(),
    );
    assert_eq!(status, 4);
    assert_eq!(m.fs().node("/a.txt").unwrap().content, b"bye!");
}

// ============================================================================
// Scenario C: directory renames
// ============================================================================

#[test]
fn test_rename_moves_directory_subtree() {
    let m = Mounted::latest();
    m.fs().insert_dir("/d", 0o755);
    m.fs().insert_file("/d/x", 0o644, "x");

    assert_eq!(m.rename("/d", "/e"), 0);
    assert!(m.fs().contains("/e/x"));
    assert!(!m.fs().contains("/d"));
    assert!(!m.fs().contains("/d/x"));

    let (status, names) = m.list("/e");
    assert_eq!(status, 0);
    assert_eq!(names, vec![".", "..", "x"]);
}

#[test]
fn test_failed_rename_rolls_back_moved_children() {
    let m = Mounted::latest();
    m.fs().insert_dir("/d", 0o755);
    m.fs().insert_file("/d/a", 0o644, "a");
    m.fs().insert_file("/d/x", 0o644, "x");
    m.fs().fail_rename_of("/d/x", pathfuse::Errno::EIO);

    assert_eq!(m.rename("/d", "/e"), -libc::EIO);

    let paths = m.fs().paths();
    assert!(paths.contains(&"/d".to_string()));
    assert!(paths.contains(&"/d/a".to_string()));
    assert!(paths.contains(&"/d/x".to_string()));
    assert!(paths.iter().all(|p| !p.starts_with("/e")));
    assert_eq!(m.fs().node("/d/a").unwrap().content, b"a");
}

#[test]
fn test_rename_flags_reach_backend_on_latest_revision() {
    let m = Mounted::latest();
    m.fs().insert_file("/a", 0o644, "a");
    m.fs().insert_file("/b", 0o644, "b");
    let status = m.table.rename.unwrap().call(&m.adapter, &m.ctx, "/a", "/b", 1);
    assert_eq!(status, -libc::EEXIST);
}

// ============================================================================
// Scenario D: errors
// ============================================================================

#[test]
fn test_getattr_on_missing_path() {
    let m = Mounted::latest();
    assert_eq!(m.getattr("/nope").0, ENOENT);
}

#[test]
fn test_rmdir_non_empty_keeps_everything() {
    let m = Mounted::latest();
    m.fs().insert_dir("/d", 0o755);
    m.fs().insert_file("/d/x", 0o644, "x");

    let status = m.table.rmdir.unwrap()(&m.adapter, &m.ctx, "/d");
    assert_eq!(status, ENOTEMPTY);
    assert!(m.fs().contains("/d"));
    assert!(m.fs().contains("/d/x"));

    let status = m.table.rmdir.unwrap()(&m.adapter, &m.ctx, "/missing");
    assert_eq!(status, ENOENT);
}

// ============================================================================
// Creation and the session mask
// ============================================================================

#[test]
fn test_mkdir_and_create_apply_umask() {
    let m = Mounted::latest();
    assert_eq!(m.table.mkdir.unwrap()(&m.adapter, &m.ctx, "/sub", 0o777), 0);
    let (_, st) = m.getattr("/sub");
    assert_eq!(st.mode, S_IFDIR | 0o755);

    let mut fi = FileInfo::with_flags(libc::O_CREAT | libc::O_WRONLY);
    assert_eq!(
        m.table.create.unwrap()(&m.adapter, &m.ctx, "/sub/f", 0o666, &mut fi),
        0
    );
    let (_, st) = m.getattr("/sub/f");
    assert_eq!(st.mode, S_IFREG | 0o644);
}

#[test]
fn test_session_identity_owns_every_node() {
    let m = Mounted::latest();
    let other = RequestContext::new(0, 0, 5);
    let mut st = FileStat::default();
    assert_eq!(m.table.getattr.unwrap()(&m.adapter, &other, HELLO_PATH, &mut st), 0);
    assert_eq!((st.uid, st.gid), (1000, 1000));
}

// ============================================================================
// Older revisions
// ============================================================================

#[test]
fn test_legacy_getdir_lists_through_readdir() {
    let m = Mounted::at(ProtocolRevision::V22);
    assert!(m.table.readdir.is_none());

    let mut names = Names::default();
    let status = m.table.getdir.unwrap()(&m.adapter, &m.ctx, "/", DirHandle::new(1), &mut names);
    assert_eq!(status, 0);
    assert_eq!(names.0, vec![".", "..", "helloworld.txt"]);
}

#[test]
fn test_legacy_utime_sets_whole_seconds() {
    let m = Mounted::at(ProtocolRevision::V25);
    let buf = pathfuse::UtimBuf {
        actime: 100,
        modtime: 200,
    };
    assert_eq!(m.table.utime.unwrap()(&m.adapter, &m.ctx, HELLO_PATH, &buf), 0);
    let node = m.fs().node(HELLO_PATH).unwrap();
    assert_eq!(node.atime, Timespec::from_secs(100));
    assert_eq!(node.mtime, Timespec::from_secs(200));
}

#[test]
fn test_unimplemented_operations_stay_unbound() {
    let m = Mounted::latest();
    assert!(m.table.link.is_none());
    assert!(m.table.chown.is_none());
    assert!(m.table.lock.is_none());
    assert!(m.table.getattr.is_some());
}
