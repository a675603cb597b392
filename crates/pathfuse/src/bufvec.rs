//! Scatter/gather buffers and their emulation on top of single-buffer I/O.
//!
//! A [`BufVec`] is an ordered list of [`Buf`] segments plus a cursor
//! (segment index and offset inside that segment). Segments are either owned
//! memory or a file descriptor to splice from. Only memory segments can be
//! emulated; descriptor segments are refused with `ENOSYS`.

use crate::error::{Errno, OpResult};
use crate::filesystem::PathFilesystem;
use crate::session::SessionContext;
use crate::types::FileInfo;
use std::os::fd::RawFd;

/// Storage behind one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufData {
    /// Bytes held in memory.
    Mem(Vec<u8>),
    /// Bytes to be read from or written to a descriptor.
    Fd {
        /// The descriptor.
        fd: RawFd,
        /// Explicit file position, or `None` to use the descriptor's own.
        pos: Option<u64>,
    },
}

/// One segment of a [`BufVec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buf {
    size: usize,
    data: BufData,
    pos: u64,
}

impl Buf {
    /// A memory segment covering all of `data`.
    pub fn mem(data: Vec<u8>) -> Self {
        Self {
            size: data.len(),
            data: BufData::Mem(data),
            pos: 0,
        }
    }

    /// A descriptor segment of `size` bytes.
    pub fn fd(fd: RawFd, size: usize, pos: Option<u64>) -> Self {
        Self {
            size,
            data: BufData::Fd { fd, pos },
            pos: pos.unwrap_or(0),
        }
    }

    /// Reported size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The backing storage.
    pub fn data(&self) -> &BufData {
        &self.data
    }

    /// Position associated with the segment.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// The segment's bytes, if memory-backed, limited to the reported size.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            BufData::Mem(bytes) => Some(&bytes[..self.size.min(bytes.len())]),
            BufData::Fd { .. } => None,
        }
    }

    fn truncate(&mut self, len: usize) {
        self.size = len;
        self.pos = len as u64;
        if let BufData::Mem(bytes) = &mut self.data {
            bytes.truncate(len);
        }
    }
}

/// An ordered sequence of segments with a consumption cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufVec {
    bufs: Vec<Buf>,
    idx: usize,
    off: usize,
}

impl BufVec {
    /// A vector over `bufs`, cursor at the start.
    pub fn new(bufs: Vec<Buf>) -> Self {
        Self { bufs, idx: 0, off: 0 }
    }

    /// A vector of memory segments.
    pub fn from_mem<I, B>(segments: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Self::new(segments.into_iter().map(|s| Buf::mem(s.into())).collect())
    }

    /// A vector holding a single segment.
    pub fn single(buf: Buf) -> Self {
        Self::new(vec![buf])
    }

    /// The segments, including consumed ones.
    pub fn segments(&self) -> &[Buf] {
        &self.bufs
    }

    /// Index of the segment the cursor is in.
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Offset of the cursor within the current segment.
    pub fn off(&self) -> usize {
        self.off
    }

    /// Total reported size of all segments.
    pub fn len(&self) -> usize {
        self.bufs.iter().map(Buf::size).sum()
    }

    /// Returns true if no segment carries any bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes not yet consumed by the cursor, concatenated.
    ///
    /// Fails with `ENOSYS` if an unconsumed segment is descriptor-backed.
    pub fn into_bytes(self) -> OpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        for (i, buf) in self.bufs.iter().enumerate().skip(self.idx) {
            let bytes = buf.as_bytes().ok_or(Errno::ENOSYS)?;
            let start = if i == self.idx { self.off.min(bytes.len()) } else { 0 };
            out.extend_from_slice(&bytes[start..]);
        }
        Ok(out)
    }

    /// Every segment's bytes, concatenated, ignoring the cursor.
    ///
    /// Fails with `ENOSYS` if any segment is descriptor-backed.
    pub fn contents(&self) -> OpResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        for buf in &self.bufs {
            out.extend_from_slice(buf.as_bytes().ok_or(Errno::ENOSYS)?);
        }
        Ok(out)
    }

    fn advance(&mut self, n: usize) {
        self.off += n;
        if let Some(buf) = self.bufs.get(self.idx)
            && self.off >= buf.size
        {
            self.idx += 1;
            self.off = 0;
        }
    }
}

/// Writes every unconsumed segment of `bufv` through the backend's
/// single-buffer `write`, starting at `offset`.
///
/// Returns the number of bytes the backend accepted. A segment that is
/// accepted only partially ends the pass with the total so far. The cursor
/// of `bufv` is left after the last accepted byte.
pub fn write_vector<F: PathFilesystem + ?Sized>(
    fs: &F,
    cx: &SessionContext,
    path: &str,
    bufv: &mut BufVec,
    offset: u64,
    fi: &FileInfo,
) -> OpResult<usize> {
    let mut total = 0usize;
    let mut pos = offset;
    while bufv.idx < bufv.bufs.len() {
        let buf = &bufv.bufs[bufv.idx];
        let Some(bytes) = buf.as_bytes() else {
            return Err(Errno::ENOSYS);
        };
        let remaining = &bytes[bufv.off.min(bytes.len())..];
        if remaining.is_empty() {
            bufv.advance(0);
            continue;
        }
        let offered = remaining.len();
        let written = fs.write(cx, path, remaining, pos, fi)?.min(offered);
        total += written;
        pos += written as u64;
        bufv.advance(written);
        if written < offered {
            break;
        }
    }
    Ok(total)
}

/// Reads up to `size` bytes at `offset` through the backend's
/// single-buffer `read` into a fresh one-segment vector.
///
/// The segment is shrunk to the number of bytes actually read.
pub fn read_vector<F: PathFilesystem + ?Sized>(
    fs: &F,
    cx: &SessionContext,
    path: &str,
    size: usize,
    offset: u64,
    fi: &FileInfo,
) -> OpResult<BufVec> {
    let mut buf = Buf::mem(vec![0u8; size]);
    let read = match &mut buf.data {
        BufData::Mem(bytes) => fs.read(cx, path, bytes, offset, fi)?,
        BufData::Fd { .. } => return Err(Errno::ENOSYS),
    };
    buf.truncate(read.min(size));
    let mut bufv = BufVec::single(buf);
    bufv.off = bufv.bufs[0].size;
    Ok(bufv)
}

/// The bytes a `read_buf` call left in its output slot.
///
/// The cursor of a filled vector sits after the data it carries, so the
/// whole vector is the reply regardless of the cursor. An empty slot is an
/// empty reply.
pub fn read_reply_bytes(out: Option<BufVec>) -> OpResult<Vec<u8>> {
    out.map_or_else(|| Ok(Vec::new()), |bufv| bufv.contents())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Records every write and accepts at most `limits[call]` bytes per call.
    struct Recorder {
        limits: Vec<usize>,
        calls: Mutex<Vec<(u64, Vec<u8>)>>,
        content: Vec<u8>,
    }

    impl Recorder {
        fn new(limits: Vec<usize>) -> Self {
            Self {
                limits,
                calls: Mutex::new(Vec::new()),
                content: Vec::new(),
            }
        }

        fn with_content(content: &[u8]) -> Self {
            Self {
                content: content.to_vec(),
                ..Self::new(Vec::new())
            }
        }
    }

    impl PathFilesystem for Recorder {
        fn write(
            &self,
            _cx: &SessionContext,
            _path: &str,
            data: &[u8],
            offset: u64,
            _fi: &FileInfo,
        ) -> OpResult<usize> {
            let mut calls = self.calls.lock();
            let limit = self.limits.get(calls.len()).copied().unwrap_or(usize::MAX);
            let n = data.len().min(limit);
            calls.push((offset, data[..n].to_vec()));
            Ok(n)
        }

        fn read(
            &self,
            _cx: &SessionContext,
            _path: &str,
            buf: &mut [u8],
            offset: u64,
            _fi: &FileInfo,
        ) -> OpResult<usize> {
            let start = (offset as usize).min(self.content.len());
            let n = buf.len().min(self.content.len() - start);
            buf[..n].copy_from_slice(&self.content[start..start + n]);
            Ok(n)
        }
    }

    fn cx() -> SessionContext {
        SessionContext::default()
    }

    #[test]
    fn test_write_advances_offset_per_segment() {
        let fs = Recorder::new(vec![]);
        let mut bufv = BufVec::from_mem([b"ab".to_vec(), b"cde".to_vec()]);
        let n = write_vector(&fs, &cx(), "/f", &mut bufv, 10, &FileInfo::default()).unwrap();
        assert_eq!(n, 5);
        let calls = fs.calls.lock();
        assert_eq!(calls[0], (10, b"ab".to_vec()));
        assert_eq!(calls[1], (12, b"cde".to_vec()));
        assert_eq!(bufv.idx(), 2);
    }

    #[test]
    fn test_short_write_stops_pass() {
        let fs = Recorder::new(vec![2, 1]);
        let mut bufv = BufVec::from_mem([b"ab".to_vec(), b"cde".to_vec(), b"f".to_vec()]);
        let n = write_vector(&fs, &cx(), "/f", &mut bufv, 0, &FileInfo::default()).unwrap();
        assert_eq!(n, 3);
        assert_eq!(fs.calls.lock().len(), 2);
        assert_eq!((bufv.idx(), bufv.off()), (1, 1));
    }

    #[test]
    fn test_write_resumes_from_cursor() {
        let fs = Recorder::new(vec![1]);
        let mut bufv = BufVec::from_mem([b"xyz".to_vec()]);
        write_vector(&fs, &cx(), "/f", &mut bufv, 0, &FileInfo::default()).unwrap();
        let rest = bufv.into_bytes().unwrap();
        assert_eq!(rest, b"yz");
    }

    #[test]
    fn test_fd_segment_not_implemented() {
        let fs = Recorder::new(vec![]);
        let mut bufv = BufVec::new(vec![Buf::fd(3, 10, None)]);
        let err = write_vector(&fs, &cx(), "/f", &mut bufv, 0, &FileInfo::default());
        assert_eq!(err, Err(Errno::ENOSYS));
        assert!(fs.calls.lock().is_empty());
    }

    #[test]
    fn test_fd_after_memory_still_fails() {
        let fs = Recorder::new(vec![]);
        let mut bufv = BufVec::new(vec![Buf::mem(b"ok".to_vec()), Buf::fd(3, 10, Some(0))]);
        let err = write_vector(&fs, &cx(), "/f", &mut bufv, 0, &FileInfo::default());
        assert_eq!(err, Err(Errno::ENOSYS));
    }

    #[test]
    fn test_read_vector_shrinks_to_bytes_read() {
        let fs = Recorder::with_content(b"hi");
        let bufv = read_vector(&fs, &cx(), "/a", 5, 1, &FileInfo::default()).unwrap();
        assert_eq!(bufv.segments().len(), 1);
        assert_eq!(bufv.segments()[0].size(), 1);
        assert_eq!(bufv.segments()[0].pos(), 1);
        assert_eq!(bufv.segments()[0].as_bytes(), Some(&b"i"[..]));
    }

    #[test]
    fn test_read_reply_carries_bytes_behind_cursor() {
        let fs = Recorder::with_content(b"hello");
        let bufv = read_vector(&fs, &cx(), "/a", 3, 1, &FileInfo::default()).unwrap();
        assert_eq!((bufv.idx(), bufv.off()), (0, 3));
        assert_eq!(read_reply_bytes(Some(bufv)).unwrap(), b"ell");
        assert_eq!(read_reply_bytes(None).unwrap(), b"");
    }

    #[test]
    fn test_read_reply_refuses_descriptor_segment() {
        let bufv = BufVec::new(vec![Buf::fd(3, 4, None)]);
        assert_eq!(read_reply_bytes(Some(bufv)), Err(Errno::ENOSYS));
    }

    #[test]
    fn test_read_vector_at_eof_is_empty() {
        let fs = Recorder::with_content(b"hi");
        let bufv = read_vector(&fs, &cx(), "/a", 5, 10, &FileInfo::default()).unwrap();
        assert_eq!(bufv.segments().len(), 1);
        assert!(bufv.is_empty());
    }

    proptest! {
        #[test]
        fn prop_write_total_is_sum_until_first_short(
            sizes in prop::collection::vec(1usize..32, 1..8),
            limits in prop::collection::vec(0usize..40, 8),
        ) {
            let segments: Vec<Vec<u8>> = sizes.iter().map(|&s| vec![0xAB; s]).collect();
            let fs = Recorder::new(limits.clone());
            let mut bufv = BufVec::from_mem(segments);
            let total = write_vector(&fs, &cx(), "/p", &mut bufv, 0, &FileInfo::default()).unwrap();

            let mut expected = 0;
            let mut calls = 0;
            for (i, &size) in sizes.iter().enumerate() {
                let accepted = size.min(limits[i]);
                expected += accepted;
                calls += 1;
                if accepted < size {
                    break;
                }
            }
            prop_assert_eq!(total, expected);
            prop_assert_eq!(fs.calls.lock().len(), calls);
        }

        #[test]
        fn prop_read_never_exceeds_request(
            content in prop::collection::vec(any::<u8>(), 0..64),
            size in 0usize..80,
            offset in 0u64..80,
        ) {
            let fs = Recorder::with_content(&content);
            let bufv = read_vector(&fs, &cx(), "/p", size, offset, &FileInfo::default()).unwrap();
            prop_assert_eq!(bufv.segments().len(), 1);
            prop_assert!(bufv.len() <= size);
        }
    }
}
