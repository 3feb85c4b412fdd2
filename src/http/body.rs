//! Response body source: an in-memory buffer or a file, both read through
//! the same byte-range-aware cursor (§4.5, §4.6).
//!
//! Grounded on the original `IBodyStream`/`FileStream`/`MemoryStream`
//! hierarchy: a single cursor walks an ordered, merged list of byte ranges,
//! emitting a zero-length chunk at each range boundary so the response
//! serializer can insert a `multipart/byteranges` delimiter without the
//! stream needing to know about MIME framing itself.

use crate::errors::ServerError;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// One resolved, in-bounds byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ByteRange {
    pub(crate) start: u64,
    pub(crate) end: u64,
}

impl ByteRange {
    fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

enum Source {
    Memory(Vec<u8>),
    File { path: PathBuf, handle: Option<File> },
}

/// A response body, optionally restricted to one or more byte ranges.
pub(crate) struct BodyStream {
    source: Source,
    total_size: u64,
    ranges: Vec<ByteRange>,
    /// Precompressed on disk already (a `.gz`/`.br` sibling file) — the
    /// response path must not compress it again (§4.4).
    precompressed: bool,

    cursor_range: usize,
    cursor_pos: u64,
    /// Set once the boundary chunk for `cursor_range` has been emitted, so
    /// it's only emitted once per range transition.
    boundary_pending: bool,
}

impl BodyStream {
    pub(crate) fn memory(data: Vec<u8>) -> Self {
        let total_size = data.len() as u64;
        BodyStream {
            source: Source::Memory(data),
            total_size,
            ranges: Vec::new(),
            precompressed: false,
            cursor_range: 0,
            cursor_pos: 0,
            boundary_pending: false,
        }
    }

    pub(crate) fn file(path: PathBuf, size: u64, precompressed: bool) -> Self {
        BodyStream {
            source: Source::File { path, handle: None },
            total_size: size,
            ranges: Vec::new(),
            precompressed,
            cursor_range: 0,
            cursor_pos: 0,
            boundary_pending: false,
        }
    }

    pub(crate) fn is_precompressed(&self) -> bool {
        self.precompressed
    }

    pub(crate) fn total_size(&self) -> u64 {
        self.total_size
    }

    pub(crate) fn is_ranged(&self) -> bool {
        !self.ranges.is_empty()
    }

    pub(crate) fn is_multipart(&self) -> bool {
        self.ranges.len() > 1
    }

    pub(crate) fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Total bytes the response will actually send: the whole body, or the
    /// sum of the (merged) requested ranges.
    pub(crate) fn content_length(&self) -> u64 {
        match self.ranges.is_empty() {
            true => self.total_size,
            false => self.ranges.iter().map(ByteRange::len).sum(),
        }
    }

    /// Normalizes and merges the request's raw `Range` intervals against
    /// this body's size. Returns `false` (§4.5, `416`) if nothing in the
    /// request overlaps the body at all; ranges that don't overlap are
    /// dropped individually rather than failing the whole request, per
    /// [RFC 9110 §14.1.2](https://www.rfc-editor.org/rfc/rfc9110#section-14.1.2).
    pub(crate) fn apply_ranges(&mut self, requested: &[(Option<u64>, Option<u64>)]) -> bool {
        if self.total_size == 0 || requested.is_empty() {
            return !requested.is_empty();
        }

        let mut resolved: Vec<ByteRange> = requested
            .iter()
            .filter_map(|&(start, end)| resolve_range(start, end, self.total_size))
            .collect();

        if resolved.is_empty() {
            return false;
        }

        resolved.sort_by_key(|r| r.start);
        self.ranges = merge(resolved);
        true
    }

    /// Reads the next chunk, up to `max` bytes. Returns `None` once every
    /// range (or, unranged, the whole body) has been fully read. A range
    /// transition first yields `Some((index, vec![]))` as a boundary marker.
    pub(crate) async fn next_chunk(&mut self, max: usize) -> Result<Option<(usize, Vec<u8>)>, ServerError> {
        if self.ranges.is_empty() {
            return self.read_unranged(max).await;
        }

        if self.cursor_range >= self.ranges.len() {
            return Ok(None);
        }

        if self.is_multipart() && !self.boundary_pending {
            self.boundary_pending = true;
            return Ok(Some((self.cursor_range, Vec::new())));
        }

        let range = self.ranges[self.cursor_range];
        let remaining_in_range = range.len() - self.cursor_pos;
        if remaining_in_range == 0 {
            self.cursor_range += 1;
            self.cursor_pos = 0;
            self.boundary_pending = false;
            return self.box_next(max).await;
        }

        let want = remaining_in_range.min(max as u64) as usize;
        let absolute_offset = range.start + self.cursor_pos;
        let data = self.read_at(absolute_offset, want).await?;
        self.cursor_pos += data.len() as u64;
        Ok(Some((self.cursor_range, data)))
    }

    // `next_chunk` recurses once when a range is exhausted; boxing keeps the
    // async fn's future a fixed size.
    fn box_next<'a>(
        &'a mut self,
        max: usize,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<(usize, Vec<u8>)>, ServerError>> + 'a>> {
        Box::pin(self.next_chunk(max))
    }

    async fn read_unranged(&mut self, max: usize) -> Result<Option<(usize, Vec<u8>)>, ServerError> {
        if self.cursor_pos >= self.total_size {
            return Ok(None);
        }
        let want = (self.total_size - self.cursor_pos).min(max as u64) as usize;
        let data = self.read_at(self.cursor_pos, want).await?;
        self.cursor_pos += data.len() as u64;
        Ok(Some((0, data)))
    }

    async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ServerError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        match &mut self.source {
            Source::Memory(buf) => {
                let start = offset as usize;
                let end = (start + len).min(buf.len());
                Ok(buf[start..end].to_vec())
            }
            Source::File { path, handle } => {
                if handle.is_none() {
                    *handle = Some(File::open(&path).await.map_err(ServerError::from)?);
                }
                let file = handle.as_mut().expect("handle just populated");
                file.seek(std::io::SeekFrom::Start(offset)).await.map_err(ServerError::from)?;
                let mut buf = vec![0u8; len];
                let mut total = 0;
                while total < len {
                    let n = file.read(&mut buf[total..]).await.map_err(ServerError::from)?;
                    if n == 0 {
                        break;
                    }
                    total += n;
                }
                buf.truncate(total);
                Ok(buf)
            }
        }
    }
}

fn resolve_range(start: Option<u64>, end: Option<u64>, size: u64) -> Option<ByteRange> {
    match (start, end) {
        (Some(start), Some(end)) if start <= end && start < size => {
            Some(ByteRange { start, end: end.min(size - 1) })
        }
        (Some(start), None) if start < size => Some(ByteRange { start, end: size - 1 }),
        (None, Some(suffix_len)) if suffix_len > 0 => {
            let len = suffix_len.min(size);
            Some(ByteRange { start: size - len, end: size - 1 })
        }
        _ => None,
    }
}

/// Merges sorted ranges that touch or overlap: `next.start <= last.end + 1`.
fn merge(sorted: Vec<ByteRange>) -> Vec<ByteRange> {
    let mut out: Vec<ByteRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(last) if range.start <= last.end + 1 => {
                last.end = last.end.max(range.end);
            }
            _ => out.push(range),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_touching_and_overlapping_ranges() {
        let ranges = vec![
            ByteRange { start: 0, end: 10 },
            ByteRange { start: 11, end: 20 },
            ByteRange { start: 50, end: 60 },
            ByteRange { start: 55, end: 70 },
        ];
        let merged = merge(ranges);
        assert_eq!(
            merged,
            vec![ByteRange { start: 0, end: 20 }, ByteRange { start: 50, end: 70 }]
        );
    }

    #[test]
    fn resolves_suffix_and_open_ranges() {
        assert_eq!(resolve_range(None, Some(10), 100), Some(ByteRange { start: 90, end: 99 }));
        assert_eq!(resolve_range(Some(90), None, 100), Some(ByteRange { start: 90, end: 99 }));
        assert_eq!(resolve_range(Some(0), Some(499), 100), Some(ByteRange { start: 0, end: 99 }));
        assert_eq!(resolve_range(Some(200), None, 100), None);
        assert_eq!(resolve_range(None, Some(0), 100), None);
    }

    #[tokio::test]
    async fn unranged_memory_reads_whole_body_in_chunks() {
        let mut body = BodyStream::memory(b"hello world".to_vec());
        let mut collected = Vec::new();
        while let Some((_, chunk)) = body.next_chunk(4).await.unwrap() {
            collected.extend(chunk);
        }
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn ranged_memory_reads_only_requested_span() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        assert!(body.apply_ranges(&[(Some(2), Some(5))]));
        assert_eq!(body.content_length(), 4);

        let mut collected = Vec::new();
        while let Some((_, chunk)) = body.next_chunk(100).await.unwrap() {
            collected.extend(chunk);
        }
        assert_eq!(collected, b"2345");
    }

    #[tokio::test]
    async fn multipart_ranges_emit_boundary_markers_between_spans() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        assert!(body.apply_ranges(&[(Some(0), Some(1)), (Some(8), Some(9))]));
        assert!(body.is_multipart());

        let mut events = Vec::new();
        while let Some((idx, chunk)) = body.next_chunk(100).await.unwrap() {
            events.push((idx, chunk));
        }
        assert_eq!(events[0], (0, Vec::new()));
        assert_eq!(events[1], (0, b"01".to_vec()));
        assert_eq!(events[2], (1, Vec::new()));
        assert_eq!(events[3], (1, b"89".to_vec()));
    }

    #[test]
    fn out_of_bounds_ranges_are_unsatisfiable() {
        let mut body = BodyStream::memory(b"short".to_vec());
        assert!(!body.apply_ranges(&[(Some(100), Some(200))]));
    }
}
