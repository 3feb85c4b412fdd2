//! Response construction and wire serialization (§4.3, §4.6).
//!
//! Keeps the teacher's fluent fluent-builder shape (`.status()`, `.header()`,
//! a final body-setting call) but replaces the flat in-memory `Vec<u8>`
//! buffer with a [`BodyStream`](crate::http::body::BodyStream): Mercury's
//! bodies come from files or CGI output that can exceed what's comfortable
//! to hold twice over, and byte-range/`multipart/byteranges` serialization
//! needs a cursor, not a single `write` call.
//!
//! Serialization is version-dispatched per §4.3: HTTP/0.9 writes body bytes
//! only (no status line, no headers); HTTP/1.0 and HTTP/1.1 both write a
//! status line and canonically-cased headers, differing only in what the
//! connection loop does with `keep_alive` afterward.

use crate::{
    errors::ServerError,
    http::body::BodyStream,
    http::compress::{self, Compressor},
    http::types::{canonical_header_name, CompressMethod, StatusCode, Version},
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The `Server` header value sent on every non-HTTP/0.9 response (§4.6).
pub(crate) const SERVER_SOFTWARE: &str = "Mercury/1.0";

/// A response under construction. Every field is mutated through the
/// `&mut self -> &mut Self` builder methods so callers can chain:
/// `resp.status(StatusCode::Ok).header("Content-Type", mime);`
pub(crate) struct Response {
    status: StatusCode,
    version: Version,
    headers: Vec<(String, String)>,
    keep_alive: bool,
    body: Option<BodyStream>,
    compress: CompressMethod,
    /// HEAD, 304, and 204 send headers as if the body were present but
    /// suppress the body bytes themselves (§4.6).
    suppress_body: bool,
    /// Generated once per multipart response and reused for both the
    /// `Content-Type` header and every part delimiter — two independent
    /// calls to a time-seeded generator would not agree with each other.
    multipart_boundary: Option<String>,
    /// The resource's own `Content-Type`, stashed by `write_length_headers`
    /// before it overwrites the header with `multipart/byteranges; ...` —
    /// each part still needs to advertise the real MIME type, not the
    /// envelope's.
    multipart_part_content_type: Option<String>,
    /// Set when a compressed HTTP/1.1 body's length is unknown up front;
    /// `write` then wraps each emitted piece in chunk framing instead of
    /// forcing the connection closed (§4.6).
    chunked: bool,
}

impl Response {
    pub(crate) fn new(version: Version) -> Self {
        Response {
            status: StatusCode::Ok,
            version,
            headers: Vec::new(),
            keep_alive: false,
            body: None,
            compress: CompressMethod::Identity,
            suppress_body: false,
            multipart_boundary: None,
            multipart_part_content_type: None,
            chunked: false,
        }
    }

    pub(crate) fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub(crate) fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn keep_alive(&mut self, yes: bool) -> &mut Self {
        self.keep_alive = yes;
        self
    }

    pub(crate) fn set_body(&mut self, body: BodyStream) -> &mut Self {
        self.body = Some(body);
        self
    }

    pub(crate) fn suppress_body(&mut self) -> &mut Self {
        self.suppress_body = true;
        self
    }

    /// Negotiates compression against the body currently set. A no-op if no
    /// body has been attached yet, if the body is already precompressed on
    /// disk, or if the response carries byte ranges (range offsets are into
    /// the *stored* bytes; compressing on the fly would invalidate them).
    pub(crate) fn negotiate_compression(&mut self, accepted: &[String], min_size: usize) -> &mut Self {
        let Some(body) = &self.body else { return self };
        if body.is_precompressed() || body.is_ranged() || body.content_length() < min_size as u64 {
            return self;
        }
        self.compress = compress::negotiate(accepted);
        self
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        self.status
    }

    /// The final keep-alive decision, accounting for a compressed HTTP/1.0
    /// body forcing a close (HTTP/1.1 instead frames it as chunked and can
    /// stay alive); read by the connection loop to decide whether to add
    /// `Keep-Alive: timeout=…, max=…` and whether to loop for another request.
    pub(crate) fn keep_alive_flag(&self) -> bool {
        self.keep_alive
    }

    /// Writes the full response (status line, headers, body) to `out`.
    pub(crate) async fn write<W: AsyncWrite + Unpin>(
        &mut self,
        out: &mut W,
        buffer_size: usize,
    ) -> Result<(), ServerError> {
        let head = self.serialize_head();
        if !head.is_empty() {
            out.write_all(&head).await.map_err(ServerError::from)?;
        }

        if self.suppress_body {
            return out.flush().await.map_err(ServerError::from);
        }

        let Some(mut body) = self.body.take() else {
            return out.flush().await.map_err(ServerError::from);
        };

        let mut compressor = compress::build(self.compress, buffer_size);
        let boundary = self.multipart_boundary_str();
        let chunked = self.chunked;

        while let Some((range_idx, chunk)) = body.next_chunk(buffer_size).await? {
            if chunk.is_empty() && body.is_multipart() {
                let part_header = self.multipart_part_header(&boundary, &body, range_idx);
                out.write_all(part_header.as_bytes()).await.map_err(ServerError::from)?;
                continue;
            }
            match &mut compressor {
                Some(c) => {
                    let out_chunk = c.write(&chunk)?;
                    write_chunk(out, &out_chunk, chunked).await?;
                }
                None => write_chunk(out, &chunk, chunked).await?,
            }
        }

        if let Some(mut c) = compressor {
            let tail = c.finish()?;
            write_chunk(out, &tail, chunked).await?;
        }

        if chunked {
            out.write_all(b"0\r\n\r\n").await.map_err(ServerError::from)?;
        }

        if body.is_multipart() {
            out.write_all(format!("\r\n--{boundary}--\r\n").as_bytes())
                .await
                .map_err(ServerError::from)?;
        }

        out.flush().await.map_err(ServerError::from)
    }

    /// Returns this response's boundary, generating and caching it on first
    /// use so every caller within one response agrees on the same value.
    fn multipart_boundary_str(&mut self) -> String {
        if let Some(boundary) = &self.multipart_boundary {
            return boundary.clone();
        }
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let boundary = format!("mercury-boundary-{nanos:x}");
        self.multipart_boundary = Some(boundary.clone());
        boundary
    }

    fn multipart_part_header(&self, boundary: &str, body: &BodyStream, range_idx: usize) -> String {
        let range = body.ranges()[range_idx];
        let content_type = self
            .multipart_part_content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        format!(
            "\r\n--{boundary}\r\nContent-Type: {content_type}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
            range.start,
            range.end,
            body.total_size()
        )
    }

    /// Builds the status line + header block. Empty for HTTP/0.9, which has
    /// neither (§4.3).
    fn serialize_head(&mut self) -> Vec<u8> {
        if self.version == Version::Http09 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(self.status.into_first_line(self.version));

        self.header("Server", SERVER_SOFTWARE);
        self.header("Date", httpdate::fmt_http_date(std::time::SystemTime::now()));
        // Must run before the Connection header is written: a compressed
        // HTTP/1.0 body flips keep_alive to false, and that decision has to
        // land in the header we're about to emit, not the one before it.
        self.write_length_headers();
        self.header("Connection", if self.keep_alive { "keep-alive" } else { "close" });
        if self.compress != CompressMethod::Identity {
            self.header("Content-Encoding", self.compress.as_str());
        }

        for (name, value) in &self.headers {
            out.extend_from_slice(canonical_header_name(name).as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    fn write_length_headers(&mut self) {
        let Some(body) = &self.body else { return };
        let is_multipart = body.is_multipart();
        let first_range = body.ranges().first().copied();
        let content_length = body.content_length();
        let total_size = body.total_size();

        if is_multipart {
            self.multipart_part_content_type = self
                .headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case("content-type"))
                .map(|(_, v)| v.clone());
            let boundary = self.multipart_boundary_str();
            self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("content-type"));
            self.header("Content-Type", format!("multipart/byteranges; boundary={boundary}"));
            return;
        }

        if let Some(range) = first_range {
            self.status = StatusCode::PartialContent;
            self.header("Content-Range", format!("bytes {}-{}/{}", range.start, range.end, total_size));
        }

        if self.compress == CompressMethod::Identity {
            self.header("Content-Length", content_length.to_string());
            return;
        }

        // A compressed body's length isn't known until the stream finishes;
        // HTTP/1.1 can frame that with `Transfer-Encoding: chunked` and keep
        // the connection alive. HTTP/1.0 has no chunked encoding, so fall
        // back to reading until close instead.
        if self.version == Version::Http11 {
            self.chunked = true;
            self.header("Transfer-Encoding", "chunked");
        } else {
            self.keep_alive = false;
        }
    }
}

/// Writes one piece of body data, wrapped in `Transfer-Encoding: chunked`
/// framing (`<size-in-hex>\r\n<data>\r\n`) when `chunked` is set, or as-is
/// otherwise. An empty piece writes nothing — an empty chunk would be
/// mistaken for the terminating `0\r\n\r\n` the caller writes separately.
async fn write_chunk<W: AsyncWrite + Unpin>(out: &mut W, data: &[u8], chunked: bool) -> Result<(), ServerError> {
    if data.is_empty() {
        return Ok(());
    }
    if chunked {
        out.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await.map_err(ServerError::from)?;
        out.write_all(data).await.map_err(ServerError::from)?;
        out.write_all(b"\r\n").await.map_err(ServerError::from)?;
    } else {
        out.write_all(data).await.map_err(ServerError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http09_has_no_status_line_or_headers() {
        let mut resp = Response::new(Version::Http09);
        resp.status(StatusCode::Ok).header("Content-Type", "text/plain");
        assert!(resp.serialize_head().is_empty());
    }

    #[test]
    fn http11_head_includes_status_line_and_headers() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::NotFound)
            .header("Content-Type", "text/html")
            .keep_alive(true);
        let head = String::from_utf8(resp.serialize_head()).unwrap();
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert!(head.contains("Content-Type: text/html\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn every_non_0_9_response_carries_server_and_date() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok);
        let head = String::from_utf8(resp.serialize_head()).unwrap();
        assert!(head.contains(&format!("Server: {SERVER_SOFTWARE}\r\n")));
        assert!(head.contains("Date: "));
    }

    #[test]
    fn content_length_written_for_uncompressed_body() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok).set_body(BodyStream::memory(b"hello".to_vec()));
        let head = String::from_utf8(resp.serialize_head()).unwrap();
        assert!(head.contains("Content-Length: 5\r\n"));
    }

    #[tokio::test]
    async fn compressed_http11_body_is_chunked_and_stays_alive() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .keep_alive(true)
            .set_body(BodyStream::memory(b"hello world, hello world".to_vec()));
        resp.negotiate_compression(&["gzip".to_string()], 0);

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length:"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn compressed_http10_body_omits_length_and_closes() {
        let mut resp = Response::new(Version::Http10);
        resp.status(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .keep_alive(true)
            .set_body(BodyStream::memory(b"hello world, hello world".to_vec()));
        resp.negotiate_compression(&["gzip".to_string()], 0);

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8_lossy(&out);

        assert!(!text.contains("Transfer-Encoding"));
        assert!(!text.contains("Content-Length:"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn single_range_forces_partial_content_and_content_range() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        body.apply_ranges(&[(Some(2), Some(4))]);

        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok).set_body(body);
        let head = String::from_utf8(resp.serialize_head()).unwrap();
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(head.contains("Content-Range: bytes 2-4/10\r\n"));
    }

    #[test]
    fn multipart_ranges_set_multipart_content_type() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        body.apply_ranges(&[(Some(0), Some(1)), (Some(8), Some(9))]);

        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok).header("Content-Type", "text/plain").set_body(body);
        let head = String::from_utf8(resp.serialize_head()).unwrap();
        assert!(head.contains("Content-Type: multipart/byteranges; boundary=mercury-boundary-"));
        assert!(!head.contains("Content-Type: text/plain\r\n"));
    }

    #[tokio::test]
    async fn multipart_boundary_matches_between_header_and_body() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        body.apply_ranges(&[(Some(0), Some(1)), (Some(8), Some(9))]);

        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok).set_body(body);

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        let header_boundary = text
            .lines()
            .find_map(|l| l.strip_prefix("Content-Type: multipart/byteranges; boundary="))
            .expect("Content-Type header with boundary");
        let delimiter = format!("--{header_boundary}");
        assert!(text.matches(&delimiter).count() >= 3, "expected two part delimiters plus a closing one: {text}");
    }

    #[tokio::test]
    async fn multipart_parts_carry_the_resources_own_content_type() {
        let mut body = BodyStream::memory(b"0123456789".to_vec());
        body.apply_ranges(&[(Some(0), Some(1)), (Some(8), Some(9))]);

        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok).header("Content-Type", "application/octet-stream").set_body(body);

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Content-Type: multipart/byteranges; boundary="));
        assert_eq!(text.matches("Content-Type: application/octet-stream").count(), 2);
    }

    #[tokio::test]
    async fn write_streams_memory_body_to_writer() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .set_body(BodyStream::memory(b"hello world".to_vec()));

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hello world"));
    }

    #[tokio::test]
    async fn head_suppresses_body_bytes_but_keeps_length() {
        let mut resp = Response::new(Version::Http11);
        resp.status(StatusCode::Ok)
            .set_body(BodyStream::memory(b"hello world".to_vec()))
            .suppress_body();

        let mut out = Vec::new();
        resp.write(&mut out, 4096).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(!text.contains("hello world"));
    }
}
