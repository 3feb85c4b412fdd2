//! Request-line, header, and body parsing.
//!
//! Keeps the teacher's buffer-scanning technique (`memchr`-driven
//! `find_char`/`get_slice` over a fixed read buffer, tracked `position`/`len`
//! cursor) but drops the `&'static` zero-copy trick: Mercury's `Url`/
//! `HeaderMap` own their bytes, since paths get percent-decoded and may later
//! be rewritten by a `Rewrite` rule, which a borrow of the read buffer can't
//! survive.
//!
//! Line endings are strict: every line up to the body MUST terminate in
//! `\r\n` (§4.2); a bare `\n` is a [`ServerError::MissingCarriageReturn`]
//! framing exception, not a tolerated alternative.

use crate::{
    errors::ServerError,
    http::query::{percent_decode, Query},
    http::types::{self, CompressMethod, HeaderMap, Method, Url, Version},
    limits::{LegacyLimits, ReqLimits},
};
use memchr::memchr;
use std::{io, net::IpAddr, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::sleep,
};

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    keep_alive: bool,

    ip: IpAddr,
    uses_tls: bool,

    /// Values of `Accept`, parameter-stripped, in the order seen.
    accepted_mimes: Vec<String>,
    /// Values of `Accept-Encoding`, parameter-stripped, in the order seen.
    accepted_encodings: Vec<String>,
    /// `Range` intervals as `(start, end)`; `None` marks an open bound
    /// (`bytes=-500` is `(None, Some(500))`, `bytes=500-` is `(Some(500), None)`).
    byte_ranges: Vec<(Option<u64>, Option<u64>)>,
    /// Set once the response path has negotiated an encoding against the
    /// resource being served; absent until then.
    compress_method: Option<CompressMethod>,

    /// Set when the client spelled out the literal `HTTP/0.9` token, which
    /// the design treats as a protocol violation rather than the implicit
    /// two-token HTTP/0.9 request line (§4.2, §9 Open Questions).
    explicit_0_9: bool,
    /// Set when the URL failed validation but parsing could still recover
    /// enough of the request line to keep the connection framed for a 400.
    bad_uri: bool,
    /// Set when `Content-Length` exceeds `MaxRequestBody`; the body is still
    /// drained up to the limit so the connection stays in frame (§4.1.d).
    content_too_large: bool,
    /// Set on any other recoverable 400-class defect.
    bad_400: bool,
}

impl Request {
    pub(crate) fn new() -> Self {
        Request {
            method: Method::Get,
            url: Url::empty(),
            version: Version::Http11,
            headers: HeaderMap::new(),
            body: None,
            keep_alive: true,
            ip: IpAddr::from([0, 0, 0, 0]),
            uses_tls: false,
            accepted_mimes: Vec::new(),
            accepted_encodings: Vec::new(),
            byte_ranges: Vec::new(),
            compress_method: None,
            explicit_0_9: false,
            bad_uri: false,
            content_too_large: false,
            bad_400: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        let ip = self.ip;
        let uses_tls = self.uses_tls;
        *self = Request::new();
        self.ip = ip;
        self.uses_tls = uses_tls;
    }

    pub(crate) fn set_peer(&mut self, ip: IpAddr, uses_tls: bool) {
        self.ip = ip;
        self.uses_tls = uses_tls;
    }

    /// Appends more bytes read directly from the socket once the request
    /// buffer's header phase handed off a partial body (§4.1.d).
    pub(crate) fn append_body(&mut self, bytes: &[u8]) {
        self.body.get_or_insert_with(Vec::new).extend_from_slice(bytes);
    }

    /// Bytes still owed before the declared `Content-Length` is satisfied.
    pub(crate) fn body_remaining(&self) -> usize {
        match self.headers.content_length {
            Some(len) => len.saturating_sub(self.body.as_ref().map_or(0, Vec::len)),
            None => 0,
        }
    }

    pub(crate) fn set_compress_method(&mut self, method: CompressMethod) {
        self.compress_method = Some(method);
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub fn method(&self) -> Method {
        self.method
    }

    #[inline(always)]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    #[inline(always)]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    #[inline(always)]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    #[inline(always)]
    pub fn uses_tls(&self) -> bool {
        self.uses_tls
    }

    /// Returns the first header value with case-insensitive name matching
    /// ([RFC 7230 §3.2](https://tools.ietf.org/html/rfc7230#section-3.2)).
    #[inline(always)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&types::to_upper_ascii(name))
    }

    pub(crate) fn headers(&self) -> &[crate::http::types::Header] {
        &self.headers.headers
    }

    #[inline(always)]
    pub fn content_length(&self) -> Option<usize> {
        self.headers.content_length
    }

    #[inline(always)]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[inline(always)]
    pub fn accepted_mimes(&self) -> &[String] {
        &self.accepted_mimes
    }

    #[inline(always)]
    pub fn accepted_encodings(&self) -> &[String] {
        &self.accepted_encodings
    }

    #[inline(always)]
    pub fn byte_ranges(&self) -> &[(Option<u64>, Option<u64>)] {
        &self.byte_ranges
    }

    #[inline(always)]
    pub fn content_too_large(&self) -> bool {
        self.content_too_large
    }

    #[inline(always)]
    pub fn bad_400(&self) -> bool {
        self.bad_uri || self.bad_400
    }

    #[inline(always)]
    pub(crate) fn explicit_0_9(&self) -> bool {
        self.explicit_0_9
    }
}

/// A fixed read buffer plus the scanning cursor used to tokenize a request
/// off the wire without re-copying bytes for every `memchr` call.
///
/// Fills accumulate (each `fill_buffer` call reads into `buffer[len..]`)
/// rather than overwriting from the start, so a request line or header block
/// split across TCP segments is assembled correctly before parsing resumes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parser {
    position: usize,
    len: usize,
    buffer: Box<[u8]>,
}

impl Parser {
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Parser {
            position: 0,
            len: 0,
            buffer: vec![0; limits.request_buffer_size].into_boxed_slice(),
        }
    }

    #[cfg(test)]
    pub(crate) fn from<V: AsRef<[u8]>>(limits: &ReqLimits, value: V) -> Self {
        let mut buffer = vec![0; limits.request_buffer_size];
        let value = value.as_ref();
        buffer[0..value.len()].copy_from_slice(value);

        Parser {
            position: 0,
            len: value.len(),
            buffer: buffer.into_boxed_slice(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.position = 0;
        self.len = 0;
        self.buffer.fill(0);
    }

    /// Bytes accumulated so far, for the connection loop's `\r\n\r\n` scan —
    /// mirrors `handleReqs`'s `requestStr.find("\r\n\r\n")` poll (§5.2).
    pub(crate) fn filled(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Whether the buffer has room for another read. Callers should treat a
    /// full buffer with no terminator found yet as `HeadersTooLarge`.
    pub(crate) fn is_full(&self) -> bool {
        self.len >= self.buffer.len()
    }

    pub(crate) async fn fill_buffer<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        timeout: Duration,
    ) -> Result<usize, io::Error> {
        if self.is_full() {
            return Ok(0);
        }
        tokio::select! {
            biased;

            read_result = stream.read(&mut self.buffer[self.len..]) => {
                let n = read_result?;
                self.len += n;
                Ok(n)
            }
            _ = sleep(timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            },
        }
    }

    fn find_char(&self, step: usize, delimiter: u8) -> Option<usize> {
        let slice = self.get_slice(self.position, step)?;
        memchr(delimiter, slice)
    }

    fn find_slice(&mut self, limit: usize, delimiter: u8) -> Option<Vec<u8>> {
        let step = self.find_char(limit, delimiter)?;
        let last_index = self.update_position(step);
        self.get_slice(last_index, step).map(<[u8]>::to_vec)
    }

    fn get_slice(&self, start: usize, step: usize) -> Option<&[u8]> {
        self.buffer.get(start..start + step)
    }

    fn get_slice_mut(&mut self, start: usize, step: usize) -> Option<&mut [u8]> {
        self.buffer.get_mut(start..start + step)
    }

    fn update_position(&mut self, step: usize) -> usize {
        let old = self.position;
        self.position += step + 1;
        old
    }
}

/// Drives a [`Parser`] to fill in a [`Request`]. Holds only borrows, so it's
/// cheap to construct fresh for every request on a kept-alive connection.
pub(crate) struct RequestReader<'a> {
    pub(crate) parser: &'a mut Parser,
    pub(crate) request: &'a mut Request,
    pub(crate) req_limits: &'a ReqLimits,
    pub(crate) legacy: Option<&'a LegacyLimits>,
}

impl<'a> RequestReader<'a> {
    pub(crate) fn parse(&mut self) -> Result<Version, ServerError> {
        self.parse_method()?;
        self.parse_url()?;
        if self.check_http09()? {
            return Ok(self.request.version);
        }
        self.check_version()?;
        self.parse_headers()?;
        self.check_body()?;

        Ok(self.request.version)
    }

    // --- request line ---

    fn parse_method(&mut self) -> Result<(), ServerError> {
        // "OPTIONS " is the longest method token with its trailing space.
        let slice = self
            .parser
            .get_slice(0, 8)
            .ok_or(ServerError::MalformedStartLine)?;

        let (method, step) = Method::from_bytes(slice)?;
        self.request.method = method;
        self.parser.position = step;
        Ok(())
    }

    fn parse_url(&mut self) -> Result<(), ServerError> {
        let is_http09_candidate = self.is_http09_candidate();
        let [start, posit] = match self.parser.find_char(self.req_limits.request_buffer_size, b' ') {
            Some(pos) => [self.parser.position + 1, pos],
            None if is_http09_candidate => self.parse_http09_target()?,
            None => return Err(ServerError::MalformedStartLine),
        };

        let parser = &mut self.parser;
        let start_pos = start + posit;
        let slice_url = parser
            .buffer
            .get(start..start_pos)
            .ok_or(ServerError::MalformedStartLine)?
            .to_vec();

        if slice_url.is_empty() || parser.buffer[start - 1] != b'/' {
            self.request.bad_uri = true;
            return Err(ServerError::BadUri);
        }

        let raw_target = String::from_utf8_lossy(&slice_url).into_owned();
        let (raw_path, raw_query) = match memchr(b'?', &slice_url) {
            Some(q) => (&slice_url[..q], Some(&slice_url[q + 1..])),
            None => (slice_url.as_slice(), None),
        };

        // Segments are decoded per-segment off the *raw* path so an encoded
        // `%2F` inside a segment can't be mistaken for a path separator; the
        // flattened `decoded_path` is only for display/resolution and is
        // normalized (and may collapse such a decoded slash) separately.
        let decoded_path = normalize_path(&percent_decode(raw_path));
        let parts: Vec<String> = raw_path
            .split(|&b| b == b'/')
            .filter(|seg| !seg.is_empty())
            .map(percent_decode)
            .collect();

        let (query, query_parts) = match raw_query {
            Some(q) => {
                let decoded = String::from_utf8_lossy(q).into_owned();
                let full = format!("?{decoded}");
                (Some(full), Query::parse(&decoded))
            }
            None => (None, Vec::new()),
        };

        self.request.url = Url {
            raw_target,
            decoded_path,
            parts,
            query,
            query_parts,
        };

        parser.position = start_pos;
        Ok(())
    }

    fn check_version(&mut self) -> Result<(), ServerError> {
        // "HTTP/1.X\r\n" — 10 bytes including the line break.
        let slice = self
            .parser
            .find_slice(10, b'\n')
            .ok_or(ServerError::MalformedStartLine)?;

        if slice.len() != 9 || slice[8] != b'\r' {
            return Err(ServerError::MissingCarriageReturn);
        }

        let (version, explicit_0_9) = Version::from_bytes(&slice[..8])?;
        if explicit_0_9 {
            self.request.explicit_0_9 = true;
            return Err(ServerError::UnsupportedVersion);
        }

        self.request.version = version;
        self.request.keep_alive = matches!(version, Version::Http11);

        Ok(())
    }

    fn is_http09_candidate(&self) -> bool {
        self.legacy.is_some_and(|l| l.enabled)
            && self.request.method == Method::Get
            && self.parser.buffer[..self.parser.len].ends_with(b"\r\n")
    }

    fn parse_http09_target(&mut self) -> Result<[usize; 2], ServerError> {
        let parser = &mut self.parser;
        let end_url = parser.len.saturating_sub(2);
        if parser.position >= end_url {
            return Err(ServerError::MalformedStartLine);
        }

        self.request.version = Version::Http09;
        self.request.keep_alive = false;

        let parser = &mut self.parser;
        Ok([parser.position + 1, end_url - parser.position])
    }

    fn check_http09(&mut self) -> Result<bool, ServerError> {
        if self.request.version != Version::Http09 {
            return Ok(false);
        }
        if !self.legacy.is_some_and(|l| l.enabled) {
            return Err(ServerError::UnsupportedVersion);
        }
        let p = &self.parser;
        match p.buffer[p.position..p.len].ends_with(b"\r\n") {
            true => Ok(true),
            false => Err(ServerError::MissingCarriageReturn),
        }
    }

    // --- headers ---

    fn parse_headers(&mut self) -> Result<(), ServerError> {
        loop {
            let Some((name, value)) = self.parse_header()? else {
                return Ok(());
            };
            self.accumulate_structured_header(&name, &value)?;
            self.request.headers.push(name, value);
        }
    }

    fn parse_header(&mut self) -> Result<Option<(String, String)>, ServerError> {
        let parser = &mut self.parser;
        let end = parser
            .find_char(self.req_limits.request_buffer_size, b'\n')
            .ok_or(ServerError::MalformedStartLine)?;

        match parser.get_slice(parser.position + end - 1, 2) {
            Some([b'\r', b'\n']) => {}
            Some([_, b'\n']) => return Err(ServerError::MissingCarriageReturn),
            _ => return Err(ServerError::MalformedStartLine),
        }

        let Some(split) = parser.find_char(end, b':') else {
            self.check_end_of_headers(end)?;
            return Ok(None);
        };

        if parser.get_slice(parser.position + split, 2) != Some(b": ") {
            return Err(ServerError::MalformedStartLine);
        }

        let value_start = split + 2;
        let len_value = end - value_start - 1; // trailing \r

        let name = {
            let name = parser
                .get_slice_mut(parser.position, split)
                .ok_or(ServerError::MalformedStartLine)?;
            if name.is_empty() {
                return Err(ServerError::MalformedStartLine);
            }
            types::to_lower_case(name);
            types::to_upper_ascii(&String::from_utf8_lossy(name))
        };

        let value = parser
            .get_slice(parser.position + value_start, len_value)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .ok_or(ServerError::MalformedStartLine)?;

        parser.update_position(end);

        Ok(Some((name, value)))
    }

    /// Parses `Content-Length`/`Connection` into dedicated fields and
    /// accumulates `Accept`/`Accept-Encoding`/`Range` into their structured
    /// lists. All of these also stay in the generic header list so CGI
    /// env-var construction can still see the raw value.
    fn accumulate_structured_header(&mut self, name: &str, value: &str) -> Result<(), ServerError> {
        match name {
            "CONTENT-LENGTH" => self.parse_content_length(value)?,
            "CONNECTION" => self.parse_connection(value),
            "ACCEPT" => parse_comma_list(value, &mut self.request.accepted_mimes),
            "ACCEPT-ENCODING" => parse_comma_list(value, &mut self.request.accepted_encodings),
            "RANGE" => parse_range_header(value, &mut self.request.byte_ranges),
            _ => {}
        }
        Ok(())
    }

    fn check_end_of_headers(&mut self, start: usize) -> Result<(), ServerError> {
        let parser = &mut self.parser;
        let p_end = parser
            .get_slice((parser.position + start).saturating_sub(3), 4)
            .ok_or(ServerError::MalformedStartLine)?;

        if !p_end.ends_with(b"\r\n\r\n") {
            return Err(ServerError::MissingCarriageReturn);
        }

        parser.position += 2;
        Ok(())
    }

    /// An oversized `Content-Length` flags [`Request::content_too_large`]
    /// rather than aborting — the connection stays framed and the response
    /// path answers `413` after draining the declared body (§4.1.d).
    fn parse_content_length(&mut self, value: &str) -> Result<(), ServerError> {
        let len = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ServerError::InvalidContentLength)?;
        if len > self.req_limits.max_request_body {
            self.request.content_too_large = true;
        }
        self.request.headers.content_length = Some(len);
        Ok(())
    }

    /// Unrecognized `Connection` values are ignored rather than treated as a
    /// framing error — only `keep-alive`/`close` change the default.
    fn parse_connection(&mut self, value: &str) {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep-alive" => self.request.keep_alive = true,
            "close" => self.request.keep_alive = false,
            _ => {}
        }
    }

    // --- body ---

    /// Captures whatever body bytes already landed in the header-phase
    /// buffer. A short capture isn't an error: [`Request::body_remaining`]
    /// tells the connection loop how many more bytes to read directly off
    /// the socket and hand to [`Request::append_body`].
    fn check_body(&mut self) -> Result<(), ServerError> {
        let parser = &self.parser;
        let available = parser.len.saturating_sub(parser.position);

        if let Some(len) = self.request.headers.content_length {
            let take = available.min(len);
            if take > 0 {
                if let Some(slice) = parser.get_slice(parser.position, take) {
                    self.request.body = Some(slice.to_vec());
                }
            }
        }

        Ok(())
    }
}

/// Normalizes backslashes to `/` and collapses repeated `/` (§4.1.a) — done
/// once on the decoded path, matching the original resolver's behavior of
/// treating `\` and doubled separators as equivalent to a single `/`.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    out
}

/// Splits a comma-separated header value (`Accept`, `Accept-Encoding`),
/// trims each item, drops any `;`-prefixed parameters, and appends distinct
/// non-empty tokens in order.
fn parse_comma_list(value: &str, into: &mut Vec<String>) {
    for item in value.split(',') {
        let item = item.split(';').next().unwrap_or("").trim();
        if !item.is_empty() && !into.iter().any(|existing| existing == item) {
            into.push(item.to_string());
        }
    }
}

/// Parses a `Range: bytes=...` header, appending `(start, end)` pairs to
/// `ranges`. Any malformed spec — missing `bytes=` unit, a segment without
/// exactly one `-`, both bounds empty, or a non-numeric bound — clears
/// whatever had accumulated and stops: a broken `Range` header is treated as
/// absent, not as a request-ending error (§4.5).
fn parse_range_header(value: &str, ranges: &mut Vec<(Option<u64>, Option<u64>)>) {
    let trimmed = value.trim();
    let Some(eq_pos) = trimmed.find('=') else {
        ranges.clear();
        return;
    };
    let (unit, spec) = trimmed.split_at(eq_pos);
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        ranges.clear();
        return;
    }

    for part in spec[1..].split(',') {
        let part = part.trim();
        let Some(dash_pos) = part.find('-') else {
            ranges.clear();
            return;
        };
        if part[dash_pos + 1..].contains('-') {
            ranges.clear();
            return;
        }

        let (start_s, end_s) = (part[..dash_pos].trim(), part[dash_pos + 1..].trim());
        if start_s.is_empty() && end_s.is_empty() {
            ranges.clear();
            return;
        }

        let start = match start_s.is_empty() {
            true => None,
            false => match start_s.parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    ranges.clear();
                    return;
                }
            },
        };
        let end = match end_s.is_empty() {
            true => None,
            false => match end_s.parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    ranges.clear();
                    return;
                }
            },
        };

        ranges.push((start, end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader<'a>(
        parser: &'a mut Parser,
        request: &'a mut Request,
        req_limits: &'a ReqLimits,
        legacy: Option<&'a LegacyLimits>,
    ) -> RequestReader<'a> {
        RequestReader {
            parser,
            request,
            req_limits,
            legacy,
        }
    }

    fn parse_str(src: &str, legacy: Option<LegacyLimits>) -> Result<Request, ServerError> {
        let limits = ReqLimits::default();
        let mut parser = Parser::from(&limits, src);
        let mut request = Request::new();
        {
            let mut r = reader(&mut parser, &mut request, &limits, legacy.as_ref());
            r.parse()?;
        }
        Ok(request)
    }

    #[test]
    fn parses_simple_get() {
        let req = parse_str("GET / HTTP/1.1\r\nHost: example.com\r\n\r\n", None).unwrap();
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.url().path(), "/");
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(req.header("host"), Some("example.com"));
        assert!(req.keep_alive());
    }

    #[test]
    fn parses_path_segments_and_query() {
        let req = parse_str("GET /api/users/123?sort=name HTTP/1.1\r\n\r\n", None).unwrap();
        assert_eq!(req.url().path(), "/api/users/123");
        assert_eq!(req.url().path_segments(), ["api", "users", "123"]);
        assert_eq!(req.url().query("sort"), Some("name"));
    }

    #[test]
    fn collapses_doubled_slashes_and_backslashes() {
        let req = parse_str("GET //a\\\\b HTTP/1.1\r\n\r\n", None).unwrap();
        assert_eq!(req.url().path(), "/a/b");
    }

    #[test]
    fn connection_close_overrides_default_keep_alive() {
        let req = parse_str("GET / HTTP/1.1\r\nConnection: close\r\n\r\n", None).unwrap();
        assert!(!req.keep_alive());
    }

    #[test]
    fn unrecognized_connection_value_is_ignored() {
        let req = parse_str("GET / HTTP/1.1\r\nConnection: Upgrade\r\n\r\n", None).unwrap();
        assert!(req.keep_alive());
    }

    #[test]
    fn http_10_defaults_to_close() {
        let req = parse_str("GET / HTTP/1.0\r\n\r\n", None).unwrap();
        assert!(!req.keep_alive());
    }

    #[test]
    fn rejects_explicit_0_9_token() {
        let err = parse_str("GET / HTTP/0.9\r\n\r\n", None).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedVersion));
    }

    #[test]
    fn bare_newline_is_missing_carriage_return() {
        let err = parse_str("GET / HTTP/1.1\nHost: x\n\n", None).unwrap_err();
        assert!(matches!(err, ServerError::MissingCarriageReturn));
    }

    #[test]
    fn implicit_http09_requires_legacy_enabled() {
        let without_legacy = parse_str("GET /file\r\n", None);
        assert!(without_legacy.is_err());

        let with_legacy = parse_str("GET /file\r\n", Some(LegacyLimits { enabled: true })).unwrap();
        assert_eq!(with_legacy.version(), Version::Http09);
        assert_eq!(with_legacy.url().path(), "/file");
    }

    #[test]
    fn partial_body_is_captured_and_remainder_reported() {
        let req = parse_str("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort", None).unwrap();
        assert_eq!(req.body(), Some(b"short".as_ref()));
        assert_eq!(req.body_remaining(), 5);
    }

    #[test]
    fn body_matches_content_length() {
        let req = parse_str(
            "POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
            None,
        )
        .unwrap();
        assert_eq!(req.body(), Some(b"hello".as_ref()));
        assert_eq!(req.body_remaining(), 0);
    }

    #[test]
    fn oversized_content_length_flags_rather_than_errors() {
        let limits = ReqLimits { max_request_body: 4, ..ReqLimits::default() };
        let mut parser = Parser::from(&limits, "POST / HTTP/1.1\r\nContent-Length: 100\r\n\r\nhi");
        let mut request = Request::new();
        {
            let mut r = reader(&mut parser, &mut request, &limits, None);
            r.parse().unwrap();
        }
        assert!(request.content_too_large());
    }

    #[test]
    fn unknown_method_is_tagged() {
        let req = parse_str("TRACE / HTTP/1.1\r\n\r\n", None).unwrap();
        assert_eq!(req.method(), Method::Unknown);
    }

    #[test]
    fn accept_and_accept_encoding_drop_parameters() {
        let req = parse_str(
            "GET / HTTP/1.1\r\nAccept: text/html;q=0.9, application/json\r\nAccept-Encoding: gzip, br;q=1.0\r\n\r\n",
            None,
        )
        .unwrap();
        assert_eq!(req.accepted_mimes(), ["text/html", "application/json"]);
        assert_eq!(req.accepted_encodings(), ["gzip", "br"]);
    }

    #[test]
    fn range_header_parses_open_and_closed_intervals() {
        let req = parse_str("GET / HTTP/1.1\r\nRange: bytes=0-499,600-,-200\r\n\r\n", None).unwrap();
        assert_eq!(
            req.byte_ranges(),
            [(Some(0), Some(499)), (Some(600), None), (None, Some(200))]
        );
    }

    #[test]
    fn malformed_range_header_is_dropped_not_fatal() {
        let req = parse_str("GET / HTTP/1.1\r\nRange: bytes=abc-def\r\n\r\n", None).unwrap();
        assert!(req.byte_ranges().is_empty());
    }
}
