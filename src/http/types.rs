#![allow(rustdoc::bare_urls)]

//! Core HTTP protocol types: methods, versions, status codes, and the
//! parsed URL/header representations shared by the request parser and the
//! response builder.

use crate::errors::ServerError;

// TO LOWER CASE

#[rustfmt::skip]
const ASCII_TABLE: [u8; 256] = [
    //   x0    x1    x2    x3    x4    x5    x6    x7    x8    x9    xA    xB    xC    xD    xE    xF
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, // 0x
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, // 1x
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, // 2x
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, // 3x
    0x40, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 4x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, // 5x
    0x60, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 6x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // 7x
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F, // 8x
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F, // 9x
    0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, // Ax
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, // Bx
    0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF, // Cx
    0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF, // Dx
    0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF, // Ex
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF, // Fx
];

#[inline(always)]
pub(crate) fn to_lower_case(src: &mut [u8]) {
    for byte in src.iter_mut() {
        *byte = ASCII_TABLE[*byte as usize];
    }
}

#[inline(always)]
pub(crate) fn to_upper_ascii(src: &str) -> String {
    src.chars().map(|c| c.to_ascii_uppercase()).collect()
}

/// Canonicalizes a header name for the wire: the first letter and every
/// letter following a `-` is upper-cased, everything else lower-cased
/// (`content-type` / `CONTENT-TYPE` -> `Content-Type`). Request-side parsing
/// stores names upper-cased for cheap comparison; this is only needed when
/// writing a response.
pub(crate) fn canonical_header_name(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut start_of_word = true;
    for c in src.chars() {
        if c == '-' {
            start_of_word = true;
            out.push(c);
            continue;
        }
        if start_of_word {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start_of_word = false;
    }
    out
}

// METHOD

/// HTTP request methods.
///
/// # References
///
/// - [RFC 7231, Section 4](https://datatracker.ietf.org/doc/html/rfc7231#section-4)
/// - [RFC 5789](https://datatracker.ietf.org/doc/html/rfc5789) (PATCH method)
///
/// # Disabled methods
///
/// `TRACE` and `CONNECT` are not modeled as distinct variants; any token the
/// parser doesn't recognize (including those two) becomes [`Method::Unknown`]
/// and is rejected with `501` by the version handlers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Head,
    Patch,
    Delete,
    Options,
    Unknown,
}

impl Method {
    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<(Self, usize), ServerError> {
        match src {
            [b'G', b'E', b'T', b' ', ..] => Ok((Method::Get, 4)),
            [b'P', b'U', b'T', b' ', ..] => Ok((Method::Put, 4)),
            [b'P', b'O', b'S', b'T', b' ', ..] => Ok((Method::Post, 5)),
            [b'H', b'E', b'A', b'D', b' ', ..] => Ok((Method::Head, 5)),
            [b'P', b'A', b'T', b'C', b'H', b' ', ..] => Ok((Method::Patch, 6)),
            [b'D', b'E', b'L', b'E', b'T', b'E', b' ', ..] => Ok((Method::Delete, 7)),
            [b'O', b'P', b'T', b'I', b'O', b'N', b'S', b' ', ..] => Ok((Method::Options, 8)),
            _ => {
                // An unrecognized token is still a syntactically valid method per
                // RFC 7230's `token` production; find its extent so the caller
                // can keep parsing the rest of the line instead of aborting.
                let end = src.iter().position(|&b| b == b' ').ok_or(ServerError::MalformedStartLine)?;
                Ok((Method::Unknown, end + 1))
            }
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Unknown => "UNKNOWN",
        }
    }
}

// VERSION

/// HTTP protocol version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// HTTP/0.9 — the original line-only protocol: `METHOD SP PATH CRLF`
    /// with a bare response body, no status line, no headers.
    Http09,
    /// HTTP/1.0 — [RFC 1945](https://tools.ietf.org/html/rfc1945).
    Http10,
    /// HTTP/1.1 — [RFC 7230](https://tools.ietf.org/html/rfc7230) and related.
    Http11,
}

impl Version {
    /// Parses the version token of a request's start line.
    ///
    /// Returns `(version, explicit_0_9)`. `explicit_0_9` is set when the
    /// client spelled out the literal token `HTTP/0.9` — the design treats
    /// that as a protocol violation (§4.2), not an actual HTTP/0.9 request;
    /// a genuine HTTP/0.9 request omits the version token entirely and is
    /// recognized by the caller counting only two space-separated fields.
    #[inline(always)]
    pub(crate) fn from_bytes(src: &[u8]) -> Result<(Self, bool), ServerError> {
        match src {
            b"HTTP/1.1" => Ok((Self::Http11, false)),
            b"HTTP/1.0" => Ok((Self::Http10, false)),
            b"HTTP/0.9" => Ok((Self::Http09, true)),
            _ => Err(ServerError::UnsupportedVersion),
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Version::Http09 => "HTTP/0.9",
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes emitted by the response builder.
        ///
        /// Represents the subset of [RFC 9110](https://tools.ietf.org/html/rfc9110#section-15)
        /// status codes Mercury actually produces (§6).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            $name = $num,
        )+ }

        impl StatusCode {
            /// Returns the HTTP status line as bytes (e.g., `b"HTTP/1.1 200 OK\r\n"`).
            /// HTTP/0.9 has no status line; callers must not invoke this for it.
            #[inline]
            pub(crate) const fn into_first_line(&self, version: Version) -> &'static [u8] {
                match (self, version) { $(
                    (StatusCode::$name, Version::Http11) => {
                        concat!("HTTP/1.1 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http10) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http09) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                )+ }
            }

            #[inline]
            pub(crate) const fn as_u16(&self) -> u16 {
                match self { $(
                    StatusCode::$name => $num,
                )+ }
            }

            #[inline]
            pub(crate) const fn reason_phrase(&self) -> &'static str {
                match self { $(
                    StatusCode::$name => $str,
                )+ }
            }
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    Ok = (200, "OK");
    /// [[RFC9110, Section 15.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.2)]
    Created = (201, "Created");
    /// [[RFC9110, Section 15.3.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.5)]
    NoContent = (204, "No Content");
    /// [[RFC9110, Section 15.3.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.7)]
    PartialContent = (206, "Partial Content");

    /// [[RFC9110, Section 15.4.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.2)]
    MultipleChoices = (300, "Multiple Choices");
    /// [[RFC9110, Section 15.4.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.2)]
    MovedPermanently = (301, "Moved Permanently");
    /// [[RFC9110, Section 15.4.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.3)]
    Found = (302, "Found");
    /// [[RFC9110, Section 15.4.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.4)]
    SeeOther = (303, "See Other");
    /// [[RFC9110, Section 15.4.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.5)]
    NotModified = (304, "Not Modified");
    /// [[RFC9110, Section 15.4.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.7)]
    TemporaryRedirect = (307, "Temporary Redirect");
    /// [[RFC9110, Section 15.4.8](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.8)]
    PermanentRedirect = (308, "Permanent Redirect");

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BadRequest = (400, "Bad Request");
    /// [[RFC9110, Section 15.5.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.4)]
    Forbidden = (403, "Forbidden");
    /// [[RFC9110, Section 15.5.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.5)]
    NotFound = (404, "Not Found");
    /// [[RFC9110, Section 15.5.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.6)]
    MethodNotAllowed = (405, "Method Not Allowed");
    /// [[RFC9110, Section 15.5.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.7)]
    NotAcceptable = (406, "Not Acceptable");
    /// [[RFC9110, Section 15.5.14](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.14)]
    PayloadTooLarge = (413, "Payload Too Large");
    /// [[RFC9110, Section 15.5.15](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.15)]
    UriTooLong = (414, "URI Too Long");
    /// [[RFC9110, Section 15.5.17](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.17)]
    RangeNotSatisfiable = (416, "Range Not Satisfiable");
    /// [[RFC6585, Section 6](https://datatracker.ietf.org/doc/html/rfc6585#section-6)]
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    InternalServerError = (500, "Internal Server Error");
    /// [[RFC9110, Section 15.6.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.2)]
    NotImplemented = (501, "Not Implemented");
    /// [[RFC9110, Section 15.6.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.3)]
    BadGateway = (502, "Bad Gateway");
    /// [[RFC9110, Section 15.6.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.6)]
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
    /// [[RFC9110, Section 15.6.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.4)]
    ServiceUnavailable = (503, "Service Unavailable");
}

// COMPRESS METHOD

/// Negotiated `Content-Encoding`, chosen from the request's `Accept-Encoding`
/// list against what the compressor module supports (§4.4).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CompressMethod {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl CompressMethod {
    /// Matches the token as it appears in `Accept-Encoding`/`Content-Encoding`.
    pub(crate) fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "zstd" => Some(Self::Zstd),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
            Self::Zstd => "zstd",
        }
    }
}

// URL

/// A parsed, percent-decoded URL.
///
/// Unlike the zero-copy `&'static [u8]` slices this type's teacher-lineage
/// ancestor used, `Url` owns its data: Mercury's paths are percent-decoded,
/// rewritten by `Rewrite` rules, and joined against the document root, none
/// of which can stay a borrow of the original socket buffer.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Url {
    /// Raw target exactly as sent on the wire (path + query, undecoded).
    pub(crate) raw_target: String,
    /// Percent-decoded path, with backslashes normalized to `/`, query
    /// string stripped.
    pub(crate) decoded_path: String,
    pub(crate) parts: Vec<String>,
    pub(crate) query: Option<String>,
    pub(crate) query_parts: Vec<(String, String)>,
}

impl Url {
    pub(crate) fn empty() -> Self {
        Self {
            raw_target: String::new(),
            decoded_path: String::new(),
            parts: Vec::new(),
            query: None,
            query_parts: Vec::new(),
        }
    }
}

impl Url {
    /// Raw request target, undecoded (path + query string).
    #[inline(always)]
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// Percent-decoded path, without the query string.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.decoded_path
    }

    #[inline(always)]
    pub fn path_segment(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    #[inline(always)]
    pub fn path_segments(&self) -> &[String] {
        self.parts.as_slice()
    }

    #[inline(always)]
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.decoded_path.ends_with(suffix)
    }

    /// Full query string including the leading `?`, if present.
    #[inline(always)]
    pub fn query_full(&self) -> Option<&str> {
        self.query.as_deref()
    }

    #[inline(always)]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_parts
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// HEADER MAP

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct HeaderMap {
    pub(crate) headers: Vec<Header>,
    pub(crate) content_length: Option<usize>,
}

impl HeaderMap {
    #[inline(always)]
    pub(crate) fn new() -> Self {
        Self {
            headers: Vec::new(),
            content_length: None,
        }
    }

    /// Header names are stored upper-cased (§4.2); callers must uppercase
    /// their lookup key too.
    #[inline(always)]
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, name: String, value: String) {
        self.headers.push(Header { name, value });
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(crate) struct Header {
    pub(crate) name: String,
    pub(crate) value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_from_bytes() {
        assert_eq!(Method::from_bytes(b"GET / HTTP/1.1").unwrap().0, Method::Get);
        assert_eq!(Method::from_bytes(b"DELETE / HTTP/1.1").unwrap().0, Method::Delete);
        assert_eq!(Method::from_bytes(b"TRACE / HTTP/1.1").unwrap().0, Method::Unknown);
    }

    #[test]
    fn version_rejects_explicit_09() {
        let (version, explicit) = Version::from_bytes(b"HTTP/0.9").unwrap();
        assert_eq!(version, Version::Http09);
        assert!(explicit);
    }

    #[test]
    fn version_parses_1_0_and_1_1() {
        assert_eq!(Version::from_bytes(b"HTTP/1.0").unwrap(), (Version::Http10, false));
        assert_eq!(Version::from_bytes(b"HTTP/1.1").unwrap(), (Version::Http11, false));
    }

    #[test]
    fn header_map_lookup_is_uppercase_keyed() {
        let mut map = HeaderMap::new();
        map.push("HOST".into(), "example.com".into());
        assert_eq!(map.get("HOST"), Some("example.com"));
        assert_eq!(map.get("host"), None);
    }

    #[test]
    fn canonical_header_name_cases_each_word() {
        assert_eq!(canonical_header_name("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("ETAG"), "Etag");
        assert_eq!(canonical_header_name("WWW-AUTHENTICATE"), "Www-Authenticate");
    }
}
