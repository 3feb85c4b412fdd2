//! URL query string parser.
//!
//! Scans with the same single-pass `memchr` technique as the original
//! zero-copy parser, but returns owned, percent-decoded pairs: Mercury's
//! `Url` (see [`crate::http::types`]) is itself owned, and query values flow
//! into CGI environment variables and `Match` header conditions where a
//! borrow of the request buffer can't live long enough.

use memchr::memchr;

pub(crate) struct Query;

impl Query {
    /// Parses a URL query string into ordered key/value pairs.
    ///
    /// Handles an optional leading `?` so `?a=1` and `a=1` are equivalent.
    /// A key or value with no `=` is treated as present with an empty value.
    ///
    /// ```ignore
    /// let params = Query::parse("debug&name=&=Qwe&key=sda&&");
    /// assert_eq!(params.len(), 5);
    /// assert_eq!(params[0], ("debug".into(), "".into()));
    /// assert_eq!(params[2], ("".into(), "Qwe".into()));
    /// ```
    pub(crate) fn parse(query: &str) -> Vec<(String, String)> {
        let data = query.strip_prefix('?').unwrap_or(query).as_bytes();
        let mut result = Vec::new();

        let mut start = 0;
        while start < data.len() {
            let end = memchr(b'&', &data[start..])
                .map(|pos| start + pos)
                .unwrap_or(data.len());

            let index = memchr(b'=', &data[start..end]).unwrap_or(end - start);
            let split_index = start + index;

            let key = &data[start..split_index];
            let value = match split_index < end {
                true => &data[split_index + 1..end],
                false => &[],
            };

            result.push((percent_decode(key), percent_decode(value)));
            start = end + 1;
        }

        result
    }
}

/// Percent-decodes a byte slice, treating `+` as a literal space per
/// `application/x-www-form-urlencoded`. Malformed escapes (`%` not followed
/// by two hex digits) pass through unchanged rather than erroring — query
/// parameters are advisory input, not protocol framing.
pub(crate) fn percent_decode(src: &[u8]) -> String {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < src.len() => {
                match (hex_val(src[i + 1]), hex_val(src[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(src[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[inline(always)]
fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        for line in ["a=1&b=2", "?a=1&b=2"] {
            let params = Query::parse(line);
            assert_eq!(params.len(), 2);
            assert_eq!(params[0], ("a".to_string(), "1".to_string()));
            assert_eq!(params[1], ("b".to_string(), "2".to_string()));
        }
    }

    #[test]
    fn full() {
        let params = Query::parse("flag&empty=&=val&&key=value");
        assert_eq!(params.len(), 5);
        assert_eq!(params[0], ("flag".to_string(), "".to_string()));
        assert_eq!(params[1], ("empty".to_string(), "".to_string()));
        assert_eq!(params[2], ("".to_string(), "val".to_string()));
        assert_eq!(params[3], ("".to_string(), "".to_string()));
        assert_eq!(params[4], ("key".to_string(), "value".to_string()));
    }

    #[test]
    fn percent_and_plus_decoding() {
        let params = Query::parse("name=John%20Doe&tag=a%2Bb&space=a+b");
        assert_eq!(params[0], ("name".to_string(), "John Doe".to_string()));
        assert_eq!(params[1], ("tag".to_string(), "a+b".to_string()));
        assert_eq!(params[2], ("space".to_string(), "a b".to_string()));
    }

    #[test]
    fn malformed_escape_passes_through() {
        let params = Query::parse("a=100%25%2z");
        assert_eq!(params[0].1, "100%%2z");
    }
}
