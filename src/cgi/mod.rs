//! CGI/1.1 bridge to a PHP interpreter (§4.7).
//!
//! Grounded on `http/cgi/process.cpp`'s `loadEnvBlock`/`handlePHPRequest`:
//! build the CGI/1.1 environment map, spawn the interpreter with three
//! piped streams, write the request body, then split the reply on the
//! first blank line into headers and body.

use crate::errors::ServerError;
use crate::http::request::Request;
use crate::http::types::StatusCode;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// What `gen_response` needs to know about the file a `.php` request
/// resolved to, independent of [`crate::resolve::Resolved`] so the CGI
/// bridge doesn't have to know about MIME lookup or directory handling.
pub(crate) struct CgiTarget<'a> {
    pub(crate) script_path: &'a std::path::Path,
    pub(crate) document_root: &'a std::path::Path,
    pub(crate) port: u16,
}

/// The parsed CGI reply: status, headers (already trimmed, case preserved
/// as the script sent them), and body bytes.
pub(crate) struct CgiResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

/// Runs `php_binary` against `target` with a CGI/1.1 environment built from
/// `request`, writes the request body to its stdin, and parses its stdout
/// into a [`CgiResponse`]. Stderr is read to completion and discarded into
/// the caller-provided sink only for logging — never concatenated into the
/// response body (see `DESIGN.md`'s Open Question decisions).
pub(crate) async fn run(
    php_binary: &str,
    target: CgiTarget<'_>,
    request: &Request,
) -> Result<(CgiResponse, Vec<u8>), ServerError> {
    let env = build_env(target, request);

    // `env_clear` must run before `envs`: a `Command`'s env map is built up
    // by each builder call in sequence, so clearing after populating it
    // would wipe out the CGI variables just set.
    let mut child = Command::new(php_binary)
        .env_clear()
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ServerError::CgiSpawnFailure(crate::errors::IoError(e)))?;

    let mut stdin = child.stdin.take().expect("piped stdin");
    if let Some(body) = request.body() {
        stdin.write_all(body).await.map_err(ServerError::from)?;
    }
    drop(stdin);

    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let mut out = Vec::new();
    let mut err = Vec::new();
    stdout.read_to_end(&mut out).await.map_err(ServerError::from)?;
    stderr.read_to_end(&mut err).await.map_err(ServerError::from)?;

    child.wait().await.map_err(ServerError::from)?;

    Ok((parse_reply(&out), err))
}

/// Splits the CGI reply on the first `\r\n\r\n` or `\n\n`, parses the header
/// block into `Status`/generic headers, and infers Content-Type when the
/// script didn't set one.
fn parse_reply(raw: &[u8]) -> CgiResponse {
    let split = find_header_end(raw);
    let Some((header_end, body_start)) = split else {
        return match raw.is_empty() {
            true => CgiResponse { status: StatusCode::NoContent, headers: Vec::new(), body: Vec::new() },
            false => {
                let body = raw.to_vec();
                let mut headers = Vec::new();
                if !body.is_empty() {
                    headers.push(("Content-Type".to_string(), infer_content_type(&body)));
                }
                CgiResponse { status: StatusCode::Ok, headers, body }
            }
        };
    };

    let header_block = String::from_utf8_lossy(&raw[..header_end]);
    let body = raw[body_start..].to_vec();

    let mut status = StatusCode::Ok;
    let mut headers = Vec::new();
    let mut has_content_type = false;

    for line in header_block.split('\n') {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.find(':') else { continue };
        let key = line[..colon].trim();
        let value = line[colon + 1..].trim();

        if key.eq_ignore_ascii_case("status") {
            if let Ok(code) = value.split_whitespace().next().unwrap_or("").parse::<u16>() {
                status = status_from_u16(code);
            }
            continue;
        }
        if key.eq_ignore_ascii_case("content-type") {
            has_content_type = true;
        }
        headers.push((key.to_string(), value.to_string()));
    }

    if body.is_empty() {
        status = StatusCode::NoContent;
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
    } else if !has_content_type {
        headers.push(("Content-Type".to_string(), infer_content_type(&body)));
    }

    CgiResponse { status, headers, body }
}

fn find_header_end(raw: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    raw.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, pos + 2))
}

/// Maps an arbitrary CGI-reported status number onto the subset Mercury
/// knows how to serialize; anything outside that subset falls back to 200
/// rather than fail the whole response over an unusual script status.
fn status_from_u16(code: u16) -> StatusCode {
    match code {
        200 => StatusCode::Ok,
        201 => StatusCode::Created,
        204 => StatusCode::NoContent,
        206 => StatusCode::PartialContent,
        300 => StatusCode::MultipleChoices,
        301 => StatusCode::MovedPermanently,
        302 => StatusCode::Found,
        303 => StatusCode::SeeOther,
        304 => StatusCode::NotModified,
        307 => StatusCode::TemporaryRedirect,
        308 => StatusCode::PermanentRedirect,
        400 => StatusCode::BadRequest,
        403 => StatusCode::Forbidden,
        404 => StatusCode::NotFound,
        405 => StatusCode::MethodNotAllowed,
        406 => StatusCode::NotAcceptable,
        413 => StatusCode::PayloadTooLarge,
        414 => StatusCode::UriTooLong,
        416 => StatusCode::RangeNotSatisfiable,
        431 => StatusCode::RequestHeaderFieldsTooLarge,
        500 => StatusCode::InternalServerError,
        501 => StatusCode::NotImplemented,
        502 => StatusCode::BadGateway,
        505 => StatusCode::HttpVersionNotSupported,
        _ => StatusCode::Ok,
    }
}

/// JSON/HTML/plaintext/binary sniff per §4.7: leading `{`/`[` is JSON,
/// leading `<` is HTML, mostly-ASCII is plaintext, else an opaque blob.
fn infer_content_type(body: &[u8]) -> String {
    match body.first() {
        Some(b'{') | Some(b'[') => "application/json".to_string(),
        Some(b'<') => "text/html; charset=utf-8".to_string(),
        _ if is_mostly_ascii(body) => "text/plain; charset=utf-8".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

fn is_mostly_ascii(body: &[u8]) -> bool {
    let sample = &body[..body.len().min(512)];
    if sample.is_empty() {
        return true;
    }
    let printable = sample
        .iter()
        .filter(|&&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..0x7f).contains(&b))
        .count();
    printable * 100 / sample.len() >= 90
}

fn build_env(target: CgiTarget<'_>, request: &Request) -> Vec<(String, String)> {
    let mut env = Vec::new();
    let mut push = |k: &str, v: String| env.push((k.to_string(), v));

    let (auth_type, remote_user) = match request.header("AUTHORIZATION") {
        Some(header) => match header.split_once(' ') {
            Some((scheme, rest)) => (scheme.to_string(), rest.to_string()),
            None => (header.to_string(), String::new()),
        },
        None => (String::new(), String::new()),
    };
    push("AUTH_TYPE", auth_type);
    push("REMOTE_USER", remote_user);

    push("GATEWAY_INTERFACE", "CGI/1.1".to_string());
    push("PATH_INFO", String::new());
    push("PATH_TRANSLATED", String::new());
    push("QUERY_STRING", request.url().query_full().map(|q| q.trim_start_matches('?').to_string()).unwrap_or_default());

    push("REMOTE_ADDR", request.ip().to_string());
    push("REMOTE_HOST", request.ip().to_string());
    push("REMOTE_IDENT", String::new());

    let method = if request.method() == crate::http::types::Method::Head {
        "GET".to_string()
    } else {
        request.method().as_str().to_string()
    };
    push("REQUEST_METHOD", method);
    push("REQUEST_URI", request.url().raw_target().to_string());

    push("SCRIPT_FILENAME", target.script_path.to_string_lossy().into_owned());
    push("SCRIPT_NAME", request.url().path().to_string());

    push("SERVER_NAME", request.header("HOST").unwrap_or_default().to_string());
    push("SERVER_PORT", target.port.to_string());
    push("SERVER_PROTOCOL", request.version().as_str().to_string());
    push("SERVER_SOFTWARE", crate::http::response::SERVER_SOFTWARE.to_string());

    push("HTTPS", if request.uses_tls() { "1".to_string() } else { String::new() });
    push("REDIRECT_STATUS", "200".to_string());
    push("DOCUMENT_ROOT", target.document_root.to_string_lossy().into_owned());

    if let Some(len) = request.content_length() {
        if len > 0 {
            push("CONTENT_LENGTH", len.to_string());
            if let Some(ct) = request.header("CONTENT-TYPE") {
                push("CONTENT_TYPE", ct.to_string());
            }
        }
    }

    for header in request.headers() {
        let key = header.name.replace('-', "_");
        if matches!(key.as_str(), "AUTHORIZATION" | "CONTENT_LENGTH" | "CONTENT_TYPE") {
            continue;
        }
        push(&format!("HTTP_{key}"), header.value.clone());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_headers_from_cgi_reply() {
        let raw = b"Status: 201\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}";
        let resp = parse_reply(raw);
        assert_eq!(resp.status, StatusCode::Created);
        assert_eq!(resp.body, b"{\"ok\":true}");
        assert!(resp.headers.iter().any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn empty_body_becomes_204_and_drops_content_type() {
        let raw = b"Content-Type: text/html\r\n\r\n";
        let resp = parse_reply(raw);
        assert_eq!(resp.status, StatusCode::NoContent);
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn missing_content_type_is_inferred_from_body() {
        let raw = b"\r\n\r\n{\"a\":1}";
        let resp = parse_reply(raw);
        assert_eq!(resp.status, StatusCode::Ok);
        assert!(resp.headers.iter().any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn no_blank_line_falls_back_to_raw_body_with_inference() {
        let raw = b"<html>hi</html>";
        let resp = parse_reply(raw);
        assert_eq!(resp.status, StatusCode::Ok);
        assert_eq!(resp.body, raw);
        assert!(resp.headers.iter().any(|(k, v)| k == "Content-Type" && v == "text/html; charset=utf-8"));
    }

    #[test]
    fn status_outside_known_subset_falls_back_to_200() {
        let raw = b"Status: 999\r\n\r\nok";
        let resp = parse_reply(raw);
        assert_eq!(resp.status, StatusCode::Ok);
    }
}
