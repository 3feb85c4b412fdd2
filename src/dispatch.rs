//! Version-dispatched request -> response pipeline (§4.3).
//!
//! Grounded on `http/version/handler_1_1.cpp`, `handler_1_0.cpp`, and
//! `handler_0_9.cpp`: all three walk a path-resolution-then-method-switch
//! pipeline, but HTTP/1.1 additionally runs a method/400/access/redirect
//! prelude that HTTP/1.0 shares in reduced form and HTTP/0.9 skips
//! entirely (the original's 0.9 handler resolves straight to the file and
//! switches on GET/other, nothing else). This module keeps that shape as
//! one version-parameterized `gen_response` plus a dedicated HTTP/0.9
//! reduction, instead of three near-duplicate handler files.

use crate::cgi::{self, CgiTarget};
use crate::config::Config;
use crate::errors::ServerError;
use crate::http::body::BodyStream;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::types::{Method, StatusCode, Version};
use crate::listing;
use crate::resolve::{self, Resolved};
use httpdate::parse_http_date;

const ALLOWED_STATIC_METHODS: &str = "GET, HEAD, OPTIONS";
const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS, POST, PUT, PATCH, DELETE";

/// Builds the response for one parsed request. Never panics, never
/// returns an `Err`: every failure path is already a status code by the
/// time this returns.
pub(crate) async fn gen_response(request: &Request, config: &Config) -> Response {
    let mut response = Response::new(request.version());
    response.keep_alive(request.keep_alive() && config.conn_limits.keep_alive_enabled);

    if request.version() != Version::Http11 && !config.legacy.enabled {
        response.status(StatusCode::HttpVersionNotSupported);
        return response;
    }

    match request.version() {
        Version::Http09 => gen_response_09(request, config, &mut response).await,
        Version::Http10 => gen_response_10(request, config, &mut response).await,
        Version::Http11 => gen_response_11(request, config, &mut response).await,
    }

    response
}

/// Sets `status` and, when the client accepts `text/html`, loads the
/// templated error document as the body (`setStatusMaybeErrorDoc` in the
/// original handlers).
fn set_status_maybe_error_doc(request: &Request, response: &mut Response, status: StatusCode) {
    response.status(status);
    if request.accepted_mimes().is_empty() || request.accepted_mimes().iter().any(|m| m == "text/html" || m == "*/*") {
        let doc = listing::error_document(status.as_u16(), status.reason_phrase());
        response.header("Content-Type", "text/html").set_body(BodyStream::memory(doc.into_bytes()));
    }
}

/// Returns the first 403 raised by a `Match` whose pattern and header
/// conditions both fire against this request, walking `config.matches` in
/// declared order (§4.3 step 3).
fn check_access(request: &Request, config: &Config) -> Option<StatusCode> {
    let path = request.url().path();
    for m in &config.matches {
        if !m.matches(path) || !m.conditions_satisfied(|name| request.header(name).map(str::to_string)) {
            continue;
        }
        if let Some(access) = m.access() {
            if !access.is_allowed(request.ip()) {
                return Some(StatusCode::Forbidden);
            }
        }
    }
    None
}

/// Applies per-`Match` header injection for every rule whose pattern and
/// header conditions fire against `path`.
fn apply_match_headers(request: &Request, config: &Config, response: &mut Response, path: &str) {
    for m in &config.matches {
        if !m.matches(path) || !m.conditions_satisfied(|name| request.header(name).map(str::to_string)) {
            continue;
        }
        for (name, value) in m.headers() {
            response.header(name.clone(), value.clone());
        }
    }
}

/// True if some `Match` whose pattern and header conditions fire against
/// `path` turns directory listings on.
fn directory_indexes_allowed(request: &Request, config: &Config, path: &str) -> bool {
    config.matches.iter().any(|m| {
        m.matches(path)
            && m.conditions_satisfied(|name| request.header(name).map(str::to_string))
            && m.show_directory_indexes()
    })
}

/// Finds the first matching `Redirect` rule against the query-stripped
/// decoded path (§4.3 step 5).
fn apply_redirect(request: &Request, config: &Config) -> Option<(String, StatusCode)> {
    let path = request.url().path();
    config.redirects.iter().find_map(|r| r.apply(path))
}

/// HTTP/1.0 may only emit 300-302; anything stronger falls back to 302
/// (`handler_1_0.cpp`'s redirect clamp).
fn clamp_redirect_for_http10(status: StatusCode) -> StatusCode {
    if status.as_u16() > 302 {
        StatusCode::Found
    } else {
        status
    }
}

fn method_allowed(method: Method, version: Version) -> bool {
    match version {
        Version::Http11 => matches!(
            method,
            Method::Get | Method::Head | Method::Options | Method::Post | Method::Put | Method::Patch | Method::Delete
        ),
        Version::Http10 => matches!(method, Method::Get | Method::Head | Method::Post),
        Version::Http09 => method == Method::Get,
    }
}

/// Runs the common HTTP/1.1 + HTTP/1.0 prelude (§4.3 steps 1-6): method
/// check, `bad_400`, access control, content-too-large, redirects, and the
/// literal `..` path-under-root check. Returns the effective request path
/// (after `Rewrite` substitution) once every gate has passed, or `None` if
/// a short-circuiting status was already set on `response`.
fn run_prelude(request: &Request, config: &Config, response: &mut Response) -> Option<String> {
    if !method_allowed(request.method(), request.version()) {
        set_status_maybe_error_doc(request, response, StatusCode::NotImplemented);
        return None;
    }

    if request.bad_400() {
        set_status_maybe_error_doc(request, response, StatusCode::BadRequest);
        return None;
    }

    if let Some(status) = check_access(request, config) {
        set_status_maybe_error_doc(request, response, status);
        return None;
    }

    if request.content_too_large() {
        set_status_maybe_error_doc(request, response, StatusCode::PayloadTooLarge);
        return None;
    }

    if let Some((location, status)) = apply_redirect(request, config) {
        let status = if request.version() == Version::Http10 { clamp_redirect_for_http10(status) } else { status };
        response.status(status).header("Location", location);
        return None;
    }

    let path = request.url().path();
    if !path.starts_with('/') || path.contains("..") {
        set_status_maybe_error_doc(request, response, StatusCode::BadRequest);
        return None;
    }

    // Rewrite substitutes the effective path used for file resolution; the
    // externally visible URL (used above for Match/Redirect matching and
    // below for directory-listing links) is unchanged (§3, §4.9).
    let effective_path = config
        .rewrites
        .iter()
        .find_map(|r| r.apply(path))
        .unwrap_or_else(|| path.to_string());

    Some(effective_path)
}

async fn gen_response_11(request: &Request, config: &Config, response: &mut Response) {
    let is_options_star = request.method() == Method::Options && request.url().raw_target() == "*";

    if is_options_star {
        // `OPTIONS *` bypasses the method/access/redirect prelude entirely
        // and never touches the filesystem (§4.3).
        response.header("Allow", ALLOWED_METHODS).status(StatusCode::NoContent).suppress_body();
        return;
    }

    let Some(effective_path) = run_prelude(request, config, response) else { return };

    let resolved = match resolve::resolve(&config.document_root, &effective_path, &config.index_files, &config.mimes) {
        Ok(r) => r,
        Err(err) => return handle_resolve_error(request, response, err),
    };

    if resolved.is_directory {
        return serve_directory(request, config, response, &resolved);
    }

    if request.method() == Method::Options {
        response.header("Allow", ALLOWED_STATIC_METHODS).status(StatusCode::NoContent).suppress_body();
        return;
    }

    if config.enable_php_cgi && resolved.path.extension().and_then(|e| e.to_str()) == Some("php") {
        return serve_php(request, config, response, &resolved).await;
    }

    match request.method() {
        Method::Get | Method::Head => serve_static_file(request, config, response, &resolved),
        _ => {
            response.header("Allow", ALLOWED_STATIC_METHODS);
            set_status_maybe_error_doc(request, response, StatusCode::MethodNotAllowed);
        }
    }

    negotiate_response_compression(request, config, response);
}

async fn gen_response_10(request: &Request, config: &Config, response: &mut Response) {
    let Some(effective_path) = run_prelude(request, config, response) else { return };

    let resolved = match resolve::resolve(&config.document_root, &effective_path, &config.index_files, &config.mimes) {
        Ok(r) => r,
        Err(err) => return handle_resolve_error(request, response, err),
    };

    if resolved.is_directory {
        return serve_directory(request, config, response, &resolved);
    }

    match request.method() {
        Method::Get | Method::Head => serve_static_file(request, config, response, &resolved),
        _ => {
            response.header("Allow", "GET, HEAD");
            set_status_maybe_error_doc(request, response, StatusCode::MethodNotAllowed);
        }
    }

    negotiate_response_compression(request, config, response);
}

/// HTTP/0.9's pipeline: no method/400/access/redirect prelude at all, just
/// path resolution straight into a GET/other method switch
/// (`handler_0_9.cpp`). A 0.9 response carries no status line or headers,
/// so `set_status_maybe_error_doc` still loads an error body (the original
/// does the same) even though it will never be seen as a status code on
/// the wire.
async fn gen_response_09(request: &Request, config: &Config, response: &mut Response) {
    let path = request.url().path();
    if !path.starts_with('/') || path.contains("..") {
        set_status_maybe_error_doc(request, response, StatusCode::BadRequest);
        return;
    }

    let resolved = match resolve::resolve(&config.document_root, path, &config.index_files, &config.mimes) {
        Ok(r) => r,
        Err(err) => return handle_resolve_error(request, response, err),
    };

    if resolved.is_directory {
        return serve_directory(request, config, response, &resolved);
    }

    match request.method() {
        Method::Get => serve_static_file(request, config, response, &resolved),
        _ => set_status_maybe_error_doc(request, response, StatusCode::MethodNotAllowed),
    }
}

/// Maps a [`resolve::resolve`] failure onto a status (§4.3 step 7). A
/// canonicalized escape outside the document root is reported as 404, not
/// 400: the literal-`..` case is already rejected earlier with 400, so
/// reaching here means the *resolved* path landed outside the root by some
/// other route (e.g. a symlink-adjacent rename race) — treated the same as
/// any other path that doesn't exist, per the resolved-path invariant
/// (§8, see `DESIGN.md`'s Open Question decisions).
fn handle_resolve_error(request: &Request, response: &mut Response, err: ServerError) {
    let status = match err {
        ServerError::DisallowedPath | ServerError::NotFound => StatusCode::NotFound,
        ServerError::LinkRejected => StatusCode::Forbidden,
        _ => StatusCode::InternalServerError,
    };
    set_status_maybe_error_doc(request, response, status);
}

fn serve_directory(request: &Request, config: &Config, response: &mut Response, resolved: &Resolved) {
    let request_path = request.url().path();
    let show_index = directory_indexes_allowed(request, config, request_path);
    if !show_index {
        set_status_maybe_error_doc(request, response, StatusCode::Forbidden);
        return;
    }

    let display_path = if request_path.ends_with('/') { request_path.to_string() } else { format!("{request_path}/") };
    match listing::directory_listing(&resolved.path, &display_path) {
        Ok(html) => {
            response
                .status(StatusCode::Ok)
                .header("Content-Type", "text/html")
                .set_body(BodyStream::memory(html.into_bytes()));
        }
        Err(_) => set_status_maybe_error_doc(request, response, StatusCode::InternalServerError),
    }
}

/// GET/HEAD against a resolved static file: MIME negotiation,
/// `If-Modified-Since`, body load, per-Match headers, and Range (§4.3
/// "GET/HEAD").
fn serve_static_file(request: &Request, config: &Config, response: &mut Response, resolved: &Resolved) {
    if !mime_accepted(request, &resolved.mime) {
        set_status_maybe_error_doc(request, response, StatusCode::NotAcceptable);
        return;
    }

    if let Some(since) = request.header("IF-MODIFIED-SINCE") {
        if let Some(file_mtime) = file_modified_time(&resolved.path) {
            if let Ok(client_time) = parse_http_date(since) {
                if file_mtime <= client_time {
                    response.status(StatusCode::NotModified).suppress_body();
                    return;
                }
            }
        }
    }

    let metadata = match std::fs::metadata(&resolved.path) {
        Ok(m) => m,
        Err(_) => {
            set_status_maybe_error_doc(request, response, StatusCode::InternalServerError);
            return;
        }
    };

    let mut body = BodyStream::file(resolved.path.clone(), metadata.len(), false);
    if !request.byte_ranges().is_empty() && !body.apply_ranges(request.byte_ranges()) {
        set_status_maybe_error_doc(request, response, StatusCode::RangeNotSatisfiable);
        return;
    }

    response.status(StatusCode::Ok);
    if metadata.len() > 0 {
        response.header("Content-Type", resolved.mime.clone());
    }
    if request.method() == Method::Head {
        response.suppress_body();
    }
    apply_match_headers(request, config, response, request.url().path());
    response.set_body(body);
}

/// `Accept: text/*` is treated literally, not as a glob — only `*/*` (or no
/// `Accept` header at all) is a wildcard (§4.2, §8).
fn mime_accepted(request: &Request, mime: &str) -> bool {
    let accepted = request.accepted_mimes();
    accepted.is_empty() || accepted.iter().any(|m| m == "*/*" || m == mime)
}

fn file_modified_time(path: &std::path::Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

async fn serve_php(request: &Request, config: &Config, response: &mut Response, resolved: &Resolved) {
    let target = CgiTarget {
        script_path: &resolved.path,
        document_root: &config.document_root,
        port: if request.uses_tls() { config.tls_port } else { config.port },
    };

    match cgi::run(&config.php_cgi_path, target, request).await {
        Ok((reply, stderr)) => {
            if !stderr.is_empty() {
                tracing::error!(target: "mercury::error", script = %resolved.path.display(), "{}", String::from_utf8_lossy(&stderr));
            }
            response.status(reply.status);
            for (name, value) in reply.headers {
                response.header(name, value);
            }
            apply_match_headers(request, config, response, request.url().path());
            if request.method() != Method::Head {
                response.set_body(BodyStream::memory(reply.body));
            }
        }
        Err(err) => {
            tracing::error!(target: "mercury::error", error = %err, script = %resolved.path.display(), "CGI spawn failed");
            let status = err.status_code().unwrap_or(StatusCode::BadGateway);
            set_status_maybe_error_doc(request, response, status);
        }
    }
}

/// Compression is the last step, and is skipped for already-suppressed
/// bodies (HEAD/304/OPTIONS/etc. have no content to compress). `br` is
/// only offered to a client speaking TLS (§4.2's preference order).
fn negotiate_response_compression(request: &Request, config: &Config, response: &mut Response) {
    let accepted: Vec<String> = if request.uses_tls() {
        request.accepted_encodings().to_vec()
    } else {
        request
            .accepted_encodings()
            .iter()
            .filter(|e| e.as_str() != "br")
            .cloned()
            .collect()
    };
    response.negotiate_compression(&accepted, config.server_limits.min_response_compression_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{Access, AccessMode};
    use crate::config::mime;
    use crate::http::request::Parser;
    use crate::limits::ReqLimits;
    use crate::rules::Match;
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;

    fn test_config(document_root: PathBuf) -> Config {
        Config {
            document_root,
            bind_ipv4: Some(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))),
            bind_ipv6: None,
            port: 8080,
            legacy: crate::limits::LegacyLimits { enabled: true },
            enable_php_cgi: false,
            php_cgi_path: "php-cgi".to_string(),
            redact_log_ips: false,
            index_files: vec!["index.html".to_string()],
            server_limits: crate::limits::ServerLimits::default(),
            conn_limits: crate::limits::ConnLimits { keep_alive_enabled: true, ..Default::default() },
            req_limits: crate::limits::ReqLimits::default(),
            resp_limits: crate::limits::RespLimits::default(),
            access_log_file: PathBuf::from("/tmp/access.log"),
            error_log_file: PathBuf::from("/tmp/error.log"),
            use_tls: false,
            tls_port: 0,
            tls_cert_path: None,
            tls_key_path: None,
            matches: Vec::new(),
            redirects: Vec::new(),
            rewrites: Vec::new(),
            mimes: mime::load(std::path::Path::new("/nonexistent")).unwrap_or_default(),
        }
    }

    fn parse_request_sync(raw: &str) -> Request {
        let limits = ReqLimits::default();
        let mut parser = Parser::from(&limits, raw);
        let mut request = Request::new();
        request.set_peer(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), false);
        let legacy = crate::limits::LegacyLimits { enabled: true };
        let mut reader =
            crate::http::request::RequestReader { parser: &mut parser, request: &mut request, req_limits: &limits, legacy: Some(&legacy) };
        reader.parse().unwrap();
        request
    }

    async fn parse_request(raw: &str) -> Request {
        parse_request_sync(raw)
    }

    #[tokio::test]
    async fn static_get_serves_file_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hi\n").unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());

        let request = parse_request("GET /index.html HTTP/1.1\r\nHost: x\r\nAccept: text/html\r\n\r\n").await;
        let mut response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::Ok);
        let mut out = Vec::new();
        response.write(&mut out, 4096).await.unwrap();
        assert!(String::from_utf8_lossy(&out).ends_with("hi\n"));
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("GET /nope.html HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn literal_dotdot_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("GET /../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn access_denied_match_returns_403() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("admin")).unwrap();
        std::fs::write(dir.path().join("admin/secret.html"), "s").unwrap();
        let mut config = test_config(dir.path().canonicalize().unwrap());
        let access = Access::new(AccessMode::DenyFirst, vec!["10.0.0.0/8".parse().unwrap()]);
        config.matches = vec![Match::compile("^/admin/.*$", vec![], false, Some(access), vec![]).unwrap()];

        let request = parse_request("GET /admin/secret.html HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let mut request = request;
        request.set_peer(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), false);
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn options_star_returns_204_with_full_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("OPTIONS * HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::NoContent);
    }

    #[tokio::test]
    async fn http10_redirect_status_clamps_to_302() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().canonicalize().unwrap());
        config.redirects = vec![crate::rules::Redirect::compile("^/old$", "/new", 308).unwrap()];
        let request = parse_request("GET /old HTTP/1.0\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::Found);
    }

    #[tokio::test]
    async fn legacy_disabled_rejects_http10_with_505() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().canonicalize().unwrap());
        config.legacy.enabled = false;
        let request = parse_request("GET / HTTP/1.0\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::HttpVersionNotSupported);
    }

    #[tokio::test]
    async fn directory_without_show_index_is_403() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("GET /empty HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::Forbidden);
    }

    #[tokio::test]
    async fn directory_with_show_index_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pub")).unwrap();
        std::fs::write(dir.path().join("pub/a.txt"), "x").unwrap();
        let mut config = test_config(dir.path().canonicalize().unwrap());
        config.matches = vec![Match::compile("^/pub/?$", vec![], true, None, vec![]).unwrap()];
        let request = parse_request("GET /pub HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn unaccepted_mime_is_406() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "x").unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("GET /a.html HTTP/1.1\r\nHost: x\r\nAccept: application/json\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::NotAcceptable);
    }

    #[tokio::test]
    async fn other_method_on_static_file_is_405() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "x").unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("DELETE /a.html HTTP/1.1\r\nHost: x\r\n\r\n").await;
        let response = gen_response(&request, &config).await;
        assert_eq!(response.status_code(), StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn http09_serves_plain_body_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "plain").unwrap();
        let config = test_config(dir.path().canonicalize().unwrap());
        let request = parse_request("GET /a.txt\r\n").await;
        let mut response = gen_response(&request, &config).await;
        let mut out = Vec::new();
        response.write(&mut out, 4096).await.unwrap();
        assert_eq!(out, b"plain");
    }
}
