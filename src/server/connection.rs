//! Per-connection request loop: wait for a complete request, parse, read any
//! remaining body off the wire, dispatch, write the response, repeat (§5.2).
//!
//! Grounded on `http/server.cpp`'s `handleReqs()`: poll for `\r\n\r\n` (or,
//! with legacy versions enabled, a single headerless `METHOD /target\r\n`
//! line) before attempting to parse, so a request split across several TCP
//! segments is never mistaken for a malformed one. Once framed, pull any
//! remaining declared body directly off the socket, hand the whole thing to
//! [`dispatch::gen_response`], and decide `Connection: keep-alive`/`close`
//! from the same counters `handleReqs` tracked (`keepAliveReqsLeft`).

use crate::{
    config::Config,
    dispatch,
    errors::ServerError,
    http::body::BodyStream,
    http::request::{Parser, Request, RequestReader},
    http::response::Response,
    http::types::{StatusCode, Version},
    listing, log,
};
use std::{
    net::IpAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};

/// Either side of a plain or TLS-terminated connection behind one type, so
/// the worker pool and this loop never branch on TLS once the handshake (if
/// any) has already completed (§5.1, §5.2).
pub(crate) enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Drives the keep-alive loop for one accepted connection until the client
/// closes it, a framing error forces a close, or the keep-alive budget runs
/// out. Never panics — every error path either writes a best-effort error
/// response or silently drops the socket.
pub(crate) async fn serve(mut stream: Stream, ip: IpAddr, uses_tls: bool, config: Arc<Config>) {
    let mut parser = Parser::new(&config.req_limits);
    let mut request = Request::new();
    request.set_peer(ip, uses_tls);

    let mut requests_served: usize = 0;

    loop {
        request.reset();
        parser.reset();

        match wait_for_request(&mut stream, &mut parser, config.legacy.enabled, config.conn_limits.keep_alive_max_timeout).await {
            Ok(RequestWait::ClosedCleanly) => return,
            Ok(RequestWait::Ready) => {}
            Err(e) => {
                if let Some(status) = e.status_code() {
                    write_parse_error(&mut stream, status, Version::Http11, &config).await;
                }
                return;
            }
        }

        let legacy = config.legacy.enabled.then_some(&config.legacy);
        let parse_result = {
            let mut reader = RequestReader { parser: &mut parser, request: &mut request, req_limits: &config.req_limits, legacy };
            reader.parse()
        };

        if let Err(e) = parse_result {
            if let Some(status) = e.status_code() {
                write_parse_error(&mut stream, status, request.version(), &config).await;
            }
            return;
        }

        if let Err(e) = read_remaining_body(&mut stream, &mut request, &config).await {
            log::error(&format!("body read failed: {e}"), Some(ip), &config);
            return;
        }

        let mut response = dispatch::gen_response(&request, &config).await;
        requests_served += 1;

        if request.content_too_large() || requests_served >= config.conn_limits.keep_alive_max_requests {
            response.keep_alive(false);
        }

        let keep_alive = response.keep_alive_flag();
        if keep_alive {
            response.header(
                "Keep-Alive",
                format!(
                    "timeout={}, max={}",
                    config.conn_limits.keep_alive_max_timeout.as_secs(),
                    config.conn_limits.keep_alive_max_requests
                ),
            );
        }

        log::access(&request, response.status_code(), &config);

        if response.write(&mut stream, config.resp_limits.response_buffer_size).await.is_err() {
            return;
        }

        if !keep_alive {
            return;
        }
    }
}

#[derive(PartialEq)]
enum RequestWait {
    Ready,
    ClosedCleanly,
}

/// Polls `stream` until the parser's buffer holds a complete request frame
/// (a `\r\n\r\n` header terminator, or — with legacy versions enabled — a
/// single headerless request line), mirroring `handleReqs`'s
/// `requestStr.find("\r\n\r\n")` poll loop.
async fn wait_for_request(
    stream: &mut Stream,
    parser: &mut Parser,
    legacy_enabled: bool,
    timeout: std::time::Duration,
) -> Result<RequestWait, ServerError> {
    loop {
        if headers_ready(parser.filled(), legacy_enabled) {
            return Ok(RequestWait::Ready);
        }
        if parser.is_full() {
            return Err(ServerError::HeadersTooLarge);
        }

        match parser.fill_buffer(stream, timeout).await {
            Ok(0) if parser.filled().is_empty() => return Ok(RequestWait::ClosedCleanly),
            Ok(0) => return Err(ServerError::MissingCarriageReturn),
            Ok(_) => continue,
            Err(e) => return Err(ServerError::from(e)),
        }
    }
}

fn headers_ready(buf: &[u8], legacy_enabled: bool) -> bool {
    contains_double_crlf(buf) || (legacy_enabled && is_complete_implicit_09_line(buf))
}

fn contains_double_crlf(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

/// A complete, headerless `METHOD /target\r\n` line: exactly one line, with
/// exactly one space before the terminator. A real `METHOD /target
/// HTTP/x.x\r\n` line has a second space before the version token, so a
/// modern request that simply hasn't had its remaining headers arrive yet is
/// never mistaken for a complete implicit-HTTP/0.9 request (§4.2).
fn is_complete_implicit_09_line(buf: &[u8]) -> bool {
    if !buf.ends_with(b"\r\n") {
        return false;
    }
    let line = &buf[..buf.len() - 2];
    if line.contains(&b'\r') || line.contains(&b'\n') {
        return false;
    }
    line.iter().filter(|&&b| b == b' ').count() == 1
}

/// Reads whatever's still owed against `Content-Length` directly off the
/// socket. A request already flagged [`Request::content_too_large`] is only
/// read up to `MaxRequestBody`; the remainder is never drained, and the
/// caller forces the connection closed afterward rather than try to resync
/// on an unbounded declared length.
async fn read_remaining_body(stream: &mut Stream, request: &mut Request, config: &Config) -> Result<(), ServerError> {
    let cap = config.req_limits.max_request_body;
    let chunk_size = config.req_limits.request_buffer_size.clamp(1, 64 * 1024);
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let remaining = request.body_remaining();
        let already_read = request.body().map_or(0, <[u8]>::len);
        if remaining == 0 || (request.content_too_large() && already_read >= cap) {
            return Ok(());
        }

        let room = cap.saturating_sub(already_read).max(1);
        let want = remaining.min(chunk.len()).min(room);
        let read = tokio::time::timeout(config.conn_limits.keep_alive_max_timeout, stream.read(&mut chunk[..want])).await;
        let n = match read {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ServerError::from(e)),
            Err(_) => return Err(ServerError::from(std::io::Error::new(std::io::ErrorKind::TimedOut, "body read timeout"))),
        };
        if n == 0 {
            return Err(ServerError::from(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-body",
            )));
        }
        request.append_body(&chunk[..n]);
    }
}

/// Writes a best-effort error response for a failure that happened before
/// (or while) parsing the request, so the client gets something other than a
/// silently closed socket whenever the framing error has a mapped status.
async fn write_parse_error(stream: &mut Stream, status: StatusCode, version: Version, config: &Config) {
    let mut response = Response::new(version);
    let doc = listing::error_document(status.as_u16(), status.reason_phrase());
    response
        .status(status)
        .header("Content-Type", "text/html")
        .keep_alive(false)
        .set_body(BodyStream::memory(doc.into_bytes()));
    let _ = response.write(stream, config.resp_limits.response_buffer_size).await;
}
