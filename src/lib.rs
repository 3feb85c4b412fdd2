//! Mercury — a standalone, multi-protocol-version HTTP origin server.
//!
//! Serves static files and PHP CGI scripts straight off the filesystem from
//! a declarative XML configuration: no reverse proxy, no embeddable handler
//! API, just `<Mercury>` config in, sockets served out. Supports HTTP/0.9,
//! HTTP/1.0, and HTTP/1.1 on the same listener set, with optional TLS
//! termination, access control, redirects and rewrites, directory listings,
//! conditional caching, content negotiation, streaming compression, and
//! byte-range responses.
//!
//! # Layout
//!
//! - [`config`] loads and validates the `<Mercury>` XML document into the
//!   immutable, `Arc`-shared [`config::Config`] every worker reads from.
//! - [`http`] holds the wire-level pieces: request/response types,
//!   [`http::body::BodyStream`], and the compressors in [`http::compress`].
//! - [`access`] and [`rules`] implement CIDR-based allow/deny lists and the
//!   `Match`/`Redirect`/`Rewrite` rule pipeline.
//! - [`resolve`] maps a decoded request path to a file or directory under a
//!   virtual host's document root.
//! - [`cgi`] bridges to PHP via the CGI/1.1 process protocol.
//! - [`listing`] renders directory listings and templated error documents.
//! - [`server`] is the listener + worker-pool + per-connection loop that
//!   ties everything above into a running service.
//! - [`log`] and [`cli`] are the ambient operational surface: structured
//!   access/error logging and the interactive operator console.

pub(crate) mod http {
    pub(crate) mod body;
    pub(crate) mod compress;
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod listener;
    pub(crate) mod server_impl;
}
pub(crate) mod access;
pub(crate) mod cgi;
pub(crate) mod cli;
pub(crate) mod config;
pub(crate) mod dispatch;
pub(crate) mod errors;
pub(crate) mod limits;
pub(crate) mod listing;
pub(crate) mod log;
pub(crate) mod rules;
pub(crate) mod resolve;

pub(crate) use crate::http::{
    request::Request,
    types::{Method, StatusCode, Url, Version},
};

// Re-exported for `main.rs`, which lives in this crate's `[[bin]]` target
// and therefore only sees `pub` items, same as any external caller would.
pub use crate::{
    cli::run as run_cli,
    config::Config,
    log::{init as init_logging, LogGuards},
    server::server_impl::{Control, Handle, Mercury},
};

#[doc(hidden)]
#[cfg(test)]
pub(crate) mod tools {
    use std::str::from_utf8;

    #[inline]
    pub(crate) fn str(value: Option<&[u8]>) -> Option<&str> {
        Some(from_utf8(value?).unwrap())
    }

    #[inline]
    pub(crate) fn str_op(value: &[u8]) -> &str {
        from_utf8(value).unwrap()
    }
}
