//! Access and error logging (§7).
//!
//! Grounded on `logs/logger.cpp`/`logger.hpp`'s split between an access log
//! (one line per request) and an error log (everything else), each written
//! off the request-handling path through its own queue. `tracing-appender`'s
//! `non_blocking` writer is the ecosystem's version of that same queue, fed
//! by two `tracing_subscriber` layers routed on event target — `mercury::access`
//! for the former, everything else for the latter — following the
//! `tracing_subscriber::fmt().with_env_filter(...).try_init()` pattern
//! already used for stdout logging elsewhere in the retrieved corpus, just
//! split into two file-backed layers instead of one stdout layer.

use crate::{
    config::Config,
    errors::{IoError, ServerError},
    http::request::Request,
    http::types::StatusCode,
};
use std::{fs::OpenOptions, net::IpAddr, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry};

/// Holds the background flush threads for both log files alive for the
/// process's lifetime; dropping it stops the writers.
pub struct LogGuards {
    _access: WorkerGuard,
    _error: WorkerGuard,
}

/// Installs the global `tracing` subscriber, routing `mercury::access`
/// events to `AccessLogFile` and everything else to `ErrorLogFile`.
pub fn init(config: &Config) -> Result<LogGuards, ServerError> {
    let access_file = open_log_file(&config.access_log_file)?;
    let error_file = open_log_file(&config.error_log_file)?;

    let (access_writer, access_guard) = tracing_appender::non_blocking(access_file);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_file);

    let access_layer = fmt::layer()
        .with_target(false)
        .with_writer(access_writer)
        .with_filter(filter_fn(|meta| meta.target() == "mercury::access"));

    let error_layer = fmt::layer()
        .with_writer(error_writer)
        .with_filter(filter_fn(|meta| meta.target() != "mercury::access"));

    Registry::default()
        .with(access_layer)
        .with(error_layer)
        .try_init()
        .map_err(|e| ServerError::ConfigParse(format!("failed to install logger: {e}")))?;

    Ok(LogGuards { _access: access_guard, _error: error_guard })
}

fn open_log_file(path: &Path) -> Result<std::fs::File, ServerError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ServerError::LogFileOpen(IoError(e)))
}

/// Emits one access-log line per completed request (§7).
pub(crate) fn access(request: &Request, status: StatusCode, config: &Config) {
    let ip = redact_ip(request.ip(), config.redact_log_ips);
    tracing::info!(
        target: "mercury::access",
        ip = %ip,
        method = request.method().as_str(),
        path = %request.url().raw_target(),
        version = request.version().as_str(),
        status = status.as_u16(),
        "request handled",
    );
}

/// Emits one error-log line for a failure that doesn't map to an access-log
/// entry (bind failures, body-read timeouts, CGI spawn failures, ...).
pub(crate) fn error(message: &str, ip: Option<IpAddr>, config: &Config) {
    match ip {
        Some(ip) => {
            let ip = redact_ip(ip, config.redact_log_ips);
            tracing::error!(target: "mercury::error", %ip, "{message}");
        }
        None => tracing::error!(target: "mercury::error", "{message}"),
    }
}

/// Collapses an IP to a fixed placeholder when `RedactLogIPs` is on, rather
/// than merely masking octets — the original target audience is privacy
/// compliance, not coarse geolocation.
fn redact_ip(ip: IpAddr, redact: bool) -> String {
    if !redact {
        return ip.to_string();
    }
    match ip {
        IpAddr::V4(_) => "x.x.x.x".to_string(),
        IpAddr::V6(_) => "::".to_string(),
    }
}
