//! Loads and validates the `<Mercury>` XML configuration document into a
//! fully typed, `Arc`-shareable [`Config`].
//!
//! Grounded on `conf.cpp`'s `loadConfig`: deserialize the document shape via
//! [`raw::RawConfig`], then walk every field exactly once, parsing strings
//! into integers/durations/bools/paths and erroring out (`ConfigParse`) the
//! first time one doesn't check out, in the same field order the original
//! loader used.

pub(crate) mod mime;
pub(crate) mod raw;

use crate::access::{Access, AccessMode};
use crate::errors::ServerError;
use crate::limits::{ConnLimits, LegacyLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy};
use crate::rules::{HeaderCondition, Match, Redirect, Rewrite};
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Fully validated server configuration, built once at startup from the XML
/// document and handed out as an `Arc` to every connection task.
pub struct Config {
    pub(crate) document_root: PathBuf,

    pub(crate) bind_ipv4: Option<IpAddr>,
    pub(crate) bind_ipv6: Option<IpAddr>,
    pub(crate) port: u16,

    pub(crate) legacy: LegacyLimits,
    pub(crate) enable_php_cgi: bool,
    pub(crate) php_cgi_path: String,
    pub(crate) redact_log_ips: bool,

    pub(crate) index_files: Vec<String>,

    pub(crate) server_limits: ServerLimits,
    pub(crate) conn_limits: ConnLimits,
    pub(crate) req_limits: ReqLimits,
    pub(crate) resp_limits: RespLimits,

    pub(crate) access_log_file: PathBuf,
    pub(crate) error_log_file: PathBuf,

    pub(crate) use_tls: bool,
    pub(crate) tls_port: u16,
    pub(crate) tls_cert_path: Option<PathBuf>,
    pub(crate) tls_key_path: Option<PathBuf>,

    pub(crate) matches: Vec<Match>,
    pub(crate) redirects: Vec<Redirect>,
    pub(crate) rewrites: Vec<Rewrite>,

    pub(crate) mimes: HashMap<String, String>,
}

impl Config {
    /// Reads `config_path`, parses the XML document, and validates every
    /// field. `mimes_path` points at the plain-text MIME table loaded
    /// separately from the XML document, matching the original's split
    /// between `conf.xml` and a sidecar MIME file.
    pub fn load(config_path: &Path, mimes_path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(config_path)?;
        let raw: raw::RawConfig = quick_xml::de::from_str(&text)?;
        Self::from_raw(raw, mimes_path)
    }

    fn from_raw(raw: raw::RawConfig, mimes_path: &Path) -> Result<Self, ServerError> {
        let document_root = std::fs::canonicalize(&raw.document_root).map_err(|_| {
            ServerError::ConfigParse("invalid DocumentRoot: not a directory".to_string())
        })?;
        if !document_root.is_dir() {
            return Err(ServerError::ConfigParse("DocumentRoot is not a directory".to_string()));
        }

        let bind_ipv4 = parse_bind_address(raw.bind_ipv4.as_deref(), "BindIPv4")?;
        let bind_ipv6 = parse_bind_address(raw.bind_ipv6.as_deref(), "BindIPv6")?;
        if bind_ipv4.is_none() && raw.bind_ipv4.is_none() && bind_ipv6.is_none() && raw.bind_ipv6.is_none() {
            return Err(ServerError::ConfigParse(
                "either BindIPv4 or BindIPv6 must be enabled".to_string(),
            ));
        }

        let enable_legacy_http = parse_on_off(&raw.enable_legacy_http, "EnableLegacyHTTPVersions")?;
        let enable_php_cgi = parse_on_off(&raw.enable_php_cgi, "EnablePHPCGI")?;
        // "php-cgi" resolved from PATH is the original's own non-Windows
        // default (see http/cgi/process.cpp); PHPCGIPath overrides it.
        let php_cgi_path = match &raw.php_cgi_path {
            Some(p) if !p.trim().is_empty() => p.trim().to_string(),
            _ => "php-cgi".to_string(),
        };
        let keep_alive_enabled = parse_on_off(&raw.keep_alive, "KeepAlive")?;
        let redact_log_ips = match &raw.redact_log_ips {
            Some(v) => parse_bool(v, "RedactLogIPs")?,
            None => false,
        };

        let index_files: Vec<String> = raw
            .index_files
            .trim()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for file in &index_files {
            if file.contains('/') || file.contains('\\') {
                return Err(ServerError::ConfigParse("invalid IndexFiles value".to_string()));
            }
        }

        let port = parse_uint(&raw.port, "Port", false)? as u16;
        let max_request_backlog = parse_uint(&raw.max_request_backlog, "MaxRequestBacklog", false)? as u16;
        let request_buffer_size = parse_uint(&raw.request_buffer_size, "RequestBufferSize", false)? as usize;
        let response_buffer_size = parse_uint(&raw.response_buffer_size, "ResponseBufferSize", false)? as usize;
        let max_request_body = parse_uint(&raw.max_request_body, "MaxRequestBody", true)? as usize;
        let max_response_body = parse_uint(&raw.max_response_body, "MaxResponseBody", true)? as usize;
        let idle_threads_per_child = parse_uint(&raw.idle_threads_per_child, "IdleThreadsPerChild", false)? as usize;
        let max_threads_per_child = parse_uint(&raw.max_threads_per_child, "MaxThreadsPerChild", false)? as usize;
        if max_threads_per_child <= idle_threads_per_child {
            return Err(ServerError::ConfigParse(
                "MaxThreadsPerChild must be greater than IdleThreadsPerChild".to_string(),
            ));
        }
        let keep_alive_max_timeout = parse_uint(&raw.keep_alive_max_timeout, "KeepAliveMaxTimeout", false)?;
        let keep_alive_max_requests = parse_uint(&raw.keep_alive_max_requests, "KeepAliveMaxRequests", false)? as usize;
        let min_response_compression_size =
            parse_uint(&raw.min_response_compression_size, "MinResponseCompressionSize", true)? as usize;

        let access_log_file = PathBuf::from(raw.access_log_file.trim());
        let error_log_file = PathBuf::from(raw.error_log_file.trim());
        if access_log_file.as_os_str().is_empty() || error_log_file.as_os_str().is_empty() {
            return Err(ServerError::ConfigParse("invalid log file path".to_string()));
        }

        let matches = raw
            .matches
            .into_iter()
            .map(|m| {
                let headers = m.headers.into_iter().map(|h| (h.name, h.value)).collect();
                let show_directory_indexes = match &m.show_directory_indexes {
                    Some(v) => parse_on_off(v, "Match showDirectoryIndexes")?,
                    None => false,
                };
                let access = m.access.map(parse_access).transpose()?;
                let header_filters = m
                    .header_conditions
                    .into_iter()
                    .map(parse_header_condition)
                    .collect::<Result<Vec<_>, _>>()?;
                Match::compile(&m.pattern, headers, show_directory_indexes, access, header_filters)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let redirects = raw
            .redirects
            .into_iter()
            .map(|r| {
                let status: u16 = r
                    .status
                    .trim()
                    .parse()
                    .map_err(|_| ServerError::ConfigParse(format!("invalid Redirect status {}", r.status)))?;
                Redirect::compile(&r.pattern, &r.to, status)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rewrites = raw
            .rewrites
            .into_iter()
            .map(|r| Rewrite::compile(&r.pattern, &r.to))
            .collect::<Result<Vec<_>, _>>()?;

        let mimes = mime::load(mimes_path)?;

        let tls_port_raw = raw.tls_port.trim();
        let use_tls = tls_port_raw != "off";
        let tls_port = if use_tls {
            tls_port_raw
                .parse::<u16>()
                .map_err(|_| ServerError::ConfigParse("invalid value for TLSPort".to_string()))?
        } else {
            0
        };
        if use_tls && (raw.tls_cert_path.is_none() || raw.tls_key_path.is_none()) {
            return Err(ServerError::ConfigParse(
                "TLSCertPath and TLSKeyPath are required when TLSPort is enabled".to_string(),
            ));
        }

        Ok(Config {
            document_root,
            bind_ipv4,
            bind_ipv6,
            port,
            legacy: LegacyLimits { enabled: enable_legacy_http },
            enable_php_cgi,
            php_cgi_path,
            redact_log_ips,
            index_files,
            server_limits: ServerLimits {
                max_request_backlog,
                idle_threads_per_child,
                max_threads_per_child,
                wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
                min_response_compression_size,
            },
            conn_limits: ConnLimits {
                keep_alive_max_timeout: Duration::from_secs(keep_alive_max_timeout),
                socket_write_timeout: Duration::from_secs(5),
                keep_alive_max_requests,
                keep_alive_enabled,
            },
            req_limits: ReqLimits { request_buffer_size, max_request_body },
            resp_limits: RespLimits { response_buffer_size, max_response_body },
            access_log_file,
            error_log_file,
            use_tls,
            tls_port,
            tls_cert_path: raw.tls_cert_path.map(PathBuf::from),
            tls_key_path: raw.tls_key_path.map(PathBuf::from),
            matches,
            redirects,
            rewrites,
            mimes,
        })
    }
}

/// Parses a per-`Match` `Access` node into an [`Access`] gate.
fn parse_access(raw_access: raw::RawAccess) -> Result<Access, ServerError> {
    let mode = AccessMode::parse(&raw_access.mode)
        .ok_or_else(|| ServerError::ConfigParse(format!("invalid Access mode {}", raw_access.mode)))?;
    let exceptions = raw_access
        .exceptions
        .iter()
        .map(|ip| Access::parse_exception(ip).map_err(|_| ServerError::ConfigParse(format!("invalid Access IP {ip}"))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Access::new(mode, exceptions))
}

/// Parses a `<HeaderCondition type="..." name="..." pattern="..."/>` node.
fn parse_header_condition(raw: raw::RawHeaderCondition) -> Result<HeaderCondition, ServerError> {
    let name = raw.name.to_ascii_uppercase();
    let pattern = |p: Option<String>| -> Result<Regex, ServerError> {
        let p = p.ok_or_else(|| ServerError::ConfigParse("HeaderCondition requires a pattern".to_string()))?;
        Regex::new(&p).map_err(ServerError::from)
    };
    Ok(match raw.kind.trim() {
        "matches" => HeaderCondition::HeaderMatches { name, pattern: pattern(raw.pattern)? },
        "not-matches" => HeaderCondition::HeaderNotMatches { name, pattern: pattern(raw.pattern)? },
        "exists" => HeaderCondition::HeaderExists { name },
        "absent" => HeaderCondition::HeaderAbsent { name },
        other => return Err(ServerError::ConfigParse(format!("invalid HeaderCondition type {other}"))),
    })
}

fn parse_bind_address(raw: Option<&str>, field: &str) -> Result<Option<IpAddr>, ServerError> {
    match raw.map(str::trim) {
        None | Some("off") => Ok(None),
        Some(addr) => IpAddr::from_str(addr)
            .map(Some)
            .map_err(|_| ServerError::ConfigParse(format!("invalid {field} value"))),
    }
}

fn parse_on_off(raw: &str, field: &str) -> Result<bool, ServerError> {
    match raw.trim() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ServerError::ConfigParse(format!("invalid on/off value for {field}"))),
    }
}

fn parse_bool(raw: &str, field: &str) -> Result<bool, ServerError> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ServerError::ConfigParse(format!("invalid boolean value for {field}"))),
    }
}

fn parse_uint(raw: &str, field: &str, allow_zero: bool) -> Result<u64, ServerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(ServerError::ConfigParse(format!("invalid unsigned integer value for {field}")));
    }
    let value: u64 = trimmed
        .parse()
        .map_err(|_| ServerError::ConfigParse(format!("invalid unsigned integer value for {field}")))?;
    if !allow_zero && value == 0 {
        return Err(ServerError::ConfigParse(format!("invalid unsigned integer value for {field}")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(document_root: &str) -> raw::RawConfig {
        raw::RawConfig {
            document_root: document_root.to_string(),
            bind_ipv4: Some("0.0.0.0".to_string()),
            bind_ipv6: None,
            port: "8080".to_string(),
            enable_legacy_http: "on".to_string(),
            enable_php_cgi: "off".to_string(),
            php_cgi_path: None,
            keep_alive: "on".to_string(),
            redact_log_ips: Some("false".to_string()),
            index_files: "index.html, index.htm".to_string(),
            max_request_backlog: "1024".to_string(),
            request_buffer_size: "8192".to_string(),
            response_buffer_size: "16384".to_string(),
            max_request_body: "2097152".to_string(),
            max_response_body: "67108864".to_string(),
            idle_threads_per_child: "4".to_string(),
            max_threads_per_child: "64".to_string(),
            keep_alive_max_timeout: "5".to_string(),
            keep_alive_max_requests: "100".to_string(),
            min_response_compression_size: "860".to_string(),
            access_log_file: "/tmp/access.log".to_string(),
            error_log_file: "/tmp/error.log".to_string(),
            tls_port: "off".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            matches: Vec::new(),
            redirects: Vec::new(),
            rewrites: Vec::new(),
        }
    }

    #[test]
    fn valid_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mimes_path = dir.path().join("mimes.txt");
        std::fs::write(&mimes_path, "html text/html\n").unwrap();

        let cfg = Config::from_raw(sample_raw(dir.path().to_str().unwrap()), &mimes_path).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.index_files, vec!["index.html", "index.htm"]);
        assert!(!cfg.use_tls);
        assert!(cfg.conn_limits.keep_alive_enabled);
    }

    #[test]
    fn index_file_with_slash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mimes_path = dir.path().join("mimes.txt");
        std::fs::write(&mimes_path, "").unwrap();

        let mut raw = sample_raw(dir.path().to_str().unwrap());
        raw.index_files = "a/b".to_string();
        let err = Config::from_raw(raw, &mimes_path).unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse(_)));
    }

    #[test]
    fn max_threads_must_exceed_idle_threads() {
        let dir = tempfile::tempdir().unwrap();
        let mimes_path = dir.path().join("mimes.txt");
        std::fs::write(&mimes_path, "").unwrap();

        let mut raw = sample_raw(dir.path().to_str().unwrap());
        raw.idle_threads_per_child = "64".to_string();
        raw.max_threads_per_child = "64".to_string();
        let err = Config::from_raw(raw, &mimes_path).unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse(_)));
    }

    #[test]
    fn tls_enabled_requires_cert_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let mimes_path = dir.path().join("mimes.txt");
        std::fs::write(&mimes_path, "").unwrap();

        let mut raw = sample_raw(dir.path().to_str().unwrap());
        raw.tls_port = "8443".to_string();
        let err = Config::from_raw(raw, &mimes_path).unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse(_)));
    }
}
