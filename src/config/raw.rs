//! Deserialization shape for the `<Mercury>` XML configuration document.
//!
//! Every field is kept as a string (or a small string-bearing struct) here;
//! [`crate::config`] does the actual integer parsing, bounds checking, and
//! path canonicalization, matching the original config loader's two-phase
//! "deserialize then validate" structure in `conf.cpp`.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename = "Mercury")]
pub(crate) struct RawConfig {
    #[serde(rename = "DocumentRoot")]
    pub(crate) document_root: String,

    #[serde(rename = "BindIPv4", default)]
    pub(crate) bind_ipv4: Option<String>,
    #[serde(rename = "BindIPv6", default)]
    pub(crate) bind_ipv6: Option<String>,

    #[serde(rename = "Port")]
    pub(crate) port: String,

    #[serde(rename = "EnableLegacyHTTPVersions")]
    pub(crate) enable_legacy_http: String,
    #[serde(rename = "EnablePHPCGI")]
    pub(crate) enable_php_cgi: String,
    #[serde(rename = "PHPCGIPath", default)]
    pub(crate) php_cgi_path: Option<String>,
    #[serde(rename = "KeepAlive")]
    pub(crate) keep_alive: String,
    #[serde(rename = "RedactLogIPs", default)]
    pub(crate) redact_log_ips: Option<String>,

    #[serde(rename = "IndexFiles")]
    pub(crate) index_files: String,

    #[serde(rename = "MaxRequestBacklog")]
    pub(crate) max_request_backlog: String,
    #[serde(rename = "RequestBufferSize")]
    pub(crate) request_buffer_size: String,
    #[serde(rename = "ResponseBufferSize")]
    pub(crate) response_buffer_size: String,
    #[serde(rename = "MaxRequestBody")]
    pub(crate) max_request_body: String,
    #[serde(rename = "MaxResponseBody")]
    pub(crate) max_response_body: String,
    #[serde(rename = "IdleThreadsPerChild")]
    pub(crate) idle_threads_per_child: String,
    #[serde(rename = "MaxThreadsPerChild")]
    pub(crate) max_threads_per_child: String,
    #[serde(rename = "KeepAliveMaxTimeout")]
    pub(crate) keep_alive_max_timeout: String,
    #[serde(rename = "KeepAliveMaxRequests")]
    pub(crate) keep_alive_max_requests: String,
    #[serde(rename = "MinResponseCompressionSize")]
    pub(crate) min_response_compression_size: String,

    #[serde(rename = "AccessLogFile")]
    pub(crate) access_log_file: String,
    #[serde(rename = "ErrorLogFile")]
    pub(crate) error_log_file: String,

    #[serde(rename = "TLSPort")]
    pub(crate) tls_port: String,
    #[serde(rename = "TLSCertPath", default)]
    pub(crate) tls_cert_path: Option<String>,
    #[serde(rename = "TLSKeyPath", default)]
    pub(crate) tls_key_path: Option<String>,

    #[serde(rename = "Match", default)]
    pub(crate) matches: Vec<RawMatch>,
    #[serde(rename = "Redirect", default)]
    pub(crate) redirects: Vec<RawRedirect>,
    #[serde(rename = "Rewrite", default)]
    pub(crate) rewrites: Vec<RawRewrite>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAccess {
    #[serde(rename = "@mode")]
    pub(crate) mode: String,
    #[serde(rename = "IP", default)]
    pub(crate) exceptions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMatch {
    #[serde(rename = "@pattern")]
    pub(crate) pattern: String,
    #[serde(rename = "@showDirectoryIndexes", default)]
    pub(crate) show_directory_indexes: Option<String>,
    #[serde(rename = "Header", default)]
    pub(crate) headers: Vec<RawHeader>,
    #[serde(rename = "Access", default)]
    pub(crate) access: Option<RawAccess>,
    #[serde(rename = "HeaderCondition", default)]
    pub(crate) header_conditions: Vec<RawHeaderCondition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHeader {
    #[serde(rename = "@name")]
    pub(crate) name: String,
    #[serde(rename = "$text", default)]
    pub(crate) value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawHeaderCondition {
    #[serde(rename = "@type")]
    pub(crate) kind: String,
    #[serde(rename = "@name")]
    pub(crate) name: String,
    #[serde(rename = "@pattern", default)]
    pub(crate) pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRedirect {
    #[serde(rename = "@pattern")]
    pub(crate) pattern: String,
    #[serde(rename = "@to")]
    pub(crate) to: String,
    #[serde(rename = "@status")]
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRewrite {
    #[serde(rename = "@pattern")]
    pub(crate) pattern: String,
    #[serde(rename = "@to")]
    pub(crate) to: String,
}
