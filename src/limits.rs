//! Server policy limits and timeouts.
//!
//! # Security-first defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Memory overflows
//! - Slowloris-style stalling
//! - Header flooding
//!
//! Every field here corresponds one-to-one with a child node of the `Mercury`
//! XML configuration document; see [`crate::config`] for the loader that
//! turns the document into these structs.

use std::time::Duration;

/// Worker-pool admission and overload behavior.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue if full? | =====> [ Sending 503 ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [---------]   Yes   /--------------------------\   No   [------]
/// [ Worker  ] <====== | Is there a free worker?  | =====> [ Wait ]
/// [---------]         \--------------------------/        [------]
/// ```
///
/// Workers are long-lived tokio tasks spawned once at startup (one per slot
/// between `idle_threads_per_child` and `max_threads_per_child`); they poll a
/// shared queue fed by each listener's accept loop.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Pending-connection backlog passed to `listen()` (`MaxRequestBacklog`, default: `1024`).
    pub max_request_backlog: u16,

    /// Minimum number of workers kept running per listener family (`IdleThreadsPerChild`, default: `4`).
    pub idle_threads_per_child: usize,

    /// Maximum number of workers a listener family may grow to (`MaxThreadsPerChild`, default: `64`).
    pub max_threads_per_child: usize,

    /// Strategy used by idle workers waiting on the admission queue (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,

    /// Bodies smaller than this are never compressed (`MinResponseCompressionSize`, default: `860 B`).
    ///
    /// Matches the rough TCP-segment break-even point below which compression
    /// overhead outweighs the bandwidth saved.
    pub min_response_compression_size: usize,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_request_backlog: 1024,
            idle_threads_per_child: 4,
            max_threads_per_child: 64,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            min_response_compression_size: 860,
        }
    }
}

/// Strategy for worker task waiting when the admission queue is empty.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin via [`tokio::task::yield_now()`]. Keeps latency lowest but pins a
    /// scheduler thread near 100% CPU; only sensible on a dedicated core.
    Yield,

    /// Back off via [`tokio::time::sleep()`] for the given duration.
    Sleep(Duration),
}

/// Per-connection timeouts and keep-alive accounting.
///
/// Mirrors `KeepAlive`/`KeepAliveMaxTimeout`/`KeepAliveMaxRequests` from the
/// config document.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum idle time waiting for the next request on a kept-alive
    /// connection (`KeepAliveMaxTimeout`, default: `5 seconds`).
    ///
    /// A poll that times out, or reports a hang-up, closes the connection
    /// silently — this is the primary defense against slowloris-style
    /// connection exhaustion.
    pub keep_alive_max_timeout: Duration,

    /// Maximum duration to wait for a single socket write (default: `5 seconds`).
    pub socket_write_timeout: Duration,

    /// Maximum number of requests served on one connection before the server
    /// forces `Connection: close` (`KeepAliveMaxRequests`, default: `100`).
    pub keep_alive_max_requests: usize,

    /// Whether keep-alive is offered at all (`KeepAlive`, default: `true`).
    ///
    /// When `false`, every response carries `Connection: close` regardless of
    /// what the client requested.
    pub keep_alive_enabled: bool,
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            keep_alive_max_timeout: Duration::from_secs(5),
            socket_write_timeout: Duration::from_secs(5),
            keep_alive_max_requests: 100,
            keep_alive_enabled: true,
        }
    }
}

/// Request parsing and body limits (`RequestBufferSize`/`MaxRequestBody`).
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum bytes read while searching for the end of the request headers
    /// (`RequestBufferSize`, default: `8 KiB`). Exceeding this before
    /// `\r\n\r\n` is seen yields `431 Request Header Fields Too Large`.
    pub request_buffer_size: usize,

    /// Maximum request body size accepted before `content_too_large` is set
    /// on the request (`MaxRequestBody`, default: `2 MiB`).
    pub max_request_body: usize,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            request_buffer_size: 8 * 1024,
            max_request_body: 2 * 1024 * 1024,
        }
    }
}

/// Response buffering limits (`ResponseBufferSize`/`MaxResponseBody`).
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial capacity for outgoing buffers and the compressors' internal
    /// intermediate buffer (`ResponseBufferSize`, default: `16 KiB`).
    pub response_buffer_size: usize,

    /// Soft cap on response body size; bodies larger than this are always
    /// streamed rather than buffered whole (`MaxResponseBody`, default: `64 MiB`).
    pub max_response_body: usize,
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            response_buffer_size: 16 * 1024,
            max_response_body: 64 * 1024 * 1024,
        }
    }
}

/// Configuration for the legacy HTTP/0.9 and HTTP/1.0 handlers.
///
/// Absent unless `EnableLegacyHTTPVersions` is `true` in the config; when
/// absent, any HTTP/1.0 or HTTP/0.9 request is rejected with `505`.
#[derive(Debug, Clone, Default)]
pub struct LegacyLimits {
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = ServerLimits::default();
        assert!(s.idle_threads_per_child <= s.max_threads_per_child);
        assert!(s.max_request_backlog > 0);

        let c = ConnLimits::default();
        assert!(c.keep_alive_max_requests > 0);
        assert!(c.keep_alive_enabled);

        let r = ReqLimits::default();
        assert!(r.request_buffer_size < r.max_request_body);
    }
}
