//! Listener socket setup with retry (§5.1).
//!
//! Grounded on `http/server.cpp`'s `bindSocket()` and
//! `http/server-ipv6.cpp`'s `ServerV6::bindSocket()`: set `SO_REUSEADDR`
//! (plus `SO_REUSEPORT` on unix and `IPV6_V6ONLY` for a v6 address) before
//! binding, and retry a handful of times rather than failing the whole
//! process over one transient bind error. Errno 13 gets its own log line —
//! it almost always means an unprivileged process tried a port below 1024.

use crate::errors::{IoError, ServerError};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

const BIND_ATTEMPTS: u32 = 3;
const BIND_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Binds and starts listening on `addr`, retrying on failure.
pub(crate) async fn bind(addr: SocketAddr, backlog: u16) -> Result<TcpListener, ServerError> {
    let mut last_err = None;

    for attempt in 1..=BIND_ATTEMPTS {
        match bind_once(addr, backlog) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                if e.raw_os_error() == Some(13) {
                    tracing::error!(target: "mercury::error", %addr, "permission denied binding socket, do you have sudo perms?");
                } else {
                    tracing::error!(target: "mercury::error", %addr, attempt, error = %e, "failed to bind socket, retrying");
                }
                last_err = Some(e);
                if attempt < BIND_ATTEMPTS {
                    tokio::time::sleep(BIND_RETRY_DELAY).await;
                }
            }
        }
    }

    Err(ServerError::Io(IoError(last_err.expect("at least one bind attempt runs"))))
}

fn bind_once(addr: SocketAddr, backlog: u16) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;

    TcpListener::from_std(socket.into())
}
