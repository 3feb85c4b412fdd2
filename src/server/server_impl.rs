//! Process-wide server: binds listeners, runs a fixed worker pool pulling
//! accepted connections off a shared queue, and hands back a [`Handle`] for
//! graceful shutdown (§5.1, §5.3).
//!
//! Grounded on `Server`/`ServerBuilder::build()`: a `SegQueue` fed by one
//! accept loop per listener, drained by a fixed number of persistent worker
//! tasks (`spawn_worker`), with a dedicated overflow queue and "alarmist"
//! task answering anything past capacity with a fixed response
//! (`spawn_alarmist`) instead of ever blocking the accept loop itself.
//! `server.cpp`'s `init()`/`acceptLoop()` contributes the bind-then-listen
//! ordering and the TLS-after-dequeue handshake placement.

use crate::{
    config::Config,
    errors::ServerError,
    http::body::BodyStream,
    http::response::Response,
    http::types::{StatusCode, Version},
    limits::WaitStrategy,
    listing, log,
    server::{
        connection::{self, Stream},
        listener,
    },
};
use crossbeam::queue::SegQueue;
use std::{
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Once,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// A connection straight off `accept()`, queued for a worker to pick up. TLS
/// handshakes happen on the worker, not the accept loop, so one slow or
/// hostile client never stalls new connections from being accepted.
struct Accepted {
    stream: TcpStream,
    ip: IpAddr,
    tls: Option<Arc<TlsAcceptor>>,
}

type ConnQueue = Arc<SegQueue<Accepted>>;

/// An instance of the configured HTTP server, not yet bound to any sockets.
pub struct Mercury {
    config: Arc<Config>,
}

impl Mercury {
    pub fn new(config: Config) -> Self {
        Mercury { config: Arc::new(config) }
    }

    /// Binds every enabled listener (IPv4/IPv6, plain/TLS), spawns the
    /// worker pool, and returns a [`Handle`] for graceful shutdown. Fails
    /// with [`ServerError::AllListenersFailed`] only if every configured
    /// listener failed to bind; a partial bind (e.g. IPv6 unavailable) is
    /// logged and otherwise tolerated, matching `init()`'s per-listener
    /// error handling.
    pub async fn launch(&self) -> Result<Handle, ServerError> {
        let tls_acceptor = if self.config.use_tls {
            Some(build_tls_acceptor(&self.config)?)
        } else {
            None
        };

        let mut addrs: Vec<(SocketAddr, Option<Arc<TlsAcceptor>>)> = Vec::new();
        if let Some(ip) = self.config.bind_ipv4 {
            addrs.push((SocketAddr::new(ip, self.config.port), None));
        }
        if let Some(ip) = self.config.bind_ipv6 {
            addrs.push((SocketAddr::new(ip, self.config.port), None));
        }
        if let Some(acceptor) = &tls_acceptor {
            if let Some(ip) = self.config.bind_ipv4 {
                addrs.push((SocketAddr::new(ip, self.config.tls_port), Some(acceptor.clone())));
            }
            if let Some(ip) = self.config.bind_ipv6 {
                addrs.push((SocketAddr::new(ip, self.config.tls_port), Some(acceptor.clone())));
            }
        }

        let queue: ConnQueue = Arc::new(SegQueue::new());
        let overflow: ConnQueue = Arc::new(SegQueue::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));
        let capacity = self.config.server_limits.max_request_backlog as usize;

        let mut tasks = Vec::new();
        let mut bound_any = false;

        for (addr, tls) in addrs {
            match listener::bind(addr, self.config.server_limits.max_request_backlog).await {
                Ok(tcp_listener) => {
                    bound_any = true;
                    tasks.push(tokio::spawn(accept_loop(
                        tcp_listener,
                        tls,
                        queue.clone(),
                        overflow.clone(),
                        capacity,
                        shutdown_rx.clone(),
                    )));
                }
                Err(e) => {
                    tracing::error!(target: "mercury::error", %addr, error = %e, "listener failed to bind, skipping");
                }
            }
        }

        if !bound_any {
            return Err(ServerError::AllListenersFailed);
        }

        for _ in 0..self.config.server_limits.max_threads_per_child {
            tasks.push(tokio::spawn(worker_loop(
                queue.clone(),
                self.config.server_limits.wait_strategy.clone(),
                active_connections.clone(),
                self.config.clone(),
                shutdown_rx.clone(),
            )));
        }

        tasks.push(tokio::spawn(alarmist_loop(
            overflow,
            self.config.server_limits.wait_strategy.clone(),
            self.config.clone(),
            shutdown_rx.clone(),
        )));

        Ok(Handle {
            control: Control {
                shutdown: Arc::new(shutdown_tx),
                active_connections,
                capacity: self.config.server_limits.max_threads_per_child,
            },
            tasks,
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<Arc<TlsAcceptor>>,
    queue: ConnQueue,
    overflow: ConnQueue,
    capacity: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => {
                let Ok((stream, addr)) = accepted else { continue };
                let item = Accepted { stream, ip: addr.ip(), tls: tls.clone() };
                if queue.len() < capacity {
                    queue.push(item);
                } else {
                    overflow.push(item);
                }
            }
        }
    }
}

async fn worker_loop(
    queue: ConnQueue,
    wait: WaitStrategy,
    active_connections: Arc<AtomicUsize>,
    config: Arc<Config>,
    shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(accepted) = queue.pop() else {
            if *shutdown_rx.borrow() {
                return;
            }
            wait_a_bit(&wait).await;
            continue;
        };

        active_connections.fetch_add(1, Ordering::Relaxed);
        handle_accepted(accepted, &config).await;
        active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn handle_accepted(accepted: Accepted, config: &Arc<Config>) {
    let Accepted { stream, ip, tls } = accepted;
    let uses_tls = tls.is_some();

    let stream = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => Stream::Tls(Box::new(tls_stream)),
            Err(e) => {
                log::error(&format!("TLS handshake failed: {e}"), Some(ip), config);
                return;
            }
        },
        None => Stream::Plain(stream),
    };

    connection::serve(stream, ip, uses_tls, config.clone()).await;
}

/// Answers anything past `MaxRequestBacklog` with a fixed 503 rather than
/// leave it to time out, mirroring `spawn_alarmist`'s dedicated overflow
/// worker.
async fn alarmist_loop(overflow: ConnQueue, wait: WaitStrategy, config: Arc<Config>, shutdown_rx: watch::Receiver<bool>) {
    loop {
        let Some(accepted) = overflow.pop() else {
            if *shutdown_rx.borrow() {
                return;
            }
            wait_a_bit(&wait).await;
            continue;
        };

        let mut stream = Stream::Plain(accepted.stream);
        let mut response = Response::new(Version::Http11);
        let doc = listing::error_document(503, "Service Unavailable");
        response
            .status(StatusCode::ServiceUnavailable)
            .header("Content-Type", "text/html")
            .keep_alive(false)
            .set_body(BodyStream::memory(doc.into_bytes()));
        let _ = response.write(&mut stream, config.resp_limits.response_buffer_size).await;
    }
}

async fn wait_a_bit(wait: &WaitStrategy) {
    match wait {
        WaitStrategy::Yield => tokio::task::yield_now().await,
        WaitStrategy::Sleep(d) => tokio::time::sleep(*d).await,
    }
}

fn build_tls_acceptor(config: &Config) -> Result<Arc<TlsAcceptor>, ServerError> {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });

    let cert_path = config
        .tls_cert_path
        .as_deref()
        .ok_or_else(|| ServerError::ConfigParse("TLSCertPath is required when TLSPort is enabled".to_string()))?;
    let key_path = config
        .tls_key_path
        .as_deref()
        .ok_or_else(|| ServerError::ConfigParse("TLSKeyPath is required when TLSPort is enabled".to_string()))?;

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::ConfigParse(format!("invalid TLS certificate/key pair: {e}")))?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(TlsAcceptor::from(Arc::new(server_config))))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, ServerError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ServerError::from)
}

fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, ServerError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ServerError::ConfigParse("no private key found in TLSKeyPath".to_string()))
}

/// A handle to a running [`Mercury`] instance: holds the worker/acceptor
/// task handles and the shared [`Control`] used to request shutdown or read
/// live usage.
pub struct Handle {
    control: Control,
    tasks: Vec<JoinHandle<()>>,
}

impl Handle {
    pub fn control(&self) -> Control {
        self.control.clone()
    }

    /// Signals every task to stop and waits for them to drain, in whatever
    /// order they happen to finish.
    pub async fn shutdown(self) {
        self.control.request_shutdown();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Shared, cloneable handle for triggering shutdown or reading live
/// worker-pool usage from outside the accept/worker tasks — used by both
/// the CLI's `INFO`/`EXIT` commands and the process's signal handler.
#[derive(Clone)]
pub struct Control {
    shutdown: Arc<watch::Sender<bool>>,
    active_connections: Arc<AtomicUsize>,
    capacity: usize,
}

impl Control {
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn usage(&self) -> String {
        format!(
            "{} / {} worker slots in use",
            self.active_connections.load(Ordering::Relaxed),
            self.capacity
        )
    }
}
