//! Native HTTP server implementation
//!
//! Serves an [`App`] with hyper on tokio:
//! - One task per accepted connection
//! - SO_REUSEADDR on the listening socket, TCP_NODELAY on accepted streams
//! - Graceful shutdown that drains open connections

use crate::{App, Error, Result};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub workers: usize,
    pub backlog: i32,
    /// How long shutdown waits for open connections before giving up
    pub shutdown_timeout: Duration,
    ephemeral: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 3000,
            workers: num_cpus::get(),
            backlog: 1024,
            shutdown_timeout: Duration::from_secs(10),
            ephemeral: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loopback config on an OS-assigned port
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 && !self.ephemeral {
            return Err(Error::InvalidConfig(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if self.backlog <= 0 {
            return Err(Error::InvalidConfig("backlog must be positive".to_string()));
        }
        self.addr().map(|_| ())
    }

    /// Socket address to bind
    pub fn addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.hostname.parse().map_err(|_| {
            Error::InvalidConfig(format!("hostname is not an IP address: {}", self.hostname))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Base URL announced at startup
    pub fn url(&self) -> Result<String> {
        Ok(format!("http://{}/", self.addr()?))
    }
}

/// Create the listening socket
pub fn create_listener_socket(addr: &SocketAddr, backlog: i32) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(backlog)?;

    Ok(socket)
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolve once no connection is open
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn guard(self: &Arc<Self>) -> ConnectionGuard {
        self.increment();
        ConnectionGuard(Arc::clone(self))
    }
}

/// Decrements the tracker when a connection task ends, even by panic
struct ConnectionGuard(Arc<ConnectionTracker>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// A bound server, ready to accept connections
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    app: Arc<App>,
    tracker: Arc<ConnectionTracker>,
    config: ServerConfig,
}

impl Server {
    /// Bind the default [`App`] on `config`'s address
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_app(config, App::default())
    }

    /// Bind `app` on `config`'s address
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind_app(config: ServerConfig, app: App) -> Result<Self> {
        config.validate()?;
        let addr = config.addr()?;

        let socket = create_listener_socket(&addr, config.backlog)
            .map_err(|source| Error::Bind { addr, source })?;
        let listener = TcpListener::from_std(std::net::TcpListener::from(socket))?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, workers = config.workers, "listener bound");

        Ok(Self {
            listener,
            local_addr,
            app: Arc::new(app),
            tracker: Arc::new(ConnectionTracker::new()),
            config,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until the process exits
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain open connections
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::pin!(signal);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, shutdown_rx.clone()),
                    Err(err) => {
                        // Per-connection failures (e.g. EMFILE); keep accepting
                        tracing::warn!(error = %err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = &mut signal => break,
            }
        }

        let Server {
            listener,
            tracker,
            config,
            ..
        } = self;
        drop(listener);

        let open = tracker.count();
        tracing::info!(open_connections = open, "shutting down");
        let _ = shutdown_tx.send(true);

        if tokio::time::timeout(config.shutdown_timeout, tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                open_connections = tracker.count(),
                timeout_ms = config.shutdown_timeout.as_millis() as u64,
                "shutdown timed out with connections still open"
            );
        }

        tracing::info!("Server stopped");
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %err, "failed to set TCP_NODELAY");
        }

        let app = Arc::clone(&self.app);
        let guard = self.tracker.guard();

        tokio::spawn(async move {
            let _guard = guard;
            let service = service_fn(move |req: hyper::Request<Incoming>| {
                let res = app.respond(req);
                async move { Ok::<_, Infallible>(res) }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = shutdown.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };

            if let Err(err) = result {
                tracing::debug!(%peer, error = %err, "connection error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr().unwrap(), "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.url().unwrap(), "http://127.0.0.1:3000/");
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(ServerConfig::new().port(0).validate().is_err());
        assert!(ServerConfig::ephemeral().validate().is_ok());
        assert!(ServerConfig::new().workers(0).validate().is_err());
        assert!(ServerConfig::new().hostname("localhost").validate().is_err());
        assert!(ServerConfig::new().hostname("::1").port(65535).validate().is_ok());
    }

    #[test]
    fn test_url_brackets_ipv6() {
        let config = ServerConfig::new().hostname("::1");
        assert_eq!(config.url().unwrap(), "http://[::1]:3000/");
        assert!(ServerConfig::new().hostname("localhost").url().is_err());
    }

    async fn start() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let server = Server::bind(ServerConfig::ephemeral()).unwrap();
        let addr = server.local_addr();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async {
            let _ = rx.await;
        }));
        (addr, tx, handle)
    }

    async fn send(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn assert_hello(raw: &str) {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("http/1.1 200 ok\r\n"), "{raw}");
        assert!(head.contains("\r\ncontent-type: text/plain\r\n"), "{raw}");
        assert!(head.contains("\r\ncontent-length: 14\r\n"), "{raw}");
        assert_eq!(body, "Hello, World!\n");
    }

    #[tokio::test]
    async fn test_get_root() {
        let (addr, tx, handle) = start().await;

        let raw = send(addr, "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await;
        assert_hello(&raw);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_get_nested_path() {
        let (addr, tx, handle) = start().await;

        let raw = send(
            addr,
            "GET /anything/nested/path HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_hello(&raw);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_post_with_body() {
        let (addr, tx, handle) = start().await;

        let raw = send(
            addr,
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\nConnection: close\r\n\r\n{\"a\":[1,2,3]}",
        )
        .await;
        assert_hello(&raw);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_any_method_any_path() {
        let (addr, tx, handle) = start().await;

        for method in ["GET", "PUT", "DELETE", "PATCH", "OPTIONS", "PURGE"] {
            for path in ["/", "/hello", "/x/y/z?q=1", "/favicon.ico"] {
                let raw = send(
                    addr,
                    &format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
                )
                .await;
                assert_hello(&raw);
            }
        }

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_keep_alive_serves_multiple_requests() {
        let (addr, tx, handle) = start().await;

        let raw = send(
            addr,
            "GET /a HTTP/1.1\r\nHost: localhost\r\n\r\nGET /b HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(raw.matches("Hello, World!\n").count(), 2);

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_idle_connection() {
        let (addr, tx, handle) = start().await;

        // Keep-alive connection left open after one response
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 512];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_addr_in_use() {
        let first = Server::bind(ServerConfig::ephemeral()).unwrap();
        let port = first.local_addr().port();

        let err = match Server::bind(ServerConfig::new().port(port)) {
            Err(err) => err,
            Ok(_) => panic!("second bind on port {port} succeeded"),
        };
        assert!(err.is_addr_in_use(), "{err}");
    }

    #[tokio::test]
    async fn test_tracker_wait_idle() {
        let tracker = Arc::new(ConnectionTracker::new());
        let guard = tracker.guard();
        assert_eq!(tracker.count(), 1);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.count(), 0);
    }
}
