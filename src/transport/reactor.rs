//! # Epoll reactor with a worker pool.
//!
//! One poll thread owns the epoll instance; `N` workers drain ready connections.
//!
//! ```text
//!                 ┌────────────── poll thread ───────────────┐
//! listener ──────►│ accept() until EAGAIN                    │
//!  (level)        │  └─► nonblocking + EPOLLIN|ET|ONESHOT    │
//! connection ────►│ ready token ─► ReadyQueue::push          │
//!  (oneshot)      └───────────────────┬──────────────────────┘
//!                                     ▼
//!                 ┌────────── worker 1..N ───────────────────┐
//!                 │ pop token                                │
//!                 │ read() until 0 / error / EAGAIN          │
//!                 │   └─► ConnectionHandler::on_data(chunk)  │
//!                 │ EAGAIN ─► re-arm (EPOLL_CTL_MOD)         │
//!                 │ else   ─► teardown + close               │
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - A connection is removed from the interest set the moment it fires
//!   (`EPOLLONESHOT`) and re-armed only after its worker finished draining it,
//!   so at most one worker touches a connection at a time.
//! - A slow handler occupies one worker, never the poll thread.
//! - Epoll data carries a connection token, never the raw fd.
//! - A non-`Ok` return from `on_data` is fatal for that connection only.
//! - Shutdown cancels the run token, pushes one sentinel per worker, joins all
//!   threads, then closes every connection, the listener and the epoll fd.
//! - SIGPIPE is ignored by the Rust runtime, so a write to a dead peer surfaces
//!   as `EPIPE`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::net::TcpListener;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::Config;
use crate::error::TransportError;

use super::connection::Connection;
use super::endpoint::{Endpoint, Stream};
use super::queue::{Ready, ReadyQueue};

/// Epoll data of the listening socket; connection tokens start above it.
const LISTENER_TOKEN: u64 = 0;

/// Pause of the poll thread before re-arming a token the full queue rejected.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Callbacks a reactor drives for each connection.
///
/// All methods run on worker threads except `on_open`, which runs on the poll
/// thread right after `accept()`.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// New connection accepted.
    fn on_open(&self, _conn: &Connection) {}

    /// One chunk read from the connection.
    ///
    /// Returning an error tears the connection down.
    fn on_data(&self, conn: &Connection, chunk: &[u8]) -> Result<(), TransportError>;

    /// Connection is being torn down.
    fn on_close(&self, _conn: &Connection) {}

    /// Name used for threads and logs.
    fn name(&self) -> &'static str {
        "reactor"
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

impl Listener {
    fn bind(endpoint: &Endpoint) -> io::Result<(Listener, Endpoint)> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let l = TcpListener::bind(addr)?;
                let local = Endpoint::Tcp(l.local_addr()?);
                Ok((Listener::Tcp(l), local))
            }
            Endpoint::Unix(path) => {
                if path.exists() {
                    fs::remove_file(path)?;
                }
                let l = UnixListener::bind(path)?;
                Ok((Listener::Unix(l, path.clone()), endpoint.clone()))
            }
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match self {
            Listener::Tcp(l) => l.set_nonblocking(true),
            Listener::Unix(l, _) => l.set_nonblocking(true),
        }
    }

    fn accept(&self) -> io::Result<Stream> {
        match self {
            Listener::Tcp(l) => {
                let (s, _) = l.accept()?;
                s.set_nodelay(true)?;
                Ok(Stream::Tcp(s))
            }
            Listener::Unix(l, _) => Ok(Stream::Unix(l.accept()?.0)),
        }
    }

    fn socket_path(&self) -> Option<&PathBuf> {
        match self {
            Listener::Tcp(_) => None,
            Listener::Unix(_, path) => Some(path),
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Listener::Tcp(l) => l.as_fd(),
            Listener::Unix(l, _) => l.as_fd(),
        }
    }
}

/// Outcome of draining one connection.
enum Drain {
    /// Read hit EAGAIN; wait for more input.
    Idle,
    /// Connection must be torn down.
    Closed(&'static str),
}

struct Shared {
    name: &'static str,
    epoll: Epoll,
    listener: Listener,
    queue: ReadyQueue,
    conns: Mutex<HashMap<u64, Arc<Connection>>>,
    handler: Arc<dyn ConnectionHandler>,
    cfg: Config,
    running: CancellationToken,
    next_token: AtomicU64,
    /// Consecutive pushes rejected by the full queue.
    rejected: AtomicU64,
}

#[inline]
fn armed(token: u64) -> EpollEvent {
    EpollEvent::new(
        EpollFlags::EPOLLIN | EpollFlags::EPOLLET | EpollFlags::EPOLLONESHOT,
        token,
    )
}

impl Shared {
    fn conns(&self) -> MutexGuard<'_, HashMap<u64, Arc<Connection>>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, token: u64) -> Option<Arc<Connection>> {
        self.conns().get(&token).cloned()
    }

    fn poll_loop(&self) {
        let mut events = vec![EpollEvent::empty(); self.cfg.max_events_clamped()];
        let interval = self.cfg.poll_interval_ms();

        while !self.running.is_cancelled() {
            let n = match self.epoll.wait(&mut events, EpollTimeout::from(interval)) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    error!(reactor = self.name, error = %e, "epoll_wait failed; poll thread exits");
                    break;
                }
            };
            for ev in &events[..n] {
                match ev.data() {
                    LISTENER_TOKEN => self.accept_pending(),
                    token => self.enqueue(token),
                }
            }
        }
        debug!(reactor = self.name, "poll thread stopped");
    }

    fn accept_pending(&self) {
        loop {
            match self.listener.accept() {
                Ok(stream) => self.register(stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!(reactor = self.name, error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn register(&self, stream: Stream) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(reactor = self.name, error = %e, "cannot make socket non-blocking; dropped");
            return;
        }
        let write_timeout = self.cfg.reply_timeout().unwrap_or(self.cfg.poll_interval);
        let token = self.next_token.fetch_add(1, AtomicOrdering::Relaxed);
        let conn = Arc::new(Connection::new(token, stream, write_timeout));

        self.handler.on_open(&conn);
        self.conns().insert(token, Arc::clone(&conn));

        if let Err(e) = self.epoll.add(conn.stream(), armed(token)) {
            warn!(reactor = self.name, token, error = %e, "epoll add failed; dropped");
            self.teardown(&conn, "register failed");
            return;
        }
        debug!(reactor = self.name, token, peer = conn.peer(), "accepted");
    }

    fn enqueue(&self, token: u64) {
        match self.queue.push(token) {
            Ok(()) => {
                let streak = self.rejected.swap(0, AtomicOrdering::Relaxed);
                if streak > 0 {
                    debug!(reactor = self.name, rejected = streak, "ready queue accepting again");
                }
            }
            Err(e) => {
                let streak = self.rejected.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                if streak.is_power_of_two() {
                    warn!(reactor = self.name, token, rejected = streak, error = %e, "ready queue full; re-arming");
                }
                thread::sleep(QUEUE_FULL_BACKOFF);
                if let Some(conn) = self.lookup(token) {
                    if self.rearm(&conn).is_err() {
                        self.teardown(&conn, "re-arm failed");
                    }
                }
            }
        }
    }

    fn rearm(&self, conn: &Connection) -> Result<(), TransportError> {
        let mut ev = armed(conn.token());
        self.epoll.modify(conn.stream(), &mut ev)?;
        Ok(())
    }

    fn worker_loop(&self, buf: &mut [u8]) {
        loop {
            match self.queue.pop() {
                Ready::Shutdown => break,
                Ready::Conn(token) => self.service(token, buf),
            }
        }
    }

    fn service(&self, token: u64, buf: &mut [u8]) {
        let Some(conn) = self.lookup(token) else {
            return;
        };
        match self.drain(&conn, buf) {
            Drain::Idle => {
                if let Err(e) = self.rearm(&conn) {
                    debug!(reactor = self.name, token, error = %e, "re-arm failed");
                    self.teardown(&conn, "re-arm failed");
                }
            }
            Drain::Closed(reason) => self.teardown(&conn, reason),
        }
    }

    fn drain(&self, conn: &Connection, buf: &mut [u8]) -> Drain {
        loop {
            if conn.is_closing() {
                return Drain::Closed("closed locally");
            }
            match (&*conn.stream()).read(buf) {
                Ok(0) => return Drain::Closed("peer closed"),
                Ok(n) => {
                    if let Err(e) = self.handler.on_data(conn, &buf[..n]) {
                        warn!(
                            reactor = self.name,
                            token = conn.token(),
                            label = e.as_label(),
                            error = %e,
                            "connection handler failed"
                        );
                        return Drain::Closed("handler error");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Drain::Idle,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!(reactor = self.name, token = conn.token(), error = %e, "read failed");
                    return Drain::Closed("read error");
                }
            }
        }
    }

    /// Removes a connection; only the first call for a token has an effect.
    fn teardown(&self, conn: &Connection, reason: &'static str) {
        if self.conns().remove(&conn.token()).is_none() {
            return;
        }
        let _ = self.epoll.delete(conn.stream());
        conn.close();
        self.handler.on_close(conn);
        debug!(reactor = self.name, token = conn.token(), reason, "connection closed");
    }
}

/// Running listener: poll thread plus worker pool.
pub struct Reactor {
    shared: Arc<Shared>,
    local: Endpoint,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Reactor {
    /// Binds `endpoint` and starts the poll thread and `cfg.workers` workers.
    pub fn bind(
        endpoint: &Endpoint,
        cfg: &Config,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Reactor, TransportError> {
        let (listener, local) = Listener::bind(endpoint)?;
        listener.set_nonblocking()?;

        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        epoll.add(&listener, EpollEvent::new(EpollFlags::EPOLLIN, LISTENER_TOKEN))?;

        let name = handler.name();
        let shared = Arc::new(Shared {
            name,
            epoll,
            listener,
            queue: ReadyQueue::new(cfg.queue_capacity_clamped()),
            conns: Mutex::new(HashMap::new()),
            handler,
            cfg: cfg.clone(),
            running: CancellationToken::new(),
            next_token: AtomicU64::new(LISTENER_TOKEN + 1),
            rejected: AtomicU64::new(0),
        });

        let reactor = Reactor {
            shared: Arc::clone(&shared),
            local,
            threads: Mutex::new(Vec::with_capacity(cfg.workers_clamped() + 1)),
        };

        let poll = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("{name}-poll"))
                .spawn(move || shared.poll_loop())?
        };
        reactor.threads().push(poll);

        for idx in 0..cfg.workers_clamped() {
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("{name}-worker-{idx}"))
                .spawn(move || {
                    let mut buf = vec![0u8; shared.cfg.read_buffer_clamped()];
                    shared.worker_loop(&mut buf);
                })?;
            reactor.threads().push(worker);
        }

        info!(
            reactor = name,
            endpoint = %reactor.local,
            workers = cfg.workers_clamped(),
            "listening"
        );
        Ok(reactor)
    }

    fn threads(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address actually bound (resolves port `0`).
    #[inline]
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    /// Number of open connections.
    pub fn connections(&self) -> usize {
        self.shared.conns().len()
    }

    /// Closes one connection; returns `false` if the token is unknown.
    pub fn disconnect(&self, token: u64) -> bool {
        match self.shared.lookup(token) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Stops every thread and closes all connections. Idempotent.
    pub fn shutdown(&self) {
        let threads: Vec<_> = self.threads().drain(..).collect();
        if threads.is_empty() {
            return;
        }
        self.shared.running.cancel();
        self.shared.queue.push_shutdown(self.shared.cfg.workers_clamped());
        for handle in threads {
            if handle.join().is_err() {
                error!(reactor = self.shared.name, "reactor thread panicked");
            }
        }

        let open: Vec<_> = self.shared.conns().values().cloned().collect();
        for conn in open {
            self.shared.teardown(&conn, "shutdown");
        }
        if let Some(path) = self.shared.listener.socket_path() {
            let _ = fs::remove_file(path);
        }
        info!(reactor = self.shared.name, endpoint = %self.local, "stopped");
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
