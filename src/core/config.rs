//! # Bus and transport configuration.
//!
//! Provides [`Config`], the centralized settings of one bus instance and of every
//! reactor, server and client built for it.
//!
//! Config is used in three ways:
//! 1. **Bus creation**: `BusBuilder::new(config)`
//! 2. **Listeners**: `Reactor::bind(endpoint, &config, handler)`
//! 3. **Remote subscribers**: the client side of every external subscriber
//!
//! ## Sentinel values
//! - `reply_timeout = 0s` → wait for replies forever (`None` from [`Config::reply_timeout`])
//! - `workers`, `queue_capacity`, `max_events`, `read_buffer` are clamped to at least 1

use std::time::Duration;

/// Global configuration for a bus and its transport.
///
/// ## Field semantics
/// - `workers`: size of each reactor's worker pool
/// - `queue_capacity`: ready-socket queue capacity; pushes beyond it are rejected
/// - `max_events`: epoll events fetched per wake
/// - `read_buffer`: bytes read per `read()` call by a worker
/// - `poll_interval`: epoll wait timeout; bounds how late shutdown is noticed
/// - `reply_timeout`: how long a remote call waits for its reply (`0s` = forever)
/// - `max_frame`: largest accepted frame body
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker threads per reactor (`0` is treated as 1).
    pub workers: usize,

    /// Ready-socket queue capacity.
    pub queue_capacity: usize,

    /// Maximum epoll events handled per wake.
    pub max_events: usize,

    /// Per-read buffer size.
    pub read_buffer: usize,

    /// Epoll wait timeout.
    pub poll_interval: Duration,

    /// Client-side wait for a reply.
    ///
    /// A timeout is a non-zero status for the abort rule, and it deactivates the
    /// remote subscriber until it handshakes again.
    pub reply_timeout: Duration,

    /// Largest accepted frame (bytes after the length prefix).
    pub max_frame: usize,
}

impl Config {
    #[inline]
    pub fn workers_clamped(&self) -> usize {
        self.workers.max(1)
    }

    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    #[inline]
    pub fn max_events_clamped(&self) -> usize {
        self.max_events.max(1)
    }

    #[inline]
    pub fn read_buffer_clamped(&self) -> usize {
        self.read_buffer.max(1)
    }

    /// Returns the reply timeout as an `Option`.
    ///
    /// - `None` → wait forever
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn reply_timeout(&self) -> Option<Duration> {
        if self.reply_timeout == Duration::ZERO {
            None
        } else {
            Some(self.reply_timeout)
        }
    }

    /// Epoll timeout in milliseconds, saturated to what epoll accepts.
    #[inline]
    pub fn poll_interval_ms(&self) -> u16 {
        u16::try_from(self.poll_interval.as_millis()).unwrap_or(u16::MAX)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 4`
    /// - `queue_capacity = 1024`
    /// - `max_events = 1024`
    /// - `read_buffer = 8192`
    /// - `poll_interval = 100ms`
    /// - `reply_timeout = 1s`
    /// - `max_frame = 1 MiB`
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            max_events: 1024,
            read_buffer: 8192,
            poll_interval: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(1),
            max_frame: 1 << 20,
        }
    }
}
