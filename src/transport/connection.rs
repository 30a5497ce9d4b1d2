//! # Accepted connection.
//!
//! A [`Connection`] is owned by the reactor's connection table and lent to one
//! worker at a time. Its lifecycle:
//!
//! ```text
//! Accepted ─► Armed ─► Queued ─► InWorker ─┬─► Armed
//!                                          └─► Closed (EOF, read error,
//!                                                      failed re-arm, close())
//! ```
//!
//! The framing buffer lives here so a partial frame survives between wakeups.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use crate::error::TransportError;

use super::endpoint::Stream;
use super::frame::Frame;

/// Back-off between retries of a write that hit a full socket buffer.
const WRITE_RETRY: Duration = Duration::from_millis(1);

/// One accepted, non-blocking socket.
#[derive(Debug)]
pub struct Connection {
    token: u64,
    stream: Stream,
    peer: String,
    inbox: Mutex<BytesMut>,
    closing: AtomicBool,
    write_timeout: Duration,
}

impl Connection {
    pub(crate) fn new(token: u64, stream: Stream, write_timeout: Duration) -> Self {
        let peer = stream.peer();
        Self {
            token,
            stream,
            peer,
            inbox: Mutex::new(BytesMut::new()),
            closing: AtomicBool::new(false),
            write_timeout,
        }
    }

    /// Reactor-unique id; never reused, unlike the fd.
    #[inline]
    pub fn token(&self) -> u64 {
        self.token
    }

    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    #[inline]
    pub(crate) fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Framing buffer holding bytes not yet consumed as whole frames.
    pub fn inbox(&self) -> MutexGuard<'_, BytesMut> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a whole frame.
    pub fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.send_bytes(&frame.to_bytes())
    }

    /// Writes all of `bytes` on the non-blocking socket, waiting out a full send
    /// buffer up to the write timeout.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.write_timeout;
        let mut sent = 0;
        while sent < bytes.len() {
            match (&self.stream).write(&bytes[sent..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::timeout(self.write_timeout));
                    }
                    thread::sleep(WRITE_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Asks the reactor to tear this connection down.
    ///
    /// The socket is shut down so a parked connection wakes with EOF; a worker
    /// currently draining it stops at its next read.
    pub fn close(&self) {
        if !self.closing.swap(true, AtomicOrdering::AcqRel) {
            let _ = self.stream.shutdown();
        }
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.closing.load(AtomicOrdering::Acquire)
    }
}
