//! # Client side of a remote subscriber.
//!
//! [`RemoteEndpoint`] delivers events to a subscriber that lives behind an
//! [`Endpoint`]. The connection is opened lazily, cached, and dropped on the
//! first error so the next call starts clean.
//!
//! ```text
//! request(): write Request ──► wait Reply (≤ reply_timeout) ──► (status, out)
//! push():    write Push    ──► done
//! ```
//!
//! Calls on one endpoint are serialized: a request holds the connection until its
//! reply arrives, so replies can never be paired with the wrong request.

use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::core::Config;
use crate::error::TransportError;
use crate::events::{EventOut, Status};
use crate::subscribers::SubscriberId;

use super::endpoint::{Endpoint, Stream};
use super::frame::{read_frame, Envelope, Frame};

/// Connect timeout used when no reply timeout is configured.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cached client connection to one endpoint.
#[derive(Debug)]
pub struct RemoteEndpoint {
    endpoint: Endpoint,
    timeout: Option<Duration>,
    max_frame: usize,
    conn: Mutex<Option<Stream>>,
}

impl RemoteEndpoint {
    pub fn new(endpoint: Endpoint, cfg: &Config) -> Self {
        Self {
            endpoint,
            timeout: cfg.reply_timeout(),
            max_frame: cfg.max_frame,
            conn: Mutex::new(None),
        }
    }

    #[inline]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn slot(&self) -> MutexGuard<'_, Option<Stream>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the cached stream, connecting first if needed.
    ///
    /// Any error drops the stream.
    fn with_stream<T>(
        &self,
        f: impl FnOnce(&mut Stream) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut slot = self.slot();
        if slot.is_none() {
            let connect_timeout = self.timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
            let stream = Stream::connect(&self.endpoint, connect_timeout)?;
            stream.set_timeouts(self.timeout)?;
            debug!(endpoint = %self.endpoint, "connected");
            *slot = Some(stream);
        }
        let Some(stream) = slot.as_mut() else {
            return Err(TransportError::ConnectionClosed);
        };
        let res = f(stream);
        if let Err(e) = &res {
            debug!(endpoint = %self.endpoint, error = %e, "dropping connection");
            *slot = None;
        }
        res
    }

    fn write(stream: &mut Stream, bytes: &[u8], timeout: Duration) -> Result<(), TransportError> {
        stream
            .write_all(bytes)
            .map_err(|e| TransportError::from_read(e, timeout))
    }

    /// Sends one frame and waits for the next frame in reply.
    ///
    /// A frame above `max_frame` is refused before the connection is touched.
    pub fn call(&self, frame: &Frame) -> Result<Frame, TransportError> {
        let timeout = self.timeout.unwrap_or(Duration::MAX);
        let max = self.max_frame;
        let bytes = frame.to_bytes_within(max)?;
        self.with_stream(|stream| {
            Self::write(stream, &bytes, timeout)?;
            read_frame(stream, max, timeout)
        })
    }

    /// Request/reply delivery of one event.
    ///
    /// `out` is sent only when the subscriber may write it; the reply's out
    /// replaces it.
    pub fn request(
        &self,
        envelope: Envelope,
        out: Option<&mut EventOut>,
    ) -> Result<Status, TransportError> {
        let frame = Frame::Request {
            envelope,
            out: out.as_deref().cloned(),
        };
        match self.call(&frame)? {
            Frame::Reply {
                status,
                out: returned,
            } => {
                if let (Some(slot), Some(returned)) = (out, returned) {
                    *slot = returned;
                }
                Ok(status)
            }
            other => {
                *self.slot() = None;
                Err(TransportError::UnexpectedFrame {
                    expected: "reply",
                    got: other.label(),
                })
            }
        }
    }

    /// Fire-and-forget delivery of one event.
    pub fn push(&self, envelope: Envelope) -> Result<(), TransportError> {
        let timeout = self.timeout.unwrap_or(Duration::MAX);
        let bytes = Frame::Push(envelope).to_bytes_within(self.max_frame)?;
        self.with_stream(|stream| Self::write(stream, &bytes, timeout))
    }

    /// Announces `name` to a bus server and returns the server's verdict.
    pub fn hello(&self, name: &str) -> Result<Status, TransportError> {
        let frame = Frame::Hello {
            id: SubscriberId::from_name(name),
            name: name.to_string(),
        };
        match self.call(&frame)? {
            Frame::HelloAck { status } => Ok(status),
            other => {
                *self.slot() = None;
                Err(TransportError::UnexpectedFrame {
                    expected: "hello_ack",
                    got: other.label(),
                })
            }
        }
    }

    /// Drops the cached connection, if any.
    pub fn reset(&self) {
        *self.slot() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }
}
