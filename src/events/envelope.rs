//! # Event envelope and out-structure.
//!
//! An [`Event`] is what every subscriber in a chain sees: the origin id, the type,
//! and the payload bytes. It is read-only and cheap to clone ([`Bytes`] is
//! reference counted).
//!
//! [`EventOut`] is the read-write side of one `raise()`: a single instance is
//! threaded through the whole chain, and only subscribers holding WRITE for the
//! type receive it. Later subscribers observe what earlier ones wrote.
//!
//! ## Example
//! ```rust
//! use nosbus::{Event, EventOut, EventType, SubscriberId};
//!
//! let ev = Event::new(SubscriberId::from_name("conn"), EventType::OfpMsgIn, &b"hello"[..]);
//! assert_eq!(ev.length(), 5);
//!
//! let mut out = EventOut::for_event(&ev);
//! out.checksum = 0xfeed;
//! out.data.clear();
//! assert_eq!(out.checksum, 0xfeed);
//! ```

use bytes::Bytes;

use crate::subscribers::SubscriberId;

/// Read-only event envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<K> {
    /// Subscriber that raised the event.
    pub origin: SubscriberId,
    /// Event type.
    pub kind: K,
    /// Opaque payload (a switch, host, flow or packet record encoded by the producer).
    pub payload: Bytes,
}

impl<K> Event<K> {
    pub fn new(origin: SubscriberId, kind: K, payload: impl Into<Bytes>) -> Self {
        Self {
            origin,
            kind,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn length(&self) -> usize {
        self.payload.len()
    }
}

/// Shared read-write side of one dispatch.
///
/// `data` starts as a copy of the payload so write-permitted subscribers can edit
/// the record in place; `checksum` starts at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOut {
    pub checksum: u32,
    pub data: Vec<u8>,
}

impl EventOut {
    #[inline]
    pub fn new(checksum: u32, data: Vec<u8>) -> Self {
        Self { checksum, data }
    }

    /// Fresh out-structure seeded from an event's payload.
    pub fn for_event<K>(event: &Event<K>) -> Self {
        Self {
            checksum: 0,
            data: event.payload.to_vec(),
        }
    }
}
