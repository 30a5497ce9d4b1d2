//! # Wire frames.
//!
//! Every frame is length-prefixed; all integers are big-endian.
//!
//! ```text
//! ┌────────────┬────────┬──────────────────────────────┐
//! │ len: u32   │ tag: u8│ body (len - 1 bytes)         │
//! └────────────┴────────┴──────────────────────────────┘
//!
//! tag 1 Hello     id u32 │ name_len u16 │ name
//! tag 2 HelloAck  status i32
//! tag 3 Push      envelope
//! tag 4 Request   envelope │ out?
//! tag 5 Reply     status i32 │ out?
//!
//! envelope = origin u32 │ type u16 │ length u32 │ payload
//! out?     = 0u8 │ 1u8 checksum u32 │ out_len u32 │ data
//! ```
//!
//! ## Rules
//! - `len` counts everything after the length field and must not exceed the
//!   configured maximum; an oversized or malformed frame is fatal for the connection.
//! - The envelope's `length` must equal the payload bytes that follow it.

use std::io::Read;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TransportError;
use crate::events::{Catalog, Event, EventOut, Status};
use crate::subscribers::SubscriberId;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

const TAG_HELLO: u8 = 1;
const TAG_HELLO_ACK: u8 = 2;
const TAG_PUSH: u8 = 3;
const TAG_REQUEST: u8 = 4;
const TAG_REPLY: u8 = 5;

/// Catalog-independent event envelope as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub origin: SubscriberId,
    pub code: u16,
    pub payload: Bytes,
}

impl Envelope {
    pub fn from_event<K: Catalog>(event: &Event<K>) -> Self {
        Self {
            origin: event.origin,
            code: event.kind.code(),
            payload: event.payload.clone(),
        }
    }

    /// Resolves the code against catalog `K`.
    pub fn into_event<K: Catalog>(self) -> Result<Event<K>, TransportError> {
        let kind = K::from_code(self.code).ok_or(TransportError::UnknownEvent { code: self.code })?;
        Ok(Event::new(self.origin, kind, self.payload))
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// External subscriber announces itself.
    Hello { id: SubscriberId, name: String },
    /// Answer to [`Frame::Hello`].
    HelloAck { status: Status },
    /// Event that expects no answer.
    Push(Envelope),
    /// Event that expects a [`Frame::Reply`].
    Request {
        envelope: Envelope,
        out: Option<EventOut>,
    },
    /// Status of a [`Frame::Request`], with the out-structure when it was sent.
    Reply { status: Status, out: Option<EventOut> },
}

impl Frame {
    /// Short frame name for logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::HelloAck { .. } => "hello_ack",
            Frame::Push(_) => "push",
            Frame::Request { .. } => "request",
            Frame::Reply { .. } => "reply",
        }
    }

    /// Appends the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.put_u32(0);
        match self {
            Frame::Hello { id, name } => {
                dst.put_u8(TAG_HELLO);
                dst.put_u32(id.get());
                let name = truncate_name(name);
                dst.put_u16(u16::try_from(name.len()).unwrap_or(u16::MAX));
                dst.put_slice(name.as_bytes());
            }
            Frame::HelloAck { status } => {
                dst.put_u8(TAG_HELLO_ACK);
                dst.put_i32(status.code());
            }
            Frame::Push(env) => {
                dst.put_u8(TAG_PUSH);
                put_envelope(dst, env);
            }
            Frame::Request { envelope, out } => {
                dst.put_u8(TAG_REQUEST);
                put_envelope(dst, envelope);
                put_out(dst, out.as_ref());
            }
            Frame::Reply { status, out } => {
                dst.put_u8(TAG_REPLY);
                dst.put_i32(status.code());
                put_out(dst, out.as_ref());
            }
        }
        let len = u32::try_from(dst.len() - start - HEADER_LEN).unwrap_or(u32::MAX);
        dst[start..start + HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Encodes the frame, refusing bodies above `max` or the `u32` length field.
    pub fn to_bytes_within(&self, max: usize) -> Result<Bytes, TransportError> {
        let bytes = self.to_bytes();
        let size = bytes.len() - HEADER_LEN;
        let max = max.min(u32::MAX as usize);
        if size > max {
            return Err(TransportError::FrameTooLarge { size, max });
        }
        Ok(bytes)
    }
}

/// Cuts a hello name to the `u16` length field on a char boundary.
fn truncate_name(name: &str) -> &str {
    let mut end = name.len().min(usize::from(u16::MAX));
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn put_len(dst: &mut BytesMut, len: usize) {
    dst.put_u32(u32::try_from(len).unwrap_or(u32::MAX));
}

fn put_envelope(dst: &mut BytesMut, env: &Envelope) {
    dst.put_u32(env.origin.get());
    dst.put_u16(env.code);
    put_len(dst, env.payload.len());
    dst.put_slice(&env.payload);
}

fn put_out(dst: &mut BytesMut, out: Option<&EventOut>) {
    match out {
        None => dst.put_u8(0),
        Some(out) => {
            dst.put_u8(1);
            dst.put_u32(out.checksum);
            put_len(dst, out.data.len());
            dst.put_slice(&out.data);
        }
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), TransportError> {
    if buf.remaining() < n {
        Err(TransportError::invalid("truncated body"))
    } else {
        Ok(())
    }
}

fn get_envelope(buf: &mut Bytes) -> Result<Envelope, TransportError> {
    need(buf, 10)?;
    let origin = SubscriberId::new(buf.get_u32());
    let code = buf.get_u16();
    let length = buf.get_u32() as usize;
    need(buf, length)?;
    let payload = buf.split_to(length);
    Ok(Envelope {
        origin,
        code,
        payload,
    })
}

fn get_out(buf: &mut Bytes) -> Result<Option<EventOut>, TransportError> {
    need(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(None),
        1 => {
            need(buf, 8)?;
            let checksum = buf.get_u32();
            let len = buf.get_u32() as usize;
            need(buf, len)?;
            Ok(Some(EventOut::new(checksum, buf.split_to(len).to_vec())))
        }
        _ => Err(TransportError::invalid("bad out marker")),
    }
}

fn parse_body(mut body: Bytes) -> Result<Frame, TransportError> {
    need(&body, 1)?;
    let frame = match body.get_u8() {
        TAG_HELLO => {
            need(&body, 6)?;
            let id = SubscriberId::new(body.get_u32());
            let len = usize::from(body.get_u16());
            need(&body, len)?;
            let name = String::from_utf8(body.split_to(len).to_vec())
                .map_err(|_| TransportError::invalid("hello name is not utf-8"))?;
            Frame::Hello { id, name }
        }
        TAG_HELLO_ACK => {
            need(&body, 4)?;
            Frame::HelloAck {
                status: Status::new(body.get_i32()),
            }
        }
        TAG_PUSH => Frame::Push(get_envelope(&mut body)?),
        TAG_REQUEST => {
            let envelope = get_envelope(&mut body)?;
            let out = get_out(&mut body)?;
            Frame::Request { envelope, out }
        }
        TAG_REPLY => {
            need(&body, 4)?;
            let status = Status::new(body.get_i32());
            let out = get_out(&mut body)?;
            Frame::Reply { status, out }
        }
        _ => return Err(TransportError::invalid("unknown frame tag")),
    };
    if body.has_remaining() {
        return Err(TransportError::invalid("trailing bytes"));
    }
    Ok(frame)
}

fn check_len(len: usize, max: usize) -> Result<(), TransportError> {
    if len == 0 {
        return Err(TransportError::invalid("empty frame"));
    }
    if len > max {
        return Err(TransportError::FrameTooLarge { size: len, max });
    }
    Ok(())
}

/// Takes one complete frame off the front of `src`.
///
/// Returns `Ok(None)` while the frame is still incomplete; partial bytes stay in
/// `src` for the next call.
pub fn decode(src: &mut BytesMut, max: usize) -> Result<Option<Frame>, TransportError> {
    if src.len() < HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    check_len(len, max)?;
    if src.len() < HEADER_LEN + len {
        src.reserve(HEADER_LEN + len - src.len());
        return Ok(None);
    }
    let mut whole = src.split_to(HEADER_LEN + len);
    whole.advance(HEADER_LEN);
    parse_body(whole.freeze()).map(Some)
}

/// Reads exactly one frame from a blocking reader.
///
/// `timeout` only labels a read timeout; the reader's own timeout applies.
pub fn read_frame<R: Read>(
    reader: &mut R,
    max: usize,
    timeout: Duration,
) -> Result<Frame, TransportError> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|e| TransportError::from_read(e, timeout))?;
    let len = u32::from_be_bytes(header) as usize;
    check_len(len, max)?;
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .map_err(|e| TransportError::from_read(e, timeout))?;
    parse_body(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    const MAX: usize = 64 * 1024;

    #[test]
    fn test_envelope_round_trip_reproduces_event() {
        let origin = SubscriberId::from_name("conn");
        let ev = Event::new(origin, EventType::OfpMsgIn, &b"\x01\x0a\x00\x08"[..]);
        let frame = Frame::Push(Envelope::from_event(&ev));

        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let decoded = decode(&mut buf, MAX).unwrap().unwrap();
        assert!(buf.is_empty());

        let Frame::Push(env) = decoded else {
            panic!("expected push");
        };
        let back: Event<EventType> = env.into_event().unwrap();
        assert_eq!(back, ev);
        assert_eq!(back.length(), 4);
    }

    #[test]
    fn test_request_and_reply_carry_out_structure() {
        let env = Envelope {
            origin: SubscriberId::new(7),
            code: EventType::SwGetDpid.code(),
            payload: Bytes::from_static(b"fd=3"),
        };
        let frames = [
            Frame::Request {
                envelope: env.clone(),
                out: Some(EventOut::new(0xabcd, b"fd=3".to_vec())),
            },
            Frame::Request {
                envelope: env,
                out: None,
            },
            Frame::Reply {
                status: Status::new(-9),
                out: Some(EventOut::new(1, vec![9, 9])),
            },
            Frame::Hello {
                id: SubscriberId::from_name("l2_learning"),
                name: "l2_learning".into(),
            },
            Frame::HelloAck { status: Status::OK },
        ];

        let mut buf = BytesMut::new();
        for f in &frames {
            f.encode(&mut buf);
        }
        for f in &frames {
            assert_eq!(decode(&mut buf, MAX).unwrap().as_ref(), Some(f));
        }
        assert_eq!(decode(&mut buf, MAX).unwrap(), None);
    }

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let bytes = Frame::HelloAck { status: Status::OK }.to_bytes();
        let mut buf = BytesMut::new();
        for (i, b) in bytes.iter().enumerate() {
            buf.put_u8(*b);
            let got = decode(&mut buf, MAX).unwrap();
            assert_eq!(got.is_some(), i == bytes.len() - 1);
        }
    }

    #[test]
    fn test_oversized_and_garbage_frames_are_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(1_000_000);
        let err = decode(&mut buf, MAX).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 1_000_000, .. }));

        let mut buf = BytesMut::new();
        buf.put_u32(2);
        buf.put_u8(99);
        buf.put_u8(0);
        assert!(matches!(
            decode(&mut buf, MAX).unwrap_err(),
            TransportError::InvalidFrame { .. }
        ));

        // length field claims more payload than the frame holds
        let mut buf = BytesMut::new();
        buf.put_u32(1 + 10);
        buf.put_u8(TAG_PUSH);
        buf.put_u32(1);
        buf.put_u16(1);
        buf.put_u32(50);
        assert!(decode(&mut buf, MAX).is_err());
    }

    #[test]
    fn test_long_hello_name_is_cut_on_char_boundary() {
        let name = "é".repeat(40_000);
        let frame = Frame::Hello {
            id: SubscriberId::from_name(&name),
            name: name.clone(),
        };
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let Some(Frame::Hello { name: got, .. }) = decode(&mut buf, 1 << 20).unwrap() else {
            panic!("expected hello");
        };
        assert_eq!(got.len(), 65_534);
        assert!(name.starts_with(&got));

        assert_eq!(truncate_name("cac"), "cac");
        let ascii = "x".repeat(70_000);
        assert_eq!(truncate_name(&ascii).len(), usize::from(u16::MAX));
    }

    #[test]
    fn test_to_bytes_within_refuses_oversized_frames() {
        let frame = Frame::Push(Envelope {
            origin: SubscriberId::new(3),
            code: EventType::OfpMsgIn.code(),
            payload: Bytes::from(vec![0u8; 100]),
        });
        let err = frame.to_bytes_within(50).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 111, max: 50 }));

        let bytes = frame.to_bytes_within(111).unwrap();
        let mut buf = BytesMut::from(&bytes[..]);
        assert_eq!(decode(&mut buf, 111).unwrap(), Some(frame));
    }

    #[test]
    fn test_unknown_event_code_is_reported() {
        let env = Envelope {
            origin: SubscriberId::new(1),
            code: 999,
            payload: Bytes::new(),
        };
        let err = env.into_event::<EventType>().unwrap_err();
        assert!(matches!(err, TransportError::UnknownEvent { code: 999 }));
    }

    #[test]
    fn test_read_frame_from_blocking_reader() {
        let bytes = Frame::HelloAck {
            status: Status::FAILURE,
        }
        .to_bytes();
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        let frame = read_frame(&mut cursor, MAX, Duration::from_secs(1)).unwrap();
        assert_eq!(
            frame,
            Frame::HelloAck {
                status: Status::FAILURE
            }
        );

        let mut empty = std::io::Cursor::new(Vec::new());
        let err = read_frame(&mut empty, MAX, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }
}
