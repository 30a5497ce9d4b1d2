//! # Subscriber host: the peer side of a remote subscriber.
//!
//! A subscriber that lives in another process runs a [`SubscriberHost`]. The bus
//! connects to it through [`RemoteEndpoint`] and delivers events as frames:
//!
//! ```text
//! Push(envelope)          ─► handler.handle(event, None)
//! Request{envelope, out}  ─► handler.handle(event, out) ─► Reply{status, out}
//! ```
//!
//! [`SubscriberHost::announce`] sends the handshake that activates the
//! subscriber on the bus.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::Config;
use crate::error::TransportError;
use crate::events::{Catalog, Status};
use crate::subscribers::HandlerRef;

use super::client::RemoteEndpoint;
use super::connection::Connection;
use super::endpoint::Endpoint;
use super::frame::{self, Frame};
use super::reactor::{ConnectionHandler, Reactor};

struct HostService<K: Catalog> {
    handler: HandlerRef<K>,
    max_frame: usize,
}

impl<K: Catalog> HostService<K> {
    fn serve(&self, conn: &Connection, frame: Frame) -> Result<(), TransportError> {
        match frame {
            Frame::Push(envelope) => {
                match envelope.into_event::<K>() {
                    Ok(event) => {
                        let status = self.run(|| self.handler.handle(&event, None));
                        if !status.is_ok() {
                            info!(handler = self.handler.name(), event = event.kind.name(), %status, "push failed");
                        }
                    }
                    Err(e) => warn!(handler = self.handler.name(), error = %e, "push dropped"),
                }
                Ok(())
            }
            Frame::Request { envelope, mut out } => {
                let status = match envelope.into_event::<K>() {
                    Ok(event) => self.run(|| self.handler.handle(&event, out.as_mut())),
                    Err(e) => {
                        warn!(handler = self.handler.name(), error = %e, "request refused");
                        Status::FAILURE
                    }
                };
                conn.send(&Frame::Reply { status, out })
            }
            other => Err(TransportError::UnexpectedFrame {
                expected: "push or request",
                got: other.label(),
            }),
        }
    }

    fn run(&self, f: impl FnOnce() -> Status) -> Status {
        panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
            warn!(handler = self.handler.name(), "handler panicked");
            Status::PANICKED
        })
    }
}

impl<K: Catalog> ConnectionHandler for HostService<K> {
    fn on_data(&self, conn: &Connection, chunk: &[u8]) -> Result<(), TransportError> {
        let frames = {
            let mut inbox = conn.inbox();
            inbox.extend_from_slice(chunk);
            let mut frames = Vec::new();
            while let Some(frame) = frame::decode(&mut inbox, self.max_frame)? {
                frames.push(frame);
            }
            frames
        };
        for frame in frames {
            self.serve(conn, frame)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "host"
    }
}

/// Listener that serves one subscriber's handler to a remote bus.
pub struct SubscriberHost<K: Catalog> {
    reactor: Reactor,
    cfg: Config,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: Catalog> SubscriberHost<K> {
    /// Binds `endpoint` and serves `handler` on it.
    pub fn bind(endpoint: &Endpoint, cfg: &Config, handler: HandlerRef<K>) -> Result<Self, TransportError> {
        let service = Arc::new(HostService {
            handler,
            max_frame: cfg.max_frame,
        });
        let reactor = Reactor::bind(endpoint, cfg, service)?;
        Ok(Self {
            reactor,
            cfg: cfg.clone(),
            _kind: std::marker::PhantomData,
        })
    }

    #[inline]
    pub fn local_endpoint(&self) -> &Endpoint {
        self.reactor.local_endpoint()
    }

    /// Announces `name` to the bus server at `nos`.
    ///
    /// A refused handshake is reported as [`TransportError::HandshakeRejected`].
    pub fn announce(&self, nos: &Endpoint, name: &str) -> Result<(), TransportError> {
        let status = RemoteEndpoint::new(nos.clone(), &self.cfg).hello(name)?;
        if !status.is_ok() {
            return Err(TransportError::HandshakeRejected { status });
        }
        info!(subscriber = name, nos = %nos, "announced");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.reactor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use crate::core::BusBuilder;
    use crate::events::{Event, EventOut, EventType};
    use crate::subscribers::{HandlerFn, Site, SubscriberId, SubscriberRecord};
    use crate::transport::BusServer;

    fn cfg() -> Config {
        Config {
            workers: 2,
            poll_interval: Duration::from_millis(20),
            reply_timeout: Duration::from_secs(2),
            ..Config::default()
        }
    }

    fn loopback() -> Endpoint {
        "tcp://127.0.0.1:0".parse().unwrap()
    }

    fn external(host: &SubscriberHost<EventType>, inbound: &str) -> SubscriberRecord {
        SubscriberRecord::new("ext")
            .with_site(Site::External)
            .with_endpoint(host.local_endpoint().clone())
            .with_activated(true)
            .inbound(inbound)
    }

    #[test]
    fn test_remote_request_mutates_out() {
        let host = SubscriberHost::bind(
            &loopback(),
            &cfg(),
            HandlerFn::arc("integrity", |ev: &Event<EventType>, out: Option<&mut EventOut>| {
                if let Some(out) = out {
                    out.checksum = ev.payload.iter().map(|b| u32::from(*b)).sum();
                }
                Status::OK
            }),
        )
        .unwrap();
        let bus = BusBuilder::<EventType>::new(cfg())
            .with_record(external(&host, "EV_OFP_MSG_IN,rw"))
            .build()
            .unwrap();

        let done = bus.request(SubscriberId::from_name("ofp10"), EventType::OfpMsgIn, &[1u8, 2, 3][..]);
        assert_eq!(done.status, Status::OK);
        assert_eq!(done.out.checksum, 6);
        assert_eq!(done.out.data, [1, 2, 3]);
        host.shutdown();
    }

    #[test]
    fn test_read_only_subscriber_gets_push() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let host = SubscriberHost::bind(
            &loopback(),
            &cfg(),
            HandlerFn::arc("watcher", move |ev: &Event<EventType>, out: Option<&mut EventOut>| {
                let _ = tx.lock().unwrap().send((ev.kind, ev.payload.clone(), out.is_some()));
                Status::OK
            }),
        )
        .unwrap();
        let bus = BusBuilder::<EventType>::new(cfg())
            .with_record(external(&host, "EV_SW_CONNECTED,r"))
            .build()
            .unwrap();

        assert_eq!(bus.raise_as("conn", EventType::SwConnected, &b"dpid"[..]), Status::OK);
        let (kind, payload, had_out) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(kind, EventType::SwConnected);
        assert_eq!(&payload[..], b"dpid");
        assert!(!had_out);
        host.shutdown();
    }

    #[test]
    fn test_slow_subscriber_times_out_and_is_deactivated() {
        let host = SubscriberHost::bind(
            &loopback(),
            &cfg(),
            HandlerFn::arc("slow", |_ev: &Event<EventType>, _out: Option<&mut EventOut>| {
                thread::sleep(Duration::from_millis(300));
                Status::OK
            }),
        )
        .unwrap();
        let fast = Config {
            reply_timeout: Duration::from_millis(50),
            ..cfg()
        };
        let bus = BusBuilder::<EventType>::new(fast)
            .with_record(external(&host, "EV_OFP_MSG_IN,rwx"))
            .build()
            .unwrap();

        let status = bus.raise_as("ofp10", EventType::OfpMsgIn, &b"pkt"[..]);
        assert_eq!(status, Status::TRANSPORT);
        assert!(!bus.is_activated("ext"));

        // deactivated subscribers are skipped
        assert_eq!(bus.raise_as("ofp10", EventType::OfpMsgIn, &b"pkt"[..]), Status::OK);
        host.shutdown();
    }

    #[test]
    fn test_oversized_event_is_refused_without_deactivation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let host = SubscriberHost::bind(
            &loopback(),
            &cfg(),
            HandlerFn::arc("ext", move |_ev: &Event<EventType>, _out: Option<&mut EventOut>| {
                seen.fetch_add(1, Ordering::SeqCst);
                Status::OK
            }),
        )
        .unwrap();
        let small = Config {
            max_frame: 256,
            ..cfg()
        };
        let bus = BusBuilder::<EventType>::new(small)
            .with_record(external(&host, "EV_OFP_MSG_IN,rwx"))
            .build()
            .unwrap();

        let status = bus.raise_as("ofp10", EventType::OfpMsgIn, vec![0u8; 1024]);
        assert_eq!(status, Status::TRANSPORT);
        assert!(bus.is_activated("ext"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(bus.raise_as("ofp10", EventType::OfpMsgIn, &b"pkt"[..]), Status::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        host.shutdown();
    }

    #[test]
    fn test_announce_activates_on_server() {
        let host = SubscriberHost::bind(
            &loopback(),
            &cfg(),
            HandlerFn::arc("ext", |_ev: &Event<EventType>, _out: Option<&mut EventOut>| Status::OK),
        )
        .unwrap();
        let bus = BusBuilder::<EventType>::new(cfg())
            .with_record(
                SubscriberRecord::new("ext")
                    .with_site(Site::External)
                    .with_endpoint(host.local_endpoint().clone())
                    .inbound("EV_HOST_ADDED"),
            )
            .build()
            .unwrap();
        let server = BusServer::bind(Arc::clone(&bus), &loopback(), &cfg()).unwrap();

        assert!(!bus.is_activated("ext"));
        host.announce(server.local_endpoint(), "ext").unwrap();
        assert!(bus.is_activated("ext"));

        let err = host.announce(server.local_endpoint(), "impostor").unwrap_err();
        assert!(matches!(err, TransportError::HandshakeRejected { status } if status == Status::FAILURE));

        server.shutdown();
        host.shutdown();
    }
}
