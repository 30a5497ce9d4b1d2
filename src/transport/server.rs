//! # Bus server: the NOS side of external subscribers.
//!
//! [`BusServer`] runs a [`Reactor`] whose handler turns frames from external
//! subscribers into bus calls.
//!
//! ```text
//! Hello{id, name}       ─► Bus::handshake  ─► HelloAck{status}   (binds token → id)
//! Push(envelope)        ─► Bus::raise
//! Request{envelope,out} ─► Bus::dispatch   ─► Reply{status, out}
//! ```
//!
//! ## Rules
//! - A connection must be bound by a successful handshake before it may raise.
//!   Envelopes on an unbound connection, or whose origin differs from the bound
//!   id, are refused with [`Status::UNAUTHORIZED`].
//! - An envelope with an unknown type code is answered with [`Status::FAILURE`]
//!   (requests) or dropped (pushes); the connection stays open.
//! - A malformed frame closes the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::core::{Bus, Config};
use crate::error::TransportError;
use crate::events::{Catalog, EventOut, Status};
use crate::subscribers::SubscriberId;

use super::connection::Connection;
use super::endpoint::Endpoint;
use super::frame::{self, Envelope, Frame};
use super::reactor::{ConnectionHandler, Reactor};

/// Frame handler shared by the reactor workers.
struct BusService<K: Catalog> {
    bus: Arc<Bus<K>>,
    max_frame: usize,
    bindings: Mutex<HashMap<u64, SubscriberId>>,
}

impl<K: Catalog> BusService<K> {
    fn bindings(&self) -> MutexGuard<'_, HashMap<u64, SubscriberId>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks the envelope origin against the connection's handshake.
    fn origin_allowed(&self, conn: &Connection, envelope: &Envelope) -> bool {
        match self.bindings().get(&conn.token()) {
            Some(bound) if *bound == envelope.origin => true,
            Some(bound) => {
                warn!(
                    bus = K::LABEL,
                    token = conn.token(),
                    bound = %bound,
                    origin = %envelope.origin,
                    "origin does not match handshake"
                );
                false
            }
            None => {
                warn!(
                    bus = K::LABEL,
                    token = conn.token(),
                    peer = conn.peer(),
                    origin = %envelope.origin,
                    "event before handshake"
                );
                false
            }
        }
    }

    fn serve(&self, conn: &Connection, frame: Frame) -> Result<(), TransportError> {
        match frame {
            Frame::Hello { id, name } => {
                let status = self.bus.handshake(id, &name);
                if status.is_ok() {
                    self.bindings().insert(conn.token(), id);
                    info!(bus = K::LABEL, subscriber = %name, peer = conn.peer(), "handshake accepted");
                }
                conn.send(&Frame::HelloAck { status })
            }
            Frame::Push(envelope) => {
                if !self.origin_allowed(conn, &envelope) {
                    return Ok(());
                }
                match envelope.into_event::<K>() {
                    Ok(event) => {
                        let mut out = EventOut::for_event(&event);
                        let status = self.bus.dispatch(&event, &mut out);
                        debug!(bus = K::LABEL, event = event.kind.name(), %status, "push raised");
                    }
                    Err(e) => warn!(bus = K::LABEL, error = %e, "push dropped"),
                }
                Ok(())
            }
            Frame::Request { envelope, out } => {
                if !self.origin_allowed(conn, &envelope) {
                    return conn.send(&Frame::Reply {
                        status: Status::UNAUTHORIZED,
                        out: None,
                    });
                }
                let reply = match envelope.into_event::<K>() {
                    Ok(event) => {
                        let mut out = out.unwrap_or_else(|| EventOut::for_event(&event));
                        let status = self.bus.dispatch(&event, &mut out);
                        Frame::Reply {
                            status,
                            out: Some(out),
                        }
                    }
                    Err(e) => {
                        warn!(bus = K::LABEL, error = %e, "request refused");
                        Frame::Reply {
                            status: Status::FAILURE,
                            out: None,
                        }
                    }
                };
                conn.send(&reply)
            }
            other => Err(TransportError::UnexpectedFrame {
                expected: "hello, push or request",
                got: other.label(),
            }),
        }
    }
}

impl<K: Catalog> ConnectionHandler for BusService<K> {
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

    fn on_close(&self, conn: &Connection) {
        if let Some(id) = self.bindings().remove(&conn.token()) {
            debug!(bus = K::LABEL, id = %id, "binding released");
        }
    }

    fn name(&self) -> &'static str {
        K::LABEL
    }
}

/// Listener that accepts events and handshakes from external subscribers.
pub struct BusServer<K: Catalog> {
    service: Arc<BusService<K>>,
    reactor: Reactor,
}

impl<K: Catalog> BusServer<K> {
    /// Binds `endpoint` and starts serving `bus`.
    pub fn bind(bus: Arc<Bus<K>>, endpoint: &Endpoint, cfg: &Config) -> Result<Self, TransportError> {
        let service = Arc::new(BusService {
            bus,
            max_frame: cfg.max_frame,
            bindings: Mutex::new(HashMap::new()),
        });
        let reactor = Reactor::bind(endpoint, cfg, Arc::clone(&service) as Arc<dyn ConnectionHandler>)?;
        Ok(Self { service, reactor })
    }

    #[inline]
    pub fn local_endpoint(&self) -> &Endpoint {
        self.reactor.local_endpoint()
    }

    #[inline]
    pub fn bus(&self) -> &Arc<Bus<K>> {
        &self.service.bus
    }

    /// Deactivates `name` and closes every connection bound to it.
    ///
    /// Returns `false` if no such subscriber is loaded.
    pub fn deactivate(&self, name: &str) -> bool {
        let Some(id) = self.service.bus.subscriber(name).map(|s| s.id()) else {
            return false;
        };
        self.service.bus.deactivate(name);
        let tokens: Vec<u64> = self
            .service
            .bindings()
            .iter()
            .filter(|(_, bound)| **bound == id)
            .map(|(token, _)| *token)
            .collect();
        for token in tokens {
            self.reactor.disconnect(token);
        }
        true
    }

    /// Stops the listener and closes every connection.
    pub fn shutdown(&self) {
        self.reactor.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::core::BusBuilder;
    use crate::events::{Event, EventType};
    use crate::subscribers::{HandlerFn, Site, SubscriberRecord};
    use crate::transport::RemoteEndpoint;

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

    fn server(hits: Arc<AtomicUsize>) -> BusServer<EventType> {
        let bus = BusBuilder::<EventType>::new(cfg())
            .with_record(
                SubscriberRecord::new("ext")
                    .with_site(Site::External)
                    .with_endpoint("tcp://127.0.0.1:1".parse().unwrap())
                    .outbound("EV_HOST_ADDED"),
            )
            .with_record(SubscriberRecord::new("sink").inbound("EV_HOST_ADDED"))
            .with_handler(
                "sink",
                HandlerFn::arc("sink", move |_ev: &Event<EventType>, _out: Option<&mut EventOut>| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Status::OK
                }),
            )
            .build()
            .unwrap();
        BusServer::bind(bus, &loopback(), &cfg()).unwrap()
    }

    fn host_added(origin: &str) -> Envelope {
        Envelope::from_event(&Event::new(
            SubscriberId::from_name(origin),
            EventType::HostAdded,
            &b"\x00\x11\x22\x33\x44\x55"[..],
        ))
    }

    #[test]
    fn test_handshake_activates_external_subscriber() {
        let srv = server(Arc::new(AtomicUsize::new(0)));
        assert!(!srv.bus().is_activated("ext"));

        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(client.hello("ext").unwrap(), Status::OK);
        assert!(srv.bus().is_activated("ext"));

        let stranger = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(stranger.hello("nobody").unwrap(), Status::FAILURE);
        srv.shutdown();
    }

    #[test]
    fn test_request_from_bound_connection_is_raised() {
        let hits = Arc::new(AtomicUsize::new(0));
        let srv = server(Arc::clone(&hits));
        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(client.hello("ext").unwrap(), Status::OK);

        let mut out = EventOut::default();
        assert_eq!(client.request(host_added("ext"), Some(&mut out)).unwrap(), Status::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(srv.bus().triggers(EventType::HostAdded), 1);

        client.push(host_added("ext")).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        srv.shutdown();
    }

    #[test]
    fn test_spoofed_origin_is_unauthorized() {
        let hits = Arc::new(AtomicUsize::new(0));
        let srv = server(Arc::clone(&hits));
        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(client.hello("ext").unwrap(), Status::OK);

        let status = client.request(host_added("sink"), None).unwrap();
        assert_eq!(status, Status::UNAUTHORIZED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        srv.shutdown();
    }

    #[test]
    fn test_unbound_connection_cannot_raise() {
        let hits = Arc::new(AtomicUsize::new(0));
        let srv = server(Arc::clone(&hits));
        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());

        let status = client.request(host_added("ext"), None).unwrap();
        assert_eq!(status, Status::UNAUTHORIZED);
        client.push(host_added("ext")).unwrap();

        // a request on the same connection is answered after the push was handled
        assert_eq!(client.request(host_added("sink"), None).unwrap(), Status::UNAUTHORIZED);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(srv.bus().triggers(EventType::HostAdded), 0);
        srv.shutdown();
    }

    #[test]
    fn test_unknown_code_is_answered_with_failure() {
        let srv = server(Arc::new(AtomicUsize::new(0)));
        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(client.hello("ext").unwrap(), Status::OK);
        let envelope = Envelope {
            origin: SubscriberId::from_name("ext"),
            code: u16::MAX,
            payload: Default::default(),
        };
        assert_eq!(client.request(envelope, None).unwrap(), Status::FAILURE);
        srv.shutdown();
    }

    #[test]
    fn test_deactivate_closes_bound_connection() {
        let srv = server(Arc::new(AtomicUsize::new(0)));
        let client = RemoteEndpoint::new(srv.local_endpoint().clone(), &cfg());
        assert_eq!(client.hello("ext").unwrap(), Status::OK);

        assert!(srv.deactivate("ext"));
        assert!(!srv.bus().is_activated("ext"));
        assert!(client.request(host_added("ext"), None).is_err());
        assert!(!client.is_connected());
        assert!(!srv.deactivate("missing"));
        srv.shutdown();
    }
}
