//! # nosbus
//!
//! **nosbus** is the event backbone of a modular network operating system.
//!
//! Components (OpenFlow engine, topology, host and flow managers, security
//! checks) and applications (learning switch, routing, ACL) never link against
//! each other. They exchange typed events over two statically configured buses:
//! one for component **events**, one for application **app-events**. Both share
//! the same subscription, permission and dispatch rules; only the catalog differs.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌────────────────────┐  ┌────────────────────┐  ┌────────────────────┐
//!   │ SubscriberRecord   │  │ SubscriberRecord   │  │ SubscriberRecord   │
//!   │ (internal, local)  │  │ (internal, local)  │  │ (external, tcp://) │
//!   └─────────┬──────────┘  └─────────┬──────────┘  └─────────┬──────────┘
//!             ▼                       ▼                       ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  BusBuilder (load time)                                               │
//! │  - resolves inbound/outbound names and group tags                     │
//! │  - binds Handle impls to internal subscribers                         │
//! │  - builds one SubscriptionTable chain per event type                  │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  Bus<K> (immutable apart from activation)                             │
//! │  raise(origin, type, payload) ─► chain[type] in configuration order   │
//! └──────┬──────────────────────────┬───────────────────────────┬─────────┘
//!        ▼                          ▼                           ▼
//!   Local handler              Local handler              RemoteEndpoint
//!   (same thread)              (same thread)            ──► SubscriberHost
//!                                                           (epoll Reactor)
//! ```
//!
//! ### Dispatch
//! ```text
//! for subscriber in chain[type]:
//!   ├─► skip if deactivated
//!   ├─► invoke(event, out if WRITE else None)
//!   └─► status != OK
//!         ├─ Gated type && EXECUTE ─► stop, return status
//!         └─ otherwise             ─► log, continue
//! return OK
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                              |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------------|
//! | **Catalogs**      | Event and app-event types with names, groups and classes.    | [`EventType`], [`AppEventType`], [`Catalog`]    |
//! | **Subscribers**   | Hook into the bus with in-process handlers.                  | [`Handle`], [`HandlerFn`], [`HandlerRef`]       |
//! | **Dispatch**      | Ordered, permission-aware, synchronous delivery.             | [`Bus`], [`BusBuilder`], [`Status`]             |
//! | **Access**        | Outbound allow-lists and a guard handler.                    | [`AccessControl`], [`AccessGuard`], [`Perm`]    |
//! | **Transport**     | Out-of-process subscribers over TCP or unix sockets.         | [`BusServer`], [`SubscriberHost`], [`Reactor`]  |
//! | **Errors**        | Typed errors for configuration, dispatch and transport.      | [`ConfigError`], [`DispatchError`], [`TransportError`] |
//! | **Configuration** | Centralize runtime settings.                                 | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a handler that forwards `EV_LOG_*` events to `tracing`.
//!
//! ## Example
//! ```rust
//! use nosbus::{
//!     BusBuilder, Config, Event, EventOut, EventType, HandlerFn, Status, SubscriberRecord,
//! };
//!
//! let learner = HandlerFn::arc("l2_learning", |ev: &Event<EventType>, _out: Option<&mut EventOut>| {
//!     if ev.payload.is_empty() { Status::FAILURE } else { Status::OK }
//! });
//!
//! let bus = BusBuilder::<EventType>::new(Config::default())
//!     .with_record(SubscriberRecord::new("ofp10").outbound("EV_OFP_MSG_IN"))
//!     .with_record(SubscriberRecord::new("l2_learning").inbound("EV_OFP_MSG_IN,r"))
//!     .with_handler("l2_learning", learner)
//!     .build()
//!     .expect("valid configuration");
//!
//! let status = bus.raise_as("ofp10", EventType::OfpMsgIn, &b"\x01\x0a\x00\x08"[..]);
//! assert_eq!(status, Status::OK);
//! assert_eq!(bus.triggers(EventType::OfpMsgIn), 1);
//! ```
mod core;
mod error;
mod events;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use crate::core::{
    Bus, BusBuilder, BusSnapshot, Config, Dispatch, SubscriberSnapshot, SubscriptionTable,
    TriggerCount,
};
pub use error::{ConfigError, DispatchError, TransportError};
pub use events::{
    AppEventType, Catalog, Event, EventClass, EventInfo, EventOut, EventType, Group, Status,
};
pub use subscribers::record;
pub use subscribers::{
    AccessControl, AccessGuard, Handle, HandlerFn, HandlerRef, Kind, Perm, Site, Stats,
    Subscriber, SubscriberId, SubscriberRecord, Triggers, TypeStats, Verdict,
};
pub use transport::frame;
pub use transport::{
    BusServer, Connection, ConnectionHandler, Endpoint, Envelope, Frame, Reactor, Ready,
    ReadyQueue, RemoteEndpoint, Stream, SubscriberHost,
};

// Optional: expose a handler that forwards log events to tracing.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
