//! # Subscribers: components and applications on the bus.
//!
//! This module provides the [`Handle`] trait every in-process subscriber
//! implements, and the load-time model of a subscriber.
//!
//! ## Architecture
//! ```text
//! SubscriberRecord (config) ──► BusBuilder ──► Subscriber (arena slot)
//!                                                 ├─ id = hash(name)
//!                                                 ├─ perms[type] : Perm
//!                                                 ├─ target : Local(Handle) | Remote(endpoint)
//!                                                 ├─ activated : AtomicBool
//!                                                 └─ stats : per-type counters
//!
//! AccessControl (outbound allow-lists) ──► AccessGuard (first in chain, EXECUTE)
//! ```
//!
//! ## Subscriber types
//! - **Internal**: called directly on the raising thread
//! - **External**: reached through the transport; starts deactivated until it
//!   completes a handshake

mod access;
mod handler;
mod id;
mod perm;
pub mod record;
mod stats;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

pub use access::{AccessControl, AccessGuard, Verdict};
pub use handler::{Handle, HandlerFn, HandlerRef};
pub use id::SubscriberId;
pub use perm::Perm;
pub use record::{Kind, Site, SubscriberRecord};
pub use stats::{Stats, Triggers, TypeStats};
pub use subscriber::Subscriber;
pub(crate) use subscriber::{SubscriberParts, Target};

#[cfg(feature = "logging")]
pub use log::LogWriter;
