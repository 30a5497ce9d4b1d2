//! # Dispatch engine.
//!
//! [`Bus`] owns the subscriber arena and the subscription table and implements
//! `raise()`. One generic engine serves both buses: `Bus<EventType>` for
//! components and `Bus<AppEventType>` for applications.
//!
//! ## Dispatch
//! ```text
//! raise(origin, type, payload)
//!   ├─ chain empty ─► Status::OK
//!   ├─ triggers[type] += 1
//!   └─ for slot in chain (configuration order):
//!        ├─ deactivated ─► skip
//!        ├─ invocations[type] += 1
//!        ├─ invoke(event, out if WRITE else None)
//!        ├─ latency[type] += elapsed
//!        └─ status != 0:
//!             ├─ Gated && EXECUTE ─► stop, return status
//!             └─ otherwise        ─► log, continue
//!   Status::OK
//! ```
//!
//! ## Rules
//! - `raise()` is synchronous; it returns after the chain is exhausted or aborted.
//! - Each call owns its out-structure; concurrent calls share nothing but atomics.
//! - Only `activated` changes at runtime; chains never change length or order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use crate::events::{Catalog, Event, EventOut, Status};
use crate::subscribers::{Perm, Site, Subscriber, SubscriberId, Triggers, TypeStats};

use super::config::Config;
use super::table::SubscriptionTable;

/// Result of [`Bus::request`]: the chain status and the shared out-structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub status: Status,
    pub out: EventOut,
}

/// Trigger count of one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerCount<K> {
    pub event: K,
    pub count: u64,
}

/// Counters of one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberSnapshot<K> {
    pub name: String,
    pub id: SubscriberId,
    pub site: Site,
    pub activated: bool,
    pub events: Vec<TypeStats<K>>,
}

/// Point-in-time counters of a whole bus, for monitoring tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusSnapshot<K> {
    pub bus: &'static str,
    pub triggers: Vec<TriggerCount<K>>,
    pub subscribers: Vec<SubscriberSnapshot<K>>,
}

/// Statically configured event bus.
pub struct Bus<K: Catalog> {
    cfg: Config,
    arena: Box<[Subscriber<K>]>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<SubscriberId, usize>,
    table: SubscriptionTable<K>,
    triggers: Triggers<K>,
}

impl<K: Catalog> Bus<K> {
    pub(crate) fn new(cfg: Config, arena: Vec<Subscriber<K>>) -> Self {
        let by_name = arena
            .iter()
            .enumerate()
            .map(|(slot, s)| (s.name().to_string(), slot))
            .collect();
        let by_id = arena
            .iter()
            .enumerate()
            .map(|(slot, s)| (s.id(), slot))
            .collect();
        let table = SubscriptionTable::build(&arena);
        info!(
            bus = K::LABEL,
            subscribers = arena.len(),
            types = table.populated(),
            "bus loaded"
        );
        Self {
            cfg,
            arena: arena.into_boxed_slice(),
            by_name,
            by_id,
            table,
            triggers: Triggers::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Raises an event and returns the chain status.
    pub fn raise(&self, origin: SubscriberId, kind: K, payload: impl Into<Bytes>) -> Status {
        let event = Event::new(origin, kind, payload);
        let mut out = EventOut::for_event(&event);
        self.dispatch(&event, &mut out)
    }

    /// Raises an event on behalf of a named subscriber.
    pub fn raise_as(&self, origin: &str, kind: K, payload: impl Into<Bytes>) -> Status {
        self.raise(SubscriberId::from_name(origin), kind, payload)
    }

    /// Raises an event and returns the out-structure along with the status.
    pub fn request(&self, origin: SubscriberId, kind: K, payload: impl Into<Bytes>) -> Dispatch {
        let event = Event::new(origin, kind, payload);
        let mut out = EventOut::for_event(&event);
        let status = self.dispatch(&event, &mut out);
        Dispatch { status, out }
    }

    /// Walks the chain of `event.kind` with a caller-supplied out-structure.
    pub fn dispatch(&self, event: &Event<K>, out: &mut EventOut) -> Status {
        let kind = event.kind;
        let chain = self.table.chain(kind);
        if chain.is_empty() {
            return Status::OK;
        }
        self.triggers.hit(kind);
        let gated = kind.is_gated();

        for &slot in chain {
            let sub = &self.arena[slot];
            if !sub.is_activated() {
                continue;
            }
            let perm = sub.perm(kind);
            let view = if perm.contains(Perm::WRITE) {
                Some(&mut *out)
            } else {
                None
            };

            sub.stats().invoked(kind);
            let started = Instant::now();
            let res = sub.invoke(event, view);
            sub.stats().finished(kind, started.elapsed(), res.is_err());

            let Err(err) = res else {
                continue;
            };
            let status = err.status();
            if gated && perm.contains(Perm::EXECUTE) {
                warn!(
                    label = err.as_label(),
                    subscriber = sub.name(),
                    event = kind.name(),
                    status = status.code(),
                    "chain aborted: {err}"
                );
                return status;
            }
            info!(
                label = err.as_label(),
                subscriber = sub.name(),
                event = kind.name(),
                status = status.code(),
                "failure absorbed: {err}"
            );
        }
        Status::OK
    }

    /// Loaded subscriber by name.
    pub fn subscriber(&self, name: &str) -> Option<&Subscriber<K>> {
        self.by_name.get(name).map(|&slot| &self.arena[slot])
    }

    /// Loaded subscriber by id.
    pub fn subscriber_by_id(&self, id: SubscriberId) -> Option<&Subscriber<K>> {
        self.by_id.get(&id).map(|&slot| &self.arena[slot])
    }

    /// All subscribers in configuration order.
    pub fn subscribers(&self) -> impl Iterator<Item = &Subscriber<K>> {
        self.arena.iter()
    }

    /// Subscriber names receiving `kind`, in dispatch order.
    pub fn chain(&self, kind: K) -> Vec<&str> {
        self.table
            .chain(kind)
            .iter()
            .map(|&slot| self.arena[slot].name())
            .collect()
    }

    /// Activates a subscriber; returns `false` if the name is unknown.
    pub fn activate(&self, name: &str) -> bool {
        self.set_activated(name, true)
    }

    /// Deactivates a subscriber; returns `false` if the name is unknown.
    pub fn deactivate(&self, name: &str) -> bool {
        self.set_activated(name, false)
    }

    fn set_activated(&self, name: &str, on: bool) -> bool {
        match self.subscriber(name) {
            Some(sub) => {
                sub.set_activated(on);
                true
            }
            None => false,
        }
    }

    pub fn is_activated(&self, name: &str) -> bool {
        self.subscriber(name).is_some_and(Subscriber::is_activated)
    }

    /// Activates an external subscriber that announced itself.
    ///
    /// Both the id and the name must match one loaded external record.
    pub fn handshake(&self, id: SubscriberId, name: &str) -> Status {
        match self.subscriber_by_id(id) {
            Some(sub) if sub.name() == name && sub.site() == Site::External => {
                sub.set_activated(true);
                Status::OK
            }
            _ => {
                warn!(bus = K::LABEL, id = %id, name, "handshake rejected");
                Status::FAILURE
            }
        }
    }

    /// Global trigger count of `kind`.
    pub fn triggers(&self, kind: K) -> u64 {
        self.triggers.get(kind)
    }

    /// Cumulative latency of one subscriber for `kind`.
    pub fn latency(&self, name: &str, kind: K) -> Option<Duration> {
        self.subscriber(name).map(|s| s.stats().latency(kind))
    }

    pub fn snapshot(&self) -> BusSnapshot<K> {
        BusSnapshot {
            bus: K::LABEL,
            triggers: self
                .triggers
                .snapshot()
                .into_iter()
                .map(|(event, count)| TriggerCount { event, count })
                .collect(),
            subscribers: self
                .arena
                .iter()
                .map(|s| SubscriberSnapshot {
                    name: s.name().to_string(),
                    id: s.id(),
                    site: s.site(),
                    activated: s.is_activated(),
                    events: s.stats().snapshot(),
                })
                .collect(),
        }
    }
}

impl<K: Catalog> std::fmt::Debug for Bus<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("catalog", &K::LABEL)
            .field("subscribers", &self.arena.len())
            .finish_non_exhaustive()
    }
}
