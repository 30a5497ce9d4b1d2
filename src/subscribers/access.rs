//! # Outbound access control.
//!
//! [`AccessControl`] holds one record per configured subscriber: its id, its name
//! and the set of types it may raise. It is built once and never changes.
//!
//! [`AccessGuard`] wraps it as an ordinary handler. Configured first in a chain
//! with EXECUTE, a denial becomes a failing, EXECUTE-qualified status and the
//! abort rule stops the chain; the engine needs no special case.
//!
//! ```text
//! raise(origin, EV_X) ─► [guard,x] ─► verify_outbound(origin, EV_X)
//!                                       ├─ Allowed           ─► Status::OK, chain continues
//!                                       ├─ Unauthorized      ─► Status::UNAUTHORIZED (warn)
//!                                       └─ UnknownSubscriber ─► Status::UNKNOWN_SUBSCRIBER (error)
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{error, warn};

use crate::error::{ConfigError, DispatchError};
use crate::events::{Catalog, Event, EventOut, Status};

use super::handler::Handle;
use super::id::SubscriberId;
use super::record::SubscriberRecord;

/// Outcome of an outbound check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Unauthorized,
    UnknownSubscriber,
}

impl Verdict {
    pub fn status(self) -> Status {
        match self {
            Verdict::Allowed => Status::OK,
            Verdict::Unauthorized => Status::UNAUTHORIZED,
            Verdict::UnknownSubscriber => Status::UNKNOWN_SUBSCRIBER,
        }
    }
}

#[derive(Debug)]
struct AccessRecord<K> {
    name: String,
    allowed: HashSet<K>,
}

/// Per-subscriber outbound allow-lists.
#[derive(Debug)]
pub struct AccessControl<K> {
    records: HashMap<SubscriberId, AccessRecord<K>>,
}

impl<K: Catalog> AccessControl<K> {
    /// Builds the allow-lists from configuration records.
    pub fn from_records(records: &[SubscriberRecord]) -> Result<Self, ConfigError> {
        let mut map = HashMap::with_capacity(records.len());
        for rec in records {
            let allowed = rec.resolve_outbounds::<K>()?.into_iter().collect();
            let id = SubscriberId::from_name(&rec.name);
            let prev = map.insert(
                id,
                AccessRecord {
                    name: rec.name.clone(),
                    allowed,
                },
            );
            if prev.is_some() {
                return Err(ConfigError::DuplicateSubscriber {
                    name: rec.name.clone(),
                });
            }
        }
        Ok(Self { records: map })
    }

    /// Checks whether `id` may raise `kind`, logging denials.
    pub fn verify_outbound(&self, id: SubscriberId, kind: K) -> Verdict {
        let Some(rec) = self.records.get(&id) else {
            let err = DispatchError::UnknownSubscriber {
                id,
                event: kind.name(),
            };
            error!(label = err.as_label(), caller = %id, event = kind.name(), "{err}");
            return Verdict::UnknownSubscriber;
        };
        if rec.allowed.contains(&kind) {
            return Verdict::Allowed;
        }
        let err = DispatchError::Unauthorized {
            subscriber: rec.name.clone(),
            event: kind.name(),
        };
        warn!(label = err.as_label(), caller = %rec.name, event = kind.name(), "{err}");
        Verdict::Unauthorized
    }

    /// Name of a known subscriber id.
    pub fn name_of(&self, id: SubscriberId) -> Option<&str> {
        self.records.get(&id).map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Chain interceptor enforcing [`AccessControl`] on the event's origin.
#[derive(Debug)]
pub struct AccessGuard<K> {
    acl: AccessControl<K>,
}

impl<K: Catalog> AccessGuard<K> {
    pub fn new(acl: AccessControl<K>) -> Self {
        Self { acl }
    }

    /// Builds the guard straight from configuration records.
    pub fn from_records(records: &[SubscriberRecord]) -> Result<Self, ConfigError> {
        Ok(Self::new(AccessControl::from_records(records)?))
    }

    #[inline]
    pub fn acl(&self) -> &AccessControl<K> {
        &self.acl
    }
}

impl<K: Catalog> Handle<K> for AccessGuard<K> {
    fn handle(&self, event: &Event<K>, _out: Option<&mut EventOut>) -> Status {
        self.acl.verify_outbound(event.origin, event.kind).status()
    }

    fn name(&self) -> &str {
        "access_guard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;

    fn acl() -> AccessControl<EventType> {
        let recs = vec![
            SubscriberRecord::new("l2_learning").outbound("EV_DP_SEND_PACKET"),
            SubscriberRecord::new("topo_mgmt")
                .outbound("EV_LINK_ADDED")
                .outbound("EV_LINK_DELETED"),
        ];
        AccessControl::from_records(&recs).unwrap()
    }

    #[test]
    fn test_verify_outbound_verdicts() {
        let acl = acl();
        let l2 = SubscriberId::from_name("l2_learning");
        assert_eq!(acl.verify_outbound(l2, EventType::DpSendPacket), Verdict::Allowed);
        assert_eq!(acl.verify_outbound(l2, EventType::DpInsertFlow), Verdict::Unauthorized);
        assert_eq!(
            acl.verify_outbound(SubscriberId::new(1), EventType::DpSendPacket),
            Verdict::UnknownSubscriber
        );
        assert_eq!(acl.name_of(l2), Some("l2_learning"));
    }

    #[test]
    fn test_guard_maps_verdict_to_status() {
        let guard = AccessGuard::new(acl());
        let topo = SubscriberId::from_name("topo_mgmt");
        let ok = Event::new(topo, EventType::LinkAdded, &b""[..]);
        let denied = Event::new(topo, EventType::HostAdded, &b""[..]);
        assert_eq!(guard.handle(&ok, None), Status::OK);
        assert_eq!(guard.handle(&denied, None), Status::UNAUTHORIZED);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let recs = vec![SubscriberRecord::new("log"), SubscriberRecord::new("log")];
        let err = AccessControl::<EventType>::from_records(&recs).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSubscriber { .. }));
    }
}
