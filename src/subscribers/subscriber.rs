//! # Loaded subscriber.
//!
//! A [`Subscriber`] is one component or application as the bus sees it after
//! load: identity, permissions, where its handler lives, and its counters.
//! Everything except `activated` is fixed for the life of the process.
//!
//! ## Invocation
//! ```text
//! Internal ─► catch_unwind(handler.handle(event, out))           (caller's thread)
//! External ─► WRITE or EXECUTE ─► RemoteEndpoint::request (blocks ≤ reply_timeout)
//!             otherwise        ─► RemoteEndpoint::push   (fire and forget)
//!             transport error  ─► Status::TRANSPORT + deactivate
//!             oversized frame  ─► Status::TRANSPORT, stays active
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tracing::info;

use crate::error::{DispatchError, TransportError};
use crate::events::{Catalog, Event, EventOut, Status};
use crate::transport::{Endpoint, Envelope, RemoteEndpoint};

use super::handler::HandlerRef;
use super::id::SubscriberId;
use super::perm::Perm;
use super::record::{Kind, Site};
use super::stats::Stats;

/// Where a subscriber's handler lives.
pub(crate) enum Target<K: Catalog> {
    Local {
        fallback: Option<HandlerRef<K>>,
        by_kind: HashMap<K, HandlerRef<K>>,
    },
    Remote(RemoteEndpoint),
}

impl<K: Catalog> Target<K> {
    fn local_for(&self, kind: K) -> Option<&HandlerRef<K>> {
        match self {
            Target::Local { fallback, by_kind } => by_kind.get(&kind).or(fallback.as_ref()),
            Target::Remote(_) => None,
        }
    }
}

/// A loaded component or application.
pub struct Subscriber<K: Catalog> {
    id: SubscriberId,
    name: String,
    args: String,
    kind: Kind,
    site: Site,
    activated: AtomicBool,
    perms: Box<[Perm]>,
    inbounds: Vec<K>,
    outbounds: Vec<K>,
    target: Target<K>,
    stats: Stats<K>,
}

/// Construction parameters, filled by the bus builder.
pub(crate) struct SubscriberParts<K: Catalog> {
    pub name: String,
    pub args: String,
    pub kind: Kind,
    pub site: Site,
    pub activated: bool,
    pub inbounds: Vec<(K, Perm)>,
    pub outbounds: Vec<K>,
    pub target: Target<K>,
}

impl<K: Catalog> Subscriber<K> {
    pub(crate) fn new(parts: SubscriberParts<K>) -> Self {
        let mut perms = vec![Perm::empty(); K::count()].into_boxed_slice();
        for &(kind, perm) in &parts.inbounds {
            perms[kind.index()] = perm;
        }
        Self {
            id: SubscriberId::from_name(&parts.name),
            name: parts.name,
            args: parts.args,
            kind: parts.kind,
            site: parts.site,
            activated: AtomicBool::new(parts.activated),
            perms,
            inbounds: parts.inbounds.into_iter().map(|(k, _)| k).collect(),
            outbounds: parts.outbounds,
            target: parts.target,
            stats: Stats::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn args(&self) -> &str {
        &self.args
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn site(&self) -> Site {
        self.site
    }

    #[inline]
    pub fn is_activated(&self) -> bool {
        self.activated.load(AtomicOrdering::Acquire)
    }

    /// Sets activation; returns the previous value.
    pub fn set_activated(&self, on: bool) -> bool {
        let prev = self.activated.swap(on, AtomicOrdering::AcqRel);
        if prev != on {
            info!(subscriber = %self.name, activated = on, "activation changed");
        }
        prev
    }

    /// Permission bits for `kind`; empty when not subscribed.
    #[inline]
    pub fn perm(&self, kind: K) -> Perm {
        self.perms[kind.index()]
    }

    /// Inbound types in configuration order.
    pub fn inbounds(&self) -> &[K] {
        &self.inbounds
    }

    /// Types this subscriber may raise.
    pub fn outbounds(&self) -> &[K] {
        &self.outbounds
    }

    #[inline]
    pub fn stats(&self) -> &Stats<K> {
        &self.stats
    }

    /// Whether a handler or endpoint can serve `kind`.
    pub(crate) fn serves(&self, kind: K) -> bool {
        match &self.target {
            Target::Local { .. } => self.target.local_for(kind).is_some(),
            Target::Remote(_) => true,
        }
    }

    /// Endpoint of an external subscriber.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match &self.target {
            Target::Remote(r) => Some(r.endpoint()),
            Target::Local { .. } => None,
        }
    }

    /// Runs this subscriber for one event.
    ///
    /// `out` must already be filtered by WRITE. Errors carry the status the chain
    /// should see.
    pub(crate) fn invoke(
        &self,
        event: &Event<K>,
        out: Option<&mut EventOut>,
    ) -> Result<(), DispatchError> {
        let status = match &self.target {
            Target::Local { .. } => {
                let Some(handler) = self.target.local_for(event.kind) else {
                    return Ok(());
                };
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event, out))).map_err(
                    |payload| DispatchError::HandlerPanicked {
                        subscriber: self.name.clone(),
                        event: event.kind.name(),
                        info: panic_message(payload.as_ref()),
                    },
                )?
            }
            Target::Remote(remote) => self.invoke_remote(remote, event, out)?,
        };

        if status.is_ok() {
            Ok(())
        } else {
            Err(DispatchError::HandlerFailure {
                subscriber: self.name.clone(),
                event: event.kind.name(),
                status,
            })
        }
    }

    fn invoke_remote(
        &self,
        remote: &RemoteEndpoint,
        event: &Event<K>,
        out: Option<&mut EventOut>,
    ) -> Result<Status, DispatchError> {
        let envelope = Envelope::from_event(event);
        let answer = if self.perm(event.kind).intersects(Perm::WRITE | Perm::EXECUTE) {
            remote.request(envelope, out)
        } else {
            remote.push(envelope).map(|()| Status::OK)
        };
        answer.map_err(|source| {
            if !matches!(source, TransportError::FrameTooLarge { .. }) {
                self.set_activated(false);
            }
            DispatchError::TransportFailure {
                subscriber: self.name.clone(),
                event: event.kind.name(),
                source,
            }
        })
    }
}

impl<K: Catalog> std::fmt::Debug for Subscriber<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("site", &self.site)
            .field("activated", &self.is_activated())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
