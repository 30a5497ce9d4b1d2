//! # Subscription table.
//!
//! Maps every event type to the ordered list of arena slots that receive it.
//! Built once from the loaded subscribers; immutable afterwards, so dispatch reads
//! it without locking.
//!
//! ## Rules
//! - Chain order = subscriber configuration order.
//! - A subscriber appears at most once per chain.
//! - Internal subscribers without a handler for a type are left out of that chain.

use tracing::warn;

use crate::events::Catalog;
use crate::subscribers::{Site, Subscriber};

/// Per-type dispatch chains.
#[derive(Debug)]
pub struct SubscriptionTable<K> {
    chains: Box<[Box<[usize]>]>,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: Catalog> SubscriptionTable<K> {
    /// Builds chains from the arena, in arena order.
    pub(crate) fn build(arena: &[Subscriber<K>]) -> Self {
        let mut chains: Vec<Vec<usize>> = vec![Vec::new(); K::count()];
        for (slot, sub) in arena.iter().enumerate() {
            for &kind in sub.inbounds() {
                if !sub.serves(kind) {
                    if sub.site() == Site::Internal {
                        warn!(
                            subscriber = sub.name(),
                            event = kind.name(),
                            "no handler registered; left out of chain"
                        );
                    }
                    continue;
                }
                chains[kind.index()].push(slot);
            }
        }
        Self {
            chains: chains.into_iter().map(Vec::into_boxed_slice).collect(),
            _kind: std::marker::PhantomData,
        }
    }

    /// Arena slots subscribed to `kind`, in dispatch order.
    #[inline]
    pub fn chain(&self, kind: K) -> &[usize] {
        &self.chains[kind.index()]
    }

    /// Number of types with at least one subscriber.
    pub fn populated(&self) -> usize {
        self.chains.iter().filter(|c| !c.is_empty()).count()
    }
}
