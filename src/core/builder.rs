use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use crate::core::{Bus, Config};
use crate::error::ConfigError;
use crate::events::Catalog;
use crate::subscribers::{
    HandlerRef, Site, Subscriber, SubscriberId, SubscriberParts, SubscriberRecord, Target,
};
use crate::transport::RemoteEndpoint;

/// Builder for constructing a [`Bus`] from configuration records and handlers.
///
/// Handlers are bound at load time only; the built bus is immutable apart from
/// subscriber activation.
pub struct BusBuilder<K: Catalog> {
    cfg: Config,
    records: Vec<SubscriberRecord>,
    fallbacks: HashMap<String, HandlerRef<K>>,
    per_kind: Vec<(String, K, HandlerRef<K>)>,
}

impl<K: Catalog> BusBuilder<K> {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            records: Vec::new(),
            fallbacks: HashMap::new(),
            per_kind: Vec::new(),
        }
    }

    /// Appends configuration records; their order is the dispatch order.
    pub fn with_records(mut self, records: impl IntoIterator<Item = SubscriberRecord>) -> Self {
        self.records.extend(records);
        self
    }

    pub fn with_record(mut self, record: SubscriberRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Binds a handler for every inbound type of an internal subscriber.
    pub fn with_handler(mut self, name: impl Into<String>, handler: HandlerRef<K>) -> Self {
        self.fallbacks.insert(name.into(), handler);
        self
    }

    /// Binds a handler for one inbound type; wins over [`Self::with_handler`].
    pub fn register_handler(
        mut self,
        name: impl Into<String>,
        kind: K,
        handler: HandlerRef<K>,
    ) -> Self {
        self.per_kind.push((name.into(), kind, handler));
        self
    }

    /// Validates the configuration and builds the bus.
    ///
    /// Fails on empty or duplicate names, names that hash to the same id,
    /// unknown event names, bad permission letters, external records without an
    /// endpoint, and handlers bound to names or types no internal record declares.
    pub fn build(mut self) -> Result<Arc<Bus<K>>, ConfigError> {
        let mut seen = HashSet::with_capacity(self.records.len());
        for (index, rec) in self.records.iter().enumerate() {
            if rec.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(rec.name.as_str()) {
                return Err(ConfigError::DuplicateSubscriber {
                    name: rec.name.clone(),
                });
            }
        }
        check_ids(
            self.records
                .iter()
                .map(|r| (r.name.as_str(), SubscriberId::from_name(&r.name))),
        )?;

        let internal: HashSet<&str> = self
            .records
            .iter()
            .filter(|r| r.site == Site::Internal)
            .map(|r| r.name.as_str())
            .collect();
        let stray = self
            .fallbacks
            .keys()
            .chain(self.per_kind.iter().map(|(name, _, _)| name))
            .find(|name| !internal.contains(name.as_str()));
        if let Some(name) = stray {
            return Err(ConfigError::UnknownHandler { name: name.clone() });
        }

        let mut arena = Vec::with_capacity(self.records.len());
        for rec in &self.records {
            let inbounds = rec.resolve_inbounds::<K>()?;
            let outbounds = rec.resolve_outbounds::<K>()?;

            let target = match rec.site {
                Site::Internal => {
                    let mut by_kind = HashMap::new();
                    for (_, kind, handler) in self.per_kind.iter().filter(|(n, _, _)| *n == rec.name) {
                        if !inbounds.iter().any(|(k, _)| k == kind) {
                            return Err(ConfigError::NotSubscribed {
                                subscriber: rec.name.clone(),
                                event: kind.name(),
                            });
                        }
                        by_kind.insert(*kind, Arc::clone(handler));
                    }
                    let fallback = self.fallbacks.remove(&rec.name);
                    if fallback.is_none() && by_kind.is_empty() && !inbounds.is_empty() {
                        warn!(subscriber = %rec.name, "internal subscriber has no handler");
                    }
                    Target::Local { fallback, by_kind }
                }
                Site::External => {
                    let endpoint = rec.endpoint.clone().ok_or_else(|| {
                        ConfigError::MissingEndpoint {
                            subscriber: rec.name.clone(),
                        }
                    })?;
                    Target::Remote(RemoteEndpoint::new(endpoint, &self.cfg))
                }
            };

            arena.push(Subscriber::new(SubscriberParts {
                name: rec.name.clone(),
                args: rec.args.clone(),
                kind: rec.kind,
                site: rec.site,
                activated: rec.initially_activated(),
                inbounds,
                outbounds,
                target,
            }));
        }

        Ok(Arc::new(Bus::new(self.cfg, arena)))
    }
}

/// Fails if two names map to one id.
fn check_ids<'a>(
    ids: impl IntoIterator<Item = (&'a str, SubscriberId)>,
) -> Result<(), ConfigError> {
    let mut owners: HashMap<SubscriberId, &str> = HashMap::new();
    for (name, id) in ids {
        if let Some(first) = owners.insert(id, name) {
            return Err(ConfigError::IdCollision {
                first: first.to_owned(),
                second: name.to_owned(),
                id,
            });
        }
    }
    Ok(())
}
