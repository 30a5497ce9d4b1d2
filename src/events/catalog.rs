//! # Event catalogs.
//!
//! A [`Catalog`] is a fixed, compile-time set of event types backed by one lookup
//! table. Each row states the type's symbolic name, its [`Group`] and its
//! [`EventClass`], so classification never depends on numeric ranges.
//!
//! ## Rules
//! - Row order equals variant order; `code = index + 1` (`0` is reserved for "none").
//! - Names carry the catalog prefix (`EV_`, `AV_`); lookups accept names with or
//!   without it.
//! - Group tags (`ALL_UPSTREAM`, ...) expand to every type of the matching groups.
//!
//! ```text
//! ALL_UPSTREAM     ─► Group::Upstream
//! ALL_DOWNSTREAM   ─► Group::Downstream
//! WRITE_INTSTREAM  ─► Group::Request
//! ALL_INTSTREAM    ─► Group::Internal
//! ```

use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;

/// Whether a failing, EXECUTE-permitted subscriber can stop the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// Request/response: an EXECUTE-qualified failure aborts the chain.
    Gated,
    /// Broadcast: the chain always runs to completion.
    Notify,
}

/// Stream a type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// Datapath to controller.
    Upstream,
    /// Controller to datapath.
    Downstream,
    /// Internal request/response.
    Request,
    /// Internal notification.
    Internal,
    /// Log records.
    Log,
}

impl Group {
    /// Groups covered by a symbolic configuration tag (prefix already stripped).
    pub fn from_tag(tag: &str) -> Option<&'static [Group]> {
        match tag {
            "ALL_UPSTREAM" => Some(&[Group::Upstream]),
            "ALL_DOWNSTREAM" => Some(&[Group::Downstream]),
            "WRITE_INTSTREAM" => Some(&[Group::Request]),
            "ALL_INTSTREAM" => Some(&[Group::Internal]),
            _ => None,
        }
    }
}

/// One catalog row.
#[derive(Debug)]
pub struct EventInfo<K: 'static> {
    pub kind: K,
    pub name: &'static str,
    pub group: Group,
    pub class: EventClass,
}

/// A fixed event-type catalog.
///
/// Implementors supply the table and the variant index; everything else has a
/// default built on them.
pub trait Catalog: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Name prefix of every type in this catalog (`"EV_"` or `"AV_"`).
    const PREFIX: &'static str;

    /// Human-readable catalog name for logs.
    const LABEL: &'static str;

    /// Lookup table, in variant order.
    fn table() -> &'static [EventInfo<Self>];

    /// Position of this variant in [`Catalog::table`].
    fn index(self) -> usize;

    #[inline]
    fn info(self) -> &'static EventInfo<Self> {
        &Self::table()[self.index()]
    }

    #[inline]
    fn name(self) -> &'static str {
        self.info().name
    }

    #[inline]
    fn group(self) -> Group {
        self.info().group
    }

    #[inline]
    fn class(self) -> EventClass {
        self.info().class
    }

    #[inline]
    fn is_gated(self) -> bool {
        self.class() == EventClass::Gated
    }

    /// Stable wire code (1-based).
    #[inline]
    fn code(self) -> u16 {
        (self.index() + 1) as u16
    }

    fn from_code(code: u16) -> Option<Self> {
        let idx = usize::from(code).checked_sub(1)?;
        Self::table().get(idx).map(|row| row.kind)
    }

    /// Resolves a symbolic name, with or without the catalog prefix.
    fn from_name(name: &str) -> Option<Self> {
        let bare = name.strip_prefix(Self::PREFIX).unwrap_or(name);
        Self::table()
            .iter()
            .find(|row| &row.name[Self::PREFIX.len()..] == bare)
            .map(|row| row.kind)
    }

    /// Expands a group tag (with or without prefix) to its concrete types.
    fn expand_tag(tag: &str) -> Option<Vec<Self>> {
        let bare = tag.strip_prefix(Self::PREFIX).unwrap_or(tag);
        let groups = Group::from_tag(bare)?;
        Some(
            Self::table()
                .iter()
                .filter(|row| groups.contains(&row.group))
                .map(|row| row.kind)
                .collect(),
        )
    }

    fn all() -> Vec<Self> {
        Self::table().iter().map(|row| row.kind).collect()
    }

    /// Number of types in the catalog.
    #[inline]
    fn count() -> usize {
        Self::table().len()
    }
}
