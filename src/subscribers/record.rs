//! # Subscriber configuration records.
//!
//! A [`SubscriberRecord`] is one entry of the ordered subscriber list. The list
//! order is the dispatch order of every chain built from it.
//!
//! ```json
//! [
//!   { "name": "cac", "site": "internal",
//!     "inbounds": ["ALL_DOWNSTREAM,x", "WRITE_INTSTREAM,x"], "outbounds": [] },
//!   { "name": "l2_learning", "site": "external", "endpoint": "tcp://127.0.0.1:6001",
//!     "inbounds": ["EV_DP_RECEIVE_PACKET,rw"], "outbounds": ["EV_DP_SEND_PACKET"] }
//! ]
//! ```
//!
//! ## Rules
//! - Inbound entry: `NAME[,perm]`, `NAME` being a type or a group tag.
//! - Entry without suffix takes the record `perm`, else READ.
//! - `NONE` ends a list.
//! - Group tags are inbound-only.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::events::Catalog;
use crate::transport::Endpoint;

use super::perm::Perm;

/// Terminator entry.
const NONE: &str = "NONE";

/// Scheduling kind of a subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Runs only when an event reaches it.
    #[default]
    General,
    /// Also runs its own loop next to the bus.
    Autonomous,
}

/// Where a subscriber runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// In this process, called directly.
    #[default]
    Internal,
    /// In another process or host, reached through the transport.
    External,
}

/// One configured subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    pub name: String,
    #[serde(default)]
    pub args: String,
    #[serde(default, rename = "type")]
    pub kind: Kind,
    #[serde(default)]
    pub site: Site,
    /// Default letters for inbound entries without a suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perm: Option<String>,
    #[serde(default)]
    pub inbounds: Vec<String>,
    #[serde(default)]
    pub outbounds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Initial activation; internal subscribers default to active, external ones
    /// wait for a handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated: Option<bool>,
}

impl SubscriberRecord {
    /// Internal subscriber with no inbounds or outbounds yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_site(mut self, site: Site) -> Self {
        self.site = site;
        self
    }

    #[inline]
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    #[inline]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    #[inline]
    pub fn with_perm(mut self, letters: impl Into<String>) -> Self {
        self.perm = Some(letters.into());
        self
    }

    /// Appends an inbound entry (`"EV_X"`, `"EV_X,rwx"`, `"ALL_UPSTREAM,x"`).
    #[inline]
    pub fn inbound(mut self, entry: impl Into<String>) -> Self {
        self.inbounds.push(entry.into());
        self
    }

    #[inline]
    pub fn outbound(mut self, entry: impl Into<String>) -> Self {
        self.outbounds.push(entry.into());
        self
    }

    #[inline]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[inline]
    pub fn with_activated(mut self, on: bool) -> Self {
        self.activated = Some(on);
        self
    }

    /// Initial activation after applying the site default.
    pub fn initially_activated(&self) -> bool {
        self.activated.unwrap_or(self.site == Site::Internal)
    }

    fn default_perm(&self) -> Result<Perm, ConfigError> {
        match &self.perm {
            None => Ok(Perm::READ),
            Some(letters) => Perm::parse(letters)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ConfigError::InvalidPermission {
                    subscriber: self.name.clone(),
                    entry: letters.clone(),
                }),
        }
    }

    /// Expands inbound entries into `(type, permission)` pairs.
    ///
    /// Order follows first appearance; repeats union their permissions.
    pub fn resolve_inbounds<K: Catalog>(&self) -> Result<Vec<(K, Perm)>, ConfigError> {
        let fallback = self.default_perm()?;
        let mut out: Vec<(K, Perm)> = Vec::new();

        for raw in &self.inbounds {
            let (name, letters) = match raw.split_once(',') {
                Some((n, p)) => (n.trim(), Some(p)),
                None => (raw.trim(), None),
            };
            if is_none(name, K::PREFIX) {
                break;
            }

            let perm = match letters {
                None => fallback,
                Some(p) => Perm::parse(p).filter(|p| !p.is_empty()).ok_or_else(|| {
                    ConfigError::InvalidPermission {
                        subscriber: self.name.clone(),
                        entry: raw.clone(),
                    }
                })?,
            };

            let kinds = match K::expand_tag(name) {
                Some(group) => group,
                None => vec![K::from_name(name).ok_or_else(|| ConfigError::UnknownEvent {
                    subscriber: self.name.clone(),
                    entry: raw.clone(),
                })?],
            };

            for kind in kinds {
                match out.iter_mut().find(|(k, _)| *k == kind) {
                    Some((_, held)) => *held |= perm,
                    None => out.push((kind, perm)),
                }
            }
        }
        Ok(out)
    }

    /// Resolves outbound entries; group tags are rejected.
    pub fn resolve_outbounds<K: Catalog>(&self) -> Result<Vec<K>, ConfigError> {
        let mut out = Vec::new();
        for raw in &self.outbounds {
            let name = raw.trim();
            if is_none(name, K::PREFIX) {
                break;
            }
            if K::expand_tag(name).is_some() {
                return Err(ConfigError::GroupNotAllowed {
                    subscriber: self.name.clone(),
                    entry: raw.clone(),
                });
            }
            let kind = K::from_name(name).ok_or_else(|| ConfigError::UnknownEvent {
                subscriber: self.name.clone(),
                entry: raw.clone(),
            })?;
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        Ok(out)
    }
}

fn is_none(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix).unwrap_or(name) == NONE
}

/// Parses an ordered JSON array of records.
pub fn from_json_str(json: &str) -> Result<Vec<SubscriberRecord>, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Reads and parses an ordered JSON array of records.
pub fn from_json_path(path: impl AsRef<Path>) -> Result<Vec<SubscriberRecord>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    from_json_str(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AppEventType, EventType};

    #[test]
    fn test_inbound_suffix_and_default_perm() {
        let rec = SubscriberRecord::new("flow_mgmt")
            .inbound("EV_DP_INSERT_FLOW,rwx")
            .inbound("EV_FLOW_ADDED");
        let inb = rec.resolve_inbounds::<EventType>().unwrap();
        assert_eq!(
            inb,
            vec![
                (EventType::DpInsertFlow, Perm::all()),
                (EventType::FlowAdded, Perm::READ),
            ]
        );

        let rec = SubscriberRecord::new("x").with_perm("rw").inbound("EV_FLOW_ADDED");
        let inb = rec.resolve_inbounds::<EventType>().unwrap();
        assert_eq!(inb, vec![(EventType::FlowAdded, Perm::READ | Perm::WRITE)]);
    }

    #[test]
    fn test_group_expansion_keeps_first_position_and_unions() {
        let rec = SubscriberRecord::new("cac")
            .inbound("EV_SW_GET_FD,w")
            .inbound("WRITE_INTSTREAM,x");
        let inb = rec.resolve_inbounds::<EventType>().unwrap();
        assert_eq!(inb[0], (EventType::SwGetFd, Perm::WRITE | Perm::EXECUTE));
        assert_eq!(inb[1], (EventType::SwGetDpid, Perm::EXECUTE));
        assert_eq!(inb.len(), 3);
    }

    #[test]
    fn test_none_terminates_list() {
        let rec = SubscriberRecord::new("log")
            .inbound("EV_LOG_INFO")
            .inbound("EV_NONE")
            .inbound("EV_LOG_ERROR");
        let inb = rec.resolve_inbounds::<EventType>().unwrap();
        assert_eq!(inb, vec![(EventType::LogInfo, Perm::READ)]);
    }

    #[test]
    fn test_unknown_names_and_letters_are_errors() {
        let rec = SubscriberRecord::new("bad").inbound("EV_SW_GET_COFFEE");
        let err = rec.resolve_inbounds::<EventType>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEvent { .. }));

        let rec = SubscriberRecord::new("bad").inbound("EV_SW_GET_FD,rz");
        let err = rec.resolve_inbounds::<EventType>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPermission { .. }));

        let rec = SubscriberRecord::new("bad").outbound("ALL_UPSTREAM");
        let err = rec.resolve_outbounds::<EventType>().unwrap_err();
        assert!(matches!(err, ConfigError::GroupNotAllowed { .. }));
    }

    #[test]
    fn test_catalog_prefix_is_enforced() {
        let rec = SubscriberRecord::new("app").inbound("AV_HOST_ADDED");
        assert!(rec.resolve_inbounds::<EventType>().is_err());
        let inb = rec.resolve_inbounds::<AppEventType>().unwrap();
        assert_eq!(inb, vec![(AppEventType::HostAdded, Perm::READ)]);
    }

    #[test]
    fn test_json_records_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("components.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "cac", "type": "general", "site": "internal",
                 "inbounds": ["ALL_DOWNSTREAM,x"], "outbounds": ["EV_LOG_WARN"]},
                {"name": "l2", "site": "external", "endpoint": "ipc:///tmp/l2.sock",
                 "inbounds": ["EV_DP_RECEIVE_PACKET"]}
            ]"#,
        )
        .unwrap();

        let recs = from_json_path(&path).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "cac");
        assert!(recs[0].initially_activated());
        assert_eq!(recs[1].site, Site::External);
        assert!(!recs[1].initially_activated());
        assert!(matches!(recs[1].endpoint, Some(Endpoint::Unix(_))));
    }

    #[test]
    fn test_json_errors_surface_as_parse() {
        let err = from_json_str("[{\"site\": \"orbit\"}]").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }
}
