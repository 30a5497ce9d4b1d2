//! # Component events and application events.
//!
//! [`EventType`] is the catalog of the component bus; [`AppEventType`] is the
//! catalog of the application bus. Both are generated from one row list each,
//! so the enum, its names and its classification cannot drift apart.
//!
//! ## Classification
//! | Group        | Class  | Examples                                     |
//! |--------------|--------|----------------------------------------------|
//! | `Upstream`   | Gated  | `EV_DP_RECEIVE_PACKET`, `AV_DP_PORT_ADDED`   |
//! | `Downstream` | Gated  | `EV_DP_INSERT_FLOW`, `AV_DP_SEND_PACKET`     |
//! | `Request`    | Gated  | `EV_SW_GET_DPID`, `AV_HOST_GET_INFO`         |
//! | `Internal`   | Notify | `EV_SW_CONNECTED`, `AV_LINK_ADDED`           |
//! | `Log`        | Notify | `EV_LOG_INFO`, `AV_LOG_ERROR`                |

use std::fmt;

use serde::Serialize;

use super::catalog::{Catalog, EventClass, EventInfo, Group};

macro_rules! catalog {
    (
        $(#[$meta:meta])*
        $ty:ident, $table:ident, prefix = $prefix:literal, label = $label:literal;
        $( $variant:ident => $name:literal, $group:ident, $class:ident; )+
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum $ty {
            $( $variant, )+
        }

        static $table: &[EventInfo<$ty>] = &[
            $( EventInfo {
                kind: $ty::$variant,
                name: $name,
                group: Group::$group,
                class: EventClass::$class,
            }, )+
        ];

        impl Catalog for $ty {
            const PREFIX: &'static str = $prefix;
            const LABEL: &'static str = $label;

            #[inline]
            fn table() -> &'static [EventInfo<Self>] {
                $table
            }

            #[inline]
            fn index(self) -> usize {
                self as usize
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.name())
            }
        }
    };
}

catalog! {
    /// Events exchanged between components.
    EventType, EVENT_TABLE, prefix = "EV_", label = "event";

    OfpMsgIn => "EV_OFP_MSG_IN", Upstream, Gated;
    DpReceivePacket => "EV_DP_RECEIVE_PACKET", Upstream, Gated;
    DpFlowExpired => "EV_DP_FLOW_EXPIRED", Upstream, Gated;
    DpFlowDeleted => "EV_DP_FLOW_DELETED", Upstream, Gated;
    DpFlowStats => "EV_DP_FLOW_STATS", Upstream, Gated;
    DpAggregateStats => "EV_DP_AGGREGATE_STATS", Upstream, Gated;
    DpPortAdded => "EV_DP_PORT_ADDED", Upstream, Gated;
    DpPortModified => "EV_DP_PORT_MODIFIED", Upstream, Gated;
    DpPortDeleted => "EV_DP_PORT_DELETED", Upstream, Gated;
    DpPortStats => "EV_DP_PORT_STATS", Upstream, Gated;

    OfpMsgOut => "EV_OFP_MSG_OUT", Downstream, Gated;
    DpSendPacket => "EV_DP_SEND_PACKET", Downstream, Gated;
    DpInsertFlow => "EV_DP_INSERT_FLOW", Downstream, Gated;
    DpModifyFlow => "EV_DP_MODIFY_FLOW", Downstream, Gated;
    DpDeleteFlow => "EV_DP_DELETE_FLOW", Downstream, Gated;
    DpRequestFlowStats => "EV_DP_REQUEST_FLOW_STATS", Downstream, Gated;
    DpRequestAggregateStats => "EV_DP_REQUEST_AGGREGATE_STATS", Downstream, Gated;
    DpRequestPortStats => "EV_DP_REQUEST_PORT_STATS", Downstream, Gated;

    SwGetDpid => "EV_SW_GET_DPID", Request, Gated;
    SwGetFd => "EV_SW_GET_FD", Request, Gated;
    SwGetXid => "EV_SW_GET_XID", Request, Gated;

    SwNewConn => "EV_SW_NEW_CONN", Internal, Notify;
    SwExpiredConn => "EV_SW_EXPIRED_CONN", Internal, Notify;
    SwConnected => "EV_SW_CONNECTED", Internal, Notify;
    SwDisconnected => "EV_SW_DISCONNECTED", Internal, Notify;
    SwUpdateConfig => "EV_SW_UPDATE_CONFIG", Internal, Notify;
    SwUpdateDesc => "EV_SW_UPDATE_DESC", Internal, Notify;
    HostAdded => "EV_HOST_ADDED", Internal, Notify;
    HostDeleted => "EV_HOST_DELETED", Internal, Notify;
    LinkAdded => "EV_LINK_ADDED", Internal, Notify;
    LinkDeleted => "EV_LINK_DELETED", Internal, Notify;
    FlowAdded => "EV_FLOW_ADDED", Internal, Notify;
    FlowDeleted => "EV_FLOW_DELETED", Internal, Notify;
    RsUpdateUsage => "EV_RS_UPDATE_USAGE", Internal, Notify;
    TrUpdateStats => "EV_TR_UPDATE_STATS", Internal, Notify;
    LogUpdateMsgs => "EV_LOG_UPDATE_MSGS", Internal, Notify;

    LogDebug => "EV_LOG_DEBUG", Log, Notify;
    LogInfo => "EV_LOG_INFO", Log, Notify;
    LogWarn => "EV_LOG_WARN", Log, Notify;
    LogError => "EV_LOG_ERROR", Log, Notify;
    LogFatal => "EV_LOG_FATAL", Log, Notify;
}

catalog! {
    /// Events exchanged between applications.
    AppEventType, APP_EVENT_TABLE, prefix = "AV_", label = "app_event";

    DpReceivePacket => "AV_DP_RECEIVE_PACKET", Upstream, Gated;
    DpFlowExpired => "AV_DP_FLOW_EXPIRED", Upstream, Gated;
    DpFlowDeleted => "AV_DP_FLOW_DELETED", Upstream, Gated;
    DpPortAdded => "AV_DP_PORT_ADDED", Upstream, Gated;
    DpPortModified => "AV_DP_PORT_MODIFIED", Upstream, Gated;
    DpPortDeleted => "AV_DP_PORT_DELETED", Upstream, Gated;

    DpSendPacket => "AV_DP_SEND_PACKET", Downstream, Gated;
    DpInsertFlow => "AV_DP_INSERT_FLOW", Downstream, Gated;
    DpModifyFlow => "AV_DP_MODIFY_FLOW", Downstream, Gated;
    DpDeleteFlow => "AV_DP_DELETE_FLOW", Downstream, Gated;

    SwGetInfo => "AV_SW_GET_INFO", Request, Gated;
    SwGetAllInfo => "AV_SW_GET_ALL_INFO", Request, Gated;
    HostGetInfo => "AV_HOST_GET_INFO", Request, Gated;
    HostGetAllInfo => "AV_HOST_GET_ALL_INFO", Request, Gated;
    LinkGetInfo => "AV_LINK_GET_INFO", Request, Gated;
    LinkGetAllInfo => "AV_LINK_GET_ALL_INFO", Request, Gated;
    FlowGetInfo => "AV_FLOW_GET_INFO", Request, Gated;
    FlowGetAllInfo => "AV_FLOW_GET_ALL_INFO", Request, Gated;

    SwConnected => "AV_SW_CONNECTED", Internal, Notify;
    SwDisconnected => "AV_SW_DISCONNECTED", Internal, Notify;
    HostAdded => "AV_HOST_ADDED", Internal, Notify;
    HostDeleted => "AV_HOST_DELETED", Internal, Notify;
    LinkAdded => "AV_LINK_ADDED", Internal, Notify;
    LinkDeleted => "AV_LINK_DELETED", Internal, Notify;
    FlowAdded => "AV_FLOW_ADDED", Internal, Notify;
    FlowDeleted => "AV_FLOW_DELETED", Internal, Notify;

    LogDebug => "AV_LOG_DEBUG", Log, Notify;
    LogInfo => "AV_LOG_INFO", Log, Notify;
    LogWarn => "AV_LOG_WARN", Log, Notify;
    LogError => "AV_LOG_ERROR", Log, Notify;
    LogFatal => "AV_LOG_FATAL", Log, Notify;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_table_matches_variants<K: Catalog>() {
        for (idx, row) in K::table().iter().enumerate() {
            assert_eq!(row.kind.index(), idx, "row {} out of order", row.name);
            assert!(row.name.starts_with(K::PREFIX), "{} lacks prefix", row.name);
        }
    }

    #[test]
    fn test_tables_are_in_variant_order() {
        assert_table_matches_variants::<EventType>();
        assert_table_matches_variants::<AppEventType>();
    }

    #[test]
    fn test_names_resolve_with_and_without_prefix() {
        assert_eq!(EventType::from_name("EV_SW_GET_DPID"), Some(EventType::SwGetDpid));
        assert_eq!(EventType::from_name("SW_GET_DPID"), Some(EventType::SwGetDpid));
        assert_eq!(AppEventType::from_name("AV_HOST_ADDED"), Some(AppEventType::HostAdded));
        assert_eq!(EventType::from_name("EV_NOPE"), None);
        assert_eq!(EventType::from_name("AV_HOST_ADDED"), None);
    }

    #[test]
    fn test_codes_are_one_based_and_reversible() {
        assert_eq!(EventType::OfpMsgIn.code(), 1);
        assert_eq!(EventType::from_code(0), None);
        assert_eq!(EventType::from_code(u16::MAX), None);
        for kind in EventType::all() {
            assert_eq!(EventType::from_code(kind.code()), Some(kind));
        }
    }

    #[test]
    fn test_class_is_a_per_type_attribute() {
        assert_eq!(EventType::DpInsertFlow.class(), EventClass::Gated);
        assert_eq!(EventType::SwGetXid.class(), EventClass::Gated);
        assert_eq!(EventType::SwConnected.class(), EventClass::Notify);
        assert_eq!(EventType::LogFatal.class(), EventClass::Notify);
        assert_eq!(AppEventType::FlowGetAllInfo.class(), EventClass::Gated);
        assert_eq!(AppEventType::LinkAdded.class(), EventClass::Notify);
    }

    #[test]
    fn test_group_tags_expand() {
        let up = EventType::expand_tag("ALL_UPSTREAM").unwrap();
        assert_eq!(up.len(), 10);
        assert!(up.iter().all(|k| k.group() == Group::Upstream));

        let write = EventType::expand_tag("EV_WRITE_INTSTREAM").unwrap();
        assert_eq!(write, vec![EventType::SwGetDpid, EventType::SwGetFd, EventType::SwGetXid]);

        let int = EventType::expand_tag("ALL_INTSTREAM").unwrap();
        assert_eq!(int.len(), 15);
        assert!(!int.contains(&EventType::LogInfo));
        assert!(!int.contains(&EventType::SwGetDpid));

        let app_down = AppEventType::expand_tag("AV_ALL_DOWNSTREAM").unwrap();
        assert_eq!(app_down.len(), 4);

        assert!(EventType::expand_tag("EV_SW_GET_DPID").is_none());
    }

    #[test]
    fn test_all_intstream_is_notifications_only() {
        for kind in EventType::expand_tag("ALL_INTSTREAM").unwrap() {
            assert_eq!(kind.group(), Group::Internal, "{kind}");
            assert!(!kind.is_gated(), "{kind}");
        }
        for kind in AppEventType::expand_tag("AV_ALL_INTSTREAM").unwrap() {
            assert_eq!(kind.group(), Group::Internal, "{kind}");
            assert!(!kind.is_gated(), "{kind}");
        }
        assert!(!AppEventType::expand_tag("ALL_INTSTREAM")
            .unwrap()
            .contains(&AppEventType::HostGetInfo));
    }

    #[test]
    fn test_display_uses_symbolic_name() {
        assert_eq!(EventType::HostAdded.to_string(), "EV_HOST_ADDED");
        assert_eq!(AppEventType::DpSendPacket.to_string(), "AV_DP_SEND_PACKET");
    }
}
