//! Error types used by the bus, its configuration loader and its transport.
//!
//! This module defines three error enums:
//!
//! - [`ConfigError`]: load-time failures. Any of them aborts startup.
//! - [`DispatchError`]: per-call failures inside a chain. They are logged and
//!   surface to callers only as a [`Status`].
//! - [`TransportError`]: socket, framing and timeout failures of the remote path.
//!
//! All types provide `as_label` (stable snake_case, for logs/metrics) and
//! `as_message`.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::events::Status;
use crate::subscribers::SubscriberId;

/// # Errors produced while loading subscriber configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Record at `index` has an empty name.
    #[error("subscriber record #{index} has no name")]
    EmptyName {
        /// Position of the record in the configuration list.
        index: usize,
    },

    /// Two records share one name.
    #[error("duplicate subscriber name '{name}'")]
    DuplicateSubscriber { name: String },

    /// Two distinct names hash to the same subscriber id.
    #[error("subscribers '{first}' and '{second}' share id {id}")]
    IdCollision {
        first: String,
        second: String,
        id: SubscriberId,
    },

    /// An inbound or outbound entry names no known event type or group.
    #[error("subscriber '{subscriber}': unknown event '{entry}'")]
    UnknownEvent { subscriber: String, entry: String },

    /// A permission suffix or record-level `perm` has an unknown letter.
    #[error("subscriber '{subscriber}': invalid permission in '{entry}'")]
    InvalidPermission { subscriber: String, entry: String },

    /// A group tag was used where only concrete types are allowed.
    #[error("subscriber '{subscriber}': group '{entry}' is not allowed here")]
    GroupNotAllowed { subscriber: String, entry: String },

    /// External subscriber without an endpoint.
    #[error("external subscriber '{subscriber}' has no endpoint")]
    MissingEndpoint { subscriber: String },

    /// Endpoint string that cannot be parsed or resolved.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A handler was registered under a name no record declares.
    #[error("handler registered for unknown subscriber '{name}'")]
    UnknownHandler { name: String },

    /// A per-type handler was registered for a type the subscriber does not receive.
    #[error("subscriber '{subscriber}' does not subscribe to {event}")]
    NotSubscribed {
        subscriber: String,
        event: &'static str,
    },

    /// Malformed JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyName { .. } => "config_empty_name",
            ConfigError::DuplicateSubscriber { .. } => "config_duplicate_subscriber",
            ConfigError::IdCollision { .. } => "config_id_collision",
            ConfigError::UnknownEvent { .. } => "config_unknown_event",
            ConfigError::InvalidPermission { .. } => "config_invalid_permission",
            ConfigError::GroupNotAllowed { .. } => "config_group_not_allowed",
            ConfigError::MissingEndpoint { .. } => "config_missing_endpoint",
            ConfigError::InvalidEndpoint { .. } => "config_invalid_endpoint",
            ConfigError::UnknownHandler { .. } => "config_unknown_handler",
            ConfigError::NotSubscribed { .. } => "config_not_subscribed",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Io(_) => "config_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Failures inside one dispatch chain.
///
/// The engine builds one of these for every non-zero status it observes, logs it,
/// and then either absorbs it or aborts with [`DispatchError::status`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Caller is known but may not raise this type.
    #[error("'{subscriber}' is not allowed to raise {event}")]
    Unauthorized {
        subscriber: String,
        event: &'static str,
    },

    /// Caller id matches no loaded subscriber.
    #[error("unknown subscriber id {id} raised {event}")]
    UnknownSubscriber { id: SubscriberId, event: &'static str },

    /// Handler returned a non-zero status.
    #[error("'{subscriber}' failed {event} with {status}")]
    HandlerFailure {
        subscriber: String,
        event: &'static str,
        status: Status,
    },

    /// Local handler panicked.
    #[error("'{subscriber}' panicked on {event}: {info}")]
    HandlerPanicked {
        subscriber: String,
        event: &'static str,
        info: String,
    },

    /// Remote subscriber could not be reached or did not answer in time.
    #[error("'{subscriber}' unreachable for {event}: {source}")]
    TransportFailure {
        subscriber: String,
        event: &'static str,
        #[source]
        source: TransportError,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Unauthorized { .. } => "dispatch_unauthorized",
            DispatchError::UnknownSubscriber { .. } => "dispatch_unknown_subscriber",
            DispatchError::HandlerFailure { .. } => "dispatch_handler_failure",
            DispatchError::HandlerPanicked { .. } => "dispatch_handler_panicked",
            DispatchError::TransportFailure { .. } => "dispatch_transport_failure",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// Status this failure maps to.
    pub fn status(&self) -> Status {
        match self {
            DispatchError::Unauthorized { .. } => Status::UNAUTHORIZED,
            DispatchError::UnknownSubscriber { .. } => Status::UNKNOWN_SUBSCRIBER,
            DispatchError::HandlerFailure { status, .. } => *status,
            DispatchError::HandlerPanicked { .. } => Status::PANICKED,
            DispatchError::TransportFailure { .. } => Status::TRANSPORT,
        }
    }
}

/// # Errors produced by the remote transport.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// Frame length exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame header or body does not decode.
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: &'static str },

    /// A valid frame arrived where another kind was expected.
    #[error("unexpected frame: expected {expected}, got {got}")]
    UnexpectedFrame {
        expected: &'static str,
        got: &'static str,
    },

    /// Frame names an event code outside the catalog.
    #[error("unknown event code {code}")]
    UnknownEvent { code: u16 },

    /// Peer closed the connection mid-exchange.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No reply within the configured timeout.
    #[error("no reply within {duration:?}")]
    Timeout { duration: Duration },

    /// Ready queue at capacity.
    #[error("ready queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Handshake answered with a non-zero status.
    #[error("handshake rejected with {status}")]
    HandshakeRejected { status: Status },

    /// Poller failure.
    #[error("epoll error: {0}")]
    Poll(#[from] nix::errno::Errno),

    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::FrameTooLarge { .. } => "transport_frame_too_large",
            TransportError::InvalidFrame { .. } => "transport_invalid_frame",
            TransportError::UnexpectedFrame { .. } => "transport_unexpected_frame",
            TransportError::UnknownEvent { .. } => "transport_unknown_event",
            TransportError::ConnectionClosed => "transport_connection_closed",
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::QueueFull { .. } => "transport_queue_full",
            TransportError::HandshakeRejected { .. } => "transport_handshake_rejected",
            TransportError::Poll(_) => "transport_poll",
            TransportError::Io(_) => "transport_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    #[inline]
    pub const fn invalid(reason: &'static str) -> Self {
        TransportError::InvalidFrame { reason }
    }

    #[inline]
    pub const fn timeout(duration: Duration) -> Self {
        TransportError::Timeout { duration }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Framing errors are permanent for a connection; timeouts and a full queue
    /// are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::Timeout { .. } | TransportError::QueueFull { .. } => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Maps a socket read error, turning timeouts into [`TransportError::Timeout`].
    pub(crate) fn from_read(err: io::Error, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::timeout(timeout),
            io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
            _ => TransportError::Io(err),
        }
    }
}
