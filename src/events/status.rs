//! # Handler and dispatch status codes.
//!
//! Every handler returns a [`Status`], and so does every `raise()`. Zero is success;
//! any other value is a failure. The named constants are the codes the bus itself
//! produces; handlers are free to return their own non-zero values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer status returned by handlers and by dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(i32);

impl Status {
    /// Success.
    pub const OK: Status = Status(0);
    /// Generic handler failure.
    pub const FAILURE: Status = Status(-1);
    /// Raise denied: event type not in the caller's outbound allow-list.
    pub const UNAUTHORIZED: Status = Status(-2);
    /// Raise denied: caller id matches no loaded subscriber.
    pub const UNKNOWN_SUBSCRIBER: Status = Status(-3);
    /// Remote subscriber unreachable, timed out, or replied with garbage.
    pub const TRANSPORT: Status = Status(-4);
    /// Local handler panicked.
    pub const PANICKED: Status = Status(-5);

    #[inline]
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_failure(self) -> bool {
        self.0 != 0
    }

    /// Maps a boolean outcome to [`Status::OK`] or [`Status::FAILURE`].
    #[inline]
    pub const fn from_ok(ok: bool) -> Self {
        if ok { Self::OK } else { Self::FAILURE }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::OK
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Status::OK => f.write_str("ok"),
            Status::FAILURE => f.write_str("failure"),
            Status::UNAUTHORIZED => f.write_str("unauthorized"),
            Status::UNKNOWN_SUBSCRIBER => f.write_str("unknown_subscriber"),
            Status::TRANSPORT => f.write_str("transport"),
            Status::PANICKED => f.write_str("panicked"),
            Status(code) => write!(f, "status({code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_the_only_success() {
        assert!(Status::OK.is_ok());
        assert!(Status::new(7).is_failure());
        assert!(Status::TRANSPORT.is_failure());
        assert_eq!(Status::from_ok(false), Status::FAILURE);
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(Status::UNAUTHORIZED.to_string(), "unauthorized");
        assert_eq!(Status::new(42).to_string(), "status(42)");
    }
}
