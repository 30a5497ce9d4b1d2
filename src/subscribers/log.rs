//! # LogWriter: log events to tracing
//!
//! A handler that turns `EV_LOG_*` events into `tracing` records. The payload is
//! the message text; the origin's id is attached as a field.
//!
//! ## Example output
//! ```text
//! INFO nosbus::log: switch connected origin=1651030346
//! WARN nosbus::log: flow table full origin=635676162
//! ```

use tracing::{debug, error, info, warn};

use crate::events::{Event, EventOut, EventType, Status};
use crate::subscribers::Handle;

/// Log event writer.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Handle<EventType> for LogWriter {
    fn handle(&self, e: &Event<EventType>, _out: Option<&mut EventOut>) -> Status {
        let msg = String::from_utf8_lossy(&e.payload);
        let msg = msg.trim_end();
        let origin = e.origin.get();
        match e.kind {
            EventType::LogDebug => debug!(target: "nosbus::log", origin, "{msg}"),
            EventType::LogInfo => info!(target: "nosbus::log", origin, "{msg}"),
            EventType::LogWarn => warn!(target: "nosbus::log", origin, "{msg}"),
            EventType::LogError | EventType::LogFatal => {
                error!(target: "nosbus::log", origin, fatal = e.kind == EventType::LogFatal, "{msg}")
            }
            _ => return Status::OK,
        }
        Status::OK
    }

    fn name(&self) -> &str {
        "log"
    }
}
