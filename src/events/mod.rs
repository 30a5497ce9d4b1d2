//! # Event catalogs and envelopes.
//!
//! - [`Catalog`] with its two implementations [`EventType`] (component bus) and
//!   [`AppEventType`] (application bus).
//! - [`Event`] / [`EventOut`]: the read-only and read-write views handed to
//!   subscribers.
//! - [`Status`]: the integer outcome of a handler and of a dispatch.

mod catalog;
mod envelope;
mod kinds;
mod status;

pub use catalog::{Catalog, EventClass, EventInfo, Group};
pub use envelope::{Event, EventOut};
pub use kinds::{AppEventType, EventType};
pub use status::Status;
