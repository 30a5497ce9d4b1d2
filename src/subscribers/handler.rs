//! # Subscriber handlers.
//!
//! [`Handle`] is the callback every in-process subscriber implements. It runs
//! synchronously on the thread that called `raise()`, so it must return quickly;
//! long work has to be handed off by the handler itself.
//!
//! `out` is `Some` only when the subscriber holds WRITE for the event type.
//!
//! ## Example
//! ```rust
//! use nosbus::{Event, EventOut, EventType, HandlerFn, HandlerRef, Status};
//!
//! let h: HandlerRef<EventType> = HandlerFn::arc(
//!     "checksum",
//!     |ev: &Event<EventType>, out: Option<&mut EventOut>| {
//!         if let Some(out) = out {
//!             out.checksum = ev.payload.iter().map(|b| u32::from(*b)).sum();
//!         }
//!         Status::OK
//!     },
//! );
//! assert_eq!(h.name(), "checksum");
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use crate::events::{Catalog, Event, EventOut, Status};

/// Shared handler reference.
pub type HandlerRef<K> = Arc<dyn Handle<K>>;

/// In-process event callback.
pub trait Handle<K: Catalog>: Send + Sync + 'static {
    /// Processes one event and returns its status.
    ///
    /// Panics are caught by the bus and reported as [`Status::PANICKED`].
    fn handle(&self, event: &Event<K>, out: Option<&mut EventOut>) -> Status;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<K, F> Handle<K> for HandlerFn<F>
where
    K: Catalog,
    F: Fn(&Event<K>, Option<&mut EventOut>) -> Status + Send + Sync + 'static,
{
    fn handle(&self, event: &Event<K>, out: Option<&mut EventOut>) -> Status {
        (self.f)(event, out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
