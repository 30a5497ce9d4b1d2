//! # Transport: subscribers in another process or host.
//!
//! ```text
//!          NOS process                               subscriber process
//! ┌──────────────────────────┐                  ┌──────────────────────────┐
//! │ Bus ─► Subscriber(Remote)│── Push/Request ─►│ SubscriberHost (Reactor) │
//! │        RemoteEndpoint    │◄──── Reply ──────│   └─► Handle::handle     │
//! │                          │                  │                          │
//! │ BusServer (Reactor)      │◄─ Hello/Push/ ───│ RemoteEndpoint           │
//! │   └─► Bus::raise         │   Request        │                          │
//! └──────────────────────────┘                  └──────────────────────────┘
//! ```
//!
//! - [`Reactor`]: epoll poll thread, [`ReadyQueue`] and worker pool; generic over
//!   a [`ConnectionHandler`].
//! - [`frame`]: length-prefixed wire codec.
//! - [`RemoteEndpoint`]: client side used by the bus for remote subscribers.

mod client;
mod connection;
mod endpoint;
pub mod frame;
mod host;
mod queue;
mod reactor;
mod server;

pub use client::RemoteEndpoint;
pub use connection::Connection;
pub use endpoint::{Endpoint, Stream};
pub use frame::{Envelope, Frame};
pub use host::SubscriberHost;
pub use queue::{Ready, ReadyQueue};
pub use reactor::{ConnectionHandler, Reactor};
pub use server::BusServer;
