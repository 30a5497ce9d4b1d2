//! Runtime core: bus construction and dispatch.
//!
//! Internal modules:
//! - [`bus`]: the dispatch engine shared by the component and application buses;
//! - [`builder`]: validates configuration records and binds handlers;
//! - [`config`]: tunables for the bus and its transport;
//! - [`table`]: per-type subscription chains.

mod bus;
mod builder;
mod config;
mod table;

pub use bus::{Bus, BusSnapshot, Dispatch, SubscriberSnapshot, TriggerCount};
pub use builder::BusBuilder;
pub use config::Config;
pub use table::SubscriptionTable;
