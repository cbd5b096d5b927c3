//! Engine events.
//!
//! Subscribers register async hooks in [`EventHooks`]. The engine publishes through the [`EventProducers`] handed to
//! [`crate::FeeSyncApi`]; each hook runs on its own task, so a slow subscriber never stalls a sync run.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
