//! Lifecycle event distribution.
//!
//! Producers (the orchestrator) emit on typed topics; realtime transports
//! subscribe either topic-wide or per user.

mod hub;
pub mod topics;

pub use hub::{ListenerId, NotificationEventHub, Subscription};
pub use topics::{Actioned, Created, Errors, ListenerFault, Read, Topic};
