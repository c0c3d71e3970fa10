// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod telemetry;

// Domain
pub mod directory;
pub mod events;
pub mod jobs;
pub mod notification;
pub mod preference;

// Delivery
pub mod channels;
pub mod dispatch;

// Composition root
pub mod engine;

pub use engine::{EngineParts, NotificationEngine};
pub use error::{NotificationError, Result};
