//! Cross-channel dispatch.
//!
//! The unified service resolves the audience of a [`NotificationRequest`],
//! checks each recipient's effective preference per channel, and hands the
//! allowed recipients to the channel's adapter.

mod request;
mod service;

pub use request::{
    Audience, ChannelOverrides, EmailOverride, InAppOverride, JobOptions, NotificationRequest,
    NotificationRequestBuilder, WhatsAppOverride,
};
pub use service::{
    resolve_channels, DispatchResponse, DispatchStats, DispatchStatsSnapshot, DispatchTotals,
    UnifiedNotificationService, DEFAULT_CHANNELS,
};
