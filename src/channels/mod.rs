//! Pluggable delivery channels.
//!
//! Each channel implements [`ChannelAdapter`] and is registered in an
//! [`AdapterRegistry`] keyed by [`NotificationChannel`]. Adapters report one
//! [`DispatchResult`] per recipient and never fail the whole call.

mod email;
mod in_app;
mod whatsapp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::directory::Recipient;
use crate::dispatch::NotificationRequest;
use crate::preference::NotificationChannel;

pub use email::EmailChannelAdapter;
pub use in_app::InAppChannelAdapter;
pub use whatsapp::WhatsAppChannelAdapter;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Scheduled,
    Skipped,
    Failed,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Scheduled => "scheduled",
            DispatchStatus::Skipped => "skipped",
            DispatchStatus::Failed => "failed",
        }
    }
}

/// Per-recipient, per-channel result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub user_id: String,
    pub channel: NotificationChannel,
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Id of the external job when the delivery was handed off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl DispatchResult {
    fn with_status(
        user_id: impl Into<String>,
        channel: NotificationChannel,
        status: DispatchStatus,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel,
            status,
            reason: None,
            job_id: None,
        }
    }

    pub fn sent(user_id: impl Into<String>, channel: NotificationChannel) -> Self {
        Self::with_status(user_id, channel, DispatchStatus::Sent)
    }

    pub fn scheduled(
        user_id: impl Into<String>,
        channel: NotificationChannel,
        job_id: impl Into<String>,
    ) -> Self {
        let mut result = Self::with_status(user_id, channel, DispatchStatus::Scheduled);
        result.job_id = Some(job_id.into());
        result
    }

    pub fn skipped(
        user_id: impl Into<String>,
        channel: NotificationChannel,
        reason: impl Into<String>,
    ) -> Self {
        let mut result = Self::with_status(user_id, channel, DispatchStatus::Skipped);
        result.reason = Some(reason.into());
        result
    }

    pub fn failed(
        user_id: impl Into<String>,
        channel: NotificationChannel,
        reason: impl Into<String>,
    ) -> Self {
        let mut result = Self::with_status(user_id, channel, DispatchStatus::Failed);
        result.reason = Some(reason.into());
        result
    }
}

/// Input handed to an adapter: the recipients allowed on this channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelDelivery<'a> {
    pub channel: NotificationChannel,
    pub recipients: &'a [Recipient],
    pub request: &'a NotificationRequest,
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> NotificationChannel;

    /// Deliver to every recipient and report one result each.
    async fn deliver(&self, delivery: ChannelDelivery<'_>) -> Vec<DispatchResult>;
}

/// Lookup table of adapters by channel.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<NotificationChannel, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own channel, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) -> &mut Self {
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, channel: NotificationChannel) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel)
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        let mut channels: Vec<_> = self.adapters.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
