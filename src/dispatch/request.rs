use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::{NewAction, NotificationMetadata, NotificationType, Priority};
use crate::preference::{NotificationCategory, NotificationChannel};

/// Who a request is addressed to. All three sources are unioned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audience {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub role_codes: Vec<String>,
}

impl Audience {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.user_ids.is_empty() && self.role_codes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppOverride {
    pub title: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub category: Option<NotificationCategory>,
    #[serde(default)]
    pub actions: Vec<NewAction>,
    pub expires_at: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub metadata: Option<NotificationMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOverride {
    /// Replaces the recipients' own addresses
    pub to: Option<Vec<String>>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppOverride {
    /// Replaces every recipient's own number
    pub phone_number: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Per-channel content overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOverrides {
    pub in_app: Option<InAppOverride>,
    pub email: Option<EmailOverride>,
    pub whatsapp: Option<WhatsAppOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub priority: Option<i32>,
    pub max_retries: Option<i32>,
    pub job_type: Option<String>,
}

/// A message to fan out across channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(flatten)]
    pub audience: Audience,
    pub category: NotificationCategory,
    #[serde(default)]
    pub notification_type: Option<NotificationType>,
    #[serde(default)]
    pub event_type: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: NotificationMetadata,
    /// Raw channel identifiers; unknown ones are ignored
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub channel_overrides: ChannelOverrides,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default = "default_respect_preferences")]
    pub respect_preferences: bool,
    #[serde(default)]
    pub job_options: JobOptions,
}

fn default_respect_preferences() -> bool {
    true
}

impl NotificationRequest {
    pub fn builder(
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> NotificationRequestBuilder {
        NotificationRequestBuilder::new(category, title, message)
    }
}

/// Builder for creating dispatch requests
#[derive(Debug, Clone)]
pub struct NotificationRequestBuilder {
    request: NotificationRequest,
}

impl NotificationRequestBuilder {
    pub fn new(
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request: NotificationRequest {
                audience: Audience::default(),
                category,
                notification_type: None,
                event_type: None,
                title: title.into(),
                message: message.into(),
                metadata: NotificationMetadata::default(),
                channels: Vec::new(),
                channel_overrides: ChannelOverrides::default(),
                priority: None,
                respect_preferences: true,
                job_options: JobOptions::default(),
            },
        }
    }

    /// Address a single user
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.request.audience.user_id = Some(user_id.into());
        self
    }

    /// Add users to the audience
    pub fn users<I, S>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request
            .audience
            .user_ids
            .extend(user_ids.into_iter().map(Into::into));
        self
    }

    /// Add every holder of these role codes to the audience
    pub fn roles<I, S>(mut self, role_codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request
            .audience
            .role_codes
            .extend(role_codes.into_iter().map(Into::into));
        self
    }

    pub fn channel(mut self, channel: NotificationChannel) -> Self {
        self.request.channels.push(channel.as_str().to_string());
        self
    }

    pub fn channels<I>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = NotificationChannel>,
    {
        self.request
            .channels
            .extend(channels.into_iter().map(|c| c.as_str().to_string()));
        self
    }

    /// Add a raw channel identifier
    pub fn channel_named(mut self, channel: impl Into<String>) -> Self {
        self.request.channels.push(channel.into());
        self
    }

    pub fn notification_type(mut self, notification_type: NotificationType) -> Self {
        self.request.notification_type = Some(notification_type);
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.request.event_type = Some(event_type.into());
        self
    }

    pub fn metadata(mut self, metadata: NotificationMetadata) -> Self {
        self.request.metadata = metadata;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.request.priority = Some(priority);
        self
    }

    /// Deliver regardless of stored preferences and overrides
    pub fn ignore_preferences(mut self) -> Self {
        self.request.respect_preferences = false;
        self
    }

    pub fn in_app(mut self, overrides: InAppOverride) -> Self {
        self.request.channel_overrides.in_app = Some(overrides);
        self
    }

    pub fn email(mut self, overrides: EmailOverride) -> Self {
        self.request.channel_overrides.email = Some(overrides);
        self
    }

    pub fn whatsapp(mut self, overrides: WhatsAppOverride) -> Self {
        self.request.channel_overrides.whatsapp = Some(overrides);
        self
    }

    pub fn job_options(mut self, job_options: JobOptions) -> Self {
        self.request.job_options = job_options;
        self
    }

    pub fn build(self) -> NotificationRequest {
        self.request
    }
}
