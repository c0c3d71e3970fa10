use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown notification channel: {0}")]
pub struct UnknownChannel(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown preference source: {0}")]
pub struct UnknownSource(pub String);

/// Coarse classification used to scope preferences.
///
/// The known categories carry entries in the default matrix; any other value
/// is kept verbatim as `Custom` and defaults to disabled on every channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationCategory {
    Global,
    General,
    Leads,
    Projects,
    Tasks,
    System,
    Custom(String),
}

impl NotificationCategory {
    /// Categories seeded for every user.
    pub const KNOWN: [NotificationCategory; 6] = [
        NotificationCategory::Global,
        NotificationCategory::General,
        NotificationCategory::Leads,
        NotificationCategory::Projects,
        NotificationCategory::Tasks,
        NotificationCategory::System,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NotificationCategory::Global => "global",
            NotificationCategory::General => "general",
            NotificationCategory::Leads => "leads",
            NotificationCategory::Projects => "projects",
            NotificationCategory::Tasks => "tasks",
            NotificationCategory::System => "system",
            NotificationCategory::Custom(name) => name,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, NotificationCategory::Global)
    }
}

impl From<&str> for NotificationCategory {
    fn from(value: &str) -> Self {
        match value {
            "global" => NotificationCategory::Global,
            "general" => NotificationCategory::General,
            "leads" => NotificationCategory::Leads,
            "projects" => NotificationCategory::Projects,
            "tasks" => NotificationCategory::Tasks,
            "system" => NotificationCategory::System,
            other => NotificationCategory::Custom(other.to_string()),
        }
    }
}

impl From<String> for NotificationCategory {
    fn from(value: String) -> Self {
        NotificationCategory::from(value.as_str())
    }
}

impl From<NotificationCategory> for String {
    fn from(value: NotificationCategory) -> Self {
        match value {
            NotificationCategory::Custom(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery mechanism for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationChannel {
    #[serde(rename = "inApp")]
    InApp,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "whatsapp")]
    WhatsApp,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 3] = [
        NotificationChannel::InApp,
        NotificationChannel::Email,
        NotificationChannel::WhatsApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::InApp => "inApp",
            NotificationChannel::Email => "email",
            NotificationChannel::WhatsApp => "whatsapp",
        }
    }

    /// Column index in the default matrix.
    pub(crate) fn index(&self) -> usize {
        match self {
            NotificationChannel::InApp => 0,
            NotificationChannel::Email => 1,
            NotificationChannel::WhatsApp => 2,
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inApp" => Ok(NotificationChannel::InApp),
            "email" => Ok(NotificationChannel::Email),
            "whatsapp" => Ok(NotificationChannel::WhatsApp),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stored preference value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceSource {
    #[default]
    Default,
    User,
    Override,
}

impl PreferenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceSource::Default => "default",
            PreferenceSource::User => "user",
            PreferenceSource::Override => "override",
        }
    }
}

impl FromStr for PreferenceSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PreferenceSource::Default),
            "user" => Ok(PreferenceSource::User),
            "override" => Ok(PreferenceSource::Override),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// Hours of the day (and optionally days of the week) a user accepts delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
}

impl DeliveryWindow {
    pub fn validate(&self) -> Result<(), String> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(format!(
                "delivery window hours must be within 0..=23 (got {}..{})",
                self.start_hour, self.end_hour
            ));
        }

        if let Some(tz) = &self.timezone {
            if tz.trim().is_empty() {
                return Err("delivery window timezone must not be blank".to_string());
            }
        }

        if let Some(days) = &self.days_of_week {
            if let Some(day) = days.iter().find(|d| **d > 6) {
                return Err(format!("invalid day of week in delivery window: {}", day));
            }
        }

        Ok(())
    }
}

/// Stored per-user preference row. `(user_id, category, channel)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotificationPreference {
    pub id: Uuid,
    pub user_id: String,
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub enabled: bool,
    pub delivery_window: Option<DeliveryWindow>,
    pub source: PreferenceSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrator mandate for a `(category, channel)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOverride {
    pub id: Uuid,
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub enforced: bool,
    pub reason: Option<String>,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

impl ChannelOverride {
    pub fn new(
        category: NotificationCategory,
        channel: NotificationChannel,
        enforced: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            channel,
            enforced,
            reason: Some(reason.into()),
            effective_from: Utc::now(),
            effective_to: None,
        }
    }

    /// Set the end of the override's validity.
    pub fn until(mut self, effective_to: DateTime<Utc>) -> Self {
        self.effective_to = Some(effective_to);
        self
    }

    /// An override is active until its `effective_to` passes.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.effective_to {
            None => true,
            Some(end) => end > now,
        }
    }
}

/// Caller-supplied preference change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceUpdate {
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub enabled: bool,
    #[serde(default)]
    pub delivery_window: Option<DeliveryWindow>,
}

impl PreferenceUpdate {
    pub fn new(category: NotificationCategory, channel: NotificationChannel, enabled: bool) -> Self {
        Self {
            category,
            channel,
            enabled,
            delivery_window: None,
        }
    }

    pub fn with_window(mut self, window: DeliveryWindow) -> Self {
        self.delivery_window = Some(window);
        self
    }
}

/// Preference change with its derived source, as written by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceUpsert {
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub enabled: bool,
    pub delivery_window: Option<DeliveryWindow>,
    pub source: PreferenceSource,
}

/// Resolved view of one stored preference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceView {
    pub category: NotificationCategory,
    pub channel: NotificationChannel,
    pub enabled: bool,
    pub default_enabled: bool,
    pub effective: bool,
    pub source: PreferenceSource,
    pub delivery_window: Option<DeliveryWindow>,
    #[serde(rename = "override")]
    pub active_override: Option<ChannelOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceCatalog {
    pub categories: Vec<NotificationCategory>,
    pub channels: Vec<NotificationChannel>,
}

impl Default for PreferenceCatalog {
    fn default() -> Self {
        Self {
            categories: NotificationCategory::KNOWN.to_vec(),
            channels: NotificationChannel::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceSummary {
    pub user_id: String,
    pub preferences: Vec<PreferenceView>,
    pub metadata: PreferenceCatalog,
}

impl PreferenceSummary {
    pub fn find(
        &self,
        category: &NotificationCategory,
        channel: NotificationChannel,
    ) -> Option<&PreferenceView> {
        self.preferences
            .iter()
            .find(|view| &view.category == category && view.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_category_round_trip_strings() {
        assert_eq!(NotificationCategory::from("system"), NotificationCategory::System);
        assert_eq!(
            NotificationCategory::from("billing"),
            NotificationCategory::Custom("billing".to_string())
        );
        assert_eq!(String::from(NotificationCategory::Tasks), "tasks");

        let json = serde_json::to_string(&NotificationCategory::Custom("billing".into())).unwrap();
        assert_eq!(json, "\"billing\"");
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("inApp".parse::<NotificationChannel>(), Ok(NotificationChannel::InApp));
        assert_eq!("whatsapp".parse::<NotificationChannel>(), Ok(NotificationChannel::WhatsApp));
        assert!("push".parse::<NotificationChannel>().is_err());

        let json = serde_json::to_string(&NotificationChannel::InApp).unwrap();
        assert_eq!(json, "\"inApp\"");
    }

    #[test]
    fn test_override_activity() {
        let now = Utc::now();
        let open = ChannelOverride::new(
            NotificationCategory::System,
            NotificationChannel::Email,
            false,
            "maintenance",
        );
        assert!(open.is_active_at(now));

        let expired = open.clone().until(now - Duration::hours(1));
        assert!(!expired.is_active_at(now));

        let future_end = open.until(now + Duration::hours(1));
        assert!(future_end.is_active_at(now));
    }

    #[test]
    fn test_delivery_window_validation() {
        let mut window = DeliveryWindow {
            start_hour: 8,
            end_hour: 18,
            timezone: Some("Asia/Jakarta".to_string()),
            days_of_week: Some(vec![1, 2, 3, 4, 5]),
        };
        assert!(window.validate().is_ok());

        window.end_hour = 24;
        assert!(window.validate().is_err());

        window.end_hour = 18;
        window.days_of_week = Some(vec![7]);
        assert!(window.validate().is_err());

        window.days_of_week = None;
        window.timezone = Some("  ".to_string());
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_view_serializes_override_key() {
        let view = PreferenceView {
            category: NotificationCategory::General,
            channel: NotificationChannel::Email,
            enabled: true,
            default_enabled: true,
            effective: true,
            source: PreferenceSource::Default,
            delivery_window: None,
            active_override: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("override").is_some());
        assert_eq!(json["defaultEnabled"], true);
    }
}
