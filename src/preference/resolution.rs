//! Pure preference resolution: default matrix, source derivation and the
//! override-aware effective value.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{
    ChannelOverride, NotificationCategory, NotificationChannel, PreferenceSource, PreferenceSummary,
    PreferenceUpdate, PreferenceUpsert, PreferenceView, UserNotificationPreference,
};

/// category -> [inApp, email, whatsapp]
const DEFAULT_MATRIX: [(&str, [bool; 3]); 6] = [
    ("global", [true, true, false]),
    ("general", [true, true, false]),
    ("leads", [true, true, false]),
    ("projects", [true, true, false]),
    ("tasks", [true, false, false]),
    ("system", [true, true, false]),
];

/// Default enablement for a `(category, channel)` pair; `false` when the
/// matrix has no entry.
pub fn resolve_default(category: &NotificationCategory, channel: NotificationChannel) -> bool {
    DEFAULT_MATRIX
        .iter()
        .find(|(name, _)| *name == category.as_str())
        .map(|(_, row)| row[channel.index()])
        .unwrap_or(false)
}

/// `default` when the update matches the matrix and carries no window.
pub fn derive_source(update: &PreferenceUpdate) -> PreferenceSource {
    let default_enabled = resolve_default(&update.category, update.channel);
    if update.enabled == default_enabled && update.delivery_window.is_none() {
        PreferenceSource::Default
    } else {
        PreferenceSource::User
    }
}

pub fn prepare_upsert(update: PreferenceUpdate) -> PreferenceUpsert {
    let source = derive_source(&update);
    PreferenceUpsert {
        category: update.category,
        channel: update.channel,
        enabled: update.enabled,
        delivery_window: update.delivery_window,
        source,
    }
}

/// Default rows for every matrix position the user does not have yet.
pub fn missing_defaults(
    user_id: &str,
    existing: &HashSet<(NotificationCategory, NotificationChannel)>,
    now: DateTime<Utc>,
) -> Vec<UserNotificationPreference> {
    let mut rows = Vec::new();

    for category in NotificationCategory::KNOWN.iter() {
        for channel in NotificationChannel::ALL {
            if existing.contains(&(category.clone(), channel)) {
                continue;
            }

            rows.push(UserNotificationPreference {
                id: Uuid::new_v4(),
                user_id: user_id.to_string(),
                category: category.clone(),
                channel,
                enabled: resolve_default(category, channel),
                delivery_window: None,
                source: PreferenceSource::Default,
                created_at: now,
                updated_at: now,
            });
        }
    }

    rows
}

/// Resolve one stored row against the override table.
///
/// An active override wins regardless of the user's stored value.
pub fn build_view(
    record: &UserNotificationPreference,
    overrides: &[ChannelOverride],
    now: DateTime<Utc>,
) -> PreferenceView {
    let active_override = overrides
        .iter()
        .find(|o| {
            o.category == record.category && o.channel == record.channel && o.is_active_at(now)
        })
        .cloned();

    let (effective, source) = match &active_override {
        Some(o) => (o.enforced, PreferenceSource::Override),
        None => (record.enabled, record.source),
    };

    PreferenceView {
        category: record.category.clone(),
        channel: record.channel,
        enabled: record.enabled,
        default_enabled: resolve_default(&record.category, record.channel),
        effective,
        source,
        delivery_window: record.delivery_window.clone(),
        active_override,
    }
}

impl PreferenceSummary {
    /// Dispatch-time enablement of `channel` for `category`.
    ///
    /// The `global` category is a master switch: when it is effectively off for
    /// the channel nothing else is consulted. Otherwise the category row
    /// decides, then the `global` row, then the default matrix.
    pub fn is_channel_enabled(
        &self,
        category: &NotificationCategory,
        channel: NotificationChannel,
    ) -> bool {
        let global = self.find(&NotificationCategory::Global, channel);

        if let Some(global) = global {
            if !global.effective {
                return false;
            }
        }

        if let Some(view) = self.find(category, channel) {
            return view.effective;
        }

        if let Some(global) = global {
            return global.effective;
        }

        resolve_default(category, channel)
    }
}
