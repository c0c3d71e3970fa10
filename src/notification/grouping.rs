use chrono::{DateTime, Utc};

use super::types::{GroupKey, Notification, NotificationGroup};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Clamp a requested page size to `1..=50`, defaulting to 20.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Bucket by whole UTC calendar days between `created_at` and `now`.
///
/// Items dated in the future count as today.
pub fn group_key_for(created_at: DateTime<Utc>, now: DateTime<Utc>) -> GroupKey {
    let days = (now.date_naive() - created_at.date_naive()).num_days();

    match days {
        d if d <= 0 => GroupKey::Today,
        1 => GroupKey::Yesterday,
        2..=7 => GroupKey::ThisWeek,
        _ => GroupKey::Earlier,
    }
}

/// Group a page of notifications, keeping page order inside each group.
///
/// Groups appear in order of first occurrence and empty groups are omitted.
pub fn group_notifications(items: &[Notification], now: DateTime<Utc>) -> Vec<NotificationGroup> {
    let mut groups: Vec<NotificationGroup> = Vec::with_capacity(4);

    for item in items {
        let key = group_key_for(item.created_at, now);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.notifications.push(item.clone()),
            None => groups.push(NotificationGroup {
                key,
                title: key.title(),
                notifications: vec![item.clone()],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::types::NewNotification;
    use chrono::{Duration, TimeZone};

    fn at(created_at: DateTime<Utc>) -> Notification {
        NewNotification::informational("user-1", "title", "message").into_notification(created_at)
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(500)), 50);
    }

    #[test]
    fn test_group_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 0, 30, 0).unwrap();

        // Calendar days, not elapsed hours
        assert_eq!(group_key_for(now - Duration::hours(1), now), GroupKey::Yesterday);
        assert_eq!(group_key_for(now, now), GroupKey::Today);
        assert_eq!(group_key_for(now + Duration::days(2), now), GroupKey::Today);
        assert_eq!(group_key_for(now - Duration::days(7), now), GroupKey::ThisWeek);
        assert_eq!(group_key_for(now - Duration::days(8), now), GroupKey::Earlier);
    }

    #[test]
    fn test_group_notifications_buckets() {
        let now = Utc::now();
        let items = vec![
            at(now),
            at(now - Duration::days(1)),
            at(now - Duration::days(5)),
            at(now - Duration::days(14)),
        ];

        let groups = group_notifications(&items, now);
        let keys: Vec<GroupKey> = groups.iter().map(|g| g.key).collect();
        assert_eq!(
            keys,
            vec![GroupKey::Today, GroupKey::Yesterday, GroupKey::ThisWeek, GroupKey::Earlier]
        );
        assert!(groups.iter().all(|g| g.notifications.len() == 1));
        assert_eq!(groups[2].title, "This Week");
    }

    #[test]
    fn test_empty_groups_omitted() {
        let now = Utc::now();
        let items = vec![at(now), at(now - Duration::minutes(5))];

        let groups = group_notifications(&items, now);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].notifications.len(), 2);
        assert!(group_notifications(&[], now).is_empty());
    }
}
