use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::channels::{AdapterRegistry, ChannelDelivery, DispatchResult, DispatchStatus};
use crate::directory::{Recipient, UserDirectory};
use crate::error::{NotificationError, Result};
use crate::metrics::DispatchMetrics;
use crate::preference::{
    NotificationCategory, NotificationChannel, PreferenceService, PreferenceSummary,
};

use super::request::NotificationRequest;

/// Channel used when a request names none, or only unknown ones.
pub const DEFAULT_CHANNELS: [NotificationChannel; 1] = [NotificationChannel::InApp];

const PREFERENCE_SKIP_REASON: &str = "Channel disabled by user preference";

/// Result counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchTotals {
    pub sent: usize,
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchTotals {
    pub fn from_results(results: &[DispatchResult]) -> Self {
        results.iter().fold(Self::default(), |mut totals, result| {
            match result.status {
                DispatchStatus::Sent => totals.sent += 1,
                DispatchStatus::Scheduled => totals.scheduled += 1,
                DispatchStatus::Skipped => totals.skipped += 1,
                DispatchStatus::Failed => totals.failed += 1,
            }
            totals
        })
    }
}

/// Aggregated outcome of one dispatch.
///
/// Inspect `results` entry by entry: partial failure is not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResponse {
    pub results: Vec<DispatchResult>,
    pub totals: DispatchTotals,
}

impl DispatchResponse {
    fn new(results: Vec<DispatchResult>) -> Self {
        let totals = DispatchTotals::from_results(&results);
        Self { results, totals }
    }

    /// Results for one user, in dispatch order.
    pub fn for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a DispatchResult> {
        self.results.iter().filter(move |r| r.user_id == user_id)
    }
}

/// Statistics for the unified service
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub requests: AtomicU64,
    pub sent: AtomicU64,
    pub scheduled: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl DispatchStats {
    fn record(&self, totals: &DispatchTotals) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.sent.fetch_add(totals.sent as u64, Ordering::Relaxed);
        self.scheduled
            .fetch_add(totals.scheduled as u64, Ordering::Relaxed);
        self.skipped.fetch_add(totals.skipped as u64, Ordering::Relaxed);
        self.failed.fetch_add(totals.failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    pub requests: u64,
    pub sent: u64,
    pub scheduled: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Fans a request out across channels, honouring preferences.
pub struct UnifiedNotificationService {
    preferences: PreferenceService,
    directory: Arc<dyn UserDirectory>,
    adapters: AdapterRegistry,
    stats: DispatchStats,
}

impl UnifiedNotificationService {
    pub fn new(
        preferences: PreferenceService,
        directory: Arc<dyn UserDirectory>,
        adapters: AdapterRegistry,
    ) -> Self {
        Self {
            preferences,
            directory,
            adapters,
            stats: DispatchStats::default(),
        }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver `request` on every resolved channel.
    ///
    /// Fails only when the audience is empty or a collaborator errors;
    /// per-recipient outcomes are reported in the response.
    #[tracing::instrument(
        name = "notification.send",
        skip(self, request),
        fields(
            category = %request.category,
            respect_preferences = request.respect_preferences,
            recipients = tracing::field::Empty,
        )
    )]
    pub async fn send_notification(&self, request: &NotificationRequest) -> Result<DispatchResponse> {
        let started = Instant::now();
        let channels = resolve_channels(&request.channels);

        let user_ids = self.resolve_audience(request).await?;
        if user_ids.is_empty() {
            tracing::debug!("No recipients resolved");
            return Err(NotificationError::NoRecipients);
        }
        tracing::Span::current().record("recipients", user_ids.len());

        let recipients = self.fetch_recipients(&user_ids).await?;
        let mut summaries: HashMap<String, PreferenceSummary> = HashMap::new();
        let mut results = Vec::new();

        for channel in channels {
            let Some(adapter) = self.adapters.get(channel) else {
                tracing::debug!(channel = %channel, "No adapter registered, skipping channel");
                continue;
            };

            let (allowed, skipped) = self
                .partition_recipients(
                    &recipients,
                    &request.category,
                    channel,
                    request.respect_preferences,
                    &mut summaries,
                )
                .await?;

            results.extend(
                skipped
                    .iter()
                    .map(|r| DispatchResult::skipped(&r.user_id, channel, PREFERENCE_SKIP_REASON)),
            );

            if allowed.is_empty() {
                tracing::debug!(channel = %channel, "No recipients allowed on channel");
                continue;
            }

            let channel_results = adapter
                .deliver(ChannelDelivery {
                    channel,
                    recipients: &allowed,
                    request,
                })
                .await;

            tracing::debug!(
                channel = %channel,
                allowed = allowed.len(),
                skipped = skipped.len(),
                results = channel_results.len(),
                "Channel dispatched"
            );

            results.extend(channel_results);
        }

        for result in &results {
            DispatchMetrics::record_result(result.channel.as_str(), result.status.as_str());
        }
        DispatchMetrics::record_latency(started.elapsed().as_secs_f64());

        let response = DispatchResponse::new(results);
        self.stats.record(&response.totals);

        tracing::info!(
            sent = response.totals.sent,
            scheduled = response.totals.scheduled,
            skipped = response.totals.skipped,
            failed = response.totals.failed,
            "Notification dispatched"
        );

        Ok(response)
    }

    /// Send to explicit users, on every channel unless the request names some.
    pub async fn send_to_users<I, S>(
        &self,
        user_ids: I,
        mut request: NotificationRequest,
    ) -> Result<DispatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        request
            .audience
            .user_ids
            .extend(user_ids.into_iter().map(Into::into));
        self.send_on_all_channels(request).await
    }

    /// Send to every holder of the role codes.
    pub async fn send_to_roles<I, S>(
        &self,
        role_codes: I,
        mut request: NotificationRequest,
    ) -> Result<DispatchResponse>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        request
            .audience
            .role_codes
            .extend(role_codes.into_iter().map(Into::into));
        self.send_on_all_channels(request).await
    }

    /// Send to explicit users and role holders, de-duplicated.
    pub async fn send_to_users_and_roles<U, R, S, T>(
        &self,
        user_ids: U,
        role_codes: R,
        mut request: NotificationRequest,
    ) -> Result<DispatchResponse>
    where
        U: IntoIterator<Item = S>,
        R: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        request
            .audience
            .user_ids
            .extend(user_ids.into_iter().map(Into::into));
        request
            .audience
            .role_codes
            .extend(role_codes.into_iter().map(Into::into));
        self.send_on_all_channels(request).await
    }

    async fn send_on_all_channels(&self, mut request: NotificationRequest) -> Result<DispatchResponse> {
        if request.channels.is_empty() {
            request.channels = NotificationChannel::ALL
                .iter()
                .map(|c| c.as_str().to_string())
                .collect();
        }
        self.send_notification(&request).await
    }

    /// Union of the explicit ids and role holders, first occurrence wins.
    pub async fn resolve_audience(&self, request: &NotificationRequest) -> Result<Vec<String>> {
        let audience = &request.audience;
        let mut seen = HashSet::new();
        let mut user_ids = Vec::new();

        let explicit = audience.user_id.iter().chain(audience.user_ids.iter());
        for id in explicit {
            if !id.trim().is_empty() && seen.insert(id.clone()) {
                user_ids.push(id.clone());
            }
        }

        if !audience.role_codes.is_empty() {
            let from_roles = self
                .directory
                .user_ids_for_roles(&audience.role_codes)
                .await?;
            for id in from_roles {
                if seen.insert(id.clone()) {
                    user_ids.push(id);
                }
            }
        }

        Ok(user_ids)
    }

    /// Contact profiles of `user_ids`. Ids unknown to the directory are dropped.
    pub async fn fetch_recipients(&self, user_ids: &[String]) -> Result<Vec<Recipient>> {
        let recipients = self.directory.fetch_recipients(user_ids).await?;
        if recipients.len() < user_ids.len() {
            tracing::warn!(
                requested = user_ids.len(),
                found = recipients.len(),
                "Some recipients are unknown to the user directory"
            );
        }
        Ok(recipients)
    }

    async fn partition_recipients(
        &self,
        recipients: &[Recipient],
        category: &NotificationCategory,
        channel: NotificationChannel,
        respect_preferences: bool,
        summaries: &mut HashMap<String, PreferenceSummary>,
    ) -> Result<(Vec<Recipient>, Vec<Recipient>)> {
        if !respect_preferences {
            return Ok((recipients.to_vec(), Vec::new()));
        }

        let mut allowed = Vec::new();
        let mut skipped = Vec::new();

        for recipient in recipients {
            if !summaries.contains_key(&recipient.user_id) {
                let summary = self
                    .preferences
                    .get_user_preferences(&recipient.user_id)
                    .await?;
                summaries.insert(recipient.user_id.clone(), summary);
            }

            let enabled = summaries
                .get(&recipient.user_id)
                .map(|summary| summary.is_channel_enabled(category, channel))
                .unwrap_or(false);

            if enabled {
                allowed.push(recipient.clone());
            } else {
                skipped.push(recipient.clone());
            }
        }

        Ok((allowed, skipped))
    }
}

/// Parse requested channel identifiers, dropping unknown and repeated ones.
pub fn resolve_channels(requested: &[String]) -> Vec<NotificationChannel> {
    let mut channels: Vec<NotificationChannel> = Vec::new();
    for raw in requested {
        match raw.parse::<NotificationChannel>() {
            Ok(channel) if !channels.contains(&channel) => channels.push(channel),
            Ok(_) => {}
            Err(_) => tracing::debug!(channel = %raw, "Ignoring unknown channel"),
        }
    }

    if channels.is_empty() {
        DEFAULT_CHANNELS.to_vec()
    } else {
        channels
    }
}
