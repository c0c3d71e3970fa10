//! Typed event topics.

use serde::Serialize;

use crate::notification::{Notification, NotificationActionLog, ReadEvent};

use super::hub::{HubInner, ListenerId, TopicRegistry};

/// A named channel of the event hub with a fixed payload type.
///
/// Topics are closed: each one is backed by a registry owned by the hub.
pub trait Topic: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;

    const NAME: &'static str;

    #[doc(hidden)]
    fn registry(hub: &HubInner) -> &TopicRegistry<Self::Payload>;

    /// User a payload is addressed to, used by per-user subscriptions.
    fn recipient(_payload: &Self::Payload) -> Option<&str> {
        None
    }
}

/// A notification was stored.
pub struct Created;

/// Notifications changed read state.
pub struct Read;

/// An action was executed on an approval notification.
pub struct Actioned;

/// A listener on another topic failed.
pub struct Errors;

/// Payload of the error topic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerFault {
    pub topic: &'static str,
    pub listener_id: ListenerId,
    pub message: String,
}

impl Topic for Created {
    type Payload = Notification;
    const NAME: &'static str = "created";

    fn registry(hub: &HubInner) -> &TopicRegistry<Self::Payload> {
        &hub.created
    }

    fn recipient(payload: &Self::Payload) -> Option<&str> {
        Some(&payload.user_id)
    }
}

impl Topic for Read {
    type Payload = ReadEvent;
    const NAME: &'static str = "read";

    fn registry(hub: &HubInner) -> &TopicRegistry<Self::Payload> {
        &hub.read
    }

    fn recipient(payload: &Self::Payload) -> Option<&str> {
        Some(&payload.user_id)
    }
}

impl Topic for Actioned {
    type Payload = NotificationActionLog;
    const NAME: &'static str = "actioned";

    fn registry(hub: &HubInner) -> &TopicRegistry<Self::Payload> {
        &hub.actioned
    }

    fn recipient(payload: &Self::Payload) -> Option<&str> {
        Some(&payload.acted_by)
    }
}

impl Topic for Errors {
    type Payload = ListenerFault;
    const NAME: &'static str = "error";

    fn registry(hub: &HubInner) -> &TopicRegistry<Self::Payload> {
        &hub.errors
    }
}
