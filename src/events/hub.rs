//! In-process publish/subscribe for notification lifecycle events.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use smallvec::SmallVec;

use crate::metrics::EventHubMetrics;
use crate::notification::{Notification, NotificationActionLog, ReadEvent};

use super::topics::{Created, Errors, ListenerFault, Topic};

pub type ListenerId = u64;

type SyncCallback<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;
type AsyncCallback<P> =
    Arc<dyn Fn(Arc<P>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

enum Callback<P> {
    Sync(SyncCallback<P>),
    Async(AsyncCallback<P>),
}

impl<P> Clone for Callback<P> {
    fn clone(&self) -> Self {
        match self {
            Callback::Sync(f) => Callback::Sync(f.clone()),
            Callback::Async(f) => Callback::Async(f.clone()),
        }
    }
}

struct Listener<P> {
    id: ListenerId,
    once: bool,
    callback: Callback<P>,
}

impl<P> Clone for Listener<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            once: self.once,
            callback: self.callback.clone(),
        }
    }
}

/// Listeners of one topic.
#[doc(hidden)]
pub struct TopicRegistry<P> {
    listeners: DashMap<ListenerId, Listener<P>>,
    /// user_id -> listeners scoped to that user
    by_user: DashMap<String, SmallVec<[Listener<P>; 2]>>,
    /// listener_id -> user_id, for removal
    user_of: DashMap<ListenerId, String>,
}

impl<P> Default for TopicRegistry<P> {
    fn default() -> Self {
        Self {
            listeners: DashMap::new(),
            by_user: DashMap::new(),
            user_of: DashMap::new(),
        }
    }
}

impl<P> TopicRegistry<P> {
    fn add(&self, listener: Listener<P>) {
        self.listeners.insert(listener.id, listener);
    }

    fn add_for_user(&self, user_id: &str, listener: Listener<P>) {
        self.user_of.insert(listener.id, user_id.to_string());
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .push(listener);
    }

    fn remove(&self, id: ListenerId) -> bool {
        if self.listeners.remove(&id).is_some() {
            return true;
        }

        let Some((_, user_id)) = self.user_of.remove(&id) else {
            return false;
        };

        if let Some(mut listeners) = self.by_user.get_mut(&user_id) {
            listeners.retain(|l| l.id != id);
        }
        self.by_user.remove_if(&user_id, |_, listeners| listeners.is_empty());

        true
    }

    /// Global listeners in registration order.
    fn snapshot(&self) -> Vec<Listener<P>> {
        let mut listeners: Vec<Listener<P>> =
            self.listeners.iter().map(|l| l.value().clone()).collect();
        listeners.sort_by_key(|l| l.id);
        listeners
    }

    fn snapshot_for_user(&self, user_id: &str) -> SmallVec<[Listener<P>; 2]> {
        self.by_user
            .get(user_id)
            .map(|listeners| listeners.clone())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.listeners.len() + self.user_of.len()
    }

    fn user_count(&self) -> usize {
        self.by_user.len()
    }

    fn clear(&self) {
        self.listeners.clear();
        self.by_user.clear();
        self.user_of.clear();
    }
}

#[doc(hidden)]
#[derive(Default)]
pub struct HubInner {
    next_id: AtomicU64,
    pub(super) created: TopicRegistry<Notification>,
    pub(super) read: TopicRegistry<ReadEvent>,
    pub(super) actioned: TopicRegistry<NotificationActionLog>,
    pub(super) errors: TopicRegistry<ListenerFault>,
}

/// Event hub distributing lifecycle events to in-process subscribers.
///
/// Cloning is cheap and every clone shares the same listener registry. Build
/// one per engine; tests create isolated hubs freely.
///
/// `emit` invokes synchronous listeners inline, in registration order across
/// topic-wide and per-user listeners. Asynchronous listeners are
/// spawned on the current Tokio runtime and not awaited. A failing listener
/// (error or panic) never affects its siblings or the emitter; the failure is
/// published on the [`Errors`] topic, or logged when nobody listens there.
#[derive(Clone, Default)]
pub struct NotificationEventHub {
    inner: Arc<HubInner>,
}

/// Handle to a registered listener.
///
/// Dropping it keeps the listener registered.
pub struct Subscription {
    id: ListenerId,
    hub: NotificationEventHub,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.hub.off(self.id)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl NotificationEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn subscription(&self, id: ListenerId) -> Subscription {
        Subscription {
            id,
            hub: self.clone(),
        }
    }

    fn sync_listener<T, F>(&self, once: bool, listener: F) -> Listener<T::Payload>
    where
        T: Topic,
        F: Fn(&T::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Listener {
            id: self.next_id(),
            once,
            callback: Callback::Sync(Arc::new(listener)),
        }
    }

    /// Subscribe to every event of a topic.
    pub fn on<T, F>(&self, listener: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener = self.sync_listener::<T, F>(false, listener);
        let id = listener.id;
        T::registry(&self.inner).add(listener);
        self.subscription(id)
    }

    /// Subscribe to the next event of a topic only.
    pub fn once<T, F>(&self, listener: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener = self.sync_listener::<T, F>(true, listener);
        let id = listener.id;
        T::registry(&self.inner).add(listener);
        self.subscription(id)
    }

    /// Subscribe with an asynchronous listener, run as a spawned task.
    pub fn on_async<T, F, Fut>(&self, listener: F) -> Subscription
    where
        T: Topic,
        F: Fn(Arc<T::Payload>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id();
        let callback: AsyncCallback<T::Payload> = Arc::new(move |payload| listener(payload).boxed());
        T::registry(&self.inner).add(Listener {
            id,
            once: false,
            callback: Callback::Async(callback),
        });
        self.subscription(id)
    }

    /// Subscribe to events of a topic addressed to one user.
    pub fn on_for_user<T, F>(&self, user_id: &str, listener: F) -> Subscription
    where
        T: Topic,
        F: Fn(&T::Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let listener = self.sync_listener::<T, F>(false, listener);
        let id = listener.id;
        T::registry(&self.inner).add_for_user(user_id, listener);

        tracing::trace!(user_id = %user_id, listener_id = id, topic = T::NAME, "User listener added");

        self.subscription(id)
    }

    /// Subscribe to notifications created for one user.
    pub fn on_created_for_user<F>(&self, user_id: &str, listener: F) -> Subscription
    where
        F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_for_user::<Created, F>(user_id, listener)
    }

    /// Remove a listener from whichever topic holds it.
    pub fn off(&self, id: ListenerId) -> bool {
        let inner = &self.inner;
        inner.created.remove(id)
            || inner.read.remove(id)
            || inner.actioned.remove(id)
            || inner.errors.remove(id)
    }

    pub fn remove_all_listeners(&self) {
        let inner = &self.inner;
        inner.created.clear();
        inner.read.clear();
        inner.actioned.clear();
        inner.errors.clear();
    }

    /// Number of listeners (topic-wide and per-user) on a topic.
    pub fn listener_count<T: Topic>(&self) -> usize {
        T::registry(&self.inner).len()
    }

    /// Number of users with at least one per-user listener on a topic.
    pub fn subscribed_user_count<T: Topic>(&self) -> usize {
        T::registry(&self.inner).user_count()
    }

    /// Publish an event. Returns the number of listeners invoked.
    pub fn emit<T: Topic>(&self, payload: T::Payload) -> usize {
        let registry = T::registry(&self.inner);
        let payload = Arc::new(payload);

        let mut listeners = registry.snapshot();
        if let Some(user_id) = T::recipient(&payload) {
            listeners.extend(registry.snapshot_for_user(user_id));
            listeners.sort_by_key(|l| l.id);
        }

        EventHubMetrics::record_emitted(T::NAME);

        let mut invoked = 0;
        for listener in &listeners {
            // Another emit may have consumed this once-listener already
            if listener.once && !registry.remove(listener.id) {
                continue;
            }
            self.invoke::<T>(listener, &payload);
            invoked += 1;
        }

        tracing::trace!(topic = T::NAME, listeners = invoked, "Event emitted");

        invoked
    }

    fn invoke<T: Topic>(&self, listener: &Listener<T::Payload>, payload: &Arc<T::Payload>) {
        match &listener.callback {
            Callback::Sync(callback) => {
                match catch_unwind(AssertUnwindSafe(|| callback(payload.as_ref()))) {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => self.report_failure::<T>(listener.id, error),
                    Err(panic) => self.report_failure::<T>(listener.id, panic_error(panic)),
                }
            }
            Callback::Async(callback) => {
                let future = match catch_unwind(AssertUnwindSafe(|| callback(payload.clone()))) {
                    Ok(future) => future,
                    Err(panic) => {
                        self.report_failure::<T>(listener.id, panic_error(panic));
                        return;
                    }
                };

                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    self.report_failure::<T>(
                        listener.id,
                        anyhow::anyhow!("no Tokio runtime available for async listener"),
                    );
                    return;
                };

                let hub = self.clone();
                let id = listener.id;
                handle.spawn(async move {
                    match AssertUnwindSafe(future).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => hub.report_failure::<T>(id, error),
                        Err(panic) => hub.report_failure::<T>(id, panic_error(panic)),
                    }
                });
            }
        }
    }

    fn report_failure<T: Topic>(&self, listener_id: ListenerId, error: anyhow::Error) {
        EventHubMetrics::record_listener_failure(T::NAME);

        let message = format!("{:#}", error);

        if T::NAME != Errors::NAME {
            let delivered = self.emit::<Errors>(ListenerFault {
                topic: T::NAME,
                listener_id,
                message: message.clone(),
            });
            if delivered > 0 {
                return;
            }
        }

        tracing::error!(
            topic = T::NAME,
            listener_id,
            error = %message,
            "Event listener failed"
        );
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("listener panicked: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::topics::{Actioned, Read};
    use crate::notification::{NewNotification, NotificationStatus};
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    fn notification_for(user_id: &str) -> Notification {
        NewNotification::informational(user_id, "title", "message").into_notification(Utc::now())
    }

    fn read_event(user_id: &str) -> ReadEvent {
        ReadEvent {
            user_id: user_id.to_string(),
            ids: vec![uuid::Uuid::new_v4()],
            status: NotificationStatus::Read,
        }
    }

    #[test]
    fn test_listeners_invoked_in_registration_order() {
        let hub = NotificationEventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            hub.on::<Read, _>(move |_| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }

        assert_eq!(hub.emit::<Read>(read_event("user-1")), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_user_and_topic_listeners_share_registration_order() {
        let hub = NotificationEventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        hub.on_for_user::<Read, _>("user-1", move |_| {
            o.lock().unwrap().push("user");
            Ok(())
        });
        let o = order.clone();
        hub.on::<Read, _>(move |_| {
            o.lock().unwrap().push("topic");
            Ok(())
        });
        let o = order.clone();
        hub.on_for_user::<Read, _>("user-1", move |_| {
            o.lock().unwrap().push("user-late");
            Ok(())
        });

        assert_eq!(hub.emit::<Read>(read_event("user-1")), 3);
        assert_eq!(*order.lock().unwrap(), vec!["user", "topic", "user-late"]);
    }

    #[test]
    fn test_once_and_off() {
        let hub = NotificationEventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        hub.once::<Read, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let c = calls.clone();
        let subscription = hub.on::<Read, _>(move |_| {
            c.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });

        hub.emit::<Read>(read_event("user-1"));
        hub.emit::<Read>(read_event("user-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 21);

        assert!(subscription.unsubscribe());
        assert_eq!(hub.emit::<Read>(read_event("user-1")), 0);
        assert_eq!(hub.listener_count::<Read>(), 0);
    }

    #[test]
    fn test_created_for_user_only_receives_own_events() {
        let hub = NotificationEventHub::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let r = received.clone();
        hub.on_created_for_user("alice", move |n| {
            r.lock().unwrap().push(n.user_id.clone());
            Ok(())
        });

        hub.emit::<Created>(notification_for("bob"));
        hub.emit::<Created>(notification_for("alice"));

        assert_eq!(*received.lock().unwrap(), vec!["alice".to_string()]);
        assert_eq!(hub.subscribed_user_count::<Created>(), 1);
    }

    #[test]
    fn test_user_listener_removal_cleans_index() {
        let hub = NotificationEventHub::new();
        let first = hub.on_created_for_user("alice", |_| Ok(()));
        let second = hub.on_created_for_user("alice", |_| Ok(()));

        assert!(first.unsubscribe());
        assert_eq!(hub.subscribed_user_count::<Created>(), 1);
        assert!(second.unsubscribe());
        assert_eq!(hub.subscribed_user_count::<Created>(), 0);
        assert_eq!(hub.listener_count::<Created>(), 0);
    }

    #[test]
    fn test_failing_listener_does_not_stop_siblings() {
        let hub = NotificationEventHub::new();
        let calls = Arc::new(AtomicUsize::new(0));

        hub.on::<Actioned, _>(|_| Err(anyhow::anyhow!("boom")));
        hub.on::<Actioned, _>(|_| panic!("listener exploded"));
        let c = calls.clone();
        hub.on::<Actioned, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let faults = Arc::new(Mutex::new(Vec::new()));
        let f = faults.clone();
        hub.on::<Errors, _>(move |fault| {
            f.lock().unwrap().push(fault.message.clone());
            Ok(())
        });

        hub.emit::<Actioned>(NotificationActionLog {
            id: uuid::Uuid::new_v4(),
            notification_id: uuid::Uuid::new_v4(),
            action_key: "approve".to_string(),
            acted_by: "user-1".to_string(),
            comment: None,
            acted_at: Utc::now(),
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let faults = faults.lock().unwrap();
        assert_eq!(faults.len(), 2);
        assert!(faults[0].contains("boom"));
        assert!(faults[1].contains("listener exploded"));
    }

    #[test]
    fn test_error_listener_failure_is_logged_not_reemitted() {
        let hub = NotificationEventHub::new();
        hub.on::<Errors, _>(|_| Err(anyhow::anyhow!("error handler failed")));
        hub.on::<Read, _>(|_| Err(anyhow::anyhow!("read handler failed")));

        // Must terminate without recursing
        assert_eq!(hub.emit::<Read>(read_event("user-1")), 1);
    }

    #[test]
    fn test_fault_without_reachable_error_listener_falls_back_to_log() {
        let hub = NotificationEventHub::new();
        let faults = Arc::new(AtomicUsize::new(0));

        // Faults carry no recipient, so a per-user error listener never fires
        let f = faults.clone();
        hub.on_for_user::<Errors, _>("ops", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        hub.on::<Read, _>(|_| Err(anyhow::anyhow!("boom")));

        assert_eq!(hub.listener_count::<Errors>(), 1);
        assert_eq!(hub.emit::<Read>(read_event("user-1")), 1);
        assert_eq!(faults.load(Ordering::SeqCst), 0);

        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        hub.on::<Errors, _>(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        hub.emit::<Read>(read_event("user-1"));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_listener_failure_reported() {
        let hub = NotificationEventHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        hub.on::<Errors, _>(move |fault| {
            let _ = tx.send(fault.topic);
            Ok(())
        });
        hub.on_async::<Read, _, _>(|_| async { Err::<(), _>(anyhow::anyhow!("async failure")) });

        hub.emit::<Read>(read_event("user-1"));

        let topic = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(topic, "read");
    }

    #[test]
    fn test_hubs_are_isolated() {
        let a = NotificationEventHub::new();
        let b = NotificationEventHub::new();
        a.on::<Read, _>(|_| Ok(()));

        assert_eq!(a.listener_count::<Read>(), 1);
        assert_eq!(b.listener_count::<Read>(), 0);
    }
}
