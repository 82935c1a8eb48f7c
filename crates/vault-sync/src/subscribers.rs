//! Per-tenant fan-out of new events to live subscriptions.
//!
//! The registry is created once at service start and shared by the updater
//! (which publishes) and the transport (which subscribes). Each tenant has
//! its own bucket of sinks behind its own lock, so publishing to one tenant
//! never waits on another. Lock order is always map, then bucket.
//!
//! Delivery is fire-and-forget: [`SubscriberRegistry::notify`] uses
//! `try_send` and drops any sink that is full or closed. A dropped
//! subscriber recovers missed events from the durable log.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use uuid::Uuid;
use vault_store::Event;

/// Channel capacity used when none is configured.
pub const DEFAULT_BUFFER_SIZE: usize = 64;

type Bucket = Arc<Mutex<HashMap<Uuid, mpsc::Sender<Event>>>>;

struct Registry {
    tenants: RwLock<HashMap<String, Bucket>>,
    buffer_size: usize,
}

/// Shared handle to the subscriber registry.
#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<Registry>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl SubscriberRegistry {
    /// Creates an empty registry whose sinks buffer up to `buffer_size`
    /// events each.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                tenants: RwLock::new(HashMap::new()),
                buffer_size: buffer_size.max(1),
            }),
        }
    }

    /// Opens a subscription to `tenant_id`'s events. Dropping the returned
    /// [`Subscription`] unsubscribes it.
    pub fn subscribe(&self, tenant_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer_size);
        let id = Uuid::new_v4();

        let bucket = {
            let mut tenants = self
                .inner
                .tenants
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let bucket = tenants.entry(tenant_id.to_string()).or_default();
            bucket
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, tx);
            Arc::clone(bucket)
        };
        let live = bucket.lock().unwrap_or_else(PoisonError::into_inner).len();
        tracing::debug!(tenant_id, subscription_id = %id, live, "subscription opened");

        Subscription {
            id,
            tenant_id: tenant_id.to_string(),
            receiver: rx,
            registry: self.clone(),
        }
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, tenant_id: &str, id: Uuid) {
        let mut tenants = self
            .inner
            .tenants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(bucket) = tenants.get(tenant_id) else {
            return;
        };
        let empty = {
            let mut sinks = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            sinks.remove(&id);
            sinks.is_empty()
        };
        if empty {
            tenants.remove(tenant_id);
        }
        tracing::debug!(tenant_id, subscription_id = %id, "subscription closed");
    }

    /// Delivers `event` to every live subscription of its tenant without
    /// waiting. Returns how many sinks accepted it.
    pub fn notify(&self, event: &Event) -> usize {
        let bucket = {
            let tenants = self
                .inner
                .tenants
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match tenants.get(&event.tenant_id) {
                Some(bucket) => Arc::clone(bucket),
                None => return 0,
            }
        };

        let mut sinks = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        sinks.retain(|id, sink| match sink.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(err) => {
                tracing::warn!(
                    tenant_id = %event.tenant_id,
                    subscription_id = %id,
                    event_id = %event.id,
                    error = %err,
                    "dropping subscriber that cannot accept events"
                );
                false
            }
        });
        delivered
    }

    /// Number of live subscriptions for `tenant_id`.
    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        let tenants = self
            .inner
            .tenants
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        tenants.get(tenant_id).map_or(0, |bucket| {
            bucket.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}

/// A live subscription to one tenant's events.
///
/// Yields events in publication order. The stream ends if the registry
/// drops the sink after a failed delivery.
pub struct Subscription {
    id: Uuid,
    tenant_id: String,
    receiver: mpsc::Receiver<Event>,
    registry: SubscriberRegistry,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.tenant_id, self.id);
    }
}
