use crate::domain::event::{RevocationNotice, ServerEvent};
use crate::domain::message::Message;
use crate::services::presence::{PresenceRegistry, Registration};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    pushed_total: Counter<u64>,
    dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            pushed_total: meter
                .u64_counter("parley_events_pushed_total")
                .with_description("Push notifications enqueued to connections")
                .build(),
            dropped_total: meter
                .u64_counter("parley_events_dropped_total")
                .with_description("Push notifications dropped due to a full or closed outbound queue")
                .build(),
        }
    }
}

/// Translates domain events into zero-or-more push notifications.
///
/// Delivery is best-effort on top of the persisted store: a full or closed
/// outbound queue drops the event, and the recipient self-heals from the
/// next snapshot fetch or presence broadcast. Nothing here ever propagates
/// a failure back to the operation that triggered it.
#[derive(Clone, Debug)]
pub struct DeliveryRouter {
    registry: Arc<PresenceRegistry>,
    metrics: Metrics,
}

impl DeliveryRouter {
    #[must_use]
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry, metrics: Metrics::new() }
    }

    /// Registers the connection and announces the new presence snapshot.
    pub fn connection_opened(&self, user_id: Uuid) -> (Registration, mpsc::Receiver<ServerEvent>) {
        let registered = self.registry.register(user_id);
        self.broadcast_presence();
        registered
    }

    /// Drops the registration (stale disconnects are no-ops) and, when the
    /// registry changed, announces the new presence snapshot.
    pub fn connection_closed(&self, registration: Registration) {
        if self.registry.unregister(registration) {
            self.broadcast_presence();
        }
    }

    /// Pushes a freshly created message to its receiver's connection, if the
    /// receiver is online. Offline receivers get nothing; the store is the
    /// source of truth for their next snapshot fetch.
    pub fn message_created(&self, message: &Message) {
        match self.registry.lookup(message.receiver_id) {
            Some(tx) => {
                self.enqueue(&tx, message.receiver_id, ServerEvent::NewMessage(message.clone()), "newMessage");
            }
            None => {
                tracing::debug!(receiver_id = %message.receiver_id, "Receiver offline, skipping push");
            }
        }
    }

    /// Announces a revocation to every connected client, not just the two
    /// participants, so any client rendering a cached copy reacts.
    pub fn message_revoked(&self, notice: &RevocationNotice) {
        for (user_id, tx) in self.registry.connections() {
            self.enqueue(&tx, user_id, ServerEvent::MessageRevoked(notice.clone()), "messageRevoked");
        }
    }

    /// Broadcasts the full online-identity snapshot to every connection.
    /// Full state rather than a delta, so a client that missed an update
    /// heals on the next broadcast.
    pub fn broadcast_presence(&self) {
        let online = self.registry.online_users();
        for (user_id, tx) in self.registry.connections() {
            self.enqueue(&tx, user_id, ServerEvent::GetOnlineUsers(online.clone()), "getOnlineUsers");
        }
    }

    /// Reclaims dead registry entries and re-announces presence when
    /// anything changed. Returns the number of reclaimed entries.
    pub fn sweep_dead_connections(&self) -> usize {
        let reclaimed = self.registry.sweep_dead();
        if reclaimed > 0 {
            self.broadcast_presence();
        }
        reclaimed
    }

    fn enqueue(&self, tx: &mpsc::Sender<ServerEvent>, user_id: Uuid, event: ServerEvent, label: &'static str) {
        match tx.try_send(event) {
            Ok(()) => {
                self.metrics.pushed_total.add(1, &[KeyValue::new("event", label)]);
            }
            Err(e) => {
                tracing::warn!(%user_id, event = label, error = %e, "Dropped push notification");
                self.metrics.dropped_total.add(1, &[KeyValue::new("event", label)]);
            }
        }
    }
}
