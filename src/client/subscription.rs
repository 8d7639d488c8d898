use crate::client::store::{ChatApi, ChatStore};
use crate::domain::event::ServerEvent;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// Forwards push events from a transport feed into a shared store.
///
/// Subscriptions are scoped: subscribing again first tears down the previous
/// forwarding task, so a reconnect can never leave two listeners applying
/// the same event twice.
#[derive(Debug)]
pub struct EventPump<A> {
    store: Arc<Mutex<ChatStore<A>>>,
    task: Option<JoinHandle<()>>,
}

impl<A: ChatApi + 'static> EventPump<A> {
    #[must_use]
    pub const fn new(store: Arc<Mutex<ChatStore<A>>>) -> Self {
        Self { store, task: None }
    }

    /// Replaces any previous subscription with a fresh event feed.
    pub fn subscribe(&mut self, mut events: broadcast::Receiver<ServerEvent>) {
        self.unsubscribe();

        let store = Arc::clone(&self.store);
        self.task = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        store.lock().await.apply_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Dropped events heal via the next snapshot fetch or
                        // full presence broadcast.
                        tracing::warn!(missed, "Client event feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stops forwarding events; idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<A> Drop for EventPump<A> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
