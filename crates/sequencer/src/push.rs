//! Per-user result push channels.

use std::collections::HashMap;
use std::sync::Arc;

use common::UserId;
use tokio::sync::{RwLock, mpsc};

use crate::request::CheckoutOutcome;

/// Registry of server-push channels keyed by user.
///
/// A user can hold several subscriptions (multiple devices); closed
/// receivers are pruned on publish.
#[derive(Clone, Default)]
pub struct PushChannels {
    senders: Arc<RwLock<HashMap<UserId, Vec<mpsc::UnboundedSender<CheckoutOutcome>>>>>,
}

impl PushChannels {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a user's outcomes.
    pub async fn subscribe(&self, user_id: UserId) -> mpsc::UnboundedReceiver<CheckoutOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.entry(user_id).or_default().push(tx);
        rx
    }

    /// Pushes an outcome to every live subscription of its user.
    pub async fn publish(&self, outcome: CheckoutOutcome) {
        let mut senders = self.senders.write().await;
        let Some(list) = senders.get_mut(&outcome.user_id) else {
            return;
        };
        list.retain(|tx| tx.send(outcome.clone()).is_ok());
        if list.is_empty() {
            senders.remove(&outcome.user_id);
        }
    }

    /// Returns the number of users with live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.senders.read().await.len()
    }
}
