//! Update notifications for downstream caches.
//!
//! A small typed publisher owned by the metadata store. Subscribers register
//! callbacks and get back an opaque token for unsubscribing; there is no
//! global event bus.

use super::types::Repository;
use std::collections::HashMap;
use std::sync::Mutex;

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type UpdatedCallback = Box<dyn Fn(&[Repository]) + Send + Sync>;

/// Publisher for the `updated` event, fired once per successful update.
#[derive(Default)]
pub struct UpdatePublisher {
    inner: Mutex<PublisherInner>,
}

#[derive(Default)]
struct PublisherInner {
    next_token: u64,
    subscribers: HashMap<u64, UpdatedCallback>,
}

impl UpdatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; the token unsubscribes it later.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&[Repository]) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.subscribers.insert(token, Box::new(callback));
        SubscriptionToken(token)
    }

    /// Remove a subscription; unknown tokens are ignored.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.inner.lock().unwrap().subscribers.remove(&token.0);
    }

    /// Notify every subscriber that these repositories changed.
    pub fn emit_updated(&self, changed: &[Repository]) {
        let inner = self.inner.lock().unwrap();
        for callback in inner.subscribers.values() {
            callback(changed);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }
}
