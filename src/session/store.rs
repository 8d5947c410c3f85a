//! Pluggable session storage. The client consults and mutates the store
//! through this trait only, so tests (or persistent implementations)
//! can substitute their own.

use super::topics::topic_matches;
use super::{PendingPublish, PendingUnsubscribe, Subscription};
use std::collections::HashMap;
use std::time::Instant;

/// Storage for in-flight state keyed by message id plus the
/// subscription table. Expected cardinalities are small; O(n) scans are
/// acceptable.
pub trait SessionStore {
    fn add_pending_publish(&mut self, record: PendingPublish);
    /// Returns false when no such record is pending.
    fn remove_pending_publish(&mut self, message_id: u16) -> bool;
    /// Pending publishes whose last transmission predates `cutoff`,
    /// borrowed mutably so the caller can stamp the retransmission.
    fn pending_publishes_last_sent_before(&mut self, cutoff: Instant)
        -> Vec<&mut PendingPublish>;

    fn add_pending_unsubscribe(&mut self, record: PendingUnsubscribe);
    fn remove_pending_unsubscribe(&mut self, message_id: u16) -> bool;
    fn pending_unsubscribes_last_sent_before(
        &mut self,
        cutoff: Instant,
    ) -> Vec<&mut PendingUnsubscribe>;

    fn add_subscription(&mut self, subscription: Subscription);
    /// Subscriptions whose filter matches a concrete inbound topic.
    fn subscriptions_matching(&mut self, topic: &str) -> Vec<&mut Subscription>;
    /// Subscriptions registered under the given SUBSCRIBE message id.
    fn subscriptions_with_message_id(&mut self, message_id: u16) -> Vec<&mut Subscription>;

    /// Whether a message id currently identifies any pending record or
    /// a subscription still waiting on its SUBACK; the allocator skips
    /// these to keep ids injective.
    fn has_inflight(&self, message_id: u16) -> bool;
}

/// Default in-memory store: two maps keyed by message id and a flat
/// subscription list.
#[derive(Default)]
pub struct InMemorySessionStore {
    pending_publishes: HashMap<u16, PendingPublish>,
    pending_unsubscribes: HashMap<u16, PendingUnsubscribe>,
    subscriptions: Vec<Subscription>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_publish_count(&self) -> usize {
        self.pending_publishes.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl SessionStore for InMemorySessionStore {
    fn add_pending_publish(&mut self, record: PendingPublish) {
        self.pending_publishes.insert(record.message_id, record);
    }

    fn remove_pending_publish(&mut self, message_id: u16) -> bool {
        self.pending_publishes.remove(&message_id).is_some()
    }

    fn pending_publishes_last_sent_before(
        &mut self,
        cutoff: Instant,
    ) -> Vec<&mut PendingPublish> {
        let mut stale: Vec<&mut PendingPublish> = self
            .pending_publishes
            .values_mut()
            .filter(|record| record.last_sent_at < cutoff)
            .collect();
        // Map order is arbitrary; retransmit oldest first.
        stale.sort_by_key(|record| record.last_sent_at);
        stale
    }

    fn add_pending_unsubscribe(&mut self, record: PendingUnsubscribe) {
        self.pending_unsubscribes.insert(record.message_id, record);
    }

    fn remove_pending_unsubscribe(&mut self, message_id: u16) -> bool {
        self.pending_unsubscribes.remove(&message_id).is_some()
    }

    fn pending_unsubscribes_last_sent_before(
        &mut self,
        cutoff: Instant,
    ) -> Vec<&mut PendingUnsubscribe> {
        let mut stale: Vec<&mut PendingUnsubscribe> = self
            .pending_unsubscribes
            .values_mut()
            .filter(|record| record.last_sent_at < cutoff)
            .collect();
        stale.sort_by_key(|record| record.last_sent_at);
        stale
    }

    fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    fn subscriptions_matching(&mut self, topic: &str) -> Vec<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .filter(|sub| topic_matches(&sub.topic_filter, topic))
            .collect()
    }

    fn subscriptions_with_message_id(&mut self, message_id: u16) -> Vec<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .filter(|sub| sub.message_id == message_id)
            .collect()
    }

    fn has_inflight(&self, message_id: u16) -> bool {
        self.pending_publishes.contains_key(&message_id)
            || self.pending_unsubscribes.contains_key(&message_id)
            || self
                .subscriptions
                .iter()
                .any(|sub| sub.message_id == message_id && sub.acknowledged_qos.is_none())
    }
}
