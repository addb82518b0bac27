use std::{collections::HashMap, sync::Arc};

use log::{debug, info, trace};

use crate::{subscription::SubscriptionState, Error};

/// Result of an acknowledgement
pub(crate) enum Promotion {
    /// Subscription moved into the active index
    Promoted(Arc<SubscriptionState>),
    /// No pending subscription with the request id
    Unknown,
    /// Subscription id is already used by another active subscription.
    /// The pending subscription is removed, but not terminated
    Duplicate(Arc<SubscriptionState>),
    /// Subscription was closed before the acknowledgement. Contains unsubscribe method to call
    Orphaned(String),
}

/// A registry of subscriptions.
/// A subscription is pending, keyed by a request id, until the server acknowledges it,
/// and active, keyed by a server assigned id, afterwards
pub(crate) struct SubscriptionsRegistry {
    id_counter: u64,
    /// Subscriptions waiting for acknowledgement
    pending: HashMap<u64, Arc<SubscriptionState>>,
    /// Acknowledged subscriptions
    active: HashMap<u64, Arc<SubscriptionState>>,
    /// Subscriptions closed before acknowledgement. Contains unsubscribe method to call
    /// once the acknowledgement arrives
    orphaned: HashMap<u64, String>,
    /// Connection error. No subscriptions are accepted after the connection is closed
    closed: Option<Error>,
}

impl SubscriptionsRegistry {
    pub fn new() -> Self {
        Self {
            id_counter: 0,
            pending: HashMap::new(),
            active: HashMap::new(),
            orphaned: HashMap::new(),
            closed: None,
        }
    }

    /// Next request id
    pub fn next_id(&mut self) -> u64 {
        self.id_counter += 1;
        self.id_counter
    }

    /// Add a pending subscription
    pub fn register(&mut self, request_id: u64, state: Arc<SubscriptionState>) -> crate::Result<()> {
        if let Some(error) = &self.closed {
            return Err(error.clone());
        }

        if self.pending.contains_key(&request_id) {
            return Err(Error::InternalError(format!(
                "Request id {request_id} is already pending"
            )));
        }

        self.pending.insert(request_id, state);

        trace!("Add new subscription {request_id}. Pending: {}", self.pending.len());
        Ok(())
    }

    /// Move a pending subscription into the active index.
    /// Orphans are checked in the same critical section, so a concurrent close either
    /// finds the subscription active or leaves an orphan for this acknowledgement
    pub fn promote(&mut self, request_id: u64, subscription_id: u64) -> Promotion {
        if let Some(method) = self.orphaned.remove(&request_id) {
            return Promotion::Orphaned(method);
        }

        let Some(state) = self.pending.remove(&request_id) else {
            return Promotion::Unknown;
        };

        if self.active.contains_key(&subscription_id) {
            return Promotion::Duplicate(state);
        }

        state.assign_subscription_id(subscription_id);
        self.active.insert(subscription_id, state.clone());

        debug!("Subscription {request_id} acknowledged with id {subscription_id}");
        Promotion::Promoted(state)
    }

    pub fn lookup_pending(&self, request_id: u64) -> Option<Arc<SubscriptionState>> {
        self.pending.get(&request_id).cloned()
    }

    pub fn lookup_active(&self, subscription_id: u64) -> Option<Arc<SubscriptionState>> {
        self.active.get(&subscription_id).cloned()
    }

    /// Remove a subscription from both indices.
    /// Returns `None` if the subscription has already been removed
    pub fn remove(
        &mut self,
        request_id: u64,
        subscription_id: Option<u64>,
    ) -> Option<Arc<SubscriptionState>> {
        let pending = self.pending.remove(&request_id);

        // Subscription id may belong to another request if the server reused it
        let active = subscription_id
            .filter(|id| {
                self.active
                    .get(id)
                    .is_some_and(|state| state.request_id() == request_id)
            })
            .and_then(|id| self.active.remove(&id));

        pending.or(active)
    }

    /// Remember a subscription closed before acknowledgement
    pub fn add_orphan(&mut self, request_id: u64, unsubscribe_method: &str) {
        if self.closed.is_none() {
            self.orphaned
                .insert(request_id, unsubscribe_method.to_owned());
        }
    }

    pub fn take_orphan(&mut self, request_id: u64) -> Option<String> {
        self.orphaned.remove(&request_id)
    }

    /// Remove all subscriptions and reject new ones with `error`
    pub fn drain_all(&mut self, error: Error) -> Vec<Arc<SubscriptionState>> {
        info!(
            "Clearing subscriptions. Pending: {}, active: {}",
            self.pending.len(),
            self.active.len()
        );

        self.closed = Some(error);
        self.orphaned.clear();

        self.pending
            .drain()
            .chain(self.active.drain())
            .map(|(_, state)| state)
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
