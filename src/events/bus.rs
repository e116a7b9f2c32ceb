//! Publish/subscribe bus with managed subscriptions
//!
//! Sources and targets are registered endpoints. A subscription ties a
//! (source, topic) pair to a handler owned by a target. Delivery is
//! synchronous, in subscription order. Handlers may publish, subscribe or
//! unsubscribe while being dispatched:
//!
//! - dispatch iterates over a snapshot taken when `publish` starts, so
//!   subscriptions added mid-dispatch see the next event, not this one
//! - every snapshot entry is re-checked before its handler runs, so a
//!   subscription removed mid-dispatch is never invoked afterwards
//! - a handler reached again through a nested publish is skipped

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::types::{GameEvent, Topic};

/// Shared handler callback
pub type Handler = Rc<RefCell<dyn FnMut(&GameEvent)>>;

/// Identity of a registered source or target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(Uuid);

impl EndpointId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Numeric subscription handle. Zero is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const INVALID: SubscriptionId = SubscriptionId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

struct Endpoint {
    name: String,
    emits: SmallVec<[Topic; 8]>,
    alive: bool,
}

struct Subscription {
    id: SubscriptionId,
    source: EndpointId,
    topic: Topic,
    target: EndpointId,
    handler: Handler,
}

#[derive(Default)]
struct BusState {
    endpoints: FxHashMap<EndpointId, Endpoint>,
    /// Kept in subscription order
    subscriptions: Vec<Subscription>,
    next_id: u64,
    published: u64,
}

impl BusState {
    fn is_alive(&self, endpoint: EndpointId) -> bool {
        self.endpoints.get(&endpoint).is_some_and(|e| e.alive)
    }

    fn is_subscription_valid(&self, sub: &Subscription) -> bool {
        self.is_alive(sub.source) && self.is_alive(sub.target)
    }
}

/// Diagnostics snapshot of the subscription table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub total: usize,
    pub valid: usize,
    /// Subscriptions whose source or target has been retired
    pub stale: usize,
    pub endpoints: usize,
    pub retired_endpoints: usize,
    pub events_published: u64,
}

/// Event bus shared by every component of a session
#[derive(Default)]
pub struct EventBus {
    state: RefCell<BusState>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. `emits` lists the topics it may publish; pure
    /// targets pass an empty slice.
    pub fn register(&self, name: &str, emits: &[Topic]) -> EndpointId {
        let id = EndpointId::generate();
        self.state.borrow_mut().endpoints.insert(
            id,
            Endpoint {
                name: name.to_string(),
                emits: emits.iter().copied().collect(),
                alive: true,
            },
        );
        debug!("Registered endpoint '{}'", name);
        id
    }

    /// Mark an endpoint as gone. Its subscriptions become stale.
    pub fn retire(&self, endpoint: EndpointId) -> bool {
        let mut state = self.state.borrow_mut();
        match state.endpoints.get_mut(&endpoint) {
            Some(e) if e.alive => {
                e.alive = false;
                debug!("Retired endpoint '{}'", e.name);
                true
            }
            _ => false,
        }
    }

    pub fn is_alive(&self, endpoint: EndpointId) -> bool {
        self.state.borrow().is_alive(endpoint)
    }

    /// Subscribe `handler`, owned by `target`, to `topic` published by `source`.
    ///
    /// Returns [`SubscriptionId::INVALID`] if either endpoint is absent or
    /// retired, or the source does not declare the topic.
    pub fn subscribe<F>(
        &self,
        source: EndpointId,
        topic: Topic,
        target: EndpointId,
        handler: F,
    ) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        let mut state = self.state.borrow_mut();

        let Some(src) = state.endpoints.get(&source).filter(|e| e.alive) else {
            warn!("Subscribe to '{}' failed: source is absent", topic);
            return SubscriptionId::INVALID;
        };
        if !src.emits.contains(&topic) {
            warn!(
                "Subscribe failed: source '{}' does not emit '{}'",
                src.name, topic
            );
            return SubscriptionId::INVALID;
        }
        if !state.is_alive(target) {
            warn!("Subscribe to '{}' failed: target is absent", topic);
            return SubscriptionId::INVALID;
        }

        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        let handler: Handler = Rc::new(RefCell::new(handler));
        state.subscriptions.push(Subscription {
            id,
            source,
            topic,
            target,
            handler,
        });
        id
    }

    /// Subscribe using a topic's wire name
    pub fn subscribe_named<F>(
        &self,
        source: EndpointId,
        topic: &str,
        target: EndpointId,
        handler: F,
    ) -> SubscriptionId
    where
        F: FnMut(&GameEvent) + 'static,
    {
        match Topic::from_name(topic) {
            Some(topic) => self.subscribe(source, topic, target, handler),
            None => {
                warn!("Subscribe failed: unknown topic '{}'", topic);
                SubscriptionId::INVALID
            }
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.borrow_mut();
        match state.subscriptions.iter().position(|s| s.id == id) {
            Some(index) => {
                state.subscriptions.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every subscription owned by `target`
    pub fn unsubscribe_all_for(&self, target: EndpointId) -> usize {
        let mut state = self.state.borrow_mut();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.target != target);
        before - state.subscriptions.len()
    }

    /// Remove subscriptions whose source or target is no longer valid, and
    /// forget retired endpoints that no longer own anything.
    pub fn cleanup_stale(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let before = state.subscriptions.len();

        let mut subscriptions = std::mem::take(&mut state.subscriptions);
        subscriptions.retain(|s| state.is_subscription_valid(s));
        state.subscriptions = subscriptions;
        state.endpoints.retain(|_, e| e.alive);

        let removed = before - state.subscriptions.len();
        if removed > 0 {
            debug!("Cleaned up {} stale subscriptions", removed);
        }
        removed
    }

    /// Drop every subscription. Used at shutdown.
    pub fn force_cleanup_all(&self) {
        let mut state = self.state.borrow_mut();
        let count = state.subscriptions.len();
        state.subscriptions.clear();
        info!("Force-cleaned {} subscriptions", count);
    }

    /// Deliver `event` from `source` to every subscriber, in subscription order.
    /// Returns the number of handlers invoked.
    pub fn publish(&self, source: EndpointId, event: GameEvent) -> usize {
        let topic = event.topic();

        let snapshot: SmallVec<[(SubscriptionId, Handler); 8]> = {
            let mut state = self.state.borrow_mut();
            let Some(src) = state.endpoints.get(&source).filter(|e| e.alive) else {
                warn!("Publish of '{}' dropped: source is absent", topic);
                return 0;
            };
            if !src.emits.contains(&topic) {
                warn!(
                    "Publish dropped: source '{}' does not declare '{}'",
                    src.name, topic
                );
                return 0;
            }
            state.published += 1;
            state
                .subscriptions
                .iter()
                .filter(|s| s.source == source && s.topic == topic)
                .map(|s| (s.id, s.handler.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, handler) in snapshot {
            let still_valid = {
                let state = self.state.borrow();
                state
                    .subscriptions
                    .iter()
                    .find(|s| s.id == id)
                    .is_some_and(|s| state.is_subscription_valid(s))
            };
            if !still_valid {
                continue;
            }

            match handler.try_borrow_mut() {
                Ok(mut callback) => {
                    (&mut *callback)(&event);
                    delivered += 1;
                }
                Err(_) => {
                    warn!("Handler {:?} re-entered while handling '{}', skipped", id, topic);
                }
            }
        }
        delivered
    }

    /// Subscription counts partitioned by validity
    pub fn connection_stats(&self) -> ConnectionStats {
        let state = self.state.borrow();
        let total = state.subscriptions.len();
        let valid = state
            .subscriptions
            .iter()
            .filter(|s| state.is_subscription_valid(s))
            .count();
        let retired_endpoints = state.endpoints.values().filter(|e| !e.alive).count();

        ConnectionStats {
            total,
            valid,
            stale: total - valid,
            endpoints: state.endpoints.len(),
            retired_endpoints,
            events_published: state.published,
        }
    }

    /// Number of live subscriptions on a topic (any source)
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.state
            .borrow()
            .subscriptions
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }
}
