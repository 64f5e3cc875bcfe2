//! Cache Events Module
//!
//! Observable hooks invoked on set/delete/evict. The hub owns the
//! subscription registry; filtering, debouncing, and listener lifecycle
//! beyond unsubscribe/prune are owned by the subscribers themselves.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

/// Listener failures tolerated before `prune` drops the subscription.
const MAX_LISTENER_FAILURES: u32 = 3;

// == Cache Event ==
/// A mutation observed by the cache core. Keys are canonical forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// An item was written
    Set {
        /// Canonical key
        key: String,
    },
    /// An item was explicitly deleted
    Deleted {
        /// Canonical key
        key: String,
    },
    /// An item was evicted under capacity pressure
    Evicted {
        /// Canonical key
        key: String,
    },
}

// == Subscription Handle ==
/// Generation-tagged handle identifying one subscription.
///
/// Handles never recycle ids, so a stale handle can never unsubscribe a
/// later listener. Unsubscribing is mandatory for listeners that go away;
/// `prune` is the cleanup mechanism for listeners that keep failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
}

type Listener = Box<dyn Fn(&CacheEvent) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&CacheEvent) + Send + Sync>;

struct Subscription {
    id: u64,
    listener: Listener,
    error_hook: Option<ErrorHook>,
    failures: u32,
}

// == Cache Event Hub ==
/// Subscription registry with per-listener failure isolation.
///
/// One listener failing never blocks delivery to the others; the failure
/// is routed to that subscription's error hook if present, else logged.
pub struct CacheEventHub {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl CacheEventHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a listener.
    pub fn subscribe(
        &mut self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_inner(Box::new(listener), None)
    }

    /// Registers a listener with a per-subscription error hook that
    /// receives the event a delivery failed on.
    pub fn subscribe_with_error_hook(
        &mut self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
        error_hook: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_inner(Box::new(listener), Some(Box::new(error_hook)))
    }

    fn subscribe_inner(&mut self, listener: Listener, error_hook: Option<ErrorHook>) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            listener,
            error_hook,
            failures: 0,
        });
        SubscriptionHandle { id }
    }

    /// Removes a subscription. Returns false for unknown or already
    /// removed handles.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != handle.id);
        self.subscriptions.len() != before
    }

    /// Delivers an event to every subscription, isolating failures per
    /// listener.
    pub fn emit(&mut self, event: &CacheEvent) {
        for sub in &mut self.subscriptions {
            let outcome = catch_unwind(AssertUnwindSafe(|| (sub.listener)(event)));
            if outcome.is_err() {
                sub.failures += 1;
                match &sub.error_hook {
                    Some(hook) => {
                        // The hook itself is isolated the same way.
                        let _ = catch_unwind(AssertUnwindSafe(|| hook(event)));
                    }
                    None => warn!(subscription = sub.id, ?event, "cache listener failed"),
                }
            }
        }
    }

    /// Drops subscriptions that failed too many deliveries. Returns how
    /// many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|sub| sub.failures < MAX_LISTENER_FAILURES);
        before - self.subscriptions.len()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true when no subscriptions are registered.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for CacheEventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheEventHub {
    /// Listeners are tied to the instance they subscribed to; a cloned
    /// cache starts with an empty registry.
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheEventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEventHub")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
