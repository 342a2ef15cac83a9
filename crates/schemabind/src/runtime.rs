//! Provider runtime boundary and in-memory hub
//!
//! The tracker observes a [`ProviderRuntime`]: a population of providers that
//! can be snapshotted and that notifies attached [`ProviderObserver`]s about
//! lifecycle transitions. [`ProviderHub`] is the in-memory implementation
//! used by embedders that drive the population themselves, and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::provider::{Provider, ProviderId};

/// Receives provider lifecycle events from a runtime.
///
/// Events may be delivered from multiple threads, including concurrently for
/// different providers; observers are responsible for their own
/// serialization.
pub trait ProviderObserver: Send + Sync {
    /// A provider joined the population.
    fn provider_appeared(&self, provider: Arc<dyn Provider>);

    /// A provider's advertised capabilities may have changed.
    fn provider_updated(&self, provider: Arc<dyn Provider>);

    /// A provider left the population.
    fn provider_disappeared(&self, provider: Arc<dyn Provider>);
}

/// Identifies an observer attachment so it can be detached later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A population of providers that can be observed.
pub trait ProviderRuntime: Send + Sync {
    /// Providers currently present, in arrival order.
    fn active_providers(&self) -> Vec<Arc<dyn Provider>>;

    /// Attach an observer for subsequent lifecycle events.
    ///
    /// Attaching does not replay the current population; callers that need it
    /// combine `attach` with [`active_providers`](Self::active_providers).
    fn attach(&self, observer: Arc<dyn ProviderObserver>) -> SubscriptionId;

    /// Detach a previously attached observer.
    fn detach(&self, subscription: SubscriptionId);
}

#[derive(Default)]
struct HubInner {
    providers: Vec<Arc<dyn Provider>>,
    observers: HashMap<u64, Arc<dyn ProviderObserver>>,
    next_subscription: u64,
}

/// In-memory [`ProviderRuntime`].
///
/// `install`, `update`, and `remove` mutate the population and notify
/// observers synchronously on the calling thread. Notification happens
/// outside the hub's own lock, so observers may call back into the hub.
#[derive(Default)]
pub struct ProviderHub {
    inner: RwLock<HubInner>,
}

impl ProviderHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider to the population and notify observers.
    ///
    /// Installing an already-present identity replaces the stored provider in
    /// place and is delivered as an update.
    pub fn install(&self, provider: Arc<dyn Provider>) {
        let id = provider.id();
        let replaced = {
            let mut inner = self.inner.write();
            match inner.providers.iter_mut().find(|p| p.id() == id) {
                Some(slot) => {
                    *slot = Arc::clone(&provider);
                    true
                }
                None => {
                    inner.providers.push(Arc::clone(&provider));
                    false
                }
            }
        };
        if replaced {
            debug!("Provider '{}' reinstalled, delivering as update", id);
            self.notify(|observer| observer.provider_updated(Arc::clone(&provider)));
        } else {
            debug!("Provider '{}' installed", id);
            self.notify(|observer| observer.provider_appeared(Arc::clone(&provider)));
        }
    }

    /// Replace a provider's stored state and deliver an update event.
    pub fn update(&self, provider: Arc<dyn Provider>) {
        let id = provider.id();
        {
            let mut inner = self.inner.write();
            match inner.providers.iter_mut().find(|p| p.id() == id) {
                Some(slot) => *slot = Arc::clone(&provider),
                None => inner.providers.push(Arc::clone(&provider)),
            }
        }
        debug!("Provider '{}' updated", id);
        self.notify(|observer| observer.provider_updated(Arc::clone(&provider)));
    }

    /// Remove a provider from the population and notify observers.
    pub fn remove(&self, id: &ProviderId) {
        let removed = {
            let mut inner = self.inner.write();
            let position = inner.providers.iter().position(|p| p.id() == *id);
            position.map(|pos| inner.providers.remove(pos))
        };
        if let Some(provider) = removed {
            debug!("Provider '{}' removed", id);
            self.notify(|observer| observer.provider_disappeared(Arc::clone(&provider)));
        }
    }

    fn notify(&self, deliver: impl Fn(&Arc<dyn ProviderObserver>)) {
        let observers: Vec<Arc<dyn ProviderObserver>> =
            self.inner.read().observers.values().cloned().collect();
        for observer in &observers {
            deliver(observer);
        }
    }
}

impl ProviderRuntime for ProviderHub {
    fn active_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.inner.read().providers.clone()
    }

    fn attach(&self, observer: Arc<dyn ProviderObserver>) -> SubscriptionId {
        let mut inner = self.inner.write();
        let id = inner.next_subscription;
        inner.next_subscription += 1;
        inner.observers.insert(id, observer);
        SubscriptionId(id)
    }

    fn detach(&self, subscription: SubscriptionId) {
        self.inner.write().observers.remove(&subscription.0);
    }
}
