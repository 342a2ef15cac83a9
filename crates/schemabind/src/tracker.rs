//! Capability-tracked selection of a schema provider
//!
//! [`SchemaTracker`] reacts to provider lifecycle events, keeps the
//! [`CandidateRegistry`] consistent with "currently satisfies the selector",
//! and binds the underlying store to the first candidate whose migration
//! succeeds. Once bound, the migrated store is republished with provenance
//! metadata; when the bound provider disappears or stops matching, the
//! publication is withdrawn and the remaining candidates are scanned again.
//!
//! Every event handler runs entirely under one mutex, so handlers never
//! interleave and at most one publication is live per tracker at any instant.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::TrackerError;
use crate::migrate::MigrationService;
use crate::provider::{CapabilityDescriptor, Provider, ProviderId};
use crate::publish::{PublicationHandle, PublicationRegistry, ServiceMetadata, build_metadata};
use crate::registry::{CandidateEntry, CandidateRegistry};
use crate::runtime::{ProviderObserver, ProviderRuntime, SubscriptionId};
use crate::selector::SchemaSelector;

/// The provider currently backing the published resource.
struct ActiveSelection {
    provider_id: ProviderId,
    descriptor: CapabilityDescriptor,
    handle: PublicationHandle,
}

#[derive(Default)]
struct TrackerState {
    candidates: CandidateRegistry,
    active: Option<ActiveSelection>,
    started: bool,
    subscription: Option<SubscriptionId>,
}

/// Tracks schema capability providers and republishes a data store once one
/// of them has migrated it.
///
/// Built via [`SchemaTracker::builder`]; the selector expression is compiled
/// at build time and an invalid expression fails construction. Call
/// [`start`](Self::start) to begin observing the configured runtime and
/// [`stop`](Self::stop) to withdraw any publication and detach.
pub struct SchemaTracker<R> {
    selector: SchemaSelector,
    config_id: String,
    resource: R,
    provenance: ServiceMetadata,
    migrator: Arc<dyn MigrationService<R>>,
    publisher: Arc<dyn PublicationRegistry<R>>,
    runtime: Arc<dyn ProviderRuntime>,
    state: Mutex<TrackerState>,
}

impl<R: Clone + Send + Sync + 'static> SchemaTracker<R> {
    /// Start building a tracker.
    pub fn builder() -> SchemaTrackerBuilder<R> {
        SchemaTrackerBuilder::new()
    }

    /// Begin observing the runtime's provider population.
    ///
    /// Providers already present are replayed as synthetic appeared events,
    /// so the registry reaches its initial steady state synchronously. A
    /// publication failure during the replay is propagated; the tracker stays
    /// started and unbound, and the failed candidate is retried on the next
    /// lifecycle event.
    pub fn start(self: &Arc<Self>) -> Result<(), TrackerError> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(TrackerError::AlreadyStarted);
            }
            state.started = true;
        }

        let observer: Arc<dyn ProviderObserver> = self.clone();
        let subscription = self.runtime.attach(observer);
        self.state.lock().subscription = Some(subscription);
        debug!(
            "Tracker '{}' observing providers for selector '{}'",
            self.config_id,
            self.selector.expression()
        );

        for provider in self.runtime.active_providers() {
            self.handle_provider_change(provider)?;
        }
        Ok(())
    }

    /// Stop observing, withdrawing the published resource if one is live.
    ///
    /// Idempotent: calling `stop` on a tracker that is not started is a
    /// no-op.
    pub fn stop(&self) {
        let subscription = {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }
            state.started = false;
            if let Some(active) = state.active.take() {
                info!(
                    "Tracker '{}' stopping, withdrawing resource bound to provider '{}'",
                    self.config_id, active.provider_id
                );
                self.publisher.withdraw(active.handle);
            }
            state.candidates.clear();
            state.subscription.take()
        };
        if let Some(subscription) = subscription {
            self.runtime.detach(subscription);
        }
    }

    /// Whether a provider is currently selected and published.
    pub fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Identity of the currently selected provider, if any.
    pub fn active_provider(&self) -> Option<ProviderId> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|active| active.provider_id.clone())
    }

    /// Number of providers currently satisfying the selector.
    pub fn candidate_count(&self) -> usize {
        self.state.lock().candidates.len()
    }

    /// The compiled selector this tracker matches capabilities against.
    pub fn selector(&self) -> &SchemaSelector {
        &self.selector
    }

    /// First capability whose attributes satisfy the selector, scanning the
    /// provider's descriptors in their declared order.
    fn find_matching_capability(&self, provider: &dyn Provider) -> Option<CapabilityDescriptor> {
        provider
            .capabilities()
            .into_iter()
            .find(|descriptor| self.selector.matches(descriptor.attributes()))
    }

    /// Appeared and updated events share one path: re-evaluate the provider,
    /// reconcile the registry, and scan if nothing is bound.
    fn handle_provider_change(&self, provider: Arc<dyn Provider>) -> Result<(), TrackerError> {
        let matched = self.find_matching_capability(provider.as_ref());
        let id = provider.id();
        let mut state = self.state.lock();
        // An event can still be in flight while stop() runs; once stopped,
        // nothing may be tracked or published again.
        if !state.started {
            return Ok(());
        }

        let binding_stale = match state.active.as_ref() {
            Some(active) if active.provider_id == id => {
                if matched.as_ref() == Some(&active.descriptor) {
                    // The bound provider re-announced an unchanged capability.
                    // Its registry entry is already current, so nothing to do:
                    // no re-migration, no re-publication.
                    debug!("Provider '{}' unchanged, keeping active selection", id);
                    return Ok(());
                }
                // The bound provider changed its capability or stopped
                // matching. The binding is stale either way.
                true
            }
            _ => false,
        };
        if binding_stale {
            if let Some(active) = state.active.take() {
                info!(
                    "Active provider '{}' no longer offers the selected capability, withdrawing",
                    id
                );
                self.publisher.withdraw(active.handle);
            }
        }

        match matched {
            Some(descriptor) => {
                debug!(
                    "Provider '{}' offers schema '{}', tracking as candidate",
                    id,
                    self.selector.schema_name()
                );
                state.candidates.upsert(CandidateEntry {
                    provider,
                    descriptor,
                });
            }
            None => {
                if state.candidates.remove(&id).is_some() {
                    debug!("Provider '{}' no longer matches selector, dropped", id);
                }
            }
        }

        if state.active.is_none() {
            self.scan(&mut state)?;
        }
        Ok(())
    }

    fn handle_provider_removed(&self, id: &ProviderId) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        if !state.started {
            return Ok(());
        }
        state.candidates.remove(id);

        let was_active = state
            .active
            .as_ref()
            .is_some_and(|active| active.provider_id == *id);
        if was_active {
            if let Some(active) = state.active.take() {
                info!(
                    "Active provider '{}' disappeared, withdrawing published resource",
                    id
                );
                self.publisher.withdraw(active.handle);
            }
            self.scan(&mut state)?;
        }
        Ok(())
    }

    /// Attempt candidates in registry order until one migration succeeds.
    ///
    /// Runs only while nothing is bound; the caller holds the state lock, so
    /// the whole scan is one critical section. A candidate whose migration
    /// fails is logged and skipped, never retried until a fresh lifecycle
    /// event re-adds it.
    fn scan(&self, state: &mut TrackerState) -> Result<(), TrackerError> {
        if state.active.is_some() {
            return Ok(());
        }
        if state.candidates.is_empty() {
            debug!(
                "No candidate offers schema '{}', staying unbound",
                self.selector.schema_name()
            );
            return Ok(());
        }

        let candidates: Vec<CandidateEntry> = state.candidates.iter_eligible().cloned().collect();
        for entry in candidates {
            let id = entry.provider.id();
            let resource_name = match entry.descriptor.resource_name() {
                Some(resource) => resource.to_string(),
                // matches() guarantees the attribute; a non-string value
                // cannot name a resource, so the entry is skipped.
                None => continue,
            };

            match self
                .migrator
                .apply(&self.resource, entry.provider.as_ref(), &resource_name)
            {
                Ok(()) => {
                    info!(
                        "Migrated store with schema resource '{}' from provider '{}', publishing",
                        resource_name, id
                    );
                    let metadata =
                        build_metadata(&self.provenance, &self.config_id, &self.selector, &entry);
                    match self.publisher.publish(self.resource.clone(), metadata) {
                        Ok(handle) => {
                            state.active = Some(ActiveSelection {
                                provider_id: id,
                                descriptor: entry.descriptor,
                                handle,
                            });
                            return Ok(());
                        }
                        Err(err) => {
                            // The migration is not undone. The candidate stays
                            // registered and publication is retried when the
                            // next lifecycle event re-enters the scan.
                            error!(
                                "Failed to publish migrated resource from provider '{}': {}",
                                id, err
                            );
                            return Err(TrackerError::Publication(err));
                        }
                    }
                }
                Err(err) => {
                    error!(
                        "Could not migrate store with schema resource '{}' of provider '{}': {}",
                        resource_name, id, err
                    );
                    state.candidates.mark_failed(&id);
                }
            }
        }

        debug!(
            "No candidate could migrate schema '{}', staying unbound",
            self.selector.schema_name()
        );
        Ok(())
    }
}

impl<R: Clone + Send + Sync + 'static> ProviderObserver for SchemaTracker<R> {
    fn provider_appeared(&self, provider: Arc<dyn Provider>) {
        if let Err(err) = self.handle_provider_change(provider) {
            error!("{}", err);
        }
    }

    fn provider_updated(&self, provider: Arc<dyn Provider>) {
        if let Err(err) = self.handle_provider_change(provider) {
            error!("{}", err);
        }
    }

    fn provider_disappeared(&self, provider: Arc<dyn Provider>) {
        if let Err(err) = self.handle_provider_removed(&provider.id()) {
            error!("{}", err);
        }
    }
}

/// Builder for [`SchemaTracker`].
///
/// All collaborators except the provenance metadata are required; `build`
/// compiles the selector expression and fails fast on configuration errors.
pub struct SchemaTrackerBuilder<R> {
    selector: Option<String>,
    config_id: Option<String>,
    resource: Option<R>,
    provenance: ServiceMetadata,
    migrator: Option<Arc<dyn MigrationService<R>>>,
    publisher: Option<Arc<dyn PublicationRegistry<R>>>,
    runtime: Option<Arc<dyn ProviderRuntime>>,
}

impl<R: Clone + Send + Sync + 'static> SchemaTrackerBuilder<R> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            selector: None,
            config_id: None,
            resource: None,
            provenance: ServiceMetadata::new(),
            migrator: None,
            publisher: None,
            runtime: None,
        }
    }

    /// The schema selector expression, `schemaName[;filter:=(expression)]`.
    pub fn selector(mut self, expression: impl Into<String>) -> Self {
        self.selector = Some(expression.into());
        self
    }

    /// Identity of the owning configuration, recorded in published metadata.
    pub fn config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// The underlying store handle to migrate and republish.
    pub fn resource(mut self, resource: R) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Provenance metadata describing the underlying store itself.
    pub fn provenance(mut self, provenance: ServiceMetadata) -> Self {
        self.provenance = provenance;
        self
    }

    /// The migration engine applied to each candidate.
    pub fn migration_service(mut self, migrator: Arc<dyn MigrationService<R>>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    /// The registry through which the migrated store is republished.
    pub fn publication_registry(mut self, publisher: Arc<dyn PublicationRegistry<R>>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// The provider runtime to observe.
    pub fn runtime(mut self, runtime: Arc<dyn ProviderRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Compile the selector and assemble the tracker.
    pub fn build(self) -> Result<Arc<SchemaTracker<R>>, TrackerError> {
        let expression = self
            .selector
            .ok_or(TrackerError::MissingDependency("a selector expression"))?;
        let selector = SchemaSelector::parse(&expression)?;
        Ok(Arc::new(SchemaTracker {
            selector,
            config_id: self
                .config_id
                .ok_or(TrackerError::MissingDependency("a configuration id"))?,
            resource: self
                .resource
                .ok_or(TrackerError::MissingDependency("an underlying resource"))?,
            provenance: self.provenance,
            migrator: self
                .migrator
                .ok_or(TrackerError::MissingDependency("a migration service"))?,
            publisher: self
                .publisher
                .ok_or(TrackerError::MissingDependency("a publication registry"))?,
            runtime: self
                .runtime
                .ok_or(TrackerError::MissingDependency("a provider runtime"))?,
            state: Mutex::new(TrackerState::default()),
        }))
    }
}

impl<R: Clone + Send + Sync + 'static> Default for SchemaTrackerBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
