//! End-to-end tracker lifecycle tests
//!
//! Drives a [`SchemaTracker`] through an in-memory [`ProviderHub`] with
//! recording doubles for the migration service and the publication registry,
//! covering selection, failover, withdrawal, and publication failure.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use schemabind::{
    ATTR_SCHEMA_NAME, ATTR_SCHEMA_RESOURCE, AttrValue, CapabilityDescriptor, META_PROVIDER_ID,
    META_SCHEMA_NAME, META_SCHEMA_RESOURCE, META_STORE_ID, META_WRAPPED_STORE_ID, MigrationError,
    MigrationService, Provider, ProviderHub, ProviderId, PublicationHandle, PublicationRegistry,
    PublishError, SchemaTracker, ServiceMetadata, StaticProvider, TrackerError,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct PublisherState {
    next_handle: u64,
    live: HashSet<u64>,
    max_live: usize,
    publishes: Vec<ServiceMetadata>,
    withdraws: usize,
    failures_remaining: usize,
}

/// Publication registry that records every call and can be scripted to fail.
#[derive(Default)]
struct RecordingPublisher {
    state: Mutex<PublisherState>,
}

impl RecordingPublisher {
    fn fail_next(&self, times: usize) {
        self.state.lock().failures_remaining = times;
    }

    fn publish_count(&self) -> usize {
        self.state.lock().publishes.len()
    }

    fn withdraw_count(&self) -> usize {
        self.state.lock().withdraws
    }

    fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    fn max_live(&self) -> usize {
        self.state.lock().max_live
    }

    fn last_metadata(&self) -> Option<ServiceMetadata> {
        self.state.lock().publishes.last().cloned()
    }
}

impl PublicationRegistry<String> for RecordingPublisher {
    fn publish(
        &self,
        _resource: String,
        metadata: ServiceMetadata,
    ) -> Result<PublicationHandle, PublishError> {
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(PublishError::new("registry unavailable"));
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.live.insert(handle);
        state.max_live = state.max_live.max(state.live.len());
        state.publishes.push(metadata);
        Ok(PublicationHandle::new(handle))
    }

    fn withdraw(&self, handle: PublicationHandle) {
        let mut state = self.state.lock();
        assert!(
            state.live.remove(&handle.raw()),
            "withdraw of a handle that is not live"
        );
        state.withdraws += 1;
    }
}

/// Migration service that succeeds unless a resource is scripted to fail,
/// recording every invocation.
#[derive(Default)]
struct ScriptedMigrator {
    failing_resources: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(ProviderId, String)>>,
}

impl ScriptedMigrator {
    fn fail_resource(&self, resource: &str) {
        self.failing_resources.lock().insert(resource.to_string());
    }

    fn calls(&self) -> Vec<(ProviderId, String)> {
        self.calls.lock().clone()
    }

    fn calls_for(&self, resource: &str) -> usize {
        self.calls.lock().iter().filter(|(_, r)| r == resource).count()
    }
}

impl MigrationService<String> for ScriptedMigrator {
    fn apply(
        &self,
        _target: &String,
        provider: &dyn Provider,
        resource: &str,
    ) -> Result<(), MigrationError> {
        self.calls
            .lock()
            .push((provider.id(), resource.to_string()));
        if self.failing_resources.lock().contains(resource) {
            return Err(MigrationError::new("changelog could not be applied"));
        }
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    hub: Arc<ProviderHub>,
    publisher: Arc<RecordingPublisher>,
    migrator: Arc<ScriptedMigrator>,
    tracker: Arc<SchemaTracker<String>>,
}

impl Fixture {
    fn new(selector: &str) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let hub = Arc::new(ProviderHub::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let migrator = Arc::new(ScriptedMigrator::default());

        let mut provenance = ServiceMetadata::new();
        provenance.insert(META_STORE_ID.to_string(), AttrValue::from("store-42"));

        let tracker = SchemaTracker::builder()
            .selector(selector)
            .config_id("test-config")
            .resource("connection-pool".to_string())
            .provenance(provenance)
            .migration_service(migrator.clone())
            .publication_registry(publisher.clone())
            .runtime(hub.clone())
            .build()
            .unwrap();

        Self {
            hub,
            publisher,
            migrator,
            tracker,
        }
    }

    fn started(selector: &str) -> Self {
        let fixture = Self::new(selector);
        fixture.tracker.start().unwrap();
        fixture
    }
}

fn provider(id: &str, schema: &str, resource: &str) -> Arc<dyn Provider> {
    Arc::new(
        StaticProvider::new(id, format!("Provider {}", id), "1.0.0").with_capability(
            CapabilityDescriptor::new()
                .with_attr(ATTR_SCHEMA_NAME, schema)
                .with_attr(ATTR_SCHEMA_RESOURCE, resource),
        ),
    )
}

fn meta_str<'a>(metadata: &'a ServiceMetadata, key: &str) -> &'a str {
    metadata
        .get(key)
        .and_then(AttrValue::as_str)
        .unwrap_or_else(|| panic!("metadata key '{}' missing", key))
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn single_matching_provider_becomes_active() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));

    assert!(fixture.tracker.is_active());
    assert_eq!(fixture.tracker.active_provider(), Some(ProviderId::from("p1")));
    assert_eq!(fixture.publisher.publish_count(), 1);
    assert_eq!(fixture.publisher.live_count(), 1);

    let metadata = fixture.publisher.last_metadata().unwrap();
    assert_eq!(meta_str(&metadata, META_SCHEMA_NAME), "myApp");
    assert_eq!(meta_str(&metadata, META_PROVIDER_ID), "p1");
    assert_eq!(meta_str(&metadata, META_WRAPPED_STORE_ID), "store-42");
}

#[test]
fn non_matching_provider_never_published() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "otherApp", "changelog.xml"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.tracker.candidate_count(), 0);
    assert_eq!(fixture.publisher.publish_count(), 0);
    assert!(fixture.migrator.calls().is_empty());
}

#[test]
fn first_failing_candidate_is_skipped() {
    let fixture = Fixture::started("myApp");
    fixture.migrator.fail_resource("changelog-a.xml");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.install(provider("p2", "myApp", "changelog-b.xml"));

    assert_eq!(fixture.tracker.active_provider(), Some(ProviderId::from("p2")));
    let metadata = fixture.publisher.last_metadata().unwrap();
    assert_eq!(meta_str(&metadata, META_SCHEMA_RESOURCE), "changelog-b.xml");
    // The failed candidate stays registered but is not re-attempted by the
    // scan that p2's arrival triggers
    assert_eq!(fixture.tracker.candidate_count(), 2);
    assert_eq!(fixture.migrator.calls_for("changelog-a.xml"), 1);
}

#[test]
fn first_match_among_provider_capabilities_wins() {
    let fixture = Fixture::started("myApp");

    let multi = Arc::new(
        StaticProvider::new("p1", "Provider p1", "1.0.0")
            .with_capability(
                CapabilityDescriptor::new()
                    .with_attr(ATTR_SCHEMA_NAME, "otherApp")
                    .with_attr(ATTR_SCHEMA_RESOURCE, "other.xml"),
            )
            .with_capability(
                CapabilityDescriptor::new()
                    .with_attr(ATTR_SCHEMA_NAME, "myApp")
                    .with_attr(ATTR_SCHEMA_RESOURCE, "first-match.xml"),
            )
            .with_capability(
                CapabilityDescriptor::new()
                    .with_attr(ATTR_SCHEMA_NAME, "myApp")
                    .with_attr(ATTR_SCHEMA_RESOURCE, "second-match.xml"),
            ),
    );
    fixture.hub.install(multi);

    let metadata = fixture.publisher.last_metadata().unwrap();
    assert_eq!(meta_str(&metadata, META_SCHEMA_RESOURCE), "first-match.xml");
}

#[test]
fn selector_filter_narrows_candidates() {
    let fixture = Fixture::started("myApp;filter:=(stage=prod)");

    fixture.hub.install(Arc::new(
        StaticProvider::new("p1", "Provider p1", "1.0.0").with_capability(
            CapabilityDescriptor::new()
                .with_attr(ATTR_SCHEMA_NAME, "myApp")
                .with_attr(ATTR_SCHEMA_RESOURCE, "staging.xml")
                .with_attr("stage", "test"),
        ),
    ));
    assert!(!fixture.tracker.is_active());

    fixture.hub.install(Arc::new(
        StaticProvider::new("p2", "Provider p2", "1.0.0").with_capability(
            CapabilityDescriptor::new()
                .with_attr(ATTR_SCHEMA_NAME, "myApp")
                .with_attr(ATTR_SCHEMA_RESOURCE, "prod.xml")
                .with_attr("stage", "prod"),
        ),
    ));
    assert_eq!(fixture.tracker.active_provider(), Some(ProviderId::from("p2")));
}

// ============================================================================
// Failover and withdrawal
// ============================================================================

#[test]
fn failover_to_next_candidate_when_active_disappears() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.install(provider("p2", "myApp", "changelog-b.xml"));
    assert_eq!(fixture.tracker.active_provider(), Some(ProviderId::from("p1")));

    fixture.hub.remove(&ProviderId::from("p1"));

    assert_eq!(fixture.tracker.active_provider(), Some(ProviderId::from("p2")));
    assert_eq!(fixture.publisher.withdraw_count(), 1);
    assert_eq!(fixture.publisher.publish_count(), 2);
    assert_eq!(fixture.publisher.max_live(), 1);
}

#[test]
fn last_provider_disappearing_leaves_tracker_unbound() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.remove(&ProviderId::from("p1"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.tracker.candidate_count(), 0);
    assert_eq!(fixture.publisher.withdraw_count(), 1);
    assert_eq!(fixture.publisher.live_count(), 0);
}

#[test]
fn active_provider_updated_to_non_match_is_dropped() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    assert!(fixture.tracker.is_active());

    fixture.hub.update(provider("p1", "otherApp", "changelog-a.xml"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.tracker.candidate_count(), 0);
    assert_eq!(fixture.publisher.withdraw_count(), 1);
}

#[test]
fn idle_candidate_updated_to_non_match_is_never_offered() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.install(provider("p2", "myApp", "changelog-b.xml"));
    // p1 is active, p2 waits in the registry untried
    assert_eq!(fixture.migrator.calls_for("changelog-b.xml"), 0);

    fixture.hub.update(provider("p2", "otherApp", "changelog-b.xml"));
    fixture.hub.remove(&ProviderId::from("p1"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.migrator.calls_for("changelog-b.xml"), 0);
}

#[test]
fn repeated_identical_update_of_active_provider_is_noop() {
    let fixture = Fixture::started("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    assert_eq!(fixture.publisher.publish_count(), 1);

    fixture.hub.update(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.update(provider("p1", "myApp", "changelog-a.xml"));

    assert_eq!(fixture.publisher.publish_count(), 1);
    assert_eq!(fixture.publisher.withdraw_count(), 0);
    assert_eq!(fixture.migrator.calls().len(), 1);
    assert!(fixture.tracker.is_active());
}

// ============================================================================
// Start / stop
// ============================================================================

#[test]
fn start_replays_providers_already_present() {
    let fixture = Fixture::new("myApp");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    assert_eq!(fixture.publisher.publish_count(), 0);

    fixture.tracker.start().unwrap();

    assert!(fixture.tracker.is_active());
    assert_eq!(fixture.publisher.publish_count(), 1);
}

#[test]
fn start_twice_is_an_error() {
    let fixture = Fixture::started("myApp");
    assert!(matches!(
        fixture.tracker.start(),
        Err(TrackerError::AlreadyStarted)
    ));
}

#[test]
fn stop_while_active_withdraws_exactly_once() {
    let fixture = Fixture::started("myApp");
    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));

    fixture.tracker.stop();

    assert_eq!(fixture.publisher.withdraw_count(), 1);
    assert_eq!(fixture.publisher.live_count(), 0);
    assert!(!fixture.tracker.is_active());

    // Idempotent: a second stop does nothing
    fixture.tracker.stop();
    assert_eq!(fixture.publisher.withdraw_count(), 1);
}

#[test]
fn stop_while_idle_withdraws_nothing() {
    let fixture = Fixture::started("myApp");
    fixture.tracker.stop();
    assert_eq!(fixture.publisher.withdraw_count(), 0);
}

#[test]
fn stopped_tracker_ignores_further_events() {
    let fixture = Fixture::started("myApp");
    fixture.tracker.stop();

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.publisher.publish_count(), 0);
}

// ============================================================================
// Publication failure
// ============================================================================

#[test]
fn publication_failure_leaves_tracker_unbound_and_is_retried() {
    let fixture = Fixture::started("myApp");
    fixture.publisher.fail_next(1);

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));

    assert!(!fixture.tracker.is_active());
    assert_eq!(fixture.publisher.live_count(), 0);
    assert_eq!(fixture.tracker.candidate_count(), 1);

    // The next lifecycle event re-enters the scan and publication succeeds
    fixture.hub.update(provider("p1", "myApp", "changelog-a.xml"));

    assert!(fixture.tracker.is_active());
    assert_eq!(fixture.publisher.live_count(), 1);
    assert_eq!(fixture.publisher.withdraw_count(), 0);
}

#[test]
fn publication_failure_during_start_is_propagated() {
    let fixture = Fixture::new("myApp");
    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.publisher.fail_next(1);

    assert!(matches!(
        fixture.tracker.start(),
        Err(TrackerError::Publication(_))
    ));
    assert!(!fixture.tracker.is_active());
}

// ============================================================================
// Invariants over longer sequences
// ============================================================================

#[test]
fn at_most_one_publication_live_over_arbitrary_sequence() {
    let fixture = Fixture::started("myApp");
    fixture.migrator.fail_resource("flaky.xml");

    fixture.hub.install(provider("p1", "myApp", "flaky.xml"));
    fixture.hub.install(provider("p2", "myApp", "changelog-b.xml"));
    fixture.hub.install(provider("p3", "myApp", "changelog-c.xml"));
    fixture.hub.remove(&ProviderId::from("p2"));
    fixture.hub.update(provider("p3", "myApp", "changelog-c2.xml"));
    fixture.hub.remove(&ProviderId::from("p3"));
    fixture.hub.install(provider("p4", "otherApp", "changelog-d.xml"));
    fixture.hub.update(provider("p4", "myApp", "changelog-d.xml"));
    fixture.hub.remove(&ProviderId::from("p4"));
    fixture.tracker.stop();

    assert_eq!(fixture.publisher.max_live(), 1);
    assert_eq!(fixture.publisher.live_count(), 0);
    assert_eq!(
        fixture.publisher.publish_count(),
        fixture.publisher.withdraw_count()
    );
}

#[test]
fn readded_provider_queues_behind_existing_candidates() {
    let fixture = Fixture::started("myApp");
    // Nothing ever succeeds, so the registry order is what the scan sees
    fixture.migrator.fail_resource("changelog-a.xml");
    fixture.migrator.fail_resource("changelog-b.xml");

    fixture.hub.install(provider("p1", "myApp", "changelog-a.xml"));
    fixture.hub.install(provider("p2", "myApp", "changelog-b.xml"));
    // Re-adding p1 makes it a fresh entry behind p2; p2 stays marked as
    // already tried, so the final scan attempts p1 alone
    fixture.hub.update(provider("p1", "myApp", "changelog-a.xml"));

    let attempted: Vec<ProviderId> = fixture
        .migrator
        .calls()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(
        attempted,
        vec![
            ProviderId::from("p1"),
            ProviderId::from("p2"),
            ProviderId::from("p1")
        ]
    );
}

#[test]
fn metadata_survives_json_snapshot() {
    let fixture = Fixture::started("myApp;filter:=(version>=1)");

    fixture.hub.install(Arc::new(
        StaticProvider::new("p1", "Provider p1", "1.2.3").with_capability(
            CapabilityDescriptor::new()
                .with_attr(ATTR_SCHEMA_NAME, "myApp")
                .with_attr(ATTR_SCHEMA_RESOURCE, "changelog.xml")
                .with_attr("version", "1.2.3"),
        ),
    ));

    let metadata = fixture.publisher.last_metadata().unwrap();
    let json = serde_json::to_value(&metadata).unwrap();
    assert_eq!(json["schema.selector"], "myApp;filter:=(version>=1)");
    assert_eq!(json["schema.provider.version"], "1.2.3");
    assert_eq!(json["config.id"], "test-config");

    let map: HashMap<String, AttrValue> = serde_json::from_value(json).unwrap();
    assert_eq!(map.len(), metadata.len());
}
