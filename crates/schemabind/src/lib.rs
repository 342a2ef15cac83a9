//! schemabind — binds a data store to the first provider able to migrate its schema
//!
//! A [`SchemaTracker`] observes a dynamically changing population of
//! providers, each advertising schema capabilities as attribute maps. It
//! keeps an insertion-ordered registry of the providers whose capabilities
//! match a compiled [`SchemaSelector`], asks an opaque [`MigrationService`]
//! to apply each candidate's migration resource in arrival order, and, once
//! one succeeds, republishes the underlying store through a
//! [`PublicationRegistry`] annotated with provenance metadata. When the bound
//! provider disappears or stops matching, the publication is withdrawn and
//! the remaining candidates are scanned again.
//!
//! Lifecycle events may arrive from any thread; each tracker serializes them
//! through a single lock, so at most one publication is ever live per
//! tracker.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use schemabind::{
//!     AttrValue, CapabilityDescriptor, MigrationError, MigrationService, Provider,
//!     ProviderHub, PublicationHandle, PublicationRegistry, PublishError, SchemaTracker,
//!     ServiceMetadata, StaticProvider, ATTR_SCHEMA_NAME, ATTR_SCHEMA_RESOURCE,
//! };
//!
//! // The migration engine is an external collaborator; here it always succeeds.
//! struct AlwaysMigrates;
//!
//! impl MigrationService<String> for AlwaysMigrates {
//!     fn apply(
//!         &self,
//!         _target: &String,
//!         _provider: &dyn Provider,
//!         _resource: &str,
//!     ) -> Result<(), MigrationError> {
//!         Ok(())
//!     }
//! }
//!
//! // A minimal publication registry that hands out sequential handles.
//! #[derive(Default)]
//! struct Registry {
//!     next: AtomicU64,
//! }
//!
//! impl PublicationRegistry<String> for Registry {
//!     fn publish(
//!         &self,
//!         _resource: String,
//!         _metadata: ServiceMetadata,
//!     ) -> Result<PublicationHandle, PublishError> {
//!         Ok(PublicationHandle::new(self.next.fetch_add(1, Ordering::SeqCst)))
//!     }
//!
//!     fn withdraw(&self, _handle: PublicationHandle) {}
//! }
//!
//! let hub = Arc::new(ProviderHub::new());
//! let tracker = SchemaTracker::builder()
//!     .selector("myApp;filter:=(version>=2)")
//!     .config_id("example-config")
//!     .resource("connection-pool".to_string())
//!     .migration_service(Arc::new(AlwaysMigrates))
//!     .publication_registry(Arc::new(Registry::default()))
//!     .runtime(hub.clone())
//!     .build()
//!     .unwrap();
//!
//! tracker.start().unwrap();
//!
//! hub.install(Arc::new(
//!     StaticProvider::new("provider-1", "Provider One", "2.4.0").with_capability(
//!         CapabilityDescriptor::new()
//!             .with_attr(ATTR_SCHEMA_NAME, "myApp")
//!             .with_attr(ATTR_SCHEMA_RESOURCE, "changelog/main.xml")
//!             .with_attr("version", AttrValue::from("2.4.0")),
//!     ),
//! ));
//!
//! assert!(tracker.is_active());
//! tracker.stop();
//! ```

pub mod error;
pub mod migrate;
pub mod provider;
pub mod publish;
pub mod registry;
pub mod runtime;
pub mod selector;
pub mod tracker;

pub use error::{MigrationError, PublishError, SelectorError, TrackerError};
pub use migrate::MigrationService;
pub use provider::{
    ATTR_SCHEMA_NAME, ATTR_SCHEMA_RESOURCE, AttrValue, CapabilityDescriptor, Provider, ProviderId,
    StaticProvider,
};
pub use publish::{
    META_CONFIG_ID, META_PROVIDER_ID, META_PROVIDER_NAME, META_PROVIDER_VERSION,
    META_SCHEMA_NAME, META_SCHEMA_RESOURCE, META_SCHEMA_SELECTOR, META_STORE_ID,
    META_WRAPPED_STORE_ID, PublicationHandle, PublicationRegistry, ServiceMetadata,
    build_metadata,
};
pub use registry::{CandidateEntry, CandidateRegistry};
pub use runtime::{ProviderHub, ProviderObserver, ProviderRuntime, SubscriptionId};
pub use selector::SchemaSelector;
pub use tracker::{SchemaTracker, SchemaTrackerBuilder};
