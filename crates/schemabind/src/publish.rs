//! Published resource metadata and the publication registry boundary
//!
//! After a candidate's migration succeeds, the tracker republishes the
//! underlying store annotated with provenance metadata so that downstream
//! consumers can select it by schema name, provider, or owning configuration.
//! The metadata key names below are part of the consumer contract.

use std::collections::HashMap;

use crate::error::PublishError;
use crate::provider::AttrValue;
use crate::registry::CandidateEntry;
use crate::selector::SchemaSelector;

/// Identity of the owning tracker configuration.
pub const META_CONFIG_ID: &str = "config.id";

/// Identity of the underlying store, as found in the provenance map.
pub const META_STORE_ID: &str = "store.id";

/// Copy of the underlying store's identity on the published resource.
pub const META_WRAPPED_STORE_ID: &str = "wrapped.store.id";

/// Name of the schema that was migrated.
pub const META_SCHEMA_NAME: &str = "schema.name";

/// The selector expression the tracker was configured with.
pub const META_SCHEMA_SELECTOR: &str = "schema.selector";

/// The migration resource that was applied.
pub const META_SCHEMA_RESOURCE: &str = "schema.resource";

/// Identity of the selected provider.
pub const META_PROVIDER_ID: &str = "schema.provider.id";

/// Display name of the selected provider.
pub const META_PROVIDER_NAME: &str = "schema.provider.name";

/// Version of the selected provider.
pub const META_PROVIDER_VERSION: &str = "schema.provider.version";

/// Attribute map attached to a published resource.
pub type ServiceMetadata = HashMap<String, AttrValue>;

/// Opaque handle to a live publication, issued by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicationHandle(u64);

impl PublicationHandle {
    /// Wrap a registry-assigned raw id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The registry-assigned raw id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// External registry through which the tracker exposes the migrated store.
///
/// The tracker guarantees that `publish` is called at most once without an
/// intervening `withdraw`; implementations do not need to re-check that.
/// Implementations must not call back into the tracker from either method.
pub trait PublicationRegistry<R>: Send + Sync {
    /// Expose `resource` with the given provenance metadata.
    fn publish(
        &self,
        resource: R,
        metadata: ServiceMetadata,
    ) -> Result<PublicationHandle, PublishError>;

    /// Withdraw a previously published resource.
    fn withdraw(&self, handle: PublicationHandle);
}

/// Assemble the provenance metadata for a successfully migrated candidate.
///
/// `provenance` is the metadata describing the underlying store itself; its
/// [`META_STORE_ID`] entry, when present, is copied to
/// [`META_WRAPPED_STORE_ID`] so consumers can still reach the wrapped store's
/// identity.
pub fn build_metadata(
    provenance: &ServiceMetadata,
    config_id: &str,
    selector: &SchemaSelector,
    entry: &CandidateEntry,
) -> ServiceMetadata {
    let mut metadata = ServiceMetadata::new();

    if let Some(store_id) = provenance.get(META_STORE_ID) {
        metadata.insert(META_WRAPPED_STORE_ID.to_string(), store_id.clone());
    }

    metadata.insert(META_CONFIG_ID.to_string(), AttrValue::from(config_id));
    metadata.insert(
        META_SCHEMA_SELECTOR.to_string(),
        AttrValue::from(selector.expression()),
    );
    if let Some(schema_name) = entry.descriptor.schema_name() {
        metadata.insert(META_SCHEMA_NAME.to_string(), AttrValue::from(schema_name));
    }
    if let Some(resource_name) = entry.descriptor.resource_name() {
        metadata.insert(
            META_SCHEMA_RESOURCE.to_string(),
            AttrValue::from(resource_name),
        );
    }

    let provider = entry.provider.as_ref();
    metadata.insert(
        META_PROVIDER_ID.to_string(),
        AttrValue::from(provider.id().to_string()),
    );
    metadata.insert(
        META_PROVIDER_NAME.to_string(),
        AttrValue::from(provider.display_name()),
    );
    metadata.insert(
        META_PROVIDER_VERSION.to_string(),
        AttrValue::from(provider.version()),
    );

    metadata
}
