//! Opaque schema migration boundary
//!
//! The tracker never interprets migration resources itself; it hands the
//! target store, the selected provider, and the resource name to a
//! [`MigrationService`] and only cares whether the application succeeded.

use crate::error::MigrationError;
use crate::provider::Provider;

/// Applies a named migration resource from a provider to a target store.
///
/// `R` is the underlying store handle (for example a connection pool). The
/// tracker treats it as read-only and shared: it is borrowed into `apply` and
/// cloned into the published resource, never closed or mutated.
///
/// Implementations should be idempotent per `(provider, resource)` pair — the
/// tracker may re-invoke `apply` for a candidate that is re-added after an
/// update event. The call runs to completion before the tracker proceeds; no
/// cancellation or timeout is imposed here, a wrapping implementation may add
/// one.
pub trait MigrationService<R>: Send + Sync {
    /// Apply the migration resource `resource` advertised by `provider` to
    /// `target`.
    fn apply(
        &self,
        target: &R,
        provider: &dyn Provider,
        resource: &str,
    ) -> Result<(), MigrationError>;
}
