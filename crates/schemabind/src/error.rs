//! Error types for selector compilation, tracking, migration, and publication

use thiserror::Error;

/// Errors raised while compiling a schema selector expression.
///
/// Selector compilation happens once, when the tracker is built; every variant
/// here is a fatal configuration error and is never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector has no schema name")]
    EmptySchemaName,

    #[error("schema name '{0}' contains filter syntax")]
    InvalidSchemaName(String),

    #[error("unknown selector directive '{0}'")]
    UnknownDirective(String),

    #[error("selector declares more than one filter directive")]
    DuplicateFilter,

    #[error("expected '{expected}' at byte {at} of filter expression")]
    Expected { expected: char, at: usize },

    #[error("operator '{operator}' at byte {at} has an empty operand list")]
    EmptyOperandList { operator: char, at: usize },

    #[error("comparison at byte {at} is missing an attribute key")]
    MissingKey { at: usize },

    #[error("expected '=', '>=' or '<=' at byte {at}")]
    MissingOperator { at: usize },

    #[error("unexpected trailing input at byte {at}")]
    TrailingInput { at: usize },

    #[error("filter expression ended unexpectedly")]
    UnexpectedEnd,
}

/// Error returned by a [`MigrationService`](crate::MigrationService)
/// implementation when applying a migration resource fails.
///
/// A failed migration is recoverable from the tracker's point of view: it is
/// logged with provider and resource context and the scan moves on to the
/// next candidate.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct MigrationError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MigrationError {
    /// Create an error from a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Error returned by a [`PublicationRegistry`](crate::PublicationRegistry)
/// when the migrated resource cannot be published.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PublishError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PublishError {
    /// Create an error from a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Errors surfaced by the tracker itself.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The schema selector expression failed to compile. Fatal at build time.
    #[error("invalid schema selector: {0}")]
    InvalidSelector(#[from] SelectorError),

    /// A required collaborator was not supplied to the builder.
    #[error("tracker configuration is missing {0}")]
    MissingDependency(&'static str),

    /// `start` was called while the tracker was already observing providers.
    #[error("tracker already started")]
    AlreadyStarted,

    /// The publication registry rejected a successfully migrated resource.
    /// The migration is not undone; the next lifecycle event that re-enters
    /// the selection scan retries publication.
    #[error("failed to publish migrated resource: {0}")]
    Publication(#[from] PublishError),
}
