//! Provider identities, attribute values, and capability descriptors
//!
//! A [`Provider`] is an externally owned component instance that advertises
//! one or more [`CapabilityDescriptor`]s. Each descriptor is a flat attribute
//! map; a descriptor that offers a schema carries the well-known
//! [`ATTR_SCHEMA_NAME`] and [`ATTR_SCHEMA_RESOURCE`] attributes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Well-known capability attribute: the name of the schema a provider offers.
pub const ATTR_SCHEMA_NAME: &str = "name";

/// Well-known capability attribute: the migration resource backing the schema.
pub const ATTR_SCHEMA_RESOURCE: &str = "resource";

/// Stable identity of a provider.
///
/// Identities are assigned by the runtime that owns the provider and must not
/// change over the provider's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider identity from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Scalar value of a capability attribute or metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// String value
    Str(String),
    /// Signed integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl AttrValue {
    /// Return the string content if this is a [`AttrValue::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Compare this value against a literal from a selector expression.
    ///
    /// Numeric comparison is used whenever both sides parse as numbers,
    /// lexicographic comparison otherwise. The ordering is total so that
    /// range clauses always evaluate to a definite answer.
    pub(crate) fn compare_literal(&self, literal: &str) -> std::cmp::Ordering {
        match self {
            Self::Int(v) => {
                if let Ok(l) = literal.parse::<i64>() {
                    return v.cmp(&l);
                }
                if let Ok(l) = literal.parse::<f64>() {
                    return (*v as f64).total_cmp(&l);
                }
                v.to_string().as_str().cmp(literal)
            }
            Self::Float(v) => {
                if let Ok(l) = literal.parse::<f64>() {
                    return v.total_cmp(&l);
                }
                v.to_string().as_str().cmp(literal)
            }
            Self::Bool(v) => {
                if let Ok(l) = literal.parse::<bool>() {
                    return v.cmp(&l);
                }
                v.to_string().as_str().cmp(literal)
            }
            Self::Str(s) => {
                if let (Ok(a), Ok(b)) = (s.parse::<f64>(), literal.parse::<f64>()) {
                    return a.total_cmp(&b);
                }
                s.as_str().cmp(literal)
            }
        }
    }

    /// Equality against a selector literal, with the same coercion rules as
    /// [`compare_literal`](Self::compare_literal).
    pub(crate) fn eq_literal(&self, literal: &str) -> bool {
        self.compare_literal(literal) == std::cmp::Ordering::Equal
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Immutable attribute set advertised by a provider.
///
/// Descriptors are value objects: the tracker re-fetches them from the
/// provider on every lifecycle event instead of mutating them in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    attributes: HashMap<String, AttrValue>,
}

impl CapabilityDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a single attribute.
    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// The full attribute map.
    pub fn attributes(&self) -> &HashMap<String, AttrValue> {
        &self.attributes
    }

    /// The schema name attribute, if present as a string.
    pub fn schema_name(&self) -> Option<&str> {
        self.attributes.get(ATTR_SCHEMA_NAME).and_then(AttrValue::as_str)
    }

    /// The migration resource attribute, if present as a string.
    pub fn resource_name(&self) -> Option<&str> {
        self.attributes
            .get(ATTR_SCHEMA_RESOURCE)
            .and_then(AttrValue::as_str)
    }
}

/// An external component instance that can offer schema capabilities.
///
/// Implementations are owned by the runtime that emits lifecycle events; the
/// tracker only observes them. `capabilities` must return a finite sequence in
/// a stable, deterministic order so that repeated enumeration of an unchanged
/// provider yields the same first match.
pub trait Provider: Send + Sync {
    /// Stable identity of this provider.
    fn id(&self) -> ProviderId;

    /// Human-readable name, used in logs and published metadata.
    fn display_name(&self) -> String;

    /// Version of the provider, used in published metadata.
    fn version(&self) -> String;

    /// Capability descriptors currently advertised, in declaration order.
    fn capabilities(&self) -> Vec<CapabilityDescriptor>;
}

/// In-memory [`Provider`] with a fixed identity and capability list.
///
/// Embedders that bridge a foreign runtime can use this directly; it is also
/// the building block for tests.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    id: ProviderId,
    name: String,
    version: String,
    capabilities: Vec<CapabilityDescriptor>,
}

impl StaticProvider {
    /// Create a provider with no capabilities.
    pub fn new(
        id: impl Into<ProviderId>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            capabilities: Vec::new(),
        }
    }

    /// Builder: append a capability descriptor.
    pub fn with_capability(mut self, descriptor: CapabilityDescriptor) -> Self {
        self.capabilities.push(descriptor);
        self
    }
}

impl Provider for StaticProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities.clone()
    }
}
