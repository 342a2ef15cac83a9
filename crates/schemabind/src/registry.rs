//! Insertion-ordered candidate registry
//!
//! Holds the providers whose capabilities currently satisfy the tracker's
//! selector. Arrival order is the only priority: the selection scan walks the
//! registry front to back and the first successful migration wins.

use std::fmt;
use std::sync::Arc;

use crate::provider::{CapabilityDescriptor, Provider, ProviderId};

/// A provider paired with its first selector-matching capability.
#[derive(Clone)]
pub struct CandidateEntry {
    /// The provider offering the capability.
    pub provider: Arc<dyn Provider>,
    /// The matched capability descriptor, as advertised at match time.
    pub descriptor: CapabilityDescriptor,
}

impl fmt::Debug for CandidateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateEntry")
            .field("provider", &self.provider.id())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

struct Slot {
    entry: CandidateEntry,
    failed: bool,
}

/// Insertion-ordered map from provider identity to candidate entry.
///
/// Membership mirrors "currently satisfies the selector": entries are removed
/// the moment a provider stops matching or disappears. A provider has at most
/// one entry at a time.
///
/// An entry whose migration attempt failed is marked and excluded from
/// [`iter_eligible`](Self::iter_eligible) until a fresh lifecycle event
/// re-adds it; `upsert` always produces a fresh, eligible entry.
#[derive(Debug, Default)]
pub struct CandidateRegistry {
    entries: Vec<Slot>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("entry", &self.entry)
            .field("failed", &self.failed)
            .finish()
    }
}

impl CandidateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the entry's provider.
    ///
    /// Any existing entry for the same provider is dropped first and the new
    /// entry is appended, so a re-added provider queues behind candidates
    /// that were never dropped. The fresh entry is eligible even if the old
    /// one had failed. Returns `true` when an entry was replaced.
    pub fn upsert(&mut self, entry: CandidateEntry) -> bool {
        let replaced = self.remove(&entry.provider.id()).is_some();
        self.entries.push(Slot {
            entry,
            failed: false,
        });
        replaced
    }

    /// Remove and return the entry for a provider, if present.
    pub fn remove(&mut self, id: &ProviderId) -> Option<CandidateEntry> {
        let position = self
            .entries
            .iter()
            .position(|slot| slot.entry.provider.id() == *id)?;
        Some(self.entries.remove(position).entry)
    }

    /// Mark a provider's entry as having failed its migration attempt.
    pub fn mark_failed(&mut self, id: &ProviderId) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|slot| slot.entry.provider.id() == *id)
        {
            slot.failed = true;
        }
    }

    /// Look up the entry for a provider.
    pub fn get(&self, id: &ProviderId) -> Option<&CandidateEntry> {
        self.entries
            .iter()
            .find(|slot| slot.entry.provider.id() == *id)
            .map(|slot| &slot.entry)
    }

    /// Whether a provider currently has an entry.
    pub fn contains(&self, id: &ProviderId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CandidateEntry> {
        self.entries.iter().map(|slot| &slot.entry)
    }

    /// Iterate entries in insertion order, skipping those whose migration
    /// attempt failed and that have not been re-added since.
    pub fn iter_eligible(&self) -> impl Iterator<Item = &CandidateEntry> {
        self.entries
            .iter()
            .filter(|slot| !slot.failed)
            .map(|slot| &slot.entry)
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no candidates.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all candidates.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
