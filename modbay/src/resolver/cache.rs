//! Per-resolution memoization of descriptor resolutions.
//!
//! Keyed on descriptor identity, so the same clause is never re-expanded in
//! the same branch. An in-progress marker carries the provider currently
//! being attempted; hitting it means the relationship graph cycled, and the
//! cycle is broken by treating the descriptor as tentatively satisfied by
//! that pending choice. The cache is cloned at provider branch points with
//! more than one candidate, so a failure along one branch cannot poison the
//! alternatives.

use super::resolved::ResolvedRelationship;
use crate::relationship::RelationshipDescriptor;
use crate::release::Release;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// The descriptor is being resolved further up the stack, tentatively
    /// by this release.
    InProgress(Arc<Release>),
    /// Fully resolved earlier in this branch.
    Done(ResolvedRelationship),
}

/// Memoization table for one resolution branch.
#[derive(Debug, Clone, Default)]
pub struct RelationshipCache {
    entries: HashMap<RelationshipDescriptor, CacheEntry>,
}

impl RelationshipCache {
    pub fn get(&self, descriptor: &RelationshipDescriptor) -> Option<&CacheEntry> {
        self.entries.get(descriptor)
    }

    /// Mark a descriptor as being resolved by `pending`.
    pub fn begin(&mut self, descriptor: &RelationshipDescriptor, pending: Arc<Release>) {
        self.entries
            .insert(descriptor.clone(), CacheEntry::InProgress(pending));
    }

    /// Record a completed resolution.
    pub fn finish(&mut self, descriptor: &RelationshipDescriptor, resolved: ResolvedRelationship) {
        self.entries
            .insert(descriptor.clone(), CacheEntry::Done(resolved));
    }

    /// Drop a descriptor's entry after a failed attempt, so a later branch
    /// may try it afresh.
    pub fn abandon(&mut self, descriptor: &RelationshipDescriptor) {
        self.entries.remove(descriptor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
