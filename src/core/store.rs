//! Shared desired-state store
//!
//! [`RuleStore`] is the only state shared between control requests and the
//! reconciliation workers. The whole map sits behind one `RwLock`; every
//! operation takes the lock for a short, non-async critical section, so an
//! entry (rule sets, dirty flag, timestamp) is always read and written as a
//! unit.

use crate::core::firewall::{FirewallId, FirewallRuleSet, Generation, TrackedFirewall};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Result of [`RuleStore::track`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// The id was not tracked before; a worker must be started for it
    New(Generation),
    /// The id was already tracked; rule content and timestamp were replaced
    Refreshed(Generation),
}

impl Tracked {
    pub const fn generation(self) -> Generation {
        match self {
            Tracked::New(generation) | Tracked::Refreshed(generation) => generation,
        }
    }
}

/// Answer of [`RuleStore::take_dirty`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyCheck {
    /// Id gone, or re-tracked under another generation
    Untracked,
    Clean,
    /// Dirty flag was cleared; the snapshot was taken after clearing
    Dirty(FirewallRuleSet),
}

#[derive(Debug, Default)]
pub struct RuleStore {
    entries: RwLock<HashMap<FirewallId, TrackedFirewall>>,
    next_generation: AtomicU64,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave an entry half-written
    // (every write replaces or flips whole fields), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<FirewallId, TrackedFirewall>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<FirewallId, TrackedFirewall>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a consistent copy of the entry for `id`
    pub fn get(&self, id: FirewallId) -> Option<TrackedFirewall> {
        self.read().get(&id).cloned()
    }

    pub fn contains(&self, id: FirewallId) -> bool {
        self.read().contains_key(&id)
    }

    /// Tracks `id` with the given rules.
    ///
    /// On an already tracked id the rule content and timestamp are replaced
    /// but the dirty flag is left alone: a fetch is a resync, not a pending
    /// change.
    pub fn track(&self, id: FirewallId, rules: FirewallRuleSet) -> Tracked {
        let mut entries = self.write();
        if let Some(entry) = entries.get_mut(&id) {
            entry.rules = rules;
            entry.touch();
            debug!(firewall = id, "Refreshed tracked firewall");
            return Tracked::Refreshed(entry.generation);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        entries.insert(id, TrackedFirewall::new(rules, generation));
        debug!(firewall = id, generation, "Tracking new firewall");
        Tracked::New(generation)
    }

    /// Removes `id`. Returns whether it was tracked.
    pub fn untrack(&self, id: FirewallId) -> bool {
        self.write().remove(&id).is_some()
    }

    pub fn tracked_ids(&self) -> BTreeSet<FirewallId> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Runs `f` against the entry for `id` under the write lock.
    ///
    /// Returns `None` if the id is not tracked.
    pub(crate) fn update<R>(
        &self,
        id: FirewallId,
        f: impl FnOnce(&mut TrackedFirewall) -> R,
    ) -> Option<R> {
        self.write().get_mut(&id).map(f)
    }

    /// Clears the dirty flag and snapshots the rules, in that order, under
    /// one write lock.
    ///
    /// A mutation committed before this call is part of the snapshot; one
    /// committed after it sets the flag again and is pushed on the next tick.
    pub fn take_dirty(&self, id: FirewallId, generation: Generation) -> DirtyCheck {
        let mut entries = self.write();
        match entries.get_mut(&id) {
            Some(entry) if entry.generation == generation => {
                if entry.dirty {
                    entry.dirty = false;
                    DirtyCheck::Dirty(entry.rules.clone())
                } else {
                    DirtyCheck::Clean
                }
            }
            _ => DirtyCheck::Untracked,
        }
    }

    /// Raises the dirty flag again after a failed push.
    ///
    /// Does nothing if the id was untracked or re-tracked in the meantime.
    pub fn mark_dirty(&self, id: FirewallId, generation: Generation) -> bool {
        self.update(id, |entry| {
            if entry.generation == generation {
                entry.dirty = true;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }
}
