//! Generational arena handing out transient IDs for GUI consumption.
//!
//! Slots are reused after removal, but each reuse bumps the slot's
//! generation, so a stale [`ArenaId`] held by a front-end widget resolves to
//! `None` instead of aliasing the new occupant.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Handle into an [`IdArena`]: `(generation, slot)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId {
    generation: u32,
    slot: u32,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of tracked values with hashmap-accelerated deduplication.
pub struct IdArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    by_value: HashMap<u64, Vec<ArenaId>>,
}

impl<T: Hash + Eq> IdArena<T> {
    pub fn new() -> Self {
        IdArena {
            slots: Vec::new(),
            free: Vec::new(),
            by_value: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a value, reusing a free slot when available.
    pub fn insert(&mut self, value: T) -> ArenaId {
        let hash = value_hash(&value);
        let id = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.generation += 1;
                entry.value = Some(value);
                ArenaId {
                    generation: entry.generation,
                    slot,
                }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                ArenaId {
                    generation: 0,
                    slot,
                }
            }
        };
        self.by_value.entry(hash).or_default().push(id);
        id
    }

    /// Resolve an ID; dangling or stale IDs yield `None`.
    pub fn get(&self, id: ArenaId) -> Option<&T> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// ID for an equal value, registering it on miss.
    ///
    /// Backed by a hash index, so the miss path stays O(1) expected even for
    /// large populations.
    pub fn lookup_or_register(&mut self, value: T) -> ArenaId {
        let hash = value_hash(&value);
        if let Some(ids) = self.by_value.get(&hash) {
            for id in ids {
                if self.get(*id) == Some(&value) {
                    return *id;
                }
            }
        }
        self.insert(value)
    }

    /// Remove a value, freeing its slot for a later generation.
    pub fn remove(&mut self, id: ArenaId) -> Option<T> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(id.slot);
        let hash = value_hash(&value);
        if let Some(ids) = self.by_value.get_mut(&hash) {
            ids.retain(|candidate| *candidate != id);
            if ids.is_empty() {
                self.by_value.remove(&hash);
            }
        }
        Some(value)
    }
}

impl<T: Hash + Eq> Default for IdArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn value_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = IdArena::new();
        let id = arena.insert("ModuleManager".to_string());
        assert_eq!(arena.get(id), Some(&"ModuleManager".to_string()));
    }

    #[test]
    fn test_lookup_or_register_dedupes() {
        let mut arena = IdArena::new();
        let a = arena.lookup_or_register("X".to_string());
        let b = arena.lookup_or_register("X".to_string());
        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_id_returns_none() {
        let mut arena = IdArena::new();
        let id = arena.insert("X".to_string());
        arena.remove(id);
        let reused = arena.insert("Y".to_string());
        assert_eq!(arena.get(id), None);
        assert_eq!(arena.get(reused), Some(&"Y".to_string()));
    }

    #[test]
    fn test_remove_twice_is_none() {
        let mut arena = IdArena::new();
        let id = arena.insert(7u32);
        assert_eq!(arena.remove(id), Some(7));
        assert_eq!(arena.remove(id), None);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena = IdArena::new();
        let first = arena.insert(1u32);
        arena.remove(first);
        let second = arena.insert(2u32);
        assert_ne!(first, second);
        assert_eq!(arena.get(second), Some(&2));
    }
}
