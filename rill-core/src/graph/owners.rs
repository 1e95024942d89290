//! Owner Table
//!
//! A side-table that maps stable keys to the model that owns an externally
//! held object (a rendered node, a remote handle). Consumers keep the
//! [`OwnerKey`] next to their object instead of attaching hidden state to it.
//!
//! Keys are generational: once an entry is removed its slot may be reused,
//! and stale keys to the old entry resolve to `None`.

/// Stable handle into an [`OwnerTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerKey {
    index: u32,
    generation: u32,
}

impl OwnerKey {
    /// Slot index of this key.
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Slot<M> {
    generation: u32,
    owner: Option<M>,
}

/// Generational arena of owners.
#[derive(Debug)]
pub struct OwnerTable<M> {
    slots: Vec<Slot<M>>,
    free: Vec<u32>,
    len: usize,
}

impl<M> OwnerTable<M> {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store an owner and return its key.
    pub fn insert(&mut self, owner: M) -> OwnerKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.owner = Some(owner);
            return OwnerKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            owner: Some(owner),
        });
        OwnerKey {
            index,
            generation: 0,
        }
    }

    /// Look up the owner for a key.
    pub fn get(&self, key: OwnerKey) -> Option<&M> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.owner.as_ref())
    }

    /// Look up the owner for a key, mutably.
    pub fn get_mut(&mut self, key: OwnerKey) -> Option<&mut M> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.owner.as_mut())
    }

    /// Remove an entry. Stale keys return `None`.
    pub fn remove(&mut self, key: OwnerKey) -> Option<M> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let owner = slot.owner.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(owner)
    }

    pub fn contains(&self, key: OwnerKey) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (OwnerKey, &M)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.owner.as_ref().map(|owner| {
                (
                    OwnerKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    owner,
                )
            })
        })
    }
}

impl<M> Default for OwnerTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;

    #[test]
    fn insert_get_remove() {
        let mut table = OwnerTable::new();
        let model = NodeId::new();
        let key = table.insert(model);

        assert_eq!(table.get(key), Some(&model));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(key), Some(model));
        assert!(table.is_empty());
        assert!(table.get(key).is_none());
    }

    #[test]
    fn stale_keys_do_not_alias_reused_slots() {
        let mut table = OwnerTable::new();
        let old = table.insert("first");
        table.remove(old);

        let new = table.insert("second");
        assert_eq!(old.index(), new.index());
        assert!(table.get(old).is_none());
        assert_eq!(table.get(new), Some(&"second"));
        assert!(table.remove(old).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn iter_skips_holes() {
        let mut table = OwnerTable::new();
        let a = table.insert(1);
        let _b = table.insert(2);
        table.remove(a);
        *table.get_mut(_b).unwrap() += 10;

        let live: Vec<_> = table.iter().map(|(_, v)| *v).collect();
        assert_eq!(live, vec![12]);
    }
}
