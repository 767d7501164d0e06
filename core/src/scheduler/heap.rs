//! Deadline-ordered priority structure.
//!
//! An array-backed binary min-heap with a parallel key → slot index,
//! giving O(log n) update and removal by key. Every swap goes through
//! [`DeadlineHeap::swap_slots`], which rewrites both sides of the index,
//! so the arena and the index always hold the same key set.
//!
//! Entries with equal deadlines pop in arbitrary order.

use hashbrown::HashMap;

use super::entry::TimerEntry;

#[derive(Default)]
pub(crate) struct DeadlineHeap {
    arena: Vec<TimerEntry>,
    slots: HashMap<String, usize>,
}

impl DeadlineHeap {
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Entry with the minimum deadline, without removal.
    pub fn peek(&self) -> Option<&TimerEntry> {
        self.arena.first()
    }

    /// Arena-order iteration, for snapshots. Not deadline-ordered.
    pub fn iter(&self) -> impl Iterator<Item = &TimerEntry> {
        self.arena.iter()
    }

    /// Insert an entry whose key is not already present.
    pub fn push(&mut self, entry: TimerEntry) {
        debug_assert!(!self.slots.contains_key(&entry.key));
        let slot = self.arena.len();
        self.slots.insert(entry.key.clone(), slot);
        self.arena.push(entry);
        self.sift_up(slot);
    }

    /// Remove and return the entry with the minimum deadline.
    pub fn pop(&mut self) -> Option<TimerEntry> {
        if self.arena.is_empty() {
            return None;
        }
        let last = self.arena.len() - 1;
        if last > 0 {
            self.swap_slots(0, last);
        }
        let entry = self.arena.pop()?;
        self.slots.remove(&entry.key);
        if !self.arena.is_empty() {
            self.sift_down(0);
        }
        Some(entry)
    }

    /// Mutate the entry for `key` in place, then restore heap order.
    /// Returns whether the key was present.
    pub fn update<F>(&mut self, key: &str, mutate: F) -> bool
    where
        F: FnOnce(&mut TimerEntry),
    {
        let Some(&slot) = self.slots.get(key) else {
            return false;
        };
        mutate(&mut self.arena[slot]);
        let slot = self.sift_up(slot);
        self.sift_down(slot);
        true
    }

    /// Remove the entry for `key`, wherever it sits in the arena.
    pub fn remove(&mut self, key: &str) -> Option<TimerEntry> {
        let slot = *self.slots.get(key)?;
        let last = self.arena.len() - 1;
        if slot != last {
            self.swap_slots(slot, last);
        }
        let entry = self.arena.pop()?;
        self.slots.remove(&entry.key);
        if slot < self.arena.len() {
            let slot = self.sift_up(slot);
            self.sift_down(slot);
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.slots.clear();
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.arena.swap(a, b);
        let key_a = self.arena[a].key.clone();
        let key_b = self.arena[b].key.clone();
        self.slots.insert(key_a, a);
        self.slots.insert(key_b, b);
    }

    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.arena[slot].deadline_ms >= self.arena[parent].deadline_ms {
                break;
            }
            self.swap_slots(slot, parent);
            slot = parent;
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) -> usize {
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < self.arena.len()
                && self.arena[left].deadline_ms < self.arena[smallest].deadline_ms
            {
                smallest = left;
            }
            if right < self.arena.len()
                && self.arena[right].deadline_ms < self.arena[smallest].deadline_ms
            {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap_slots(slot, smallest);
            slot = smallest;
        }
        slot
    }
}
