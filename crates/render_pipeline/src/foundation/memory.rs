//! Memory management utilities
//!
//! Fixed-capacity pool allocator used for resource handles. Slots are
//! allocated and released under a small free-list lock, while lookups go
//! through per-slot atomics so readers on other threads never block.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Generational key into a [`PoolAllocator`]
///
/// A key becomes stale once its slot is released; stale keys never resolve
/// even if the slot has since been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    index: u32,
    generation: u32,
}

impl PoolKey {
    /// Slot index within the pool
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the key was issued
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

struct PoolSlot<T> {
    generation: AtomicU32,
    occupied: AtomicBool,
    value: T,
}

/// Memory pool allocator for fixed-size objects
///
/// The pool never grows. Running out of slots is a contract violation and
/// panics, since every caller sizes its pool up front from configuration.
pub struct PoolAllocator<T> {
    slots: Box<[PoolSlot<T>]>,
    free: Mutex<Vec<u32>>,
}

impl<T: Default> PoolAllocator<T> {
    /// Create a new pool allocator with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        let count = u32::try_from(capacity).unwrap_or_else(|_| {
            panic!("pool capacity {capacity} does not fit a 32-bit slot index")
        });

        let slots = (0..count)
            .map(|_| PoolSlot {
                generation: AtomicU32::new(0),
                occupied: AtomicBool::new(false),
                value: T::default(),
            })
            .collect();

        // Reversed so that allocation hands out low indices first
        let free = (0..count).rev().collect();

        Self {
            slots,
            free: Mutex::new(free),
        }
    }
}

impl<T> PoolAllocator<T> {
    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently free
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Allocate a slot, returning its key and a reference to the slot value
    ///
    /// # Panics
    ///
    /// Panics when the pool is exhausted.
    pub fn allocate(&self) -> (PoolKey, &T) {
        let index = self.free.lock().pop();
        let Some(index) = index else {
            panic!("pool allocator exhausted ({} slots in use)", self.slots.len());
        };

        let slot = &self.slots[index as usize];
        slot.occupied.store(true, Ordering::Release);
        let key = PoolKey {
            index,
            generation: slot.generation.load(Ordering::Acquire),
        };
        (key, &slot.value)
    }

    /// Resolve a key, returning `None` for stale or unknown keys
    pub fn get(&self, key: PoolKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        let live = slot.occupied.load(Ordering::Acquire)
            && slot.generation.load(Ordering::Acquire) == key.generation;
        live.then_some(&slot.value)
    }

    /// Whether the key still refers to a live slot
    pub fn contains(&self, key: PoolKey) -> bool {
        self.get(key).is_some()
    }

    /// Return a slot to the pool, invalidating every outstanding copy of `key`
    ///
    /// # Panics
    ///
    /// Panics if the key is stale, which would indicate a double release.
    pub fn release(&self, key: PoolKey) {
        assert!(self.contains(key), "released stale pool key {key:?}");

        let slot = &self.slots[key.index as usize];
        slot.generation.fetch_add(1, Ordering::AcqRel);
        slot.occupied.store(false, Ordering::Release);
        self.free.lock().push(key.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_allocate_and_release() {
        let pool: PoolAllocator<AtomicU64> = PoolAllocator::new(2);
        assert_eq!(pool.capacity(), 2);

        let (first, value) = pool.allocate();
        value.store(7, Ordering::Relaxed);
        assert_eq!(first.index(), 0);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.get(first).map(|v| v.load(Ordering::Relaxed)), Some(7));

        pool.release(first);
        assert!(pool.get(first).is_none());
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_reused_slot_rejects_stale_key() {
        let pool: PoolAllocator<AtomicU64> = PoolAllocator::new(1);
        let (stale, _) = pool.allocate();
        pool.release(stale);

        let (fresh, _) = pool.allocate();
        assert_eq!(fresh.index(), stale.index());
        assert_ne!(fresh.generation(), stale.generation());
        assert!(!pool.contains(stale));
        assert!(pool.contains(fresh));
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_exhaustion_panics() {
        let pool: PoolAllocator<AtomicU64> = PoolAllocator::new(1);
        let _ = pool.allocate();
        let _ = pool.allocate();
    }

    #[test]
    #[should_panic(expected = "stale")]
    fn test_double_release_panics() {
        let pool: PoolAllocator<AtomicU64> = PoolAllocator::new(1);
        let (key, _) = pool.allocate();
        pool.release(key);
        pool.release(key);
    }
}
