//! Entity id allocation and reuse.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam::queue::ArrayQueue;
use tracing::warn;

use crate::entity::{EntityBuffer, Eid};
use crate::error::{EcsError, Result};

/// Thread-safe entity id allocator.
///
/// Fresh ids come from an atomic high-water counter; reclaimed ids from a
/// bounded MPMC free queue. Dead ids first sit in a graveyard and only move
/// to the free queue at the tick boundary, so column data of entities
/// removed this tick stays readable until the next frame. Under exhaustion
/// the graveyard is drained mid-tick as a last resort.
pub struct Pool {
    next: AtomicU32,
    max: u32,
    free: ArrayQueue<u32>,
    graveyard: ArrayQueue<u32>,
}

impl Pool {
    pub fn new(max_entities: u32) -> Self {
        let cap = max_entities.max(1) as usize;
        Self {
            next: AtomicU32::new(0),
            max: max_entities,
            free: ArrayQueue::new(cap),
            graveyard: ArrayQueue::new(cap),
        }
    }

    /// Pull an id: reclaimed free ids first, then a fresh high-water id.
    /// Ids handed out from the free queue have had their membership mask
    /// zeroed already.
    pub fn allocate(&self, entities: &EntityBuffer) -> Result<Eid> {
        if let Some(eid) = self.free.pop() {
            return Ok(eid);
        }

        loop {
            let next = self.next.load(Ordering::Relaxed);
            if next >= self.max {
                break;
            }
            if self
                .next
                .compare_exchange_weak(next, next + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(next);
            }
        }

        // Exhaustion fallback: reclaim mid-tick rather than fail.
        warn!("entity pool exhausted high-water range, draining graveyard mid-tick");
        self.drain_graveyard(entities);
        self.free.pop().ok_or(EcsError::PoolExhausted)
    }

    /// Park a dead id until the next tick boundary.
    pub fn release(&self, eid: Eid) {
        // Queue capacity equals max_entities, so a push can only fail if an
        // id were released twice; the alive-bit check in remove_entity
        // prevents that.
        let _ = self.graveyard.push(eid);
    }

    /// Move graveyard ids to the free queue, zeroing each id's membership
    /// mask before it becomes allocatable again.
    pub fn drain_graveyard(&self, entities: &EntityBuffer) {
        while let Some(eid) = self.graveyard.pop() {
            entities.clear_membership(eid);
            let _ = self.free.push(eid);
        }
    }

    /// Highest id ever allocated plus one; scans iterate `0..high_water`.
    pub fn high_water(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    /// Reclaimed ids currently allocatable.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_allocation_is_sequential() {
        let entities = EntityBuffer::new(8, 1);
        let pool = Pool::new(8);
        assert_eq!(pool.allocate(&entities).unwrap(), 0);
        assert_eq!(pool.allocate(&entities).unwrap(), 1);
        assert_eq!(pool.allocate(&entities).unwrap(), 2);
        assert_eq!(pool.high_water(), 3);
    }

    #[test]
    fn test_release_is_deferred_until_drain() {
        let entities = EntityBuffer::new(8, 1);
        let pool = Pool::new(8);
        let a = pool.allocate(&entities).unwrap();
        pool.release(a);

        // Not reusable before the drain; a fresh id is handed out instead.
        assert_ne!(pool.allocate(&entities).unwrap(), a);

        pool.drain_graveyard(&entities);
        assert_eq!(pool.allocate(&entities).unwrap(), a);
    }

    #[test]
    fn test_drain_zeroes_membership() {
        let entities = EntityBuffer::new(8, 4);
        let pool = Pool::new(8);
        let a = pool.allocate(&entities).unwrap();
        entities.set_membership_bit(a, 2);

        pool.release(a);
        // Membership survives release (late readers may still need it).
        assert!(entities.has_membership_bit(a, 2));

        pool.drain_graveyard(&entities);
        assert!(!entities.has_membership_bit(a, 2));
    }

    #[test]
    fn test_exhaustion() {
        let entities = EntityBuffer::new(2, 1);
        let pool = Pool::new(2);
        let a = pool.allocate(&entities).unwrap();
        let _b = pool.allocate(&entities).unwrap();
        assert_eq!(pool.allocate(&entities), Err(EcsError::PoolExhausted));

        // A parked id is reclaimed mid-tick once the range is exhausted.
        pool.release(a);
        assert_eq!(pool.allocate(&entities).unwrap(), a);
        assert_eq!(pool.allocate(&entities), Err(EcsError::PoolExhausted));
    }

    #[test]
    fn test_concurrent_allocation_unique() {
        use std::sync::Arc;

        let entities = Arc::new(EntityBuffer::new(4000, 1));
        let pool = Arc::new(Pool::new(4000));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let entities = Arc::clone(&entities);
                std::thread::spawn(move || {
                    (0..1000)
                        .map(|_| pool.allocate(&entities).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<Eid> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
    }
}
