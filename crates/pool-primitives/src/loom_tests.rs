#![cfg(all(test, feature = "loom"))]

use core::ptr::NonNull;

use crate::pool::{ClaimResult, SlotPool};
use crate::region::HeapRegion;
use crate::sync::thread;
use alloc::vec::Vec;
use loom::sync::Arc;

fn pool_region(capacity: u32) -> Arc<HeapRegion> {
    // Loom atomics are larger than the hardware ones, so size generously
    // instead of using the exact layout.
    let _ = capacity;
    Arc::new(HeapRegion::new_zeroed(8192))
}

#[test]
fn concurrent_claims_get_distinct_cells() {
    loom::model(|| {
        let owner = pool_region(2);
        let pool: SlotPool<u64> = unsafe { SlotPool::init(owner.region(), 0, 2) };
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let pool = pool.clone();
                let owner = owner.clone();
                thread::spawn(move || {
                    let _keep = owner;
                    match pool.claim() {
                        ClaimResult::Ok(ptr) => Some(ptr.as_ptr() as usize),
                        ClaimResult::Exhausted => None,
                    }
                })
            })
            .collect();

        let claimed: Vec<usize> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        // Both claims fit in a capacity-2 pool, and they never alias.
        assert_eq!(claimed.len(), 2);
        assert_ne!(claimed[0], claimed[1]);
    });
}

#[test]
fn claim_release_cycle_preserves_payload() {
    loom::model(|| {
        let owner = pool_region(2);
        let pool: SlotPool<u64> = unsafe { SlotPool::init(owner.region(), 0, 2) };
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let pool = pool.clone();
                let owner = owner.clone();
                thread::spawn(move || {
                    let _keep = owner;
                    let value = 0x1111_1111_1111_1111u64 * (i as u64 + 1);
                    if let ClaimResult::Ok(ptr) = pool.claim() {
                        unsafe {
                            ptr.as_ptr().write(value);
                            assert_eq!(ptr.as_ptr().read(), value);
                            pool.release(ptr);
                        }
                        true
                    } else {
                        false
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let status = pool.status();
        assert_eq!(status.reserved, status.consumed);
        assert_eq!(status.live, 0);
    });
}

#[test]
fn drained_pool_reports_exhaustion() {
    loom::model(|| {
        let owner = pool_region(2);
        let pool: SlotPool<u64> = unsafe { SlotPool::init(owner.region(), 0, 2) };
        let pool = Arc::new(pool);

        let holder = {
            let pool = pool.clone();
            let owner = owner.clone();
            thread::spawn(move || {
                let _keep = owner;
                let first = pool.claim();
                let second = pool.claim();
                matches!(first, ClaimResult::Ok(_)) && matches!(second, ClaimResult::Ok(_))
            })
        };

        let prober = {
            let pool = pool.clone();
            let owner = owner.clone();
            thread::spawn(move || {
                let _keep = owner;
                // Either a cell is still free or the claim reports
                // exhaustion; it must return either way.
                let _ = pool.claim();
            })
        };

        assert!(holder.join().unwrap());
        prober.join().unwrap();
    });
}

#[test]
fn release_hands_cell_to_next_claimer() {
    loom::model(|| {
        let owner = pool_region(2);
        let pool: SlotPool<u64> = unsafe { SlotPool::init(owner.region(), 0, 2) };
        let pool = Arc::new(pool);

        // Drain the pool so the claimer below can only succeed via the
        // releaser's cell coming back around the ring.
        let a = match pool.claim() {
            ClaimResult::Ok(ptr) => ptr,
            ClaimResult::Exhausted => unreachable!(),
        };
        let b = match pool.claim() {
            ClaimResult::Ok(ptr) => ptr,
            ClaimResult::Exhausted => unreachable!(),
        };
        unsafe { a.as_ptr().write(0xAB) };
        let a_addr = a.as_ptr() as usize;

        let releaser = {
            let pool = pool.clone();
            let owner = owner.clone();
            thread::spawn(move || {
                let _keep = owner;
                let a = unsafe { NonNull::new_unchecked(a_addr as *mut u64) };
                unsafe { pool.release(a) };
            })
        };

        let claimer = {
            let pool = pool.clone();
            let owner = owner.clone();
            thread::spawn(move || {
                let _keep = owner;
                match pool.claim() {
                    ClaimResult::Ok(ptr) => {
                        // Only the released cell can come back, with the
                        // releaser's bytes visible.
                        assert_eq!(unsafe { ptr.as_ptr().read() }, 0xAB);
                        true
                    }
                    ClaimResult::Exhausted => false,
                }
            })
        };

        releaser.join().unwrap();
        let _ = claimer.join().unwrap();
        unsafe { pool.release(b) };
    });
}
