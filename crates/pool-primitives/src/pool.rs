use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use crate::region::Region;
use crate::ring::{RingStatus, TicketRingHeader};
use crate::slot::SlotCtl;
use crate::sync::{spin_loop, Ordering};

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult<T> {
    /// A cell was claimed; the pointer is valid until the matching release.
    Ok(NonNull<T>),
    /// Every cell is currently handed out.
    Exhausted,
}

/// A fixed-capacity MPMC object pool laid out in a region.
///
/// The pool is a ring of `capacity` slot records, each routing one payload
/// cell. Claimers draw tickets from `reserved`, releasers from `consumed`;
/// the low bits of a ticket select a slot and the slot's sequence resolves
/// which side may use it. Cells are seeded in slot order, so the first
/// `capacity` claims hand out cells `0..capacity`; after that, claims hand
/// out whichever cells releases have routed back in, in release order.
///
/// # Layout
///
/// At `header_offset` (64-byte aligned) within the region:
///
/// ```text
/// +--------------------------------------------------+
/// | TicketRingHeader (128 bytes, two cache lines)    |
/// +--------------------------------------------------+
/// | SlotCtl array (capacity x 16 bytes)              |
/// +--------------------------------------------------+
/// | Payload cells (capacity x size_of::<T>(),        |
/// |                aligned to align_of::<T>())       |
/// +--------------------------------------------------+
/// ```
///
/// The same layout works over heap memory and over a mapped shared segment;
/// one party calls [`SlotPool::init`] once, everyone else [`SlotPool::attach`].
pub struct SlotPool<T> {
    region: Region,
    header_offset: usize,
    slots_offset: usize,
    cells_offset: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for SlotPool<T> {}
unsafe impl<T: Send> Sync for SlotPool<T> {}

impl<T: Copy> SlotPool<T> {
    /// Bytes required for a pool of `capacity` cells at offset zero, or
    /// `None` on arithmetic overflow.
    pub fn layout_size_checked(capacity: u32) -> Option<usize> {
        let slots_offset = align_up(size_of::<TicketRingHeader>(), align_of::<SlotCtl>());
        let slots_len = (capacity as usize).checked_mul(size_of::<SlotCtl>())?;
        let cells_offset = align_up(slots_offset.checked_add(slots_len)?, align_of::<T>());
        let cells_len = (capacity as usize).checked_mul(size_of::<T>())?;
        cells_offset.checked_add(cells_len)
    }

    /// Bytes required for a pool of `capacity` cells at offset zero.
    pub fn layout_size(capacity: u32) -> usize {
        Self::layout_size_checked(capacity).expect("pool layout size overflow")
    }

    fn offsets(header_offset: usize, capacity: u32) -> (usize, usize, usize) {
        let slots_offset = align_up(
            header_offset + size_of::<TicketRingHeader>(),
            align_of::<SlotCtl>(),
        );
        let cells_offset = align_up(
            slots_offset + capacity as usize * size_of::<SlotCtl>(),
            align_of::<T>(),
        );
        let required = cells_offset + capacity as usize * size_of::<T>();
        (slots_offset, cells_offset, required)
    }

    /// Initialize a new pool at `header_offset` in the region.
    ///
    /// Seeds slot `i` with sequence `i`, routing cell `i`, and zeroes both
    /// ticket counters.
    ///
    /// # Safety
    ///
    /// The region must be writable and exclusively owned during
    /// initialization; no other party may touch the pool bytes until this
    /// returns.
    pub unsafe fn init(region: Region, header_offset: usize, capacity: u32) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capacity must be a power of 2 >= 2"
        );
        assert!(size_of::<T>() > 0, "element type must have nonzero size");
        assert!(align_of::<T>() <= 64, "element alignment must be <= 64");
        assert!(
            header_offset % 64 == 0,
            "header_offset must be 64-byte aligned"
        );

        let (slots_offset, cells_offset, required) = Self::offsets(header_offset, capacity);
        assert!(required <= region.len(), "region too small for pool");

        let header = unsafe { region.get_mut::<TicketRingHeader>(header_offset) };
        header.init(capacity);

        for i in 0..capacity {
            let slot = unsafe {
                region.get_mut::<SlotCtl>(slots_offset + i as usize * size_of::<SlotCtl>())
            };
            slot.init(i as u64);
        }

        Self {
            region,
            header_offset,
            slots_offset,
            cells_offset,
            _marker: PhantomData,
        }
    }

    /// Attach to an existing pool at `header_offset` in the region.
    ///
    /// Performs no initialization writes.
    ///
    /// # Safety
    ///
    /// The region must contain a pool previously set up by
    /// [`SlotPool::init`] at `header_offset`, for the same element type.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Result<Self, &'static str> {
        assert!(size_of::<T>() > 0, "element type must have nonzero size");
        assert!(align_of::<T>() <= 64, "element alignment must be <= 64");
        assert!(
            header_offset % 64 == 0,
            "header_offset must be 64-byte aligned"
        );
        if header_offset + size_of::<TicketRingHeader>() > region.len() {
            return Err("region too small for pool header");
        }

        let header = unsafe { region.get::<TicketRingHeader>(header_offset) };
        let capacity = header.capacity;
        if !capacity.is_power_of_two() || capacity < 2 {
            return Err("invalid pool capacity");
        }

        let (slots_offset, cells_offset, required) = Self::offsets(header_offset, capacity);
        if required > region.len() {
            return Err("region too small for pool");
        }

        Ok(Self {
            region,
            header_offset,
            slots_offset,
            cells_offset,
            _marker: PhantomData,
        })
    }

    #[inline]
    fn header(&self) -> &TicketRingHeader {
        unsafe { self.region.get::<TicketRingHeader>(self.header_offset) }
    }

    #[inline]
    unsafe fn slot(&self, index: u64) -> &SlotCtl {
        unsafe {
            self.region
                .get::<SlotCtl>(self.slots_offset + index as usize * size_of::<SlotCtl>())
        }
    }

    #[inline]
    fn cell_ptr(&self, cell: u64) -> *mut T {
        self.region
            .offset(self.cells_offset + cell as usize * size_of::<T>()) as *mut T
    }

    /// Returns the pool capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.header().capacity
    }

    /// Snapshot of the ticket counters.
    pub fn status(&self) -> RingStatus {
        self.header().status()
    }

    /// Claim a free payload cell.
    ///
    /// Draws the next claim ticket and hands out the cell routed by the
    /// ticket's slot. Returns [`ClaimResult::Exhausted`] as soon as the
    /// ticket's slot shows no released cell; it never spins waiting for a
    /// release.
    pub fn claim(&self) -> ClaimResult<T> {
        let header = self.header();
        let mask = header.mask();

        let mut ticket = header.reserved.load(Ordering::Relaxed);
        loop {
            let slot = unsafe { self.slot(ticket & mask) };
            let seq = slot.sequence.load(Ordering::Acquire);

            if seq == ticket {
                match header.reserved.compare_exchange_weak(
                    ticket,
                    ticket + 1,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // The slot is ours until we publish the claimed
                        // sequence; no other ticket can select it.
                        let cell = slot.cell.load(Ordering::Relaxed);
                        slot.sequence.store(ticket + 1, Ordering::Release);
                        let ptr = self.cell_ptr(cell);
                        return ClaimResult::Ok(unsafe { NonNull::new_unchecked(ptr) });
                    }
                    Err(current) => {
                        ticket = current;
                        spin_loop();
                    }
                }
            } else if seq < ticket {
                // No release has routed a cell back through this slot for
                // this generation: the pool is drained at this ticket.
                return ClaimResult::Exhausted;
            } else {
                // Another claimer took this ticket.
                ticket = header.reserved.load(Ordering::Relaxed);
            }
        }
    }

    /// True if `ptr` lies within this pool's payload cells.
    #[inline]
    pub fn contains(&self, ptr: *const T) -> bool {
        let base = self.cell_ptr(0) as usize;
        let end = base + self.capacity() as usize * size_of::<T>();
        let addr = ptr as usize;
        addr >= base && addr < end
    }

    /// Byte offset of `ptr` from the start of the payload cells, if it lies
    /// within them.
    pub fn payload_offset(&self, ptr: *const T) -> Option<usize> {
        if self.contains(ptr) {
            Some(ptr as usize - self.cell_ptr(0) as usize)
        } else {
            None
        }
    }

    #[inline]
    fn cell_index(&self, ptr: NonNull<T>) -> u64 {
        let base = self.cell_ptr(0) as usize;
        let addr = ptr.as_ptr() as usize;
        debug_assert!(self.contains(ptr.as_ptr()), "pointer outside pool cells");
        debug_assert!(
            (addr - base) % size_of::<T>() == 0,
            "pointer not at a cell boundary"
        );
        ((addr - base) / size_of::<T>()) as u64
    }

    /// Hand a claimed cell back to the pool.
    ///
    /// Draws the next release ticket and routes the cell through the
    /// ticket's slot, making it claimable again once the ring wraps around
    /// to that slot.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`SlotPool::claim`] on this pool (or
    /// another attachment of the same backing within this address space) and
    /// must not have been released since.
    pub unsafe fn release(&self, ptr: NonNull<T>) {
        let cell = self.cell_index(ptr);
        let header = self.header();
        let mask = header.mask();
        let capacity = header.capacity as u64;

        let mut ticket = header.consumed.load(Ordering::Relaxed);
        loop {
            let slot = unsafe { self.slot(ticket & mask) };
            let seq = slot.sequence.load(Ordering::Acquire);

            if seq == ticket + 1 {
                match header.consumed.compare_exchange_weak(
                    ticket,
                    ticket + 1,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        slot.cell.store(cell, Ordering::Relaxed);
                        slot.sequence.store(ticket + capacity, Ordering::Release);
                        return;
                    }
                    Err(current) => {
                        ticket = current;
                        spin_loop();
                    }
                }
            } else if seq > ticket + 1 {
                // Another releaser took this ticket.
                ticket = header.consumed.load(Ordering::Relaxed);
            } else {
                // The claimer of this ticket has committed the claim counter
                // but not yet published the claimed sequence; a live pool
                // pointer guarantees it will.
                spin_loop();
                ticket = header.consumed.load(Ordering::Relaxed);
            }
        }
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::region::HeapRegion;
    use alloc::vec::Vec;

    fn new_pool(capacity: u32) -> (HeapRegion, SlotPool<u64>) {
        let owner = HeapRegion::new_zeroed(SlotPool::<u64>::layout_size(capacity));
        let pool = unsafe { SlotPool::init(owner.region(), 0, capacity) };
        (owner, pool)
    }

    fn claimed(pool: &SlotPool<u64>) -> NonNull<u64> {
        match pool.claim() {
            ClaimResult::Ok(ptr) => ptr,
            ClaimResult::Exhausted => panic!("pool unexpectedly exhausted"),
        }
    }

    #[test]
    fn seeded_claims_walk_the_cells() {
        let (_owner, pool) = new_pool(4);

        let ptrs: Vec<_> = (0..4).map(|_| claimed(&pool)).collect();
        for (i, ptr) in ptrs.iter().enumerate() {
            assert_eq!(pool.payload_offset(ptr.as_ptr()), Some(i * 8));
        }
        assert_eq!(pool.claim(), ClaimResult::Exhausted);
    }

    #[test]
    fn released_cells_come_back_in_release_order() {
        let (_owner, pool) = new_pool(4);

        let ptrs: Vec<_> = (0..4).map(|_| claimed(&pool)).collect();
        for ptr in ptrs.iter().rev() {
            unsafe { pool.release(*ptr) };
        }

        let again: Vec<_> = (0..4).map(|_| claimed(&pool)).collect();
        let mut reversed = ptrs.clone();
        reversed.reverse();
        assert_eq!(again, reversed);
    }

    #[test]
    fn exhaustion_reports_without_spinning() {
        let (_owner, pool) = new_pool(2);

        let a = claimed(&pool);
        let _b = claimed(&pool);
        assert_eq!(pool.claim(), ClaimResult::Exhausted);

        unsafe { pool.release(a) };
        let c = claimed(&pool);
        assert_eq!(c, a);
        assert_eq!(pool.claim(), ClaimResult::Exhausted);
    }

    #[test]
    fn payload_bytes_survive_a_lifetime() {
        let (_owner, pool) = new_pool(2);

        let a = claimed(&pool);
        unsafe { a.as_ptr().write(0xAABB_CCDD_EEFF_0011) };
        unsafe { pool.release(a) };

        let _other = claimed(&pool);
        let again = claimed(&pool);
        assert_eq!(again, a);
        assert_eq!(unsafe { again.as_ptr().read() }, 0xAABB_CCDD_EEFF_0011);
    }

    #[test]
    fn status_tracks_tickets() {
        let (_owner, pool) = new_pool(4);

        let a = claimed(&pool);
        let b = claimed(&pool);
        let status = pool.status();
        assert_eq!(status.reserved, 2);
        assert_eq!(status.consumed, 0);
        assert_eq!(status.live, 2);

        unsafe {
            pool.release(a);
            pool.release(b);
        }
        let status = pool.status();
        assert_eq!(status.reserved, status.consumed);
        assert_eq!(status.live, 0);
    }

    #[test]
    fn contains_and_offsets_classify_pointers() {
        let (_owner, pool) = new_pool(2);

        let a = claimed(&pool);
        assert!(pool.contains(a.as_ptr()));

        let mut local = 0u64;
        let foreign = &mut local as *mut u64;
        assert!(!pool.contains(foreign));
        assert_eq!(pool.payload_offset(foreign), None);
    }

    #[test]
    fn attach_sees_the_same_pool() {
        let (owner, pool) = new_pool(4);

        let a = claimed(&pool);
        unsafe { a.as_ptr().write(7) };

        let view: SlotPool<u64> = unsafe { SlotPool::attach(owner.region(), 0) }.unwrap();
        assert_eq!(view.capacity(), 4);
        assert_eq!(view.status().reserved, 1);
        assert!(view.contains(a.as_ptr()));
        unsafe { view.release(a) };
        assert_eq!(pool.status().consumed, 1);
    }

    #[test]
    fn attach_rejects_uninitialized_memory() {
        let owner = HeapRegion::new_zeroed(4096);
        let result: Result<SlotPool<u64>, _> = unsafe { SlotPool::attach(owner.region(), 0) };
        assert!(result.is_err());
    }

    #[test]
    fn attach_rejects_truncated_region() {
        let (owner, _pool) = new_pool(64);
        let short = unsafe { Region::from_raw(owner.region().offset(0), 256) };
        let result: Result<SlotPool<u64>, _> = unsafe { SlotPool::attach(short, 0) };
        assert!(result.is_err());
    }

    #[test]
    fn layout_size_is_exact() {
        // header + 4 slots + 4 cells, no alignment slack for u64.
        assert_eq!(SlotPool::<u64>::layout_size(4), 128 + 4 * 16 + 4 * 8);
        assert!(SlotPool::<u64>::layout_size_checked(u32::MAX).is_some());
    }

    #[test]
    #[should_panic(expected = "power of 2")]
    fn init_rejects_non_power_of_two() {
        let owner = HeapRegion::new_zeroed(4096);
        let _: SlotPool<u64> = unsafe { SlotPool::init(owner.region(), 0, 6) };
    }
}
