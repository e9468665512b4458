use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use pool_primitives::{ClaimResult, HeapRegion, Region, RingStatus, SlotPool};
use tracing::debug;

use crate::error::PoolError;
use crate::layout::{
    segment_size, SegmentHeader, POOL_OFFSET, STATE_READY, STATE_UNLINKED,
};
use crate::segment::{CreateOutcome, SharedSegment};

/// How long a client waits for the owner to publish a ready segment.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(1);

/// Marker for types that may be pooled.
///
/// The bound captures what the pool verifies statically about an element
/// type: it is trivially copyable (the `Copy` supertrait) and it has a
/// standard layout, so its bytes mean the same thing in every process
/// mapping a shared segment. The primitive numeric types, `bool`, `char`,
/// and arrays of implementors are covered; implement it for your own
/// `repr(C)` element types.
///
/// # Safety
///
/// Implementors assert that the type is standard-layout (`repr(C)`, or
/// `repr(transparent)` over such a type). Types that embed process-local
/// pointers may still only be used in local mode; that part is a caller
/// obligation the type system does not capture.
pub unsafe trait StandardLayout: Copy {}

macro_rules! impl_standard_layout {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl StandardLayout for $ty {})*
    };
}

impl_standard_layout!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char,
);

unsafe impl<T: StandardLayout, const N: usize> StandardLayout for [T; N] {}

enum Backing {
    Local(HeapRegion),
    Shared { segment: SharedSegment, owner: bool },
}

/// A fixed-capacity, lock-free MPMC object pool.
///
/// `allocate` hands out element-sized, element-aligned storage in bounded
/// steps; when every cell is handed out it falls back to the global
/// allocator, so it never fails and never blocks. `free` classifies the
/// pointer by range and routes it back to whichever side it came from.
///
/// The same control structure can live on the process heap
/// ([`Pool::create`]) or in a named shared-memory segment
/// ([`Pool::create_shared`] / [`Pool::attach_shared`]), where any number of
/// processes share one set of cells.
///
/// Elements must be trivially copyable and standard-layout, which the
/// [`StandardLayout`] bound verifies at compile time. Keeping process-local
/// pointers out of shared-mode elements is the one obligation left to the
/// caller.
pub struct Pool<T: StandardLayout> {
    inner: SlotPool<T>,
    backing: Backing,
}

impl<T: StandardLayout> Pool<T> {
    /// Create a process-local pool of `capacity` elements.
    ///
    /// `capacity` must be a power of two, at least 2.
    pub fn create(capacity: usize) -> Result<Self, PoolError> {
        let capacity = checked_capacity(capacity)?;
        let len = SlotPool::<T>::layout_size_checked(capacity)
            .ok_or(PoolError::Incompatible("pool size overflows the address space"))?;
        let backing = HeapRegion::new_zeroed(len);
        // SAFETY: freshly allocated region, exclusively owned here.
        let inner = unsafe { SlotPool::init(backing.region(), 0, capacity) };
        Ok(Self {
            inner,
            backing: Backing::Local(backing),
        })
    }

    /// Create a pool of `capacity` elements in a named shared-memory
    /// segment, entering the owner role.
    ///
    /// If a segment with this name already exists, attaches to it as a
    /// client instead and verifies that its capacity and element geometry
    /// match the request.
    pub fn create_shared(capacity: usize, name: &str) -> Result<Self, PoolError> {
        let capacity = checked_capacity(capacity)?;
        let len = segment_size::<T>(capacity).map_err(PoolError::Incompatible)?;

        let segment = match SharedSegment::create(name, len)? {
            CreateOutcome::Created(segment) => segment,
            CreateOutcome::Exists => {
                let pool = Self::attach_shared(name)?;
                if pool.capacity() != capacity as usize {
                    return Err(PoolError::Incompatible(
                        "existing segment capacity does not match",
                    ));
                }
                return Ok(pool);
            }
        };

        // SAFETY: freshly created zero-filled mapping, exclusively owned
        // until the ready state is published below.
        let header = unsafe { &mut *(segment.base() as *mut SegmentHeader) };
        header.init(capacity, size_of::<T>() as u32, align_of::<T>() as u32);

        // SAFETY: the mapping is live for as long as `segment` is.
        let region = unsafe { Region::from_raw(segment.base(), segment.len()) };
        let inner = unsafe { SlotPool::init(region, POOL_OFFSET, capacity) };

        // Publishing the ready state is what makes every prior write
        // visible to attaching clients.
        header.state.store(STATE_READY, Ordering::Release);
        debug!(name, capacity, "shared pool ready");

        Ok(Self {
            inner,
            backing: Backing::Shared {
                segment,
                owner: true,
            },
        })
    }

    /// Attach to an existing named shared pool as a client.
    ///
    /// Performs no initialization writes. Waits (bounded) for the owner's
    /// ready publication if it races with construction; a missing segment or
    /// an expired wait is a construction error.
    pub fn attach_shared(name: &str) -> Result<Self, PoolError> {
        let segment = SharedSegment::open(name)?;
        if segment.len() < size_of::<SegmentHeader>() {
            return Err(PoolError::Incompatible("segment too small for header"));
        }

        // SAFETY: the mapping covers at least the header; all shared fields
        // are read through atomics or after the ready acquire below.
        let header = unsafe { &*(segment.base() as *const SegmentHeader) };
        wait_ready(header, name)?;
        header.validate().map_err(PoolError::Incompatible)?;
        if header.cell_size != size_of::<T>() as u32 || header.cell_align != align_of::<T>() as u32
        {
            return Err(PoolError::Incompatible(
                "element geometry does not match segment",
            ));
        }
        let required = segment_size::<T>(header.capacity).map_err(PoolError::Incompatible)?;
        if segment.len() < required {
            return Err(PoolError::Incompatible(
                "segment smaller than its declared layout",
            ));
        }

        // SAFETY: the mapping is live for as long as `segment` is.
        let region = unsafe { Region::from_raw(segment.base(), segment.len()) };
        let inner =
            unsafe { SlotPool::attach(region, POOL_OFFSET) }.map_err(PoolError::Incompatible)?;
        debug!(name, capacity = header.capacity, "attached to shared pool");

        Ok(Self {
            inner,
            backing: Backing::Shared {
                segment,
                owner: false,
            },
        })
    }

    /// Returns a pointer to uninitialized storage for one element, valid
    /// until the matching [`Pool::free`].
    ///
    /// Never blocks and never fails: when every cell is handed out the
    /// storage comes from the global allocator instead, which callers cannot
    /// (and need not) distinguish.
    pub fn allocate(&self) -> *mut T {
        match self.inner.claim() {
            ClaimResult::Ok(ptr) => ptr.as_ptr(),
            ClaimResult::Exhausted => {
                let layout = Layout::new::<T>();
                let ptr = unsafe { alloc(layout) } as *mut T;
                if ptr.is_null() {
                    handle_alloc_error(layout);
                }
                ptr
            }
        }
    }

    /// Return storage obtained from [`Pool::allocate`].
    ///
    /// Pool cells are routed back into the ring; fallback storage goes back
    /// to the global allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this pool handle (or
    /// on another handle mapping the same backing within this address
    /// space), must not have been freed since, and must not be used after
    /// this call.
    pub unsafe fn free(&self, ptr: *mut T) {
        debug_assert!(!ptr.is_null());
        if self.inner.contains(ptr) {
            // SAFETY: in-range pointers originate from `claim`; liveness is
            // the caller's contract.
            unsafe { self.inner.release(NonNull::new_unchecked(ptr)) };
        } else {
            // SAFETY: out-of-range pointers originate from the fallback
            // allocation in `allocate`, with this exact layout.
            unsafe { dealloc(ptr as *mut u8, Layout::new::<T>()) };
        }
    }

    /// Pool capacity (constant).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity() as usize
    }

    /// True when this handle created and will tear down the backing store
    /// (local mode, or the shared-owner role).
    #[inline]
    pub fn owns_backing(&self) -> bool {
        match &self.backing {
            Backing::Local(_) => true,
            Backing::Shared { owner, .. } => *owner,
        }
    }

    /// True for either shared mode.
    #[inline]
    pub fn uses_shared_memory(&self) -> bool {
        matches!(self.backing, Backing::Shared { .. })
    }

    /// True if `ptr` lies within the pool's payload cells (as opposed to
    /// fallback storage).
    #[inline]
    pub fn is_pool_pointer(&self, ptr: *const T) -> bool {
        self.inner.contains(ptr)
    }

    /// Byte offset of a pool pointer from the start of the payload cells.
    ///
    /// Offsets are stable across processes mapping the same segment, unlike
    /// the pointers themselves.
    pub fn payload_offset(&self, ptr: *const T) -> Option<usize> {
        self.inner.payload_offset(ptr)
    }

    /// Snapshot of the ticket counters (for diagnostics).
    pub fn status(&self) -> RingStatus {
        self.inner.status()
    }
}

impl<T: StandardLayout> Drop for Pool<T> {
    fn drop(&mut self) {
        if let Backing::Shared {
            segment,
            owner: true,
        } = &self.backing
        {
            // Mark the segment torn down for clients that still hold (or
            // are mid-way through) a mapping; the name is unlinked when the
            // segment drops right after.
            let header = unsafe { &*(segment.base() as *const SegmentHeader) };
            header.state.store(STATE_UNLINKED, Ordering::Release);
        }
    }
}

fn checked_capacity(capacity: usize) -> Result<u32, PoolError> {
    if capacity < 2 || !capacity.is_power_of_two() || capacity > u32::MAX as usize {
        return Err(PoolError::InvalidCapacity {
            requested: capacity,
        });
    }
    Ok(capacity as u32)
}

fn wait_ready(header: &SegmentHeader, name: &str) -> Result<(), PoolError> {
    let deadline = Instant::now() + ATTACH_TIMEOUT;
    loop {
        match header.state.load(Ordering::Acquire) {
            STATE_READY => return Ok(()),
            STATE_UNLINKED => {
                return Err(PoolError::Incompatible("segment torn down by its owner"));
            }
            _ => {
                if Instant::now() >= deadline {
                    return Err(PoolError::InitTimeout {
                        name: name.to_string(),
                    });
                }
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }
    }
}
