//! Shared-segment layout definitions.
//!
//! This module defines the `repr(C)` header placed at the start of a shared
//! pool segment and the size arithmetic for the segment as a whole. The
//! layout is the compatibility contract between the owner and its clients;
//! two builds interoperate only if they agree on it bit-exactly.
//!
//! # Memory Layout
//!
//! ```text
//! +--------------------------------------------------------------+
//! | SegmentHeader (128 bytes, cache-line aligned)                |
//! |   magic, version, capacity, cell geometry, handshake state   |
//! +--------------------------------------------------------------+
//! | TicketRingHeader (128 bytes: reserved+capacity | consumed)   |
//! +--------------------------------------------------------------+
//! | SlotCtl array (capacity x 16 bytes)                          |
//! +--------------------------------------------------------------+
//! | Payload cells (capacity x cell_size, cell_align-aligned)     |
//! +--------------------------------------------------------------+
//! total size rounded up to the platform page size
//! ```

use std::sync::atomic::AtomicU32;

use pool_primitives::SlotPool;

/// Magic bytes identifying a pool segment.
pub const MAGIC: [u8; 8] = *b"SEQPOOL\0";

/// Current segment format version (major.minor packed into u32).
/// Major = high 16 bits, minor = low 16 bits.
pub const FORMAT_VERSION: u32 = 1 << 16; // v1.0

/// Handshake states published through [`SegmentHeader::state`].
///
/// A fresh segment is zero-filled, so clients see `STATE_UNINITIALIZED`
/// until the owner publishes. Transitions are driven solely by the owner:
/// `UNINITIALIZED -> INITIALIZING -> READY`, and `READY -> UNLINKED` at
/// teardown.
pub const STATE_UNINITIALIZED: u32 = 0;
pub const STATE_INITIALIZING: u32 = 1;
pub const STATE_READY: u32 = 2;
pub const STATE_UNLINKED: u32 = 3;

/// Segment header at the start of a shared pool segment (128 bytes).
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Magic bytes: "SEQPOOL\0".
    pub magic: [u8; 8],
    /// Segment format version (major.minor packed).
    pub version: u32,
    /// Pool capacity (power of 2, immutable after init).
    pub capacity: u32,
    /// Size of one payload cell in bytes.
    pub cell_size: u32,
    /// Alignment of one payload cell in bytes.
    pub cell_align: u32,
    /// Owner/client handshake word; the owner's release store of
    /// [`STATE_READY`] is what publishes every other field.
    pub state: AtomicU32,
    /// Padding to 128 bytes.
    pub _pad: [u8; 100],
}

const _: () = assert!(core::mem::size_of::<SegmentHeader>() == 128);

impl SegmentHeader {
    /// Initialize a new segment header, leaving the state at
    /// [`STATE_INITIALIZING`]; the owner publishes [`STATE_READY`] once the
    /// pool body is seeded.
    pub fn init(&mut self, capacity: u32, cell_size: u32, cell_align: u32) {
        self.magic = MAGIC;
        self.version = FORMAT_VERSION;
        self.capacity = capacity;
        self.cell_size = cell_size;
        self.cell_align = cell_align;
        self.state = AtomicU32::new(STATE_INITIALIZING);
        self._pad = [0; 100];
    }

    /// Validate a header published by some owner.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != MAGIC {
            return Err("invalid magic bytes");
        }
        if self.version >> 16 != FORMAT_VERSION >> 16 {
            return Err("incompatible segment format version");
        }
        if !self.capacity.is_power_of_two() || self.capacity < 2 {
            return Err("capacity must be a power of 2 >= 2");
        }
        if self.cell_size == 0 {
            return Err("cell_size must be > 0");
        }
        if !self.cell_align.is_power_of_two() || self.cell_align > 64 {
            return Err("cell_align must be a power of 2 <= 64");
        }
        Ok(())
    }
}

/// Offset of the pool body (ring header, slots, cells) within the segment.
pub const POOL_OFFSET: usize = core::mem::size_of::<SegmentHeader>();

const _: () = assert!(POOL_OFFSET % 64 == 0);

/// Total segment size for a pool of `capacity` elements of `T`, rounded up
/// to the platform page size.
pub fn segment_size<T: Copy>(capacity: u32) -> Result<usize, &'static str> {
    let body = SlotPool::<T>::layout_size_checked(capacity).ok_or("segment size overflow")?;
    let raw = POOL_OFFSET
        .checked_add(body)
        .ok_or("segment size overflow")?;
    round_up_to_page(raw).ok_or("segment size overflow")
}

/// Round `len` up to a whole number of pages.
fn round_up_to_page(len: usize) -> Option<usize> {
    let page = page_size();
    len.checked_add(page - 1).map(|v| v / page * page)
}

/// The platform page size.
pub fn page_size() -> usize {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret <= 0 {
        4096
    } else {
        ret as usize
    }
}
