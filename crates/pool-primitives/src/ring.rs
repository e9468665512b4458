use crate::sync::{AtomicU64, Ordering};

/// Ticket-ring header (128 bytes, two cache lines).
///
/// `reserved` and `consumed` are the only contended words and live on
/// separate cache lines so claimers and releasers do not false-share.
/// `capacity` is read-only after init and sits next to `reserved`, keeping
/// the release-side line free of read-mostly data.
#[repr(C, align(64))]
pub struct TicketRingHeader {
    /// Next claim ticket (written by claimers, read by everyone).
    pub reserved: AtomicU64,
    /// Ring capacity (power of 2, immutable after init).
    pub capacity: u32,
    _pad1: [u8; 52],

    /// Next release ticket (written by releasers).
    pub consumed: AtomicU64,
    _pad2: [u8; 56],
}

#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::size_of::<TicketRingHeader>() == 128);

impl TicketRingHeader {
    /// Initialize a new ring header.
    pub fn init(&mut self, capacity: u32) {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capacity must be a power of 2 >= 2"
        );
        self.reserved = AtomicU64::new(0);
        self.capacity = capacity;
        self._pad1 = [0; 52];
        self.consumed = AtomicU64::new(0);
        self._pad2 = [0; 56];
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.capacity as u64 - 1
    }

    /// Number of claimed-but-not-released cells (approximate under
    /// concurrency).
    #[inline]
    pub fn live(&self) -> u64 {
        let consumed = self.consumed.load(Ordering::Acquire);
        let reserved = self.reserved.load(Ordering::Acquire);
        reserved.saturating_sub(consumed)
    }

    /// Snapshot of both ticket counters.
    pub fn status(&self) -> RingStatus {
        let consumed = self.consumed.load(Ordering::Acquire);
        let reserved = self.reserved.load(Ordering::Acquire);

        RingStatus {
            reserved,
            consumed,
            capacity: self.capacity,
            live: reserved.saturating_sub(consumed),
        }
    }
}

/// Status snapshot of a ticket ring.
#[derive(Debug, Clone, Copy)]
pub struct RingStatus {
    /// Claim tickets drawn so far (tickets `0..reserved` have been claimed).
    pub reserved: u64,
    /// Release tickets drawn so far.
    pub consumed: u64,
    /// Ring capacity.
    pub capacity: u32,
    /// Cells currently handed out (`reserved - consumed`).
    pub live: u64,
}

impl core::fmt::Display for RingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "reserved={} consumed={} live={}/{}",
            self.reserved, self.consumed, self.live, self.capacity
        )
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::region::HeapRegion;
    use std::format;

    #[test]
    fn header_size() {
        assert_eq!(core::mem::size_of::<TicketRingHeader>(), 128);
    }

    #[test]
    fn counters_are_cache_line_isolated() {
        assert_eq!(core::mem::offset_of!(TicketRingHeader, reserved), 0);
        assert_eq!(core::mem::offset_of!(TicketRingHeader, consumed), 64);
    }

    #[test]
    fn init_and_mask() {
        let owner = HeapRegion::new_zeroed(128);
        let region = owner.region();
        let header = unsafe { region.get_mut::<TicketRingHeader>(0) };
        header.init(8);

        assert_eq!(header.capacity, 8);
        assert_eq!(header.mask(), 7);
        assert_eq!(header.live(), 0);

        let status = header.status();
        assert_eq!(status.reserved, 0);
        assert_eq!(status.consumed, 0);
        assert_eq!(format!("{status}"), "reserved=0 consumed=0 live=0/8");
    }

    #[test]
    #[should_panic(expected = "power of 2")]
    fn init_rejects_non_power_of_two() {
        let owner = HeapRegion::new_zeroed(128);
        let region = owner.region();
        let header = unsafe { region.get_mut::<TicketRingHeader>(0) };
        header.init(6);
    }

    #[test]
    #[should_panic(expected = "power of 2")]
    fn init_rejects_capacity_one() {
        let owner = HeapRegion::new_zeroed(128);
        let region = owner.region();
        let header = unsafe { region.get_mut::<TicketRingHeader>(0) };
        header.init(1);
    }
}
