use crate::sync::AtomicU64;

/// Per-slot control record (16 bytes, packed).
///
/// `sequence` gates ownership of the record between claimers and releasers:
/// relative to the ticket `t` that selects this slot, `sequence == t` means
/// the record routes a free cell, `sequence == t + 1` means that cell has
/// been handed out, and `sequence == t + capacity` means a release has
/// routed a new cell through the record for the next generation.
///
/// `cell` is the payload cell the record currently routes. It is written
/// only by the release that owns the record and read only by the claim that
/// subsequently observes the released sequence, so its relaxed accesses are
/// ordered by the release/acquire pair on `sequence`.
///
/// Records are packed rather than padded to a cache line each; the coarse
/// claim/release isolation in the ring header carries the contention.
#[repr(C)]
pub struct SlotCtl {
    pub sequence: AtomicU64,
    pub cell: AtomicU64,
}

#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::size_of::<SlotCtl>() == 16);

impl SlotCtl {
    /// In-place initialization for slot `index`, routing cell `index`.
    pub fn init(&mut self, index: u64) {
        self.sequence = AtomicU64::new(index);
        self.cell = AtomicU64::new(index);
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::sync::Ordering;

    #[test]
    fn record_size() {
        assert_eq!(core::mem::size_of::<SlotCtl>(), 16);
    }

    #[test]
    fn init_seeds_identity_routing() {
        let mut slot = SlotCtl {
            sequence: AtomicU64::new(u64::MAX),
            cell: AtomicU64::new(u64::MAX),
        };
        slot.init(5);
        assert_eq!(slot.sequence.load(Ordering::Relaxed), 5);
        assert_eq!(slot.cell.load(Ordering::Relaxed), 5);
    }
}
