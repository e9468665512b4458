//! Lock-free object pool primitives for shared memory.
//!
//! This crate provides a `no_std`-compatible, fixed-capacity MPMC object
//! pool designed for use in shared memory contexts where you work with raw
//! pointers to memory-mapped regions.
//!
//! # Primitives
//!
//! - [`SlotPool`]: Ticket-ring object pool — two cache-line-isolated ticket
//!   counters plus a per-slot sequence protocol that serializes concurrent
//!   claims and releases over a power-of-two ring.
//! - [`Region`] / [`HeapRegion`]: Non-owning view of a contiguous memory
//!   range, and a heap-backed owner for process-local pools and tests.
//!
//! The pool is laid out entirely inside a caller-provided [`Region`], so the
//! same control structure works over a heap allocation or a memory-mapped
//! segment shared between processes. One party calls [`SlotPool::init`]
//! exactly once; everyone else calls [`SlotPool::attach`].
//!
//! # Loom Testing
//!
//! Enable the `loom` feature for concurrency verification. The claim/release
//! algorithm is tested under loom to verify correctness across all possible
//! thread interleavings.
//!
//! ```text
//! cargo test -p pool-primitives --features loom
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod pool;
pub mod region;
pub mod ring;
pub mod slot;
pub mod sync;

#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
pub use ring::{RingStatus, TicketRingHeader};
pub use slot::SlotCtl;

pub use pool::{ClaimResult, SlotPool};

#[cfg(all(test, feature = "loom"))]
mod loom_tests;
