//! Fixed-capacity, lock-free MPMC object pool for predictable low-latency
//! allocation of trivially copyable objects.
//!
//! The pool hands out element-sized storage in bounded steps regardless of
//! how many threads (or, in shared mode, processes) are allocating and
//! freeing concurrently. A power-of-two ring of per-slot sequence counters
//! serializes claims and releases; two cache-line-isolated 64-bit ticket
//! counters drive the two sides. When every cell is handed out, `allocate`
//! falls back to the global allocator instead of failing, so exhaustion is
//! a latency event, not an error.
//!
//! # Backing modes
//!
//! - [`Pool::create`] — process-local, heap-backed.
//! - [`Pool::create_shared`] — owner of a named POSIX shared-memory
//!   segment; initializes the control structure exactly once and unlinks
//!   the name on drop.
//! - [`Pool::attach_shared`] — client of an existing segment; maps, waits
//!   for the owner's ready publication, and never initializes.
//!
//! # Example
//!
//! ```
//! use seqpool::{Pool, StandardLayout};
//!
//! #[derive(Clone, Copy)]
//! #[repr(C)]
//! struct Order {
//!     id: u64,
//!     price: f64,
//! }
//!
//! // Asserts that Order is standard-layout (it is repr(C)).
//! unsafe impl StandardLayout for Order {}
//!
//! let pool = Pool::<Order>::create(1024)?;
//! let ptr = pool.allocate();
//! unsafe {
//!     ptr.write(Order { id: 42, price: 3.14 });
//!     pool.free(ptr);
//! }
//! # Ok::<(), seqpool::PoolError>(())
//! ```
//!
//! The lock-free algorithm itself lives in the `pool-primitives` crate and
//! is model-checked with loom; this crate adds the typed facade, the heap
//! fallback, and the shared-segment lifecycle.

mod error;
pub mod layout;
mod pool;
mod segment;

pub use error::PoolError;
pub use pool::{Pool, StandardLayout};
pub use pool_primitives::RingStatus;
