//! The atomic types and spin hint the pool algorithm is written against,
//! swappable for loom's instrumented versions under the `loom` feature.

#[cfg(not(feature = "loom"))]
pub use core::hint::spin_loop;
#[cfg(feature = "loom")]
pub use loom::hint::spin_loop;

#[cfg(not(feature = "loom"))]
pub use core::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "loom")]
pub use loom::thread;
