use std::io;

/// Errors surfaced at pool construction.
///
/// Per-operation calls (`allocate`, `free`) never fail: contention is
/// retried internally and exhaustion falls back to the heap.
#[derive(Debug)]
pub enum PoolError {
    /// Requested capacity is not a power of two, is below two, or does not
    /// fit the on-segment counter width.
    InvalidCapacity { requested: usize },
    /// No shared segment with this name exists.
    SegmentNotFound { name: String },
    /// The segment exists but is not a compatible pool (bad magic or
    /// version, mismatched element geometry, torn down by its owner, or a
    /// malformed name).
    Incompatible(&'static str),
    /// The segment never became ready within the attach window.
    InitTimeout { name: String },
    /// The OS refused to create, size, or map the segment.
    Io(io::Error),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCapacity { requested } => {
                write!(f, "invalid capacity {requested}: must be a power of 2 >= 2")
            }
            Self::SegmentNotFound { name } => {
                write!(f, "shared segment {name:?} does not exist")
            }
            Self::Incompatible(msg) => write!(f, "incompatible segment: {msg}"),
            Self::InitTimeout { name } => {
                write!(f, "shared segment {name:?} was not initialized in time")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PoolError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
