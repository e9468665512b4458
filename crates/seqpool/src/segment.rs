//! POSIX shared-memory segment lifecycle.
//!
//! The segment name is caller-supplied and passed to `shm_open` /
//! `shm_unlink` unaltered; the OS imposes its own naming rules (on Linux the
//! name becomes a `/dev/shm` entry).

use std::ffi::CString;
use std::io;

use tracing::debug;

use crate::error::PoolError;

/// Outcome of an exclusive create attempt.
pub(crate) enum CreateOutcome {
    /// A fresh, zero-filled segment was created and mapped.
    Created(SharedSegment),
    /// A segment with this name already exists.
    Exists,
}

/// A mapped named shared-memory segment.
///
/// The creating side owns the name and unlinks it on drop; clients only map
/// and unmap. The mapping itself outlives the name for every process that
/// holds it.
pub(crate) struct SharedSegment {
    base: *mut u8,
    len: usize,
    name: CString,
    owner: bool,
}

// SAFETY: all shared state inside the mapping is synchronized via atomics;
// the mapping metadata itself is immutable after construction.
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Create a segment of exactly `len` bytes, failing over to
    /// [`CreateOutcome::Exists`] when the name is already taken.
    ///
    /// A failure after the name has been claimed unlinks it again, so an
    /// error leaves nothing behind.
    pub fn create(name: &str, len: usize) -> Result<CreateOutcome, PoolError> {
        let cname = segment_name(name)?;

        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Ok(CreateOutcome::Exists);
            }
            return Err(PoolError::Io(err));
        }

        if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(cname.as_ptr());
            }
            return Err(PoolError::Io(err));
        }

        let base = unsafe { map(fd, len) };
        unsafe { libc::close(fd) };
        let base = match base {
            Ok(base) => base,
            Err(err) => {
                unsafe { libc::shm_unlink(cname.as_ptr()) };
                return Err(PoolError::Io(err));
            }
        };

        debug!(name, len, "created shared segment");
        Ok(CreateOutcome::Created(Self {
            base,
            len,
            name: cname,
            owner: true,
        }))
    }

    /// Map an existing segment at its current size.
    pub fn open(name: &str) -> Result<Self, PoolError> {
        let cname = segment_name(name)?;

        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Err(PoolError::SegmentNotFound {
                    name: name.to_string(),
                });
            }
            return Err(PoolError::Io(err));
        }

        let mut stat = unsafe { std::mem::zeroed::<libc::stat>() };
        if unsafe { libc::fstat(fd, &mut stat) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(PoolError::Io(err));
        }
        let len = stat.st_size as usize;

        let base = unsafe { map(fd, len) };
        unsafe { libc::close(fd) };
        let base = base.map_err(PoolError::Io)?;

        debug!(name, len, "mapped shared segment");
        Ok(Self {
            base,
            len,
            name: cname,
            owner: false,
        })
    }

    /// Base address of the mapping.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base
    }

    /// Length of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        // SAFETY: base/len describe the mapping made at construction.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
        if self.owner {
            unsafe { libc::shm_unlink(self.name.as_ptr()) };
            debug!(name = ?self.name, "unlinked shared segment");
        }
    }
}

/// Map `len` bytes of `fd` shared and writable.
unsafe fn map(fd: libc::c_int, len: usize) -> io::Result<*mut u8> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(base as *mut u8)
}

fn segment_name(name: &str) -> Result<CString, PoolError> {
    CString::new(name).map_err(|_| PoolError::Incompatible("segment name contains a NUL byte"))
}
