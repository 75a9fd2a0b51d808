//! Segment lifecycle: create-or-attach mapping of the shared byte block.
//!
//! Whichever process opens the segment first creates and zero-sizes it;
//! every later opener attaches to the existing object. The segment outlives
//! any single handle: dropping a [`Segment`] only unmaps this process's
//! view, it never unlinks the object. Cleanup across restarts is an
//! external concern.

use std::alloc::Layout;
use std::ffi::{CStr, CString};
use std::io;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;

use crate::layout::SEGMENT_SIZE;

/// A byte-addressable view of the 4096-byte shared segment.
///
/// All protocol state lives in the segment itself; this handle holds
/// nothing but the mapping. Operations take `&self`: the bytes are shared
/// with other processes regardless, and the single-writer-per-region
/// convention is what keeps writes coherent, not Rust aliasing.
pub struct Segment {
    ptr: NonNull<u8>,
    backing: Backing,
}

enum Backing {
    /// View of a named OS mapping; unmapped on drop.
    Mapped,
    /// Zeroed heap allocation standing in for a mapping in tests.
    Heap,
}

// SAFETY: the segment is plain shared bytes. It is already written
// concurrently by other processes mapping the same object, so handing the
// view to another thread adds no hazard the protocol does not carry by
// design. All mutation goes through raw pointers, never `&mut`.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Open the named segment, creating it if absent, attaching otherwise.
    ///
    /// Creation and attach both failing is unrecoverable for the caller
    /// and is surfaced as the underlying OS error.
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "segment name contains NUL"))?;

        let (fd, created) = match shm_open(&c_name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR) {
            Ok(fd) => (fd, true),
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                (shm_open(&c_name, libc::O_RDWR)?, false)
            }
            Err(e) => return Err(e),
        };

        if created {
            // SAFETY: fd is a freshly created shm object we own.
            let ret = unsafe { libc::ftruncate(fd, SEGMENT_SIZE as libc::off_t) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                // Half-created object: take it back down so the next
                // opener gets a clean create.
                // SAFETY: fd and name refer to the object created above.
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(err);
            }
        }

        // SAFETY: fd is a valid shm object sized to at least SEGMENT_SIZE.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                SEGMENT_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        // The mapping keeps the object alive; the descriptor is done.
        // SAFETY: fd is open and owned by this function.
        unsafe { libc::close(fd) };

        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(raw.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

        tracing::debug!(name, created, "mapped shared state segment");
        Ok(Self {
            ptr,
            backing: Backing::Mapped,
        })
    }

    /// A zeroed in-memory segment with the identical access surface.
    ///
    /// Not visible to other processes. This is the stand-in every test and
    /// model runs against, so the codec paths are exercised without
    /// touching real mappings.
    pub fn anonymous() -> Self {
        let layout = Layout::new::<[u8; SEGMENT_SIZE]>();
        // SAFETY: the layout has non-zero size.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            std::alloc::handle_alloc_error(layout);
        };
        Self {
            ptr,
            backing: Backing::Heap,
        }
    }

    /// Segment size in bytes. Fixed by the protocol.
    pub const fn len(&self) -> usize {
        SEGMENT_SIZE
    }

    /// Read one byte.
    #[inline]
    pub(crate) fn byte(&self, offset: usize) -> u8 {
        assert!(offset < SEGMENT_SIZE, "offset out of segment");
        // SAFETY: offset is in bounds of the mapping.
        unsafe { self.ptr.as_ptr().add(offset).read() }
    }

    /// Write one byte.
    #[inline]
    pub(crate) fn set_byte(&self, offset: usize, value: u8) {
        assert!(offset < SEGMENT_SIZE, "offset out of segment");
        // SAFETY: offset is in bounds of the mapping.
        unsafe { self.ptr.as_ptr().add(offset).write(value) }
    }

    /// Read `buf.len()` bytes starting at `offset`.
    #[inline]
    pub(crate) fn read_into(&self, offset: usize, buf: &mut [u8]) {
        assert!(
            offset + buf.len() <= SEGMENT_SIZE,
            "read runs past the segment"
        );
        // SAFETY: the range is in bounds and `buf` does not alias the
        // mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len())
        }
    }

    /// Write `bytes` starting at `offset` as one bulk copy.
    ///
    /// INVARIANT: multi-byte fields (length+payload, name+counter) must go
    /// through this single copy, never a byte loop, so a concurrent reader
    /// sees the fully-old or fully-new run.
    #[inline]
    pub(crate) fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= SEGMENT_SIZE,
            "write runs past the segment"
        );
        // SAFETY: the range is in bounds and `bytes` does not alias the
        // mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len())
        }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        match self.backing {
            Backing::Mapped => {
                // SAFETY: ptr is a live mapping of SEGMENT_SIZE bytes
                // established in `open`.
                unsafe {
                    libc::munmap(self.ptr.as_ptr().cast(), SEGMENT_SIZE);
                }
            }
            Backing::Heap => {
                // SAFETY: ptr came from alloc_zeroed with this layout.
                unsafe {
                    std::alloc::dealloc(self.ptr.as_ptr(), Layout::new::<[u8; SEGMENT_SIZE]>())
                }
            }
        }
    }
}

/// `shm_open` with EINTR retry.
fn shm_open(name: &CStr, flags: libc::c_int) -> io::Result<RawFd> {
    loop {
        // SAFETY: name is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(name.as_ptr(), flags, 0o600 as libc::mode_t) };
        if fd >= 0 {
            return Ok(fd);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Unique object name per test so parallel runs never collide.
    fn unique_name() -> String {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!(
            "/statebus-test-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        )
    }

    fn unlink(name: &str) {
        let c_name = CString::new(name).unwrap();
        // SAFETY: c_name is a valid NUL-terminated string.
        unsafe { libc::shm_unlink(c_name.as_ptr()) };
    }

    #[test]
    fn anonymous_segment_is_zeroed() {
        let segment = Segment::anonymous();
        let mut buf = [0xffu8; SEGMENT_SIZE];
        segment.read_into(0, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn bulk_write_round_trips() {
        let segment = Segment::anonymous();
        segment.write(100, b"hello segment");
        let mut buf = [0u8; 13];
        segment.read_into(100, &mut buf);
        assert_eq!(&buf, b"hello segment");
        assert_eq!(segment.byte(100), b'h');
        segment.set_byte(100, b'H');
        assert_eq!(segment.byte(100), b'H');
    }

    #[test]
    fn create_then_attach_shares_bytes() {
        let name = unique_name();
        let creator = Segment::open(&name).expect("create");
        creator.write(10, b"shared");

        let attached = Segment::open(&name).expect("attach");
        let mut buf = [0u8; 6];
        attached.read_into(10, &mut buf);
        assert_eq!(&buf, b"shared");

        drop(creator);
        drop(attached);
        unlink(&name);
    }

    #[test]
    fn fresh_segment_is_zeroed() {
        let name = unique_name();
        let segment = Segment::open(&name).expect("create");
        let mut buf = [0xffu8; SEGMENT_SIZE];
        segment.read_into(0, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
        drop(segment);
        unlink(&name);
    }

    #[test]
    fn drop_keeps_the_object_alive() {
        let name = unique_name();
        {
            let creator = Segment::open(&name).expect("create");
            creator.write(0, &[42]);
        }
        let attached = Segment::open(&name).expect("attach after creator dropped");
        assert_eq!(attached.byte(0), 42);
        drop(attached);
        unlink(&name);
    }
}
