use std::io;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use libc::{madvise, mmap, mprotect, munmap};
use libc::{MADV_DONTNEED, MAP_ANON, MAP_FAILED, MAP_NORESERVE, MAP_PRIVATE};
use libc::{PROT_NONE, PROT_READ, PROT_WRITE};

use crate::Error;

#[cfg(any(target_os = "linux", target_os = "android"))]
const MAP_FLAGS: libc::c_int = MAP_PRIVATE | MAP_ANON | MAP_NORESERVE | libc::MAP_STACK;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const MAP_FLAGS: libc::c_int = MAP_PRIVATE | MAP_ANON | MAP_NORESERVE;

/// A stack reserved as one anonymous mapping and surrounded by two inaccessible guard pages.
///
/// ```text
///  low                                                         high
///  +-------+-------------------------------------------+-------+
///  | guard |               usable stack                | guard |
///  +-------+-------------------------------------------+-------+
///          ^ top                                bottom ^
/// ```
///
/// The stack grows from `bottom` towards `top`. Running past `top` hits the guard page and turns a
/// stack overflow into a segmentation fault instead of silently corrupting a neighbouring mapping.
/// The usable area is reserved with `MAP_NORESERVE`, only the pages that are touched get physical
/// memory.
pub struct GuardedStack {
    top: *mut u8,
    size: usize,
    committed: usize,
}

impl GuardedStack {
    /// Reserves `reserve_size` bytes (rounded up to the page size) of stack and pre-faults the
    /// `commit_size` bytes closest to the bottom, where the first frames will be pushed.
    pub fn new(commit_size: usize, reserve_size: usize) -> Result<Self, Error> {
        let page = page_size();
        let (size, total_size) = match align_up(reserve_size, page)
            .and_then(|size| Some((size, size.checked_add(2 * page)?)))
        {
            Some(sizes) => sizes,
            None => {
                return Err(Error::Reserve {
                    size: reserve_size,
                    source: io::Error::from(io::ErrorKind::OutOfMemory),
                })
            }
        };

        unsafe {
            let memory = mmap(
                ptr::null_mut(),
                total_size,
                PROT_READ | PROT_WRITE,
                MAP_FLAGS,
                -1,
                0,
            );
            if memory == MAP_FAILED {
                return Err(Error::Reserve {
                    size: total_size,
                    source: io::Error::last_os_error(),
                });
            }
            let memory = memory as *mut u8;

            if mprotect(memory as *mut libc::c_void, page, PROT_NONE) != 0
                || mprotect(memory.add(page + size) as *mut libc::c_void, page, PROT_NONE) != 0
            {
                let error = io::Error::last_os_error();
                munmap(memory as *mut libc::c_void, total_size);
                return Err(Error::Guard(error));
            }

            let stack = Self {
                top: memory.add(page),
                size,
                // `size` is page aligned, rounding anything below it can't overflow.
                committed: align_up(commit_size.min(size), page).unwrap_or(size),
            };
            if stack.committed > 0 {
                ptr::write_bytes(stack.bottom().sub(stack.committed), 0, stack.committed);
            }
            Ok(stack)
        }
    }

    /// Returns a pointer one past the highest usable address. Always page aligned.
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.top.add(self.size) }
    }

    /// Returns a pointer to the lowest usable address, right above the low guard page.
    pub fn top(&self) -> *mut u8 {
        self.top
    }

    /// Usable size in bytes, without the guard pages.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes known to be backed by physical memory. Pages touched by a running context after
    /// creation are not tracked.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Returns true if `ptr` points into the usable area.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.top as *const u8 <= ptr && ptr < self.bottom() as *const u8
    }

    /// Releases the physical memory of everything except the `keep_size` bytes (rounded up to a
    /// page) closest to the bottom. The released pages read back as zeroes.
    ///
    /// Does nothing if `keep_size` covers the whole stack.
    pub fn decommit(&mut self, keep_size: usize) -> Result<(), Error> {
        if keep_size >= self.size {
            return Ok(());
        }
        let keep_size = match align_up(keep_size, page_size()) {
            Some(keep_size) if keep_size < self.size => keep_size,
            _ => return Ok(()),
        };

        let length = self.size - keep_size;
        let result = unsafe { madvise(self.top as *mut libc::c_void, length, MADV_DONTNEED) };
        if result != 0 {
            return Err(Error::Decommit(io::Error::last_os_error()));
        }
        self.committed = self.committed.min(keep_size);
        Ok(())
    }
}

impl Drop for GuardedStack {
    fn drop(&mut self) {
        let page = page_size();
        let result = unsafe {
            munmap(
                self.top.sub(page) as *mut libc::c_void,
                self.size + 2 * page,
            )
        };
        debug_assert_eq!(result, 0);
    }
}

/// Returns page size in bytes
pub fn page_size() -> usize {
    #[cold]
    fn sys_page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    static PAGE_SIZE_CACHE: AtomicUsize = AtomicUsize::new(0);
    match PAGE_SIZE_CACHE.load(Ordering::Relaxed) {
        0 => {
            let page_size = sys_page_size();
            assert!(page_size.is_power_of_two());

            PAGE_SIZE_CACHE.store(page_size, Ordering::Relaxed);
            page_size
        }
        page_size => page_size,
    }
}

// `None` if the rounded size doesn't fit a `usize`.
fn align_up(size: usize, align: usize) -> Option<usize> {
    Some(size.checked_add(align - 1)? & !(align - 1))
}
