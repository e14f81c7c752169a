//! Raw byte-buffer allocation.
//!
//! The table consumes memory through the [`Allocator`] trait, which is selected
//! statically through a type parameter on [`HashMap`](crate::HashMap). The default
//! strategy, [`StepAllocator`], serves small and medium buffers from the global heap
//! and switches to anonymous memory mappings at [`MMAP_THRESHOLD`] bytes, where
//! heap allocations fragment badly and remapping can grow a buffer without copying.

use std::alloc::{self as heap, Layout};
use std::fmt;
use std::ptr::{self, NonNull};

use crate::Error;

/// Buffers of at least this many bytes are memory-mapped by [`StepAllocator::new`].
pub const MMAP_THRESHOLD: usize = 64 * (1 << 20);

/// The alignment of every buffer handed out by the allocators in this module.
///
/// Mapped regions are page-aligned, which satisfies this trivially.
pub const ALIGN: usize = 64;

/// A provider of raw byte buffers.
///
/// # Safety
///
/// A successful `allocate` or `resize` must return a pointer valid for reads and writes
/// of `size` bytes, aligned to [`ALIGN`], that stays valid until it is passed to
/// `release` or `resize`. If [`Allocator::zeroed`] returns `true`, freshly allocated
/// bytes, including the tail added by a growing `resize`, must read as zero.
pub unsafe trait Allocator: Send + Sync {
    /// Allocate a buffer of `size` bytes.
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error>;

    /// Release a buffer of `size` bytes.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for a buffer of exactly `size`
    /// bytes, and must not be used after this call.
    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error>;

    /// Resize a buffer from `old_size` to `new_size` bytes, preserving the first
    /// `min(old_size, new_size)` bytes. The buffer may move.
    ///
    /// On failure the original buffer is left untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for a buffer of exactly
    /// `old_size` bytes. On success, `ptr` must not be used after this call.
    unsafe fn resize(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error>;

    /// Returns `true` if new memory is zero-filled.
    fn zeroed(&self) -> bool;
}

/// The allocation path used for a given buffer size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// The global heap allocator.
    Heap,
    /// An anonymous private memory mapping.
    Mapped,
}

/// Allocates from the global heap.
///
/// With `ZEROED`, memory is zero-filled on allocation and on growth.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap<const ZEROED: bool = true>;

// Every heap buffer shares one alignment, so the layout of a buffer can be
// recovered from its size alone. Zero-sized requests are rounded up.
fn layout(size: usize) -> Result<Layout, Error> {
    Layout::from_size_align(size.max(1), ALIGN).map_err(|_| Error::Alloc { size })
}

// Safety: `layout` enforces `ALIGN`, and zeroing follows `ZEROED`.
unsafe impl<const ZEROED: bool> Allocator for Heap<ZEROED> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        let layout = layout(size)?;

        // Safety: `layout` always has a non-zero size.
        let ptr = unsafe {
            if ZEROED {
                heap::alloc_zeroed(layout)
            } else {
                heap::alloc(layout)
            }
        };

        NonNull::new(ptr).ok_or(Error::Alloc { size })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error> {
        let layout = layout(size)?;

        // Safety: The caller guarantees `ptr` was allocated with this size, and
        // therefore this layout.
        unsafe { heap::dealloc(ptr.as_ptr(), layout) };
        Ok(())
    }

    unsafe fn resize(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        let old_layout = layout(old_size)?;

        // Validate the new size against the same alignment.
        let new_layout = layout(new_size)?;

        // Safety: The caller guarantees `ptr` was allocated with `old_layout`, and
        // `new_layout` was validated above.
        let raw = unsafe { heap::realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
        let raw = NonNull::new(raw).ok_or(Error::Alloc { size: new_size })?;

        if ZEROED && new_size > old_size {
            // Safety: The buffer is valid for `new_size` bytes.
            unsafe { raw.as_ptr().add(old_size).write_bytes(0, new_size - old_size) };
        }

        Ok(raw)
    }

    fn zeroed(&self) -> bool {
        ZEROED
    }
}

/// Allocates anonymous private memory mappings.
///
/// Mapped memory is always zero-filled by the kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mapped;

#[cfg(unix)]
mod mapped {
    use super::*;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const MAP_ANONYMOUS: libc::c_int = libc::MAP_ANONYMOUS;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const MAP_ANONYMOUS: libc::c_int = libc::MAP_ANON;

    // Safety: Mappings are page-aligned and zero-filled.
    unsafe impl Allocator for Mapped {
        fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
            // Safety: Anonymous mappings do not alias any existing memory.
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size.max(1),
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };

            if ptr == libc::MAP_FAILED {
                return Err(Error::Alloc { size });
            }

            NonNull::new(ptr.cast::<u8>()).ok_or(Error::Alloc { size })
        }

        unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error> {
            // Safety: The caller guarantees this is a live mapping of `size` bytes.
            if unsafe { libc::munmap(ptr.as_ptr().cast(), size.max(1)) } != 0 {
                return Err(Error::Unmap { size });
            }

            Ok(())
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        unsafe fn resize(
            &self,
            ptr: NonNull<u8>,
            old_size: usize,
            new_size: usize,
        ) -> Result<NonNull<u8>, Error> {
            // Let the kernel move the pages instead of copying them.
            //
            // Safety: The caller guarantees this is a live mapping of `old_size` bytes.
            let raw = unsafe {
                libc::mremap(
                    ptr.as_ptr().cast(),
                    old_size.max(1),
                    new_size.max(1),
                    libc::MREMAP_MAYMOVE,
                )
            };

            if raw == libc::MAP_FAILED {
                return Err(Error::Alloc { size: new_size });
            }

            NonNull::new(raw.cast::<u8>()).ok_or(Error::Alloc { size: new_size })
        }

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        unsafe fn resize(
            &self,
            ptr: NonNull<u8>,
            old_size: usize,
            new_size: usize,
        ) -> Result<NonNull<u8>, Error> {
            // Safety: Guaranteed by the caller.
            unsafe { move_between(self, self, ptr, old_size, new_size) }
        }

        fn zeroed(&self) -> bool {
            true
        }
    }
}

// Without `mmap`, large buffers fall back to the heap.
#[cfg(not(unix))]
// Safety: Delegates to `Heap`.
unsafe impl Allocator for Mapped {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        Heap::<true>.allocate(size)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error> {
        unsafe { Heap::<true>.release(ptr, size) }
    }

    unsafe fn resize(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        unsafe { Heap::<true>.resize(ptr, old_size, new_size) }
    }

    fn zeroed(&self) -> bool {
        true
    }
}

// Move a buffer from one allocator to another by copying.
//
// The new buffer is allocated first and the old one is released last. If the
// release fails, the new buffer is released as well and the old buffer remains
// owned by the caller.
//
// # Safety
//
// `ptr` must be a live buffer of `old_size` bytes owned by `from`.
unsafe fn move_between(
    from: &impl Allocator,
    to: &impl Allocator,
    ptr: NonNull<u8>,
    old_size: usize,
    new_size: usize,
) -> Result<NonNull<u8>, Error> {
    let new = to.allocate(new_size)?;

    // Safety: Both buffers are valid for at least the copied length and are
    // distinct allocations.
    unsafe { ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), old_size.min(new_size)) };

    // Safety: Guaranteed by the caller.
    if let Err(err) = unsafe { from.release(ptr, old_size) } {
        // Safety: We allocated `new` above and never shared it.
        if let Err(discarded) = unsafe { to.release(new, new_size) } {
            tracing::error!(%discarded, %err, "failed to release buffer after a failed move");
        }

        return Err(err);
    }

    Ok(new)
}

/// A size-tiered allocator.
///
/// Buffers smaller than the threshold come from the global heap, zero-filled when
/// `ZEROED` is set. Buffers at or above it are anonymous memory mappings, which
/// avoid heap fragmentation and can be grown by remapping rather than copying.
///
/// # Examples
///
/// ```
/// use probemap::alloc::{Allocator, StepAllocator, Tier};
///
/// let alloc = StepAllocator::<true>::with_threshold(1 << 16);
/// assert_eq!(alloc.tier(1024), Tier::Heap);
/// assert_eq!(alloc.tier(1 << 16), Tier::Mapped);
///
/// let buf = alloc.allocate(1024).unwrap();
/// unsafe { alloc.release(buf, 1024).unwrap() };
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StepAllocator<const ZEROED: bool = true> {
    threshold: usize,
}

impl<const ZEROED: bool> StepAllocator<ZEROED> {
    /// Create an allocator that maps buffers of at least [`MMAP_THRESHOLD`] bytes.
    pub const fn new() -> StepAllocator<ZEROED> {
        StepAllocator::with_threshold(MMAP_THRESHOLD)
    }

    /// Create an allocator that maps buffers of at least `threshold` bytes.
    pub const fn with_threshold(threshold: usize) -> StepAllocator<ZEROED> {
        StepAllocator { threshold }
    }

    /// Returns the size at which buffers start being memory-mapped.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns the allocation path used for a buffer of `size` bytes.
    #[inline]
    pub fn tier(&self, size: usize) -> Tier {
        if size < self.threshold {
            Tier::Heap
        } else {
            Tier::Mapped
        }
    }
}

impl<const ZEROED: bool> Default for StepAllocator<ZEROED> {
    fn default() -> Self {
        StepAllocator::new()
    }
}

impl<const ZEROED: bool> fmt::Debug for StepAllocator<ZEROED> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepAllocator")
            .field("threshold", &self.threshold)
            .field("zeroed", &ZEROED)
            .finish()
    }
}

// Safety: Both tiers uphold the allocator contract, and a buffer is always
// released through the tier it was allocated from, since the tier is a pure
// function of the size.
unsafe impl<const ZEROED: bool> Allocator for StepAllocator<ZEROED> {
    fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        let tier = self.tier(size);
        tracing::trace!(size, ?tier, "allocating buffer");

        match tier {
            Tier::Heap => Heap::<ZEROED>.allocate(size),
            Tier::Mapped => Mapped.allocate(size),
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>, size: usize) -> Result<(), Error> {
        // Safety: Guaranteed by the caller, and `tier` selects the allocator
        // the buffer came from.
        unsafe {
            match self.tier(size) {
                Tier::Heap => Heap::<ZEROED>.release(ptr, size),
                Tier::Mapped => Mapped.release(ptr, size),
            }
        }
    }

    unsafe fn resize(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Result<NonNull<u8>, Error> {
        let (from, to) = (self.tier(old_size), self.tier(new_size));

        if from != to {
            tracing::trace!(old_size, new_size, ?from, ?to, "moving buffer across tiers");
        }

        // Safety: Guaranteed by the caller, and `tier` selects the allocator
        // the buffer came from.
        unsafe {
            match (from, to) {
                (Tier::Mapped, Tier::Mapped) => Mapped.resize(ptr, old_size, new_size),
                (Tier::Heap, Tier::Mapped) => {
                    move_between(&Heap::<ZEROED>, &Mapped, ptr, old_size, new_size)
                }
                (Tier::Mapped, Tier::Heap) => {
                    move_between(&Mapped, &Heap::<ZEROED>, ptr, old_size, new_size)
                }
                (Tier::Heap, Tier::Heap) => Heap::<ZEROED>.resize(ptr, old_size, new_size),
            }
        }
    }

    fn zeroed(&self) -> bool {
        ZEROED
    }
}
