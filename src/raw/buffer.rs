use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use seize::Collector;

use super::cell::Cell;
use super::grower::Grower;
use crate::alloc::{Allocator, ALIGN};
use crate::{Error, Key};

// A table buffer laid out in a single allocation.
#[repr(transparent)]
pub struct RawBuffer(u8);

// The layout of the buffer allocation.
//
// The cells follow the header, starting at `Buffer::CELLS`.
#[repr(C)]
struct BufferLayout<A> {
    grower: Grower,
    // A handle to the allocator that owns this buffer, so the buffer can be
    // released from a reclamation callback.
    alloc: A,
}

// Manages a buffer allocation.
pub struct Buffer<K, V, A> {
    // The sizing state of this buffer.
    pub grower: Grower,
    // The raw buffer pointer.
    pub raw: *mut RawBuffer,
    _kv: PhantomData<(K, V, A)>,
}

impl<K, V, A> Copy for Buffer<K, V, A> {}

impl<K, V, A> Clone for Buffer<K, V, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, A> Buffer<K, V, A> {
    // The offset of the first cell, rounded up to the cell alignment.
    const CELLS: usize = {
        let header = mem::size_of::<BufferLayout<A>>();
        let align = mem::align_of::<Cell<K, V>>();
        (header + align - 1) & !(align - 1)
    };

    // Returns the size in bytes of a buffer for the given grower.
    fn size(grower: Grower) -> Result<usize, Error> {
        grower
            .capacity()
            .checked_mul(mem::size_of::<Cell<K, V>>())
            .and_then(|cells| cells.checked_add(Self::CELLS))
            .ok_or(Error::Alloc { size: usize::MAX })
    }

    // Creates a `Buffer` from a raw pointer.
    //
    // # Safety
    //
    // `raw` must point to a live buffer allocated by `Buffer::alloc` with the
    // same `K`, `V`, and `A`.
    #[inline]
    pub unsafe fn from_raw(raw: *mut RawBuffer) -> Buffer<K, V, A> {
        let layout = unsafe { &*raw.cast::<BufferLayout<A>>() };

        Buffer {
            raw,
            grower: layout.grower,
            _kv: PhantomData,
        }
    }

    // Returns the number of cells in the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.grower.capacity()
    }

    // Returns the cell at the given index.
    //
    // # Safety
    //
    // The buffer must outlive `'a`, and `i` must be less than the capacity.
    #[inline]
    pub unsafe fn cell<'a>(&self, i: usize) -> &'a Cell<K, V> {
        debug_assert!(i < self.capacity());

        unsafe {
            &*self
                .raw
                .cast::<u8>()
                .add(Self::CELLS)
                .cast::<Cell<K, V>>()
                .add(i)
        }
    }

    // Returns the cell at the given index, through a unique reference to the buffer.
    //
    // # Safety
    //
    // The caller must have unique access to the buffer for `'a`, and `i` must be
    // less than the capacity.
    #[inline]
    pub unsafe fn cell_mut<'a>(&mut self, i: usize) -> &'a mut Cell<K, V> {
        debug_assert!(i < self.capacity());

        unsafe {
            &mut *self
                .raw
                .cast::<u8>()
                .add(Self::CELLS)
                .cast::<Cell<K, V>>()
                .add(i)
        }
    }
}

impl<K, V, A> Buffer<K, V, A>
where
    A: Allocator,
{
    // Release the buffer allocation.
    //
    // # Safety
    //
    // The buffer must not be accessed after this call.
    pub unsafe fn dealloc(buffer: Buffer<K, V, A>) -> Result<(), Error> {
        let size = Self::size(buffer.grower)?;

        // Move the allocator handle out before its memory goes away.
        //
        // Safety: The header was initialized by `alloc` and is not read again.
        let alloc = unsafe { ptr::read(ptr::addr_of!((*buffer.raw.cast::<BufferLayout<A>>()).alloc)) };

        // Safety: The buffer was allocated with this size by this allocator.
        unsafe { alloc.release(NonNull::new_unchecked(buffer.raw.cast::<u8>()), size) }
    }
}

impl<K, V, A> Buffer<K, V, A>
where
    K: Key,
    V: Copy,
    A: Allocator + Clone,
{
    // Allocate a buffer of empty cells for the given grower.
    pub fn alloc(grower: Grower, alloc: &A) -> Result<Buffer<K, V, A>, Error> {
        assert!(mem::align_of::<BufferLayout<A>>() <= ALIGN);
        assert!(mem::align_of::<Cell<K, V>>() <= ALIGN);

        let size = Self::size(grower)?;
        let ptr = alloc.allocate(size)?.as_ptr();

        unsafe {
            // Write the buffer header.
            ptr.cast::<BufferLayout<A>>().write(BufferLayout {
                grower,
                alloc: alloc.clone(),
            });

            // Initialize the cells.
            //
            // Zero-filled memory is not necessarily a valid empty cell for every
            // key type, so every cell is written explicitly.
            let cells = ptr.add(Self::CELLS).cast::<Cell<K, V>>();
            for i in 0..grower.capacity() {
                cells.add(i).write(Cell::empty());
            }
        }

        Ok(Buffer {
            grower,
            raw: ptr.cast::<RawBuffer>(),
            _kv: PhantomData,
        })
    }
}

// Release a buffer that was retired through the collector.
//
// # Safety
//
// `raw` must be a buffer allocated by `Buffer::alloc` with the same `K`, `V`,
// and `A` that is no longer reachable.
pub unsafe fn reclaim<K, V, A>(raw: *mut RawBuffer, _collector: &Collector)
where
    A: Allocator,
{
    // Safety: Guaranteed by the caller.
    let result = unsafe { Buffer::<K, V, A>::dealloc(Buffer::from_raw(raw)) };

    if let Err(err) = result {
        fatal(err);
    }
}

// Failing to release memory on a path that cannot report errors leaves the
// allocator in an unknown state.
#[cold]
pub fn fatal(err: Error) -> ! {
    tracing::error!(%err, "failed to release table buffer");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::StepAllocator;

    #[test]
    fn layout() {
        let alloc = StepAllocator::<true>::new();
        let buffer: Buffer<u64, u64, StepAllocator> = Buffer::alloc(Grower::new(4), &alloc).unwrap();

        unsafe {
            let buffer = Buffer::<u64, u64, StepAllocator>::from_raw(buffer.raw);
            assert_eq!(buffer.capacity(), 16);
            assert_eq!(buffer.grower, Grower::new(4));

            // The cells are aligned and empty.
            for i in 0..buffer.capacity() {
                let cell = buffer.cell(i);
                assert_eq!(cell as *const _ as usize % mem::align_of::<Cell<u64, u64>>(), 0);
                assert!(cell.is_empty());
            }

            Buffer::dealloc(buffer).unwrap();
        }
    }

    #[test]
    fn mapped_buffer() {
        // Force the buffer onto the mapped path.
        let alloc = StepAllocator::<false>::with_threshold(1);
        let buffer: Buffer<u32, u8, StepAllocator<false>> =
            Buffer::alloc(Grower::new(10), &alloc).unwrap();

        unsafe {
            let cell = buffer.cell(1023);
            cell.claim().unwrap();
            cell.commit(5, 6);
            assert_eq!(buffer.cell(1023).entry(), Some((&5, &6)));

            Buffer::dealloc(buffer).unwrap();
        }
    }
}
