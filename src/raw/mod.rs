mod barrier;
mod buffer;
mod cell;
mod grower;

pub use grower::Grower;

use std::hash::BuildHasher;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use seize::{Collector, Guard, LocalGuard, OwnedGuard};

use self::barrier::Barrier;
use self::buffer::{fatal, reclaim, Buffer, RawBuffer};
use self::cell::{Cell, ZeroStorage};
use self::grower::Probe;
use crate::alloc::Allocator;
use crate::map::ResizeMode;
use crate::{Error, Key};

// The outcome of probing a buffer for an insert.
enum InsertStatus<'g, V> {
    // The entry was written to a free cell.
    Inserted(&'g V),

    // The key was already present.
    Found(&'g V),

    // Every cell is taken by another key.
    Full,
}

// An insert-only hash table with linear probing.
//
// Inserts into the main buffer register with the barrier for the duration
// of their probe and claim cells with a CAS. A resize waits for every
// registered insert to finish, copies the table into a larger buffer, and
// publishes it with a single store. Readers never register; they load the
// buffer under a guard, and old buffers are retired through the collector
// so a concurrent read never observes freed memory.
pub struct HashMap<K, V, S, A: Allocator> {
    // The current buffer.
    buffer: AtomicPtr<RawBuffer>,

    // The entry for `Key::ZERO`, which cannot live in the buffer.
    zero: ZeroStorage<K, V>,

    // The number of entries, including the zero entry.
    count: AtomicUsize,

    // Coordinates inserts with resizes.
    barrier: Barrier,

    // Collector for retired buffers.
    collector: Collector,

    // The hasher for keys.
    build_hasher: S,

    // The allocator for buffers.
    alloc: A,

    // How a resize admits inserts while it waits.
    resize_mode: ResizeMode,

    _kv: PhantomData<(K, V)>,
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Key,
    V: Copy,
    A: Allocator + Clone,
{
    // Creates a table with an eagerly allocated buffer.
    pub fn new(
        grower: Grower,
        build_hasher: S,
        alloc: A,
        collector: Collector,
        resize_mode: ResizeMode,
    ) -> Result<HashMap<K, V, S, A>, Error> {
        let buffer = Buffer::<K, V, A>::alloc(grower, &alloc)?;

        Ok(HashMap {
            buffer: AtomicPtr::new(buffer.raw),
            zero: ZeroStorage::new(),
            count: AtomicUsize::new(0),
            barrier: Barrier::new(),
            collector,
            build_hasher,
            alloc,
            resize_mode,
            _kv: PhantomData,
        })
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    A: Allocator,
{
    // Returns a guard for use with this table.
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    // Returns an owned guard for use with this table.
    #[inline]
    pub fn owned_guard(&self) -> OwnedGuard<'_> {
        self.collector.enter_owned()
    }

    // Verify that a guard was created by this table's collector.
    #[inline]
    pub fn verify(&self, guard: &impl Guard) {
        assert_eq!(
            *guard.collector(),
            self.collector,
            "Attempted to access map with incorrect guard"
        );
    }

    // Returns the configured resize mode.
    #[inline]
    pub fn resize_mode(&self) -> ResizeMode {
        self.resize_mode
    }

    // Returns the number of entries in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    // Returns a reference to the table's hasher.
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.build_hasher
    }

    // Load the current buffer.
    #[inline]
    fn buffer(&self, guard: &impl Guard) -> Buffer<K, V, A> {
        let raw = guard.protect(&self.buffer, Ordering::Acquire);

        // Safety: The buffer pointer is always a live buffer allocated with our
        // types, and the guard keeps it alive after it is retired.
        unsafe { Buffer::from_raw(raw) }
    }

    // Returns the number of cells in the current buffer.
    #[inline]
    pub fn capacity(&self, guard: &impl Guard) -> usize {
        self.buffer(guard).capacity()
    }

    // Returns the size degree of the current buffer.
    #[inline]
    pub fn size_degree(&self, guard: &impl Guard) -> u8 {
        self.buffer(guard).grower.size_degree()
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Key,
    V: Copy,
    S: BuildHasher,
    A: Allocator + Clone,
{
    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.build_hasher.hash_one(key)
    }

    // Returns the entry for a key.
    #[inline]
    pub fn find<'g>(&'g self, key: &K, guard: &'g impl Guard) -> Option<(&'g K, &'g V)> {
        if key.is_zero() {
            return self.zero.get();
        }

        let buffer = self.buffer(guard);
        let mut probe = Probe::start(self.hash(key), buffer.grower);

        loop {
            // Safety: `probe.i` is always in bounds, and the guard protects the buffer.
            let cell: &'g Cell<K, V> = unsafe { buffer.cell(probe.i) };

            if cell.key_equals(key) {
                return cell.entry();
            }

            // Cells are filled front to back along a probe chain and never
            // emptied, so the key cannot be further along.
            if !cell.is_occupied() {
                return None;
            }

            if !probe.next() {
                return None;
            }
        }
    }

    // Inserts a key-value pair, returning the stored value and whether the key
    // was inserted.
    //
    // If the key is already present, the existing value is returned and the
    // table is unchanged.
    pub fn insert<'g>(
        &'g self,
        key: K,
        value: V,
        guard: &'g impl Guard,
    ) -> Result<(&'g V, bool), Error> {
        // The table is already full, help the pending resize before adding to it.
        if self.buffer(guard).grower.overflow(self.len()) {
            if let Err(err) = self.resize(guard) {
                // The table could not grow, but a present key needs no room.
                return match self.find(&key, guard) {
                    Some((_, stored)) => Ok((stored, false)),
                    None => Err(err),
                };
            }
        }

        loop {
            let inserted = {
                let _participant = self.barrier.enter();

                // No resize can copy the buffer while we are registered, so the
                // buffer we load now is the one our entry must land in.
                let buffer = self.buffer(guard);

                let status = if key.is_zero() {
                    match self.zero.insert(value) {
                        (stored, true) => InsertStatus::Inserted(stored),
                        (stored, false) => InsertStatus::Found(stored),
                    }
                } else {
                    self.insert_into(buffer, self.hash(&key), key, value)
                };

                match status {
                    InsertStatus::Inserted(stored) => {
                        // Count the entry before deregistering, a resize relies on
                        // the count covering every committed entry.
                        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
                        Some((buffer, stored, count))
                    }
                    InsertStatus::Found(stored) => return Ok((stored, false)),
                    InsertStatus::Full => None,
                }
            };

            let Some((buffer, stored, count)) = inserted else {
                // Concurrent inserts took every cell before the table could grow.
                // They are all counted by the time the resize has quiesced, so it
                // sees the table overflowing, then we retry in the new buffer.
                self.resize(guard)?;
                continue;
            };

            if buffer.grower.overflow(count) && self.resize(guard)? && !key.is_zero() {
                // Resolve the entry in the new buffer.
                let stored = self.find(&key, guard).map_or(stored, |(_, value)| value);
                return Ok((stored, true));
            }

            return Ok((stored, true));
        }
    }

    // Insert an entry into the buffer.
    //
    // The caller must be registered with the barrier.
    fn insert_into<'g>(
        &self,
        buffer: Buffer<K, V, A>,
        hash: u64,
        key: K,
        value: V,
    ) -> InsertStatus<'g, V> {
        let mut probe = Probe::start(hash, buffer.grower);

        loop {
            // Safety: `probe.i` is always in bounds, and the caller's guard
            // protects the buffer.
            let cell: &'g Cell<K, V> = unsafe { buffer.cell(probe.i) };

            if cell.is_empty() && cell.claim().is_ok() {
                // Safety: We won the claim.
                return InsertStatus::Inserted(unsafe { cell.commit(key, value) });
            }

            // Another insert claimed the cell, wait for its entry to learn
            // whose key it holds.
            let (found, stored) = cell.wait_occupied();
            if *found == key {
                return InsertStatus::Found(stored);
            }

            if !probe.next() {
                return InsertStatus::Full;
            }
        }
    }

    // Grow the table, returning `true` if this call performed the resize.
    #[cold]
    #[inline(never)]
    fn resize(&self, guard: &impl Guard) -> Result<bool, Error> {
        let _quiesced = self.barrier.quiesce(self.resize_mode);

        let old = self.buffer(guard);

        // Another thread grew the table while we were waiting.
        if !old.grower.overflow(self.len()) {
            return Ok(false);
        }

        let grower = old.grower.grow();
        let new = match Buffer::<K, V, A>::alloc(grower, &self.alloc) {
            Ok(new) => new,
            Err(err) => {
                tracing::warn!(
                    %err,
                    capacity = old.capacity(),
                    entries = self.len(),
                    "failed to allocate resized table"
                );

                return Err(err);
            }
        };

        let mut moved = 0;
        for i in 0..old.capacity() {
            // Safety: `i` is in bounds, and the guard protects the buffer.
            let cell = unsafe { old.cell(i) };

            // No insert is in flight, so every claimed cell was committed.
            if let (Some(hash), Some((&key, &value))) =
                (cell.hash_with(|key| self.hash(key)), cell.entry())
            {
                self.reinsert(new, hash, key, value);
                moved += 1;
            }
        }

        debug_assert_eq!(moved + usize::from(self.zero.has_zero()), self.len());

        self.buffer.store(new.raw, Ordering::Release);

        // Safety: The store above made the old buffer unreachable for new readers,
        // and it was allocated with our types.
        unsafe { guard.defer_retire(old.raw, reclaim::<K, V, A>) };

        tracing::debug!(
            old_capacity = old.capacity(),
            new_capacity = new.capacity(),
            entries = self.len(),
            "resized table"
        );

        Ok(true)
    }

    // Insert an entry into a buffer that is not yet shared.
    fn reinsert(&self, buffer: Buffer<K, V, A>, hash: u64, key: K, value: V) {
        let mut probe = Probe::start(hash, buffer.grower);

        loop {
            // Safety: `probe.i` is in bounds and we own the buffer.
            let cell = unsafe { buffer.cell(probe.i) };

            if cell.claim().is_ok() {
                // Safety: We won the claim.
                unsafe { cell.commit(key, value) };
                return;
            }

            assert!(probe.next(), "resized table has no free cell");
        }
    }

    // Entries cannot be removed from a shared table.
    pub fn erase(&self, _key: &K) -> Result<bool, Error> {
        Err(Error::Unsupported { operation: "erase" })
    }

    // Remove every entry, keeping the current capacity.
    pub fn clear(&mut self) {
        // Safety: We have unique access to the table, so no guard can observe
        // the buffer.
        let mut buffer = unsafe { Buffer::<K, V, A>::from_raw(*self.buffer.get_mut()) };

        for i in 0..buffer.capacity() {
            // Safety: `i` is in bounds, and we have unique access.
            unsafe { buffer.cell_mut(i) }.reset_to_empty();
        }

        self.zero.reset();
        *self.count.get_mut() = 0;
    }

    // Returns an iterator over the entries of the current buffer.
    pub fn iter<'g>(&'g self, guard: &'g impl Guard) -> Iter<'g, K, V, A> {
        Iter {
            zero: self.zero.get(),
            buffer: self.buffer(guard),
            i: 0,
            _guard: PhantomData,
        }
    }
}

impl<K, V, S, A> Drop for HashMap<K, V, S, A>
where
    A: Allocator,
{
    fn drop(&mut self) {
        // Safety: We have unique access to the table, so no guards are active and
        // every retired buffer can be released.
        unsafe { self.collector.reclaim_all() };

        // Safety: The current buffer was never retired.
        let buffer = unsafe { Buffer::<K, V, A>::from_raw(*self.buffer.get_mut()) };

        // Safety: We have unique access and the buffer is not accessed again.
        if let Err(err) = unsafe { Buffer::dealloc(buffer) } {
            fatal(err);
        }
    }
}

// An iterator over the entries of a buffer snapshot.
//
// Yields the zero entry first, then occupied cells in slot order.
pub struct Iter<'g, K, V, A> {
    zero: Option<(&'g K, &'g V)>,
    buffer: Buffer<K, V, A>,
    i: usize,
    _guard: PhantomData<&'g ()>,
}

impl<'g, K, V, A> Iterator for Iter<'g, K, V, A>
where
    K: Key,
    V: Copy,
{
    type Item = (&'g K, &'g V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(entry) = self.zero.take() {
            return Some(entry);
        }

        while self.i < self.buffer.capacity() {
            // Safety: `i` is in bounds, and the guard protects the buffer for `'g`.
            let cell: &'g Cell<K, V> = unsafe { self.buffer.cell(self.i) };
            self.i += 1;

            if let Some(entry) = cell.entry() {
                return Some(entry);
            }
        }

        None
    }
}

impl<K, V, A> Clone for Iter<'_, K, V, A> {
    fn clone(&self) -> Self {
        Iter {
            zero: self.zero,
            buffer: self.buffer,
            i: self.i,
            _guard: PhantomData,
        }
    }
}

// Safety: An iterator holds a shared reference to the buffer.
unsafe impl<K, V, A> Send for Iter<'_, K, V, A>
where
    K: Sync,
    V: Sync,
{
}

unsafe impl<K, V, A> Sync for Iter<'_, K, V, A>
where
    K: Sync,
    V: Sync,
{
}
