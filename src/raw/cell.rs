use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};
use std::{hint, thread};

use crate::Key;

// The lifecycle of a cell.
//
// A cell only ever moves forward, `EMPTY -> CLAIMED -> OCCUPIED`, while the
// table is shared. Exactly one thread wins the `EMPTY -> CLAIMED` transition
// and is then the only writer of the key and value.
pub mod state {
    // The cell holds no entry and its key is `Key::ZERO`.
    pub const EMPTY: u8 = 0;

    // An insert owns the cell and is writing the entry.
    pub const CLAIMED: u8 = 1;

    // The entry is written and visible to readers.
    pub const OCCUPIED: u8 = 2;
}

// A single slot of the table.
#[repr(C)]
pub struct Cell<K, V> {
    state: AtomicU8,
    key: UnsafeCell<K>,
    value: UnsafeCell<MaybeUninit<V>>,
}

// Safety: The key and value are written once by the claim winner before the
// `Release` store of `OCCUPIED`, and only read after an `Acquire` load observes
// it. Mutation otherwise requires `&mut self`.
unsafe impl<K: Send, V: Send> Send for Cell<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for Cell<K, V> {}

impl<K, V> Cell<K, V>
where
    K: Key,
    V: Copy,
{
    #[inline]
    pub fn empty() -> Cell<K, V> {
        Cell {
            state: AtomicU8::new(state::EMPTY),
            key: UnsafeCell::new(K::ZERO),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    // Returns the current state of the cell.
    #[inline]
    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    // Returns `true` if no insert has claimed this cell.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state() == state::EMPTY
    }

    // Returns `true` if the cell holds a committed entry.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.state() == state::OCCUPIED
    }

    // Returns `true` if the cell holds a committed entry with the given key.
    #[inline]
    pub fn key_equals(&self, key: &K) -> bool {
        self.entry().is_some_and(|(k, _)| k == key)
    }

    // Hash the key of a committed entry.
    #[inline]
    pub fn hash_with(&self, hasher: impl FnOnce(&K) -> u64) -> Option<u64> {
        self.entry().map(|(key, _)| hasher(key))
    }

    // Returns the committed entry, if there is one.
    #[inline]
    pub fn entry(&self) -> Option<(&K, &V)> {
        if !self.is_occupied() {
            return None;
        }

        // Safety: We observed `OCCUPIED` with `Acquire`, so the writes of the
        // claim winner are visible, and they are never overwritten while shared.
        unsafe { Some((&*self.key.get(), (*self.value.get()).assume_init_ref())) }
    }

    // Attempt to claim an empty cell for insertion.
    //
    // Fails without side effects if the cell was already claimed, returning the
    // state that was observed instead.
    #[inline]
    pub fn claim(&self) -> Result<(), u8> {
        self.state
            .compare_exchange(
                state::EMPTY,
                state::CLAIMED,
                Ordering::Acquire,
                Ordering::Acquire,
            )
            .map(drop)
    }

    // Write the entry into a claimed cell and make it visible, returning the
    // stored value.
    //
    // # Safety
    //
    // The caller must have won `claim` on this cell, and must commit at most once.
    #[inline]
    pub unsafe fn commit(&self, key: K, value: V) -> &V {
        debug_assert_eq!(self.state.load(Ordering::Relaxed), state::CLAIMED);

        // Safety: Winning the claim gives us exclusive access to the key and
        // value until we publish them below.
        let value = unsafe {
            self.key.get().write(key);
            (*self.value.get()).write(value)
        };

        self.state.store(state::OCCUPIED, Ordering::Release);
        value
    }

    // Block until a claimed cell has been committed, returning the entry.
    //
    // The claim winner commits right after claiming, so we spin briefly before
    // yielding to let a descheduled writer make progress.
    pub fn wait_occupied(&self) -> (&K, &V) {
        const SPIN: u32 = 6;

        let mut spun = 0;
        loop {
            if let Some(entry) = self.entry() {
                return entry;
            }

            debug_assert_ne!(self.state(), state::EMPTY, "waited on an unclaimed cell");

            if spun <= SPIN {
                for _ in 0..(1 << spun) {
                    hint::spin_loop();
                }
                spun += 1;
            } else {
                thread::yield_now();
            }
        }
    }

    // Return the cell to the empty state.
    //
    // Requires unique access: cells never become empty again while shared.
    #[inline]
    pub fn reset_to_empty(&mut self) {
        *self.state.get_mut() = state::EMPTY;
        *self.key.get_mut() = K::ZERO;
    }
}

// The side slot for the entry whose key is `Key::ZERO`.
//
// That key marks empty cells in the main buffer, so it cannot live there. The
// slot is claimed with the same protocol as a regular cell, making concurrent
// inserts of the zero key race-free.
pub struct ZeroStorage<K, V> {
    cell: Cell<K, V>,
}

impl<K, V> ZeroStorage<K, V>
where
    K: Key,
    V: Copy,
{
    pub fn new() -> ZeroStorage<K, V> {
        ZeroStorage {
            cell: Cell::empty(),
        }
    }

    // Returns `true` if the zero key has been inserted.
    #[inline]
    pub fn has_zero(&self) -> bool {
        self.cell.is_occupied()
    }

    // Returns the zero entry, if it has been inserted.
    #[inline]
    pub fn get(&self) -> Option<(&K, &V)> {
        self.cell.entry()
    }

    // Remove the zero entry.
    #[inline]
    pub fn reset(&mut self) {
        self.cell.reset_to_empty();
    }

    // Insert the zero entry, returning the stored value and whether we inserted it.
    //
    // If the zero key is already present, its value is left untouched.
    pub fn insert(&self, value: V) -> (&V, bool) {
        match self.cell.claim() {
            // Safety: We just won the claim.
            Ok(()) => (unsafe { self.cell.commit(K::ZERO, value) }, true),

            // Someone else is inserting or inserted the zero key.
            Err(_) => (self.cell.wait_occupied().1, false),
        }
    }
}
