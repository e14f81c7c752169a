use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::map::ResizeMode;

// The admission gate is open and inserts may register.
const OPEN: u32 = 0;

// A resize is copying the table, new inserts must wait.
const CLOSED: u32 = 1;

// The quiescence barrier between inserts and resizes.
//
// Every insert into the main buffer registers itself for the duration of its
// probe. A resize acquires the resize lock and waits for the number of
// registered inserts to drain to zero before closing the admission gate and
// copying the table.
//
// Registration and gate closure form a store-load pair on both sides, so with
// `SeqCst` either the insert observes the closed gate and backs off, or the
// resize observes the registration and keeps waiting.
pub struct Barrier {
    // The number of inserts currently probing the table.
    in_flight: AtomicU32,

    // The admission gate, `OPEN` or `CLOSED`.
    gate: AtomicU32,

    // Serializes resizes.
    lock: Mutex<()>,
}

impl Barrier {
    pub fn new() -> Barrier {
        Barrier {
            in_flight: AtomicU32::new(0),
            gate: AtomicU32::new(OPEN),
            lock: Mutex::new(()),
        }
    }

    // Register an insert, waiting for any resize that is currently copying.
    pub fn enter(&self) -> Participant<'_> {
        loop {
            self.in_flight.fetch_add(1, Ordering::SeqCst);

            if self.gate.load(Ordering::SeqCst) == OPEN {
                return Participant { barrier: self };
            }

            // A resize closed the gate, step aside until it reopens.
            self.leave();
            atomic_wait::wait(&self.gate, CLOSED);
        }
    }

    // Returns the number of registered inserts.
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    // Deregister an insert, waking the resize once the last one leaves.
    fn leave(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            atomic_wait::wake_all(&self.in_flight);
        }
    }

    // Acquire the resize lock and wait until no insert is in flight.
    //
    // The gate stays closed until the returned guard is dropped.
    pub fn quiesce(&self, mode: ResizeMode) -> Quiesced<'_> {
        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        match mode {
            // Turn new inserts away immediately, so only the ones already in
            // flight need to drain.
            ResizeMode::Blocking => {
                self.gate.store(CLOSED, Ordering::SeqCst);
                self.drain();
            }

            // Keep admitting inserts until the count reaches zero, then close
            // the gate. If an insert registered in between, let it through and
            // wait again.
            ResizeMode::Drain => loop {
                self.drain();
                self.gate.store(CLOSED, Ordering::SeqCst);

                if self.in_flight.load(Ordering::SeqCst) == 0 {
                    break;
                }

                self.open();
            },
        }

        Quiesced {
            barrier: self,
            _lock: lock,
        }
    }

    // Block until the in-flight count drops to zero.
    fn drain(&self) {
        loop {
            let in_flight = self.in_flight();
            if in_flight == 0 {
                return;
            }

            atomic_wait::wait(&self.in_flight, in_flight);
        }
    }

    // Reopen the gate and wake any waiting inserts.
    fn open(&self) {
        self.gate.store(OPEN, Ordering::SeqCst);
        atomic_wait::wake_all(&self.gate);
    }
}

// A registered insert.
pub struct Participant<'a> {
    barrier: &'a Barrier,
}

impl Drop for Participant<'_> {
    fn drop(&mut self) {
        self.barrier.leave();
    }
}

// Exclusive access to the table for a resize.
//
// No insert is in flight or can register while this is held.
pub struct Quiesced<'a> {
    barrier: &'a Barrier,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for Quiesced<'_> {
    fn drop(&mut self) {
        self.barrier.open();
    }
}
