//! Single-occupant exchange cell for one open shard handle.
//!
//! A slot is either holding its handle, empty because exactly one caller has
//! the handle checked out, or tombstoned because the entry is being evicted.
//! Taking the handle out leaves the slot empty until it is checked back in,
//! so a handle is never visible to two callers at once.
//!
//! Only a caller that owns the real handle may tombstone the slot. An
//! evictor therefore checks the handle out first, which means a reader can
//! never have its check-in clobbered by a tombstone.

use std::fs::File;
use std::mem;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Why a handle could not be taken out of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// Another caller holds the handle (non-blocking checkout only).
    Busy,
    /// The entry was evicted; drop the reference and look the path up again.
    Stale,
    /// The handle was not returned before the deadline.
    TimedOut,
}

#[derive(Debug)]
enum SlotState {
    Available(File),
    CheckedOut,
    Tombstoned,
}

/// Exclusive holder for one cached handle.
#[derive(Debug)]
pub struct HandleSlot {
    state: Mutex<SlotState>,
    returned: Condvar,
}

impl HandleSlot {
    /// A new slot whose handle is already held by the caller creating it.
    #[must_use]
    pub fn checked_out() -> Self {
        Self {
            state: Mutex::new(SlotState::CheckedOut),
            returned: Condvar::new(),
        }
    }

    /// Block until the handle is available and take it.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Stale`] if the slot is, or becomes, tombstoned.
    pub fn checkout(&self) -> Result<File, SlotError> {
        let mut state = self.state.lock();
        loop {
            match mem::replace(&mut *state, SlotState::CheckedOut) {
                SlotState::Available(file) => return Ok(file),
                SlotState::Tombstoned => {
                    *state = SlotState::Tombstoned;
                    return Err(SlotError::Stale);
                }
                SlotState::CheckedOut => self.returned.wait(&mut state),
            }
        }
    }

    /// Like [`checkout`](Self::checkout) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Stale`] for a tombstoned slot and
    /// [`SlotError::TimedOut`] when the deadline passes first.
    pub fn checkout_timeout(&self, timeout: Duration) -> Result<File, SlotError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match mem::replace(&mut *state, SlotState::CheckedOut) {
                SlotState::Available(file) => return Ok(file),
                SlotState::Tombstoned => {
                    *state = SlotState::Tombstoned;
                    return Err(SlotError::Stale);
                }
                SlotState::CheckedOut => {
                    if self.returned.wait_until(&mut state, deadline).timed_out()
                        && matches!(*state, SlotState::CheckedOut)
                    {
                        return Err(SlotError::TimedOut);
                    }
                }
            }
        }
    }

    /// Take the handle only if nobody holds it right now.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Busy`] if the handle is checked out and
    /// [`SlotError::Stale`] if the slot is tombstoned.
    pub fn try_checkout(&self) -> Result<File, SlotError> {
        let mut state = self.state.lock();
        match mem::replace(&mut *state, SlotState::CheckedOut) {
            SlotState::Available(file) => Ok(file),
            SlotState::CheckedOut => Err(SlotError::Busy),
            SlotState::Tombstoned => {
                *state = SlotState::Tombstoned;
                Err(SlotError::Stale)
            }
        }
    }

    /// Put a checked-out handle back and wake one waiter.
    ///
    /// Returns the handle back to the caller if the slot was tombstoned in
    /// the meantime, so the caller can close it.
    pub fn checkin(&self, file: File) -> Option<File> {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::CheckedOut) {
            *state = SlotState::Available(file);
            drop(state);
            self.returned.notify_one();
            return None;
        }
        debug_assert!(
            matches!(*state, SlotState::Tombstoned),
            "checkin into a slot that already holds a handle"
        );
        Some(file)
    }

    /// Mark the slot as decommissioned and wake every waiter.
    ///
    /// The caller must currently hold the slot's handle (taken with one of
    /// the checkout methods); the handle itself is the caller's to close.
    pub fn tombstone(&self) {
        let mut state = self.state.lock();
        debug_assert!(
            !matches!(*state, SlotState::Available(_)),
            "tombstone without holding the handle"
        );
        *state = SlotState::Tombstoned;
        drop(state);
        self.returned.notify_all();
    }

    /// Whether the slot has been tombstoned.
    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Tombstoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::tempfile;

    fn slot_with_handle() -> HandleSlot {
        let slot = HandleSlot::checked_out();
        assert!(slot.checkin(tempfile().expect("tempfile")).is_none());
        slot
    }

    #[test]
    fn new_slot_is_held_by_creator() {
        let slot = HandleSlot::checked_out();
        assert_eq!(slot.try_checkout().err(), Some(SlotError::Busy));
    }

    #[test]
    fn checkout_empties_the_slot_until_checkin() {
        let slot = slot_with_handle();
        let file = slot.checkout().expect("available");
        assert_eq!(slot.try_checkout().err(), Some(SlotError::Busy));
        assert!(slot.checkin(file).is_none());
        assert!(slot.try_checkout().is_ok());
    }

    #[test]
    fn tombstone_is_sticky_for_every_observer() {
        let slot = slot_with_handle();
        let file = slot.checkout().expect("available");
        slot.tombstone();
        drop(file);

        assert!(slot.is_tombstoned());
        assert_eq!(slot.checkout().err(), Some(SlotError::Stale));
        assert_eq!(slot.try_checkout().err(), Some(SlotError::Stale));
        assert_eq!(
            slot.checkout_timeout(Duration::from_millis(5)).err(),
            Some(SlotError::Stale)
        );
    }

    #[test]
    fn checkin_into_tombstoned_slot_hands_file_back() {
        let slot = HandleSlot::checked_out();
        slot.tombstone();
        let file = tempfile().expect("tempfile");
        assert!(slot.checkin(file).is_some());
    }

    #[test]
    fn checkout_timeout_expires_while_held() {
        let slot = slot_with_handle();
        let _held = slot.checkout().expect("available");
        let started = Instant::now();
        assert_eq!(
            slot.checkout_timeout(Duration::from_millis(20)).err(),
            Some(SlotError::TimedOut)
        );
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn blocked_checkout_wakes_on_checkin() {
        let slot = Arc::new(slot_with_handle());
        let held = slot.checkout().expect("available");
        let ready = Arc::new(Barrier::new(2));

        let waiter = {
            let slot = Arc::clone(&slot);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                ready.wait();
                slot.checkout().map(|_| ())
            })
        };

        ready.wait();
        thread::sleep(Duration::from_millis(10));
        assert!(slot.checkin(held).is_none());
        assert_eq!(waiter.join().expect("waiter thread"), Ok(()));
    }

    #[test]
    fn blocked_checkout_wakes_on_tombstone() {
        let slot = Arc::new(slot_with_handle());
        let held = slot.checkout().expect("available");
        let ready = Arc::new(Barrier::new(4));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let ready = Arc::clone(&ready);
                thread::spawn(move || {
                    ready.wait();
                    slot.checkout().map(|_| ())
                })
            })
            .collect();

        ready.wait();
        thread::sleep(Duration::from_millis(10));
        slot.tombstone();
        drop(held);

        for waiter in waiters {
            assert_eq!(waiter.join().expect("waiter thread"), Err(SlotError::Stale));
        }
    }
}
