//! Synchronization primitives for ISR-safe access.
//!
//! Low-level primitives shared by submitters, the interrupt dispatcher and
//! async waiters.

use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::Waker;
use critical_section::Mutex;

/// Cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` for safe mutable access
/// from both normal code and interrupt handlers.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Try to execute a closure, returning `None` if already borrowed.
    #[inline]
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow_mut()
                .ok()
                .map(|mut value| f(&mut value))
        })
    }

    /// Execute a closure with immutable access.
    #[inline]
    pub fn with_ref<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        critical_section::with(|cs| {
            let value = self.inner.borrow_ref(cs);
            f(&value)
        })
    }
}

/// Thread-safe, interrupt-safe waker storage for one waiter.
///
/// Register a waker from async poll, wake from interrupt handler.
pub struct AtomicWaker {
    waker: CriticalSectionCell<Option<Waker>>,
}

impl AtomicWaker {
    /// Create a new empty waker (const, suitable for static initialization).
    pub const fn new() -> Self {
        Self {
            waker: CriticalSectionCell::new(None),
        }
    }

    /// Register a waker to be woken later.
    pub fn register(&self, waker: &Waker) {
        self.waker.with(|slot| match slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        });
    }

    /// Wake the registered waker, if any (clears the stored waker).
    #[inline]
    pub fn wake(&self) {
        let waker = self.waker.with(Option::take);
        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Check if a waker is currently registered.
    pub fn is_registered(&self) -> bool {
        self.waker.with_ref(Option::is_some)
    }
}

impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of waiters blocked on one shared condition.
///
/// Blocking waiters snapshot [`WaiterList::epoch`] before checking their
/// predicate and wait until it changes; async waiters register a waker
/// before checking theirs. Either way a notification that lands between
/// the check and the wait is never lost.
pub struct WaiterList {
    wakers: CriticalSectionCell<Vec<Waker>>,
    epoch: AtomicU32,
}

impl WaiterList {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self {
            wakers: CriticalSectionCell::new(Vec::new()),
            epoch: AtomicU32::new(0),
        }
    }

    /// Notification counter; changes on every [`WaiterList::wake_all`].
    #[inline]
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Add a waker to be woken on the next notification.
    pub fn register(&self, waker: &Waker) {
        self.wakers.with(|wakers| {
            if !wakers.iter().any(|w| w.will_wake(waker)) {
                wakers.push(waker.clone());
            }
        });
    }

    /// Wake every registered waiter and advance the epoch.
    pub fn wake_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let wakers = self.wakers.with(core::mem::take);
        for waker in wakers {
            waker.wake();
        }
    }

    /// Number of registered async waiters.
    pub fn len(&self) -> usize {
        self.wakers.with_ref(Vec::len)
    }

    /// Check whether no async waiter is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaiterList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]
mod tests {
    extern crate std;

    use super::*;
    use crate::testing::{WakeCounter, test_waker};

    #[test]
    fn critical_section_cell_new() {
        let cell: CriticalSectionCell<u32> = CriticalSectionCell::new(42);
        let value = cell.with(|v| *v);
        assert_eq!(value, 42);
    }

    #[test]
    fn critical_section_cell_with_mutates() {
        let cell: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
        cell.with(|v| *v += 10);
        assert_eq!(cell.with_ref(|v| *v), 10);
    }

    #[test]
    fn critical_section_cell_try_with_fails_when_borrowed() {
        let cell: CriticalSectionCell<u32> = CriticalSectionCell::new(1);
        let nested = cell.with(|_| cell.try_with(|v| *v));
        assert_eq!(nested, None);
        assert_eq!(cell.try_with(|v| *v), Some(1));
    }

    #[test]
    fn critical_section_cell_static_usage() {
        static CELL: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
        CELL.with(|v| *v = 100);
        assert_eq!(CELL.with(|v| *v), 100);
    }

    #[test]
    fn atomic_waker_wake_calls_and_clears() {
        let atomic_waker = AtomicWaker::new();
        let counter = WakeCounter::new();
        atomic_waker.register(&test_waker(counter.clone()));
        assert!(atomic_waker.is_registered());

        atomic_waker.wake();
        atomic_waker.wake();
        assert_eq!(counter.count(), 1);
        assert!(!atomic_waker.is_registered());
    }

    #[test]
    fn atomic_waker_register_overwrites_previous() {
        let atomic_waker = AtomicWaker::default();
        let counter1 = WakeCounter::new();
        let counter2 = WakeCounter::new();

        atomic_waker.register(&test_waker(counter1.clone()));
        atomic_waker.register(&test_waker(counter2.clone()));
        atomic_waker.wake();

        assert_eq!(counter1.count(), 0);
        assert_eq!(counter2.count(), 1);
    }

    #[test]
    fn waiter_list_wakes_every_registered_waiter() {
        let list = WaiterList::new();
        let a = WakeCounter::new();
        let b = WakeCounter::new();
        list.register(&test_waker(a.clone()));
        list.register(&test_waker(b.clone()));
        assert_eq!(list.len(), 2);

        list.wake_all();
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn waiter_list_deduplicates_same_waker() {
        let list = WaiterList::new();
        let counter = WakeCounter::new();
        let waker = test_waker(counter.clone());
        list.register(&waker);
        list.register(&waker);
        assert_eq!(list.len(), 1);

        list.wake_all();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn waiter_list_epoch_advances_on_wake() {
        let list = WaiterList::new();
        let seen = list.epoch();
        list.wake_all();
        assert_ne!(list.epoch(), seen);
    }
}
