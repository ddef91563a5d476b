//! Synchronization and Concurrency Support
//!
//! Primitives shared by submitters, the interrupt dispatcher and async
//! waiters:
//!
//! - [`CriticalSectionCell`] - ISR-safe interior mutability, used for every
//!   channel's submission lock
//! - [`AtomicWaker`] - single waker slot, one per transfer
//! - [`WaiterList`] - many waiters on one condition, used for "ring has room"
//!
//! All of them are built on the `critical-section` crate, so the platform
//! supplies the actual lock (interrupt masking on a single core, a spinlock
//! on SMP, a global mutex under `std`).

mod primitives;

pub use primitives::{AtomicWaker, CriticalSectionCell, WaiterList};
