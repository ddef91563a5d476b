//! Hardware transfer descriptor.
//!
//! Each descriptor describes one contiguous segment moved between host
//! memory and a device offset, plus a link to the next descriptor.

pub mod bits;
mod desc;

pub use desc::Descriptor;

/// Volatile cell wrapper for descriptor fields
///
/// Ensures all accesses are volatile so the compiler never caches or elides
/// a field the engine reads or writes behind its back.
#[repr(transparent)]
pub(crate) struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// SAFETY: every access is a single volatile load or store of a `Copy` value;
// mutation is serialized by the owning channel's critical section.
unsafe impl<T: Copy + Send> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Create a new volatile cell with the given initial value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self {
            value: core::cell::UnsafeCell::new(value),
        }
    }

    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        // SAFETY: the pointer comes from our own UnsafeCell and is aligned.
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        // SAFETY: the pointer comes from our own UnsafeCell and is aligned.
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }
}

impl<T: Copy + Default> Default for VolatileCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatile_cell_get_set() {
        let cell = VolatileCell::new(5u32);
        assert_eq!(cell.get(), 5);
        cell.set(9);
        assert_eq!(cell.get(), 9);
    }
}
