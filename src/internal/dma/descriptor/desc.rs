//! Scatter-gather descriptor consumed by the engine.

use super::VolatileCell;
use super::bits::{control, length};

/// Hardware descriptor (32 bytes).
///
/// For host-to-card transfers `src` is a host bus address and `dst` a device
/// offset; card-to-host swaps the two. A zero length makes the descriptor a
/// skip: the engine consumes and counts it without touching memory.
#[repr(C, align(32))]
pub struct Descriptor {
    /// Magic and flag bits
    control: VolatileCell<u32>,
    /// Byte count
    length: VolatileCell<u32>,
    /// Source address, low word
    src_lo: VolatileCell<u32>,
    /// Source address, high word
    src_hi: VolatileCell<u32>,
    /// Destination address, low word
    dst_lo: VolatileCell<u32>,
    /// Destination address, high word
    dst_hi: VolatileCell<u32>,
    /// Next descriptor bus address, low word
    next_lo: VolatileCell<u32>,
    /// Next descriptor bus address, high word
    next_hi: VolatileCell<u32>,
}

impl Descriptor {
    /// Size of the descriptor in bytes
    pub const SIZE: usize = 32;

    /// Create a new zeroed descriptor.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            control: VolatileCell::new(0),
            length: VolatileCell::new(0),
            src_lo: VolatileCell::new(0),
            src_hi: VolatileCell::new(0),
            dst_lo: VolatileCell::new(0),
            dst_hi: VolatileCell::new(0),
            next_lo: VolatileCell::new(0),
            next_hi: VolatileCell::new(0),
        }
    }

    /// Point this descriptor at its successor in the ring.
    pub fn set_next(&self, next: u64) {
        self.next_lo.set(next as u32);
        self.next_hi.set((next >> 32) as u32);
    }

    /// Fill the descriptor for one segment.
    ///
    /// `last` marks the end of a transfer chain (stop, completion, end of packet).
    pub fn prepare(&self, src: u64, dst: u64, len: u32, last: bool) {
        self.src_lo.set(src as u32);
        self.src_hi.set((src >> 32) as u32);
        self.dst_lo.set(dst as u32);
        self.dst_hi.set((dst >> 32) as u32);
        self.length.set(len & length::MASK);

        let mut flags = control::MAGIC_WORD | control::LINK;
        if last {
            flags |= control::CHAIN_END;
        }
        self.control.set(flags);
    }

    /// Turn the descriptor into a skip, keeping its chain flags.
    pub fn neuter(&self) {
        self.length.set(0);
    }

    /// Clear everything except the ring link after retirement.
    pub fn reset(&self) {
        self.control.set(0);
        self.length.set(0);
        self.src_lo.set(0);
        self.src_hi.set(0);
        self.dst_lo.set(0);
        self.dst_hi.set(0);
    }

    /// Raw control word.
    #[inline(always)]
    #[must_use]
    pub fn control(&self) -> u32 {
        self.control.get()
    }

    /// Check that the magic field is valid.
    #[inline(always)]
    #[must_use]
    pub fn has_magic(&self) -> bool {
        (self.control.get() & control::MAGIC_MASK) == control::MAGIC_WORD
    }

    /// Check whether this descriptor ends a transfer chain.
    #[inline(always)]
    #[must_use]
    pub fn is_last(&self) -> bool {
        (self.control.get() & control::STOP) != 0
    }

    /// Check whether completion of this descriptor should be signalled.
    #[inline(always)]
    #[must_use]
    pub fn signals_completion(&self) -> bool {
        (self.control.get() & control::COMPLETED) != 0
    }

    /// Byte count.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.length.get() & length::MASK
    }

    /// Check whether this descriptor is a skip.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source address.
    #[must_use]
    pub fn src(&self) -> u64 {
        (u64::from(self.src_hi.get()) << 32) | u64::from(self.src_lo.get())
    }

    /// Destination address.
    #[must_use]
    pub fn dst(&self) -> u64 {
        (u64::from(self.dst_hi.get()) << 32) | u64::from(self.dst_lo.get())
    }

    /// Next descriptor address.
    #[must_use]
    pub fn next(&self) -> u64 {
        (u64::from(self.next_hi.get()) << 32) | u64::from(self.next_lo.get())
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}
