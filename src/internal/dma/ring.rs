//! Circular descriptor ring with free-running producer and consumer indices.
//!
//! The ring is an arena of fixed slots. Ownership of a slot moves from the
//! submitter (via [`DescriptorRing::reserve`]) to the hardware (doorbell) and
//! back to the dispatcher (via [`DescriptorRing::retire`]); every reserved slot
//! carries the generation tag of the transfer that owns it.
//!
//! Indices are free-running `u32` counters. Slot position is `index & (depth - 1)`,
//! so the depth must be a power of two for the counters to wrap cleanly.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::descriptor::Descriptor;
use crate::driver::error::{TransferError, TransferResult};

/// One direction-resolved descriptor payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Source bus address or device offset
    pub src: u64,
    /// Destination bus address or device offset
    pub dst: u64,
    /// Byte count
    pub len: u32,
}

/// Contiguous run of ring slots reserved for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotRange {
    /// Free-running index of the first slot
    pub start: u32,
    /// Number of slots
    pub count: u32,
    /// Owner tag stored in every slot of the range (never zero)
    pub generation: u32,
}

impl SlotRange {
    /// Free-running index one past the last slot
    #[inline(always)]
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.start.wrapping_add(self.count)
    }

    /// Check whether the free-running index falls inside the range
    #[cfg(test)]
    #[must_use]
    pub const fn contains(&self, index: u32) -> bool {
        index.wrapping_sub(self.start) < self.count
    }
}

/// Tag stored in free slots
const FREE: u32 = 0;

/// Fixed-capacity descriptor ring
pub struct DescriptorRing {
    descriptors: Box<[Descriptor]>,
    tags: Box<[u32]>,
    producer: u32,
    consumer: u32,
    next_generation: u32,
}

impl DescriptorRing {
    /// Allocate a ring of `depth` descriptors
    ///
    /// Returns `None` unless `depth` is a power of two of at least 2.
    pub fn new(depth: usize) -> Option<Self> {
        if depth < 2 || !depth.is_power_of_two() || depth > (u32::MAX as usize) / 2 {
            return None;
        }

        let mut descriptors = Vec::new();
        descriptors.try_reserve_exact(depth).ok()?;
        descriptors.extend((0..depth).map(|_| Descriptor::new()));

        let mut tags = Vec::new();
        tags.try_reserve_exact(depth).ok()?;
        tags.resize(depth, FREE);

        Some(Self {
            descriptors: descriptors.into_boxed_slice(),
            tags: tags.into_boxed_slice(),
            producer: 0,
            consumer: 0,
            next_generation: 1,
        })
    }

    /// Chain every slot to its successor, the last wrapping to the first
    pub fn link(&self, bus_base: u64) {
        let depth = self.descriptors.len();
        for (i, desc) in self.descriptors.iter().enumerate() {
            let next = (i + 1) % depth;
            desc.set_next(bus_base + (next * Descriptor::SIZE) as u64);
        }
    }

    /// Base of the descriptor array
    #[inline(always)]
    pub fn as_ptr(&self) -> *const Descriptor {
        self.descriptors.as_ptr()
    }

    /// Number of slots
    #[cfg(test)]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.descriptors.len()
    }

    /// Number of slots that may be reserved at once (one is kept free)
    #[inline(always)]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.descriptors.len() - 1
    }

    /// Slots reserved and not yet retired
    #[inline(always)]
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.producer.wrapping_sub(self.consumer) as usize
    }

    /// Slots available to [`DescriptorRing::reserve`]
    #[inline(always)]
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.in_use()
    }

    /// Check if nothing is outstanding
    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.producer == self.consumer
    }

    /// Check if no slot can be reserved
    #[cfg(test)]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Free-running index of the next slot to reserve
    #[inline(always)]
    #[must_use]
    pub fn producer(&self) -> u32 {
        self.producer
    }

    /// Free-running index of the oldest unretired slot
    #[inline(always)]
    #[must_use]
    pub fn consumer(&self) -> u32 {
        self.consumer
    }

    #[inline(always)]
    fn slot(&self, index: u32) -> usize {
        (index as usize) & (self.descriptors.len() - 1)
    }

    /// Descriptor at a free-running index
    #[inline(always)]
    pub fn descriptor(&self, index: u32) -> &Descriptor {
        &self.descriptors[self.slot(index)]
    }

    /// Generation tag at a free-running index (zero when free)
    #[inline(always)]
    #[must_use]
    pub fn generation_at(&self, index: u32) -> u32 {
        self.tags[self.slot(index)]
    }

    /// Give up the descriptor memory for good
    ///
    /// For an engine that would not stop: it may still fetch from these
    /// descriptors, so they are never returned to the allocator.
    pub fn abandon(self) -> &'static [Descriptor] {
        Box::leak(self.descriptors)
    }

    /// Check that every slot of the range is still tagged with its generation
    #[cfg(test)]
    #[must_use]
    pub fn owns(&self, range: &SlotRange) -> bool {
        (0..range.count).all(|i| self.generation_at(range.start.wrapping_add(i)) == range.generation)
    }

    /// Reserve `count` contiguous slots for a new transfer
    ///
    /// Returns `Busy` when the ring lacks room and `TooLarge` when `count` can
    /// never fit. Never blocks.
    pub fn reserve(&mut self, count: usize) -> TransferResult<SlotRange> {
        if count == 0 || count > self.capacity() {
            return Err(TransferError::TooLarge);
        }
        if count > self.free() {
            return Err(TransferError::Busy);
        }

        let generation = self.next_generation;
        self.next_generation = match self.next_generation.wrapping_add(1) {
            FREE => 1,
            next => next,
        };

        let range = SlotRange {
            start: self.producer,
            count: count as u32,
            generation,
        };
        for i in 0..range.count {
            let slot = self.slot(range.start.wrapping_add(i));
            debug_assert_eq!(self.tags[slot], FREE, "reserved slot still owned");
            self.tags[slot] = generation;
        }
        self.producer = range.end();
        Ok(range)
    }

    /// Fill reserved slots; the last segment ends the chain
    pub fn write(&self, range: &SlotRange, segments: &[Segment]) {
        debug_assert_eq!(segments.len(), range.count as usize);
        let last = segments.len().saturating_sub(1);
        for (i, seg) in segments.iter().enumerate() {
            let index = range.start.wrapping_add(i as u32);
            debug_assert_eq!(self.generation_at(index), range.generation);
            self.descriptor(index).prepare(seg.src, seg.dst, seg.len, i == last);
        }
    }

    /// Retire every slot before the free-running index `up_to`
    ///
    /// Returns the number of slots retired, or `None` when `up_to` lies
    /// outside the outstanding window (a stale or corrupt hardware count).
    pub fn retire(&mut self, up_to: u32) -> Option<u32> {
        let requested = up_to.wrapping_sub(self.consumer);
        let outstanding = self.producer.wrapping_sub(self.consumer);
        if requested > outstanding {
            return None;
        }

        for _ in 0..requested {
            let slot = self.slot(self.consumer);
            self.descriptors[slot].reset();
            self.tags[slot] = FREE;
            self.consumer = self.consumer.wrapping_add(1);
        }
        Some(requested)
    }

    /// Check whether the hardware has consumed every slot of the range
    #[must_use]
    pub fn is_retired(&self, range: &SlotRange) -> bool {
        let done = self.consumer.wrapping_sub(range.start);
        let issued = self.producer.wrapping_sub(range.start);
        done <= issued && done >= range.count
    }

    /// Turn the unconsumed slots of a range into skips and release their tags
    ///
    /// The engine must be stopped. Returns the number of slots neutered.
    pub fn neuter(&mut self, range: &SlotRange) -> u32 {
        let done = self.consumer.wrapping_sub(range.start);
        let issued = self.producer.wrapping_sub(range.start);
        let skip = if done <= issued { done.min(range.count) } else { 0 };

        for i in skip..range.count {
            let slot = self.slot(range.start.wrapping_add(i));
            self.descriptors[slot].neuter();
            if self.tags[slot] == range.generation {
                self.tags[slot] = FREE;
            }
        }
        range.count - skip
    }
}

// =============================================================================
// Tests
// =============================================================================
