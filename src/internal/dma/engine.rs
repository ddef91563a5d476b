//! Transfer engine: turns scatter-gather lists into descriptor chains.

use alloc::vec::Vec;
use core::sync::atomic::{Ordering, fence};

use super::ring::{DescriptorRing, Segment, SlotRange};
use crate::driver::config::{Direction, EngineConfig};
use crate::driver::error::{TransferError, TransferResult};
use crate::driver::mapper::SgEntry;
use crate::hal::Hardware;
use crate::internal::register::engine::EngineRegs;

#[cfg(feature = "log")]
use log::trace;

/// Segment planning and ring submission for one device's limits
#[derive(Debug, Clone, Copy)]
pub struct TransferEngine {
    max_descriptor_len: u32,
    max_descriptors: usize,
}

impl TransferEngine {
    /// Create an engine using the configured descriptor limits
    #[must_use]
    pub const fn new(config: &EngineConfig) -> Self {
        Self {
            max_descriptor_len: config.max_descriptor_len,
            max_descriptors: config.max_descriptors_per_transfer,
        }
    }

    /// Pages one submission can always cover, however they are laid out
    ///
    /// Every page may be its own scatter-gather run, and each run splits at
    /// the maximum descriptor length.
    #[must_use]
    pub fn pages_per_chunk(&self, page_size: usize, ring_capacity: usize) -> usize {
        let per_page = page_size.div_ceil(self.max_descriptor_len as usize).max(1);
        self.max_descriptors.min(ring_capacity) / per_page
    }

    /// Number of descriptors the list needs after splitting long entries
    #[must_use]
    pub fn descriptors_needed(&self, sg: &[SgEntry]) -> usize {
        let max = self.max_descriptor_len as usize;
        sg.iter().map(|entry| entry.len.div_ceil(max)).sum()
    }

    /// Check the list against the per-submission and ring limits
    pub fn check_fits(&self, sg: &[SgEntry], ring_capacity: usize) -> TransferResult<usize> {
        let needed = self.descriptors_needed(sg);
        if needed == 0 || needed > self.max_descriptors || needed > ring_capacity {
            return Err(TransferError::TooLarge);
        }
        Ok(needed)
    }

    /// Split the list into descriptor payloads, advancing the device offset
    pub fn plan(
        &self,
        sg: &[SgEntry],
        device_offset: u64,
        direction: Direction,
    ) -> TransferResult<Vec<Segment>> {
        let needed = self.descriptors_needed(sg);
        if needed == 0 || needed > self.max_descriptors {
            return Err(TransferError::TooLarge);
        }

        let mut segments = Vec::with_capacity(needed);
        let mut device = device_offset;
        let max = self.max_descriptor_len as usize;

        for entry in sg {
            let mut host = entry.bus_addr;
            let mut remaining = entry.len;
            while remaining > 0 {
                let len = remaining.min(max);
                let (src, dst) = match direction {
                    Direction::H2C => (host, device),
                    Direction::C2H => (device, host),
                };
                segments.push(Segment {
                    src,
                    dst,
                    len: len as u32,
                });
                host += len as u64;
                device += len as u64;
                remaining -= len;
            }
        }
        Ok(segments)
    }

    /// Reserve slots, write the chain and ring the doorbell
    ///
    /// Must be called with the channel's submission lock held. The doorbell
    /// write is ordered after every descriptor store.
    pub fn submit<H: Hardware + ?Sized>(
        &self,
        ring: &mut DescriptorRing,
        regs: &EngineRegs<'_, H>,
        segments: &[Segment],
    ) -> TransferResult<SlotRange> {
        let range = ring.reserve(segments.len())?;
        ring.write(&range, segments);

        fence(Ordering::Release);
        regs.ring_doorbell(ring.producer());

        #[cfg(feature = "log")]
        trace!(
            "doorbell {} (slots {}..{}, generation {})",
            ring.producer(),
            range.start,
            range.end(),
            range.generation
        );
        Ok(range)
    }
}

// =============================================================================
// Tests
// =============================================================================
