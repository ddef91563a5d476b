//! Hardware Abstraction Layer
//!
//! This module defines the two capabilities the transfer pipeline needs from
//! its platform, so the pipeline can be driven by a real PCIe function or by
//! a simulated device in tests:
//!
//! - [`Hardware`]: register access to the BAR holding the engine blocks,
//!   interrupt vector registration, and host-to-bus address translation
//! - [`UserMemory`]: page pinning for the address space that owns the
//!   caller's buffers
//!
//! Both traits take `&self` everywhere. Implementations are shared between
//! submitters and the interrupt handler and must provide their own interior
//! synchronization where they keep state.

use alloc::vec::Vec;

use crate::driver::error::{ConfigResult, FaultKind};

// =============================================================================
// Register / Interrupt Capability
// =============================================================================

/// Register and interrupt access for one DMA-capable PCIe function
pub trait Hardware {
    /// Read the 32-bit register at `offset` bytes into the engine BAR
    fn read_reg(&self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset` bytes into the engine BAR
    fn write_reg(&self, offset: usize, value: u32);

    /// Route the interrupt vector to this device
    ///
    /// The pipeline calls [`DmaDevice::handle_irq`](crate::DmaDevice::handle_irq)
    /// with the same vector when it fires.
    fn register_irq(&self, vector: u32) -> ConfigResult<()>;

    /// Release an interrupt vector registered with [`Hardware::register_irq`]
    fn unregister_irq(&self, _vector: u32) {}

    /// Bus address the engine uses to reach host memory at `host`
    ///
    /// The default is an identity mapping.
    fn dma_address(&self, host: *const u8) -> u64 {
        host as usize as u64
    }
}

impl<T: Hardware + ?Sized> Hardware for &T {
    fn read_reg(&self, offset: usize) -> u32 {
        (**self).read_reg(offset)
    }

    fn write_reg(&self, offset: usize, value: u32) {
        (**self).write_reg(offset, value);
    }

    fn register_irq(&self, vector: u32) -> ConfigResult<()> {
        (**self).register_irq(vector)
    }

    fn unregister_irq(&self, vector: u32) {
        (**self).unregister_irq(vector);
    }

    fn dma_address(&self, host: *const u8) -> u64 {
        (**self).dma_address(host)
    }
}

// =============================================================================
// User Memory Capability
// =============================================================================

/// One pinned physical page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageFrame {
    /// Bus address of the start of the page
    pub bus_addr: u64,
}

/// Page pinning for the address space that owns user buffers
///
/// Pinning may sleep. The pipeline never calls into this trait while holding
/// a channel critical section.
pub trait UserMemory {
    /// Page size in bytes (a power of two)
    fn page_size(&self) -> usize;

    /// One past the highest valid user address
    fn address_limit(&self) -> u64;

    /// Pin the page starting at `page_addr`, keeping it resident until unpinned
    ///
    /// `writable` is set when the device will write into the page.
    fn pin_page(&self, page_addr: u64, writable: bool) -> Result<PageFrame, FaultKind>;

    /// Release a page pinned by [`UserMemory::pin_page`]
    ///
    /// `dirty` is set when the device wrote into the page.
    fn unpin_page(&self, frame: PageFrame, dirty: bool);

    /// Pin every page in `[first_page, first_page + count * page_size)`
    ///
    /// All-or-nothing: on failure the pages pinned so far are released.
    fn pin_pages(
        &self,
        first_page: u64,
        count: usize,
        writable: bool,
    ) -> Result<Vec<PageFrame>, FaultKind> {
        let page_size = self.page_size() as u64;
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(count)
            .map_err(|_| FaultKind::PinLimit)?;

        for index in 0..count as u64 {
            match self.pin_page(first_page + index * page_size, writable) {
                Ok(frame) => frames.push(frame),
                Err(fault) => {
                    for frame in frames.drain(..) {
                        self.unpin_page(frame, false);
                    }
                    return Err(fault);
                }
            }
        }
        Ok(frames)
    }
}

impl<T: UserMemory + ?Sized> UserMemory for &T {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn address_limit(&self) -> u64 {
        (**self).address_limit()
    }

    fn pin_page(&self, page_addr: u64, writable: bool) -> Result<PageFrame, FaultKind> {
        (**self).pin_page(page_addr, writable)
    }

    fn unpin_page(&self, frame: PageFrame, dirty: bool) {
        (**self).unpin_page(frame, dirty);
    }

    fn pin_pages(
        &self,
        first_page: u64,
        count: usize,
        writable: bool,
    ) -> Result<Vec<PageFrame>, FaultKind> {
        (**self).pin_pages(first_page, count, writable)
    }
}
