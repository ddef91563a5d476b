//! Buffer Mapper
//!
//! Pins the pages behind a user buffer, builds the scatter-gather list the
//! transfer engine consumes, and releases the pages exactly once when the
//! transfer is resolved.
//!
//! Pinning may sleep, so the mapper is only ever called outside channel
//! critical sections.

use alloc::vec::Vec;

#[cfg(feature = "log")]
use log::{trace, warn};

use super::config::Direction;
use super::error::FaultKind;
use crate::hal::{PageFrame, UserMemory};

/// Caller's virtual address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UserBuffer {
    /// Start address in the caller's address space
    pub addr: u64,
    /// Length in bytes
    pub len: usize,
}

impl UserBuffer {
    /// Describe `len` bytes at `addr`
    #[must_use]
    pub const fn new(addr: u64, len: usize) -> Self {
        Self { addr, len }
    }

    /// Sub-range starting `offset` bytes in
    #[must_use]
    pub const fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            addr: self.addr + offset as u64,
            len,
        }
    }
}

/// One physically contiguous run of a pinned buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SgEntry {
    /// Bus address of the first byte
    pub bus_addr: u64,
    /// Length in bytes
    pub len: usize,
}

/// Ordered scatter-gather list
pub type ScatterList = Vec<SgEntry>;

/// Pages held resident for one transfer
///
/// Owned by exactly one transfer. Released through [`BufferMapper::unpin`].
#[derive(Debug)]
pub struct PinnedRegion {
    buffer: UserBuffer,
    direction: Direction,
    pages: Vec<PageFrame>,
    sg: ScatterList,
    released: bool,
}

impl PinnedRegion {
    /// Buffer this region pins
    #[must_use]
    pub fn buffer(&self) -> UserBuffer {
        self.buffer
    }

    /// Direction the region was pinned for
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Scatter-gather list over the pinned pages
    #[must_use]
    pub fn sg_list(&self) -> &[SgEntry] {
        &self.sg
    }

    /// Number of pinned pages
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total bytes described by the region
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len
    }

    /// Always false; empty buffers are rejected by [`BufferMapper::pin`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.len == 0
    }

    /// Whether the pages have been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}

/// Pins user buffers through a [`UserMemory`] capability
pub struct BufferMapper<M: UserMemory> {
    memory: M,
}

impl<M: UserMemory> BufferMapper<M> {
    /// Create a mapper over the given address space
    pub const fn new(memory: M) -> Self {
        Self { memory }
    }

    /// Underlying address space
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Validate and pin a buffer, producing its scatter-gather list
    ///
    /// All-or-nothing: on any fault no page stays pinned.
    pub fn pin(&self, buffer: UserBuffer, direction: Direction) -> Result<PinnedRegion, FaultKind> {
        if buffer.len == 0 {
            return Err(FaultKind::Empty);
        }

        let page_size = self.memory.page_size();
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(FaultKind::Misaligned);
        }
        let page_mask = page_size as u64 - 1;

        let end = buffer
            .addr
            .checked_add(buffer.len as u64)
            .ok_or(FaultKind::OutOfRange)?;
        if end > self.memory.address_limit() {
            return Err(FaultKind::OutOfRange);
        }

        let first_page = buffer.addr & !page_mask;
        let last_page = (end - 1) & !page_mask;
        let count = ((last_page - first_page) / page_size as u64) as usize + 1;

        let pages = self
            .memory
            .pin_pages(first_page, count, direction.writes_host())?;

        if pages.len() != count || pages.iter().any(|p| p.bus_addr & page_mask != 0) {
            #[cfg(feature = "log")]
            warn!("pin returned {} frames for {} pages or misaligned frame", pages.len(), count);
            release(&self.memory, &pages, false);
            return Err(FaultKind::Misaligned);
        }

        let sg = build_scatter_list(&pages, buffer, page_size);

        #[cfg(feature = "log")]
        trace!(
            "pinned {:#x}+{} as {} pages, {} runs ({})",
            buffer.addr,
            buffer.len,
            count,
            sg.len(),
            direction.as_str()
        );

        Ok(PinnedRegion {
            buffer,
            direction,
            pages,
            sg,
            released: false,
        })
    }

    /// Release a region's pages, marking them dirty when the device wrote them
    ///
    /// Returns false if the region was already released.
    pub fn unpin(&self, region: &mut PinnedRegion, became_dirty: bool) -> bool {
        if region.released {
            return false;
        }
        region.released = true;
        release(&self.memory, &region.pages, became_dirty);
        region.pages.clear();
        region.sg.clear();
        true
    }
}

fn release<M: UserMemory>(memory: &M, pages: &[PageFrame], dirty: bool) {
    for frame in pages {
        memory.unpin_page(*frame, dirty);
    }
}

/// Merge per-page chunks into physically contiguous runs
fn build_scatter_list(pages: &[PageFrame], buffer: UserBuffer, page_size: usize) -> ScatterList {
    let mut sg: ScatterList = Vec::with_capacity(pages.len());
    let mut offset = (buffer.addr & (page_size as u64 - 1)) as usize;
    let mut remaining = buffer.len;

    for frame in pages {
        let chunk = (page_size - offset).min(remaining);
        let bus_addr = frame.bus_addr + offset as u64;

        match sg.last_mut() {
            Some(last) if last.bus_addr + last.len as u64 == bus_addr => last.len += chunk,
            _ => sg.push(SgEntry {
                bus_addr,
                len: chunk,
            }),
        }

        remaining -= chunk;
        offset = 0;
    }
    sg
}
