//! Page-aligned host buffers.
//!
//! [`AlignedBuffer`] is a zero-initialised heap allocation with a caller-chosen
//! alignment. Callers that own their staging memory use it so every transfer
//! starts on a page boundary and pins the minimum number of pages.

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::ptr::NonNull;

use crate::driver::mapper::UserBuffer;
use crate::internal::constants::DEFAULT_PAGE_SIZE;

/// Owned, aligned, zero-initialised byte buffer
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate `len` bytes aligned to `align`
    ///
    /// Returns `None` for a zero length, an alignment that is not a power of
    /// two, or when the allocator is out of memory.
    pub fn new(len: usize, align: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let layout = Layout::from_size_align(len, align).ok()?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        NonNull::new(raw).map(|ptr| Self { ptr, layout })
    }

    /// Allocate `len` bytes on a page boundary
    pub fn page_aligned(len: usize) -> Option<Self> {
        Self::new(len, DEFAULT_PAGE_SIZE)
    }

    /// Start of the allocation
    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Start of the allocation, for the device to write through
    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of the first byte
    #[inline(always)]
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    /// Length in bytes
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; zero-length buffers cannot be created
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Alignment in bytes
    #[inline(always)]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Describe the whole buffer for submission in an identity-mapped address space
    pub fn user_buffer(&self) -> UserBuffer {
        UserBuffer::new(self.addr(), self.len())
    }

    /// Contents
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialised bytes for as long as self lives.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Mutable contents
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as for as_slice, and &mut self guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl core::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("len", &self.len())
            .field("align", &self.align())
            .finish()
    }
}

// SAFETY: the buffer exclusively owns its allocation; shared access only
// hands out `&[u8]`, mutation requires `&mut self`.
unsafe impl Send for AlignedBuffer {}
// SAFETY: see above.
unsafe impl Sync for AlignedBuffer {}
