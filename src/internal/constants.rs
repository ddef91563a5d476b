//! Centralized Constants
//!
//! This module provides a single source of truth for the magic numbers and
//! configuration defaults used throughout the DMA pipeline.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Ring sizing**: Descriptor ring depth and per-transfer limits
//! - **Descriptor limits**: Maximum bytes per hardware descriptor
//! - **Timing**: Timeouts, delays, and polling intervals
//! - **Engine identity**: Identifier register values
//!
//! # Note
//!
//! Register offsets and bit definitions remain in `register/engine.rs` and
//! descriptor bits in `dma/descriptor/bits.rs`, as they are specific to
//! those hardware blocks.

// =============================================================================
// Ring Sizing
// =============================================================================

/// Default number of descriptor slots per channel ring (one is reserved)
pub const DEFAULT_RING_DEPTH: usize = 64;

/// Smallest usable ring (one usable slot plus the empty/full disambiguator)
pub const MIN_RING_DEPTH: usize = 2;

/// Default hardware limit on descriptors in one transfer chain
pub const DEFAULT_MAX_DESCRIPTORS_PER_TRANSFER: usize = 63;

/// Default maximum number of in-flight transfers per channel
pub const DEFAULT_MAX_OUTSTANDING: usize = 32;

/// Initial capacity of the deferred work queue
pub const DEFERRED_QUEUE_DEPTH: usize = 64;

// =============================================================================
// Descriptor Limits
// =============================================================================

/// Default maximum byte count carried by one descriptor (28-bit length field, page aligned)
pub const DEFAULT_MAX_DESCRIPTOR_LEN: u32 = 0x0FFF_F000;

/// Hard upper bound of the descriptor length field
pub const DESCRIPTOR_LEN_LIMIT: u32 = 0x0FFF_FFFF;

/// Default page size used for pinning when the platform does not say otherwise
pub const DEFAULT_PAGE_SIZE: usize = 4096;

// =============================================================================
// Timing Constants
// =============================================================================

/// Default transfer timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

/// Default interval between completion predicate checks in microseconds
pub const DEFAULT_POLL_INTERVAL_US: u32 = 10;

/// Register reads allowed while waiting for a stopped engine to go idle
pub const DEFAULT_FLUSH_POLL_ATTEMPTS: u32 = 1000;

/// Default number of interrupt-flagged completions per raised interrupt
pub const DEFAULT_IRQ_COALESCE: u32 = 1;

// =============================================================================
// Engine Identity
// =============================================================================

/// Expected value of IDENTIFIER bits 31..20
pub const ENGINE_IDENTIFIER: u32 = 0x1FC;

/// Shift of the identifier subsystem field
pub const ENGINE_IDENTIFIER_SHIFT: u32 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ring_holds_a_full_transfer_chain() {
        assert!(DEFAULT_MAX_DESCRIPTORS_PER_TRANSFER < DEFAULT_RING_DEPTH);
    }

    #[test]
    fn default_descriptor_len_fits_length_field() {
        assert!(DEFAULT_MAX_DESCRIPTOR_LEN <= DESCRIPTOR_LEN_LIMIT);
        assert_eq!(DEFAULT_MAX_DESCRIPTOR_LEN as usize % DEFAULT_PAGE_SIZE, 0);
    }

    #[test]
    fn default_outstanding_fits_ring() {
        assert!(DEFAULT_MAX_OUTSTANDING < DEFAULT_RING_DEPTH);
        assert!(MIN_RING_DEPTH >= 2);
    }
}
