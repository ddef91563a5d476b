//! PCIe DMA Engine Transfer Pipeline
//!
//! A `no_std` + `alloc` Rust implementation of the transfer pipeline for a
//! PCIe-attached DMA engine with independent host-to-card (H2C) and
//! card-to-host (C2H) channels.
//!
//! The crate moves data between caller buffers and device memory using
//! hardware scatter-gather descriptor chains and interrupt-driven (or polled)
//! completion.
//!
//! # Architecture
//!
//! The pipeline is organized leaves first:
//!
//! 1. **Descriptor Ring** (internal): fixed-capacity arena of hardware
//!    descriptors with generation-tagged slot ranges
//! 2. **Buffer Mapper** ([`driver::mapper`]): pins caller pages and builds the
//!    scatter-gather list
//! 3. **Transfer Engine** (internal): splits the list into descriptors, fills
//!    the ring and rings the doorbell
//! 4. **Completion Dispatcher**: interrupt fast path plus deferred work
//! 5. **Channel**: submission lock, in-flight FIFO and the
//!    `Idle -> Active -> Draining -> Stopped` state machine
//!
//! [`DmaDevice`] ties them together. Platform access goes through the two
//! capability traits in [`hal`]: [`Hardware`] for registers and interrupt
//! vectors, [`UserMemory`] for page pinning.
//!
//! # Features
//!
//! - `log` (default): `log` facade output for attach, state changes, errors
//! - `defmt`: Enable defmt formatting for public value types
//! - `async`: `Future` impls for transfer handles and ring-room waiting
//!
//! # Example
//!
//! ```ignore
//! use pcie_dma_engine::{
//!     ChannelConfig, DeviceConfig, Direction, DmaDevice, EngineConfig, UserBuffer,
//! };
//!
//! let config = DeviceConfig::new(EngineConfig::new().with_ring_depth(128))
//!     .with_channel(ChannelConfig::new(Direction::H2C, 0x0000, 0))
//!     .with_channel(ChannelConfig::new(Direction::C2H, 0x1000, 1));
//!
//! let device = DmaDevice::attach(bar, address_space, config)?;
//!
//! let buffer = UserBuffer::new(user_addr, len);
//! let written = device.submit_and_wait(0, Direction::H2C, buffer, 0, &mut delay)?;
//! let read = device.submit_and_wait(1, Direction::C2H, buffer, 0, &mut delay)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here; thresholds and config are in Cargo.toml.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future,
    clippy::result_large_err
)]

extern crate alloc;

// =============================================================================
// Modules
// =============================================================================

pub mod buffer;
pub mod driver;
pub mod hal;
pub mod sync;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use buffer::AlignedBuffer;
pub use driver::config::{
    ChannelConfig, ChannelState, CompletionMode, DeviceConfig, Direction, EngineConfig,
};
pub use driver::device::DmaDevice;
pub use driver::error::{
    ConfigError, ConfigResult, EngineErrorKind, Error, FaultKind, Result, TransferError,
    TransferResult,
};
pub use driver::interrupt::EngineStatus;
pub use driver::mapper::{PinnedRegion, ScatterList, SgEntry, UserBuffer};
pub use driver::transfer::{TransferHandle, TransferId};
pub use driver::ChannelStats;
pub use hal::{Hardware, PageFrame, UserMemory};

/// Low-level register accessors for advanced use.
///
/// These are intentionally separated from the primary facade. Most users should
/// prefer the driver APIs instead of touching registers directly.
///
/// # Safety
///
/// Direct register access bypasses driver invariants. Stopping or
/// reprogramming an engine behind an attached [`DmaDevice`] corrupts its
/// ring bookkeeping.
pub mod unsafe_registers {
    pub use crate::internal::register::engine::EngineRegs;
}

/// Shared driver constants.
///
/// These are grouped into a dedicated module to keep the top-level facade
/// focused on driver types and integration points.
pub mod constants {
    pub use crate::internal::constants::{
        // Descriptor limits
        DEFAULT_MAX_DESCRIPTOR_LEN,
        // Ring sizing
        DEFAULT_MAX_DESCRIPTORS_PER_TRANSFER,
        DEFAULT_MAX_OUTSTANDING,
        DEFAULT_PAGE_SIZE,
        DEFAULT_RING_DEPTH,
        DESCRIPTOR_LEN_LIMIT,
        // Engine identity
        ENGINE_IDENTIFIER,
        MIN_RING_DEPTH,
        // Timing
        DEFAULT_FLUSH_POLL_ATTEMPTS,
        DEFAULT_IRQ_COALESCE,
        DEFAULT_POLL_INTERVAL_US,
        DEFAULT_TIMEOUT_MS,
    };
}
