//! DMA Engine
//!
//! This module holds the hardware-facing half of the transfer pipeline:
//!
//! - [`Descriptor`](descriptor::Descriptor): the 32-byte scatter-gather descriptor the engine fetches
//! - [`DescriptorRing`]: fixed arena of descriptors with free-running indices
//!   and per-slot generation tags
//! - [`TransferEngine`]: splits scatter-gather lists into descriptor payloads,
//!   fills reserved slots and rings the doorbell
//!
//! # Note
//!
//! This is an internal module; the driver layer owns every ring and calls in
//! here with the channel's submission lock held.

pub(crate) mod descriptor;
mod engine;
mod ring;

#[cfg(test)]
pub use descriptor::Descriptor;
pub use engine::TransferEngine;
pub use ring::{DescriptorRing, Segment, SlotRange};
