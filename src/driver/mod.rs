//! Core driver components for the DMA transfer pipeline.
//!
//! This module contains the building blocks callers interact with:
//!
//! - [`config`] - Configuration types and builder patterns
//! - [`error`] - Error types and result aliases
//! - [`interrupt`] - Engine status decoding
//! - [`mapper`] - Buffer pinning and scatter-gather lists
//! - [`transfer`] - Transfer handles and completion signalling
//! - [`device`] - The device context that owns every channel
//!
//! Channel state and the completion dispatcher are internal.
//!
//! # Example
//!
//! ```ignore
//! use pcie_dma_engine::driver::{ChannelConfig, DeviceConfig, Direction, EngineConfig};
//!
//! let config = DeviceConfig::new(EngineConfig::new().with_max_outstanding(8))
//!     .with_channel(ChannelConfig::new(Direction::H2C, 0x0000, 0));
//! ```

// Submodules
mod channel;
pub mod config;
pub mod device;
mod dispatch;
pub mod error;
pub mod interrupt;
pub mod mapper;
pub mod transfer;


// Re-exports for convenience
pub use channel::ChannelStats;
pub use config::{
    ChannelConfig, ChannelState, CompletionMode, DeviceConfig, Direction, EngineConfig,
};
#[cfg(feature = "async")]
pub use device::RoomFuture;
pub use device::DmaDevice;
pub use error::{
    ConfigError, ConfigResult, EngineErrorKind, Error, FaultKind, Result, TransferError,
    TransferResult,
};
pub use mapper::{BufferMapper, PinnedRegion, ScatterList, SgEntry, UserBuffer};
pub use transfer::{TransferHandle, TransferId};
