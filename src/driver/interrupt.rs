//! Engine status handling.
//!
//! This module provides the [`EngineStatus`] structure for parsing the
//! per-channel status register and decoding engine errors.

use super::error::EngineErrorKind;
use crate::internal::register::engine::{error_detail, status};

// =============================================================================
// Engine Status
// =============================================================================

/// Status flags parsed from a channel's status register.
///
/// # Example
///
/// ```ignore
/// let status = EngineStatus::from_raw(regs.status());
/// if status.has_error() {
///     let kind = status.decode_error(regs.error_detail());
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineStatus {
    /// Engine is still moving data
    pub busy: bool,
    /// Engine reached a stop-flagged descriptor
    pub desc_stopped: bool,
    /// A completion-flagged descriptor finished
    pub desc_completed: bool,
    /// Source and destination alignment disagree
    pub align_mismatch: bool,
    /// Descriptor magic field invalid
    pub magic_stopped: bool,
    /// Descriptor length invalid
    pub invalid_length: bool,
    /// Engine stopped while idle
    pub idle_stopped: bool,
    /// Bus error on the read side
    pub read_error: bool,
    /// Bus error on the write side
    pub write_error: bool,
    /// Descriptor fetch failed
    pub desc_error: bool,
}

impl EngineStatus {
    /// Create from raw status register value
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self {
            busy: (raw & status::BUSY) != 0,
            desc_stopped: (raw & status::DESC_STOPPED) != 0,
            desc_completed: (raw & status::DESC_COMPLETED) != 0,
            align_mismatch: (raw & status::ALIGN_MISMATCH) != 0,
            magic_stopped: (raw & status::MAGIC_STOPPED) != 0,
            invalid_length: (raw & status::INVALID_LENGTH) != 0,
            idle_stopped: (raw & status::IDLE_STOPPED) != 0,
            read_error: (raw & status::READ_ERROR) != 0,
            write_error: (raw & status::WRITE_ERROR) != 0,
            desc_error: (raw & status::DESC_ERROR) != 0,
        }
    }

    /// Convert to raw value for clearing (write-1-to-clear)
    #[inline]
    pub fn to_raw(&self) -> u32 {
        let flags = [
            (self.busy, status::BUSY),
            (self.desc_stopped, status::DESC_STOPPED),
            (self.desc_completed, status::DESC_COMPLETED),
            (self.align_mismatch, status::ALIGN_MISMATCH),
            (self.magic_stopped, status::MAGIC_STOPPED),
            (self.invalid_length, status::INVALID_LENGTH),
            (self.idle_stopped, status::IDLE_STOPPED),
            (self.read_error, status::READ_ERROR),
            (self.write_error, status::WRITE_ERROR),
            (self.desc_error, status::DESC_ERROR),
        ];
        flags
            .iter()
            .filter(|(set, _)| *set)
            .fold(0, |acc, (_, bit)| acc | bit)
    }

    /// Check if any event bit is set (busy excluded)
    #[inline]
    pub fn any(&self) -> bool {
        self.to_raw() & !status::BUSY != 0
    }

    /// Check if the engine halted on an error
    #[inline]
    pub fn has_error(&self) -> bool {
        self.to_raw() & status::ERROR_MASK != 0
    }

    /// Decode the error cause from the status bits and the error detail register
    ///
    /// Status bits take precedence; the detail code is only consulted when no
    /// known error bit is set.
    pub fn decode_error(&self, detail: u32) -> EngineErrorKind {
        if self.read_error {
            EngineErrorKind::ReadBus
        } else if self.write_error {
            EngineErrorKind::WriteBus
        } else if self.desc_error {
            EngineErrorKind::DescriptorFetch
        } else if self.magic_stopped {
            EngineErrorKind::MagicMismatch
        } else if self.invalid_length {
            EngineErrorKind::InvalidLength
        } else if self.align_mismatch {
            EngineErrorKind::AlignMismatch
        } else {
            decode_detail(detail)
        }
    }
}

fn decode_detail(detail: u32) -> EngineErrorKind {
    match detail {
        error_detail::READ_BUS => EngineErrorKind::ReadBus,
        error_detail::WRITE_BUS => EngineErrorKind::WriteBus,
        error_detail::DESCRIPTOR_FETCH => EngineErrorKind::DescriptorFetch,
        error_detail::MAGIC => EngineErrorKind::MagicMismatch,
        error_detail::LENGTH => EngineErrorKind::InvalidLength,
        error_detail::ALIGN => EngineErrorKind::AlignMismatch,
        other => EngineErrorKind::Unknown(other),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
