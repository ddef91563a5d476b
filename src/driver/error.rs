//! Error types for the DMA transfer pipeline
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Attach-time and configuration failures
//! - [`TransferError`]: Per-transfer failures reported to submitters
//! - [`FaultKind`]: Why a user range could not be pinned
//! - [`EngineErrorKind`]: Hardware-reported failure decoded from engine status
//!
//! The unified [`Error`] enum wraps the domain errors and is returned by the
//! device-level operations that can fail in more than one way.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and attach errors
///
/// These errors occur while validating a [`DeviceConfig`](super::DeviceConfig),
/// probing engine identity registers, or registering interrupt vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidConfig,
    /// Channel index does not exist on this device
    InvalidChannel,
    /// Engine identifier reports the opposite transfer direction
    DirectionMismatch,
    /// Engine identifier register does not describe a DMA engine
    IdentifierMismatch,
    /// Interrupt vector could not be registered
    IrqRegistration,
    /// Two channels claim the same register block
    AlreadyAttached,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidConfig => "invalid configuration",
            ConfigError::InvalidChannel => "invalid channel",
            ConfigError::DirectionMismatch => "engine direction mismatch",
            ConfigError::IdentifierMismatch => "engine identifier mismatch",
            ConfigError::IrqRegistration => "interrupt registration failed",
            ConfigError::AlreadyAttached => "engine already attached",
        }
    }
}

// =============================================================================
// Fault Kinds
// =============================================================================

/// Reason a user buffer was rejected by the buffer mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Zero-length range
    Empty,
    /// Range wraps or leaves the caller's addressable space
    OutOfRange,
    /// A page in the range is not mapped
    Unmapped,
    /// Pinning would exceed the platform pin limit
    PinLimit,
    /// Page frame is not aligned to the page size
    Misaligned,
}

impl FaultKind {
    /// Returns a human-readable description of the fault
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Empty => "empty range",
            FaultKind::OutOfRange => "range outside addressable space",
            FaultKind::Unmapped => "unmapped page",
            FaultKind::PinLimit => "pin limit exceeded",
            FaultKind::Misaligned => "misaligned page frame",
        }
    }
}

// =============================================================================
// Engine Error Kinds
// =============================================================================

/// Transfer error reported by the engine's status and error registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineErrorKind {
    /// Bus error while reading the source
    ReadBus,
    /// Bus error while writing the destination
    WriteBus,
    /// Descriptor could not be fetched
    DescriptorFetch,
    /// Descriptor magic field did not match
    MagicMismatch,
    /// Descriptor length field was rejected
    InvalidLength,
    /// Source and destination alignment do not agree
    AlignMismatch,
    /// Error detail code with no known meaning
    Unknown(u32),
}

impl EngineErrorKind {
    /// Returns a human-readable description of the engine error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EngineErrorKind::ReadBus => "read bus error",
            EngineErrorKind::WriteBus => "write bus error",
            EngineErrorKind::DescriptorFetch => "descriptor fetch error",
            EngineErrorKind::MagicMismatch => "descriptor magic mismatch",
            EngineErrorKind::InvalidLength => "invalid descriptor length",
            EngineErrorKind::AlignMismatch => "alignment mismatch",
            EngineErrorKind::Unknown(_) => "unknown engine error",
        }
    }
}

impl core::fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EngineErrorKind::Unknown(code) => write!(f, "unknown engine error {:#x}", code),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Transfer Errors
// =============================================================================

/// Errors resolved on a single transfer
///
/// `Fault` and `TooLarge` are returned synchronously at submission before
/// hardware is touched. `EngineError` and `Timeout` are only returned after
/// the transfer's pages have been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// User range is invalid or could not be pinned
    Fault(FaultKind),
    /// Ring or outstanding-transfer limit is temporarily exhausted
    Busy,
    /// Request needs more descriptors than one submission may carry
    TooLarge,
    /// Hardware reported an error for this transfer
    EngineError(EngineErrorKind),
    /// Transfer was abandoned before hardware completed it
    Timeout,
    /// Channel stopped while the transfer was outstanding
    Fatal,
}

impl core::fmt::Display for TransferError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransferError::Fault(kind) => write!(f, "fault: {}", kind.as_str()),
            TransferError::EngineError(EngineErrorKind::Unknown(code)) => {
                write!(f, "engine error: unknown detail {:#x}", code)
            }
            TransferError::EngineError(kind) => write!(f, "engine error: {}", kind.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

impl TransferError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransferError::Fault(_) => "fault",
            TransferError::Busy => "channel busy",
            TransferError::TooLarge => "transfer too large",
            TransferError::EngineError(_) => "engine error",
            TransferError::Timeout => "transfer timed out",
            TransferError::Fatal => "channel stopped",
        }
    }

    /// Returns true if retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Busy)
    }
}

impl From<FaultKind> for TransferError {
    fn from(kind: FaultKind) -> Self {
        TransferError::Fault(kind)
    }
}

impl From<EngineErrorKind> for TransferError {
    fn from(kind: EngineErrorKind) -> Self {
        TransferError::EngineError(kind)
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// ```ignore
/// match device.submit_and_wait(0, Direction::H2C, buf, 0, &mut delay) {
///     Err(Error::Transfer(TransferError::Timeout)) => { /* ... */ }
///     Err(Error::Config(ConfigError::InvalidChannel)) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// Transfer error
    Transfer(TransferError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Transfer(e) => write!(f, "transfer: {}", e),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Error::Transfer(e)
    }
}

impl From<FaultKind> for Error {
    fn from(kind: FaultKind) -> Self {
        Error::Transfer(TransferError::Fault(kind))
    }
}

/// Result type alias for device operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for transfer operations
pub type TransferResult<T> = core::result::Result<T, TransferError>;

// =============================================================================
// Unit Tests
// =============================================================================
