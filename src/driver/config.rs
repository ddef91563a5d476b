//! Configuration types for the DMA transfer pipeline

use alloc::vec::Vec;

use super::error::{ConfigError, ConfigResult};
use crate::internal::constants::{
    DEFAULT_FLUSH_POLL_ATTEMPTS, DEFAULT_IRQ_COALESCE, DEFAULT_MAX_DESCRIPTOR_LEN,
    DEFAULT_MAX_DESCRIPTORS_PER_TRANSFER, DEFAULT_MAX_OUTSTANDING, DEFAULT_POLL_INTERVAL_US,
    DEFAULT_RING_DEPTH, DEFAULT_TIMEOUT_MS, DESCRIPTOR_LEN_LIMIT, MIN_RING_DEPTH,
};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to card: the engine reads host memory
    #[default]
    H2C,
    /// Card to host: the engine writes host memory
    C2H,
}

impl Direction {
    /// Whether the device writes into host pages for this direction
    #[inline(always)]
    #[must_use]
    pub const fn writes_host(self) -> bool {
        matches!(self, Direction::C2H)
    }

    /// Returns a short name for the direction
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::H2C => "h2c",
            Direction::C2H => "c2h",
        }
    }
}

/// Channel lifecycle state
///
/// `Idle -> Active -> Idle` while transfers come and go, `any -> Draining`
/// on teardown, `Draining -> Stopped` once every transfer is resolved and
/// every pinned region released. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// No in-flight transfers, ring empty
    #[default]
    Idle,
    /// At least one transfer in flight
    Active,
    /// Teardown requested, new submissions rejected
    Draining,
    /// Ring and pinned regions released
    Stopped,
}

impl ChannelState {
    /// Check whether moving to `next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: ChannelState) -> bool {
        matches!(
            (self, next),
            (ChannelState::Idle, ChannelState::Active)
                | (ChannelState::Active, ChannelState::Active | ChannelState::Idle)
                | (
                    ChannelState::Idle | ChannelState::Active | ChannelState::Draining,
                    ChannelState::Draining
                )
                | (ChannelState::Draining, ChannelState::Stopped)
        )
    }

    /// Whether new submissions are accepted
    #[inline(always)]
    #[must_use]
    pub const fn accepts_submissions(self) -> bool {
        matches!(self, ChannelState::Idle | ChannelState::Active)
    }

    /// Returns a short name for the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Active => "active",
            ChannelState::Draining => "draining",
            ChannelState::Stopped => "stopped",
        }
    }
}

/// How waiters learn about completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CompletionMode {
    /// Engine interrupts drive the dispatcher
    #[default]
    Interrupt,
    /// Engine interrupts stay disabled; waiters run the dispatcher themselves
    Polled,
}

/// Limits and timing shared by every channel of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// Descriptors per ring (power of two, one slot kept free)
    pub ring_depth: usize,
    /// Maximum bytes carried by one descriptor
    pub max_descriptor_len: u32,
    /// Maximum descriptors in one submission
    pub max_descriptors_per_transfer: usize,
    /// Maximum in-flight transfers per channel
    pub max_outstanding: usize,
    /// Completion-flagged descriptors per interrupt
    pub irq_coalesce: u32,
    /// Completion waiting strategy
    pub completion_mode: CompletionMode,
    /// Deadline for blocking waits in milliseconds
    pub timeout_ms: u32,
    /// Interval between completion checks in microseconds
    pub poll_interval_us: u32,
    /// Status reads allowed while waiting for a stopped engine to go idle
    pub flush_poll_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring_depth: DEFAULT_RING_DEPTH,
            max_descriptor_len: DEFAULT_MAX_DESCRIPTOR_LEN,
            max_descriptors_per_transfer: DEFAULT_MAX_DESCRIPTORS_PER_TRANSFER,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
            irq_coalesce: DEFAULT_IRQ_COALESCE,
            completion_mode: CompletionMode::Interrupt,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            flush_poll_attempts: DEFAULT_FLUSH_POLL_ATTEMPTS,
        }
    }

    /// Set the ring depth
    #[must_use]
    pub const fn with_ring_depth(mut self, depth: usize) -> Self {
        self.ring_depth = depth;
        self
    }

    /// Set the maximum bytes per descriptor
    #[must_use]
    pub const fn with_max_descriptor_len(mut self, len: u32) -> Self {
        self.max_descriptor_len = len;
        self
    }

    /// Set the maximum descriptors per submission
    #[must_use]
    pub const fn with_max_descriptors_per_transfer(mut self, count: usize) -> Self {
        self.max_descriptors_per_transfer = count;
        self
    }

    /// Set the maximum in-flight transfers per channel
    #[must_use]
    pub const fn with_max_outstanding(mut self, count: usize) -> Self {
        self.max_outstanding = count;
        self
    }

    /// Set the interrupt coalescing threshold
    #[must_use]
    pub const fn with_irq_coalesce(mut self, threshold: u32) -> Self {
        self.irq_coalesce = threshold;
        self
    }

    /// Set the completion waiting strategy
    #[must_use]
    pub const fn with_completion_mode(mut self, mode: CompletionMode) -> Self {
        self.completion_mode = mode;
        self
    }

    /// Set the blocking wait deadline
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the completion check interval
    #[must_use]
    pub const fn with_poll_interval_us(mut self, interval_us: u32) -> Self {
        self.poll_interval_us = interval_us;
        self
    }

    /// Set the engine flush budget
    #[must_use]
    pub const fn with_flush_poll_attempts(mut self, attempts: u32) -> Self {
        self.flush_poll_attempts = attempts;
        self
    }

    /// Timeout expressed in poll intervals (at least one)
    #[must_use]
    pub const fn timeout_polls(&self) -> u64 {
        let total_us = self.timeout_ms as u64 * 1000;
        let polls = total_us / self.poll_interval_us as u64;
        if polls == 0 { 1 } else { polls }
    }

    /// Check the limits for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        validate_ring_depth(self.ring_depth)?;
        if self.max_descriptor_len == 0 || self.max_descriptor_len > DESCRIPTOR_LEN_LIMIT {
            return Err(ConfigError::InvalidConfig);
        }
        if self.max_descriptors_per_transfer == 0
            || self.max_descriptors_per_transfer > self.ring_depth - 1
        {
            return Err(ConfigError::InvalidConfig);
        }
        if self.max_outstanding == 0 || self.irq_coalesce == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        if self.timeout_ms == 0 || self.poll_interval_us == 0 {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }
}

fn validate_ring_depth(depth: usize) -> ConfigResult<()> {
    if depth < MIN_RING_DEPTH || !depth.is_power_of_two() {
        return Err(ConfigError::InvalidConfig);
    }
    Ok(())
}

/// Per-channel wiring supplied by the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Transfer direction of the engine
    pub direction: Direction,
    /// Offset of the engine register block inside the BAR
    pub register_base: usize,
    /// Interrupt vector raised by the engine
    pub irq_vector: u32,
    /// Ring depth override for this channel
    pub ring_depth: Option<usize>,
}

impl ChannelConfig {
    /// Create a channel description
    #[must_use]
    pub const fn new(direction: Direction, register_base: usize, irq_vector: u32) -> Self {
        Self {
            direction,
            register_base,
            irq_vector,
            ring_depth: None,
        }
    }

    /// Override the device-wide ring depth
    #[must_use]
    pub const fn with_ring_depth(mut self, depth: usize) -> Self {
        self.ring_depth = Some(depth);
        self
    }

    /// Ring depth after applying the override
    #[must_use]
    pub const fn effective_ring_depth(&self, engine: &EngineConfig) -> usize {
        match self.ring_depth {
            Some(depth) => depth,
            None => engine.ring_depth,
        }
    }
}

/// Everything needed to attach a device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Device-wide limits
    pub engine: EngineConfig,
    /// Channels in index order
    pub channels: Vec<ChannelConfig>,
}

impl DeviceConfig {
    /// Create a configuration with no channels
    #[must_use]
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            channels: Vec::new(),
        }
    }

    /// Append a channel
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    /// Check limits and channel wiring
    pub fn validate(&self) -> ConfigResult<()> {
        self.engine.validate()?;
        if self.channels.is_empty() {
            return Err(ConfigError::InvalidConfig);
        }
        for (i, channel) in self.channels.iter().enumerate() {
            let depth = channel.effective_ring_depth(&self.engine);
            validate_ring_depth(depth)?;
            if self.engine.max_descriptors_per_transfer > depth - 1 {
                return Err(ConfigError::InvalidConfig);
            }
            if self.channels[..i]
                .iter()
                .any(|other| other.register_base == channel.register_base)
            {
                return Err(ConfigError::AlreadyAttached);
            }
        }
        Ok(())
    }
}
