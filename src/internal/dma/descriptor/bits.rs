//! Descriptor bit field constants.

#![allow(dead_code)]

// =============================================================================
// Control Word
// =============================================================================

/// Descriptor control word bit field constants
pub mod control {
    /// Last descriptor of a transfer chain
    pub const STOP: u32 = 1 << 0;
    /// Signal completion (and count toward interrupt coalescing) when consumed
    pub const COMPLETED: u32 = 1 << 1;
    /// `next` field holds a valid descriptor address
    pub const LINK: u32 = 1 << 2;
    /// End of packet for streaming targets
    pub const EOP: u32 = 1 << 4;
    /// Flags carried by the last descriptor of a chain
    pub const CHAIN_END: u32 = STOP | COMPLETED | EOP;
    /// All flag bits
    pub const FLAGS_MASK: u32 = STOP | COMPLETED | LINK | EOP;

    /// Magic field shift
    pub const MAGIC_SHIFT: u32 = 16;
    /// Magic field mask
    pub const MAGIC_MASK: u32 = 0xFFFF << 16;
    /// Magic value the engine requires in every descriptor
    pub const MAGIC: u32 = 0xAD4B;
    /// Magic pre-shifted into position
    pub const MAGIC_WORD: u32 = MAGIC << MAGIC_SHIFT;
}

// =============================================================================
// Length Word
// =============================================================================

/// Descriptor length word bit field constants
pub mod length {
    /// Byte count mask (28 bits)
    pub const MASK: u32 = 0x0FFF_FFFF;
}
