//! Per-channel engine register block
//!
//! Offsets are relative to the channel's register base inside the BAR.

use super::{reg_bit_ops, reg_ro, reg_rw, reg_wo};
use crate::hal::Hardware;
use crate::internal::constants::ENGINE_IDENTIFIER_SHIFT;

// =============================================================================
// Register Offsets
// =============================================================================

/// Engine identifier (read-only)
pub const IDENTIFIER_OFFSET: usize = 0x00;
/// Engine control
pub const CONTROL_OFFSET: usize = 0x04;
/// Engine status (write 1 to clear)
pub const STATUS_OFFSET: usize = 0x40;
/// Free-running count of consumed descriptors
pub const COMPLETED_COUNT_OFFSET: usize = 0x48;
/// Cause code of the last engine error
pub const ERROR_DETAIL_OFFSET: usize = 0x4C;
/// Bus address of the failing descriptor, low word
pub const ERROR_ADDR_LO_OFFSET: usize = 0x50;
/// Bus address of the failing descriptor, high word
pub const ERROR_ADDR_HI_OFFSET: usize = 0x54;
/// Descriptor ring bus address, low word
pub const DESC_BASE_LO_OFFSET: usize = 0x80;
/// Descriptor ring bus address, high word
pub const DESC_BASE_HI_OFFSET: usize = 0x84;
/// Number of descriptors in the ring
pub const RING_SIZE_OFFSET: usize = 0x88;
/// Free-running producer index
pub const DOORBELL_OFFSET: usize = 0x8C;
/// Completion-flagged descriptors per interrupt
pub const IRQ_COALESCE_OFFSET: usize = 0x90;

/// Size of one channel register block
pub const ENGINE_BLOCK_SIZE: usize = 0x100;

// =============================================================================
// Identifier Bits
// =============================================================================

/// IDENTIFIER register bits
pub mod identifier {
    /// Subsystem identifier field mask (bits 31..20)
    pub const SUBSYSTEM_MASK: u32 = 0xFFF << 20;
    /// Engine moves card-to-host
    pub const C2H: u32 = 1 << 15;
    /// Engine version field mask (bits 7..0)
    pub const VERSION_MASK: u32 = 0xFF;
}

// =============================================================================
// Control Bits
// =============================================================================

/// CONTROL register bits
pub mod control {
    /// Engine fetches descriptors while set
    pub const RUN: u32 = 1 << 0;
    /// Interrupt on completion-flagged descriptors
    pub const IE_DESC_COMPLETED: u32 = 1 << 2;
    /// Interrupt on alignment mismatch
    pub const IE_ALIGN_MISMATCH: u32 = 1 << 3;
    /// Interrupt on magic mismatch
    pub const IE_MAGIC_STOPPED: u32 = 1 << 4;
    /// Interrupt on invalid length
    pub const IE_INVALID_LENGTH: u32 = 1 << 5;
    /// Interrupt on idle stop
    pub const IE_IDLE_STOPPED: u32 = 1 << 6;
    /// All error interrupt enables
    pub const IE_ERRORS: u32 =
        IE_ALIGN_MISMATCH | IE_MAGIC_STOPPED | IE_INVALID_LENGTH | IE_IDLE_STOPPED;
    /// Every interrupt enable
    pub const IE_ALL: u32 = IE_DESC_COMPLETED | IE_ERRORS;
}

// =============================================================================
// Status Bits
// =============================================================================

/// STATUS register bits
pub mod status {
    /// Engine is fetching or moving data
    pub const BUSY: u32 = 1 << 0;
    /// Engine reached a stop-flagged descriptor
    pub const DESC_STOPPED: u32 = 1 << 1;
    /// A completion-flagged descriptor finished
    pub const DESC_COMPLETED: u32 = 1 << 2;
    /// Source and destination alignment disagree
    pub const ALIGN_MISMATCH: u32 = 1 << 3;
    /// Descriptor magic field invalid
    pub const MAGIC_STOPPED: u32 = 1 << 4;
    /// Descriptor length field invalid
    pub const INVALID_LENGTH: u32 = 1 << 5;
    /// Engine stopped while idle
    pub const IDLE_STOPPED: u32 = 1 << 6;
    /// Bus error on the read side
    pub const READ_ERROR: u32 = 1 << 9;
    /// Bus error on the write side
    pub const WRITE_ERROR: u32 = 1 << 10;
    /// Descriptor fetch failed
    pub const DESC_ERROR: u32 = 1 << 19;

    /// Bits that halt the engine
    pub const ERROR_MASK: u32 =
        ALIGN_MISMATCH | MAGIC_STOPPED | INVALID_LENGTH | READ_ERROR | WRITE_ERROR | DESC_ERROR;
    /// Bits cleared on acknowledge (everything but BUSY)
    pub const W1C_MASK: u32 = ERROR_MASK | DESC_STOPPED | DESC_COMPLETED | IDLE_STOPPED;
}

// =============================================================================
// Error Detail Codes
// =============================================================================

/// ERROR_DETAIL cause codes
pub mod error_detail {
    /// No error recorded
    pub const NONE: u32 = 0;
    /// Source read failed
    pub const READ_BUS: u32 = 1;
    /// Destination write failed
    pub const WRITE_BUS: u32 = 2;
    /// Descriptor fetch failed
    pub const DESCRIPTOR_FETCH: u32 = 3;
    /// Magic mismatch
    pub const MAGIC: u32 = 4;
    /// Length rejected
    pub const LENGTH: u32 = 5;
    /// Alignment mismatch
    pub const ALIGN: u32 = 6;
}

// =============================================================================
// Engine Register Block
// =============================================================================

/// Accessor for one channel's register block
pub struct EngineRegs<'a, H: Hardware + ?Sized> {
    hw: &'a H,
    base: usize,
}

impl<'a, H: Hardware + ?Sized> EngineRegs<'a, H> {
    /// Bind the register block at `base`
    #[inline(always)]
    pub fn new(hw: &'a H, base: usize) -> Self {
        Self { hw, base }
    }

    reg_ro!(identifier, IDENTIFIER_OFFSET, "engine identifier register");
    reg_rw!(control, set_control, CONTROL_OFFSET, "control register");
    reg_bit_ops!(set_control_bits, clear_control_bits, CONTROL_OFFSET, "control register");
    reg_rw!(status, write_status, STATUS_OFFSET, "status register");
    reg_ro!(completed_count, COMPLETED_COUNT_OFFSET, "completed descriptor count register");
    reg_ro!(error_detail, ERROR_DETAIL_OFFSET, "error detail register");
    reg_ro!(error_addr_lo, ERROR_ADDR_LO_OFFSET, "error address register (low)");
    reg_ro!(error_addr_hi, ERROR_ADDR_HI_OFFSET, "error address register (high)");
    reg_wo!(set_desc_base_lo, DESC_BASE_LO_OFFSET, "descriptor base register (low)");
    reg_wo!(set_desc_base_hi, DESC_BASE_HI_OFFSET, "descriptor base register (high)");
    reg_wo!(set_ring_size, RING_SIZE_OFFSET, "ring size register");
    reg_wo!(set_doorbell, DOORBELL_OFFSET, "doorbell register");
    reg_wo!(set_irq_coalesce, IRQ_COALESCE_OFFSET, "interrupt coalescing register");

    /// Subsystem identifier field
    pub fn subsystem_id(&self) -> u32 {
        (self.identifier() & identifier::SUBSYSTEM_MASK) >> ENGINE_IDENTIFIER_SHIFT
    }

    /// Whether the identifier describes a card-to-host engine
    pub fn is_c2h(&self) -> bool {
        self.identifier() & identifier::C2H != 0
    }

    /// Program the ring location and size, leaving the engine stopped
    pub fn program_ring(&self, bus_addr: u64, depth: u32, coalesce: u32) {
        self.set_control(0);
        self.set_desc_base_lo(bus_addr as u32);
        self.set_desc_base_hi((bus_addr >> 32) as u32);
        self.set_ring_size(depth);
        self.set_irq_coalesce(coalesce);
    }

    /// Start fetching descriptors
    pub fn start(&self, interrupts: bool) {
        let ie = if interrupts { control::IE_ALL } else { 0 };
        self.set_control(control::RUN | ie);
    }

    /// Stop fetching descriptors, keeping the interrupt enables
    pub fn stop(&self) {
        self.clear_control_bits(control::RUN);
    }

    /// Check whether the engine is running
    pub fn is_running(&self) -> bool {
        self.control() & control::RUN != 0
    }

    /// Check whether the engine is still moving data
    pub fn is_busy(&self) -> bool {
        self.status() & status::BUSY != 0
    }

    /// Acknowledge status bits (write 1 to clear)
    pub fn ack_status(&self, bits: u32) {
        self.write_status(bits & status::W1C_MASK);
    }

    /// Publish a new producer index to the engine
    pub fn ring_doorbell(&self, producer: u32) {
        self.set_doorbell(producer);
    }

    /// Bus address of the descriptor that failed
    pub fn error_address(&self) -> u64 {
        (u64::from(self.error_addr_hi()) << 32) | u64::from(self.error_addr_lo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHardware;
    use crate::driver::config::Direction;

    #[test]
    fn error_mask_excludes_busy() {
        assert_eq!(status::ERROR_MASK & status::BUSY, 0);
        assert_eq!(status::W1C_MASK & status::BUSY, 0);
    }

    #[test]
    fn identifier_reports_direction() {
        let hw = MockHardware::new(4096);
        hw.add_engine(0x0000, Direction::H2C, 0);
        hw.add_engine(0x1000, Direction::C2H, 1);

        let h2c = EngineRegs::new(&hw, 0x0000);
        let c2h = EngineRegs::new(&hw, 0x1000);

        assert_eq!(h2c.subsystem_id(), 0x1FC);
        assert!(!h2c.is_c2h());
        assert!(c2h.is_c2h());
    }

    #[test]
    fn program_ring_writes_address_words() {
        let hw = MockHardware::new(4096);
        hw.add_engine(0x0000, Direction::H2C, 0);
        let regs = EngineRegs::new(&hw, 0x0000);

        regs.program_ring(0x1234_5678_9ABC_D000, 16, 2);

        assert_eq!(hw.register(DESC_BASE_LO_OFFSET), 0x9ABC_D000);
        assert_eq!(hw.register(DESC_BASE_HI_OFFSET), 0x1234_5678);
        assert_eq!(hw.register(RING_SIZE_OFFSET), 16);
        assert_eq!(hw.register(IRQ_COALESCE_OFFSET), 2);
        assert!(!regs.is_running());
    }

    #[test]
    fn start_and_stop_toggle_run() {
        let hw = MockHardware::new(4096);
        hw.add_engine(0x0000, Direction::H2C, 0);
        let regs = EngineRegs::new(&hw, 0x0000);

        regs.start(true);
        assert!(regs.is_running());
        assert_ne!(regs.control() & control::IE_DESC_COMPLETED, 0);

        regs.stop();
        assert!(!regs.is_running());
        assert_ne!(regs.control() & control::IE_DESC_COMPLETED, 0);
    }
}
