//! Engine register definitions
//!
//! Each DMA channel owns one register block inside the device BAR. All
//! access goes through [`Hardware`](crate::hal::Hardware) so the pipeline
//! never dereferences device memory itself.

pub mod engine;

// =============================================================================
// Register Access Macros
// =============================================================================

/// Generate read/write accessor methods for a register.
///
/// # Example
/// ```ignore
/// impl<H: Hardware + ?Sized> EngineRegs<'_, H> {
///     reg_rw!(control, set_control, CONTROL_OFFSET, "Control register");
/// }
/// ```
macro_rules! reg_rw {
    ($read_fn:ident, $write_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.hw.read_reg(self.base + $offset)
        }

        #[doc = concat!("Write ", $doc)]
        #[inline(always)]
        pub fn $write_fn(&self, value: u32) {
            self.hw.write_reg(self.base + $offset, value);
        }
    };
}

/// Generate read-only accessor method for a register.
macro_rules! reg_ro {
    ($read_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.hw.read_reg(self.base + $offset)
        }
    };
}

/// Generate write-only accessor method for a register.
macro_rules! reg_wo {
    ($write_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Write ", $doc)]
        #[inline(always)]
        pub fn $write_fn(&self, value: u32) {
            self.hw.write_reg(self.base + $offset, value);
        }
    };
}

/// Generate set/clear bit methods over a read/write register.
macro_rules! reg_bit_ops {
    ($set_fn:ident, $clear_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Set bits in ", $doc)]
        #[inline(always)]
        pub fn $set_fn(&self, bits: u32) {
            let value = self.hw.read_reg(self.base + $offset);
            self.hw.write_reg(self.base + $offset, value | bits);
        }

        #[doc = concat!("Clear bits in ", $doc)]
        #[inline(always)]
        pub fn $clear_fn(&self, bits: u32) {
            let value = self.hw.read_reg(self.base + $offset);
            self.hw.write_reg(self.base + $offset, value & !bits);
        }
    };
}

pub(crate) use reg_bit_ops;
pub(crate) use reg_ro;
pub(crate) use reg_rw;
pub(crate) use reg_wo;
