//! Packing and unpacking of the architectural EFLAGS word.
//!
//! Inside the CPU state EFLAGS is split three ways: the arithmetic flags live
//! in the lazy condition-code record, DF is kept as a `±1` step, and
//! everything else sits in the base word.

use crate::lazy_flags::LazyFlags;
use crate::state::{CpuState, EFLAGS_CC_MASK, EFLAGS_DF, EFLAGS_IF, EFLAGS_RESERVED1};

impl CpuState {
    /// Materialize the full EFLAGS value (PUSHF, interrupt entry, ...).
    #[inline]
    pub fn eflags(&self) -> u32 {
        // -1 as u32 has every bit set, +1 has DF clear.
        self.eflags | self.cc.compute_all() | (self.df as u32 & EFLAGS_DF)
    }

    /// Load EFLAGS from `value` (POPF, IRET, task switch, ...).
    ///
    /// The arithmetic flags and DF always come from `value`. All other bits
    /// are only taken from `value` where `update_mask` is set; the rest keep
    /// their current state. Bit 1 reads as one no matter what. The
    /// condition-code record is left in the `Direct` state, so the next read
    /// sees exactly the restored flags.
    #[inline]
    pub fn restore_eflags(&mut self, value: u32, update_mask: u32) {
        self.cc = LazyFlags::direct(value);
        self.df = 1 - 2 * ((value >> 10) & 1) as i32;
        let mask = update_mask & !(EFLAGS_CC_MASK | EFLAGS_DF);
        self.eflags = (self.eflags & !mask) | (value & mask) | EFLAGS_RESERVED1;
    }

    /// Collapse the pending lazy record into `Direct` form.
    pub fn materialize_cc(&mut self) {
        self.cc = LazyFlags::direct(self.cc.compute_all());
    }

    /// Base EFLAGS bits (no arithmetic flags, no DF).
    #[inline]
    pub fn eflags_base(&self) -> u32 {
        self.eflags
    }

    #[inline]
    pub fn interrupts_enabled(&self) -> bool {
        self.eflags & EFLAGS_IF != 0
    }

    /// CLI/STI. Interrupt shadows are the execution engine's business.
    pub fn set_interrupts_enabled(&mut self, enabled: bool) {
        if enabled {
            self.eflags |= EFLAGS_IF;
        } else {
            self.eflags &= !EFLAGS_IF;
        }
    }

    /// Element step for string instructions: `+1` or `-1`.
    #[inline]
    pub fn direction(&self) -> i64 {
        self.df as i64
    }

    /// CLD (`false`) / STD (`true`).
    pub fn set_direction(&mut self, df: bool) {
        self.df = if df { -1 } else { 1 };
    }

    /// Signed address delta for a string element of `size` bytes.
    #[inline]
    pub fn string_step(&self, size: u64) -> u64 {
        size.wrapping_mul(self.df as i64 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy_flags::{CcOp, Width};
    use crate::state::{EFLAGS_CF, EFLAGS_OF, EFLAGS_TF, EFLAGS_ZF};

    #[test]
    fn pending_arithmetic_flags_are_merged_on_read() {
        let mut cpu = CpuState::new();
        cpu.set_interrupts_enabled(true);
        cpu.set_cc(LazyFlags::sub(Width::Long, 5, 5));
        let flags = cpu.eflags();
        assert_ne!(flags & EFLAGS_ZF, 0);
        assert_ne!(flags & EFLAGS_IF, 0);
        assert_ne!(flags & EFLAGS_RESERVED1, 0);
        assert_eq!(flags & EFLAGS_DF, 0);
    }

    #[test]
    fn direction_round_trips_through_eflags() {
        let mut cpu = CpuState::new();
        cpu.set_direction(true);
        assert_eq!(cpu.direction(), -1);
        assert_ne!(cpu.eflags() & EFLAGS_DF, 0);
        assert_eq!(cpu.string_step(4), 4u64.wrapping_neg());

        cpu.restore_eflags(0, 0);
        assert_eq!(cpu.direction(), 1);
        assert_eq!(cpu.string_step(4), 4);
    }

    #[test]
    fn restore_leaves_direct_tag() {
        let mut cpu = CpuState::new();
        cpu.set_cc(LazyFlags::add(Width::Byte, 0xFF, 1));
        cpu.restore_eflags(EFLAGS_OF | EFLAGS_TF, 0);
        assert_eq!(cpu.cc().op, CcOp::Direct);
        assert_eq!(cpu.eflags(), EFLAGS_OF | EFLAGS_RESERVED1);
    }

    #[test]
    fn restore_masks_control_bits_only() {
        let mut cpu = CpuState::new();
        cpu.restore_eflags(EFLAGS_IF | EFLAGS_TF, u32::MAX);
        cpu.restore_eflags(EFLAGS_CF, EFLAGS_TF);
        // TF dropped by the masked update, IF kept, CF loaded unconditionally.
        assert_eq!(cpu.eflags(), EFLAGS_IF | EFLAGS_CF | EFLAGS_RESERVED1);
    }

    #[test]
    fn materialize_cc_is_transparent() {
        let mut cpu = CpuState::new();
        cpu.set_cc(LazyFlags::inc(Width::Word, 0x7FFF, true));
        let before = cpu.eflags();
        cpu.materialize_cc();
        assert_eq!(cpu.cc().op, CcOp::Direct);
        assert_eq!(cpu.eflags(), before);
    }
}
