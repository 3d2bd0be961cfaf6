//! EFER and the mode flags cached from it.

use bitflags::bitflags;

use crate::state::CpuState;

pub const MSR_EFER: u32 = 0xC000_0080;

pub const EFER_SCE: u64 = 1 << 0;
pub const EFER_LME: u64 = 1 << 8;
pub const EFER_LMA: u64 = 1 << 10;
pub const EFER_NXE: u64 = 1 << 11;
pub const EFER_SVME: u64 = 1 << 12;
pub const EFER_FFXSR: u64 = 1 << 14;

bitflags! {
    /// Hidden mode flags tested by translated code instead of re-decoding
    /// control registers and MSRs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HFlags: u32 {
        const CPL_MASK = 0b11;
        const CS32 = 1 << 4;
        const SS32 = 1 << 5;
        /// Long mode active (EFER.LMA).
        const LMA = 1 << 14;
        const CS64 = 1 << 15;
        /// SVM instructions enabled (EFER.SVME).
        const SVME = 1 << 21;
    }
}

impl HFlags {
    /// Flags owned by [`CpuState::load_efer`].
    pub const EFER_DERIVED: Self = Self::LMA.union(Self::SVME);
}

impl CpuState {
    /// WRMSR(EFER) side of the state core: store `value` verbatim and
    /// recompute `LMA`/`SVME` from it. Other hidden flags are left alone.
    ///
    /// Consistency checks against CPUID (e.g. setting SVME on a CPU that
    /// does not advertise SVM) belong to the MSR write handler.
    pub fn load_efer(&mut self, value: u64) {
        self.efer = value;
        self.hflags.remove(HFlags::EFER_DERIVED);
        if value & EFER_LMA != 0 {
            self.hflags.insert(HFlags::LMA);
        }
        if value & EFER_SVME != 0 {
            self.hflags.insert(HFlags::SVME);
        }
        tracing::trace!(cpu = self.index, efer = value, hflags = ?self.hflags, "EFER loaded");
    }

    pub fn efer(&self) -> u64 {
        self.efer
    }

    pub fn hflags(&self) -> HFlags {
        self.hflags
    }

    /// Update hidden flags not derived from EFER (CPL, segment sizes).
    /// EFER-derived bits in `flags` are ignored.
    pub fn set_segment_hflags(&mut self, flags: HFlags) {
        let keep = self.hflags & HFlags::EFER_DERIVED;
        self.hflags = (flags - HFlags::EFER_DERIVED) | keep;
    }

    #[inline]
    pub fn long_mode_active(&self) -> bool {
        self.hflags.contains(HFlags::LMA)
    }

    #[inline]
    pub fn svm_enabled(&self) -> bool {
        self.hflags.contains(HFlags::SVME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lma_and_svme_follow_their_bits() {
        let mut cpu = CpuState::new();
        cpu.load_efer(EFER_LME | EFER_LMA | EFER_SCE);
        assert!(cpu.long_mode_active());
        assert!(!cpu.svm_enabled());
        assert_eq!(cpu.efer(), EFER_LME | EFER_LMA | EFER_SCE);

        cpu.load_efer(EFER_SVME);
        assert!(!cpu.long_mode_active());
        assert!(cpu.svm_enabled());
    }

    #[test]
    fn lme_alone_does_not_activate_long_mode() {
        let mut cpu = CpuState::new();
        cpu.load_efer(EFER_LME);
        assert!(!cpu.long_mode_active());
    }

    #[test]
    fn unrelated_hflags_survive_efer_loads() {
        let mut cpu = CpuState::new();
        cpu.set_segment_hflags(HFlags::CS32 | HFlags::SS32 | HFlags::LMA);
        // LMA in the segment update is ignored.
        assert!(!cpu.long_mode_active());

        cpu.load_efer(EFER_LMA);
        cpu.load_efer(0);
        assert_eq!(cpu.hflags(), HFlags::CS32 | HFlags::SS32);
    }
}
