//! General-purpose registers and the local register mirror used by hot code.
//!
//! Translated blocks work on a [`RegisterMirror`]: a local copy of the
//! registers selected at compile time. On block entry the bound registers are
//! copied in from [`CpuState`] ([`RegisterMirror::env_to_regs`]) and on exit
//! (or before anything that inspects `CpuState` directly, such as an
//! exception) they are copied back ([`RegisterMirror::regs_to_env`]).
//! Unbound registers are always accessed in `CpuState`.

use bitflags::bitflags;

use crate::state::CpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    pub const ALL: [Gpr; 16] = [
        Gpr::Rax,
        Gpr::Rcx,
        Gpr::Rdx,
        Gpr::Rbx,
        Gpr::Rsp,
        Gpr::Rbp,
        Gpr::Rsi,
        Gpr::Rdi,
        Gpr::R8,
        Gpr::R9,
        Gpr::R10,
        Gpr::R11,
        Gpr::R12,
        Gpr::R13,
        Gpr::R14,
        Gpr::R15,
    ];

    #[inline]
    pub const fn set(self) -> GprSet {
        GprSet::from_bits_retain(1 << self as u8)
    }
}

bitflags! {
    /// A set of general-purpose registers, one bit per [`Gpr`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GprSet: u16 {
        const RAX = 1 << 0;
        const RCX = 1 << 1;
        const RDX = 1 << 2;
        const RBX = 1 << 3;
        const RSP = 1 << 4;
        const RBP = 1 << 5;
        const RSI = 1 << 6;
        const RDI = 1 << 7;
        const R8 = 1 << 8;
        const R9 = 1 << 9;
        const R10 = 1 << 10;
        const R11 = 1 << 11;
        const R12 = 1 << 12;
        const R13 = 1 << 13;
        const R14 = 1 << 14;
        const R15 = 1 << 15;
    }
}

impl GprSet {
    pub const LEGACY: Self = Self::from_bits_retain(0x00FF);

    /// Registers worth binding on the build host: the ones the host has
    /// spare callee-saved registers for.
    pub const fn host_default() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::RAX.union(Self::RCX).union(Self::RDX).union(Self::RSP)
        } else if cfg!(target_arch = "aarch64") {
            Self::LEGACY
        } else if cfg!(target_arch = "x86") {
            Self::RAX
        } else {
            Self::empty()
        }
    }
}

/// Local working set of the registers in `BOUND` (a [`GprSet`] bit pattern).
///
/// `BOUND` is a const parameter so that each sync step folds into either one
/// load/store or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMirror<const BOUND: u16> {
    local: [u64; 16],
}

/// Mirror with the binding set of the build host.
pub type HostRegisterMirror = RegisterMirror<{ GprSet::host_default().bits() }>;

impl<const BOUND: u16> Default for RegisterMirror<BOUND> {
    fn default() -> Self {
        Self { local: [0; 16] }
    }
}

impl<const BOUND: u16> RegisterMirror<BOUND> {
    pub const BINDINGS: GprSet = GprSet::from_bits_retain(BOUND);

    #[inline]
    pub const fn is_bound(reg: Gpr) -> bool {
        BOUND & (1 << reg as u8) != 0
    }

    /// Mirror loaded from `env`.
    pub fn from_env(env: &CpuState) -> Self {
        let mut mirror = Self::default();
        mirror.env_to_regs(env);
        mirror
    }

    /// Copy every bound register from `env` into the mirror.
    #[inline]
    pub fn env_to_regs(&mut self, env: &CpuState) {
        for reg in Gpr::ALL {
            if Self::is_bound(reg) {
                self.local[reg as usize] = env.gpr[reg as usize];
            }
        }
    }

    /// Copy every bound register from the mirror back into `env`.
    #[inline]
    pub fn regs_to_env(&self, env: &mut CpuState) {
        for reg in Gpr::ALL {
            if Self::is_bound(reg) {
                env.gpr[reg as usize] = self.local[reg as usize];
            }
        }
    }

    /// Read `reg` wherever it currently lives.
    #[inline]
    pub fn read(&self, env: &CpuState, reg: Gpr) -> u64 {
        if Self::is_bound(reg) {
            self.local[reg as usize]
        } else {
            env.gpr[reg as usize]
        }
    }

    #[inline]
    pub fn write(&mut self, env: &mut CpuState, reg: Gpr, val: u64) {
        if Self::is_bound(reg) {
            self.local[reg as usize] = val;
        } else {
            env.gpr[reg as usize] = val;
        }
    }
}
