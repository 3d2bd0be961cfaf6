use std::sync::Arc;

use crate::config::CpuConfig;
use crate::fpu::FpuStack;
use crate::interrupts::InterruptLines;
use crate::lazy_flags::LazyFlags;
use crate::msr::HFlags;
use crate::regs::Gpr;

pub const EFLAGS_CF: u32 = 1 << 0;
pub const EFLAGS_RESERVED1: u32 = 1 << 1;
pub const EFLAGS_PF: u32 = 1 << 2;
pub const EFLAGS_AF: u32 = 1 << 4;
pub const EFLAGS_ZF: u32 = 1 << 6;
pub const EFLAGS_SF: u32 = 1 << 7;
pub const EFLAGS_TF: u32 = 1 << 8;
pub const EFLAGS_IF: u32 = 1 << 9;
pub const EFLAGS_DF: u32 = 1 << 10;
pub const EFLAGS_OF: u32 = 1 << 11;
pub const EFLAGS_IOPL: u32 = 0b11 << 12;
pub const EFLAGS_NT: u32 = 1 << 14;
pub const EFLAGS_RF: u32 = 1 << 16;
pub const EFLAGS_VM: u32 = 1 << 17;
pub const EFLAGS_AC: u32 = 1 << 18;
pub const EFLAGS_VIF: u32 = 1 << 19;
pub const EFLAGS_VIP: u32 = 1 << 20;
pub const EFLAGS_ID: u32 = 1 << 21;

/// Flags owned by the lazy condition-code engine.
pub const EFLAGS_CC_MASK: u32 =
    EFLAGS_CF | EFLAGS_PF | EFLAGS_AF | EFLAGS_ZF | EFLAGS_SF | EFLAGS_OF;

/// Architectural state of one virtual CPU.
///
/// A `CpuState` belongs to the thread running its instruction stream and is
/// only mutated through `&mut self`. The interrupt-request lines are the one
/// exception; see [`CpuState::irq_handle`].
#[derive(Debug)]
pub struct CpuState {
    pub gpr: [u64; 16],
    pub rip: u64,
    /// +1 when EFLAGS.DF is clear, -1 when set. String instructions multiply
    /// their element size by this.
    pub(crate) df: i32,
    pub(crate) cc: LazyFlags,
    /// EFLAGS without the arithmetic flags and DF.
    pub(crate) eflags: u32,
    pub fpu: FpuStack,
    pub(crate) efer: u64,
    pub(crate) hflags: HFlags,
    pub(crate) irq: Arc<InterruptLines>,
    pub(crate) halted: bool,
    pub(crate) index: u32,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuState {
    pub fn new() -> Self {
        Self::with_config(&CpuConfig::default())
    }

    pub fn with_config(config: &CpuConfig) -> Self {
        let mut cpu = Self {
            gpr: [0; 16],
            rip: 0,
            df: 1,
            cc: LazyFlags::default(),
            eflags: EFLAGS_RESERVED1,
            fpu: FpuStack::default(),
            efer: 0,
            hflags: HFlags::empty(),
            irq: Arc::new(InterruptLines::for_cpu(config.index)),
            halted: false,
            index: config.index,
        };
        cpu.load_efer(config.efer);
        cpu
    }

    /// Put the CPU back into its power-on state. Pending interrupt lines are
    /// kept: they belong to whoever raised them, and the handle given out by
    /// [`Self::irq_handle`] stays valid.
    pub fn reset(&mut self, config: &CpuConfig) {
        self.gpr = [0; 16];
        self.rip = 0;
        self.df = 1;
        self.cc = LazyFlags::default();
        self.eflags = EFLAGS_RESERVED1;
        self.fpu.reset();
        self.hflags = HFlags::empty();
        self.halted = false;
        self.index = config.index;
        self.irq.set_cpu(config.index);
        self.load_efer(config.efer);
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn gpr(&self, reg: Gpr) -> u64 {
        self.gpr[reg as usize]
    }

    #[inline]
    pub fn set_gpr(&mut self, reg: Gpr, val: u64) {
        self.gpr[reg as usize] = val;
    }

    /// Current deferred-flags record.
    #[inline]
    pub fn cc(&self) -> LazyFlags {
        self.cc
    }

    /// Record the last flag-setting operation.
    #[inline]
    pub fn set_cc(&mut self, cc: LazyFlags) {
        self.cc = cc;
    }

    /// Shared handle to this CPU's interrupt-request lines, for timers,
    /// devices and other vCPUs.
    pub fn irq_handle(&self) -> Arc<InterruptLines> {
        Arc::clone(&self.irq)
    }

    #[inline]
    pub fn irq(&self) -> &InterruptLines {
        &self.irq
    }
}
