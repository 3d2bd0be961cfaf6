//! Pending asynchronous event lines of one vCPU.
//!
//! This is the only piece of per-CPU state that other threads touch. Timers,
//! device models and other vCPUs raise lines through a shared
//! `Arc<InterruptLines>`; the owning vCPU thread tests and clears them.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Interrupt-request bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptRequest: u32 {
        /// Maskable external interrupt (gated by EFLAGS.IF).
        const HARD = 1 << 1;
        /// Translated code must be left and the block cache flushed.
        const EXITTB = 1 << 2;
        /// Request to enter the halted state from outside the vCPU thread.
        const HALT = 1 << 5;
        const DEBUG = 1 << 7;
        const RESET = 1 << 10;
        const SMI = 1 << 11;
        const NMI = 1 << 12;
        const INIT = 1 << 13;
        /// Startup IPI.
        const SIPI = 1 << 14;
        const MCE = 1 << 15;
        /// Virtual interrupt injected by a nested hypervisor.
        const VIRQ = 1 << 16;
    }
}

impl InterruptRequest {
    /// Lines that end a HLT regardless of EFLAGS.IF.
    pub const UNMASKED_WAKE: Self = Self::NMI.union(Self::INIT).union(Self::SIPI);
}

#[derive(Debug, Default)]
pub struct InterruptLines {
    bits: AtomicU32,
    /// Index of the owning vCPU, for log records only.
    cpu: AtomicU32,
}

impl InterruptLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines of vCPU `index`.
    pub fn for_cpu(index: u32) -> Self {
        Self {
            bits: AtomicU32::new(0),
            cpu: AtomicU32::new(index),
        }
    }

    /// Index of the owning vCPU.
    #[inline]
    pub fn cpu(&self) -> u32 {
        self.cpu.load(Ordering::Relaxed)
    }

    /// Retag the lines after the owning vCPU was reset with a new index.
    pub(crate) fn set_cpu(&self, index: u32) {
        self.cpu.store(index, Ordering::Relaxed);
    }

    /// Assert `lines`. Safe to call from any thread.
    pub fn raise(&self, lines: InterruptRequest) {
        let prev = self.bits.fetch_or(lines.bits(), Ordering::AcqRel);
        tracing::trace!(
            cpu = self.cpu(),
            lines = ?lines,
            prev = ?InterruptRequest::from_bits_retain(prev),
            "interrupt lines raised"
        );
    }

    /// Deassert `lines`. Returns the lines that were set before the call.
    pub fn clear(&self, lines: InterruptRequest) -> InterruptRequest {
        let prev = self.bits.fetch_and(!lines.bits(), Ordering::AcqRel);
        InterruptRequest::from_bits_retain(prev)
    }

    #[inline]
    pub fn pending(&self) -> InterruptRequest {
        InterruptRequest::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_raised(&self, lines: InterruptRequest) -> bool {
        self.pending().intersects(lines)
    }
}
