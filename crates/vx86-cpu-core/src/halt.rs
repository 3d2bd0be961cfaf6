//! HLT wake-up logic.

use crate::interrupts::InterruptRequest;
use crate::state::CpuState;

/// Answer of [`CpuState::check_halted`] to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Execute instructions on this CPU.
    Running,
    /// Nothing to do; skip this CPU for the current scheduling step.
    Halted,
}

impl CpuState {
    /// Enter the halted state (HLT retired).
    pub fn halt(&mut self) {
        self.halted = true;
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Whether a pending event would end a HLT: a maskable interrupt with
    /// IF set, or NMI, INIT or SIPI regardless of IF.
    #[inline]
    pub fn has_work(&self) -> bool {
        let pending = self.irq.pending();
        (pending.contains(InterruptRequest::HARD) && self.interrupts_enabled())
            || pending.intersects(InterruptRequest::UNMASKED_WAKE)
    }

    /// Polled once per scheduling step. Wakes the CPU if it has work.
    #[inline]
    pub fn check_halted(&mut self) -> RunState {
        if !self.halted {
            return RunState::Running;
        }
        if self.has_work() {
            self.halted = false;
            tracing::trace!(cpu = self.index, pending = ?self.irq.pending(), "woke from HLT");
            return RunState::Running;
        }
        RunState::Halted
    }
}
