#![forbid(unsafe_code)]

//! Architectural state of one virtual x86 CPU for a translating emulator.
//!
//! [`CpuState`] holds the register file, the deferred condition codes, the
//! x87 register stack, EFLAGS, EFER-derived mode flags, the interrupt-request
//! lines and the halted flag. Everything here is called from the instruction
//! execution path, so all operations are O(1), never allocate and never fail;
//! the only `Result`s come from the guest memory bus.
//!
//! Decoding, code generation, paging, devices, exception delivery and the run
//! loop live elsewhere and drive this state through the methods below.

pub mod config;
pub mod eflags;
pub mod error;
pub mod fpu;
pub mod halt;
pub mod interrupts;
pub mod lazy_flags;
pub mod mem;
pub mod msr;
pub mod regs;
pub mod state;

pub use config::CpuConfig;
pub use error::BusError;
pub use fpu::{load_f80, store_f80, Floatx80, FpTag, FpuStack};
pub use halt::RunState;
pub use interrupts::{InterruptLines, InterruptRequest};
pub use lazy_flags::{CcOp, LazyFlags, Width};
pub use mem::CpuBus;
pub use msr::HFlags;
pub use regs::{Gpr, GprSet, HostRegisterMirror, RegisterMirror};
pub use state::CpuState;
