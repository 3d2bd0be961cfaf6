#![cfg(not(target_arch = "wasm32"))]

use proptest::prelude::*;
use vx86_cpu_core::lazy_flags::{LazyFlags, Width};
use vx86_cpu_core::state::{
    EFLAGS_AC, EFLAGS_CC_MASK, EFLAGS_DF, EFLAGS_ID, EFLAGS_IF, EFLAGS_IOPL, EFLAGS_NT,
    EFLAGS_RESERVED1, EFLAGS_TF,
};
use vx86_cpu_core::{CcOp, CpuState};

/// Bits that `restore_eflags` always loads from its value.
const ALWAYS_LOADED: u32 = EFLAGS_CC_MASK | EFLAGS_DF;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 2048,
        .. ProptestConfig::default()
    })]

    #[test]
    fn restore_then_materialize_respects_mask(prior: u32, value: u32, mask: u32) {
        let mut cpu = CpuState::new();
        cpu.restore_eflags(prior, u32::MAX);
        let before = cpu.eflags();

        cpu.restore_eflags(value, mask);
        prop_assert_eq!(cpu.cc().op, CcOp::Direct);
        let after = cpu.eflags();

        let loaded = mask | ALWAYS_LOADED;
        prop_assert_eq!(after & loaded & !EFLAGS_RESERVED1, value & loaded & !EFLAGS_RESERVED1);
        prop_assert_eq!(after & !loaded & !EFLAGS_RESERVED1, before & !loaded & !EFLAGS_RESERVED1);
        prop_assert_ne!(after & EFLAGS_RESERVED1, 0);
    }

    #[test]
    fn restore_discards_pending_lazy_record(a: u64, b: u64, value: u32) {
        let mut cpu = CpuState::new();
        cpu.set_cc(LazyFlags::add(Width::Quad, a, b));
        cpu.restore_eflags(value, 0);
        prop_assert_eq!(cpu.eflags() & EFLAGS_CC_MASK, value & EFLAGS_CC_MASK);
    }

    #[test]
    fn base_word_never_holds_lazy_bits(value: u32, mask: u32) {
        let mut cpu = CpuState::new();
        cpu.restore_eflags(value, mask);
        prop_assert_eq!(cpu.eflags_base() & ALWAYS_LOADED, 0);
        prop_assert_ne!(cpu.eflags_base() & EFLAGS_RESERVED1, 0);
    }
}

#[test]
fn popf_style_update_at_cpl3() {
    // CPL3 with IOPL0: IF and IOPL are not writable by POPF.
    let popf_mask = EFLAGS_TF | EFLAGS_AC | EFLAGS_ID | EFLAGS_NT;

    let mut cpu = CpuState::new();
    cpu.set_interrupts_enabled(true);
    cpu.restore_eflags(EFLAGS_TF | EFLAGS_IOPL | EFLAGS_DF, popf_mask);

    let flags = cpu.eflags();
    assert_ne!(flags & EFLAGS_IF, 0, "IF must survive");
    assert_eq!(flags & EFLAGS_IOPL, 0, "IOPL must not change");
    assert_ne!(flags & EFLAGS_TF, 0);
    assert_eq!(cpu.direction(), -1);
}

#[test]
fn reserved_bit_one_is_forced() {
    let mut cpu = CpuState::new();
    cpu.restore_eflags(0, u32::MAX);
    assert_eq!(cpu.eflags(), EFLAGS_RESERVED1);
}
