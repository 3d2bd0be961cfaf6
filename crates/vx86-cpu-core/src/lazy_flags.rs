//! Deferred arithmetic flag evaluation.
//!
//! ALU instructions do not compute EFLAGS. They record which operation ran
//! ([`CcOp`]) together with two raw words (`src`, `dst`), and the six
//! arithmetic flags are only derived when something reads them. Most results
//! are overwritten before any flag is consumed, so this keeps the common path
//! to two stores.
//!
//! `dst` is always the operation's result truncated to the operand width. The
//! meaning of `src` depends on the tag:
//!
//! | op               | `src`                                   |
//! |------------------|-----------------------------------------|
//! | `Add`/`Adc`      | second operand                          |
//! | `Sub`/`Sbb`      | second operand                          |
//! | `Logic`          | unused                                  |
//! | `Inc`/`Dec`      | CF before the instruction (`0` or `CF`) |
//! | `Shl`            | value shifted left by `count - 1`       |
//! | `Sar`            | value shifted right by `count - 1`      |
//! | `Mul`            | non-zero iff the result overflowed      |
//! | `Direct`         | already materialized flag bits          |
//!
//! The first operand is reconstructed from `dst` and `src` when needed.

use crate::state::{
    EFLAGS_AF, EFLAGS_CC_MASK, EFLAGS_CF, EFLAGS_OF, EFLAGS_PF, EFLAGS_SF, EFLAGS_ZF,
};

/// Operand width of the recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Long,
    Quad,
}

impl Width {
    pub const ALL: [Width; 4] = [Width::Byte, Width::Word, Width::Long, Width::Quad];

    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Long => 32,
            Width::Quad => 64,
        }
    }

    #[inline]
    pub const fn mask(self) -> u64 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => 0xFFFF_FFFF,
            Width::Quad => u64::MAX,
        }
    }

    #[inline]
    pub const fn sign_bit(self) -> u64 {
        1u64 << (self.bits() - 1)
    }

    /// Shift/rotate count as the CPU sees it, or `None` if it masks to zero.
    #[inline]
    pub const fn mask_shift_count(self, count: u32) -> Option<u32> {
        let count = match self {
            Width::Quad => count & 0x3F,
            _ => count & 0x1F,
        };
        if count == 0 {
            None
        } else {
            Some(count)
        }
    }
}

/// Condition-code opcode tag.
///
/// Every arithmetic variant carries its operand width since the carry,
/// overflow and sign rules all depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CcOp {
    /// Flags are already materialized in `src`.
    Direct,
    Mul(Width),
    Add(Width),
    /// Add with an incoming carry of 1.
    Adc(Width),
    Sub(Width),
    /// Subtract with an incoming borrow of 1.
    Sbb(Width),
    Logic(Width),
    Inc(Width),
    Dec(Width),
    Shl(Width),
    /// Arithmetic and logical right shifts share one tag.
    Sar(Width),
}

impl CcOp {
    pub fn width(self) -> Option<Width> {
        match self {
            CcOp::Direct => None,
            CcOp::Mul(w)
            | CcOp::Add(w)
            | CcOp::Adc(w)
            | CcOp::Sub(w)
            | CcOp::Sbb(w)
            | CcOp::Logic(w)
            | CcOp::Inc(w)
            | CcOp::Dec(w)
            | CcOp::Shl(w)
            | CcOp::Sar(w) => Some(w),
        }
    }
}

/// Tag plus raw operands of the last flag-setting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyFlags {
    pub op: CcOp,
    pub src: u64,
    pub dst: u64,
}

impl Default for LazyFlags {
    fn default() -> Self {
        Self::direct(0)
    }
}

#[inline]
fn parity8(x: u8) -> bool {
    x.count_ones() % 2 == 0
}

/// ZF, SF and PF of a width-truncated result.
#[inline]
fn result_flags(dst: u64, w: Width) -> u32 {
    let mut flags = 0;
    if dst == 0 {
        flags |= EFLAGS_ZF;
    }
    if dst & w.sign_bit() != 0 {
        flags |= EFLAGS_SF;
    }
    if parity8(dst as u8) {
        flags |= EFLAGS_PF;
    }
    flags
}

#[inline]
fn bit(cond: bool, flag: u32) -> u32 {
    if cond {
        flag
    } else {
        0
    }
}

impl LazyFlags {
    #[inline]
    pub const fn new(op: CcOp, src: u64, dst: u64) -> Self {
        Self { op, src, dst }
    }

    /// Already-computed flags. Bits outside the arithmetic flag set are dropped.
    #[inline]
    pub const fn direct(flags: u32) -> Self {
        Self {
            op: CcOp::Direct,
            src: (flags & EFLAGS_CC_MASK) as u64,
            dst: 0,
        }
    }

    /// Width-truncated result of the recorded operation.
    #[inline]
    pub fn result(&self) -> u64 {
        match self.op.width() {
            Some(w) => self.dst & w.mask(),
            None => self.dst,
        }
    }

    pub fn add(w: Width, lhs: u64, rhs: u64) -> Self {
        let m = w.mask();
        Self::new(CcOp::Add(w), rhs & m, lhs.wrapping_add(rhs) & m)
    }

    /// ADC. A clear carry-in degrades to a plain `Add` record.
    pub fn adc(w: Width, lhs: u64, rhs: u64, carry_in: bool) -> Self {
        if !carry_in {
            return Self::add(w, lhs, rhs);
        }
        let m = w.mask();
        let dst = lhs.wrapping_add(rhs).wrapping_add(1) & m;
        Self::new(CcOp::Adc(w), rhs & m, dst)
    }

    pub fn sub(w: Width, lhs: u64, rhs: u64) -> Self {
        let m = w.mask();
        Self::new(CcOp::Sub(w), rhs & m, lhs.wrapping_sub(rhs) & m)
    }

    /// SBB. A clear borrow-in degrades to a plain `Sub` record.
    pub fn sbb(w: Width, lhs: u64, rhs: u64, borrow_in: bool) -> Self {
        if !borrow_in {
            return Self::sub(w, lhs, rhs);
        }
        let m = w.mask();
        let dst = lhs.wrapping_sub(rhs).wrapping_sub(1) & m;
        Self::new(CcOp::Sbb(w), rhs & m, dst)
    }

    pub fn logic(w: Width, result: u64) -> Self {
        Self::new(CcOp::Logic(w), 0, result & w.mask())
    }

    /// INC leaves CF alone, so the previous carry rides along in `src`.
    pub fn inc(w: Width, value: u64, prev_cf: bool) -> Self {
        let dst = value.wrapping_add(1) & w.mask();
        Self::new(CcOp::Inc(w), bit(prev_cf, EFLAGS_CF) as u64, dst)
    }

    pub fn dec(w: Width, value: u64, prev_cf: bool) -> Self {
        let dst = value.wrapping_sub(1) & w.mask();
        Self::new(CcOp::Dec(w), bit(prev_cf, EFLAGS_CF) as u64, dst)
    }

    /// SHL/SAL by the raw `count` operand. The count is masked the way the
    /// instruction masks it (6 bits for 64-bit operands, 5 otherwise), so
    /// byte and word counts may exceed the operand width. Returns `None` when
    /// the masked count is zero: flags stay untouched and nothing is recorded.
    pub fn shl(w: Width, value: u64, count: u32) -> Option<Self> {
        let count = w.mask_shift_count(count)?;
        let m = w.mask();
        let value = value & m;
        let src = (value << (count - 1)) & m;
        Some(Self::new(CcOp::Shl(w), src, (value << count) & m))
    }

    /// SHR; see [`Self::shl`] for the count rules.
    pub fn shr(w: Width, value: u64, count: u32) -> Option<Self> {
        let count = w.mask_shift_count(count)?;
        let value = value & w.mask();
        Some(Self::new(CcOp::Sar(w), value >> (count - 1), value >> count))
    }

    /// SAR; see [`Self::shl`] for the count rules.
    pub fn sar(w: Width, value: u64, count: u32) -> Option<Self> {
        let count = w.mask_shift_count(count)?;
        let m = w.mask();
        let signed = sign_extend(value & m, w);
        let src = (signed >> (count - 1)) as u64 & m;
        let dst = (signed >> count) as u64 & m;
        Some(Self::new(CcOp::Sar(w), src, dst))
    }

    /// Unsigned MUL. Returns the record and the high half of the product.
    pub fn mul(w: Width, lhs: u64, rhs: u64) -> (Self, u64) {
        let m = w.mask();
        let full = (lhs & m) as u128 * (rhs & m) as u128;
        let lo = full as u64 & m;
        let hi = (full >> w.bits()) as u64 & m;
        (Self::new(CcOp::Mul(w), hi, lo), hi)
    }

    /// Signed IMUL. Returns the record and the high half of the product.
    pub fn imul(w: Width, lhs: u64, rhs: u64) -> (Self, u64) {
        let m = w.mask();
        let full = sign_extend(lhs, w) as i128 * sign_extend(rhs, w) as i128;
        let lo = full as u64 & m;
        let hi = (full >> w.bits()) as u64 & m;
        let overflow = full != sign_extend(lo, w) as i128;
        (Self::new(CcOp::Mul(w), overflow as u64, lo), hi)
    }

    /// Materialize CF|PF|AF|ZF|SF|OF.
    pub fn compute_all(&self) -> u32 {
        let (w, src, dst) = match self.op.width() {
            Some(w) => (w, self.src & w.mask(), self.dst & w.mask()),
            None => return self.src as u32 & EFLAGS_CC_MASK,
        };
        let m = w.mask();
        let sign = w.sign_bit();

        let (cf, af, of) = match self.op {
            CcOp::Direct => return self.src as u32 & EFLAGS_CC_MASK,
            CcOp::Add(_) | CcOp::Adc(_) => {
                let src1 = if matches!(self.op, CcOp::Adc(_)) {
                    dst.wrapping_sub(src).wrapping_sub(1) & m
                } else {
                    dst.wrapping_sub(src) & m
                };
                let cf = if matches!(self.op, CcOp::Adc(_)) {
                    dst <= src1
                } else {
                    dst < src1
                };
                let af = (dst ^ src1 ^ src) & 0x10 != 0;
                let of = (!(src1 ^ src) & (src1 ^ dst)) & sign != 0;
                (cf, af, of)
            }
            CcOp::Sub(_) | CcOp::Sbb(_) => {
                let src1 = if matches!(self.op, CcOp::Sbb(_)) {
                    dst.wrapping_add(src).wrapping_add(1) & m
                } else {
                    dst.wrapping_add(src) & m
                };
                let cf = if matches!(self.op, CcOp::Sbb(_)) {
                    src1 <= src
                } else {
                    src1 < src
                };
                let af = (dst ^ src1 ^ src) & 0x10 != 0;
                let of = ((src1 ^ src) & (src1 ^ dst)) & sign != 0;
                (cf, af, of)
            }
            CcOp::Logic(_) => (false, false, false),
            CcOp::Inc(_) => {
                let src1 = dst.wrapping_sub(1) & m;
                let af = (dst ^ src1 ^ 1) & 0x10 != 0;
                (src != 0, af, dst == sign)
            }
            CcOp::Dec(_) => {
                let src1 = dst.wrapping_add(1) & m;
                let af = (dst ^ src1 ^ 1) & 0x10 != 0;
                (src != 0, af, dst == sign - 1)
            }
            CcOp::Shl(_) => (src & sign != 0, false, (src ^ dst) & sign != 0),
            CcOp::Sar(_) => (src & 1 != 0, false, (src ^ dst) & sign != 0),
            CcOp::Mul(_) => (src != 0, false, src != 0),
        };

        result_flags(dst, w)
            | bit(cf, EFLAGS_CF)
            | bit(af, EFLAGS_AF)
            | bit(of, EFLAGS_OF)
    }

    /// Carry flag only. Cheaper than [`Self::compute_all`] for ADC/SBB/JC/SETC.
    pub fn compute_c(&self) -> bool {
        let w = match self.op.width() {
            Some(w) => w,
            None => return self.src as u32 & EFLAGS_CF != 0,
        };
        let m = w.mask();
        let src = self.src & m;
        let dst = self.dst & m;
        match self.op {
            CcOp::Direct => self.src as u32 & EFLAGS_CF != 0,
            CcOp::Add(_) => dst < (dst.wrapping_sub(src) & m),
            CcOp::Adc(_) => dst <= (dst.wrapping_sub(src).wrapping_sub(1) & m),
            CcOp::Sub(_) => (dst.wrapping_add(src) & m) < src,
            CcOp::Sbb(_) => (dst.wrapping_add(src).wrapping_add(1) & m) <= src,
            CcOp::Logic(_) => false,
            CcOp::Inc(_) | CcOp::Dec(_) | CcOp::Mul(_) => src != 0,
            CcOp::Shl(_) => src & w.sign_bit() != 0,
            CcOp::Sar(_) => src & 1 != 0,
        }
    }
}

#[inline]
fn sign_extend(value: u64, w: Width) -> i64 {
    let shift = 64 - w.bits();
    ((value << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_drops_non_arithmetic_bits() {
        let lf = LazyFlags::direct(0xFFFF_FFFF);
        assert_eq!(lf.compute_all(), EFLAGS_CC_MASK);
        assert!(lf.compute_c());
    }

    #[test]
    fn add_byte_wraps_to_zero() {
        let lf = LazyFlags::add(Width::Byte, 0xFF, 0x01);
        assert_eq!(lf.result(), 0);
        assert_eq!(
            lf.compute_all(),
            EFLAGS_CF | EFLAGS_ZF | EFLAGS_PF | EFLAGS_AF
        );
    }

    #[test]
    fn add_signed_overflow_sets_of_and_sf() {
        let lf = LazyFlags::add(Width::Long, 0x7FFF_FFFF, 1);
        let flags = lf.compute_all();
        assert_ne!(flags & EFLAGS_OF, 0);
        assert_ne!(flags & EFLAGS_SF, 0);
        assert_eq!(flags & EFLAGS_CF, 0);
    }

    #[test]
    fn sub_borrow_sets_cf() {
        let lf = LazyFlags::sub(Width::Word, 1, 2);
        assert_eq!(lf.result(), 0xFFFF);
        assert!(lf.compute_c());
        assert_ne!(lf.compute_all() & EFLAGS_SF, 0);
    }

    #[test]
    fn adc_with_carry_out_of_all_ones() {
        // 0xFFFF + 0xFFFF + 1 = 0x1FFFF: CF set, result all ones.
        let lf = LazyFlags::adc(Width::Word, 0xFFFF, 0xFFFF, true);
        assert_eq!(lf.op, CcOp::Adc(Width::Word));
        assert_eq!(lf.result(), 0xFFFF);
        assert!(lf.compute_c());
    }

    #[test]
    fn adc_without_carry_records_plain_add() {
        let lf = LazyFlags::adc(Width::Byte, 1, 2, false);
        assert_eq!(lf.op, CcOp::Add(Width::Byte));
    }

    #[test]
    fn inc_preserves_previous_carry() {
        let lf = LazyFlags::inc(Width::Byte, 0x7F, true);
        let flags = lf.compute_all();
        assert_ne!(flags & EFLAGS_CF, 0);
        assert_ne!(flags & EFLAGS_OF, 0);
        assert_ne!(flags & EFLAGS_AF, 0);

        let lf = LazyFlags::inc(Width::Byte, 0xFF, false);
        assert_eq!(lf.compute_all() & EFLAGS_CF, 0);
        assert_ne!(lf.compute_all() & EFLAGS_ZF, 0);
    }

    #[test]
    fn dec_overflow_at_signed_minimum() {
        let lf = LazyFlags::dec(Width::Quad, 0x8000_0000_0000_0000, false);
        assert_eq!(lf.result(), 0x7FFF_FFFF_FFFF_FFFF);
        assert_ne!(lf.compute_all() & EFLAGS_OF, 0);
    }

    #[test]
    fn shl_by_one_of_is_msb_xor_cf() {
        let lf = LazyFlags::shl(Width::Byte, 0x40, 1).unwrap();
        // result 0x80, CF 0 -> OF 1
        assert_eq!(lf.result(), 0x80);
        let flags = lf.compute_all();
        assert_eq!(flags & EFLAGS_CF, 0);
        assert_ne!(flags & EFLAGS_OF, 0);
    }

    #[test]
    fn shr_by_one_of_is_original_msb() {
        let lf = LazyFlags::shr(Width::Word, 0x8001, 1).unwrap();
        assert_eq!(lf.result(), 0x4000);
        let flags = lf.compute_all();
        assert_ne!(flags & EFLAGS_CF, 0);
        assert_ne!(flags & EFLAGS_OF, 0);
    }

    #[test]
    fn sar_keeps_sign_and_clears_of() {
        let lf = LazyFlags::sar(Width::Byte, 0x81, 1).unwrap();
        assert_eq!(lf.result(), 0xC0);
        let flags = lf.compute_all();
        assert_ne!(flags & EFLAGS_CF, 0);
        assert_eq!(flags & EFLAGS_OF, 0);
        assert_ne!(flags & EFLAGS_SF, 0);
    }

    #[test]
    fn shift_counts_mask_like_the_instruction() {
        assert_eq!(LazyFlags::shl(Width::Long, 1, 0), None);
        assert_eq!(LazyFlags::shr(Width::Long, 1, 32), None);
        assert_eq!(LazyFlags::sar(Width::Byte, 0x80, 0x20), None);
        assert!(LazyFlags::shl(Width::Quad, 1, 32).is_some());

        // 33 masks to 1 for a 32-bit operand.
        assert_eq!(
            LazyFlags::shl(Width::Long, 0x4000_0000, 33),
            LazyFlags::shl(Width::Long, 0x4000_0000, 1)
        );
    }

    #[test]
    fn byte_shift_past_operand_width() {
        // shl al, 8: everything shifted out, CF is the old bit 0.
        let lf = LazyFlags::shl(Width::Byte, 0x01, 8).unwrap();
        assert_eq!(lf.result(), 0);
        assert!(lf.compute_c());

        // shr al, 9 and sar al, 9 on 0x80.
        let lf = LazyFlags::shr(Width::Byte, 0x80, 9).unwrap();
        assert_eq!(lf.result(), 0);
        assert!(!lf.compute_c());
        let lf = LazyFlags::sar(Width::Byte, 0x80, 9).unwrap();
        assert_eq!(lf.result(), 0xFF);
        assert!(lf.compute_c());
    }

    #[test]
    fn mul_high_half_sets_cf_and_of() {
        let (lf, hi) = LazyFlags::mul(Width::Byte, 0x10, 0x10);
        assert_eq!(hi, 1);
        assert_eq!(lf.result(), 0);
        assert_eq!(lf.compute_all() & (EFLAGS_CF | EFLAGS_OF), EFLAGS_CF | EFLAGS_OF);

        let (lf, _) = LazyFlags::imul(Width::Byte, 0xFF, 0xFF); // -1 * -1
        assert_eq!(lf.result(), 1);
        assert_eq!(lf.compute_all() & (EFLAGS_CF | EFLAGS_OF), 0);
    }

    #[test]
    fn logic_clears_cf_of_af() {
        let lf = LazyFlags::logic(Width::Long, 0x8000_0003);
        assert_eq!(lf.compute_all(), EFLAGS_SF | EFLAGS_PF);
    }
}
