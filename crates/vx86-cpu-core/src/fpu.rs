//! x87 register stack.
//!
//! The eight physical registers are addressed relative to TOP: `ST(i)` is
//! physical register `(TOP + i) & 7`. Register contents are kept as raw
//! 80-bit images so every bit pattern (NaN payloads, denormals, pseudo-
//! denormals, unnormals) survives untouched until an arithmetic helper looks
//! at it.
//!
//! Stack overflow and underflow are not detected here. The instruction
//! implementations check the tags and raise #MF/#IS themselves.

use core::fmt;

use crate::error::BusError;
use crate::mem::CpuBus;

pub const FPUS_IE: u16 = 1 << 0;
pub const FPUS_DE: u16 = 1 << 1;
pub const FPUS_ZE: u16 = 1 << 2;
pub const FPUS_OE: u16 = 1 << 3;
pub const FPUS_UE: u16 = 1 << 4;
pub const FPUS_PE: u16 = 1 << 5;
pub const FPUS_SF: u16 = 1 << 6;
pub const FPUS_SE: u16 = 1 << 7;
pub const FPUS_B: u16 = 1 << 15;
const FPUS_TOP_SHIFT: u16 = 11;
const FPUS_TOP_MASK: u16 = 0b111 << FPUS_TOP_SHIFT;

/// Exception mask bits of the control word.
pub const FPUC_EM: u16 = 0x3F;
pub const FPUC_DEFAULT: u16 = 0x037F;

pub const RC_MASK: u16 = 0xC00;
pub const RC_NEAR: u16 = 0x000;
pub const RC_DOWN: u16 = 0x400;
pub const RC_UP: u16 = 0x800;
pub const RC_CHOP: u16 = 0xC00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingControl {
    NearestEven,
    Down,
    Up,
    TowardZero,
}

impl RoundingControl {
    pub fn from_fpuc(fpuc: u16) -> Self {
        match fpuc & RC_MASK {
            RC_NEAR => RoundingControl::NearestEven,
            RC_DOWN => RoundingControl::Down,
            RC_UP => RoundingControl::Up,
            _ => RoundingControl::TowardZero,
        }
    }
}

/// 80-bit extended-precision value: 64-bit significand (explicit integer
/// bit) in `low`, sign and 15-bit biased exponent in `high`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Floatx80 {
    pub low: u64,
    pub high: u16,
}

impl fmt::Debug for Floatx80 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Floatx80({:#06x}:{:#018x})", self.high, self.low)
    }
}

impl Floatx80 {
    pub const MAXEXPD: u16 = 0x7FFF;
    pub const EXPBIAS: u16 = 16383;

    pub const fn new(high: u16, low: u64) -> Self {
        Self { low, high }
    }

    /// The 80 significant bits, little-endian, in the low bits of a `u128`.
    pub const fn to_bits(self) -> u128 {
        ((self.high as u128) << 64) | self.low as u128
    }

    /// Inverse of [`Self::to_bits`]; bits above 80 are ignored.
    pub const fn from_bits(bits: u128) -> Self {
        Self {
            low: bits as u64,
            high: (bits >> 64) as u16,
        }
    }

    #[inline]
    pub const fn exponent(self) -> u16 {
        self.high & Self::MAXEXPD
    }

    #[inline]
    pub const fn sign(self) -> bool {
        self.high & 0x8000 != 0
    }

    #[inline]
    pub const fn mantissa(self) -> u64 {
        self.low
    }

    /// Same sign and significand, exponent replaced by the bias (value scaled
    /// into [1, 2) for normals). Used by FXTRACT-style helpers.
    pub const fn with_biased_exponent(self) -> Self {
        Self {
            low: self.low,
            high: (self.high & !Self::MAXEXPD) | Self::EXPBIAS,
        }
    }
}

/// Per-register validity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FpTag {
    Valid,
    #[default]
    Empty,
}

#[derive(Clone)]
pub struct FpuStack {
    regs: [Floatx80; 8],
    tags: [FpTag; 8],
    top: u8,
    /// Status word without the TOP field; see [`Self::status_word`].
    fpus: u16,
    pub fpuc: u16,
    /// Scratch operand for memory-source arithmetic.
    pub ft0: Floatx80,
}

impl fmt::Debug for FpuStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FpuStack")
            .field("top", &self.top)
            .field("fpuc", &format_args!("{:#06x}", self.fpuc))
            .field("fpus", &format_args!("{:#06x}", self.status_word()))
            .field("tags", &format_args!("{:#04x}", self.tag_word()))
            .finish()
    }
}

impl Default for FpuStack {
    fn default() -> Self {
        Self {
            regs: [Floatx80::default(); 8],
            tags: [FpTag::Empty; 8],
            top: 0,
            fpus: 0,
            fpuc: FPUC_DEFAULT,
            ft0: Floatx80::default(),
        }
    }
}

impl FpuStack {
    /// FNINIT. Register contents are left as they were.
    pub fn reset(&mut self) {
        self.tags = [FpTag::Empty; 8];
        self.top = 0;
        self.fpus = 0;
        self.fpuc = FPUC_DEFAULT;
    }

    #[inline]
    pub fn top(&self) -> u8 {
        self.top
    }

    #[inline]
    fn phys(&self, st: u8) -> usize {
        (self.top.wrapping_add(st) & 7) as usize
    }

    /// Allocate a new ST(0). The caller writes the value afterwards.
    #[inline]
    pub fn push(&mut self) {
        self.top = self.top.wrapping_sub(1) & 7;
        self.tags[self.top as usize] = FpTag::Valid;
    }

    /// Release ST(0).
    #[inline]
    pub fn pop(&mut self) {
        self.tags[self.top as usize] = FpTag::Empty;
        self.top = self.top.wrapping_add(1) & 7;
    }

    /// Contents of ST(`st`), regardless of its tag.
    #[inline]
    pub fn st(&self, st: u8) -> Floatx80 {
        self.regs[self.phys(st)]
    }

    #[inline]
    pub fn set_st(&mut self, st: u8, v: Floatx80) {
        let phys = self.phys(st);
        self.regs[phys] = v;
    }

    /// Tag of ST(`st`).
    #[inline]
    pub fn st_tag(&self, st: u8) -> FpTag {
        self.tags[self.phys(st)]
    }

    /// Tag of physical register `phys` (`0..8`).
    #[inline]
    pub fn tag(&self, phys: usize) -> FpTag {
        self.tags[phys & 7]
    }

    /// FFREE.
    pub fn free(&mut self, st: u8) {
        let phys = self.phys(st);
        self.tags[phys] = FpTag::Empty;
    }

    /// FNSTSW: status word with TOP in bits 11..=13.
    pub fn status_word(&self) -> u16 {
        (self.fpus & !FPUS_TOP_MASK) | ((self.top as u16) << FPUS_TOP_SHIFT)
    }

    /// FLDENV/FRSTOR side: TOP is taken from the image.
    pub fn set_status_word(&mut self, fsw: u16) {
        self.top = ((fsw & FPUS_TOP_MASK) >> FPUS_TOP_SHIFT) as u8;
        self.fpus = fsw & !FPUS_TOP_MASK;
    }

    /// Raise exception flags in the status word, updating SE/B from the
    /// control word's masks.
    pub fn set_exception(&mut self, flags: u16) {
        self.fpus |= flags & (FPUC_EM | FPUS_SF);
        if self.fpus & !self.fpuc & FPUC_EM != 0 {
            self.fpus |= FPUS_SE | FPUS_B;
        }
    }

    /// FNCLEX.
    pub fn clear_exceptions(&mut self) {
        self.fpus &= !(FPUC_EM | FPUS_SF | FPUS_SE | FPUS_B);
    }

    pub fn rounding_control(&self) -> RoundingControl {
        RoundingControl::from_fpuc(self.fpuc)
    }

    /// Abridged (FXSAVE) tag byte: bit `i` set when physical register `i`
    /// holds a value.
    pub fn tag_word(&self) -> u8 {
        self.tags
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, tag)| match tag {
                FpTag::Valid => acc | (1 << i),
                FpTag::Empty => acc,
            })
    }

    pub fn set_tag_word(&mut self, ftw: u8) {
        for (i, tag) in self.tags.iter_mut().enumerate() {
            *tag = if ftw & (1 << i) != 0 {
                FpTag::Valid
            } else {
                FpTag::Empty
            };
        }
    }
}

/// FLD m80: significand word at `addr`, sign/exponent word at `addr + 8`.
pub fn load_f80<B: CpuBus>(bus: &mut B, addr: u64) -> Result<Floatx80, BusError> {
    let low = bus.read_u64(addr)?;
    let high = bus.read_u16(addr.wrapping_add(8))?;
    Ok(Floatx80 { low, high })
}

/// FSTP m80. No normalization; the exact register image is written.
pub fn store_f80<B: CpuBus>(bus: &mut B, value: Floatx80, addr: u64) -> Result<(), BusError> {
    bus.write_u64(addr, value.low)?;
    bus.write_u16(addr.wrapping_add(8), value.high)
}
