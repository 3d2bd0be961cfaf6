use crate::error::BusError;

/// Guest memory as seen by the state core.
///
/// Only the byte accessors are required. The wider accessors default to
/// little-endian compositions of byte accesses; buses with a faster path (a
/// TLB hit, a contiguous host mapping) should override them.
pub trait CpuBus {
    fn read_u8(&mut self, vaddr: u64) -> Result<u8, BusError>;
    fn write_u8(&mut self, vaddr: u64, val: u8) -> Result<(), BusError>;

    fn read_u16(&mut self, vaddr: u64) -> Result<u16, BusError> {
        let lo = self.read_u8(vaddr)? as u16;
        let hi = self.read_u8(vaddr.wrapping_add(1))? as u16;
        Ok(lo | (hi << 8))
    }

    fn read_u64(&mut self, vaddr: u64) -> Result<u64, BusError> {
        let mut v = 0u64;
        for i in 0..8 {
            v |= (self.read_u8(vaddr.wrapping_add(i))? as u64) << (i * 8);
        }
        Ok(v)
    }

    fn write_u16(&mut self, vaddr: u64, val: u16) -> Result<(), BusError> {
        self.write_u8(vaddr, (val & 0xFF) as u8)?;
        self.write_u8(vaddr.wrapping_add(1), (val >> 8) as u8)?;
        Ok(())
    }

    fn write_u64(&mut self, vaddr: u64, val: u64) -> Result<(), BusError> {
        for i in 0..8 {
            self.write_u8(vaddr.wrapping_add(i), (val >> (i * 8)) as u8)?;
        }
        Ok(())
    }
}

/// Identity-mapped memory bus used by tests and benches.
#[derive(Debug, Clone)]
pub struct FlatTestBus {
    mem: Vec<u8>,
}

impl FlatTestBus {
    pub fn new(size: usize) -> Self {
        Self { mem: vec![0; size] }
    }

    /// Copy a guest image (code, an m80 operand, ...) to `addr`. Panics if
    /// it does not fit.
    pub fn load(&mut self, addr: u64, image: &[u8]) {
        let start = addr as usize;
        self.mem[start..start + image.len()].copy_from_slice(image);
    }

    pub fn slice(&self, addr: u64, len: usize) -> &[u8] {
        let start = addr as usize;
        let end = start + len;
        &self.mem[start..end]
    }
}

impl CpuBus for FlatTestBus {
    fn read_u8(&mut self, vaddr: u64) -> Result<u8, BusError> {
        usize::try_from(vaddr)
            .ok()
            .and_then(|idx| self.mem.get(idx))
            .copied()
            .ok_or(BusError::Unmapped { addr: vaddr })
    }

    fn write_u8(&mut self, vaddr: u64, val: u8) -> Result<(), BusError> {
        let slot = usize::try_from(vaddr)
            .ok()
            .and_then(|idx| self.mem.get_mut(idx))
            .ok_or(BusError::Unmapped { addr: vaddr })?;
        *slot = val;
        Ok(())
    }
}
