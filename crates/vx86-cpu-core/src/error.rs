use thiserror::Error;

/// Failure reported by a [`crate::mem::CpuBus`] implementation.
///
/// The state core never produces these itself; it only forwards them from the
/// guest memory primitives it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("guest address {addr:#x} is not backed by memory")]
    Unmapped { addr: u64 },
    #[error("guest address {addr:#x} is not writable")]
    ReadOnly { addr: u64 },
}

impl BusError {
    pub fn addr(&self) -> u64 {
        match *self {
            BusError::Unmapped { addr } | BusError::ReadOnly { addr } => addr,
        }
    }
}
