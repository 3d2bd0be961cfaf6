/// Per-vCPU reset configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuConfig {
    /// vCPU number. Only used to tag log records.
    pub index: u32,
    /// EFER value at reset. Firmware that hands off straight into long mode
    /// (direct kernel boot) sets LME|LMA here.
    pub efer: u64,
}

impl CpuConfig {
    pub fn with_index(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }
}
