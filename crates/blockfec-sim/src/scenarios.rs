/// Loss profile applied to every leg of a simulated broadcast.
#[derive(Debug, Clone, Copy)]
pub struct LossScenario {
    pub loss_rate_percent: u8,
    /// Repair chunks sent per data chunk, in percent.
    pub repair_overhead_percent: u16,
}

pub const PRACTICAL_BASELINE: LossScenario = LossScenario {
    loss_rate_percent: 10,
    repair_overhead_percent: 50,
};

pub fn practical_baseline() -> LossScenario {
    PRACTICAL_BASELINE
}

impl LossScenario {
    /// Repair slots to send alongside `chunk_count` data chunks, at least one.
    pub fn repair_slots(&self, chunk_count: usize) -> usize {
        let slots = chunk_count * usize::from(self.repair_overhead_percent);
        slots.div_ceil(100).max(1)
    }
}
