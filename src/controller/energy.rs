//! Energy accounting
//!
//! Integrates electrical output over time and derives the two headline
//! ratios: instantaneous efficiency (per step) and EROI (lifetime). The
//! compressor side of the books lives in the pneumatic system, which owns
//! the physical process; this ledger only consumes its counter.

/// Instantaneous efficiency `P_out / (P_out + P_comp)`.
///
/// Negative transients are clamped to zero first, so the result is always in
/// `[0, 1]`; a step with no power flow at all reports zero rather than NaN.
pub fn instantaneous_efficiency(generator_w: f64, compressor_w: f64) -> f64 {
    let out = generator_w.max(0.0);
    let spent = compressor_w.max(0.0);
    let total = out + spent;
    if total <= 0.0 {
        0.0
    } else {
        out / total
    }
}

/// Lifetime generator-side energy accumulator.
#[derive(Debug, Clone, Default)]
pub struct EnergyLedger {
    generator_energy_j: f64,
    peak_power_w: f64,
    steps: u64,
}

impl EnergyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book one step of electrical output. Negative power (a motoring
    /// transient) does not count as generation.
    pub fn record_step(&mut self, power_w: f64, dt_s: f64) {
        self.generator_energy_j += power_w.max(0.0) * dt_s;
        self.peak_power_w = self.peak_power_w.max(power_w);
        self.steps += 1;
    }

    pub fn generator_energy_j(&self) -> f64 {
        self.generator_energy_j
    }

    pub fn peak_power_w(&self) -> f64 {
        self.peak_power_w
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Energy returned on energy invested: generated joules over compressor
    /// joules. Zero until the compressor has done any work.
    pub fn eroi(&self, compressor_energy_j: f64) -> f64 {
        if compressor_energy_j <= 0.0 {
            0.0
        } else {
            self.generator_energy_j / compressor_energy_j
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
