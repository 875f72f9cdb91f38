//! Air tank, compressor and injection work
//!
//! The tank is modelled as an isothermal reservoir: injecting a floater's
//! volume at depth pressure removes `P_inj · V_floater / V_tank` pascals, and
//! the compressor restores pressure at a rate bounded by its electrical power
//! limit. Injection is refused (not failed) when the tank cannot beat the
//! hydrostatic head plus a safety margin; the chain then carries the flooded
//! floater back up and the skip is counted and logged.
//!
//! ## Injection work (H2)
//!
//! Compressing the injected charge costs, per injection:
//!
//! - adiabatic (no heat exchange): `W = V·(P - P0) / (γ - 1)`,
//! - isothermal (perfect heat exchange): `W = P0·V·ln(P / P0)`.
//!
//! The thermal-assist coefficient blends the two, `W = (1-c)·W_adia +
//! c·W_iso`, so `c = 0` is the conservative default and `c = 1` claims the
//! full isothermal benefit. Isothermal work is strictly smaller whenever the
//! injection pressure exceeds atmospheric, which is what makes H2 an energy
//! hypothesis rather than bookkeeping.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use validator::Validate;

use super::environment::Environment;
use super::floater::Floater;

/// Standard atmosphere at the free surface, Pa.
pub const ATMOSPHERIC_PRESSURE_PA: f64 = 101_325.0;

/// Heat capacity ratio of air.
pub const ADIABATIC_INDEX_AIR: f64 = 1.4;

/// Tank and compressor sizing, from the `[physics.pneumatics]` config
/// section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PneumaticConfig {
    #[validate(range(min = 0.1, max = 100.0))]
    pub tank_volume_m3: f64,
    /// Pressure at t=0, Pa.
    #[validate(range(min = 120_000.0, max = 2_000_000.0))]
    pub initial_pressure_pa: f64,
    /// Compressor setpoint; recharging stops here.
    #[validate(range(min = 120_000.0, max = 2_000_000.0))]
    pub target_pressure_pa: f64,
    /// Electrical power bound on recharging, W.
    #[validate(range(min = 100.0, max = 1_000_000.0))]
    pub compressor_power_limit_w: f64,
    /// Headroom required above hydrostatic pressure before injecting, Pa.
    #[validate(range(min = 0.0, max = 200_000.0))]
    pub injection_margin_pa: f64,
}

impl Default for PneumaticConfig {
    fn default() -> Self {
        Self {
            tank_volume_m3: 2.0,
            initial_pressure_pa: 500_000.0,
            target_pressure_pa: 500_000.0,
            compressor_power_limit_w: 5_000.0,
            injection_margin_pa: 10_000.0,
        }
    }
}

/// What happened when the controller asked for an injection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InjectionOutcome {
    /// Floater was filled; `work_j` is the compression work booked for it.
    Injected { work_j: f64 },
    /// Tank pressure was below the hydrostatic requirement; nothing changed.
    Skipped {
        required_pa: f64,
        available_pa: f64,
    },
}

/// Shared air supply for the whole arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PneumaticSystem {
    tank_volume_m3: f64,
    tank_pressure_pa: f64,
    target_pressure_pa: f64,
    compressor_power_limit_w: f64,
    injection_margin_pa: f64,
    /// H2 blend coefficient in `[0, 1]`.
    thermal_coeff: f64,
    /// Lifetime compression work, J. Monotonically non-decreasing.
    compressor_energy_j: f64,
    injections: u64,
    skips: u64,
}

impl PneumaticSystem {
    pub fn new(cfg: &PneumaticConfig, thermal_coeff: f64) -> Self {
        Self {
            tank_volume_m3: cfg.tank_volume_m3,
            tank_pressure_pa: cfg.initial_pressure_pa,
            target_pressure_pa: cfg.target_pressure_pa,
            compressor_power_limit_w: cfg.compressor_power_limit_w,
            injection_margin_pa: cfg.injection_margin_pa,
            thermal_coeff: thermal_coeff.clamp(0.0, 1.0),
            compressor_energy_j: 0.0,
            injections: 0,
            skips: 0,
        }
    }

    /// Absolute pressure needed to push air into a floater at `depth_m`.
    ///
    /// Uses the base water density: the hydrostatic column above the
    /// injection nozzle is bubble-free water on the ascending side.
    pub fn injection_pressure_pa(&self, env: &Environment, depth_m: f64) -> f64 {
        ATMOSPHERIC_PRESSURE_PA + env.base_water_density() * env.gravity() * depth_m.max(0.0)
    }

    /// Compression work in joules for filling `volume_m3` against
    /// `injection_pressure_pa`, blended between adiabatic and isothermal by
    /// the thermal-assist coefficient.
    pub fn compression_work_j(&self, volume_m3: f64, injection_pressure_pa: f64) -> f64 {
        let p0 = ATMOSPHERIC_PRESSURE_PA;
        let p = injection_pressure_pa.max(p0);
        let isothermal = p0 * volume_m3 * (p / p0).ln();
        let adiabatic = volume_m3 * (p - p0) / (ADIABATIC_INDEX_AIR - 1.0);
        (1.0 - self.thermal_coeff) * adiabatic + self.thermal_coeff * isothermal
    }

    /// Fill a floater at the bottom of the column, if the tank can.
    ///
    /// On success the floater switches to air-filled, the tank is drawn down
    /// by the displaced charge and the compression work is booked against the
    /// lifetime energy counter.
    pub fn inject_air(
        &mut self,
        floater: &mut Floater,
        env: &Environment,
        depth_m: f64,
    ) -> InjectionOutcome {
        let injection_pressure = self.injection_pressure_pa(env, depth_m);
        let required = injection_pressure + self.injection_margin_pa;
        if self.tank_pressure_pa < required {
            self.skips += 1;
            warn!(
                floater = floater.id,
                required_pa = required,
                available_pa = self.tank_pressure_pa,
                "injection skipped: tank pressure below hydrostatic requirement"
            );
            return InjectionOutcome::Skipped {
                required_pa: required,
                available_pa: self.tank_pressure_pa,
            };
        }

        let work_j = self.compression_work_j(floater.volume_m3, injection_pressure);
        self.compressor_energy_j += work_j;
        self.tank_pressure_pa -= injection_pressure * floater.volume_m3 / self.tank_volume_m3;
        self.injections += 1;
        floater.filled_with_air = true;
        debug!(
            floater = floater.id,
            work_j,
            tank_pressure_pa = self.tank_pressure_pa,
            "injected air at bottom"
        );
        InjectionOutcome::Injected { work_j }
    }

    /// Flood a floater at the top of the column. Venting to the atmosphere
    /// costs nothing and always succeeds.
    pub fn vent_air(&mut self, floater: &mut Floater) {
        floater.filled_with_air = false;
        debug!(floater = floater.id, "vented air at top");
    }

    /// Run the compressor for `dt_s` seconds, raising tank pressure toward
    /// the target at the power-limited rate. No-op once the target is
    /// reached.
    pub fn recharge(&mut self, dt_s: f64) {
        if self.tank_pressure_pa >= self.target_pressure_pa {
            return;
        }
        let dp = self.compressor_power_limit_w * dt_s / self.tank_volume_m3;
        self.tank_pressure_pa = (self.tank_pressure_pa + dp).min(self.target_pressure_pa);
    }

    pub fn set_target_pressure(&mut self, target_pa: f64) {
        self.target_pressure_pa = target_pa;
    }

    pub fn set_thermal_coeff(&mut self, coeff: f64) {
        self.thermal_coeff = coeff.clamp(0.0, 1.0);
    }

    pub fn tank_pressure_pa(&self) -> f64 {
        self.tank_pressure_pa
    }

    pub fn compressor_energy_j(&self) -> f64 {
        self.compressor_energy_j
    }

    pub fn injections(&self) -> u64 {
        self.injections
    }

    pub fn injection_skips(&self) -> u64 {
        self.skips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::floater::FloaterConfig;
    use rstest::rstest;

    fn system_with(thermal_coeff: f64) -> PneumaticSystem {
        PneumaticSystem::new(&PneumaticConfig::default(), thermal_coeff)
    }

    fn bottom_floater() -> Floater {
        let mut f = Floater::new(0, &FloaterConfig::default(), 0.2, false);
        f.filled_with_air = false;
        f
    }

    #[test]
    fn test_injection_pressure_grows_with_depth() {
        let env = Environment::default();
        let sys = system_with(0.0);
        let surface = sys.injection_pressure_pa(&env, 0.0);
        let deep = sys.injection_pressure_pa(&env, 10.0);
        assert!((surface - ATMOSPHERIC_PRESSURE_PA).abs() < 1e-9);
        // 10 m of water adds ρ·g·h = 98.1 kPa.
        assert!((deep - surface - 98_100.0).abs() < 1e-6);
    }

    #[test]
    fn test_isothermal_work_is_cheaper_than_adiabatic() {
        let adiabatic = system_with(0.0);
        let isothermal = system_with(1.0);
        let p = 300_000.0;
        let w_adia = adiabatic.compression_work_j(0.04, p);
        let w_iso = isothermal.compression_work_j(0.04, p);
        assert!(w_iso < w_adia);
        assert!(w_iso > 0.0);
    }

    #[rstest]
    #[case(0.0, 0.25)]
    #[case(0.25, 0.5)]
    #[case(0.5, 0.75)]
    #[case(0.75, 1.0)]
    fn test_work_decreases_monotonically_with_thermal_coeff(
        #[case] lower: f64,
        #[case] higher: f64,
    ) {
        let w_lower = system_with(lower).compression_work_j(0.04, 250_000.0);
        let w_higher = system_with(higher).compression_work_j(0.04, 250_000.0);
        assert!(w_higher < w_lower);
    }

    #[test]
    fn test_injection_fills_floater_and_draws_tank() {
        let env = Environment::default();
        let mut sys = system_with(0.0);
        let mut floater = bottom_floater();
        let before = sys.tank_pressure_pa();

        let outcome = sys.inject_air(&mut floater, &env, 9.8);
        assert!(matches!(outcome, InjectionOutcome::Injected { work_j } if work_j > 0.0));
        assert!(floater.filled_with_air);
        assert!(sys.tank_pressure_pa() < before);
        assert_eq!(sys.injections(), 1);
        assert!(sys.compressor_energy_j() > 0.0);
    }

    #[test]
    fn test_injection_skipped_when_tank_is_low() {
        let env = Environment::default();
        let cfg = PneumaticConfig {
            initial_pressure_pa: 150_000.0,
            ..PneumaticConfig::default()
        };
        let mut sys = PneumaticSystem::new(&cfg, 0.0);
        let mut floater = bottom_floater();

        // 10 m of head needs ~199 kPa plus margin; 150 kPa cannot inject.
        let outcome = sys.inject_air(&mut floater, &env, 10.0);
        assert!(matches!(outcome, InjectionOutcome::Skipped { .. }));
        assert!(!floater.filled_with_air);
        assert_eq!(sys.injection_skips(), 1);
        assert_eq!(sys.compressor_energy_j(), 0.0);
        assert_eq!(sys.tank_pressure_pa(), 150_000.0);
    }

    #[test]
    fn test_recharge_stops_at_target() {
        let cfg = PneumaticConfig {
            initial_pressure_pa: 490_000.0,
            target_pressure_pa: 500_000.0,
            compressor_power_limit_w: 5_000.0,
            tank_volume_m3: 2.0,
            ..PneumaticConfig::default()
        };
        let mut sys = PneumaticSystem::new(&cfg, 0.0);

        // 2.5 kPa/s: two seconds gets halfway, ten seconds saturates.
        sys.recharge(2.0);
        assert!((sys.tank_pressure_pa() - 495_000.0).abs() < 1e-6);
        sys.recharge(10.0);
        assert_eq!(sys.tank_pressure_pa(), 500_000.0);
        sys.recharge(10.0);
        assert_eq!(sys.tank_pressure_pa(), 500_000.0);
    }

    #[test]
    fn test_compressor_energy_is_monotonic() {
        let env = Environment::default();
        let mut sys = system_with(0.5);
        let mut floater = bottom_floater();
        let mut last = 0.0;
        for _ in 0..5 {
            floater.filled_with_air = false;
            sys.inject_air(&mut floater, &env, 9.5);
            sys.recharge(20.0);
            assert!(sys.compressor_energy_j() >= last);
            last = sys.compressor_energy_j();
        }
        assert_eq!(sys.injections(), 5);
    }
}
