//! Floater arena and per-floater kinematics
//!
//! A floater is one buoyancy vessel riding the chain loop. Position is a 1D
//! coordinate along the loop in metres: `0` is the bottom turnaround, values
//! grow along the ascending run and wrap at the column height back to zero on
//! the descending side. Velocity is vertical (m/s, positive up), so air-filled
//! floaters move upward and water-filled floaters move downward.
//!
//! ## Forces
//!
//! Each step a floater feels, in newtons:
//!
//! - buoyancy `ρ_eff · V · g` (only while air-filled; a flooded floater is
//!   close to neutrally buoyant and we let its ballast weight dominate),
//! - weight `m · g`, where the mass of a water-filled floater includes the
//!   ballast water at the base density,
//! - quadratic drag `-½ · C_d · ρ_eff · A · v · |v|`, always opposing motion,
//! - the generator reaction assigned by the drivetrain (`pulse_force_n`).
//!
//! Integration is forward Euler. Non-finite results abort the run via
//! [`PhysicsError`] rather than propagating NaN into the logs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::environment::Environment;
use crate::error::PhysicsError;

/// Smallest mass we accept before declaring the state non-physical.
const MIN_MASS_KG: f64 = 1e-6;

/// Geometry and empty mass shared by every floater in the arena, from the
/// `[physics.floater]` config section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FloaterConfig {
    /// Displaced volume in m³.
    #[validate(range(min = 0.001, max = 10.0))]
    pub volume_m3: f64,
    /// Dry mass of the shell in kg.
    #[validate(range(min = 0.1, max = 10_000.0))]
    pub mass_empty_kg: f64,
    /// Projected cross-section in m², used by the drag term.
    #[validate(range(min = 0.001, max = 10.0))]
    pub area_m2: f64,
}

impl Default for FloaterConfig {
    fn default() -> Self {
        Self {
            volume_m3: 0.04,
            mass_empty_kg: 18.0,
            area_m2: 0.12,
        }
    }
}

/// Water column and sensor zone geometry, from `[physics.column]`.
///
/// The chain loop coordinate runs from `0` to `height_m`. Injection fires in
/// `[0, bottom_zone_m]`, venting in `[height_m - top_zone_m, height_m]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ColumnConfig {
    #[validate(range(min = 1.0, max = 100.0))]
    pub height_m: f64,
    #[validate(range(min = 0.05, max = 5.0))]
    pub bottom_zone_m: f64,
    #[validate(range(min = 0.05, max = 5.0))]
    pub top_zone_m: f64,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            height_m: 10.0,
            bottom_zone_m: 0.5,
            top_zone_m: 0.5,
        }
    }
}

/// Per-step force decomposition for one floater, in newtons.
///
/// `net_n` is exactly the force integrated by [`Floater::update`]; the parts
/// are published in the snapshot for dashboards and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceBreakdown {
    pub buoyancy_n: f64,
    pub weight_n: f64,
    pub drag_n: f64,
    pub pulse_n: f64,
    pub net_n: f64,
}

/// One vessel on the chain, addressed by its arena index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Floater {
    pub id: usize,
    pub volume_m3: f64,
    pub mass_empty_kg: f64,
    pub area_m2: f64,
    /// Loop coordinate in metres, wrapped to `[0, column height)`.
    pub position_m: f64,
    /// Vertical velocity in m/s, positive up.
    pub velocity_m_s: f64,
    /// `true` after injection at the bottom, `false` after venting at the top.
    pub filled_with_air: bool,
    /// Generator reaction force for the current step, set by the controller.
    pub pulse_force_n: f64,
}

impl Floater {
    pub fn new(id: usize, cfg: &FloaterConfig, position_m: f64, filled_with_air: bool) -> Self {
        Self {
            id,
            volume_m3: cfg.volume_m3,
            mass_empty_kg: cfg.mass_empty_kg,
            area_m2: cfg.area_m2,
            position_m,
            velocity_m_s: 0.0,
            filled_with_air,
            pulse_force_n: 0.0,
        }
    }

    /// Total mass in kg. A flooded floater carries its ballast water at the
    /// base density; the trapped air mass is neglected.
    pub fn mass_kg(&self, env: &Environment) -> f64 {
        if self.filled_with_air {
            self.mass_empty_kg
        } else {
            self.mass_empty_kg + self.volume_m3 * env.base_water_density()
        }
    }

    /// Archimedes force `ρ_eff · V · g` at this floater's side of the loop.
    pub fn buoyant_force_n(&self, env: &Environment) -> f64 {
        env.water_density(self.filled_with_air) * self.volume_m3 * env.gravity()
    }

    pub fn weight_n(&self, env: &Environment) -> f64 {
        self.mass_kg(env) * env.gravity()
    }

    /// Quadratic drag opposing the current velocity. Zero at rest.
    pub fn drag_force_n(&self, env: &Environment) -> f64 {
        let rho = env.water_density(self.filled_with_air);
        let cd = env.drag_coefficient(self.filled_with_air);
        -0.5 * cd * rho * self.area_m2 * self.velocity_m_s * self.velocity_m_s.abs()
    }

    /// `+1` on the ascending (air-filled) run, `-1` on the descending run.
    ///
    /// Multiplying a vertical force by this sign maps it into the chain
    /// frame, where positive means "drives the sprocket forward". A sinking
    /// water-filled floater therefore contributes its weight surplus as
    /// positive chain force.
    pub fn chain_sign(&self) -> f64 {
        if self.filled_with_air {
            1.0
        } else {
            -1.0
        }
    }

    /// Chain-frame drive force `sign · (B - W)` using the full Archimedes
    /// buoyancy on both sides. This feeds the drivetrain torque sum.
    pub fn chain_drive_force_n(&self, env: &Environment) -> f64 {
        self.chain_sign() * (self.buoyant_force_n(env) - self.weight_n(env))
    }

    /// Vertical-frame forces used for integration.
    ///
    /// Buoyancy is only applied while air-filled; the descending run models
    /// the flooded vessel as ballast weight plus drag.
    pub fn forces(&self, env: &Environment) -> ForceBreakdown {
        let buoyancy_n = if self.filled_with_air {
            self.buoyant_force_n(env)
        } else {
            0.0
        };
        let weight_n = self.weight_n(env);
        let drag_n = self.drag_force_n(env);
        let pulse_n = self.pulse_force_n;
        ForceBreakdown {
            buoyancy_n,
            weight_n,
            drag_n,
            pulse_n,
            net_n: buoyancy_n - weight_n + drag_n + pulse_n,
        }
    }

    /// Advance one Euler step and wrap the loop coordinate.
    ///
    /// Returns the force breakdown that was integrated so the controller can
    /// publish it without recomputing. Fails fast on non-physical mass or
    /// non-finite results.
    pub fn update(
        &mut self,
        dt_s: f64,
        env: &Environment,
        loop_length_m: f64,
    ) -> Result<ForceBreakdown, PhysicsError> {
        let mass = self.mass_kg(env);
        if !(mass >= MIN_MASS_KG) {
            return Err(PhysicsError::NonPhysicalMass {
                id: self.id,
                mass_kg: mass,
                position_m: self.position_m,
            });
        }

        let forces = self.forces(env);
        self.velocity_m_s += forces.net_n / mass * dt_s;
        self.position_m = (self.position_m + self.velocity_m_s * dt_s).rem_euclid(loop_length_m);

        if !self.velocity_m_s.is_finite() {
            return Err(PhysicsError::NonFinite {
                id: self.id,
                quantity: "velocity",
                position_m: self.position_m,
            });
        }
        if !self.position_m.is_finite() {
            return Err(PhysicsError::NonFinite {
                id: self.id,
                quantity: "position",
                position_m: self.position_m,
            });
        }
        Ok(forces)
    }
}

/// Seed `count` floaters evenly around the loop with alternating fill state.
///
/// The half-slot offset keeps every floater clear of both sensor zones at
/// t=0, so the first injections happen through normal chain motion instead
/// of on the very first step.
pub fn build_arena(cfg: &FloaterConfig, count: usize, loop_length_m: f64) -> Vec<Floater> {
    let spacing = loop_length_m / count.max(1) as f64;
    (0..count)
        .map(|id| {
            let position = (id as f64 + 0.5) * spacing;
            Floater::new(id, cfg, position, id % 2 == 0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_floater(filled: bool) -> Floater {
        let cfg = FloaterConfig {
            volume_m3: 1.0,
            mass_empty_kg: 100.0,
            area_m2: 0.5,
        };
        Floater::new(0, &cfg, 5.0, filled)
    }

    #[test]
    fn test_buoyancy_reference_value() {
        // 1 m³ in 1000 kg/m³ water at g = 9.81 displaces 9810 N.
        let env = Environment::default();
        let f = unit_floater(true);
        assert!((f.buoyant_force_n(&env) - 9810.0).abs() < 1e-9);
    }

    #[test]
    fn test_flooded_floater_carries_ballast_mass() {
        let env = Environment::default();
        let f = unit_floater(false);
        assert!((f.mass_kg(&env) - 1100.0).abs() < 1e-9);

        let filled = unit_floater(true);
        assert_eq!(filled.mass_kg(&env), 100.0);
    }

    #[test]
    fn test_air_filled_floater_accelerates_upward() {
        let env = Environment::default();
        let mut f = unit_floater(true);
        let forces = f.update(0.1, &env, 10.0).unwrap();
        assert!(forces.net_n > 0.0);
        assert!(f.velocity_m_s > 0.0);
        assert!(f.position_m > 5.0);
    }

    #[test]
    fn test_water_filled_floater_sinks() {
        let env = Environment::default();
        let mut f = unit_floater(false);
        f.update(0.1, &env, 10.0).unwrap();
        assert!(f.velocity_m_s < 0.0);
        assert!(f.position_m < 5.0);
    }

    #[test]
    fn test_position_wraps_at_loop_ends() {
        let env = Environment::default();
        let mut f = unit_floater(false);
        f.position_m = 0.05;
        f.velocity_m_s = -2.0;
        f.update(0.1, &env, 10.0).unwrap();
        // Crossed the bottom turnaround and reappeared near the top.
        assert!(f.position_m > 9.0 && f.position_m < 10.0);
    }

    #[test]
    fn test_chain_sign_convention() {
        let env = Environment::default();
        let ascending = unit_floater(true);
        let descending = unit_floater(false);
        assert_eq!(ascending.chain_sign(), 1.0);
        assert_eq!(descending.chain_sign(), -1.0);
        // Both runs drive the chain forward for this geometry: light shell
        // rising, heavy ballast sinking.
        assert!(ascending.chain_drive_force_n(&env) > 0.0);
        assert!(descending.chain_drive_force_n(&env) > 0.0);
    }

    #[test]
    fn test_non_physical_mass_is_rejected() {
        let env = Environment::default();
        let cfg = FloaterConfig {
            volume_m3: 1.0,
            mass_empty_kg: 0.0,
            area_m2: 0.5,
        };
        let mut f = Floater::new(7, &cfg, 1.0, true);
        let err = f.update(0.1, &env, 10.0).unwrap_err();
        assert!(matches!(err, PhysicsError::NonPhysicalMass { id: 7, .. }));
    }

    #[test]
    fn test_arena_alternates_fill_and_spaces_evenly() {
        let arena = build_arena(&FloaterConfig::default(), 4, 10.0);
        assert_eq!(arena.len(), 4);
        let positions: Vec<f64> = arena.iter().map(|f| f.position_m).collect();
        assert_eq!(positions, vec![1.25, 3.75, 6.25, 8.75]);
        assert!(arena[0].filled_with_air);
        assert!(!arena[1].filled_with_air);
        assert!(arena[2].filled_with_air);
        assert!(!arena[3].filled_with_air);
    }

    proptest! {
        #[test]
        fn prop_drag_opposes_motion(v in -20.0f64..20.0, filled in any::<bool>()) {
            let env = Environment::default();
            let mut f = unit_floater(filled);
            f.velocity_m_s = v;
            let drag = f.drag_force_n(&env);
            prop_assert!(drag * v <= 0.0);
        }

        #[test]
        fn prop_position_stays_on_loop(
            start in 0.0f64..10.0,
            v in -50.0f64..50.0,
            filled in any::<bool>(),
        ) {
            let env = Environment::default();
            let mut f = unit_floater(filled);
            f.position_m = start;
            f.velocity_m_s = v;
            f.update(0.05, &env, 10.0).unwrap();
            prop_assert!(f.position_m >= 0.0 && f.position_m < 10.0);
        }
    }
}
