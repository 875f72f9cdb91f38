//! Water column environment
//!
//! Shared fluid properties seen by every floater: water density, gravity and
//! the drag regime. The nanobubble hypothesis (H1) lives here because it
//! modifies the fluid itself, not the floaters. When active, dissolved
//! nanobubbles reduce the effective density and drag on the descending side
//! of the chain, so water-filled floaters sink through "lighter" water while
//! the ascending side keeps the full base density.
//!
//! ## Conventions
//!
//! - The vertical axis points up; all densities are kg/m³, gravity in m/s².
//! - Reductions are fractions in `[0, 1]` of the base value. Effective
//!   density and drag coefficient therefore never exceed their base values
//!   and never go negative.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Drag coefficient of a bare floater, before any nanobubble reduction.
pub const BASE_DRAG_COEFFICIENT: f64 = 0.8;

/// Static fluid properties, loaded from the `[physics.environment]` config
/// section.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Density of plain (bubble-free) water in kg/m³.
    #[validate(range(min = 500.0, max = 2000.0))]
    pub water_density_kg_m3: f64,
    /// Gravitational acceleration in m/s².
    #[validate(range(min = 1.0, max = 25.0))]
    pub gravity_m_s2: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            water_density_kg_m3: 1000.0,
            gravity_m_s2: 9.81,
        }
    }
}

/// Fluid state queried by floaters, pneumatics and the drivetrain on every
/// step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    base_water_density_kg_m3: f64,
    gravity_m_s2: f64,
    nanobubble_active: bool,
    density_reduction: f64,
    drag_reduction: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(&EnvironmentConfig::default())
    }
}

impl Environment {
    pub fn new(cfg: &EnvironmentConfig) -> Self {
        Self {
            base_water_density_kg_m3: cfg.water_density_kg_m3,
            gravity_m_s2: cfg.gravity_m_s2,
            nanobubble_active: false,
            density_reduction: 0.0,
            drag_reduction: 0.0,
        }
    }

    /// Enable or disable the nanobubble hypothesis with a single fraction.
    ///
    /// `frac` scales both the density and the drag reduction; values are
    /// clamped to `[0, 1]`. A fraction of zero turns the hypothesis off.
    pub fn set_nanobubbles(&mut self, frac: f64) {
        let frac = frac.clamp(0.0, 1.0);
        self.nanobubble_active = frac > 0.0;
        self.density_reduction = frac;
        self.drag_reduction = frac;
    }

    /// Effective water density around a floater.
    ///
    /// Ascending (air-filled) floaters always see the base density. The
    /// descending side sees the reduced density while nanobubbles are active.
    pub fn water_density(&self, ascending: bool) -> f64 {
        if ascending || !self.nanobubble_active {
            self.base_water_density_kg_m3
        } else {
            self.base_water_density_kg_m3 * (1.0 - self.density_reduction)
        }
    }

    /// Effective drag coefficient for a floater moving through the column.
    pub fn drag_coefficient(&self, ascending: bool) -> f64 {
        if ascending || !self.nanobubble_active {
            BASE_DRAG_COEFFICIENT
        } else {
            BASE_DRAG_COEFFICIENT * (1.0 - self.drag_reduction)
        }
    }

    /// Base (bubble-free) density, used for internal water ballast and
    /// hydrostatic pressure where the nanobubble side split does not apply.
    pub fn base_water_density(&self) -> f64 {
        self.base_water_density_kg_m3
    }

    pub fn gravity(&self) -> f64 {
        self.gravity_m_s2
    }

    pub fn nanobubbles_active(&self) -> bool {
        self.nanobubble_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_environment() {
        let env = Environment::default();
        assert_eq!(env.water_density(true), 1000.0);
        assert_eq!(env.water_density(false), 1000.0);
        assert_eq!(env.drag_coefficient(false), BASE_DRAG_COEFFICIENT);
        assert!(!env.nanobubbles_active());
    }

    #[test]
    fn test_nanobubbles_only_affect_descending_side() {
        let mut env = Environment::default();
        env.set_nanobubbles(0.2);

        // Ascending side untouched
        assert_eq!(env.water_density(true), 1000.0);
        assert_eq!(env.drag_coefficient(true), BASE_DRAG_COEFFICIENT);

        // Descending side reduced by the fraction
        assert!((env.water_density(false) - 800.0).abs() < 1e-9);
        assert!((env.drag_coefficient(false) - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_nanobubble_fraction_is_clamped() {
        let mut env = Environment::default();
        env.set_nanobubbles(1.5);
        assert_eq!(env.water_density(false), 0.0);

        env.set_nanobubbles(-0.3);
        assert!(!env.nanobubbles_active());
        assert_eq!(env.water_density(false), 1000.0);
    }

    #[test]
    fn test_effective_values_never_exceed_base() {
        let mut env = Environment::default();
        for frac in [0.0, 0.1, 0.5, 0.99, 1.0] {
            env.set_nanobubbles(frac);
            for ascending in [true, false] {
                assert!(env.water_density(ascending) <= env.base_water_density());
                assert!(env.water_density(ascending) >= 0.0);
                assert!(env.drag_coefficient(ascending) <= BASE_DRAG_COEFFICIENT);
                assert!(env.drag_coefficient(ascending) >= 0.0);
            }
        }
    }
}
