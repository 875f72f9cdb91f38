//! Chain, sprocket, clutch and generator
//!
//! The chain couples every floater to one sprocket of radius `wheel_radius_m`;
//! net torque is the sum of chain-frame drive forces times that radius.
//! Electrical output is `P = τ · ω · η` while the clutch is engaged, zero
//! while coasting.
//!
//! ## Pulse-and-coast (H3)
//!
//! When the pulse schedule is enabled the clutch alternates on a fixed duty
//! cycle: engaged for `on_s` seconds (generator loaded), then freewheeling
//! for `off_s` (chain accelerates unloaded). Every transition is logged with
//! the simulation timestamp. With the schedule disabled the clutch is held
//! engaged and the machine behaves as a conventional direct drive.
//!
//! ## Flywheel
//!
//! An optional flywheel on the generator shaft smooths the pulse cycle. It
//! integrates shaft torque while coasting and relaxes toward synchronous
//! speed at a first-order coupling rate while engaged. Zero inertia disables
//! it and the generator follows the chain rigidly.

use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::info;
use validator::Validate;

/// Mechanical constants, from the `[physics.drivetrain]` config section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Sprocket radius in m; converts chain force to torque.
    #[validate(range(min = 0.05, max = 5.0))]
    pub wheel_radius_m: f64,
    /// Chain-to-generator shaft speed ratio.
    #[validate(range(min = 1.0, max = 100.0))]
    pub gear_ratio: f64,
    /// Electrical conversion efficiency in `(0, 1]`.
    #[validate(range(min = 0.05, max = 1.0))]
    pub generator_efficiency: f64,
    /// Flywheel moment of inertia in kg·m²; zero disables the flywheel.
    #[validate(range(min = 0.0, max = 10_000.0))]
    pub flywheel_inertia_kg_m2: f64,
    /// First-order rate at which the engaged flywheel pulls toward
    /// synchronous speed, 1/s.
    #[validate(range(min = 0.01, max = 100.0))]
    pub flywheel_coupling_per_s: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            wheel_radius_m: 0.5,
            gear_ratio: 16.7,
            generator_efficiency: 0.92,
            flywheel_inertia_kg_m2: 0.0,
            flywheel_coupling_per_s: 1.5,
        }
    }
}

/// Duty cycle for the pulse-and-coast clutch, from `[physics.hypotheses]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PulseSchedule {
    pub enabled: bool,
    /// Engaged phase duration, s.
    #[validate(range(min = 0.1, max = 600.0))]
    pub on_s: f64,
    /// Freewheel phase duration, s.
    #[validate(range(min = 0.1, max = 600.0))]
    pub off_s: f64,
}

impl Default for PulseSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            on_s: 3.0,
            off_s: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ClutchState {
    /// Generator engaged, extracting power.
    Pulse,
    /// Freewheeling; the chain accelerates unloaded.
    Coast,
}

/// Mutable drivetrain state advanced once per physics step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drivetrain {
    wheel_radius_m: f64,
    gear_ratio: f64,
    generator_efficiency: f64,
    flywheel_inertia_kg_m2: f64,
    flywheel_coupling_per_s: f64,
    schedule: PulseSchedule,
    clutch: ClutchState,
    phase_elapsed_s: f64,
    /// Generator shaft speed, rad/s (after gearing).
    flywheel_omega_rad_s: f64,
    /// Net chain torque from the last force sum, N·m.
    torque_nm: f64,
    /// Chain-frame speed the generator saw at the last power update, rad/s.
    angular_speed_rad_s: f64,
    power_output_w: f64,
    /// Chain-frame reaction torque the generator applies while engaged, N·m.
    generator_torque_nm: f64,
}

impl Drivetrain {
    pub fn new(cfg: &DrivetrainConfig, schedule: PulseSchedule) -> Self {
        Self {
            wheel_radius_m: cfg.wheel_radius_m,
            gear_ratio: cfg.gear_ratio,
            generator_efficiency: cfg.generator_efficiency,
            flywheel_inertia_kg_m2: cfg.flywheel_inertia_kg_m2,
            flywheel_coupling_per_s: cfg.flywheel_coupling_per_s,
            schedule,
            clutch: ClutchState::Pulse,
            phase_elapsed_s: 0.0,
            flywheel_omega_rad_s: 0.0,
            torque_nm: 0.0,
            angular_speed_rad_s: 0.0,
            power_output_w: 0.0,
            generator_torque_nm: 0.0,
        }
    }

    /// Sum chain-frame drive forces into net sprocket torque and store it.
    pub fn torque_from_forces(&mut self, chain_forces_n: &[f64]) -> f64 {
        self.torque_nm = chain_forces_n.iter().sum::<f64>() * self.wheel_radius_m;
        self.torque_nm
    }

    /// Advance the clutch duty cycle by `dt_s`, logging transitions at
    /// simulation time `time_s`. Forces the engaged state when the schedule
    /// is disabled.
    pub fn advance_clutch(&mut self, dt_s: f64, time_s: f64) {
        if !self.schedule.enabled {
            if self.clutch == ClutchState::Coast {
                self.transition(ClutchState::Pulse, time_s);
            }
            self.phase_elapsed_s = 0.0;
            return;
        }

        self.phase_elapsed_s += dt_s;
        // Durations may be shorter than one step; carry the remainder so the
        // duty cycle stays exact over long runs.
        loop {
            let phase_len = match self.clutch {
                ClutchState::Pulse => self.schedule.on_s,
                ClutchState::Coast => self.schedule.off_s,
            };
            if self.phase_elapsed_s < phase_len {
                break;
            }
            self.phase_elapsed_s -= phase_len;
            let next = match self.clutch {
                ClutchState::Pulse => ClutchState::Coast,
                ClutchState::Coast => ClutchState::Pulse,
            };
            self.transition(next, time_s);
        }
    }

    fn transition(&mut self, next: ClutchState, time_s: f64) {
        info!(
            time_s,
            from = %self.clutch,
            to = %next,
            "clutch transition"
        );
        self.clutch = next;
    }

    /// Integrate the flywheel shaft speed over one step.
    pub fn update_flywheel(&mut self, chain_omega_rad_s: f64, dt_s: f64) {
        let synchronous = chain_omega_rad_s * self.gear_ratio;
        if self.flywheel_inertia_kg_m2 <= 0.0 {
            self.flywheel_omega_rad_s = synchronous;
            return;
        }
        let shaft_torque = self.torque_nm / self.gear_ratio;
        let accel = shaft_torque / self.flywheel_inertia_kg_m2;
        self.flywheel_omega_rad_s += accel * dt_s;
        if self.clutch_engaged() {
            let pull = self.flywheel_coupling_per_s * (self.flywheel_omega_rad_s - synchronous);
            self.flywheel_omega_rad_s -= pull * dt_s;
        }
    }

    /// Chain-frame speed the generator runs at: the flywheel shaft mapped
    /// back through the gearing when a flywheel is fitted, the raw chain
    /// speed otherwise.
    pub fn generator_speed_rad_s(&self, chain_omega_rad_s: f64) -> f64 {
        if self.flywheel_inertia_kg_m2 > 0.0 {
            self.flywheel_omega_rad_s / self.gear_ratio
        } else {
            chain_omega_rad_s
        }
    }

    /// Compute electrical output `P = τ · ω · η` for the stored torque at
    /// `omega_rad_s`, zero while coasting, and remember the operating point.
    pub fn update_power(&mut self, omega_rad_s: f64) -> f64 {
        self.angular_speed_rad_s = omega_rad_s;
        if self.clutch_engaged() {
            self.power_output_w = self.torque_nm * omega_rad_s * self.generator_efficiency;
            self.generator_torque_nm = self.torque_nm * self.generator_efficiency;
        } else {
            self.power_output_w = 0.0;
            self.generator_torque_nm = 0.0;
        }
        self.power_output_w
    }

    pub fn set_pulse_enabled(&mut self, enabled: bool) {
        self.schedule.enabled = enabled;
    }

    pub fn set_pulse_durations(&mut self, on_s: f64, off_s: f64) {
        self.schedule.on_s = on_s;
        self.schedule.off_s = off_s;
    }

    pub fn set_flywheel_inertia(&mut self, inertia_kg_m2: f64) {
        self.flywheel_inertia_kg_m2 = inertia_kg_m2.max(0.0);
    }

    pub fn clutch_engaged(&self) -> bool {
        self.clutch == ClutchState::Pulse
    }

    pub fn clutch_state(&self) -> ClutchState {
        self.clutch
    }

    pub fn torque_nm(&self) -> f64 {
        self.torque_nm
    }

    pub fn power_output_w(&self) -> f64 {
        self.power_output_w
    }

    pub fn generator_torque_nm(&self) -> f64 {
        self.generator_torque_nm
    }

    pub fn flywheel_omega_rad_s(&self) -> f64 {
        self.flywheel_omega_rad_s
    }

    pub fn wheel_radius_m(&self) -> f64 {
        self.wheel_radius_m
    }

    pub fn pulse_schedule(&self) -> PulseSchedule {
        self.schedule
    }
}
