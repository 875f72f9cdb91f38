//! Step snapshot types
//!
//! One [`StepSnapshot`] is produced per physics step and is the only thing
//! the outside world ever sees: the HTTP handlers, the SSE/WebSocket streams
//! and the history log all share the same immutable `Arc`'d value. Field
//! names here are the wire format.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Torque decomposition in N·m, chain frame (positive drives the sprocket
/// forward).
///
/// `buoyant` is the net drive torque actually applied to the sprocket;
/// `drag` and `generator` are the loss channels, reported separately so a
/// dashboard can show where the drive torque goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TorqueComponents {
    pub buoyant: f64,
    pub drag: f64,
    pub generator: f64,
}

/// Per-floater force readout in N, vertical frame (positive up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FloaterForces {
    pub buoyancy: f64,
    pub drag: f64,
    pub net_force: f64,
    pub pulse_force: f64,
}

/// Complete observable state after one physics step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Simulation time in seconds.
    pub time: f64,
    /// Step counter since the last reset.
    pub step: u64,
    /// Wall-clock time the step completed.
    pub wall_time: DateTime<Utc>,
    /// Net sprocket torque, N·m.
    pub torque: f64,
    /// Electrical output, W. Zero while the clutch coasts.
    pub power: f64,
    /// Instantaneous `P_out / (P_out + P_compressor)`, in `[0, 1]`.
    pub efficiency: f64,
    pub torque_components: TorqueComponents,
    pub floaters: Vec<FloaterForces>,
    pub clutch_engaged: bool,
    /// Air tank pressure, Pa.
    pub air_tank_pressure: f64,
    /// Mean chain speed, m/s (positive in the forward direction).
    pub chain_speed: f64,
    /// Generator shaft speed, rad/s.
    pub flywheel_omega: f64,
    /// Lifetime compression work, J.
    pub compressor_energy: f64,
    /// Lifetime electrical output, J.
    pub generator_energy: f64,
    /// Energy returned on energy invested: generator over compressor joules.
    pub eroi: f64,
    /// Injections refused for lack of tank pressure since the last reset.
    pub injection_skips: u64,
}

impl StepSnapshot {
    /// Snapshot describing a freshly built simulation, before any step ran.
    pub fn initial(floaters: usize, air_tank_pressure: f64) -> Self {
        Self {
            time: 0.0,
            step: 0,
            wall_time: Utc::now(),
            torque: 0.0,
            power: 0.0,
            efficiency: 0.0,
            torque_components: TorqueComponents::default(),
            floaters: vec![FloaterForces::default(); floaters],
            clutch_engaged: true,
            air_tank_pressure,
            chain_speed: 0.0,
            flywheel_omega: 0.0,
            compressor_energy: 0.0,
            generator_energy: 0.0,
            eroi: 0.0,
            injection_skips: 0,
        }
    }

    /// True when every numeric field is finite. The engine checks this once
    /// per step so NaN can never reach the log or the stream.
    pub fn is_finite(&self) -> bool {
        let scalars = [
            self.time,
            self.torque,
            self.power,
            self.efficiency,
            self.torque_components.buoyant,
            self.torque_components.drag,
            self.torque_components.generator,
            self.air_tank_pressure,
            self.chain_speed,
            self.flywheel_omega,
            self.compressor_energy,
            self.generator_energy,
            self.eroi,
        ];
        scalars.iter().all(|v| v.is_finite())
            && self.floaters.iter().all(|f| {
                f.buoyancy.is_finite()
                    && f.drag.is_finite()
                    && f.net_force.is_finite()
                    && f.pulse_force.is_finite()
            })
    }

    /// Largest absolute net force across the arena, N. Handy for detecting
    /// runaway dynamics in dashboards and tests.
    pub fn max_net_force(&self) -> f64 {
        self.floaters
            .iter()
            .map(|f| f.net_force.abs())
            .fold(0.0, f64::max)
    }
}

impl std::fmt::Display for StepSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fills = self
            .floaters
            .iter()
            .map(|fl| format!("{:+.0}", fl.net_force))
            .join(",");
        write!(
            f,
            "t={:.2}s τ={:.1}N·m P={:.1}W η={:.2} clutch={} tank={:.0}Pa net=[{}]",
            self.time,
            self.torque,
            self.power,
            self.efficiency,
            if self.clutch_engaged { "on" } else { "off" },
            self.air_tank_pressure,
            fills
        )
    }
}
