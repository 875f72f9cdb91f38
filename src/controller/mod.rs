//! # Controller Module
//!
//! Everything between the raw physics components and the HTTP layer: the
//! stepping engine with its realtime loop, the snapshot wire types, energy
//! accounting and the runtime parameter schema.
//!
//! The [`SimulationEngine`] is an explicitly owned instance injected into
//! the API via [`AppState`]; there is no global singleton.

pub mod energy;
pub mod engine;
pub mod params;
pub mod snapshot;

use std::sync::Arc;

use crate::config::Config;

pub use energy::{instantaneous_efficiency, EnergyLedger};
pub use engine::{RunState, SimulationEngine};
pub use params::{ParamKind, ParameterPatch, SCHEMA};
pub use snapshot::{FloaterForces, StepSnapshot, TorqueComponents};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub engine: Arc<SimulationEngine>,
}

impl AppState {
    pub fn new(cfg: Config) -> Self {
        let engine = SimulationEngine::new(cfg.physics.clone(), &cfg.engine);
        Self { cfg, engine }
    }
}
