use thiserror::Error;

/// Fatal invariant violations inside the physics step.
///
/// Any of these aborts the current run: the loop halts, the error is logged
/// with the simulation time, and the last published snapshot stays available.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("floater {id}: non-physical mass {mass_kg} kg at position {position_m} m")]
    NonPhysicalMass {
        id: usize,
        mass_kg: f64,
        position_m: f64,
    },

    #[error("floater {id}: {quantity} became non-finite near position {position_m} m")]
    NonFinite {
        id: usize,
        quantity: &'static str,
        position_m: f64,
    },

    #[error("{quantity} became non-finite at t={time_s} s")]
    NonFiniteState { quantity: &'static str, time_s: f64 },

    #[error("invalid timestep {dt_s} s; dt must be positive and finite")]
    InvalidTimestep { dt_s: f64 },
}

/// Rejected at the boundary before anything reaches the physics core.
///
/// A failed parameter update leaves the running simulation untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("parameter `{name}`: expected {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
    },

    #[error("parameter `{name}`: {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("parameter `{name}`: value must be finite")]
    NonFinite { name: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
