//! # Physics Simulation Module
//!
//! The mechanical core of the kinetic power plant: a closed chain of floaters
//! in a water column, driven by buoyancy on the ascending run and ballast
//! weight on the descending run, geared into a generator.
//!
//! ## Components
//!
//! - **Environment**: water density, gravity and drag, including the
//!   nanobubble hypothesis (H1) that lightens the descending side
//! - **Floater**: per-vessel force balance and forward-Euler kinematics on
//!   the loop coordinate
//! - **Pneumatics**: air tank, compressor recharge and injection work with
//!   the thermal-assist blend (H2)
//! - **Drivetrain**: torque aggregation, pulse-and-coast clutch (H3),
//!   optional flywheel and generator output
//!
//! Everything here is synchronous and deterministic: the controller owns the
//! step ordering and the async plumbing.
//!
//! ## Usage
//!
//! ```rust
//! use kpp_simulator::simulation::{build_arena, Environment, FloaterConfig};
//!
//! let env = Environment::default();
//! let mut arena = build_arena(&FloaterConfig::default(), 8, 10.0);
//! for floater in &mut arena {
//!     floater.update(0.033, &env, 10.0).unwrap();
//! }
//! ```

pub mod drivetrain;
pub mod environment;
pub mod floater;
pub mod pneumatics;

pub use drivetrain::{ClutchState, Drivetrain, DrivetrainConfig, PulseSchedule};
pub use environment::{Environment, EnvironmentConfig, BASE_DRAG_COEFFICIENT};
pub use floater::{build_arena, ColumnConfig, Floater, FloaterConfig, ForceBreakdown};
pub use pneumatics::{
    InjectionOutcome, PneumaticConfig, PneumaticSystem, ADIABATIC_INDEX_AIR,
    ATMOSPHERIC_PRESSURE_PA,
};
