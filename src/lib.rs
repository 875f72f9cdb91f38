//! # Kinetic Power Plant Simulator
//!
//! A web-served physics simulation of a buoyancy-driven power plant: a chain
//! of floaters in a water column, air-injected at the bottom and vented at
//! the top, geared into a generator. Three speculative enhancement
//! hypotheses (nanobubbles, thermal-assisted injection, pulse-and-coast
//! clutch control) can be toggled at runtime to study their effect on the
//! energy balance.
//!
//! The crate splits into:
//!
//! - [`simulation`]: deterministic physics components
//! - [`controller`]: the stepping engine, snapshot log and parameter schema
//! - [`api`]: the axum HTTP surface with SSE/WebSocket streaming
//! - [`config`] / [`telemetry`] / [`error`]: service plumbing

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod simulation;
pub mod telemetry;
