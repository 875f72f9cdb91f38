//! Runtime parameter schema
//!
//! The dashboard tunes a small set of named parameters while the simulation
//! runs. Every patch is validated against the declarative schema below
//! before anything is touched: unknown names, wrong JSON types and
//! out-of-range values are all rejected with a [`ConfigurationError`] and
//! the running state is left exactly as it was. Values are never clamped.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PhysicsConfig;
use crate::error::ConfigurationError;

/// Allowed type and range for one tunable parameter.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Float { min: f64, max: f64 },
    Int { min: i64, max: i64 },
    Bool,
}

/// Every parameter the control surface accepts, with its bounds.
pub static SCHEMA: Lazy<BTreeMap<&'static str, ParamKind>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "air_pressure",
            ParamKind::Float {
                min: 120_000.0,
                max: 2_000_000.0,
            },
        ),
        ("nanobubble_frac", ParamKind::Float { min: 0.0, max: 1.0 }),
        ("thermal_coeff", ParamKind::Float { min: 0.0, max: 1.0 }),
        ("num_floaters", ParamKind::Int { min: 1, max: 64 }),
        ("pulse_enabled", ParamKind::Bool),
        (
            "pulse_on_s",
            ParamKind::Float {
                min: 0.1,
                max: 600.0,
            },
        ),
        (
            "pulse_off_s",
            ParamKind::Float {
                min: 0.1,
                max: 600.0,
            },
        ),
        (
            "flywheel_inertia",
            ParamKind::Float {
                min: 0.0,
                max: 10_000.0,
            },
        ),
    ])
});

impl ParamKind {
    fn check(&self, name: &str, value: &Value) -> Result<(), ConfigurationError> {
        match *self {
            ParamKind::Bool => {
                value.as_bool().ok_or_else(|| ConfigurationError::WrongType {
                    name: name.to_string(),
                    expected: "a boolean",
                })?;
            }
            ParamKind::Int { min, max } => {
                let v = value.as_i64().ok_or_else(|| ConfigurationError::WrongType {
                    name: name.to_string(),
                    expected: "an integer",
                })?;
                if v < min || v > max {
                    return Err(ConfigurationError::OutOfRange {
                        name: name.to_string(),
                        value: v as f64,
                        min: min as f64,
                        max: max as f64,
                    });
                }
            }
            ParamKind::Float { min, max } => {
                let v = value.as_f64().ok_or_else(|| ConfigurationError::WrongType {
                    name: name.to_string(),
                    expected: "a number",
                })?;
                if !v.is_finite() {
                    return Err(ConfigurationError::NonFinite {
                        name: name.to_string(),
                    });
                }
                if v < min || v > max {
                    return Err(ConfigurationError::OutOfRange {
                        name: name.to_string(),
                        value: v,
                        min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A set of named parameter changes, applied all-or-nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPatch(pub BTreeMap<String, Value>);

impl ParameterPatch {
    /// Check every entry against the schema without touching any state.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in &self.0 {
            let kind = SCHEMA
                .get(name.as_str())
                .ok_or_else(|| ConfigurationError::UnknownParameter(name.clone()))?;
            kind.check(name, value)?;
        }
        Ok(())
    }

    /// Write the validated values into the typed configuration. Callers must
    /// run [`validate`](Self::validate) first; entries that fail to coerce
    /// are skipped rather than applied half-way.
    pub fn apply(&self, cfg: &mut PhysicsConfig) {
        for (name, value) in &self.0 {
            match name.as_str() {
                "air_pressure" => {
                    if let Some(v) = value.as_f64() {
                        cfg.pneumatics.target_pressure_pa = v;
                    }
                }
                "nanobubble_frac" => {
                    if let Some(v) = value.as_f64() {
                        cfg.hypotheses.nanobubble_frac = v;
                    }
                }
                "thermal_coeff" => {
                    if let Some(v) = value.as_f64() {
                        cfg.hypotheses.thermal_coeff = v;
                    }
                }
                "num_floaters" => {
                    if let Some(v) = value.as_i64() {
                        cfg.num_floaters = v as usize;
                    }
                }
                "pulse_enabled" => {
                    if let Some(v) = value.as_bool() {
                        cfg.hypotheses.pulse_enabled = v;
                    }
                }
                "pulse_on_s" => {
                    if let Some(v) = value.as_f64() {
                        cfg.hypotheses.pulse_on_s = v;
                    }
                }
                "pulse_off_s" => {
                    if let Some(v) = value.as_f64() {
                        cfg.hypotheses.pulse_off_s = v;
                    }
                }
                "flywheel_inertia" => {
                    if let Some(v) = value.as_f64() {
                        cfg.drivetrain.flywheel_inertia_kg_m2 = v;
                    }
                }
                _ => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// True when the patch changes the floater count, which forces an arena
    /// rebuild.
    pub fn resizes_arena(&self) -> bool {
        self.0.contains_key("num_floaters")
    }
}
