use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use validator::Validate;

use crate::simulation::{
    ColumnConfig, DrivetrainConfig, EnvironmentConfig, FloaterConfig, PneumaticConfig,
};

/// Full service configuration: `config/default.toml` overlaid with
/// `KPP__`-prefixed environment variables (`KPP__SERVER__PORT=9000`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub engine: EngineConfig,
    #[validate(nested)]
    pub physics: PhysicsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            enable_cors: true,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Loop pacing and history retention.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed physics timestep in seconds; also the wall-clock cadence of the
    /// realtime loop.
    #[validate(range(min = 0.001, max = 1.0))]
    pub dt_s: f64,
    /// Start the realtime loop on boot.
    pub autostart: bool,
    /// Snapshots retained in the in-memory history ring.
    #[validate(range(min = 100, max = 1_000_000))]
    pub history_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt_s: 0.033,
            autostart: true,
            history_capacity: 20_000,
        }
    }
}

/// Hypothesis toggles exposed to the dashboard, from
/// `[physics.hypotheses]`. All default to off / conservative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HypothesesConfig {
    /// H1: nanobubble fraction on the descending side.
    #[validate(range(min = 0.0, max = 1.0))]
    pub nanobubble_frac: f64,
    /// H2: thermal-assist blend between adiabatic (0) and isothermal (1)
    /// injection work.
    #[validate(range(min = 0.0, max = 1.0))]
    pub thermal_coeff: f64,
    /// H3: pulse-and-coast clutch schedule.
    pub pulse_enabled: bool,
    #[validate(range(min = 0.1, max = 600.0))]
    pub pulse_on_s: f64,
    #[validate(range(min = 0.1, max = 600.0))]
    pub pulse_off_s: f64,
}

impl Default for HypothesesConfig {
    fn default() -> Self {
        Self {
            nanobubble_frac: 0.0,
            thermal_coeff: 0.0,
            pulse_enabled: false,
            pulse_on_s: 3.0,
            pulse_off_s: 2.0,
        }
    }
}

/// Everything the physics core needs, grouped the way the machine is built.
///
/// This is also the unit of runtime tuning: parameter patches from the API
/// are written into a copy of this struct, so `GET /parameters` can return
/// it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PhysicsConfig {
    #[validate(range(min = 1, max = 64))]
    pub num_floaters: usize,
    #[validate(nested)]
    pub floater: FloaterConfig,
    #[validate(nested)]
    pub column: ColumnConfig,
    #[validate(nested)]
    pub environment: EnvironmentConfig,
    #[validate(nested)]
    pub pneumatics: PneumaticConfig,
    #[validate(nested)]
    pub drivetrain: DrivetrainConfig,
    #[validate(nested)]
    pub hypotheses: HypothesesConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            num_floaters: 8,
            floater: FloaterConfig::default(),
            column: ColumnConfig::default(),
            environment: EnvironmentConfig::default(),
            pneumatics: PneumaticConfig::default(),
            drivetrain: DrivetrainConfig::default(),
            hypotheses: HypothesesConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("KPP__").split("__"));
        let cfg: Config = figment.extract().context("failed to read configuration")?;
        cfg.validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.physics.num_floaters, 8);
        assert!(cfg.engine.dt_s > 0.0);
    }

    #[test]
    fn test_socket_addr_parses() {
        let server = ServerConfig::default();
        let addr = server.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_bad_socket_addr_is_an_error() {
        let server = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(server.socket_addr().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_physics() {
        let mut cfg = Config::default();
        cfg.physics.num_floaters = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.physics.hypotheses.thermal_coeff = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.engine.dt_s = 0.0;
        assert!(cfg.validate().is_err());
    }
}
