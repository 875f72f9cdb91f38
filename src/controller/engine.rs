//! Simulation engine
//!
//! Owns the physics core and the realtime loop. All mutation goes through
//! one mutex around [`SimCore`]; at most one step executes at a time. After
//! every step the engine publishes an immutable `Arc<StepSnapshot>` through
//! a watch channel, so readers (HTTP handlers, SSE, WebSocket) never touch
//! the core and never see a torn snapshot.
//!
//! ## Step ordering
//!
//! 1. distribute the previous step's generator reaction across the arena,
//! 2. integrate every floater (fail fast on a physics violation),
//! 3. run the compressor, then the bottom/top sensor zones (inject / vent),
//! 4. sum chain forces into torque, advance the clutch, update flywheel and
//!    generator power,
//! 5. advance time, book energy, compute efficiency,
//! 6. append the snapshot to the history ring and publish it.
//!
//! ## Lifecycle
//!
//! `start`/`stop` are idempotent; the loop task is cancelled only between
//! steps, so the in-flight step always completes. A [`PhysicsError`] halts
//! the loop, flips the run state to `Errored` and leaves the last good
//! snapshot retrievable. `reset` rebuilds the core with the current
//! parameters under a fresh run id.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use strum::Display;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{EngineConfig, PhysicsConfig};
use crate::error::{ConfigurationError, PhysicsError};
use crate::simulation::{
    build_arena, Drivetrain, Environment, Floater, InjectionOutcome, PneumaticSystem,
    PulseSchedule,
};

use super::energy::{instantaneous_efficiency, EnergyLedger};
use super::params::ParameterPatch;
use super::snapshot::{FloaterForces, StepSnapshot, TorqueComponents};

/// Lifecycle of the realtime loop.
#[derive(Debug, Clone, PartialEq, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Stopped,
    Errored(String),
}

/// Deterministic physics state. Everything in here is advanced by
/// [`SimCore::step`] and nothing else.
struct SimCore {
    params: PhysicsConfig,
    environment: Environment,
    floaters: Vec<Floater>,
    pneumatics: PneumaticSystem,
    drivetrain: Drivetrain,
    ledger: EnergyLedger,
    time_s: f64,
    step_count: u64,
    run_id: Uuid,
    log: VecDeque<Arc<StepSnapshot>>,
    log_capacity: usize,
}

impl SimCore {
    fn new(params: PhysicsConfig, log_capacity: usize) -> Self {
        let mut environment = Environment::new(&params.environment);
        environment.set_nanobubbles(params.hypotheses.nanobubble_frac);
        let floaters = build_arena(&params.floater, params.num_floaters, params.column.height_m);
        let pneumatics = PneumaticSystem::new(&params.pneumatics, params.hypotheses.thermal_coeff);
        let drivetrain = Drivetrain::new(
            &params.drivetrain,
            PulseSchedule {
                enabled: params.hypotheses.pulse_enabled,
                on_s: params.hypotheses.pulse_on_s,
                off_s: params.hypotheses.pulse_off_s,
            },
        );
        Self {
            params,
            environment,
            floaters,
            pneumatics,
            drivetrain,
            ledger: EnergyLedger::new(),
            time_s: 0.0,
            step_count: 0,
            run_id: Uuid::new_v4(),
            log: VecDeque::new(),
            log_capacity,
        }
    }

    fn initial_snapshot(&self) -> StepSnapshot {
        StepSnapshot::initial(self.floaters.len(), self.pneumatics.tank_pressure_pa())
    }

    fn step(&mut self, dt_s: f64) -> Result<Arc<StepSnapshot>, PhysicsError> {
        let loop_length = self.params.column.height_m;

        // Generator reaction from the previous step, split evenly across the
        // arena and mapped back into each floater's vertical frame. Zero
        // while coasting, which is what lets the chain speed up in H3.
        let count = self.floaters.len().max(1) as f64;
        let reaction_n = self.drivetrain.generator_torque_nm() / self.drivetrain.wheel_radius_m();
        for floater in &mut self.floaters {
            floater.pulse_force_n = -floater.chain_sign() * reaction_n / count;
        }

        let mut force_rows = Vec::with_capacity(self.floaters.len());
        for floater in &mut self.floaters {
            match floater.update(dt_s, &self.environment, loop_length) {
                Ok(breakdown) => force_rows.push(breakdown),
                Err(e) => {
                    error!(error = %e, time_s = self.time_s, "floater integration failed");
                    return Err(e);
                }
            }
        }

        // Pneumatics: compressor first so the step's recharge is available
        // to the sensor zones, then injection at the bottom and venting at
        // the top. Skips are soft: the floater simply stays flooded.
        self.pneumatics.recharge(dt_s);
        let bottom_zone = self.params.column.bottom_zone_m;
        let vent_threshold = loop_length - self.params.column.top_zone_m;
        let mut injection_work_j = 0.0;
        for floater in &mut self.floaters {
            if !floater.filled_with_air && floater.position_m <= bottom_zone {
                let depth_m = loop_length - floater.position_m;
                if let InjectionOutcome::Injected { work_j } =
                    self.pneumatics.inject_air(floater, &self.environment, depth_m)
                {
                    injection_work_j += work_j;
                }
            } else if floater.filled_with_air && floater.position_m >= vent_threshold {
                self.pneumatics.vent_air(floater);
            }
        }

        // Drivetrain: chain-frame drive forces into sprocket torque, then
        // the H3 clutch, flywheel and generator.
        let chain_forces = self
            .floaters
            .iter()
            .map(|f| f.chain_drive_force_n(&self.environment))
            .collect_vec();
        let torque = self.drivetrain.torque_from_forces(&chain_forces);
        self.drivetrain.advance_clutch(dt_s, self.time_s);

        let chain_speed = self
            .floaters
            .iter()
            .map(|f| f.chain_sign() * f.velocity_m_s)
            .sum::<f64>()
            / count;
        let chain_omega = chain_speed / self.drivetrain.wheel_radius_m();
        self.drivetrain.update_flywheel(chain_omega, dt_s);
        let generator_omega = self.drivetrain.generator_speed_rad_s(chain_omega);
        let power = self.drivetrain.update_power(generator_omega);

        self.time_s += dt_s;
        self.step_count += 1;

        let compressor_power_w = injection_work_j / dt_s;
        let efficiency = instantaneous_efficiency(power, compressor_power_w);
        self.ledger.record_step(power, dt_s);

        let drag_torque = self
            .floaters
            .iter()
            .zip(&force_rows)
            .map(|(f, row)| f.chain_sign() * row.drag_n)
            .sum::<f64>()
            * self.drivetrain.wheel_radius_m();

        let snapshot = StepSnapshot {
            time: self.time_s,
            step: self.step_count,
            wall_time: Utc::now(),
            torque,
            power,
            efficiency,
            torque_components: TorqueComponents {
                buoyant: torque,
                drag: drag_torque,
                generator: -self.drivetrain.generator_torque_nm(),
            },
            floaters: force_rows
                .iter()
                .map(|row| FloaterForces {
                    buoyancy: row.buoyancy_n,
                    drag: row.drag_n,
                    net_force: row.net_n,
                    pulse_force: row.pulse_n,
                })
                .collect(),
            clutch_engaged: self.drivetrain.clutch_engaged(),
            air_tank_pressure: self.pneumatics.tank_pressure_pa(),
            chain_speed,
            flywheel_omega: self.drivetrain.flywheel_omega_rad_s(),
            compressor_energy: self.pneumatics.compressor_energy_j(),
            generator_energy: self.ledger.generator_energy_j(),
            eroi: self.ledger.eroi(self.pneumatics.compressor_energy_j()),
            injection_skips: self.pneumatics.injection_skips(),
        };

        if !snapshot.is_finite() {
            return Err(PhysicsError::NonFiniteState {
                quantity: "aggregate state",
                time_s: self.time_s,
            });
        }

        let snapshot = Arc::new(snapshot);
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn apply_patch(&mut self, patch: &ParameterPatch) {
        patch.apply(&mut self.params);
        self.environment
            .set_nanobubbles(self.params.hypotheses.nanobubble_frac);
        self.pneumatics
            .set_target_pressure(self.params.pneumatics.target_pressure_pa);
        self.pneumatics
            .set_thermal_coeff(self.params.hypotheses.thermal_coeff);
        self.drivetrain
            .set_pulse_enabled(self.params.hypotheses.pulse_enabled);
        self.drivetrain.set_pulse_durations(
            self.params.hypotheses.pulse_on_s,
            self.params.hypotheses.pulse_off_s,
        );
        self.drivetrain
            .set_flywheel_inertia(self.params.drivetrain.flywheel_inertia_kg_m2);
        if patch.resizes_arena() && self.params.num_floaters != self.floaters.len() {
            self.floaters = build_arena(
                &self.params.floater,
                self.params.num_floaters,
                self.params.column.height_m,
            );
            info!(count = self.floaters.len(), "floater arena rebuilt");
        }
    }

    fn reset(&mut self) {
        let params = self.params.clone();
        *self = SimCore::new(params, self.log_capacity);
    }
}

struct LoopHandle {
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Thread-safe engine handle shared between the realtime loop and the API.
pub struct SimulationEngine {
    core: Mutex<SimCore>,
    snapshot_tx: watch::Sender<Arc<StepSnapshot>>,
    run: AsyncMutex<LoopHandle>,
    state: RwLock<RunState>,
    dt_s: f64,
}

impl SimulationEngine {
    pub fn new(physics: PhysicsConfig, engine_cfg: &EngineConfig) -> Arc<Self> {
        let core = SimCore::new(physics, engine_cfg.history_capacity);
        let (snapshot_tx, _) = watch::channel(Arc::new(core.initial_snapshot()));
        info!(
            run_id = %core.run_id,
            floaters = core.floaters.len(),
            dt_s = engine_cfg.dt_s,
            "simulation engine initialized"
        );
        Arc::new(Self {
            core: Mutex::new(core),
            snapshot_tx,
            run: AsyncMutex::new(LoopHandle {
                task: None,
                cancel: CancellationToken::new(),
            }),
            state: RwLock::new(RunState::Idle),
            dt_s: engine_cfg.dt_s,
        })
    }

    /// Configured fixed timestep of the realtime loop, seconds.
    pub fn dt_s(&self) -> f64 {
        self.dt_s
    }

    /// Spawn the realtime loop. Calling this while the loop is already
    /// running is a logged no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut run = self.run.lock().await;
        if let Some(task) = run.task.as_ref() {
            if !task.is_finished() {
                info!("simulation loop already running; start ignored");
                return;
            }
            run.task = None;
        }
        let cancel = CancellationToken::new();
        run.cancel = cancel.clone();
        *self.state.write() = RunState::Running;
        run.task = Some(tokio::spawn(Arc::clone(self).run_loop(cancel)));
        info!(dt_s = self.dt_s, "simulation loop started");
    }

    /// Cancel the realtime loop and wait for the in-flight step to finish.
    /// Calling this while stopped is a logged no-op.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(task) = run.task.take() else {
            info!("simulation loop not running; stop ignored");
            return;
        };
        run.cancel.cancel();
        if let Err(e) = task.await {
            error!(error = %e, "simulation loop task failed");
        }
        let mut state = self.state.write();
        if *state == RunState::Running {
            *state = RunState::Stopped;
        }
        info!("simulation loop stopped");
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(self.dt_s));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.step_once() {
                        let halted_at = self.core.lock().time_s;
                        error!(error = %e, time_s = halted_at, "physics step failed; halting loop");
                        *self.state.write() = RunState::Errored(e.to_string());
                        break;
                    }
                }
            }
        }
        debug!("simulation loop exited");
    }

    /// Advance one step at the configured timestep and publish the result.
    pub fn step_once(&self) -> Result<Arc<StepSnapshot>, PhysicsError> {
        self.step_with(self.dt_s)
    }

    /// Advance one step at an explicit timestep. `dt_s` must be positive and
    /// finite; the HTTP layer validates user-supplied values before calling.
    pub fn step_with(&self, dt_s: f64) -> Result<Arc<StepSnapshot>, PhysicsError> {
        let mut core = self.core.lock();
        let snapshot = core.step(dt_s)?;
        // Published while still holding the core, so concurrent steppers
        // cannot leave the watch cell behind the log tail.
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Synchronous batch run, stepping `total_time_s / dt_s` times. Fails
    /// fast on the first physics violation. Intended for offline runs and
    /// tests; it shares the core with the realtime loop, so each step still
    /// publishes. `dt_s` must be positive and finite.
    pub fn simulate(&self, total_time_s: f64, dt_s: f64) -> Result<(), PhysicsError> {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return Err(PhysicsError::InvalidTimestep { dt_s });
        }
        let steps = (total_time_s / dt_s).round() as u64;
        for _ in 0..steps {
            self.step_with(dt_s)?;
        }
        Ok(())
    }

    /// Rebuild the core with the current parameters under a fresh run id.
    /// Clears time, energy books and history; recovers an `Errored` engine.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        core.reset();
        self.snapshot_tx
            .send_replace(Arc::new(core.initial_snapshot()));
        info!(run_id = %core.run_id, "simulation reset");
        drop(core);
        let mut state = self.state.write();
        if matches!(*state, RunState::Errored(_)) {
            *state = RunState::Idle;
        }
    }

    /// Validate and apply a parameter patch atomically. On any validation
    /// failure nothing is applied and the physics state is untouched.
    pub fn update_parameters(&self, patch: &ParameterPatch) -> Result<(), ConfigurationError> {
        patch.validate()?;
        if patch.is_empty() {
            return Ok(());
        }
        let mut core = self.core.lock();
        core.apply_patch(patch);
        info!(params = ?patch.names(), "parameters updated");
        Ok(())
    }

    pub fn current_parameters(&self) -> PhysicsConfig {
        self.core.lock().params.clone()
    }

    pub fn latest_snapshot(&self) -> Arc<StepSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch receiver for push-style streaming; each published step replaces
    /// the previous value.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StepSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Most recent `limit` snapshots (all retained history when `None`),
    /// oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<Arc<StepSnapshot>> {
        let core = self.core.lock();
        let take = limit.unwrap_or(core.log.len()).min(core.log.len());
        core.log.iter().skip(core.log.len() - take).cloned().collect()
    }

    pub fn run_state(&self) -> RunState {
        self.state.read().clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.core.lock().run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;

    fn engine_with(physics: PhysicsConfig, dt_s: f64) -> Arc<SimulationEngine> {
        let engine_cfg = EngineConfig {
            dt_s,
            autostart: false,
            history_capacity: 50_000,
        };
        SimulationEngine::new(physics, &engine_cfg)
    }

    fn four_floater_engine() -> Arc<SimulationEngine> {
        let physics = PhysicsConfig {
            num_floaters: 4,
            ..PhysicsConfig::default()
        };
        engine_with(physics, 0.1)
    }

    #[test]
    fn test_ten_second_run_logs_one_entry_per_step() {
        let engine = four_floater_engine();
        engine.simulate(10.0, 0.1).unwrap();

        let log = engine.history(None);
        assert_eq!(log.len(), 100);
        assert!((log.last().unwrap().time - 10.0).abs() < 1e-9);
        for snap in &log {
            assert!(snap.is_finite(), "non-finite snapshot at t={}", snap.time);
        }
    }

    #[test]
    fn test_log_times_are_strictly_increasing() {
        let engine = four_floater_engine();
        engine.simulate(5.0, 0.1).unwrap();
        let log = engine.history(None);
        for pair in log.windows(2) {
            assert!(pair[1].time > pair[0].time);
            assert_eq!(pair[1].step, pair[0].step + 1);
        }
    }

    #[test]
    fn test_compressor_energy_is_monotone_over_a_run() {
        let engine = four_floater_engine();
        engine.simulate(20.0, 0.1).unwrap();
        let log = engine.history(None);
        let mut last = 0.0;
        for snap in &log {
            assert!(snap.compressor_energy >= last);
            last = snap.compressor_energy;
        }
        // Floaters complete at least one bottom passage in 20 s, so some
        // compression work must have been booked.
        assert!(last > 0.0);
    }

    #[test]
    fn test_efficiency_stays_in_unit_interval() {
        let engine = four_floater_engine();
        engine.simulate(20.0, 0.1).unwrap();
        for snap in &engine.history(None) {
            assert!(
                (0.0..=1.0).contains(&snap.efficiency),
                "efficiency {} out of bounds at t={}",
                snap.efficiency,
                snap.time
            );
        }
    }

    #[test]
    fn test_rejected_patch_leaves_state_unchanged() {
        let engine = four_floater_engine();
        engine.simulate(1.0, 0.1).unwrap();
        let before = engine.latest_snapshot();
        let params_before = engine.current_parameters();

        let patch: ParameterPatch =
            serde_json::from_value(json!({"num_floaters": -5})).unwrap();
        let err = engine.update_parameters(&patch).unwrap_err();
        assert!(matches!(err, ConfigurationError::OutOfRange { .. }));

        assert_eq!(*engine.latest_snapshot(), *before);
        assert_eq!(
            engine.current_parameters().num_floaters,
            params_before.num_floaters
        );
    }

    #[test]
    fn test_num_floaters_patch_rebuilds_the_arena() {
        let engine = four_floater_engine();
        let patch: ParameterPatch =
            serde_json::from_value(json!({"num_floaters": 6})).unwrap();
        engine.update_parameters(&patch).unwrap();
        let snap = engine.step_once().unwrap();
        assert_eq!(snap.floaters.len(), 6);
    }

    #[test]
    fn test_hypothesis_patch_reaches_the_physics() {
        let engine = four_floater_engine();
        let patch: ParameterPatch = serde_json::from_value(json!({
            "nanobubble_frac": 0.3,
            "thermal_coeff": 1.0,
        }))
        .unwrap();
        engine.update_parameters(&patch).unwrap();
        let params = engine.current_parameters();
        assert_eq!(params.hypotheses.nanobubble_frac, 0.3);
        assert_eq!(params.hypotheses.thermal_coeff, 1.0);
        engine.simulate(5.0, 0.1).unwrap();
        assert!(engine.latest_snapshot().is_finite());
    }

    #[test]
    fn test_pulse_mode_alternates_and_coasting_produces_nothing() {
        let physics = PhysicsConfig {
            num_floaters: 4,
            hypotheses: crate::config::HypothesesConfig {
                pulse_enabled: true,
                pulse_on_s: 1.0,
                pulse_off_s: 1.0,
                ..Default::default()
            },
            ..PhysicsConfig::default()
        };
        let engine = engine_with(physics, 0.05);
        engine.simulate(6.0, 0.05).unwrap();

        let log = engine.history(None);
        let engaged = log.iter().filter(|s| s.clutch_engaged).count();
        let coasting = log.iter().filter(|s| !s.clutch_engaged).count();
        assert!(engaged > 0 && coasting > 0, "clutch never alternated");
        for snap in log.iter().filter(|s| !s.clutch_engaged) {
            assert_eq!(snap.power, 0.0);
            assert_eq!(snap.torque_components.generator, 0.0);
        }
    }

    #[test]
    fn test_injection_skips_are_counted_when_tank_is_starved() {
        let mut physics = PhysicsConfig {
            num_floaters: 4,
            ..PhysicsConfig::default()
        };
        physics.pneumatics.initial_pressure_pa = 150_000.0;
        physics.pneumatics.compressor_power_limit_w = 100.0;
        let engine = engine_with(physics, 0.1);
        engine.simulate(20.0, 0.1).unwrap();

        let snap = engine.latest_snapshot();
        assert!(snap.injection_skips > 0, "starved tank never skipped");
        assert_eq!(snap.compressor_energy, 0.0);
    }

    #[test]
    fn test_reset_clears_the_run_but_keeps_parameters() {
        let engine = four_floater_engine();
        let patch: ParameterPatch =
            serde_json::from_value(json!({"nanobubble_frac": 0.4})).unwrap();
        engine.update_parameters(&patch).unwrap();
        engine.simulate(2.0, 0.1).unwrap();
        let old_run = engine.run_id();

        engine.reset();
        assert_ne!(engine.run_id(), old_run);
        assert!(engine.history(None).is_empty());
        let snap = engine.latest_snapshot();
        assert_eq!(snap.time, 0.0);
        assert_eq!(snap.step, 0);
        assert_eq!(engine.current_parameters().hypotheses.nanobubble_frac, 0.4);
    }

    #[test]
    fn test_history_limit_returns_most_recent() {
        let engine = four_floater_engine();
        engine.simulate(5.0, 0.1).unwrap();
        let tail = engine.history(Some(10));
        assert_eq!(tail.len(), 10);
        assert!((tail.last().unwrap().time - 5.0).abs() < 1e-9);
        assert!((tail.first().unwrap().time - 4.1).abs() < 1e-9);
    }

    #[test]
    fn test_generator_energy_accumulates() {
        let engine = four_floater_engine();
        engine.simulate(15.0, 0.1).unwrap();
        let snap = engine.latest_snapshot();
        assert!(snap.generator_energy > 0.0, "no electrical output in 15 s");
        assert!(snap.eroi >= 0.0);
    }

    #[test]
    fn test_simulate_rejects_non_positive_dt() {
        let engine = four_floater_engine();
        for dt in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.simulate(1.0, dt),
                Err(PhysicsError::InvalidTimestep { .. })
            ));
        }
        assert!(engine.history(None).is_empty(), "guarded run still stepped");
    }

    #[test]
    fn test_failed_step_publishes_nothing() {
        let physics = PhysicsConfig {
            num_floaters: 2,
            floater: crate::simulation::FloaterConfig {
                mass_empty_kg: 0.0,
                ..Default::default()
            },
            ..PhysicsConfig::default()
        };
        let engine = engine_with(physics, 0.1);

        let err = engine.step_once().unwrap_err();
        assert!(matches!(err, PhysicsError::NonPhysicalMass { id: 0, .. }));

        // Readers keep seeing the pre-step state; nothing reaches the log.
        assert_eq!(engine.latest_snapshot().step, 0);
        assert!(engine.history(None).is_empty());
    }
}
