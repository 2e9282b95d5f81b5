//! Actuator target state and the compliant free-drag controller.
//!
//! `HandActuator` owns the transport to the motor bus and the last
//! commanded target. In normal operation the fusion loop is the only
//! writer. While free-drag mode is active the compliance controller's
//! tracking thread is the only writer instead; the two are never started
//! together, and the `compliance_active` flag lets the fusion loop
//! suppress its dispatches for the duration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::ActuatorConfig;
use crate::error::{HandError, HandResult};
use crate::joints::{JointMap, Pose, JOINT_COUNT};
use crate::worker::Worker;

/// Transport to the motor bus. Implementations live outside the core.
pub trait ActuatorTransport: Send {
    fn write_target(&mut self, positions: &Pose) -> HandResult<()>;
    fn read_position(&mut self) -> HandResult<Pose>;
    fn read_velocity(&mut self) -> HandResult<Pose>;
    fn read_current(&mut self) -> HandResult<Pose>;
    fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> HandResult<()>;
    fn set_torque_limit(&mut self, limit: f64) -> HandResult<()>;
}

struct ActuatorInner {
    transport: Box<dyn ActuatorTransport>,
    commanded: Pose,
}

/// Shared handle to the hand's target state.
#[derive(Clone)]
pub struct HandActuator {
    inner: Arc<Mutex<ActuatorInner>>,
    cfg: ActuatorConfig,
    compliance_active: Arc<AtomicBool>,
}

impl HandActuator {
    /// Apply gains and torque limit, then command the neutral open pose.
    pub fn new(mut transport: Box<dyn ActuatorTransport>, cfg: &ActuatorConfig) -> HandResult<Self> {
        transport.set_gains(cfg.kp, cfg.ki, cfg.kd)?;
        transport.set_torque_limit(cfg.current_limit)?;

        let initial = JointMap::new().to_hardware(&[0.0; JOINT_COUNT]);
        transport.write_target(&initial)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(ActuatorInner {
                transport,
                commanded: initial,
            })),
            cfg: cfg.clone(),
            compliance_active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn compliance_active(&self) -> bool {
        self.compliance_active.load(Ordering::Relaxed)
    }

    /// Command a new target pose. Ignored while free-drag mode owns the
    /// actuator, so a stale fusion dispatch cannot fight the drag loop.
    pub fn set_target(&self, pose: &Pose) -> HandResult<()> {
        if self.compliance_active() {
            return Ok(());
        }
        let mut inner = self.lock();
        inner.transport.write_target(pose)?;
        inner.commanded = *pose;
        Ok(())
    }

    pub fn commanded(&self) -> Pose {
        self.lock().commanded
    }

    pub fn read_position(&self) -> HandResult<Pose> {
        self.lock().transport.read_position()
    }

    pub fn read_velocity(&self) -> HandResult<Pose> {
        self.lock().transport.read_velocity()
    }

    pub fn read_current(&self) -> HandResult<Pose> {
        self.lock().transport.read_current()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ActuatorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Tuning for the free-drag tracking loop.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceSettings {
    /// Per-joint hysteresis band (radians); smaller moves hold the target.
    pub threshold: f64,
    /// Extra margin over the threshold before the fast gain engages.
    pub engage_margin: f64,
    /// Step multiplier when the hand is being moved quickly.
    pub fast_gain: f64,
    /// Loop period.
    pub period: Duration,
}

impl Default for ComplianceSettings {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            engage_margin: 0.05,
            fast_gain: 5.0,
            period: Duration::from_millis(5),
        }
    }
}

/// Free-drag mode: torque drops to a safe fraction so a human can pose
/// the hand, while a tracking loop keeps the commanded target following
/// the measured position.
pub struct ComplianceController {
    actuator: HandActuator,
    settings: ComplianceSettings,
    worker: Option<Worker>,
}

impl ComplianceController {
    pub fn new(actuator: HandActuator, settings: ComplianceSettings) -> Self {
        Self {
            actuator,
            settings,
            worker: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Lower the torque limit and start the tracking loop.
    pub fn enable(&mut self) -> HandResult<()> {
        if self.worker.is_some() {
            return Err(HandError::Actuator("free-drag mode already enabled".into()));
        }

        let cfg = self.actuator.cfg.clone();
        {
            let mut inner = self.actuator.lock();
            inner.transport.set_torque_limit(cfg.free_drag_current_limit)?;
        }
        self.actuator.compliance_active.store(true, Ordering::Relaxed);
        info!(
            "Free-drag mode enabled (torque limit {} -> {})",
            cfg.current_limit, cfg.free_drag_current_limit
        );

        let actuator = self.actuator.clone();
        let settings = self.settings;
        self.worker = Some(Worker::spawn("free-drag", move |run| {
            let mut dt = 0.0f64;
            while run.is_set() {
                let started = Instant::now();
                if let Err(e) = track_once(&actuator, &settings, dt) {
                    warn!("Free-drag cycle failed: {}", e);
                }
                thread::sleep(settings.period);
                dt = started.elapsed().as_secs_f64();
            }
        }));
        Ok(())
    }

    /// Stop tracking, restore gains and torque limit, and pin the target
    /// to the measured position so nothing snaps back.
    pub fn disable(&mut self) -> HandResult<()> {
        let Some(mut worker) = self.worker.take() else {
            return Err(HandError::Actuator("free-drag mode not enabled".into()));
        };
        worker.join(Duration::from_secs(1));

        let cfg = self.actuator.cfg.clone();
        let mut inner = self.actuator.lock();
        inner.transport.set_torque_limit(cfg.current_limit)?;
        inner.transport.set_gains(cfg.kp, cfg.ki, cfg.kd)?;

        let measured = inner.transport.read_position()?;
        inner.transport.write_target(&measured)?;
        inner.commanded = measured;
        drop(inner);

        self.actuator.compliance_active.store(false, Ordering::Relaxed);
        info!("Free-drag mode disabled, torque limit restored");
        Ok(())
    }
}

/// One tracking cycle: follow manual displacement with an asymmetric gain
/// and per-joint hysteresis against sensor chatter.
fn track_once(actuator: &HandActuator, s: &ComplianceSettings, dt: f64) -> HandResult<()> {
    let mut inner = actuator.lock();
    let measured = inner.transport.read_position()?;
    let velocity = inner.transport.read_velocity()?;
    let commanded = inner.commanded;

    let mut updated = commanded;
    for i in 0..JOINT_COUNT {
        let error = measured[i] - commanded[i];
        let step = if error.abs() > s.threshold + s.engage_margin {
            velocity[i] * dt * s.fast_gain
        } else {
            velocity[i] * dt
        };
        let candidate = measured[i] + step;
        if (candidate - commanded[i]).abs() > s.threshold {
            updated[i] = candidate;
        }
    }

    inner.transport.write_target(&updated)?;
    inner.commanded = updated;
    Ok(())
}

/// In-memory transport for running the pipeline without hardware: the
/// measured position is always the last commanded target.
#[derive(Default)]
pub struct LoopbackTransport {
    target: Pose,
    torque_limit: f64,
}

impl ActuatorTransport for LoopbackTransport {
    fn write_target(&mut self, positions: &Pose) -> HandResult<()> {
        self.target = *positions;
        Ok(())
    }

    fn read_position(&mut self) -> HandResult<Pose> {
        Ok(self.target)
    }

    fn read_velocity(&mut self) -> HandResult<Pose> {
        Ok([0.0; JOINT_COUNT])
    }

    fn read_current(&mut self) -> HandResult<Pose> {
        Ok([0.0; JOINT_COUNT])
    }

    fn set_gains(&mut self, _kp: f64, _ki: f64, _kd: f64) -> HandResult<()> {
        Ok(())
    }

    fn set_torque_limit(&mut self, limit: f64) -> HandResult<()> {
        self.torque_limit = limit;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Debug, Default)]
    pub struct MockState {
        pub position: Pose,
        pub velocity: Pose,
        pub current: Pose,
        pub torque_limit: f64,
        pub gains: (f64, f64, f64),
        pub written_targets: Vec<Pose>,
    }

    /// Shared-state mock so tests can move the "hand" while a controller
    /// thread is running.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub state: Arc<Mutex<MockState>>,
    }

    impl ActuatorTransport for MockTransport {
        fn write_target(&mut self, positions: &Pose) -> HandResult<()> {
            let mut s = self.state.lock().unwrap();
            s.written_targets.push(*positions);
            Ok(())
        }

        fn read_position(&mut self) -> HandResult<Pose> {
            Ok(self.state.lock().unwrap().position)
        }

        fn read_velocity(&mut self) -> HandResult<Pose> {
            Ok(self.state.lock().unwrap().velocity)
        }

        fn read_current(&mut self) -> HandResult<Pose> {
            Ok(self.state.lock().unwrap().current)
        }

        fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> HandResult<()> {
            self.state.lock().unwrap().gains = (kp, ki, kd);
            Ok(())
        }

        fn set_torque_limit(&mut self, limit: f64) -> HandResult<()> {
            self.state.lock().unwrap().torque_limit = limit;
            Ok(())
        }
    }
}
