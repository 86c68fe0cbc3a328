//! # Simulated drivetrain
//!
//! A kinematic stand-in for the real chassis: it integrates the commanded
//! field-relative speeds into a true pose and per-module wheel states, and
//! exposes those as `Signal` implementations so the odometry sampler reads
//! the simulation exactly the way it would read hardware.
//!
//! State is behind a mutex because the sampling thread reads the signals
//! while the main tick steps the integration.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use std::sync::{Arc, Mutex};

// Internal
use crate::geom::{rotate_vec, ChassisSpeeds, Pose2, Twist2};
use crate::odom_sampler::{Signal, SignalError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The simulated drivetrain.
pub struct SimDrive {
    module_locations_m: Vec<Vector2<f64>>,
    state: Arc<Mutex<SimState>>,
}

/// Cumulative wheel state of one module.
#[derive(Debug, Copy, Clone, Default)]
struct SimModule {
    distance_m: f64,
    angle_rad: f64,
}

struct SimState {
    pose: Pose2,
    modules: Vec<SimModule>,

    /// The last commanded field-relative speeds
    command: ChassisSpeeds,
}

/// A sensor signal backed by the simulation state.
struct SimSignal {
    state: Arc<Mutex<SimState>>,
    kind: SimSignalKind,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

enum SimSignalKind {
    DriveDistance(usize),
    SteerAngle(usize),
    Yaw,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimDrive {
    pub fn new(module_locations_m: Vec<Vector2<f64>>) -> Self {
        let modules = vec![SimModule::default(); module_locations_m.len()];

        Self {
            module_locations_m,
            state: Arc::new(Mutex::new(SimState {
                pose: Pose2::default(),
                modules,
                command: ChassisSpeeds::default(),
            })),
        }
    }

    /// Actuation input: set the field-relative velocity command.
    ///
    /// The module force hints are accepted to match the actuation contract
    /// but a kinematic simulation has no use for them.
    pub fn run_velocity(&self, speeds: ChassisSpeeds, _module_forces_n: &[[f64; 2]]) {
        let mut state = self.lock();
        state.command = speeds;
    }

    /// Integrate the current command over `dt_s`.
    pub fn step(&self, dt_s: f64) {
        let mut state = self.lock();

        // The command is field-relative, the twist is robot-relative
        let linear_rb = rotate_vec(
            &Vector2::new(state.command.vx_ms, state.command.vy_ms),
            -state.pose.heading_rad,
        );
        let omega = state.command.omega_rads;

        let twist = Twist2::new(linear_rb.x * dt_s, linear_rb.y * dt_s, omega * dt_s);
        state.pose = state.pose.exp(&twist);

        for (module, location) in state.modules.iter_mut().zip(&self.module_locations_m) {
            let velocity = Vector2::new(
                linear_rb.x - omega * location.y,
                linear_rb.y + omega * location.x,
            );
            let speed = velocity.norm();

            // A stationary module holds its steer angle
            if speed > 1e-9 {
                module.angle_rad = velocity.y.atan2(velocity.x);
            }
            module.distance_m += speed * dt_s;
        }
    }

    /// The true pose of the simulated robot, used as the vision source.
    pub fn true_pose(&self) -> Pose2 {
        self.lock().pose
    }

    /// Signal reading the cumulative drive distance of one module.
    pub fn drive_distance_signal(&self, module_index: usize) -> Box<dyn Signal> {
        self.signal(SimSignalKind::DriveDistance(module_index))
    }

    /// Signal reading the steer angle of one module.
    pub fn steer_angle_signal(&self, module_index: usize) -> Box<dyn Signal> {
        self.signal(SimSignalKind::SteerAngle(module_index))
    }

    /// Signal reading the gyro yaw.
    pub fn yaw_signal(&self) -> Box<dyn Signal> {
        self.signal(SimSignalKind::Yaw)
    }

    fn signal(&self, kind: SimSignalKind) -> Box<dyn Signal> {
        Box::new(SimSignal {
            state: self.state.clone(),
            kind,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Signal for SimSignal {
    fn read(&mut self) -> Result<f64, SignalError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let value = match self.kind {
            SimSignalKind::DriveDistance(i) => state
                .modules
                .get(i)
                .map(|m| m.distance_m)
                .ok_or_else(|| SignalError::ReadFailed(format!("no module {}", i)))?,
            SimSignalKind::SteerAngle(i) => state
                .modules
                .get(i)
                .map(|m| m.angle_rad)
                .ok_or_else(|| SignalError::ReadFailed(format!("no module {}", i)))?,
            SimSignalKind::Yaw => state.pose.heading_rad,
        };

        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn square_chassis() -> SimDrive {
        SimDrive::new(vec![
            Vector2::new(0.3, 0.3),
            Vector2::new(0.3, -0.3),
            Vector2::new(-0.3, 0.3),
            Vector2::new(-0.3, -0.3),
        ])
    }

    #[test]
    fn test_straight_drive() {
        let sim = square_chassis();
        sim.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0), &[]);

        for _ in 0..50 {
            sim.step(0.02);
        }

        let pose = sim.true_pose();
        assert!((pose.position_m.x - 1.0).abs() < 1e-9);
        assert!(pose.position_m.y.abs() < 1e-9);

        // Every wheel rolled 1 m pointing forward
        let state = sim.lock();
        for module in &state.modules {
            assert!((module.distance_m - 1.0).abs() < 1e-9);
            assert!(module.angle_rad.abs() < 1e-9);
        }
    }

    #[test]
    fn test_pure_rotation_holds_position() {
        let sim = square_chassis();
        sim.run_velocity(ChassisSpeeds::new(0.0, 0.0, 1.0), &[]);

        for _ in 0..50 {
            sim.step(0.02);
        }

        let pose = sim.true_pose();
        assert!(pose.position_m.x.abs() < 1e-9);
        assert!(pose.position_m.y.abs() < 1e-9);
        assert!((pose.heading_rad - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_signals_track_state() {
        let sim = square_chassis();
        let mut distance = sim.drive_distance_signal(0);
        let mut yaw = sim.yaw_signal();

        sim.run_velocity(ChassisSpeeds::new(1.0, 0.0, 0.0), &[]);
        sim.step(0.5);

        assert!((distance.read().unwrap() - 0.5).abs() < 1e-9);
        assert!(yaw.read().unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_bad_module_index_fails_read() {
        let sim = square_chassis();
        let mut signal = sim.drive_distance_signal(10);
        assert!(signal.read().is_err());
    }
}
