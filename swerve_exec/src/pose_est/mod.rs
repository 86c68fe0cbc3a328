//! # Pose estimation module
//!
//! Fuses high-rate odometry integration with low-rate, delayed vision
//! corrections into one continuously-available pose estimate.
//!
//! Odometry batches advance the pose through the drivetrain's kinematic
//! model and append the resulting deltas to a bounded history. When a vision
//! measurement arrives its timestamp is looked up in that history, the pose
//! there is replaced by a variance-weighted blend of the odometry-only pose
//! and the vision pose, and every later odometry delta is replayed forward
//! from the corrected anchor. Measurements older than the retention horizon
//! are dropped, counted, and never treated as errors.
//!
//! All state is mutated from the main tick only. Vision measurements from
//! other execution contexts are funnelled through a bounded queue
//! (`VisionInput`) and drained inside `proc`.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

pub use params::PoseEstParams;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use nalgebra::Vector2;
use serde::Serialize;
use std::collections::VecDeque;

// Internal
use crate::geom::{ChassisSpeeds, Pose2, Twist2};
use crate::kinematics::{KinematicsError, ModulePosition, SwerveKinematics};
use util::archive::Archiver;
use util::maths::ang_dist;
use util::module::State;
use util::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One synchronised batch entry drained from the odometry sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct OdometrySample {
    pub timestamp_s: f64,

    /// Cumulative drive distance and steer angle per module
    pub wheel_positions: Vec<ModulePosition>,

    /// Gyro yaw reading, if the gyro was sampled in this batch
    pub yaw_rad: Option<f64>,
}

/// The current best estimate of the robot's pose and velocity.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize)]
pub struct PoseEstimate {
    pub timestamp_s: f64,

    /// Pose in the field frame
    pub pose: Pose2,

    /// Velocity in the robot frame
    pub velocity: ChassisSpeeds,
}

/// An external pose observation, possibly stale or out of order.
#[derive(Debug, Copy, Clone)]
pub struct VisionMeasurement {
    pub pose: Pose2,
    pub timestamp_s: f64,

    /// Measurement standard deviations `[x, y, theta]`
    pub std_devs: [f64; 3],
}

/// Producer handle for asynchronous vision measurements.
///
/// Clonable and sendable to other threads; measurements are queued and fused
/// on the next main tick, keeping all estimator mutation single-writer.
#[derive(Clone)]
pub struct VisionInput {
    sender: Sender<VisionMeasurement>,
}

/// One retained history entry: the odometry delta which produced it and the
/// fused pose after it.
#[derive(Debug, Copy, Clone)]
struct HistoryEntry {
    timestamp_s: f64,
    twist: Twist2,
    pose: Pose2,
}

/// Input data for one tick of processing.
#[derive(Default)]
pub struct InputData {
    /// Odometry batch drained since the last tick, ascending timestamps
    pub odometry: Vec<OdometrySample>,
}

/// The status report containing monitoring quantities for one tick.
#[derive(Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// Odometry samples fused this tick
    pub odometry_samples_fused: usize,

    /// Vision measurements fused this tick
    pub vision_fused: usize,

    /// Vision measurements dropped this tick for being older than the
    /// retention horizon
    pub vision_dropped_stale: usize,

    /// Total stale drops since init
    pub vision_dropped_total: u64,
}

/// Pose estimation module state.
#[derive(Default)]
pub struct PoseEst {
    params: PoseEstParams,

    kinematics: Option<SwerveKinematics>,

    /// The singleton current best estimate, mutated only by this module
    estimate: PoseEstimate,

    /// Bounded history, strictly non-decreasing by timestamp
    history: VecDeque<HistoryEntry>,

    last_wheel_positions: Option<Vec<ModulePosition>>,
    last_yaw_rad: Option<f64>,

    vision_tx: Option<Sender<VisionMeasurement>>,
    vision_rx: Option<Receiver<VisionMeasurement>>,

    vision_dropped_total: u64,

    report: StatusReport,
    arch_estimate: Archiver,
}

/// Flat per-tick archive record.
#[derive(Serialize)]
struct EstimateRecord {
    timestamp_s: f64,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    vx_ms: f64,
    vy_ms: f64,
    omega_rads: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during pose estimation.
#[derive(Debug, thiserror::Error)]
pub enum PoseEstError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error(transparent)]
    KinematicsError(#[from] KinematicsError),

    #[error("Could not create the estimate archive: {0}")]
    ArchiveError(String),

    #[error("Module has not been initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VisionInput {
    /// Queue a vision measurement for fusion on the next tick.
    ///
    /// Returns false if the queue is full, in which case the measurement is
    /// lost; the estimator recovers on the next measurement.
    pub fn add_measurement(&self, measurement: VisionMeasurement) -> bool {
        self.sender.try_send(measurement).is_ok()
    }
}

impl State for PoseEst {
    type InitData = &'static str;
    type InitError = PoseEstError;

    type InputData = InputData;
    type OutputData = PoseEstimate;
    type StatusReport = StatusReport;
    type ProcError = PoseEstError;

    /// Initialise the pose estimator.
    ///
    /// Expected init data is the name of the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), PoseEstError> {
        self.params = util::params::load(init_data).map_err(PoseEstError::ParamLoadError)?;

        let locations = self
            .params
            .module_locations_m
            .iter()
            .map(|l| Vector2::new(l[0], l[1]))
            .collect();
        self.kinematics = Some(SwerveKinematics::new(locations)?);

        let (tx, rx) = bounded(self.params.vision_queue_capacity);
        self.vision_tx = Some(tx);
        self.vision_rx = Some(rx);

        self.arch_estimate = Archiver::from_path(session, "pose_est/estimate.csv")
            .map_err(|e| PoseEstError::ArchiveError(e.to_string()))?;

        Ok(())
    }

    /// Process one tick: fuse the drained odometry batch, then any vision
    /// measurements queued since the last tick.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), PoseEstError> {
        self.report = StatusReport::default();

        self.add_odometry_observation(&input_data.odometry)?;

        // Drain the vision queue, then fuse. Collecting first releases the
        // borrow on the receiver
        let pending: Vec<VisionMeasurement> = match &self.vision_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return Err(PoseEstError::NotInitialised),
        };
        for measurement in pending {
            self.add_vision_measurement(&measurement);
        }

        self.report.vision_dropped_total = self.vision_dropped_total;

        if let Err(e) = self.arch_estimate.serialise(EstimateRecord {
            timestamp_s: self.estimate.timestamp_s,
            x_m: self.estimate.pose.position_m.x,
            y_m: self.estimate.pose.position_m.y,
            heading_rad: self.estimate.pose.heading_rad,
            vx_ms: self.estimate.velocity.vx_ms,
            vy_ms: self.estimate.velocity.vy_ms,
            omega_rads: self.estimate.velocity.omega_rads,
        }) {
            warn!("Could not archive pose estimate: {}", e);
        }

        Ok((self.estimate, self.report))
    }
}

impl PoseEst {
    /// Get a producer handle for asynchronous vision measurements.
    pub fn vision_input(&self) -> Result<VisionInput, PoseEstError> {
        match &self.vision_tx {
            Some(tx) => Ok(VisionInput { sender: tx.clone() }),
            None => Err(PoseEstError::NotInitialised),
        }
    }

    /// Non-blocking read of the latest pose estimate.
    pub fn estimated_pose(&self) -> Pose2 {
        self.estimate.pose
    }

    /// Non-blocking read of the latest robot-relative velocity.
    pub fn robot_velocity(&self) -> ChassisSpeeds {
        self.estimate.velocity
    }

    /// Fuse a batch of odometry samples in ascending timestamp order.
    ///
    /// Each sample advances the pose by the twist recovered from the wheel
    /// position deltas (with the gyro yaw delta overriding the kinematic
    /// rotation when available) and appends the delta to the history.
    pub fn add_odometry_observation(
        &mut self,
        samples: &[OdometrySample],
    ) -> Result<(), PoseEstError> {
        for sample in samples {
            // Out-of-order samples within a batch are skipped, the history
            // must stay non-decreasing
            if sample.timestamp_s < self.estimate.timestamp_s {
                warn!(
                    "Skipping out-of-order odometry sample ({:.6} < {:.6})",
                    sample.timestamp_s, self.estimate.timestamp_s
                );
                continue;
            }

            let previous = match self.last_wheel_positions.take() {
                Some(p) => p,
                None => {
                    // First ever sample only establishes the baseline
                    self.last_wheel_positions = Some(sample.wheel_positions.clone());
                    self.last_yaw_rad = sample.yaw_rad;
                    self.estimate.timestamp_s = sample.timestamp_s;
                    self.history.push_back(HistoryEntry {
                        timestamp_s: sample.timestamp_s,
                        twist: Twist2::default(),
                        pose: self.estimate.pose,
                    });
                    continue;
                }
            };

            let deltas: Vec<ModulePosition> = sample
                .wheel_positions
                .iter()
                .zip(previous.iter())
                .map(|(now, prev)| ModulePosition {
                    distance_m: now.distance_m - prev.distance_m,
                    angle_rad: now.angle_rad,
                })
                .collect();

            let kinematics = self
                .kinematics
                .as_ref()
                .ok_or(PoseEstError::NotInitialised)?;
            let mut twist = kinematics.twist_from_deltas(&deltas)?;

            // A gyro yaw delta is more trustworthy than the kinematic
            // rotation estimate
            if let (Some(yaw), Some(last_yaw)) = (sample.yaw_rad, self.last_yaw_rad) {
                twist.dtheta_rad = ang_dist(last_yaw, yaw);
            }

            let dt = sample.timestamp_s - self.estimate.timestamp_s;
            let pose = self.estimate.pose.exp(&twist);

            if dt > 0.0 {
                self.estimate.velocity = ChassisSpeeds::new(
                    twist.dx_m / dt,
                    twist.dy_m / dt,
                    twist.dtheta_rad / dt,
                );
            }
            self.estimate.pose = pose;
            self.estimate.timestamp_s = sample.timestamp_s;

            self.history.push_back(HistoryEntry {
                timestamp_s: sample.timestamp_s,
                twist,
                pose,
            });
            self.evict_history(sample.timestamp_s);

            self.last_wheel_positions = Some(sample.wheel_positions.clone());
            if sample.yaw_rad.is_some() {
                self.last_yaw_rad = sample.yaw_rad;
            }

            self.report.odometry_samples_fused += 1;
        }

        Ok(())
    }

    /// Fuse one vision measurement.
    ///
    /// Locates the history entry anchoring the measurement's timestamp,
    /// blends the odometry-only pose there with the vision pose weighted by
    /// their variances, and replays every later odometry delta forward from
    /// the corrected anchor.
    pub fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) {
        // With no odometry yet the first vision measurement seeds the
        // estimate directly
        if self.history.is_empty() {
            self.estimate.pose = measurement.pose;
            self.estimate.timestamp_s = measurement.timestamp_s;
            self.history.push_back(HistoryEntry {
                timestamp_s: measurement.timestamp_s,
                twist: Twist2::default(),
                pose: measurement.pose,
            });
            self.report.vision_fused += 1;
            return;
        }

        // Beyond the retention horizon the measurement cannot be replayed,
        // drop it. Not an error
        if measurement.timestamp_s < self.history[0].timestamp_s {
            self.vision_dropped_total += 1;
            self.report.vision_dropped_stale += 1;
            debug!(
                "Dropped vision measurement at {:.6}, older than retained history",
                measurement.timestamp_s
            );
            return;
        }

        // Anchor on the newest entry at or before the measurement
        let anchor_index = match self
            .history
            .iter()
            .rposition(|e| e.timestamp_s <= measurement.timestamp_s)
        {
            Some(i) => i,
            None => 0,
        };

        let corrected = blend_pose(
            &self.history[anchor_index].pose,
            &measurement.pose,
            &self.params.odometry_std_devs,
            &measurement.std_devs,
        );
        self.history[anchor_index].pose = corrected;

        // Replay every recorded delta after the anchor
        for i in (anchor_index + 1)..self.history.len() {
            let twist = self.history[i].twist;
            self.history[i].pose = self.history[i - 1].pose.exp(&twist);
        }

        self.estimate.pose = match self.history.back() {
            Some(e) => e.pose,
            None => corrected,
        };

        self.report.vision_fused += 1;
    }

    /// Number of history entries currently retained.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Evict entries older than the retention horizon, always keeping the
    /// newest entry.
    fn evict_history(&mut self, now_s: f64) {
        let cutoff = now_s - self.params.history_horizon_s;
        while self.history.len() > 1 {
            match self.history.front() {
                Some(e) if e.timestamp_s < cutoff => {
                    self.history.pop_front();
                }
                _ => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Variance-weighted blend of the odometry-only pose and a vision pose.
///
/// Each axis moves toward the vision pose by the gain `q / (q + r)` with `q`
/// the odometry variance and `r` the measurement variance, so tight vision
/// standard deviations pull hard and loose ones barely at all. The heading
/// is blended along the shortest arc.
fn blend_pose(odometry: &Pose2, vision: &Pose2, odo_std_devs: &[f64; 3], vis_std_devs: &[f64; 3]) -> Pose2 {
    let mut gains = [0.0f64; 3];
    for i in 0..3 {
        let q = odo_std_devs[i] * odo_std_devs[i];
        let r = vis_std_devs[i] * vis_std_devs[i];
        gains[i] = if q + r > 0.0 { q / (q + r) } else { 0.0 };
    }

    Pose2::new(
        odometry.position_m.x + gains[0] * (vision.position_m.x - odometry.position_m.x),
        odometry.position_m.y + gains[1] * (vision.position_m.y - odometry.position_m.y),
        odometry.heading_rad + gains[2] * ang_dist(odometry.heading_rad, vision.heading_rad),
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Two modules on the Y axis, enough for planar kinematics.
    fn test_estimator() -> PoseEst {
        let mut est = PoseEst::default();
        est.params = PoseEstParams {
            history_horizon_s: 1.5,
            odometry_std_devs: [0.1, 0.1, 0.1],
            vision_queue_capacity: 4,
            module_locations_m: vec![[0.0, 0.3], [0.0, -0.3]],
        };
        est.kinematics = Some(
            SwerveKinematics::new(vec![
                Vector2::new(0.0, 0.3),
                Vector2::new(0.0, -0.3),
            ])
            .unwrap(),
        );
        let (tx, rx) = bounded(4);
        est.vision_tx = Some(tx);
        est.vision_rx = Some(rx);
        est
    }

    fn straight_sample(timestamp_s: f64, distance_m: f64) -> OdometrySample {
        OdometrySample {
            timestamp_s,
            wheel_positions: vec![
                ModulePosition {
                    distance_m,
                    angle_rad: 0.0,
                };
                2
            ],
            yaw_rad: Some(0.0),
        }
    }

    #[test]
    fn test_dead_reckoning_matches_integration() {
        let mut est = test_estimator();

        // Drive straight 1 m over 4 samples
        let samples: Vec<OdometrySample> = (0..5)
            .map(|i| straight_sample(i as f64 * 0.1, i as f64 * 0.25))
            .collect();
        est.add_odometry_observation(&samples).unwrap();

        // Pure integration from the initial pose: 4 twists of 0.25 m forward
        let mut expected = Pose2::default();
        for _ in 0..4 {
            expected = expected.exp(&Twist2::new(0.25, 0.0, 0.0));
        }

        assert_eq!(est.estimated_pose(), expected);
        assert!((est.estimated_pose().position_m.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_from_latest_delta() {
        let mut est = test_estimator();

        est.add_odometry_observation(&[
            straight_sample(0.0, 0.0),
            straight_sample(0.1, 0.2),
        ])
        .unwrap();

        let vel = est.robot_velocity();
        assert!((vel.vx_ms - 2.0).abs() < 1e-9);
        assert!(vel.vy_ms.abs() < 1e-9);
        assert!(vel.omega_rads.abs() < 1e-9);
    }

    #[test]
    fn test_stale_vision_leaves_estimate_unchanged() {
        let mut est = test_estimator();

        let samples: Vec<OdometrySample> = (0..20)
            .map(|i| straight_sample(2.0 + i as f64 * 0.1, i as f64 * 0.05))
            .collect();
        est.add_odometry_observation(&samples).unwrap();

        let before = est.estimate;

        // Older than the oldest retained entry
        est.add_vision_measurement(&VisionMeasurement {
            pose: Pose2::new(5.0, 5.0, 1.0),
            timestamp_s: 0.5,
            std_devs: [0.01, 0.01, 0.01],
        });

        assert_eq!(est.estimate, before);
        assert_eq!(est.vision_dropped_total, 1);
    }

    #[test]
    fn test_vision_at_latest_sample_is_weighted_blend() {
        let mut est = test_estimator();

        est.add_odometry_observation(&[
            straight_sample(0.0, 0.0),
            straight_sample(0.1, 0.5),
        ])
        .unwrap();

        let odo_pose = est.estimated_pose();
        let vision_pose = Pose2::new(0.7, 0.1, 0.05);
        let std_devs = [0.2, 0.2, 0.2];

        est.add_vision_measurement(&VisionMeasurement {
            pose: vision_pose,
            timestamp_s: 0.1,
            std_devs,
        });

        // q = 0.1^2, r = 0.2^2 -> gain 0.2
        let gain = 0.01 / (0.01 + 0.04);
        let fused = est.estimated_pose();

        assert!(
            (fused.position_m.x - (odo_pose.position_m.x + gain * (0.7 - odo_pose.position_m.x)))
                .abs()
                < 1e-12
        );
        assert!(
            (fused.position_m.y - (odo_pose.position_m.y + gain * (0.1 - odo_pose.position_m.y)))
                .abs()
                < 1e-12
        );
        assert!(
            (fused.heading_rad - (odo_pose.heading_rad + gain * 0.05)).abs() < 1e-12
        );
    }

    #[test]
    fn test_vision_replays_later_odometry() {
        let mut est = test_estimator();

        est.add_odometry_observation(&[
            straight_sample(0.0, 0.0),
            straight_sample(0.1, 0.3),
            straight_sample(0.2, 0.6),
        ])
        .unwrap();

        // Perfectly confident vision snaps the anchor at t=0.1 to its pose
        est.add_vision_measurement(&VisionMeasurement {
            pose: Pose2::new(1.0, 1.0, 0.0),
            timestamp_s: 0.1,
            std_devs: [0.0, 0.0, 0.0],
        });

        // The final 0.3 m forward delta is replayed from the corrected pose
        let fused = est.estimated_pose();
        assert!((fused.position_m.x - 1.3).abs() < 1e-9);
        assert!((fused.position_m.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_vision_seeds_history() {
        let mut est = test_estimator();

        est.add_vision_measurement(&VisionMeasurement {
            pose: Pose2::new(2.0, 3.0, 0.5),
            timestamp_s: 1.0,
            std_devs: [0.1, 0.1, 0.1],
        });

        assert_eq!(est.estimated_pose(), Pose2::new(2.0, 3.0, 0.5));
        assert_eq!(est.history_len(), 1);
    }

    #[test]
    fn test_history_eviction_respects_horizon() {
        let mut est = test_estimator();

        let samples: Vec<OdometrySample> = (0..40)
            .map(|i| straight_sample(i as f64 * 0.1, 0.0))
            .collect();
        est.add_odometry_observation(&samples).unwrap();

        // 4 s of samples against a 1.5 s horizon
        assert!(est.history_len() <= 17);
        assert!(est.history_len() >= 15);
    }
}
