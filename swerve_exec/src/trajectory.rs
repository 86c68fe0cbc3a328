//! # Trajectory module
//!
//! A trajectory is an immutable, externally-generated sampled path. The
//! generator runs offline and writes the samples out as JSON; this module
//! only loads and interpolates them, it never plans.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::geom::Pose2;
use util::maths::{lerp, lerp_angle};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The full state of the vehicle at one point along a trajectory.
///
/// Velocities are field-relative. Module forces are feedforward hints in the
/// path's local frame, newtons per module; they are rotated into the field
/// frame by the tracker before being forwarded to actuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub pose: Pose2,
    pub vx_ms: f64,
    pub vy_ms: f64,
    pub omega_rads: f64,

    /// One `[fx, fy]` pair per module
    #[serde(default)]
    pub module_forces_n: Vec<[f64; 2]>,
}

/// One timestamped sample of a trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub time_s: f64,
    pub state: VehicleState,
}

/// An immutable pre-computed path through the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<TrajectorySample>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised when loading a trajectory.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Cannot load the trajectory file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot parse the trajectory file: {0}")]
    ParseError(serde_json::Error),

    #[error("Trajectory must contain at least one sample")]
    Empty,

    #[error("Trajectory sample times must be non-decreasing (sample {0})")]
    NonMonotonic(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Trajectory {
    /// Build a trajectory from raw samples, validating ordering.
    pub fn new(samples: Vec<TrajectorySample>) -> Result<Self, TrajectoryError> {
        if samples.is_empty() {
            return Err(TrajectoryError::Empty);
        }

        for i in 1..samples.len() {
            if samples[i].time_s < samples[i - 1].time_s {
                return Err(TrajectoryError::NonMonotonic(i));
            }
        }

        Ok(Self { samples })
    }

    /// Load a trajectory from a JSON file produced by the offline generator.
    pub fn from_file(path: &std::path::Path) -> Result<Self, TrajectoryError> {
        let json = std::fs::read_to_string(path).map_err(TrajectoryError::FileLoadError)?;

        let samples: Vec<TrajectorySample> =
            serde_json::from_str(&json).map_err(TrajectoryError::ParseError)?;

        Self::new(samples)
    }

    /// Total duration of the trajectory in seconds.
    pub fn duration_s(&self) -> f64 {
        self.samples[self.samples.len() - 1].time_s
    }

    /// Sample the trajectory at time `t`.
    ///
    /// `t` is clamped into `[0, duration]`, sampling past the end simply
    /// holds the final state. Between samples the state is linearly
    /// interpolated, with the heading taken along the shortest arc.
    pub fn sample(&self, t_s: f64) -> VehicleState {
        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];

        if t_s <= first.time_s {
            return first.state.clone();
        }
        if t_s >= last.time_s {
            return last.state.clone();
        }

        // Index of the first sample with time > t
        let upper = self
            .samples
            .iter()
            .position(|s| s.time_s > t_s)
            .unwrap_or(self.samples.len() - 1);
        let lower = upper - 1;

        let s0 = &self.samples[lower];
        let s1 = &self.samples[upper];

        let span = s1.time_s - s0.time_s;
        if span <= 0.0 {
            return s1.state.clone();
        }
        let frac = (t_s - s0.time_s) / span;

        interp_state(&s0.state, &s1.state, frac)
    }

    /// The full pose sequence, used for visualisation of the path.
    pub fn poses(&self) -> Vec<Pose2> {
        self.samples.iter().map(|s| s.state.pose).collect()
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Linearly interpolate between two vehicle states.
fn interp_state(a: &VehicleState, b: &VehicleState, frac: f64) -> VehicleState {
    let pose = Pose2::new(
        lerp(a.pose.position_m.x, b.pose.position_m.x, frac),
        lerp(a.pose.position_m.y, b.pose.position_m.y, frac),
        lerp_angle(a.pose.heading_rad, b.pose.heading_rad, frac),
    );

    // Module force hints are not interpolated, the earlier sample's hints
    // hold until the next sample is reached
    VehicleState {
        pose,
        vx_ms: lerp(a.vx_ms, b.vx_ms, frac),
        vy_ms: lerp(a.vy_ms, b.vy_ms, frac),
        omega_rads: lerp(a.omega_rads, b.omega_rads, frac),
        module_forces_n: a.module_forces_n.clone(),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn state(x: f64, vx: f64) -> VehicleState {
        VehicleState {
            pose: Pose2::new(x, 0.0, 0.0),
            vx_ms: vx,
            vy_ms: 0.0,
            omega_rads: 0.0,
            module_forces_n: vec![],
        }
    }

    fn two_sample_traj() -> Trajectory {
        Trajectory::new(vec![
            TrajectorySample {
                time_s: 0.0,
                state: state(0.0, 1.0),
            },
            TrajectorySample {
                time_s: 2.0,
                state: state(2.0, 1.0),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            Trajectory::new(vec![]),
            Err(TrajectoryError::Empty)
        ));
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let result = Trajectory::new(vec![
            TrajectorySample {
                time_s: 1.0,
                state: state(0.0, 0.0),
            },
            TrajectorySample {
                time_s: 0.5,
                state: state(1.0, 0.0),
            },
        ]);
        assert!(matches!(result, Err(TrajectoryError::NonMonotonic(1))));
    }

    #[test]
    fn test_sample_interpolates() {
        let traj = two_sample_traj();
        let mid = traj.sample(1.0);

        assert!((mid.pose.position_m.x - 1.0).abs() < 1e-12);
        assert!((mid.vx_ms - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_clamps_past_duration() {
        let traj = two_sample_traj();

        let end = traj.sample(2.0);
        let past = traj.sample(10.0);

        assert_eq!(end, past);
        assert!((past.pose.position_m.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_clamps_before_start() {
        let traj = two_sample_traj();
        let before = traj.sample(-1.0);
        assert!((before.pose.position_m.x - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_duration() {
        assert!((two_sample_traj().duration_s() - 2.0).abs() < 1e-12);
    }
}
