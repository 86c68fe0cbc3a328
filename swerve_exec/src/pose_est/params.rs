//! Pose estimator parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the pose estimator
#[derive(Deserialize, Debug, Clone)]
pub struct PoseEstParams {
    /// How far back the odometry history reaches. Vision measurements older
    /// than this cannot be fused.
    pub history_horizon_s: f64,

    /// Standard deviation of the odometry-only pose `[x, y, theta]`, used to
    /// weight vision corrections.
    pub odometry_std_devs: [f64; 3],

    /// Capacity of the asynchronous vision hand-off queue.
    pub vision_queue_capacity: usize,

    /// Module mounting positions in the robot frame, `[x, y]` per module.
    pub module_locations_m: Vec<[f64; 2]>,
}

impl Default for PoseEstParams {
    fn default() -> Self {
        Self {
            history_horizon_s: 1.5,
            odometry_std_devs: [0.1, 0.1, 0.1],
            vision_queue_capacity: 16,
            module_locations_m: vec![],
        }
    }
}
