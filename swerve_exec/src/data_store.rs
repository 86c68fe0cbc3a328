//! # Data Store

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::{pose_est, traj_ctrl};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of cycles already executed
    pub num_cycles: u128,

    // PoseEst
    pub pose_est: pose_est::PoseEst,
    pub pose_est_input: pose_est::InputData,
    pub pose_est_output: pose_est::PoseEstimate,
    pub pose_est_status_rpt: pose_est::StatusReport,

    // TrajCtrl
    pub traj_ctrl: traj_ctrl::TrajCtrl,
    pub traj_ctrl_input: traj_ctrl::InputData,
    pub traj_ctrl_output: traj_ctrl::OutputData,
    pub traj_ctrl_status_rpt: traj_ctrl::StatusReport,

    // Monitoring counters
    /// Number of consecutive cycle overruns
    pub num_consec_cycle_overruns: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Clear items that need wiping at the start of each cycle.
    pub fn cycle_start(&mut self) {
        self.pose_est_input = pose_est::InputData::default();
        self.traj_ctrl_input = traj_ctrl::InputData::default();
    }
}
