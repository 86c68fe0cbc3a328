//! # Trajectory tracking module
//!
//! Drives the chassis along a pre-computed trajectory. Each tick the tracker
//! samples the trajectory at the elapsed time, transforms the sampled state
//! for the requested mirror and the current alliance, and combines PID
//! feedback on the measured pose with the setpoint's feedforward velocity
//! and module-force hints.
//!
//! Execution is a simple mode machine `Idle -> Tracking -> Finished`, with
//! `Finished` terminal for the loaded trajectory. Cancellation is treated
//! identically to normal completion.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod controllers;
mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during TrajCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum TrajCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("A trajectory is already being tracked")]
    AlreadyTracking,

    #[error("In tracking mode but no trajectory is loaded")]
    NoTrajectory,

    #[error("Could not create the tick archive: {0}")]
    ArchiveError(String),
}
