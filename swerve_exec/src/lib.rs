//! # Swerve drive library.
//!
//! This library allows other crates in the workspace (and the tests) to
//! access the modules defined inside the swerve executable crate.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Global data store shared between the executable's modules
pub mod data_store;

/// Field coordinate transforms - mirror and alliance flip
pub mod field;

/// Planar geometry types - poses, twists and chassis speeds
pub mod geom;

/// Swerve forward kinematics - wheel deltas to chassis twist
pub mod kinematics;

/// Odometry sampler - fixed-rate sensor sampling on a dedicated thread
pub mod odom_sampler;

/// Pose estimation module - fuses odometry with delayed vision corrections
pub mod pose_est;

/// Simulated drivetrain - backs the signals when running without hardware
pub mod sim_drive;

/// Trajectory tracking module - keeps the robot on the given trajectory
pub mod traj_ctrl;

/// Trajectory loading and sampling
pub mod trajectory;

/// Process-wide hot-swappable tunable values
pub mod tuning;
