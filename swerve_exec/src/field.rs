//! # Field coordinate transforms
//!
//! Trajectories are authored for one starting side of a blue-alliance-origin
//! field. Two pure transforms adapt them at run time:
//!
//! - `mirror` reflects across the field's lengthwise centreline, reusing a
//!   path authored for the opposite starting side.
//! - `alliance_flip` rotates 180 degrees about the field centre, converting
//!   blue-origin coordinates for a robot on the red side.
//!
//! Both are involutions and never mutate their input. They are always applied
//! in the fixed order mirror-then-flip so that the tracked setpoint and the
//! visualised pose sequence stay consistent.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::geom::Pose2;
use crate::trajectory::VehicleState;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Dimensions of the playing field.
#[derive(Debug, Copy, Clone, Deserialize)]
pub struct FieldParams {
    /// Field length along X
    pub length_m: f64,

    /// Field width along Y
    pub width_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The competition side the robot currently occupies.
///
/// Field coordinates are authored blue-origin, so `Red` enables the alliance
/// flip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum Alliance {
    Blue,
    Red,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Reflect a pose across the field's lengthwise centreline.
pub fn mirror_pose(field: &FieldParams, pose: &Pose2) -> Pose2 {
    Pose2::new(
        pose.position_m.x,
        field.width_m - pose.position_m.y,
        -pose.heading_rad,
    )
}

/// Rotate a pose 180 degrees about the field centre.
pub fn flip_pose(field: &FieldParams, pose: &Pose2) -> Pose2 {
    Pose2::new(
        field.length_m - pose.position_m.x,
        field.width_m - pose.position_m.y,
        pose.heading_rad + std::f64::consts::PI,
    )
}

/// Reflect a full vehicle state across the field's lengthwise centreline.
///
/// Velocities and module forces are reflected with the pose: the Y components
/// and the angular rate change sign.
pub fn mirror_state(field: &FieldParams, state: &VehicleState) -> VehicleState {
    VehicleState {
        pose: mirror_pose(field, &state.pose),
        vx_ms: state.vx_ms,
        vy_ms: -state.vy_ms,
        omega_rads: -state.omega_rads,
        module_forces_n: state
            .module_forces_n
            .iter()
            .map(|f| [f[0], -f[1]])
            .collect(),
    }
}

/// Rotate a full vehicle state 180 degrees about the field centre.
pub fn flip_state(field: &FieldParams, state: &VehicleState) -> VehicleState {
    VehicleState {
        pose: flip_pose(field, &state.pose),
        vx_ms: -state.vx_ms,
        vy_ms: -state.vy_ms,
        omega_rads: state.omega_rads,
        module_forces_n: state
            .module_forces_n
            .iter()
            .map(|f| [-f[0], -f[1]])
            .collect(),
    }
}

/// Apply the mirror (if requested) then the alliance flip (if on red) to a
/// pose. This order must match `transform_state`.
pub fn transform_pose(
    field: &FieldParams,
    pose: &Pose2,
    mirror: bool,
    alliance: Alliance,
) -> Pose2 {
    let pose = if mirror {
        mirror_pose(field, pose)
    } else {
        *pose
    };

    match alliance {
        Alliance::Blue => pose,
        Alliance::Red => flip_pose(field, &pose),
    }
}

/// Apply the mirror (if requested) then the alliance flip (if on red) to a
/// sampled vehicle state.
pub fn transform_state(
    field: &FieldParams,
    state: &VehicleState,
    mirror: bool,
    alliance: Alliance,
) -> VehicleState {
    let state = if mirror {
        mirror_state(field, state)
    } else {
        state.clone()
    };

    match alliance {
        Alliance::Blue => state,
        Alliance::Red => flip_state(field, &state),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const FIELD: FieldParams = FieldParams {
        length_m: 17.548,
        width_m: 8.052,
    };

    fn assert_pose_near(a: &Pose2, b: &Pose2, tol: f64) {
        assert!((a.position_m.x - b.position_m.x).abs() < tol);
        assert!((a.position_m.y - b.position_m.y).abs() < tol);
        assert!(
            util::maths::ang_dist(a.heading_rad, b.heading_rad).abs() < tol,
            "headings {} and {} differ",
            a.heading_rad,
            b.heading_rad
        );
    }

    #[test]
    fn test_mirror_is_involution() {
        let pose = Pose2::new(3.2, 1.7, 0.8);
        let twice = mirror_pose(&FIELD, &mirror_pose(&FIELD, &pose));
        assert_pose_near(&twice, &pose, 1e-12);
    }

    #[test]
    fn test_flip_is_involution() {
        let pose = Pose2::new(3.2, 1.7, 0.8);
        let twice = flip_pose(&FIELD, &flip_pose(&FIELD, &pose));
        assert_pose_near(&twice, &pose, 1e-12);
    }

    #[test]
    fn test_mirror_flip_flip_mirror_round_trip() {
        // mirror then flip then flip then mirror returns the original pose
        let pose = Pose2::new(11.9, 6.3, -2.1);
        let out = mirror_pose(
            &FIELD,
            &flip_pose(&FIELD, &flip_pose(&FIELD, &mirror_pose(&FIELD, &pose))),
        );
        assert_pose_near(&out, &pose, 1e-9);
    }

    #[test]
    fn test_transform_state_order() {
        let state = VehicleState {
            pose: Pose2::new(1.0, 1.0, 0.5),
            vx_ms: 1.0,
            vy_ms: 0.5,
            omega_rads: 0.2,
            module_forces_n: vec![[2.0, 1.0]],
        };

        // Mirror then flip applied by hand must match transform_state
        let expected = flip_state(&FIELD, &mirror_state(&FIELD, &state));
        let got = transform_state(&FIELD, &state, true, Alliance::Red);

        assert_pose_near(&got.pose, &expected.pose, 1e-12);
        assert_eq!(got.vx_ms, expected.vx_ms);
        assert_eq!(got.vy_ms, expected.vy_ms);
        assert_eq!(got.omega_rads, expected.omega_rads);
        assert_eq!(got.module_forces_n, expected.module_forces_n);
    }

    #[test]
    fn test_blue_alliance_never_flips() {
        let pose = Pose2::new(4.0, 2.0, 1.0);
        let out = transform_pose(&FIELD, &pose, false, Alliance::Blue);
        assert_pose_near(&out, &pose, 1e-12);
    }
}
