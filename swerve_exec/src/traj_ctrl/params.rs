//! Trajectory tracking parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::field::{Alliance, FieldParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the trajectory tracker.
///
/// The PID gains here are defaults only, each is also exposed as a named
/// tunable (`traj_ctrl/...`) which overrides the parameter once set.
#[derive(Deserialize, Debug, Clone)]
pub struct TrajCtrlParams {
    /// Field dimensions, used by the mirror and alliance-flip transforms
    pub field: FieldParams,

    /// Which side the robot starts on. `Red` enables the alliance flip.
    pub alliance: Alliance,

    /// Proportional gain shared by the x and y translation loops
    pub linear_kp: f64,

    /// Integral gain shared by the x and y translation loops
    pub linear_ki: f64,

    /// Derivative gain shared by the x and y translation loops
    pub linear_kd: f64,

    /// Proportional gain of the heading loop
    pub heading_kp: f64,

    /// Integral gain of the heading loop
    pub heading_ki: f64,

    /// Derivative gain of the heading loop
    pub heading_kd: f64,

    /// Maximum angular rate of the override rotation profile
    pub override_max_vel_rads: f64,

    /// Maximum angular acceleration of the override rotation profile
    pub override_max_acc_radss: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for TrajCtrlParams {
    fn default() -> Self {
        Self {
            field: FieldParams {
                length_m: 17.548,
                width_m: 8.052,
            },
            alliance: Alliance::Blue,
            linear_kp: 4.0,
            linear_ki: 0.0,
            linear_kd: 0.0,
            heading_kp: 5.0,
            heading_ki: 0.0,
            heading_kd: 0.0,
            override_max_vel_rads: 8.0,
            override_max_acc_radss: 20.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// The TOML layout here mirrors `params/traj_ctrl.toml`.
    #[test]
    fn test_params_from_toml() {
        let params: TrajCtrlParams = util::params::from_str(
            r#"
            alliance = "Red"
            linear_kp = 4.0
            linear_ki = 0.0
            linear_kd = 0.1
            heading_kp = 5.0
            heading_ki = 0.0
            heading_kd = 0.0
            override_max_vel_rads = 8.0
            override_max_acc_radss = 20.0

            [field]
            length_m = 17.548
            width_m = 8.052
            "#,
        )
        .unwrap();

        assert_eq!(params.alliance, Alliance::Red);
        assert_eq!(params.linear_kd, 0.1);
        assert_eq!(params.field.width_m, 8.052);
    }
}
