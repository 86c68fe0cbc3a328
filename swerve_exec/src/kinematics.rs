//! # Swerve forward kinematics
//!
//! Recovers the chassis motion from what the modules measured. Each module
//! reports a drive-distance delta along its steer direction; with the module
//! mounting positions known, the chassis twist is the least-squares solution
//! of the stacked module constraint equations.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::geom::Twist2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state of one module as sampled by odometry: cumulative drive distance
/// and absolute steer angle (robot-relative).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance_m: f64,
    pub angle_rad: f64,
}

/// Swerve drivetrain forward kinematics.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    /// Module mounting positions in the robot frame
    module_locations_m: Vec<Vector2<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the kinematic model.
#[derive(Debug, Error)]
pub enum KinematicsError {
    #[error("At least two modules are required, got {0}")]
    TooFewModules(usize),

    #[error("Expected {expected} module positions, got {got}")]
    ModuleCountMismatch { expected: usize, got: usize },

    #[error("Module geometry is degenerate, kinematic system is singular")]
    SingularGeometry,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwerveKinematics {
    /// Create the kinematic model from the module mounting positions.
    pub fn new(module_locations_m: Vec<Vector2<f64>>) -> Result<Self, KinematicsError> {
        if module_locations_m.len() < 2 {
            return Err(KinematicsError::TooFewModules(module_locations_m.len()));
        }

        Ok(Self { module_locations_m })
    }

    /// Number of modules in the model.
    pub fn num_modules(&self) -> usize {
        self.module_locations_m.len()
    }

    /// Compute the robot-relative chassis twist which best explains the
    /// given per-module position deltas.
    ///
    /// Each module at position `r` constrains the twist `(dx, dy, dtheta)`
    /// through its measured displacement `d`:
    ///
    /// ```text
    /// d_x = dx - r_y * dtheta
    /// d_y = dy + r_x * dtheta
    /// ```
    ///
    /// With more than two modules the system is over-determined, so it is
    /// solved through the normal equations with a 3x3 inverse.
    pub fn twist_from_deltas(&self, deltas: &[ModulePosition]) -> Result<Twist2, KinematicsError> {
        if deltas.len() != self.module_locations_m.len() {
            return Err(KinematicsError::ModuleCountMismatch {
                expected: self.module_locations_m.len(),
                got: deltas.len(),
            });
        }

        // Accumulate A^T A and A^T b over the two constraint rows of each
        // module
        let mut ata = Matrix3::<f64>::zeros();
        let mut atb = Vector3::<f64>::zeros();

        for (delta, location) in deltas.iter().zip(self.module_locations_m.iter()) {
            let displacement = Vector2::new(
                delta.distance_m * delta.angle_rad.cos(),
                delta.distance_m * delta.angle_rad.sin(),
            );

            let rows = [
                Vector3::new(1.0, 0.0, -location.y),
                Vector3::new(0.0, 1.0, location.x),
            ];
            let rhs = [displacement.x, displacement.y];

            for (row, b) in rows.iter().zip(rhs.iter()) {
                ata += row * row.transpose();
                atb += row * *b;
            }
        }

        let inv = ata
            .try_inverse()
            .ok_or(KinematicsError::SingularGeometry)?;
        let solution = inv * atb;

        Ok(Twist2::new(solution.x, solution.y, solution.z))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    /// A square 0.6 m chassis, modules at the corners.
    fn square_kinematics() -> SwerveKinematics {
        SwerveKinematics::new(vec![
            Vector2::new(0.3, 0.3),
            Vector2::new(0.3, -0.3),
            Vector2::new(-0.3, 0.3),
            Vector2::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    fn assert_twist_near(t: &Twist2, dx: f64, dy: f64, dtheta: f64) {
        assert!((t.dx_m - dx).abs() < 1e-9, "dx {} != {}", t.dx_m, dx);
        assert!((t.dy_m - dy).abs() < 1e-9, "dy {} != {}", t.dy_m, dy);
        assert!(
            (t.dtheta_rad - dtheta).abs() < 1e-9,
            "dtheta {} != {}",
            t.dtheta_rad,
            dtheta
        );
    }

    #[test]
    fn test_pure_translation() {
        let kin = square_kinematics();
        let deltas = vec![
            ModulePosition {
                distance_m: 0.5,
                angle_rad: 0.0
            };
            4
        ];

        let twist = kin.twist_from_deltas(&deltas).unwrap();
        assert_twist_near(&twist, 0.5, 0.0, 0.0);
    }

    #[test]
    fn test_pure_strafe() {
        let kin = square_kinematics();
        let deltas = vec![
            ModulePosition {
                distance_m: 0.25,
                angle_rad: PI / 2.0
            };
            4
        ];

        let twist = kin.twist_from_deltas(&deltas).unwrap();
        assert_twist_near(&twist, 0.0, 0.25, 0.0);
    }

    #[test]
    fn test_pure_rotation() {
        let kin = square_kinematics();
        let radius = (0.3f64 * 0.3 + 0.3 * 0.3).sqrt();
        let dtheta = 0.2;

        // Each module is tangent to its mounting circle
        let deltas: Vec<ModulePosition> = [
            Vector2::<f64>::new(0.3, 0.3),
            Vector2::new(0.3, -0.3),
            Vector2::new(-0.3, 0.3),
            Vector2::new(-0.3, -0.3),
        ]
        .iter()
        .map(|loc| ModulePosition {
            distance_m: radius * dtheta,
            angle_rad: loc.y.atan2(loc.x) + PI / 2.0,
        })
        .collect();

        let twist = kin.twist_from_deltas(&deltas).unwrap();
        assert_twist_near(&twist, 0.0, 0.0, dtheta);
    }

    #[test]
    fn test_module_count_mismatch() {
        let kin = square_kinematics();
        let deltas = vec![
            ModulePosition {
                distance_m: 0.0,
                angle_rad: 0.0
            };
            3
        ];

        assert!(matches!(
            kin.twist_from_deltas(&deltas),
            Err(KinematicsError::ModuleCountMismatch { .. })
        ));
    }

    #[test]
    fn test_too_few_modules() {
        assert!(matches!(
            SwerveKinematics::new(vec![Vector2::new(0.0, 0.0)]),
            Err(KinematicsError::TooFewModules(1))
        ));
    }
}
