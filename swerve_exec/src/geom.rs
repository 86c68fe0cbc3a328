//! # Planar geometry types
//!
//! Poses, twists and chassis speeds for the swerve drivetrain. The field is a
//! continuous planar frame with no wraparound, headings are always normalised
//! into `(-pi, pi]`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// Internal
use util::maths::wrap_to_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A position and heading on the field plane.
///
/// The heading is the angle between the robot's forward axis and the field's
/// positive X axis, anticlockwise positive.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose2 {
    /// Position in the field frame
    pub position_m: Vector2<f64>,

    /// Heading in the field frame, in `(-pi, pi]`
    pub heading_rad: f64,
}

/// A planar displacement over some interval: forward, leftward and angular
/// components, expressed in the robot frame at the start of the interval.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Twist2 {
    pub dx_m: f64,
    pub dy_m: f64,
    pub dtheta_rad: f64,
}

/// Linear and angular velocity of the chassis.
///
/// Whether the translational components are field- or robot-relative depends
/// on context and is documented at each use site.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub vx_ms: f64,
    pub vy_ms: f64,
    pub omega_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose2 {
    /// Create a new pose, normalising the heading.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad: wrap_to_pi(heading_rad),
        }
    }

    /// Advance this pose by a twist using the SE(2) exponential map.
    ///
    /// The twist is expressed in the robot frame at the start of the
    /// interval. Integrating this way is exact for constant twists, so the
    /// odometry update does not accumulate discretisation error on arcs.
    pub fn exp(&self, twist: &Twist2) -> Self {
        let dtheta = twist.dtheta_rad;

        // Small angle series for sin(t)/t and (1-cos(t))/t
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };

        let translation_rb = Vector2::new(
            twist.dx_m * s - twist.dy_m * c,
            twist.dx_m * c + twist.dy_m * s,
        );

        Self {
            position_m: self.position_m + Rotation2::new(self.heading_rad) * translation_rb,
            heading_rad: wrap_to_pi(self.heading_rad + dtheta),
        }
    }
}

impl Default for Pose2 {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl Twist2 {
    pub fn new(dx_m: f64, dy_m: f64, dtheta_rad: f64) -> Self {
        Self {
            dx_m,
            dy_m,
            dtheta_rad,
        }
    }
}

impl ChassisSpeeds {
    pub fn new(vx_ms: f64, vy_ms: f64, omega_rads: f64) -> Self {
        Self {
            vx_ms,
            vy_ms,
            omega_rads,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Rotate a planar vector by the given angle.
pub fn rotate_vec(v: &Vector2<f64>, angle_rad: f64) -> Vector2<f64> {
    Rotation2::new(angle_rad) * v
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    fn assert_near(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn test_exp_straight_line() {
        let pose = Pose2::new(1.0, 2.0, PI / 2.0);
        let next = pose.exp(&Twist2::new(0.5, 0.0, 0.0));

        // Driving forward while facing +Y moves along +Y
        assert_near(next.position_m.x, 1.0, 1e-12);
        assert_near(next.position_m.y, 2.5, 1e-12);
        assert_near(next.heading_rad, PI / 2.0, 1e-12);
    }

    #[test]
    fn test_exp_quarter_arc() {
        // A constant twist of (pi/2, 0, pi/2) from the origin traces a
        // quarter circle of radius 1, ending at (1, 1) facing +Y
        let pose = Pose2::default();
        let next = pose.exp(&Twist2::new(PI / 2.0, 0.0, PI / 2.0));

        assert_near(next.position_m.x, 1.0, 1e-9);
        assert_near(next.position_m.y, 1.0, 1e-9);
        assert_near(next.heading_rad, PI / 2.0, 1e-9);
    }

    #[test]
    fn test_exp_wraps_heading() {
        let pose = Pose2::new(0.0, 0.0, PI - 0.1);
        let next = pose.exp(&Twist2::new(0.0, 0.0, 0.2));

        assert_near(next.heading_rad, -PI + 0.1, 1e-12);
    }

    #[test]
    fn test_rotate_vec() {
        let v = rotate_vec(&Vector2::new(1.0, 0.0), PI / 2.0);
        assert_near(v.x, 0.0, 1e-12);
        assert_near(v.y, 1.0, 1e-12);
    }
}
