//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Normalise an angle into the range `(-pi, pi]`.
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: Float,
{
    let pi = T::from(std::f64::consts::PI).unwrap();
    let tau = T::from(std::f64::consts::TAU).unwrap();

    // Shift into [0, 2pi) then back, so that exactly +pi stays +pi
    let wrapped = rem_euclid(pi - angle, tau);
    pi - wrapped
}

/// Get the shortest signed angular distance from `a` to `b`.
///
/// The result is in `(-pi, pi]`, positive when the shortest rotation from `a`
/// to `b` is anticlockwise.
pub fn ang_dist<T>(a: T, b: T) -> T
where
    T: Float,
{
    wrap_to_pi(b - a)
}

/// Linearly interpolate between `a` and `b` by the factor `t` in `[0, 1]`.
pub fn lerp<T>(a: T, b: T, t: T) -> T
where
    T: Float,
{
    a + (b - a) * t
}

/// Interpolate between two angles along the shortest arc, wrapping the result
/// into `(-pi, pi]`.
pub fn lerp_angle<T>(a: T, b: T, t: T) -> T
where
    T: Float,
{
    wrap_to_pi(a + ang_dist(a, b) * t)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float,
{
    let r = lhs % rhs;
    if r < T::from(0.0).unwrap() {
        r + rhs.abs()
    } else {
        r
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;
    const TAU: f64 = std::f64::consts::TAU;

    #[test]
    fn test_wrap_to_pi() {
        assert!((wrap_to_pi(0.0f64)).abs() < 1e-12);
        assert!((wrap_to_pi(TAU) - 0.0).abs() < 1e-12);
        assert!((wrap_to_pi(PI + 0.5) - (-PI + 0.5)).abs() < 1e-12);
        assert!((wrap_to_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_to_pi(3.0 * PI) - PI).abs() < 1e-12);

        // +pi is in range and must not wrap to -pi
        assert!((wrap_to_pi(PI) - PI).abs() < 1e-12);
        assert!((wrap_to_pi(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_ang_dist() {
        assert!((ang_dist(1.0f64, 2.0) - 1.0).abs() < 1e-12);
        assert!((ang_dist(2.0f64, 1.0) + 1.0).abs() < 1e-12);
        assert!((ang_dist(0.0f64, TAU)).abs() < 1e-12);

        // Wrapping across the -pi/+pi seam takes the short way round
        assert!((ang_dist(PI - 0.1, -PI + 0.1) - 0.2).abs() < 1e-12);
        assert!((ang_dist(-PI + 0.1, PI - 0.1) + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_angle() {
        assert!((lerp_angle(0.0f64, 1.0, 0.5) - 0.5).abs() < 1e-12);

        // Interpolation across the seam stays on the short arc
        let mid = lerp_angle(PI - 0.1, -PI + 0.1, 0.5);
        assert!((mid.abs() - PI).abs() < 1e-9);
    }
}
