//! Feedback controllers used by the trajectory tracker
//!
//! A plain PID controller (optionally with continuous angular input), a
//! trapezoidal velocity profile, and a profiled point controller built from
//! the two. All controllers take explicit timestamps rather than reading a
//! clock, so tests can drive them deterministically.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use util::maths::ang_dist;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller over explicitly-timestamped samples.
#[derive(Debug, Clone, Default)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,

    /// If true errors are computed along the shortest angular arc, wrapping
    /// at plus/minus pi
    continuous: bool,

    integral: f64,

    /// Previous error and its timestamp, for the derivative term
    last: Option<(f64, f64)>,
}

/// Velocity and acceleration limits of a trapezoid profile.
#[derive(Debug, Copy, Clone, Default)]
pub struct Constraints {
    pub max_vel: f64,
    pub max_acc: f64,
}

/// Position and velocity of a profile at one instant.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

/// A trapezoidal velocity profile between two states.
#[derive(Debug, Copy, Clone, Default)]
pub struct TrapezoidProfile {
    constraints: Constraints,
}

/// A point controller which follows a trapezoid profile toward its goal and
/// applies PID feedback against the profile position.
///
/// The output is the feedback plus the profile's setpoint velocity, so when
/// the profile is reseeded at the measured state the output is continuous
/// with the measured motion.
#[derive(Debug, Clone, Default)]
pub struct ProfiledPid {
    pid: PidController,
    profile: TrapezoidProfile,
    setpoint: ProfileState,
    last_time_s: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            continuous: false,
            integral: 0.0,
            last: None,
        }
    }

    /// Treat the input as an angle, computing errors along the shortest arc.
    pub fn enable_continuous_input(mut self) -> Self {
        self.continuous = true;
        self
    }

    /// Replace the gains, keeping accumulated state.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
    }

    /// Clear the integrator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last = None;
    }

    /// Compute the controller output for one sample taken at `now_s`.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, now_s: f64) -> f64 {
        let error = if self.continuous {
            ang_dist(measurement, setpoint)
        } else {
            setpoint - measurement
        };

        let mut derivative = 0.0;
        if let Some((last_error, last_time_s)) = self.last {
            let dt = now_s - last_time_s;
            if dt > 0.0 {
                self.integral += error * dt;
                derivative = (error - last_error) / dt;
            }
        }
        self.last = Some((error, now_s));

        self.kp * error + self.ki * self.integral + self.kd * derivative
    }
}

impl TrapezoidProfile {
    pub fn new(constraints: Constraints) -> Self {
        Self { constraints }
    }

    /// The profile state `t_s` seconds after `current`, heading for `goal`.
    ///
    /// The profile accelerates at the limit, cruises at the velocity limit
    /// if the distance allows, and decelerates to arrive at the goal state.
    /// Once the goal is reachable within `t_s` the goal itself is returned.
    pub fn calculate(&self, t_s: f64, current: &ProfileState, goal: &ProfileState) -> ProfileState {
        // Work in a frame where the goal is ahead of the current position
        let direction = if current.position > goal.position {
            -1.0
        } else {
            1.0
        };
        let mut current = current.directed(direction);
        let goal = goal.directed(direction);

        let max_vel = self.constraints.max_vel;
        let max_acc = self.constraints.max_acc;

        if current.velocity > max_vel {
            current.velocity = max_vel;
        }

        // Times and distances to ramp between the endpoint velocities and
        // the cruise velocity
        let cutoff_begin_s = current.velocity / max_acc;
        let cutoff_dist_begin = cutoff_begin_s * cutoff_begin_s * max_acc / 2.0;
        let cutoff_end_s = goal.velocity / max_acc;
        let cutoff_dist_end = cutoff_end_s * cutoff_end_s * max_acc / 2.0;

        let full_trapezoid_dist =
            cutoff_dist_begin + (goal.position - current.position) + cutoff_dist_end;
        let mut accel_time_s = max_vel / max_acc;

        // If the distance is too short to reach cruise velocity the profile
        // degenerates to a triangle
        let mut full_speed_dist = full_trapezoid_dist - accel_time_s * accel_time_s * max_acc;
        if full_speed_dist < 0.0 {
            accel_time_s = (full_trapezoid_dist / max_acc).sqrt();
            full_speed_dist = 0.0;
        }

        let end_accel_s = accel_time_s - cutoff_begin_s;
        let end_full_speed_s = end_accel_s + full_speed_dist / max_vel;
        let end_decel_s = end_full_speed_s + accel_time_s - cutoff_end_s;

        let mut result = current;
        if t_s < end_accel_s {
            result.velocity += t_s * max_acc;
            result.position += (current.velocity + t_s * max_acc / 2.0) * t_s;
        } else if t_s < end_full_speed_s {
            result.velocity = max_vel;
            result.position += (current.velocity + end_accel_s * max_acc / 2.0) * end_accel_s
                + max_vel * (t_s - end_accel_s);
        } else if t_s <= end_decel_s {
            let time_left_s = end_decel_s - t_s;
            result.velocity = goal.velocity + time_left_s * max_acc;
            result.position = goal.position - (goal.velocity + time_left_s * max_acc / 2.0) * time_left_s;
        } else {
            result = goal;
        }

        result.directed(direction)
    }
}

impl ProfileState {
    fn directed(&self, direction: f64) -> Self {
        Self {
            position: self.position * direction,
            velocity: self.velocity * direction,
        }
    }
}

impl ProfiledPid {
    pub fn new(kp: f64, ki: f64, kd: f64, constraints: Constraints) -> Self {
        Self {
            pid: PidController::new(kp, ki, kd).enable_continuous_input(),
            profile: TrapezoidProfile::new(constraints),
            setpoint: ProfileState::default(),
            last_time_s: None,
        }
    }

    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.pid.set_gains(kp, ki, kd);
    }

    /// Reseed the profile at the measured state.
    ///
    /// Called on the tick a new goal first becomes active so that the first
    /// output is continuous with the measured motion.
    pub fn reset(&mut self, measurement: f64, velocity: f64) {
        self.setpoint = ProfileState {
            position: measurement,
            velocity,
        };
        self.pid.reset();
        self.last_time_s = None;
    }

    /// Advance the profile toward `goal_rad` and return feedback plus the
    /// profile's setpoint velocity.
    pub fn calculate(&mut self, measurement: f64, goal_rad: f64, now_s: f64) -> f64 {
        // Shift the goal and the running setpoint into the revolution
        // nearest the measurement, the profile itself is not periodic
        let goal = ProfileState {
            position: measurement + ang_dist(measurement, goal_rad),
            velocity: 0.0,
        };
        self.setpoint.position = measurement + ang_dist(measurement, self.setpoint.position);

        let dt = match self.last_time_s {
            Some(t) => (now_s - t).max(0.0),
            None => 0.0,
        };
        self.last_time_s = Some(now_s);

        self.setpoint = self.profile.calculate(dt, &self.setpoint, &goal);

        self.pid.calculate(measurement, self.setpoint.position, now_s) + self.setpoint.velocity
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_pid_proportional() {
        let mut pid = PidController::new(2.0, 0.0, 0.0);
        let out = pid.calculate(0.5, 1.0, 0.0);
        assert!((out - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pid_derivative() {
        let mut pid = PidController::new(0.0, 0.0, 1.0);

        pid.calculate(0.0, 1.0, 0.0);
        // Error falls from 1.0 to 0.5 over 0.5 s, derivative -1.0
        let out = pid.calculate(0.5, 1.0, 0.5);
        assert!((out - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_pid_continuous_wraps_error() {
        let mut pid = PidController::new(1.0, 0.0, 0.0).enable_continuous_input();

        // Going from just below +pi to just above -pi is a short positive
        // step through the seam, not a near-full negative revolution
        let out = pid.calculate(PI - 0.1, -PI + 0.1, 0.0);
        assert!((out - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_pid_reset_clears_integral() {
        let mut pid = PidController::new(0.0, 1.0, 0.0);

        pid.calculate(0.0, 1.0, 0.0);
        pid.calculate(0.0, 1.0, 1.0);
        pid.reset();

        // With the integrator cleared and only one post-reset sample the
        // output is zero
        let out = pid.calculate(0.0, 1.0, 2.0);
        assert!(out.abs() < 1e-12);
    }

    #[test]
    fn test_trapezoid_reaches_goal() {
        let profile = TrapezoidProfile::new(Constraints {
            max_vel: 2.0,
            max_acc: 4.0,
        });
        let goal = ProfileState {
            position: 3.0,
            velocity: 0.0,
        };

        let mut state = ProfileState::default();
        for _ in 0..200 {
            state = profile.calculate(0.02, &state, &goal);
            assert!(state.velocity.abs() <= 2.0 + 1e-9);
        }

        assert!((state.position - 3.0).abs() < 1e-6);
        assert!(state.velocity.abs() < 1e-6);
    }

    #[test]
    fn test_trapezoid_negative_direction() {
        let profile = TrapezoidProfile::new(Constraints {
            max_vel: 1.0,
            max_acc: 2.0,
        });
        let goal = ProfileState {
            position: -2.0,
            velocity: 0.0,
        };

        let mut state = ProfileState::default();
        for _ in 0..300 {
            state = profile.calculate(0.02, &state, &goal);
        }

        assert!((state.position - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_profiled_pid_continuous_after_reset() {
        let mut ctrl = ProfiledPid::new(
            5.0,
            0.0,
            0.0,
            Constraints {
                max_vel: 8.0,
                max_acc: 20.0,
            },
        );

        // Robot turning at 1.2 rad/s when the controller is reseeded. The
        // first output must match the measured rate
        ctrl.reset(0.4, 1.2);
        let out = ctrl.calculate(0.4, 2.0, 10.0);
        assert!((out - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_profiled_pid_converges() {
        let mut ctrl = ProfiledPid::new(
            5.0,
            0.0,
            0.0,
            Constraints {
                max_vel: 8.0,
                max_acc: 20.0,
            },
        );

        // Crude plant: heading integrates the commanded rate directly
        let mut heading = 0.0;
        let mut now = 0.0;
        ctrl.reset(heading, 0.0);
        for _ in 0..300 {
            let omega = ctrl.calculate(heading, 1.5, now);
            heading += omega * 0.02;
            now += 0.02;
        }

        assert!((heading - 1.5).abs() < 1e-3);
    }
}
