//! Trajectory tracking module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::*;
use crate::field::transform_state;
use crate::geom::{rotate_vec, ChassisSpeeds, Pose2};
use crate::trajectory::Trajectory;
use crate::tuning::Tunable;
use util::archive::Archiver;
use util::maths::{ang_dist, wrap_to_pi};
use util::module::State;
use util::{params, session, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Trajectory tracking module state.
#[derive(Default)]
pub struct TrajCtrl {
    params: TrajCtrlParams,

    /// Executing mode
    mode: Mode,

    input_data: InputData,
    output_data: OutputData,
    report: StatusReport,

    /// The trajectory currently being tracked
    trajectory: Option<Trajectory>,

    /// Whether the loaded trajectory is mirrored across the centreline
    mirror: bool,

    /// Timestamp at which tracking started
    start_time_s: f64,

    /// Override rotation target, tracked instead of the trajectory heading
    /// while set
    override_rotation_rad: Option<f64>,

    /// True once the override controller has been reseeded for the current
    /// override activation
    override_seeded: bool,

    /// Controller objects used to calculate the output command
    controllers: TrajControllers,

    /// Hot-swappable gain handles, snapshotted once at the top of each tick
    gains: Option<GainTunables>,

    arch_tick: Archiver,
}

/// Controller set: independent x and y loops sharing gains, a continuous
/// heading loop, and the profiled override rotation controller.
#[derive(Default)]
pub struct TrajControllers {
    pub x_pid: PidController,
    pub y_pid: PidController,
    pub heading_pid: PidController,
    pub override_pid: ProfiledPid,
}

/// Tunable handles for the tracker gains.
struct GainTunables {
    linear_kp: Tunable,
    linear_kd: Tunable,
    heading_kp: Tunable,
    heading_kd: Tunable,
}

/// Input data to the module
#[derive(Default, Copy, Clone)]
pub struct InputData {
    /// Current fused pose estimate
    pub pose: Pose2,

    /// Current measured robot velocity
    pub velocity: ChassisSpeeds,

    /// Timestamp of the estimate
    pub now_s: f64,
}

/// Output command for one tick.
#[derive(Default, Clone)]
pub struct OutputData {
    /// Field-relative velocity command. `None` outside tracking.
    pub speeds: Option<ChassisSpeeds>,

    /// Module force feedforward hints rotated into the field frame
    pub module_forces_n: Vec<[f64; 2]>,
}

/// The status report containing various monitoring quantities.
#[derive(Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// Time into the trajectory
    pub elapsed_s: f64,

    /// Translation error to the setpoint
    pub x_error_m: f64,
    pub y_error_m: f64,

    /// Heading error to the setpoint, along the shortest arc
    pub heading_error_rad: f64,

    /// True while an override rotation target is being tracked
    pub override_active: bool,

    /// True once the trajectory has completed (or been cancelled)
    pub finished: bool,
}

/// Flat per-tick archive record.
#[derive(Serialize)]
struct TickRecord {
    elapsed_s: f64,
    meas_x_m: f64,
    meas_y_m: f64,
    meas_heading_rad: f64,
    set_x_m: f64,
    set_y_m: f64,
    set_heading_rad: f64,
    fb_vx_ms: f64,
    fb_vy_ms: f64,
    fb_omega_rads: f64,
    ff_vx_ms: f64,
    ff_vy_ms: f64,
    ff_omega_rads: f64,
    override_rotation_rad: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The possible modes of execution of TrajCtrl. Each mode is handled by a
/// `mode_xyz` function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Tracking,
    Finished,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Idle
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for TrajCtrl {
    type InitData = &'static str;
    type InitError = TrajCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = TrajCtrlError;

    /// Initialise the TrajCtrl module.
    ///
    /// Expected init data is the name of the parameter file.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), TrajCtrlError> {
        self.params = params::load(init_data).map_err(TrajCtrlError::ParamLoadError)?;

        self.controllers = TrajControllers::new(&self.params);
        self.gains = Some(GainTunables::new(&self.params));

        self.arch_tick = Archiver::from_path(session, "traj_ctrl/tick.csv")
            .map_err(|e| TrajCtrlError::ArchiveError(e.to_string()))?;

        Ok(())
    }

    /// Process one tick of trajectory tracking.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), TrajCtrlError> {
        // Setup cycle data
        self.input_data = *input_data;
        self.output_data = OutputData::default();
        self.report = StatusReport::default();
        self.report.finished = self.mode == Mode::Finished;

        // Snapshot the tunable gains so the whole tick computes with one
        // consistent gain set
        if let Some(gains) = &self.gains {
            self.controllers.apply_gains(gains, &self.params);
        }

        // Mode execution. Each of the mode functions returns either Ok or an
        // error
        match self.mode {
            Mode::Idle => self.mode_idle(),
            Mode::Tracking => self.mode_tracking(),
            Mode::Finished => self.mode_finished(),
        }?;

        Ok((self.output_data.clone(), self.report))
    }
}

impl TrajCtrl {
    /// Begin tracking a trajectory.
    ///
    /// Tracking starts on the next call to `proc`. The full pose sequence is
    /// transformed with the same mirror-then-flip order used per tick and
    /// saved once through the session for visualisation.
    ///
    /// Activating while a trajectory is already being tracked is an error;
    /// call `cancel` first.
    pub fn activate(
        &mut self,
        trajectory: Trajectory,
        mirror: bool,
        now_s: f64,
    ) -> Result<(), TrajCtrlError> {
        if self.mode == Mode::Tracking {
            return Err(TrajCtrlError::AlreadyTracking);
        }

        info!(
            "Tracking new trajectory, duration {:.3} s, mirror: {}",
            trajectory.duration_s(),
            mirror
        );

        // Transformed pose sequence for visualisation, saved once
        let poses: Vec<Pose2> = trajectory
            .poses()
            .iter()
            .map(|p| {
                crate::field::transform_pose(&self.params.field, p, mirror, self.params.alliance)
            })
            .collect();
        session::save("traj_ctrl/path_poses.json", poses);

        self.controllers.reset();
        self.trajectory = Some(trajectory);
        self.mirror = mirror;
        self.start_time_s = now_s;
        self.override_rotation_rad = None;
        self.override_seeded = false;
        self.mode = Mode::Tracking;

        Ok(())
    }

    /// Cancel the current trajectory.
    ///
    /// Treated identically to normal completion, with no rollback of
    /// controller state.
    pub fn cancel(&mut self) {
        if self.mode == Mode::Tracking {
            info!("Trajectory tracking cancelled");
            self.mode = Mode::Finished;
        }
    }

    /// Set or clear the override rotation target.
    ///
    /// While set, the heading tracks the override target through a profiled
    /// point controller instead of the trajectory heading. Clearing reverts
    /// to the trajectory heading on the next tick.
    pub fn set_override_rotation(&mut self, rotation_rad: Option<f64>) {
        self.override_rotation_rad = rotation_rad.map(wrap_to_pi);
        if rotation_rad.is_none() {
            self.override_seeded = false;
        }
    }

    /// True once the trajectory has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.mode == Mode::Finished
    }

    /// Mode idle.
    ///
    /// No actions are taken in this mode. To move to Tracking the user must
    /// call `activate`.
    fn mode_idle(&mut self) -> Result<(), TrajCtrlError> {
        Ok(())
    }

    /// Mode tracking.
    ///
    /// Samples the trajectory at the elapsed time, transforms the sampled
    /// state, and combines PID feedback with the setpoint's feedforward.
    fn mode_tracking(&mut self) -> Result<(), TrajCtrlError> {
        let now_s = self.input_data.now_s;
        let elapsed_s = now_s - self.start_time_s;

        let (setpoint, duration_s) = {
            let trajectory = self.trajectory.as_ref().ok_or(TrajCtrlError::NoTrajectory)?;
            let duration_s = trajectory.duration_s();

            // Sampling past the end holds the final state
            let raw = trajectory.sample(elapsed_s.min(duration_s));
            (
                transform_state(&self.params.field, &raw, self.mirror, self.params.alliance),
                duration_s,
            )
        };

        let measured = self.input_data.pose;

        // Translational feedback, two independent loops sharing gains
        let fb_vx = self.controllers.x_pid.calculate(
            measured.position_m.x,
            setpoint.pose.position_m.x,
            now_s,
        );
        let fb_vy = self.controllers.y_pid.calculate(
            measured.position_m.y,
            setpoint.pose.position_m.y,
            now_s,
        );

        // Rotation: trajectory heading by default, the profiled override
        // controller while an override target is set
        let (omega, fb_omega, ff_omega) = match self.override_rotation_rad {
            Some(target_rad) => {
                if !self.override_seeded {
                    // Reseed at the measured state so the first output is
                    // continuous with the measured motion
                    self.controllers
                        .override_pid
                        .reset(measured.heading_rad, self.input_data.velocity.omega_rads);
                    self.override_seeded = true;
                }
                let omega =
                    self.controllers
                        .override_pid
                        .calculate(measured.heading_rad, target_rad, now_s);
                (omega, omega, 0.0)
            }
            None => {
                self.override_seeded = false;
                let fb = self.controllers.heading_pid.calculate(
                    measured.heading_rad,
                    setpoint.pose.heading_rad,
                    now_s,
                );
                (fb + setpoint.omega_rads, fb, setpoint.omega_rads)
            }
        };

        // Setpoint velocity is already field-relative, added directly
        let speeds = ChassisSpeeds::new(fb_vx + setpoint.vx_ms, fb_vy + setpoint.vy_ms, omega);

        // Module force hints are generated in the path's local frame, rotate
        // them into the field frame using the commanded heading
        let module_forces_n: Vec<[f64; 2]> = setpoint
            .module_forces_n
            .iter()
            .map(|f| {
                let rotated = rotate_vec(&Vector2::new(f[0], f[1]), setpoint.pose.heading_rad);
                [rotated.x, rotated.y]
            })
            .collect();

        self.report.elapsed_s = elapsed_s;
        self.report.x_error_m = setpoint.pose.position_m.x - measured.position_m.x;
        self.report.y_error_m = setpoint.pose.position_m.y - measured.position_m.y;
        self.report.heading_error_rad = ang_dist(measured.heading_rad, setpoint.pose.heading_rad);
        self.report.override_active = self.override_rotation_rad.is_some();

        if let Err(e) = self.arch_tick.serialise(TickRecord {
            elapsed_s,
            meas_x_m: measured.position_m.x,
            meas_y_m: measured.position_m.y,
            meas_heading_rad: measured.heading_rad,
            set_x_m: setpoint.pose.position_m.x,
            set_y_m: setpoint.pose.position_m.y,
            set_heading_rad: setpoint.pose.heading_rad,
            fb_vx_ms: fb_vx,
            fb_vy_ms: fb_vy,
            fb_omega_rads: fb_omega,
            ff_vx_ms: setpoint.vx_ms,
            ff_vy_ms: setpoint.vy_ms,
            ff_omega_rads: ff_omega,
            override_rotation_rad: self.override_rotation_rad,
        }) {
            warn!("Could not archive tracking tick: {}", e);
        }

        self.output_data.speeds = Some(speeds);
        self.output_data.module_forces_n = module_forces_n;

        // Completion is driven purely by elapsed time against duration
        if elapsed_s >= duration_s {
            info!("Trajectory tracking finished at {:.3} s", elapsed_s);
            self.mode = Mode::Finished;
            self.report.finished = true;
        }

        Ok(())
    }

    /// Mode finished.
    ///
    /// Terminal for the loaded trajectory: a stop command is emitted each
    /// tick until a new trajectory is activated.
    fn mode_finished(&mut self) -> Result<(), TrajCtrlError> {
        self.output_data.speeds = Some(ChassisSpeeds::default());
        self.report.finished = true;
        Ok(())
    }
}

impl TrajControllers {
    pub fn new(params: &TrajCtrlParams) -> Self {
        Self {
            x_pid: PidController::new(params.linear_kp, params.linear_ki, params.linear_kd),
            y_pid: PidController::new(params.linear_kp, params.linear_ki, params.linear_kd),
            heading_pid: PidController::new(
                params.heading_kp,
                params.heading_ki,
                params.heading_kd,
            )
            .enable_continuous_input(),
            override_pid: ProfiledPid::new(
                params.heading_kp,
                params.heading_ki,
                params.heading_kd,
                Constraints {
                    max_vel: params.override_max_vel_rads,
                    max_acc: params.override_max_acc_radss,
                },
            ),
        }
    }

    /// Clear all integrators and derivative memory.
    pub fn reset(&mut self) {
        self.x_pid.reset();
        self.y_pid.reset();
        self.heading_pid.reset();
    }

    /// Apply the current tunable gain snapshot.
    fn apply_gains(&mut self, gains: &GainTunables, params: &TrajCtrlParams) {
        let linear_kp = gains.linear_kp.get();
        let linear_kd = gains.linear_kd.get();
        let heading_kp = gains.heading_kp.get();
        let heading_kd = gains.heading_kd.get();

        self.x_pid.set_gains(linear_kp, params.linear_ki, linear_kd);
        self.y_pid.set_gains(linear_kp, params.linear_ki, linear_kd);
        self.heading_pid
            .set_gains(heading_kp, params.heading_ki, heading_kd);
        self.override_pid
            .set_gains(heading_kp, params.heading_ki, heading_kd);
    }
}

impl GainTunables {
    fn new(params: &TrajCtrlParams) -> Self {
        Self {
            linear_kp: Tunable::new("traj_ctrl/linear_kp", params.linear_kp),
            linear_kd: Tunable::new("traj_ctrl/linear_kd", params.linear_kd),
            heading_kp: Tunable::new("traj_ctrl/heading_kp", params.heading_kp),
            heading_kd: Tunable::new("traj_ctrl/heading_kd", params.heading_kd),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::trajectory::{TrajectorySample, VehicleState};

    /// A tracker initialised without a session, archive writes are skipped.
    fn test_tracker() -> TrajCtrl {
        let params = TrajCtrlParams::default();
        let mut ctrl = TrajCtrl::default();
        ctrl.controllers = TrajControllers::new(&params);
        ctrl.params = params;
        ctrl
    }

    fn stationary_state(pose: Pose2) -> VehicleState {
        VehicleState {
            pose,
            vx_ms: 0.0,
            vy_ms: 0.0,
            omega_rads: 0.0,
            module_forces_n: vec![],
        }
    }

    /// A 2 second trajectory holding one pose.
    fn hold_trajectory(pose: Pose2) -> Trajectory {
        Trajectory::new(vec![
            TrajectorySample {
                time_s: 0.0,
                state: stationary_state(pose),
            },
            TrajectorySample {
                time_s: 2.0,
                state: stationary_state(pose),
            },
        ])
        .unwrap()
    }

    fn input_at(pose: Pose2, now_s: f64) -> InputData {
        InputData {
            pose,
            velocity: ChassisSpeeds::default(),
            now_s,
        }
    }

    #[test]
    fn test_finished_boundary() {
        let mut ctrl = test_tracker();
        let pose = Pose2::new(1.0, 1.0, 0.0);
        ctrl.activate(hold_trajectory(pose), false, 100.0).unwrap();

        let (_, report) = ctrl.proc(&input_at(pose, 101.99)).unwrap();
        assert!(!report.finished);
        assert!(!ctrl.is_finished());

        let (_, report) = ctrl.proc(&input_at(pose, 102.0)).unwrap();
        assert!(report.finished);
        assert!(ctrl.is_finished());
    }

    #[test]
    fn test_zero_error_tracking() {
        let mut ctrl = test_tracker();
        let pose = Pose2::new(3.0, 2.0, 0.5);
        ctrl.activate(hold_trajectory(pose), false, 0.0).unwrap();

        // Robot sits exactly on the setpoint with zero velocity for the full
        // 2 seconds: feedback must be ~0 at every tick, and tracking must
        // not finish early
        let mut now_s = 0.02;
        while now_s < 2.0 {
            let (output, report) = ctrl.proc(&input_at(pose, now_s)).unwrap();
            assert!(!report.finished, "finished early at {}", now_s);

            let speeds = output.speeds.unwrap();
            assert!(speeds.vx_ms.abs() < 1e-9);
            assert!(speeds.vy_ms.abs() < 1e-9);
            assert!(speeds.omega_rads.abs() < 1e-9);

            now_s += 0.02;
        }

        let (_, report) = ctrl.proc(&input_at(pose, 2.0)).unwrap();
        assert!(report.finished);
    }

    #[test]
    fn test_cancel_matches_completion() {
        let mut ctrl = test_tracker();
        let pose = Pose2::new(0.0, 0.0, 0.0);
        ctrl.activate(hold_trajectory(pose), false, 0.0).unwrap();

        ctrl.proc(&input_at(pose, 0.5)).unwrap();
        ctrl.cancel();
        assert!(ctrl.is_finished());

        // Finished emits a stop command
        let (output, report) = ctrl.proc(&input_at(pose, 0.52)).unwrap();
        assert!(report.finished);
        assert_eq!(output.speeds, Some(ChassisSpeeds::default()));
    }

    #[test]
    fn test_activate_while_tracking_rejected() {
        let mut ctrl = test_tracker();
        let pose = Pose2::new(0.0, 0.0, 0.0);
        ctrl.activate(hold_trajectory(pose), false, 0.0).unwrap();

        let result = ctrl.activate(hold_trajectory(pose), false, 0.1);
        assert!(matches!(result, Err(TrajCtrlError::AlreadyTracking)));
    }

    #[test]
    fn test_override_activation_is_continuous() {
        let mut ctrl = test_tracker();

        // A trajectory spinning at a constant 0.7 rad/s
        let trajectory = Trajectory::new(vec![
            TrajectorySample {
                time_s: 0.0,
                state: VehicleState {
                    pose: Pose2::new(0.0, 0.0, 0.0),
                    vx_ms: 0.0,
                    vy_ms: 0.0,
                    omega_rads: 0.7,
                    module_forces_n: vec![],
                },
            },
            TrajectorySample {
                time_s: 4.0,
                state: VehicleState {
                    pose: Pose2::new(0.0, 0.0, 2.8),
                    vx_ms: 0.0,
                    vy_ms: 0.0,
                    omega_rads: 0.7,
                    module_forces_n: vec![],
                },
            },
        ])
        .unwrap();
        ctrl.activate(trajectory, false, 0.0).unwrap();

        // Track perfectly for a few ticks
        let mut now_s = 0.02;
        let mut last_omega = 0.0;
        for _ in 0..10 {
            let input = InputData {
                pose: Pose2::new(0.0, 0.0, 0.7 * now_s),
                velocity: ChassisSpeeds::new(0.0, 0.0, 0.7),
                now_s,
            };
            let (output, _) = ctrl.proc(&input).unwrap();
            last_omega = output.speeds.unwrap().omega_rads;
            now_s += 0.02;
        }

        // Flip the override on mid-trajectory. The commanded rate on the
        // transition tick must be continuous with the previous tick
        ctrl.set_override_rotation(Some(2.5));
        let input = InputData {
            pose: Pose2::new(0.0, 0.0, 0.7 * now_s),
            velocity: ChassisSpeeds::new(0.0, 0.0, 0.7),
            now_s,
        };
        let (output, report) = ctrl.proc(&input).unwrap();
        let omega = output.speeds.unwrap().omega_rads;

        assert!(report.override_active);
        assert!(
            (omega - last_omega).abs() < 0.05,
            "rate stepped from {} to {}",
            last_omega,
            omega
        );
    }

    #[test]
    fn test_override_clear_reverts() {
        let mut ctrl = test_tracker();
        let pose = Pose2::new(0.0, 0.0, 0.0);
        ctrl.activate(hold_trajectory(pose), false, 0.0).unwrap();

        ctrl.set_override_rotation(Some(1.0));
        let (_, report) = ctrl.proc(&input_at(pose, 0.02)).unwrap();
        assert!(report.override_active);

        ctrl.set_override_rotation(None);
        let (output, report) = ctrl.proc(&input_at(pose, 0.04)).unwrap();
        assert!(!report.override_active);

        // Back on the stationary setpoint with zero error the command is ~0
        assert!(output.speeds.unwrap().omega_rads.abs() < 1e-9);
    }

    #[test]
    fn test_module_forces_rotated_into_field_frame() {
        let mut ctrl = test_tracker();

        // Setpoint heading pi/2, a purely forward force hint in the path
        // frame must come out along field +Y
        let pose = Pose2::new(0.0, 0.0, std::f64::consts::PI / 2.0);
        let mut state = stationary_state(pose);
        state.module_forces_n = vec![[1.0, 0.0]];

        let trajectory = Trajectory::new(vec![
            TrajectorySample {
                time_s: 0.0,
                state: state.clone(),
            },
            TrajectorySample { time_s: 1.0, state },
        ])
        .unwrap();
        ctrl.activate(trajectory, false, 0.0).unwrap();

        let (output, _) = ctrl.proc(&input_at(pose, 0.02)).unwrap();
        assert_eq!(output.module_forces_n.len(), 1);
        assert!(output.module_forces_n[0][0].abs() < 1e-12);
        assert!((output.module_forces_n[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_idle_emits_nothing() {
        let mut ctrl = test_tracker();
        let (output, report) = ctrl
            .proc(&input_at(Pose2::default(), 0.0))
            .unwrap();

        assert!(output.speeds.is_none());
        assert!(!report.finished);
    }
}
