//! Main swerve executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Start the odometry sampler thread
//!     - Main loop (fixed period):
//!         - Drain the odometry sample queues
//!         - Pose estimation processing (odometry fusion + vision)
//!         - Trajectory tracking processing
//!         - Actuation output to the simulated drivetrain
//!
//! The trajectory to track is given as the single CLI argument, a JSON file
//! produced by the offline generator. Execution ends when tracking finishes.
//!
//! # Modules
//!
//! All modules (e.g. `traj_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use swerve_lib::{
    data_store::DataStore,
    odom_sampler::{drain_synced, OdomSampler, OdomSamplerParams, SampleQueue, SignalHandle},
    pose_est::{OdometrySample, VisionMeasurement},
    sim_drive::SimDrive,
    traj_ctrl,
    trajectory::Trajectory,
    kinematics::ModulePosition,
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use nalgebra::Vector2;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Top-level executable parameters.
#[derive(Deserialize)]
struct ExecParams {
    /// Target period of one main loop cycle
    cycle_period_s: f64,

    /// Which backend provides the odometry signals
    signal_source: SignalSourceKind,

    /// Whether the trajectory should be mirrored across the centreline
    mirror_path: bool,

    /// Module mounting positions in the robot frame, `[x, y]` per module
    module_locations_m: Vec<[f64; 2]>,

    /// Cycles between simulated vision measurements
    vision_period_cycles: u64,

    /// Standard deviations reported with simulated vision measurements
    vision_std_devs: [f64; 3],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Available odometry signal backends.
///
/// Selected by configuration at startup; hardware variants slot in here
/// without touching the sampler.
#[derive(Deserialize, Debug, Copy, Clone)]
enum SignalSourceKind {
    /// Signals read from the simulated drivetrain
    Sim,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("swerve_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Swerve Drive Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: ExecParams =
        util::params::load("exec.toml").wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- LOAD TRAJECTORY ----

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        return Err(eyre!(
            "Expected exactly one argument (the trajectory file), found {}",
            args.len() - 1
        ));
    }

    let trajectory =
        Trajectory::from_file(Path::new(&args[1])).wrap_err("Failed to load the trajectory")?;

    info!(
        "Loaded trajectory from \"{}\", duration {:.02} s\n",
        &args[1],
        trajectory.duration_s()
    );

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    // ---- INITIALISE MODULES ----

    ds.pose_est
        .init("pose_est.toml", &session)
        .wrap_err("Failed to initialise PoseEst")?;
    info!("PoseEst init complete");

    ds.traj_ctrl
        .init("traj_ctrl.toml", &session)
        .wrap_err("Failed to initialise TrajCtrl")?;
    info!("TrajCtrl init complete");

    info!("Module initialisation complete\n");

    // ---- INITIALISE SIMULATED DRIVETRAIN ----

    let module_locations: Vec<Vector2<f64>> = exec_params
        .module_locations_m
        .iter()
        .map(|l| Vector2::new(l[0], l[1]))
        .collect();
    let num_modules = module_locations.len();
    let sim = SimDrive::new(module_locations);

    info!("Simulated drivetrain initialised with {} modules", num_modules);

    // ---- INITIALISE ODOMETRY SAMPLER ----

    let sampler_params: OdomSamplerParams =
        util::params::load("odom_sampler.toml").wrap_err("Could not load sampler params")?;
    let mut sampler = OdomSampler::new(sampler_params);

    let ts_queue = sampler
        .make_timestamp_queue()
        .wrap_err("Failed to create the timestamp queue")?;

    let mut drive_handles: Vec<SignalHandle> = Vec::with_capacity(num_modules);
    let mut steer_handles: Vec<SignalHandle> = Vec::with_capacity(num_modules);
    let yaw_handle = match exec_params.signal_source {
        SignalSourceKind::Sim => {
            for i in 0..num_modules {
                drive_handles.push(
                    sampler
                        .register_signal(sim.drive_distance_signal(i))
                        .wrap_err("Failed to register drive signal")?,
                );
                steer_handles.push(
                    sampler
                        .register_signal(sim.steer_angle_signal(i))
                        .wrap_err("Failed to register steer signal")?,
                );
            }
            sampler
                .register_signal(sim.yaw_signal())
                .wrap_err("Failed to register yaw signal")?
        }
    };

    sampler.start().wrap_err("Failed to start the sampler")?;

    // ---- ACTIVATE TRACKING ----

    let vision = ds
        .pose_est
        .vision_input()
        .wrap_err("Failed to get the vision input handle")?;

    ds.traj_ctrl
        .activate(
            trajectory,
            exec_params.mirror_path,
            session::get_elapsed_seconds(),
        )
        .wrap_err("Failed to activate trajectory tracking")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start();

        // ---- DATA INPUT ----

        // Drain all odometry queues to matched lengths
        let value_queues: Vec<&SampleQueue> = drive_handles
            .iter()
            .chain(steer_handles.iter())
            .chain(std::iter::once(&yaw_handle))
            .map(|h| &h.queue)
            .collect();
        let (timestamps, values) = drain_synced(&ts_queue, &value_queues);

        // A disconnected gyro freezes at its last-known-good value, fall
        // back to the kinematic rotation estimate instead
        let yaw_connected = yaw_handle.is_connected();
        if !yaw_connected {
            warn!("Gyro disconnected, using kinematic rotation only");
        }

        // A concurrent overwrite during the drain can leave a value vector
        // one short, only batch up to the shortest
        let num_samples = values
            .iter()
            .map(|v| v.len())
            .min()
            .unwrap_or(0)
            .min(timestamps.len());

        for (k, timestamp_s) in timestamps.iter().enumerate().take(num_samples) {
            let wheel_positions = (0..num_modules)
                .map(|i| ModulePosition {
                    distance_m: values[i][k],
                    angle_rad: values[num_modules + i][k],
                })
                .collect();

            ds.pose_est_input.odometry.push(OdometrySample {
                timestamp_s: *timestamp_s,
                wheel_positions,
                yaw_rad: if yaw_connected {
                    Some(values[2 * num_modules][k])
                } else {
                    None
                },
            });
        }

        // Simulated vision observes the true pose on a slow period
        if ds.num_cycles % u128::from(exec_params.vision_period_cycles) == 0 {
            let sent = vision.add_measurement(VisionMeasurement {
                pose: sim.true_pose(),
                timestamp_s: session::get_elapsed_seconds(),
                std_devs: exec_params.vision_std_devs,
            });
            if !sent {
                warn!("Vision queue full, measurement dropped");
            }
        }

        // ---- CONTROL ALGORITHM PROCESSING ----

        // PoseEst processing
        match ds.pose_est.proc(&ds.pose_est_input) {
            Ok((o, r)) => {
                ds.pose_est_output = o;
                ds.pose_est_status_rpt = r;
            }
            Err(e) => warn!("Error during PoseEst processing: {}", e),
        };

        // TrajCtrl processing
        ds.traj_ctrl_input = traj_ctrl::InputData {
            pose: ds.pose_est_output.pose,
            velocity: ds.pose_est_output.velocity,
            now_s: session::get_elapsed_seconds(),
        };
        match ds.traj_ctrl.proc(&ds.traj_ctrl_input) {
            Ok((o, r)) => {
                ds.traj_ctrl_output = o;
                ds.traj_ctrl_status_rpt = r;
            }
            Err(e) => warn!("Error during TrajCtrl processing: {}", e),
        };

        // ---- ACTUATION ----

        if let Some(speeds) = ds.traj_ctrl_output.speeds {
            sim.run_velocity(speeds, &ds.traj_ctrl_output.module_forces_n);
        }
        sim.step(exec_params.cycle_period_s);

        if ds.traj_ctrl.is_finished() {
            info!("Trajectory tracking finished, stopping");
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(exec_params.cycle_period_s).checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - exec_params.cycle_period_s
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    sampler.stop();

    if sampler.overflow_count() > 0 {
        warn!(
            "{} odometry samples were dropped to queue overflow",
            sampler.overflow_count()
        );
    }

    info!("End of execution");

    session.exit();

    Ok(())
}
