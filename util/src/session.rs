//! Session management
//!
//! A session is one execution of the software. It owns a timestamped output
//! directory holding the log file, CSV archives and any JSON artefacts saved
//! during the run. Saving happens on a background thread so that the control
//! loop never blocks on file IO.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::{info, warn};
use std::fs;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

// Internal imports
use crate::host;
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();
static SAVE_SENDER: OnceCell<Mutex<Sender<SaveItem>>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which displays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Poll period of the background save thread.
const SAVE_POLL_PERIOD: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

type SaveItem = (PathBuf, Box<dyn Serialize + Send>);

/// A struct storing information about the current session
#[derive(Clone)]
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The root directory for this session's archives
    pub arch_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,

    save_sender: Sender<SaveItem>,

    save_stop: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    HostError(#[from] host::HostError),

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "Cannot initialise the session epoch, have you already initialised \
         the session? (conquer_once error: {0})"
    )]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}`
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        // Set the session epoch
        SESSION_EPOCH
            .try_init_once(Utc::now)
            .map_err(SessionError::CannotInitEpoch)?;

        let epoch = match SESSION_EPOCH.get() {
            Some(e) => *e,
            None => return Err(SessionError::CannotGetEpoch),
        };

        // Create the session path
        let mut path = host::get_swerve_sw_root()?;
        path.push(sessions_dir);
        path.push(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));

        fs::create_dir_all(path.clone()).map_err(SessionError::CannotCreateDir)?;

        // Create the archive dir
        let mut arch_path = path.clone();
        arch_path.push("arch");
        fs::create_dir_all(arch_path.clone()).map_err(SessionError::CannotCreateDir)?;

        // Create the log file path
        let mut log_file_path = path.clone();
        log_file_path.push(format!("{}.log", exec_name));

        // Create sender/receiver and keep a copy of the sender in the static
        // so that free functions can save without a Session reference
        let (tx, rx) = channel();
        SAVE_SENDER.init_once(|| Mutex::new(tx.clone()));

        // Spawn background save thread
        let save_stop = Arc::new(AtomicBool::new(false));
        let session_root = path.clone();
        let stop = save_stop.clone();
        thread::spawn(move || save_thread(stop, session_root, rx));

        Ok(Session {
            session_root: path,
            arch_root: arch_path,
            log_file_path,
            save_sender: tx,
            save_stop,
        })
    }

    /// Exit the session, waiting for the save thread to finish any pending
    /// actions.
    pub fn exit(self) {
        self.save_stop.store(true, Ordering::Relaxed);

        info!("Stopping save thread");

        // The save thread sets the flag back to false once it has drained all
        // pending items
        while self.save_stop.load(Ordering::Relaxed) {
            thread::sleep(SAVE_POLL_PERIOD);
        }

        info!("Save thread exited");
    }

    /// Saves the given data to the given session-relative path in a background
    /// thread.
    pub fn save<P: AsRef<Path>, T: Serialize + Send + 'static>(&self, path: P, data: T) {
        if let Err(e) = self
            .save_sender
            .send((path.as_ref().to_path_buf(), Box::new(data)))
        {
            warn!(
                "Could not send data to be saved to path {:?}: {}",
                path.as_ref(),
                e
            )
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Returns `0.0` if the session epoch has not yet been initialised, so that
/// log formatting never panics during early startup.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => {
            let elapsed = Utc::now() - *e;
            time::duration_to_seconds(elapsed).unwrap_or(std::f64::NAN)
        }
        None => 0.0,
    }
}

/// Return a reference to the session's epoch.
///
/// # Panics
/// - This function will panic if the session epoch has not been initialised,
///   which is performed on creating a new Session instance.
pub fn get_epoch() -> &'static DateTime<Utc> {
    match SESSION_EPOCH.get() {
        Some(e) => e,
        None => panic!("Cannot get the session epoch!"),
    }
}

/// Save the given data into the session-relative path
pub fn save<P: AsRef<Path>, T: Serialize + Send + 'static>(path: P, data: T) {
    let sender = match SAVE_SENDER.get() {
        Some(m) => m,
        None => {
            warn!("Cannot save data as session is not initialised yet");
            return;
        }
    };

    match sender.lock() {
        Ok(s) => {
            if let Err(e) = s.send((path.as_ref().to_path_buf(), Box::new(data))) {
                warn!(
                    "Couldn't send data to save thread for file {:?}: {}",
                    path.as_ref(),
                    e
                );
            }
        }
        Err(_) => warn!("Couldn't get lock on save sender"),
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn save_thread(stop: Arc<AtomicBool>, session_root: PathBuf, receiver: Receiver<SaveItem>) {
    loop {
        match receiver.recv_timeout(SAVE_POLL_PERIOD) {
            Ok((path, data)) => save_item(&session_root, &path, data),
            Err(_) => {
                // No pending data, check if we should stop. Setting the flag
                // back to false signals to `Session::exit` that we're done.
                if stop.load(Ordering::Relaxed) {
                    stop.store(false, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

fn save_item(session_root: &Path, path: &Path, data: Box<dyn Serialize + Send>) {
    let full_path = session_root.join(path);

    // Only JSON output is supported by the save thread, CSV archives go
    // through `archive::Archiver` instead.
    match full_path.extension().and_then(|s| s.to_str()) {
        Some("json") => (),
        ext => {
            warn!(
                "Unrecognised file path extension for {:?} (got {:?})",
                full_path, ext
            );
            return;
        }
    }

    let parent = match full_path.parent() {
        Some(p) => p,
        None => {
            warn!("Couldn't find parent directory for {:?}", full_path);
            return;
        }
    };
    if let Err(e) = fs::create_dir_all(parent) {
        warn!(
            "Couldn't create parent directory for {:?}: {}",
            full_path, e
        );
        return;
    }

    let file = match OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(&full_path)
    {
        Ok(f) => f,
        Err(e) => {
            warn!("Couldn't create file {:?}: {}", full_path, e);
            return;
        }
    };

    if let Err(e) = serde_json::to_writer_pretty(&file, &data) {
        warn!("Couldn't serialize data for file {:?}: {}", full_path, e);
    }
}
