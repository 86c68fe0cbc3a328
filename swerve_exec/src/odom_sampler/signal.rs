//! Sensor signal abstraction for the odometry sampler
//!
//! Hardware sensors differ per vendor, so the sampler works against a small
//! capability set instead: pull a value, report read failure. Which concrete
//! implementation backs a signal is selected by configuration at startup,
//! never by subtype dispatch at runtime.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A sensor signal the sampler can read periodically.
pub trait Signal: Send {
    /// Read the current value of the signal.
    fn read(&mut self) -> Result<f64, SignalError>;
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised when reading a signal.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    #[error("Signal read failed: {0}")]
    ReadFailed(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A falling-edge debouncer.
///
/// The output stays true for as long as the input was true within the last
/// `debounce_s` seconds, filtering transient sensor dropouts out of the
/// connectivity flag.
#[derive(Debug, Clone)]
pub struct Debouncer {
    debounce_s: f64,
    last_high_s: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Debouncer {
    pub fn new(debounce_s: f64) -> Self {
        Self {
            debounce_s,
            last_high_s: None,
        }
    }

    /// Feed one input sample taken at `now_s`, returning the debounced
    /// output.
    pub fn calculate(&mut self, input: bool, now_s: f64) -> bool {
        if input {
            self.last_high_s = Some(now_s);
            return true;
        }

        match self.last_high_s {
            Some(t) => now_s - t < self.debounce_s,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
