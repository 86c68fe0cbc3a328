//! Odometry sampler parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the odometry sampler
#[derive(Deserialize, Debug, Clone)]
pub struct OdomSamplerParams {
    /// Fixed rate of the sampling thread.
    ///
    /// Must comfortably exceed the main tick rate so each drain sees a batch
    /// of fresh samples.
    pub sample_rate_hz: f64,

    /// Capacity of each per-signal queue. Sized to hold several ticks' worth
    /// of samples so a late drain loses nothing.
    pub queue_capacity: usize,

    /// How long reads must keep failing before a signal is reported
    /// disconnected.
    pub disconnect_debounce_s: f64,
}
