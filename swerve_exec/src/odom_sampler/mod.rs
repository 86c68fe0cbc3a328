//! # Odometry signal sampler
//!
//! Samples the drivetrain sensors at a fixed high rate on a dedicated
//! thread, decoupled from the variable-period main control tick. Sampling at
//! a fixed rate between ticks cuts the quantisation error that odometry
//! integration would otherwise pick up from uneven tick timing.
//!
//! Each registered signal gets its own wait-free bounded queue; one shared
//! timestamp queue serves the group of signals read in a single device
//! transaction. The main tick drains all queues non-blocking, and
//! `drain_synced` keeps the timestamp queue length equal to every paired
//! value queue length across the drain.
//!
//! The sampling thread never blocks on the main tick, and a stalled consumer
//! only costs the oldest queued samples (counted as overflow), never the
//! sampler's timing.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod signal;

pub use params::OdomSamplerParams;
pub use signal::{Debouncer, Signal, SignalError};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use crossbeam::queue::ArrayQueue;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A handle onto one bounded sample queue.
///
/// Cloning the handle shares the underlying queue. The sampler end pushes,
/// the main tick end drains; `ArrayQueue` keeps both ends lock-free.
#[derive(Clone)]
pub struct SampleQueue {
    queue: Arc<ArrayQueue<f64>>,
}

/// The consumer's view of one registered signal: its sample queue plus the
/// debounced connectivity flag.
#[derive(Clone)]
pub struct SignalHandle {
    pub queue: SampleQueue,
    connected: Arc<AtomicBool>,
}

/// One registered signal as seen by the sampling thread.
struct SignalSlot {
    signal: Box<dyn Signal>,
    queue: SampleQueue,
    connected: Arc<AtomicBool>,
    debouncer: Debouncer,
    last_good: f64,
}

/// The sampling state owned by the sampling thread once started.
struct SamplerCore {
    slots: Vec<SignalSlot>,
    ts_queues: Vec<SampleQueue>,
    overflow_count: Arc<AtomicU64>,
}

/// The odometry sampler.
///
/// Signals and timestamp queues are registered before `start` spawns the
/// sampling thread; registration after start is rejected so that the thread
/// never shares its signal list with the main tick.
pub struct OdomSampler {
    params: OdomSamplerParams,
    core: Option<SamplerCore>,
    thread: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    overflow_count: Arc<AtomicU64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the odometry sampler.
#[derive(Debug, thiserror::Error)]
pub enum OdomSamplerError {
    #[error("Cannot register a signal once the sampler has been started")]
    AlreadyStarted,

    #[error("Cannot start the sampler twice")]
    AlreadyRunning,

    #[error("Could not spawn the sampling thread: {0}")]
    SpawnError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SampleQueue {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop a single sample, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<f64> {
        self.queue.pop()
    }

    /// Read-and-clear every queued sample, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(v) = self.queue.pop() {
            out.push(v);
        }
        out
    }

    /// Push a sample, dropping the oldest entry if the queue is full.
    ///
    /// Returns true if an entry was dropped.
    fn push_overwrite(&self, value: f64) -> bool {
        if self.queue.push(value).is_ok() {
            return false;
        }

        // Full: drop the oldest and retry once. Only the sampler pushes, so
        // the retry cannot race another producer.
        let _ = self.queue.pop();
        let _ = self.queue.push(value);
        true
    }
}

impl SignalHandle {
    /// Debounced connectivity of the underlying sensor.
    ///
    /// Stays true through read failures shorter than the configured
    /// hysteresis window.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl SamplerCore {
    /// One sampling cycle: append the timestamp to every timestamp queue and
    /// a freshly read value to every signal queue.
    ///
    /// A failed read substitutes the last-known-good value and feeds the
    /// signal's debouncer rather than failing the sample.
    fn sample_cycle(&mut self, now_s: f64) {
        let mut overflowed = 0u64;

        for q in &self.ts_queues {
            if q.push_overwrite(now_s) {
                overflowed += 1;
            }
        }

        for slot in &mut self.slots {
            let (value, read_ok) = match slot.signal.read() {
                Ok(v) => {
                    slot.last_good = v;
                    (v, true)
                }
                Err(_) => (slot.last_good, false),
            };

            let connected = slot.debouncer.calculate(read_ok, now_s);
            slot.connected.store(connected, Ordering::Relaxed);

            if slot.queue.push_overwrite(value) {
                overflowed += 1;
            }
        }

        if overflowed > 0 {
            self.overflow_count
                .fetch_add(overflowed, Ordering::Relaxed);
        }
    }
}

impl OdomSampler {
    /// Create a new sampler from its parameters. No thread is spawned until
    /// `start` is called.
    pub fn new(params: OdomSamplerParams) -> Self {
        let overflow_count = Arc::new(AtomicU64::new(0));

        Self {
            core: Some(SamplerCore {
                slots: vec![],
                ts_queues: vec![],
                overflow_count: overflow_count.clone(),
            }),
            thread: None,
            stop: Arc::new(AtomicBool::new(false)),
            overflow_count,
            params,
        }
    }

    /// Bind a periodic read of the given signal to a dedicated sample queue.
    pub fn register_signal(
        &mut self,
        signal: Box<dyn Signal>,
    ) -> Result<SignalHandle, OdomSamplerError> {
        let core = self.core.as_mut().ok_or(OdomSamplerError::AlreadyStarted)?;

        let queue = SampleQueue::new(self.params.queue_capacity);
        let connected = Arc::new(AtomicBool::new(true));

        core.slots.push(SignalSlot {
            signal,
            queue: queue.clone(),
            connected: connected.clone(),
            debouncer: Debouncer::new(self.params.disconnect_debounce_s),
            last_good: 0.0,
        });

        Ok(SignalHandle { queue, connected })
    }

    /// Create a shared timestamp queue for a group of signals sampled
    /// together in a single transaction.
    pub fn make_timestamp_queue(&mut self) -> Result<SampleQueue, OdomSamplerError> {
        let core = self.core.as_mut().ok_or(OdomSamplerError::AlreadyStarted)?;

        let queue = SampleQueue::new(self.params.queue_capacity);
        core.ts_queues.push(queue.clone());

        Ok(queue)
    }

    /// Spawn the fixed-rate sampling thread.
    pub fn start(&mut self) -> Result<(), OdomSamplerError> {
        if self.thread.is_some() {
            return Err(OdomSamplerError::AlreadyRunning);
        }

        let mut core = self.core.take().ok_or(OdomSamplerError::AlreadyRunning)?;
        let num_signals = core.slots.len();
        let stop = self.stop.clone();
        let period = Duration::from_secs_f64(1.0 / self.params.sample_rate_hz);

        let handle = thread::Builder::new()
            .name(String::from("odom_sampler"))
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let cycle_start = Instant::now();

                    core.sample_cycle(session::get_elapsed_seconds());

                    // Sleep out the rest of the period; an overrun just
                    // starts the next cycle immediately
                    let elapsed = cycle_start.elapsed();
                    if elapsed < period {
                        thread::sleep(period - elapsed);
                    }
                }
            })
            .map_err(OdomSamplerError::SpawnError)?;

        self.thread = Some(handle);

        info!(
            "Odometry sampler started at {} Hz with {} signal(s)",
            self.params.sample_rate_hz, num_signals
        );

        Ok(())
    }

    /// Stop the sampling thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Odometry sampler thread panicked");
            }
        }
    }

    /// Total samples dropped to queue overflow since start.
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

impl Drop for OdomSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Drain a timestamp queue and its paired value queues to matched lengths.
///
/// Pops `min(len)` entries from every queue so that after the drain the
/// timestamp count equals each value count, even if the sampler is mid-cycle
/// on the other thread. Returns the timestamps and one value vector per
/// signal, oldest first.
pub fn drain_synced(
    timestamps: &SampleQueue,
    values: &[&SampleQueue],
) -> (Vec<f64>, Vec<Vec<f64>>) {
    let mut n = timestamps.len();
    for q in values {
        n = n.min(q.len());
    }

    let mut ts = Vec::with_capacity(n);
    for _ in 0..n {
        match timestamps.pop() {
            Some(t) => ts.push(t),
            None => break,
        }
    }

    let out = values
        .iter()
        .map(|q| {
            let mut vs = Vec::with_capacity(n);
            for _ in 0..n {
                match q.pop() {
                    Some(v) => vs.push(v),
                    None => break,
                }
            }
            vs
        })
        .collect();

    (ts, out)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
