//! # Tunable gain store
//!
//! Process-wide store of named tunable values, so that controller gains can
//! be edited at runtime (from a telemetry client or a test) without
//! restarting. Consumers hold a `Tunable` handle and sample it once at the
//! top of their tick: a changed value takes effect from the next tick's
//! computation only, keeping one tick's gain set consistent throughout its
//! whole computation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use conquer_once::OnceCell;
use std::collections::HashMap;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static STORE: OnceCell<Mutex<HashMap<String, Entry>>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone)]
struct Entry {
    value: f64,
    revision: u64,
}

/// A handle onto one named tunable value.
///
/// The handle remembers the revision it last observed, so `has_changed`
/// reports each store update exactly once per handle.
#[derive(Debug)]
pub struct Tunable {
    key: String,
    default: f64,
    last_revision: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tunable {
    /// Create a handle with the given key and default value.
    ///
    /// The default is returned by `get` until the key is first set.
    pub fn new(key: &str, default: f64) -> Self {
        Self {
            key: String::from(key),
            default,
            last_revision: 0,
        }
    }

    /// Get the current value of the tunable.
    pub fn get(&self) -> f64 {
        match lookup(&self.key) {
            Some(entry) => entry.value,
            None => self.default,
        }
    }

    /// True if the value has been set since this handle last checked.
    pub fn has_changed(&mut self) -> bool {
        match lookup(&self.key) {
            Some(entry) => {
                if entry.revision != self.last_revision {
                    self.last_revision = entry.revision;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Set a tunable value, notifying all handles on the key.
pub fn set(key: &str, value: f64) {
    let mut store = store().lock().unwrap_or_else(|e| e.into_inner());

    let entry = store.entry(String::from(key)).or_insert(Entry {
        value,
        revision: 0,
    });
    entry.value = value;
    entry.revision += 1;
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn store() -> &'static Mutex<HashMap<String, Entry>> {
    STORE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lookup(key: &str) -> Option<Entry> {
    let store = store().lock().unwrap_or_else(|e| e.into_inner());
    store.get(key).copied()
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    // The store is process-wide, each test uses its own keys

    #[test]
    fn test_default_until_set() {
        let gain = Tunable::new("test/default_until_set", 4.0);
        assert_eq!(gain.get(), 4.0);

        set("test/default_until_set", 8.0);
        assert_eq!(gain.get(), 8.0);
    }

    #[test]
    fn test_has_changed_reports_once() {
        let mut gain = Tunable::new("test/has_changed_once", 1.0);
        assert!(!gain.has_changed());

        set("test/has_changed_once", 2.0);
        assert!(gain.has_changed());
        assert!(!gain.has_changed());

        set("test/has_changed_once", 3.0);
        assert!(gain.has_changed());
    }

    #[test]
    fn test_independent_handles() {
        let mut a = Tunable::new("test/independent_handles", 0.0);
        let mut b = Tunable::new("test/independent_handles", 0.0);

        set("test/independent_handles", 5.0);
        assert!(a.has_changed());
        assert!(b.has_changed());
    }
}
