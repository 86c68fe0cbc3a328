//! Struct archiving functionality
//!
//! Modules hold an `Archiver` per output file and serialise flat record
//! structs into it each cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use std::fs::{File, OpenOptions};
use std::path::Path;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a particular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session,
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut session_path = session.arch_root.clone();
        session_path.push(path);

        if let Some(parent) = session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Create the file if it does not exist
        File::create(session_path.clone())?;

        // Open the file in append mode
        let file = OpenOptions::new().append(true).open(session_path)?;

        let writer = WriterBuilder::new().has_headers(true).from_writer(file);

        Ok(Self {
            writer: Some(writer),
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: serde::Serialize>(
        &mut self,
        record: T,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record)?;
                w.flush()?;
                Ok(())
            }
            None => Err("archiver is not initialised".into()),
        }
    }
}
