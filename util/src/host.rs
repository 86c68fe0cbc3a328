//! Host environment utility functions

use std::path::PathBuf;
use thiserror::Error;

/// The environment variable giving the root of the software tree.
pub const SW_ROOT_ENV_VAR: &str = "SWERVE_SW_ROOT";

/// Errors which can occur when querying the host environment.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable ({}) is not set", SW_ROOT_ENV_VAR)]
    SwRootNotSet,
}

/// Get the root directory of the software tree.
///
/// This is read from the `SWERVE_SW_ROOT` environment variable, which must be
/// set before any sessions or parameter files can be used.
pub fn get_swerve_sw_root() -> Result<PathBuf, HostError> {
    match std::env::var(SW_ROOT_ENV_VAR) {
        Ok(p) => Ok(PathBuf::from(p)),
        Err(_) => Err(HostError::SwRootNotSet),
    }
}
