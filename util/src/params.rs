//! Generic parameter loading functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use thiserror::Error;

use crate::host;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    HostError(#[from] host::HostError),

    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file.
///
/// The file path is relative to the software root's `params` directory.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    // Get the params dir
    let mut path = host::get_swerve_sw_root()?;
    path.push("params");
    path.push(param_file_path);

    // Load the file into a string
    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    // Parse the string into the parameter struct
    toml::from_str(params_str.as_str()).map_err(LoadError::DeserialiseError)
}

/// Parse a parameter struct directly from a TOML string, rather than from a
/// file in the params directory.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestParams {
        gain: f64,
        names: Vec<String>,
    }

    #[test]
    fn test_from_str() {
        let params: TestParams = from_str(
            r#"
            gain = 2.5
            names = ["a", "b"]
            "#,
        )
        .unwrap();

        assert_eq!(params.gain, 2.5);
        assert_eq!(params.names, vec!["a", "b"]);
    }

    #[test]
    fn test_from_str_missing_key() {
        let result: Result<TestParams, LoadError> = from_str("gain = 2.5");

        assert!(matches!(result, Err(LoadError::DeserialiseError(_))));
    }
}
