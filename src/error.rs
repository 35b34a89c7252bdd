//! Error types for the settings service.
//!
//! [`Error`] is the stable vocabulary callers of [`ToySettings`](crate::ToySettings)
//! match on. Domain rule violations and exhausted retries are distinct
//! variants; backend failures pass through untouched.
use thiserror::Error;

use crate::key::SettingKeyError;
use crate::operations::OperationError;
use crate::store::StorageError;

/// Represents errors that can occur when reading or updating settings
#[derive(Debug, Error)]
pub enum Error {
    /// The setting already has a value, so it cannot be set
    #[error("'{key}' is already set")]
    AlreadySet { key: String },

    /// The setting has no value, so it cannot be changed or unset
    #[error("there is no '{key}' setting")]
    NotSet { key: String },

    /// Other writers kept winning the race for the next index of this key
    #[error("'{key}' kept changing underneath us; gave up after {attempts} attempts, try again")]
    StaleState { key: String, attempts: u32 },

    /// Indicates a failure of the storage backend
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Indicates a key that cannot name a setting
    #[error("invalid setting key: {0}")]
    InvalidKey(#[from] SettingKeyError),

    /// Indicates an invalid configuration parameter
    #[error("Invalid configuration{}: {message}", parameter.as_ref().map(|p| format!(" parameter '{p}'")).unwrap_or_default())]
    InvalidConfig {
        message: String,
        parameter: Option<String>,
    },
}

impl Error {
    pub(crate) fn invalid_config(message: impl Into<String>, parameter: &str) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            parameter: Some(parameter.to_string()),
        }
    }
}

impl From<OperationError> for Error {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::AlreadySet(key) => Self::AlreadySet { key },
            OperationError::NotSet(key) => Self::NotSet { key },
        }
    }
}

/// For commands that cannot reject anything.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
