//! Error types for the harness

use thiserror::Error;

use seedbed_backend::BackendError;

#[derive(Error, Debug)]
pub enum E2eError {
    /// The backend rejected a create or insert issued by a test
    #[error("Failed to create {resource}: {message}")]
    ResourceCreation { resource: String, message: String },

    /// The backend reported success but returned nothing
    #[error("{0}")]
    MissingEntity(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Docker is not running. E2E tests require Docker for local Supabase")]
    DockerUnavailable,

    #[error("Setup command failed: {command} - {reason}")]
    SetupCommand { command: String, reason: String },

    #[error("Application at {url} not ready after {attempts} attempts")]
    AppUnavailable { url: String, attempts: usize },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Common error: {0}")]
    Common(seedbed_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<seedbed_common::Error> for E2eError {
    fn from(e: seedbed_common::Error) -> Self {
        match e {
            seedbed_common::Error::Configuration(msg) => E2eError::Configuration(msg),
            seedbed_common::Error::InvalidUrl(e) => {
                E2eError::Configuration(format!("invalid Supabase URL: {e}"))
            }
            other => E2eError::Common(other),
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
