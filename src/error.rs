//! Error types for gce-bootstrap

use thiserror::Error;

/// gce-bootstrap error types
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Layered configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Settings or inputs failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ssh-keygen failed or could not be started
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// External tool exceeded its time budget
    #[error("'{tool}' timed out after {timeout} seconds")]
    ToolTimeout { tool: String, timeout: u64 },

    /// No usable service-account credentials
    #[error("No GCP credentials: set GCP_CREDENTIAL or gcp.credentials_file")]
    MissingCredentials,

    /// Service-account JSON could not be parsed
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(#[from] serde_json::Error),

    /// JWT signing failed
    #[error("Failed to sign token assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// OAuth2 token endpoint rejected the assertion
    #[error("Token exchange failed ({status}): {message}")]
    TokenExchange { status: u16, message: String },

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid API base URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Compute API returned a non-success status
    #[error("Compute API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Instance has no external NAT address
    #[error("No external IP address found for instance '{0}'")]
    NoExternalIp(String),

    /// SSH errors
    #[error("SSH error on {host}: {message}")]
    Ssh { host: String, message: String },

    /// Remote command exited non-zero
    #[error("Remote command exited with status {exit_code}: {stderr}")]
    RemoteCommandFailed { exit_code: i32, stderr: String },

    /// Pipeline interrupted by a signal
    #[error("Interrupted during {0}")]
    Interrupted(String),

    /// Generic error
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias using BootstrapError
pub type Result<T> = std::result::Result<T, BootstrapError>;
